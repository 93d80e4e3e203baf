//! Shared helpers for the integration tests.
//!
//! Everything here runs against `es-fixture-stub`, a fake launcher built
//! with this package. It speaks the same command line as `elasticsearch`
//! and answers a small in-memory REST API; its behaviour is picked through
//! `ES_FIXTURE_STUB_*` variables passed in the launch environment.
#![allow(dead_code)]

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use es_fixture::*;

pub const STUB: &str = env!("CARGO_BIN_EXE_es-fixture-stub");

pub fn stub_path() -> PathBuf {
    PathBuf::from(STUB)
}

/// Launch environment from `(name, value)` pairs.
pub fn stub_env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// An unstarted executor for the stub on fresh ports, plus its scratch dirs.
///
/// Field order matters: the executor is dropped (and stopped) before the
/// directories are removed.
pub struct StubServer {
    pub executor: ProcessExecutor,
    pub scratch: ScratchDirs,
}

pub fn stub_server(env: &[(&str, &str)], timeout: Duration) -> FixtureResult<StubServer> {
    let port = PortSpec::Any.select(&[])?;
    stub_server_at("127.0.0.1", port, env, timeout)
}

/// Like [`stub_server`], for a caller-chosen HTTP address.
pub fn stub_server_at(
    host: &str,
    port: u16,
    env: &[(&str, &str)],
    timeout: Duration,
) -> FixtureResult<StubServer> {
    let transport_port = PortSpec::Any.select(&[port])?;
    let scratch = ScratchDirs::create("integration", port)?;
    let config = LaunchConfig::builder()
        .executable(stub_path())
        .host(host)
        .network_publish_host(host)
        .port(port)
        .transport_port(transport_port)
        .pidfile(scratch.pidfile())
        .logs_path(scratch.logs_path())
        .works_path(scratch.works_path())
        .env(stub_env(env))
        .build();
    let executor = ProcessExecutor::builder()
        .config(config)
        .startup_timeout(timeout)
        .poll_interval(Duration::from_millis(50))
        .build();
    Ok(StubServer { executor, scratch })
}

/// Factory for a stub-backed [`ElasticsearchProc`] that ignores the
/// developer's environment.
pub fn stub_proc(name: &str, env: &[(&str, &str)]) -> ElasticsearchProc {
    ElasticsearchProc::builder()
        .name(name)
        .options(
            FixtureOptions::builder()
                .executable(stub_path())
                .timeout_secs(20)
                .build(),
        )
        .read_env(false)
        .env(stub_env(env))
        .poll_interval(Duration::from_millis(50))
        .build()
}

/// Poll `condition` every 50 ms until it holds or `limit` passes.
pub fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < limit {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

#[cfg(unix)]
pub fn alive(pid: u32) -> bool {
    pid_alive(pid).unwrap_or(false)
}

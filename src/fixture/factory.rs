//! Fixture factories
//! =================
//!
//! * [`ElasticsearchProc`] – start a private server, hand out a
//!   [`ProcFixture`] that stops it and deletes its files on drop.
//! * [`ElasticsearchNoProc`] – point at a server somebody else runs.
//! * [`ClientFixture`] – a [`SearchClient`] for any [`ServerHandle`] that
//!   deletes every index when dropped, so the next test starts clean.
//!
//! Share one `ProcFixture` between tests (e.g. behind a `OnceLock<Mutex<_>>`)
//! and create a `ClientFixture` per test.

use std::{collections::BTreeMap, ops::Deref, path::PathBuf, time::Duration};

use bon::Builder;

use crate::{
    client::SearchClient,
    error::{FixtureError, FixtureResult},
    fixture::{
        config::{FixtureOptions, ResolvedOptions},
        port::PortSpec,
        scratch::ScratchDirs,
    },
    server::{
        executor::{ExecutorState, ProcessExecutor},
        handle::ServerHandle,
        passthrough::PassthroughHandle,
        process::ProcessError,
        types::{LaunchConfig, PollInterval},
    },
};

/// Port a no-process fixture assumes when none is configured.
pub const DEFAULT_NOPROC_PORT: u16 = 9300;

/// Request timeout of the client handed out by [`ClientFixture`].
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Builder)]
pub struct ElasticsearchProc {
    /// Used in the scratch directory name and in log lines.
    #[builder(default = "elasticsearch_proc".to_string(), into)]
    pub name: String,

    /// Highest-precedence options.
    #[builder(default)]
    pub options: FixtureOptions,

    /// TOML file below flags/env in precedence.
    #[builder(into)]
    pub config_file: Option<PathBuf>,

    /// Read `ELASTICSEARCH_*` variables and `$ES_FIXTURE_CONFIG`.
    #[builder(default = true)]
    pub read_env: bool,

    /// Extra environment for the server, e.g. `ES_JAVA_OPTS`.
    #[builder(default)]
    pub env: BTreeMap<String, String>,

    #[builder(default, into)]
    pub poll_interval: PollInterval,
}

impl ElasticsearchProc {
    pub fn resolved_options(&self) -> FixtureResult<ResolvedOptions> {
        Ok(self
            .options
            .clone()
            .layered(self.read_env, self.config_file.as_deref())?
            .resolve())
    }

    /// Resolve options, pick ports, create scratch space and bring the server
    /// to `Ready`.
    pub fn start(&self) -> FixtureResult<ProcFixture> {
        let mut fixture = self.prepare()?;
        match fixture.executor.command_line() {
            Ok(command) => crate::info!("[{}] {}", self.name, command.join(" ")),
            Err(e) => crate::warn!("[{}] cannot build command line: {e}", self.name),
        }
        fixture.executor.start()?;
        Ok(fixture)
    }

    /// Everything [`start`](Self::start) does short of spawning the server.
    pub fn prepare(&self) -> FixtureResult<ProcFixture> {
        let resolved = self.resolved_options()?;
        let port = resolved.port.select(&[])?;
        let transport_port = resolved.transport_tcp_port.select(&[port])?;
        let scratch = ScratchDirs::create(&self.name, port)?;

        let config = LaunchConfig::builder()
            .executable(resolved.executable)
            .host(resolved.host)
            .port(port)
            .transport_port(transport_port)
            .pidfile(scratch.pidfile())
            .logs_path(scratch.logs_path())
            .works_path(scratch.works_path())
            .maybe_cluster_name(resolved.cluster_name)
            .network_publish_host(resolved.network_publish_host)
            .index_store_type(resolved.index_store_type)
            .env(self.env.clone())
            .build();

        let executor = ProcessExecutor::builder()
            .config(config)
            .startup_timeout(resolved.timeout)
            .poll_interval(self.poll_interval)
            .build();

        Ok(ProcFixture {
            name: self.name.clone(),
            executor,
            scratch,
            torn_down: false,
        })
    }
}

/// A running server plus its scratch directories.
#[derive(Debug)]
pub struct ProcFixture {
    name: String,
    executor: ProcessExecutor,
    scratch: ScratchDirs,
    torn_down: bool,
}

impl ProcFixture {
    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut ProcessExecutor {
        &mut self.executor
    }

    pub fn scratch(&self) -> &ScratchDirs {
        &self.scratch
    }

    pub fn url(&self) -> String {
        self.executor.url()
    }

    /// Stop the server, then remove its directories.
    ///
    /// A server that already died is not an error here. Reported are a failure
    /// to remove the directories, and a server that survived SIGKILL (its
    /// directories are then kept).
    pub fn teardown(mut self) -> FixtureResult<()> {
        self.teardown_inner()
    }

    fn teardown_inner(&mut self) -> FixtureResult<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        crate::debug!("[{}] tearing down", self.name);
        let stopped = match self.executor.state() {
            ExecutorState::Unstarted => Ok(()),
            _ => self.executor.stop(),
        };
        finish_teardown(&self.name, stopped, &mut self.scratch)
    }
}

/// Remove the scratch space once the server is known to be gone.
///
/// A server that survived SIGKILL may still write to its data and log
/// directories, so those are left on disk and the stop error is returned.
fn finish_teardown(
    name: &str,
    stopped: FixtureResult<()>,
    scratch: &mut ScratchDirs,
) -> FixtureResult<()> {
    match stopped {
        Ok(()) => scratch.cleanup(),
        Err(e @ FixtureError::Process(ProcessError::TerminationTimeout { .. })) => {
            if let Some(root) = scratch.keep() {
                crate::error!(
                    "[{name}] server outlived its stop; leaving {} in place",
                    root.display()
                );
            }
            Err(e)
        }
        Err(e) => {
            crate::warn!("[{name}] stop failed during teardown: {e}");
            scratch.cleanup()
        }
    }
}

impl Drop for ProcFixture {
    fn drop(&mut self) {
        if let Err(e) = self.teardown_inner() {
            crate::error!("[{}] teardown failed: {e}", self.name);
        }
    }
}

impl ServerHandle for ProcFixture {
    fn host(&self) -> &str {
        self.executor.host()
    }

    fn port(&self) -> u16 {
        self.executor.port()
    }

    fn running(&mut self) -> bool {
        self.executor.running()
    }

    fn start(&mut self) -> FixtureResult<()> {
        self.executor.start()
    }

    fn stop(&mut self) -> FixtureResult<()> {
        self.executor.stop()
    }
}

#[derive(Debug, Clone, Builder)]
pub struct ElasticsearchNoProc {
    #[builder(into)]
    pub host: Option<String>,
    pub port: Option<u16>,
    #[builder(into)]
    pub config_file: Option<PathBuf>,
    #[builder(default = true)]
    pub read_env: bool,
}

impl ElasticsearchNoProc {
    pub fn resolve(&self) -> FixtureResult<PassthroughHandle> {
        let explicit = FixtureOptions {
            host: self.host.clone(),
            port: self.port.map(PortSpec::Exact),
            ..FixtureOptions::default()
        };
        let options = explicit.layered(self.read_env, self.config_file.as_deref())?;
        let port = match &options.port {
            None => DEFAULT_NOPROC_PORT,
            Some(PortSpec::Exact(port)) => *port,
            Some(other) => {
                return Err(FixtureError::InvalidConfig {
                    field: "port",
                    reason: format!("an external server needs an exact port, got `{other}`"),
                });
            }
        };
        let resolved = options.resolve();
        crate::debug!("Using external Elasticsearch at {}:{port}", resolved.host);
        Ok(PassthroughHandle::new(resolved.host, port))
    }
}

/// A connected [`SearchClient`] that wipes all indices when dropped.
#[derive(Debug)]
pub struct ClientFixture {
    client: SearchClient,
}

impl ClientFixture {
    /// Start `server` if it is not running, then connect to it.
    pub fn connect(server: &mut dyn ServerHandle) -> FixtureResult<Self> {
        if !server.running() {
            server.start()?;
        }
        let client = SearchClient::new(server.host(), server.port(), CLIENT_TIMEOUT);
        crate::debug!("Client connected to {}", client.base_url());
        Ok(Self { client })
    }

    pub fn client(&self) -> &SearchClient {
        &self.client
    }
}

impl Deref for ClientFixture {
    type Target = SearchClient;

    fn deref(&self) -> &SearchClient {
        &self.client
    }
}

impl Drop for ClientFixture {
    fn drop(&mut self) {
        if let Err(e) = self.client.delete_all_indices() {
            crate::warn!("Failed to delete indices at {}: {e}", self.client.base_url());
        }
    }
}

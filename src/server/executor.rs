//! Server – Executor
//! =================
//!
//! [`ProcessExecutor`] drives one Elasticsearch process through its whole
//! life:
//!
//! ```text
//!  Unstarted ──start()──▶ Starting ──ready──▶ Ready ──stop()──▶ Stopped
//!      │                     │                  │
//!      └── probe / dialect ──┴─ timeout / exit ─┴─ died (running()) ──▶ Failed
//! ```
//!
//! * The version is probed lazily with `-Vv` and cached for the executor's
//!   lifetime, failures included.
//! * Nothing may answer on the URL before the spawn; otherwise readiness could
//!   not be told apart from a stale server.
//! * Readiness means `GET http://{host}:{port}/` answered 2xx. The loop gives up
//!   after [`StartupTimeout`], or as soon as the process exits on its own.
//! * There is no restart: once `Stopped` or `Failed`, [`start`] is rejected.
//!
//! Dropping the executor stops the process.
//!
//! [`start`]: ProcessExecutor::start

use std::{
    fmt,
    path::PathBuf,
    process::ExitStatus,
    thread::sleep,
    time::Instant,
};

use bon::bon;
use serde::Serialize;

use crate::{
    error::{FixtureError, FixtureResult},
    server::{
        dialect::build_args,
        handle::ServerHandle,
        ipc::http::{HttpClient, PROBE_TIMEOUT},
        process::{guard::ServerProcessGuard, pid::pid_from_pidfile},
        types::{LaunchConfig, PollInterval, StartupTimeout},
        version::{probe_version, ServerVersion, VersionCache},
    },
};

/// File under `logs_path` that receives the server's stdout and stderr.
pub const CONSOLE_LOG: &str = "console.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExecutorState {
    Unstarted,
    Starting,
    Ready,
    Stopped,
    Failed,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorState::Unstarted => "unstarted",
            ExecutorState::Starting => "starting",
            ExecutorState::Ready => "ready",
            ExecutorState::Stopped => "stopped",
            ExecutorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a server process ended when nobody asked it to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbnormalExit {
    pub pid: u32,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if it was killed (Unix only).
    pub signal: Option<i32>,
}

impl AbnormalExit {
    pub fn from_status(pid: u32, status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            pid,
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for AbnormalExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "Elasticsearch (PID {}) exited with status {code}", self.pid),
            (None, Some(signal)) => write!(
                f,
                "Elasticsearch (PID {}) was killed by signal {signal}",
                self.pid
            ),
            (None, None) => write!(f, "Elasticsearch (PID {}) exited", self.pid),
        }
    }
}

impl std::error::Error for AbnormalExit {}

#[derive(Debug)]
pub struct ProcessExecutor {
    config: LaunchConfig,
    state: ExecutorState,
    version: VersionCache,
    /// Present only while a process exists.
    guard: Option<ServerProcessGuard>,
    startup_timeout: StartupTimeout,
    poll_interval: PollInterval,
    abnormal_exit: Option<AbnormalExit>,
}

#[bon]
impl ProcessExecutor {
    #[builder]
    pub fn new(
        config: LaunchConfig,
        #[builder(default, into)] startup_timeout: StartupTimeout,
        #[builder(default, into)] poll_interval: PollInterval,
    ) -> Self {
        Self {
            config,
            state: ExecutorState::Unstarted,
            version: VersionCache::default(),
            guard: None,
            startup_timeout,
            poll_interval,
            abnormal_exit: None,
        }
    }
}

impl ProcessExecutor {
    /// Probe, spawn and block until the server answers or the start-up fails.
    ///
    /// # Errors
    /// * [`FixtureError::InvalidState`] unless the executor is `Unstarted`.
    /// * [`FixtureError::Version`] / [`FixtureError::UnsupportedVersion`]
    ///   before anything is spawned.
    /// * [`FixtureError::AlreadyRunning`] if the URL answers before spawning.
    /// * [`FixtureError::StartupTimeout`] or
    ///   [`FixtureError::ExitedDuringStartup`]; the process is gone by then.
    pub fn start(&mut self) -> FixtureResult<()> {
        if self.state != ExecutorState::Unstarted {
            return Err(FixtureError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        let args = match self.version().and_then(|v| build_args(v, &self.config)) {
            Ok(args) => args,
            Err(e) => {
                crate::error!("Cannot launch {}: {e}", self.config.executable.display());
                self.state = ExecutorState::Failed;
                return Err(e);
            }
        };

        if self.readiness_client().probe() {
            crate::error!("{} already answers; not spawning Elasticsearch", self.url());
            self.state = ExecutorState::Failed;
            return Err(FixtureError::AlreadyRunning { url: self.url() });
        }

        let guard = match ServerProcessGuard::spawn(
            &self.config.executable,
            &args,
            &self.config.env,
            &self.console_log_path(),
        ) {
            Ok(guard) => guard,
            Err(e) => {
                self.state = ExecutorState::Failed;
                return Err(e.into());
            }
        };
        self.guard = Some(guard);
        self.state = ExecutorState::Starting;

        match self.wait_until_ready() {
            Ok(elapsed) => {
                self.state = ExecutorState::Ready;
                crate::info!("Elasticsearch ready at {} after {elapsed:?}", self.url());
                Ok(())
            }
            Err(e) => {
                crate::error!("Elasticsearch failed to start: {e}");
                self.release_process();
                self.state = ExecutorState::Failed;
                Err(e)
            }
        }
    }

    fn wait_until_ready(&mut self) -> FixtureResult<std::time::Duration> {
        let timeout = self.startup_timeout.0;
        let probe = self.readiness_client();
        let start = Instant::now();
        loop {
            if let Some(exit) = self.observe_exit() {
                return Err(FixtureError::ExitedDuringStartup { exit });
            }
            if probe.probe() {
                return Ok(start.elapsed());
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(FixtureError::StartupTimeout {
                    url: self.url(),
                    elapsed,
                    timeout,
                });
            }
            sleep(self.poll_interval.0.min(timeout - elapsed));
        }
    }

    fn readiness_client(&self) -> HttpClient {
        HttpClient::new(
            &self.config.host,
            self.config.port,
            PROBE_TIMEOUT.min(self.startup_timeout.0),
        )
    }

    /// `Some` once the owned process has exited; the exit is also recorded.
    fn observe_exit(&mut self) -> Option<AbnormalExit> {
        let guard = self.guard.as_mut()?;
        match guard.try_exit_status() {
            Ok(Some(status)) => {
                let exit = AbnormalExit::from_status(guard.pid(), status);
                self.abnormal_exit = Some(exit.clone());
                Some(exit)
            }
            Ok(None) => None,
            Err(e) => {
                crate::warn!("Could not check Elasticsearch (PID {}): {e}", guard.pid());
                None
            }
        }
    }

    /// Best-effort stop used on failure paths; errors are only logged.
    fn release_process(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            if let Err(e) = guard.stop() {
                crate::error!("Failed to stop Elasticsearch (PID {}): {e}", guard.pid());
            }
        }
    }

    /// `true` iff the executor is `Ready` and its process is still alive.
    ///
    /// A process found dead moves the executor to `Failed`; see
    /// [`abnormal_exit`](Self::abnormal_exit).
    pub fn running(&mut self) -> bool {
        if self.state != ExecutorState::Ready {
            return false;
        }
        match self.observe_exit() {
            None => true,
            Some(exit) => {
                crate::error!("{exit}");
                self.release_process();
                self.state = ExecutorState::Failed;
                false
            }
        }
    }

    /// Like [`running`](Self::running), but says why not.
    pub fn check_alive(&mut self) -> FixtureResult<()> {
        if self.running() {
            return Ok(());
        }
        match &self.abnormal_exit {
            Some(exit) => Err(FixtureError::AbnormalExit(exit.clone())),
            None => Err(FixtureError::InvalidState {
                operation: "check",
                state: self.state,
            }),
        }
    }

    /// Terminate the process (SIGTERM, grace period, SIGKILL).
    ///
    /// * `Starting` / `Ready` → `Stopped`; an exit that already happened is
    ///   not an error.
    /// * `Stopped` → no-op.
    /// * `Failed` → releases anything left over, stays `Failed`.
    /// * `Unstarted` → [`FixtureError::InvalidState`].
    pub fn stop(&mut self) -> FixtureResult<()> {
        match self.state {
            ExecutorState::Unstarted => Err(FixtureError::InvalidState {
                operation: "stop",
                state: self.state,
            }),
            ExecutorState::Stopped => Ok(()),
            ExecutorState::Failed => {
                self.release_process();
                Ok(())
            }
            ExecutorState::Starting | ExecutorState::Ready => {
                if let Some(mut guard) = self.guard.take() {
                    crate::info!("Stopping Elasticsearch (PID {})", guard.pid());
                    if let Err(e) = guard.stop() {
                        self.state = ExecutorState::Failed;
                        return Err(e.into());
                    }
                }
                self.state = ExecutorState::Stopped;
                Ok(())
            }
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// PID of the process this executor spawned, while it owns one.
    pub fn pid(&self) -> Option<u32> {
        self.guard.as_ref().map(ServerProcessGuard::pid)
    }

    /// PID the server itself wrote to its `-p` file.
    pub fn pidfile_pid(&self) -> FixtureResult<u32> {
        Ok(pid_from_pidfile(&self.config.pidfile)?)
    }

    pub fn abnormal_exit(&self) -> Option<&AbnormalExit> {
        self.abnormal_exit.as_ref()
    }

    pub fn console_log_path(&self) -> PathBuf {
        self.config.logs_path.join(CONSOLE_LOG)
    }

    /// Server version, probing the executable on first use.
    ///
    /// The `-Vv` run is bounded by the startup timeout.
    pub fn version(&mut self) -> FixtureResult<ServerVersion> {
        let config = &self.config;
        let timeout = self.startup_timeout.0;
        Ok(self
            .version
            .get_or_resolve(|| probe_version(&config.executable, &config.env, timeout))?)
    }

    /// Executable plus arguments, exactly as [`start`](Self::start) runs them.
    pub fn command_line(&mut self) -> FixtureResult<Vec<String>> {
        let version = self.version()?;
        let mut command = vec![self.config.executable.display().to_string()];
        command.extend(build_args(version, &self.config)?);
        Ok(command)
    }
}

impl Drop for ProcessExecutor {
    fn drop(&mut self) {
        if self.guard.is_some() {
            if let Err(e) = self.stop() {
                crate::error!("Failed to stop Elasticsearch on drop: {e}");
            }
        }
    }
}

impl ServerHandle for ProcessExecutor {
    fn host(&self) -> &str {
        ProcessExecutor::host(self)
    }

    fn port(&self) -> u16 {
        ProcessExecutor::port(self)
    }

    fn running(&mut self) -> bool {
        ProcessExecutor::running(self)
    }

    fn start(&mut self) -> FixtureResult<()> {
        ProcessExecutor::start(self)
    }

    fn stop(&mut self) -> FixtureResult<()> {
        ProcessExecutor::stop(self)
    }
}

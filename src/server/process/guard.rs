//! Server Process - Guard
//! ======================
//!
//! Launches and supervises a *single* Elasticsearch process.
//!
//! * **Spawn** with the dialect's arguments and the extra environment, with
//!   stdout/stderr appended to `<logs>/console.log`.
//! * **Contain** the process tree: on Unix the child leads its own process
//!   group, and on Linux it also receives `SIGTERM` if the test process dies
//!   (`prctl(PDEATHSIG)`).
//! * **Clean up** gracefully (`SIGTERM` → [`POLITE_WAIT`] → `SIGKILL`) on
//!   [`ServerProcessGuard::stop`] or on `Drop`.

use std::{
    collections::BTreeMap,
    fs::OpenOptions,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    time::Duration,
};

use wait_timeout::ChildExt;

use super::{error::*, kill::*, *};

/// RAII handle owning a running server process.
///
/// Dropping the guard (or calling [`stop`](Self::stop)) terminates **the whole
/// process group**.
#[derive(Debug)]
pub struct ServerProcessGuard {
    /// `None` once the child has been reaped.
    child: Option<Child>,
    pid: u32,
    exit_status: Option<ExitStatus>,
    console_log: PathBuf,
}

impl ServerProcessGuard {
    pub fn spawn(
        executable: &Path,
        args: &[String],
        envs: &BTreeMap<String, String>,
        console_log: &Path,
    ) -> Result<Self> {
        if let Some(parent) = console_log.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProcessError::from_io("create log directory", e))?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(console_log)
            .map_err(|e| ProcessError::from_io("open console log", e))?;
        let log_err = log
            .try_clone()
            .map_err(|e| ProcessError::from_io("open console log", e))?;

        let mut cmd = Command::new(executable);
        cmd.args(args)
            .envs(envs)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        crate::info!("Starting Elasticsearch: {:?}", cmd);
        let child = attach::attach(cmd)?;
        let pid = child.id();
        debug_assert!(pid > 0, "OS returned an invalid PID (0)");
        Ok(Self {
            child: Some(child),
            pid,
            exit_status: None,
            console_log: console_log.to_path_buf(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn console_log(&self) -> &Path {
        &self.console_log
    }

    /// Non-blocking check; `Some` once the process has exited on its own.
    pub fn try_exit_status(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child
            .try_wait()
            .map_err(|e| ProcessError::from_io("get exit status", e))?;
        if status.is_some() {
            self.exit_status = status;
            self.child = None;
        }
        Ok(status)
    }

    /// Best-effort, idempotent shutdown:
    /// 1. *Polite* → `SIGTERM` to the process group.
    /// 2. Wait up to [`POLITE_WAIT`].
    /// 3. *Force* → `SIGKILL` to the group, then wait for every member.
    ///
    /// Returns the exit status of the leader if it was observed. An exit that
    /// happened before the call (with any code) is not an error.
    pub fn stop(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.try_exit_status()? {
            // The leader is gone; make sure it took its group with it.
            let _ = force_kill_group(self.pid);
            return Ok(Some(status));
        }
        let Some(mut child) = self.child.take() else {
            return Ok(self.exit_status);
        };

        if let Err(e) = terminate_group(self.pid) {
            crate::error!("Failed to send TERM to PID {}: {}", self.pid, e);
        }

        if let Some(status) = child
            .wait_timeout(POLITE_WAIT)
            .map_err(|e| ProcessError::from_io("polite wait for exit", e))?
        {
            crate::info!("Elasticsearch exited gracefully with status: {}", status);
            self.exit_status = Some(status);
            // Stragglers that ignored TERM.
            let _ = force_kill_group(self.pid);
            return Ok(Some(status));
        }

        crate::warn!(
            "Elasticsearch (PID {}) still running after {:?}, force-killing",
            self.pid,
            POLITE_WAIT
        );
        if let Err(e) = force_kill_group(self.pid) {
            crate::error!("Failed to send KILL to group {}: {}", self.pid, e);
        }
        child
            .kill()
            .map_err(|e| ProcessError::from_io("force-kill", e))?;

        let force_timeout = Duration::from_secs(FORCE_KILL_TIMEOUT_SECS);
        match child
            .wait_timeout(force_timeout)
            .map_err(|e| ProcessError::from_io("wait after force-kill", e))?
        {
            Some(status) => {
                crate::info!("Elasticsearch force-killed; exit status {status}");
                self.exit_status = Some(status);
                if let Err(e) = wait_for_group_exit(self.pid, force_timeout) {
                    crate::warn!("Process group {} not empty after force-kill: {e}", self.pid);
                }
                Ok(Some(status))
            }
            None => {
                // Keep the handle so Drop gets another chance.
                self.child = Some(child);
                Err(ProcessError::TerminationTimeout {
                    operation: "force-kill",
                    elapsed: force_timeout,
                    leftovers: vec![self.pid],
                })
            }
        }
    }
}

impl Drop for ServerProcessGuard {
    fn drop(&mut self) {
        match self.stop() {
            Ok(_) => (),
            Err(e) => crate::error!("Failed to stop server process: {}", e),
        }
    }
}

// Linux / other Unix ────────────────────────────
#[cfg(unix)]
mod attach {
    use std::os::unix::process::CommandExt;

    use nix::unistd::{setpgid, Pid};

    use super::*;

    pub fn attach(mut cmd: Command) -> Result<Child> {
        // Own process group, and on Linux a parent-death signal.
        unsafe {
            cmd.pre_exec(|| {
                setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;

                #[cfg(any(target_os = "linux", target_os = "android"))]
                nix::sys::prctl::set_pdeathsig(Some(nix::sys::signal::Signal::SIGTERM))
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;

                Ok(())
            })
        };
        cmd.spawn()
            .map_err(|e| ProcessError::from_io("spawn child process", e))
    }
}

#[cfg(not(unix))]
mod attach {
    use super::*;

    pub fn attach(mut cmd: Command) -> Result<Child> {
        cmd.spawn()
            .map_err(|e| ProcessError::from_io("spawn child process", e))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::server::process::{pid::pid_alive, tests_helpers::*};

    fn spawn_cmd(cmd: &Command, td: &Path) -> ServerProcessGuard {
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        ServerProcessGuard::spawn(
            Path::new(cmd.get_program()),
            &args,
            &BTreeMap::new(),
            &td.join("logs").join("console.log"),
        )
        .unwrap()
    }

    /// One test that exercises every internal state branch of `stop()`.
    #[test]
    fn stop_variants() {
        // ── 1. Child has already exited ────────────────────────────────────
        {
            let td = tempfile::tempdir().unwrap();
            let mut g = spawn_cmd(&Command::new("true"), td.path());
            std::thread::sleep(Duration::from_millis(200));
            let status = g.stop().expect("stop() should succeed after exit");
            assert!(status.is_some_and(|s| s.success()));
        }

        // ── 2. Exit with a failure code is tolerated ───────────────────────
        {
            let td = tempfile::tempdir().unwrap();
            let mut c = Command::new("sh");
            c.args(["-c", "exit 7"]);
            let mut g = spawn_cmd(&c, td.path());
            std::thread::sleep(Duration::from_millis(200));
            let status = g.stop().unwrap().unwrap();
            assert_eq!(status.code(), Some(7));
        }

        // ── 3. Child still running; must be killed gracefully ──────────────
        {
            let td = tempfile::tempdir().unwrap();
            let mut g = spawn_cmd(&long_cmd(), td.path());
            let pid = g.pid();
            assert!(g.stop().is_ok(), "stop() should succeed for live child");
            assert!(!pid_alive(pid).unwrap());
            // ── 4. Second stop is a no-op ──────────────────────────────────
            assert!(g.stop().is_ok());
        }
    }

    #[test]
    fn stubborn_child_is_force_killed() {
        let td = tempfile::tempdir().unwrap();
        let mut g = spawn_cmd(&stubborn_cmd(), td.path());
        std::thread::sleep(Duration::from_millis(200));
        let status = g.stop().unwrap().unwrap();
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(9));
    }

    #[test]
    fn output_goes_to_console_log() {
        let td = tempfile::tempdir().unwrap();
        let mut c = Command::new("sh");
        c.args(["-c", "echo out; echo err >&2"]);
        let mut g = spawn_cmd(&c, td.path());
        std::thread::sleep(Duration::from_millis(300));
        g.stop().unwrap();
        let log = std::fs::read_to_string(g.console_log()).unwrap();
        assert!(log.contains("out"));
        assert!(log.contains("err"));
    }

    #[test]
    fn try_exit_status_reports_death() {
        let td = tempfile::tempdir().unwrap();
        let mut g = spawn_cmd(&long_cmd(), td.path());
        assert!(g.try_exit_status().unwrap().is_none());
        force_kill_group(g.pid()).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(g.try_exit_status().unwrap().is_some());
    }

    #[test]
    fn spawn_invalid_bin_path_errors() {
        let td = tempfile::tempdir().unwrap();
        let res = ServerProcessGuard::spawn(
            Path::new("definitely-does-not-exist-xyz"),
            &[],
            &BTreeMap::new(),
            &td.path().join("console.log"),
        );
        assert!(matches!(res, Err(ProcessError::CommandFailed { .. })));
    }
}

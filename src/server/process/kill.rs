//! Server Process - Kill
//! =====================
//!
//! Signal helpers that address the server's whole *process group*. The
//! `elasticsearch` launcher is a shell script that may leave a JVM and a
//! controller daemon behind it; all of them share the group the guard created
//! at spawn time, so one `killpg` reaches every one of them.
//!
//! * [`terminate_group`] – polite `SIGTERM`.
//! * [`force_kill_group`] – unconditional `SIGKILL`.
//! * [`wait_for_group_exit`] – poll until no member of the group is left.
//!
//! A group that is already gone (`ESRCH`) counts as success everywhere.
//!
//! Other platforms have no process groups; there the functions are no-ops and
//! the guard falls back to [`std::process::Child::kill`].

use std::time::{Duration, Instant};

use super::{error::*, *};

#[cfg(unix)]
fn signal_group(pgid: u32, signal: nix::sys::signal::Signal, action: &'static str) -> Result<()> {
    use nix::{errno::Errno, sys::signal::killpg, unistd::Pid};

    match killpg(Pid::from_raw(pgid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()), // gone already → success

        Err(Errno::EPERM) => Err(ProcessError::PermissionDenied {
            action,
            source: "operation not permitted".into(),
        }),

        Err(e) => Err(ProcessError::CommandFailed {
            action,
            source: e.into(),
        }),
    }
}

#[cfg(unix)]
pub fn terminate_group(pgid: u32) -> Result<()> {
    signal_group(pgid, nix::sys::signal::Signal::SIGTERM, "send SIGTERM to group")
}

#[cfg(unix)]
pub fn force_kill_group(pgid: u32) -> Result<()> {
    signal_group(pgid, nix::sys::signal::Signal::SIGKILL, "send SIGKILL to group")
}

/// `true` while at least one process is still in the group.
#[cfg(unix)]
pub fn group_alive(pgid: u32) -> Result<bool> {
    use nix::{errno::Errno, sys::signal::killpg, unistd::Pid};

    match killpg(Pid::from_raw(pgid as i32), None) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(Errno::EPERM) => Err(ProcessError::PermissionDenied {
            action: "probe process group (signal 0)",
            source: "operation not permitted".into(),
        }),
        Err(e) => Err(ProcessError::CommandFailed {
            action: "probe process group (signal 0)",
            source: e.into(),
        }),
    }
}

#[cfg(not(unix))]
pub fn terminate_group(_pgid: u32) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
pub fn force_kill_group(_pgid: u32) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
pub fn group_alive(_pgid: u32) -> Result<bool> {
    Ok(false)
}

/// Block until the group is empty or `timeout` elapses. Returns
/// [`ProcessError::TerminationTimeout`] naming the group leader otherwise.
///
/// The leader itself must already be reaped, or it will linger as a zombie and
/// keep the group alive.
pub fn wait_for_group_exit(pgid: u32, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        match group_alive(pgid) {
            Ok(false) => return Ok(()),
            Ok(true) => (),
            Err(e) => crate::warn!("Could not probe process group {pgid}: {e}"),
        }
        if start.elapsed() >= timeout {
            return Err(ProcessError::TerminationTimeout {
                operation: "wait for process group exit",
                elapsed: start.elapsed(),
                leftovers: vec![pgid],
            });
        }
        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::process::CommandExt;

    use super::*;
    use crate::server::process::tests_helpers::*;

    fn spawn_group_leader(mut cmd: std::process::Command) -> std::process::Child {
        cmd.process_group(0);
        cmd.spawn().unwrap()
    }

    #[test]
    fn terminate_reaches_the_group() {
        let mut child = spawn_group_leader(long_cmd());
        let pgid = child.id();
        assert!(group_alive(pgid).unwrap());

        terminate_group(pgid).unwrap();
        child.wait().unwrap();
        wait_for_group_exit(pgid, Duration::from_secs(2)).unwrap();
        assert!(!group_alive(pgid).unwrap());
    }

    #[test]
    fn force_kill_beats_ignored_sigterm() {
        let mut child = spawn_group_leader(stubborn_cmd());
        let pgid = child.id();
        std::thread::sleep(Duration::from_millis(200)); // let the trap install

        terminate_group(pgid).unwrap();
        assert!(
            wait_for_group_exit(pgid, Duration::from_millis(300)).is_err(),
            "group should survive SIGTERM"
        );

        force_kill_group(pgid).unwrap();
        let status = child.wait().unwrap();
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(9));
    }

    #[test]
    fn missing_group_is_success() {
        let mut child = spawn_group_leader(std::process::Command::new("true"));
        let pgid = child.id();
        child.wait().unwrap();
        assert!(terminate_group(pgid).is_ok());
        assert!(force_kill_group(pgid).is_ok());
        assert!(!group_alive(pgid).unwrap());
    }
}

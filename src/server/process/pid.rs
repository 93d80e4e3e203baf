//! Server Process - PID
//! ====================
//!
//! ```text
//!  pid_from_pidfile() → the pid Elasticsearch wrote via `-p`
//!  pid_alive()        → is that pid still running? (zombies are not)
//! ```

use std::path::Path;

use super::error::*;

/// Read the pid Elasticsearch wrote into its `-p` file.
///
/// The server writes the file some time after it was spawned, so a missing or
/// still-empty file is reported as [`ProcessError::NoPidRecorded`] rather than
/// as an I/O failure.
pub fn pid_from_pidfile(pidfile_path: &Path) -> Result<u32> {
    let not_yet = || ProcessError::NoPidRecorded {
        pidfile: pidfile_path.to_path_buf(),
    };
    let raw = std::fs::read_to_string(pidfile_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => not_yet(),
        _ => ProcessError::from_io("read pidfile", e),
    })?;
    match raw.trim() {
        "" => Err(not_yet()),
        pid => pid.parse::<u32>().map_err(|e| ProcessError::CommandFailed {
            action: "read the pid in a pidfile",
            source: format!("{}: {e}", pidfile_path.display()).into(),
        }),
    }
}

#[cfg(unix)]
pub fn pid_alive(pid: u32) -> Result<bool> {
    use nix::{errno::Errno, sys::signal::kill, unistd::Pid};

    const ACTION: &str = "check whether a pid exists";
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(!is_zombie(pid)),
        Err(Errno::ESRCH) => Ok(false),
        Err(Errno::EPERM) => Err(ProcessError::PermissionDenied {
            action: ACTION,
            source: format!("pid {pid} belongs to another user").into(),
        }),
        Err(errno) => Err(ProcessError::CommandFailed {
            action: ACTION,
            source: errno.into(),
        }),
    }
}

/// Exited but not yet reaped. Only detectable through procfs.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            // Field 2 is `(comm)` and may itself contain spaces or parens.
            let after_comm = stat.rsplit_once(')')?.1;
            after_comm.split_whitespace().next().map(|s| s == "Z")
        })
        .unwrap_or(false)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pidfile_states() {
        let td = tempfile::tempdir().unwrap();
        let pidfile = td.path().join("elasticsearch.9200.pid");
        let no_pid = |p: &Path| matches!(pid_from_pidfile(p), Err(ProcessError::NoPidRecorded { .. }));

        assert!(no_pid(&pidfile), "missing file");
        std::fs::write(&pidfile, "  \n").unwrap();
        assert!(no_pid(&pidfile), "blank file");

        std::fs::write(&pidfile, "4242\n").unwrap();
        assert_eq!(pid_from_pidfile(&pidfile).unwrap(), 4242);

        std::fs::write(&pidfile, "4242 4243").unwrap();
        let err = pid_from_pidfile(&pidfile).unwrap_err();
        assert!(err.to_string().contains("elasticsearch.9200.pid"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn live_dead_and_unknown_pids() {
        use crate::server::process::tests_helpers::long_cmd;

        let mut sleeper = long_cmd().spawn().unwrap();
        let pid = sleeper.id();
        assert!(pid_alive(pid).unwrap());
        assert!(pid_alive(std::process::id()).unwrap());

        sleeper.kill().unwrap();
        sleeper.wait().unwrap();
        assert!(!pid_alive(pid).unwrap(), "reaped child must be gone");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn unreaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(!pid_alive(pid).unwrap());
        child.wait().unwrap();
    }
}

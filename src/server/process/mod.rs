pub mod error;
pub mod guard;
pub mod kill;
pub mod pid;

pub use error::ProcessError;
pub use guard::ServerProcessGuard;
pub use kill::{force_kill_group, terminate_group};
#[cfg(unix)]
pub use pid::pid_alive;
pub use pid::pid_from_pidfile;

/// Grace period between SIGTERM and SIGKILL. The JVM needs a moment to flush
/// translogs and release its data-dir lock.
const POLITE_WAIT: std::time::Duration = std::time::Duration::from_secs(5);
const POLL_INTERVAL_MS: u64 = 100;
const FORCE_KILL_TIMEOUT_SECS: u64 = 2;

#[cfg(test)]
// Shared test utilities for process management
mod tests_helpers {
    pub fn long_cmd() -> std::process::Command {
        let mut c = std::process::Command::new("sleep");
        c.arg("30");
        c
    }

    /// Ignores SIGTERM, so only the force-kill path can stop it.
    pub fn stubborn_cmd() -> std::process::Command {
        let mut c = std::process::Command::new("sh");
        c.args(["-c", "trap '' TERM; sleep 30 & wait"]);
        c
    }
}

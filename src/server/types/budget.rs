use std::time::Duration;

/// How long [`ProcessExecutor::start`](crate::ProcessExecutor::start) waits
/// for the health endpoint before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct StartupTimeout(pub Duration);

impl Default for StartupTimeout {
    fn default() -> Self {
        StartupTimeout(Duration::from_secs(60))
    }
}

impl From<Duration> for StartupTimeout {
    fn from(value: Duration) -> Self {
        StartupTimeout(value)
    }
}

/// Delay between readiness probes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PollInterval(pub Duration);

impl Default for PollInterval {
    fn default() -> Self {
        PollInterval(Duration::from_millis(100))
    }
}

impl From<Duration> for PollInterval {
    fn from(value: Duration) -> Self {
        PollInterval(value)
    }
}

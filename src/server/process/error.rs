#[derive(serde::Serialize, Debug, thiserror::Error)]
pub enum ProcessError {
    /// OS rejected a spawn, kill, wait or similar operation.
    #[error("failed to {action} process: {source}")]
    CommandFailed {
        action: &'static str,
        #[source]
        #[serde(serialize_with = "crate::error::std_io_error_to_string")]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// We tried an operation the current user is not allowed to perform.
    #[error("insufficient privilege to {action}: {source}")]
    PermissionDenied {
        action: &'static str,
        #[source]
        #[serde(serialize_with = "crate::error::std_io_error_to_string")]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The server has not written its pid-file (yet), or it is empty.
    #[error("no server pid recorded in {pidfile}")]
    NoPidRecorded { pidfile: std::path::PathBuf },

    /// Force-kill window expired; these PIDs remain alive.
    #[error("{operation} exceeded {elapsed:?}; PIDs still running: {leftovers:?}")]
    TerminationTimeout {
        operation: &'static str,
        elapsed: std::time::Duration,
        leftovers: Vec<u32>,
    },
}

impl ProcessError {
    pub(crate) fn from_io(action: &'static str, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => ProcessError::PermissionDenied {
                action,
                source: e.into(),
            },
            _ => ProcessError::CommandFailed {
                action,
                source: e.into(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;

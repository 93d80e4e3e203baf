// top-level error for the public API

use std::time::Duration;

use crate::server::{
    executor::{AbnormalExit, ExecutorState},
    version::{ServerVersion, VersionError},
};

#[derive(serde::Serialize, Debug, thiserror::Error)]
pub enum FixtureError {
    #[error(transparent)]
    Process(#[from] crate::server::process::error::ProcessError),

    #[error(transparent)]
    Client(#[from] crate::server::ipc::error::ClientError),

    /// The binary could not be run, or its banner had no version in it.
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Elasticsearch {version} is not supported; the oldest supported release is {minimum}")]
    UnsupportedVersion {
        version: ServerVersion,
        minimum: ServerVersion,
    },

    #[error("server at {url} was not ready after {elapsed:?} (timeout {timeout:?})")]
    StartupTimeout {
        url: String,
        elapsed: Duration,
        timeout: Duration,
    },

    /// Something already answers on the URL the new server would use.
    #[error("a server is already answering at {url}; refusing to start another on the same port")]
    AlreadyRunning { url: String },

    #[error("server process exited while starting up: {exit}")]
    ExitedDuringStartup { exit: AbnormalExit },

    /// The process reached `Ready` and later exited on its own.
    #[error(transparent)]
    AbnormalExit(#[from] AbnormalExit),

    #[error("cannot {operation} an executor in state {state}")]
    InvalidState {
        operation: &'static str,
        state: ExecutorState,
    },

    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("no free port available for `{spec}`")]
    PortUnavailable { spec: String },

    #[error("{operation} failed for '{path}'")]
    FileSystem {
        operation: &'static str,
        path: std::path::PathBuf,
        #[source]
        #[serde(serialize_with = "std_io_error_to_string")]
        source: std::io::Error,
    },
}

pub type FixtureResult<T> = std::result::Result<T, FixtureError>;

impl FixtureError {
    pub fn file_system(
        operation: &'static str,
        path: impl Into<std::path::PathBuf>,
        err: impl Into<std::io::Error>,
    ) -> Self {
        Self::FileSystem {
            operation,
            path: path.into(),
            source: err.into(),
        }
    }
}

pub(crate) fn std_io_error_to_string<S>(e: &impl std::fmt::Display, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&e.to_string())
}

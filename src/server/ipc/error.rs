#[derive(serde::Serialize, Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    #[serde(serialize_with = "crate::error::std_io_error_to_string")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("serialization error: {0}")]
    #[serde(serialize_with = "crate::error::std_io_error_to_string")]
    Serde(#[from] serde_json::Error),

    /// The server answered with a non-2xx status. `message` is the response
    /// body when there is one (Elasticsearch puts its error object there).
    #[error("remote error {code}: {message}")]
    Remote { code: u16, message: String },

    #[error("client setup error: {reason}")]
    Setup { reason: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

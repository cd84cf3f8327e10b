use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Response body is not valid UTF-8: {0}")]
    InvalidText(String),

    #[error("Transport completion was dropped without a response")]
    CompletionDropped,

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Custom status code reported for this failure when it is surfaced
    /// in place of an HTTP response.
    ///
    /// Always negative so it can never be mistaken for an HTTP status.
    pub fn custom_status_code(&self) -> i32 {
        match self {
            BridgeError::NotAvailable(_) => -1,
            BridgeError::OperationFailed(_) => -2,
            BridgeError::Connection(_) => -3,
            BridgeError::Timeout(_) => -4,
            BridgeError::InvalidText(_) => -5,
            BridgeError::CompletionDropped => -6,
            BridgeError::Codec(_) => -7,
            BridgeError::Io(_) => -8,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

use std::io;
use std::time::Duration;
use thiserror::Error;

/// JSON-RPC error codes
pub mod code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const REQUEST_CANCELLED: i64 = -32800;
}

/// A malformed or unsupported message. Answered with an error response;
/// never ends the session unless the transport itself failed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid header line: {0:?}")]
    InvalidHeader(String),

    #[error("message has no Content-Length header")]
    MissingContentLength,

    #[error("message body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("transport failed: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// JSON-RPC code for the error response
    pub fn code(&self) -> i64 {
        match self {
            ProtocolError::InvalidHeader(_) | ProtocolError::MissingContentLength | ProtocolError::Json(_) => {
                code::PARSE_ERROR
            }
            ProtocolError::InvalidRequest(_) => code::INVALID_REQUEST,
            ProtocolError::MethodNotFound(_) => code::METHOD_NOT_FOUND,
            ProtocolError::Io(_) => code::INTERNAL_ERROR,
        }
    }

    /// The stream can no longer be read
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}

/// Failure of the wrapped language server process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start `{command}`: {source}")]
    Spawn { command: String, source: io::Error },

    #[error("`{command}` has no {stream} pipe")]
    MissingPipe { command: String, stream: &'static str },

    #[error("language server did not answer initialize within {0:?}")]
    StartupTimeout(Duration),

    #[error("language server rejected initialize: {0}")]
    InitializeFailed(String),

    #[error("language server exited")]
    Exited,
}

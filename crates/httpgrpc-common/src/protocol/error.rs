use thiserror::Error;

use super::status::{Code, Status};

#[derive(Error, Debug)]
pub enum HttpgrpcError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Unsupported scheme '{scheme}' in address '{address}'")]
    UnsupportedScheme { scheme: String, address: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Call cancelled")]
    Cancelled,

    #[error("No endpoint available: {0}")]
    Unavailable(String),

    #[error("RPC failed: {0}")]
    Rpc(Status),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Message too large: {size} bytes (max {max} bytes)")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpgrpcError {
    pub fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        HttpgrpcError::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// The canonical status code this error is reported under.
    pub fn code(&self) -> Code {
        match self {
            HttpgrpcError::InvalidAddress { .. }
            | HttpgrpcError::UnsupportedScheme { .. }
            | HttpgrpcError::InvalidRequest(_) => Code::InvalidArgument,
            HttpgrpcError::Timeout(_) => Code::DeadlineExceeded,
            HttpgrpcError::Cancelled => Code::Cancelled,
            HttpgrpcError::Unavailable(_) | HttpgrpcError::Connection(_) => Code::Unavailable,
            HttpgrpcError::Rpc(status) => status.code,
            HttpgrpcError::MessageTooLarge { .. } => Code::ResourceExhausted,
            HttpgrpcError::Serialization(_)
            | HttpgrpcError::JsonSerialization(_)
            | HttpgrpcError::InvalidResponse(_) => Code::DataLoss,
            HttpgrpcError::Transport(_) | HttpgrpcError::Http(_) | HttpgrpcError::Io(_) => {
                Code::Unknown
            }
        }
    }

    /// Configuration-time failures; fatal to client construction.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            HttpgrpcError::InvalidAddress { .. } | HttpgrpcError::UnsupportedScheme { .. }
        )
    }
}

impl From<std::net::AddrParseError> for HttpgrpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        HttpgrpcError::InvalidRequest(err.to_string())
    }
}

impl From<http::uri::InvalidUri> for HttpgrpcError {
    fn from(err: http::uri::InvalidUri) -> Self {
        HttpgrpcError::InvalidRequest(err.to_string())
    }
}

impl From<http::method::InvalidMethod> for HttpgrpcError {
    fn from(err: http::method::InvalidMethod) -> Self {
        HttpgrpcError::InvalidRequest(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for HttpgrpcError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        HttpgrpcError::InvalidRequest(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for HttpgrpcError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        HttpgrpcError::InvalidRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HttpgrpcError>;

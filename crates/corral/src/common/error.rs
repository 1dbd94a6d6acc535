use thiserror::Error;

use crate::resources::ResourceError;

#[derive(Debug, Error)]
pub enum CorralError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Resource error: {0}")]
    ResourceError(#[from] ResourceError),
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<serde_json::error::Error> for CorralError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<bincode::Error> for CorralError {
    fn from(e: bincode::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<String> for CorralError {
    fn from(e: String) -> Self {
        Self::GenericError(e)
    }
}

impl From<&str> for CorralError {
    fn from(e: &str) -> Self {
        Self::GenericError(e.to_string())
    }
}

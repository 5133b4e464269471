//! Error types for pagecheck

use thiserror::Error;

/// Result type alias using pagecheck Error
pub type Result<T> = std::result::Result<T, Error>;

/// pagecheck error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported selector: {0}")]
    UnsupportedSelector(String),

    #[error("Invalid XPath: {0}")]
    InvalidXPath(String),

    #[error("Node not found: {0}")]
    NodeNotFound(usize),

    #[error("Node {0} is not an element")]
    NotAnElement(usize),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid DOM operation: {0}")]
    InvalidOperation(String),
}

//! Error types for room peeking

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for room storage and output stream operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Classification of a failed perform call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformErrorCode {
    /// Malformed identifiers, foreign users, bad reference shapes
    BadRequest,
    /// The room's policy rejects the action
    NotAllowed,
    /// A collaborator failed, or the alias could not be resolved
    Internal,
}

impl PerformErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformErrorCode::BadRequest => "bad_request",
            PerformErrorCode::NotAllowed => "not_allowed",
            PerformErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for PerformErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only error type that crosses the room server boundary
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {msg}")]
pub struct PerformError {
    pub code: PerformErrorCode,
    pub msg: String,
}

impl PerformError {
    pub fn new(code: PerformErrorCode, msg: impl Into<String>) -> Self {
        Self { code, msg: msg.into() }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(PerformErrorCode::BadRequest, msg)
    }

    pub fn not_allowed(msg: impl Into<String>) -> Self {
        Self::new(PerformErrorCode::NotAllowed, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(PerformErrorCode::Internal, msg)
    }
}

/// Errors raised by the room database and the output stream
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure (SQL, pool, I/O)
    #[error("Storage error: {0}")]
    Backend(String),

    /// Stored content could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Output stream refused or lost the append
    #[error("Output stream error: {0}")]
    Output(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Backend(format!("connection pool: {}", e))
    }
}

/// Errors raised by the directory lookup collaborator
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The target server could not be reached or has no directory
    #[error("Server {0} is unreachable")]
    Unreachable(String),

    /// The target server answered with an error
    #[error("Directory lookup rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PerformError::not_allowed("Room is not world-readable");
        assert_eq!(err.to_string(), "not_allowed: Room is not world-readable");
        assert_eq!(err.code, PerformErrorCode::NotAllowed);
    }

    #[test]
    fn test_error_conversions() {
        let json_err = serde_json::from_slice::<String>(b"{").unwrap_err();
        let store_err: StoreError = json_err.into();
        assert!(matches!(store_err, StoreError::Decode(_)));
    }

    #[test]
    fn test_error_serializes_code() {
        let err = PerformError::bad_request("nope");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "bad_request");
        assert_eq!(json["msg"], "nope");
    }
}

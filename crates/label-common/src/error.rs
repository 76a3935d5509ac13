//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised outside the reconciliation pipeline proper:
/// configuration, reading delivery events and rendering command output.
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown folder: {0}")]
    UnknownFolder(String),
}

impl CommonError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(raw)?)
    }

    #[test]
    fn test_conversions() {
        assert!(matches!(parse("{oops"), Err(CommonError::Serialization(_))));

        let io: CommonError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(io.to_string().starts_with("IO error"));

        assert_eq!(
            CommonError::config("LABELS_BUCKET cannot be empty").to_string(),
            "Configuration error: LABELS_BUCKET cannot be empty"
        );
    }
}

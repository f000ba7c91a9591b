//! Error types for datasift

use thiserror::Error;

/// Result type alias using DataSiftError
pub type Result<T> = std::result::Result<T, DataSiftError>;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
    pub const STORAGE_UNAVAILABLE: i32 = 4;
}

/// Main error type for datasift
#[derive(Debug, Error)]
pub enum DataSiftError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote NLU call failed (network, auth, missing configuration)
    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    /// Remote NLU answered with something that is not a JSON object
    #[error("Extraction parse error: {message}")]
    ExtractionParse { message: String, raw: String },

    /// Structured filter does not fit the dataset schema
    #[error("Invalid filter field '{field}': {reason}")]
    QueryMapping { field: String, reason: String },

    /// Backing store missing or unreadable
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),
}

impl DataSiftError {
    pub fn query_mapping(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueryMapping {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Errors caused by the request rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::QueryMapping { .. } | Self::InvalidInput(_) | Self::NotFound(_)
        )
    }

    /// Errors during remote extraction, recovered by the heuristic fallback
    pub fn is_extraction_error(&self) -> bool {
        matches!(
            self,
            Self::ExtractionUnavailable(_) | Self::ExtractionParse { .. }
        )
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) => exit_codes::NOT_FOUND,
            Self::QueryMapping { .. } | Self::InvalidInput(_) | Self::Config(_) => {
                exit_codes::INVALID_INPUT
            }
            Self::StorageUnavailable(_) => exit_codes::STORAGE_UNAVAILABLE,
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_mapping_names_field() {
        let err = DataSiftError::query_mapping("min_score", "expected integer");
        assert!(err.to_string().contains("min_score"));
        assert!(err.is_client_error());
        assert_eq!(err.exit_code(), exit_codes::INVALID_INPUT);
    }

    #[test]
    fn test_storage_unavailable_is_server_error() {
        let err = DataSiftError::StorageUnavailable("missing".to_string());
        assert!(!err.is_client_error());
        assert_eq!(err.exit_code(), exit_codes::STORAGE_UNAVAILABLE);
    }

    #[test]
    fn test_extraction_errors() {
        let err = DataSiftError::ExtractionParse {
            message: "expected value".to_string(),
            raw: "not json".to_string(),
        };
        assert!(err.is_extraction_error());
        assert!(!DataSiftError::Llm("x".to_string()).is_extraction_error());
    }
}

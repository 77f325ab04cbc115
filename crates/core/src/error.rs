use thiserror::Error;

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur while analysing key usage
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The JSON document could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A source unit could not be parsed
    #[error("Parse error in {unit}: {message}")]
    ParseError { unit: String, message: String },

    /// Offset slicing could not be performed in code-unit space
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A key path contained an empty segment
    #[error("Invalid key path: {0:?}")]
    InvalidKeyPath(String),

    /// Tree-sitter error
    #[error("Tree-sitter error: {0}")]
    TreeSitterError(String),
}

impl AnalysisError {
    /// Create a parse error for a source unit
    pub fn parse(unit: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ParseError {
            unit: unit.into(),
            message: msg.into(),
        }
    }

    /// Create an encoding error
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::EncodingError(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a tree-sitter error
    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitterError(msg.into())
    }
}

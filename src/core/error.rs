use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Malformed input at {path}: {reason}")]
    MalformedInput { path: String, reason: String },

    #[error("Unknown field '{field}' at {path}")]
    UnknownField { path: String, field: String },

    #[error("Unsupported condition operator: {0}")]
    UnsupportedOperator(String),

    #[error("Document has not passed validation ({errors} error finding(s))")]
    NotValidated { errors: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PolicyError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PolicyError::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;

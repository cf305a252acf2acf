use thiserror::Error;

/// Failure classes that the remote retry loop treats as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// The remote quota is exhausted; needs a long cool-down.
    Quota,
    /// The remote service is temporarily overloaded.
    Overload,
}

#[derive(Error, Debug)]
pub enum StatementImportError {
    #[error("Remote extraction quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Remote extraction service overloaded: {0}")]
    Overloaded(String),

    #[error("Remote extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("The statement is too large or complex to process in one pass ({details}). Split the file into smaller parts and import them separately.")]
    ResponseTooComplex { details: String },

    #[error("Unsupported document '{name}' ({mime_type}): {reason}")]
    UnsupportedDocument {
        name: String,
        mime_type: String,
        reason: String,
    },

    #[error("No remote extractor is attached, but extraction mode requires one")]
    RemoteExtractorMissing,

    #[error("Transaction {0} is not flagged as a duplicate and cannot be removed")]
    NotADuplicate(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Company '{0}' is already registered")]
    AlreadyExists(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("PDF error: {0}")]
    PdfError(#[from] lopdf::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl StatementImportError {
    /// Which backoff schedule, if any, applies to this failure.
    pub fn retry_class(&self) -> Option<RetryClass> {
        match self {
            Self::QuotaExhausted(_) => Some(RetryClass::Quota),
            Self::Overloaded(_) => Some(RetryClass::Overload),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StatementImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_class_routing() {
        assert_eq!(
            StatementImportError::QuotaExhausted("429".into()).retry_class(),
            Some(RetryClass::Quota)
        );
        assert_eq!(
            StatementImportError::Overloaded("503".into()).retry_class(),
            Some(RetryClass::Overload)
        );
        assert_eq!(
            StatementImportError::ExtractionFailed("400".into()).retry_class(),
            None
        );
    }

    #[test]
    fn test_too_complex_message_is_actionable() {
        let err = StatementImportError::ResponseTooComplex {
            details: "EOF while parsing".to_string(),
        };
        assert!(err.to_string().contains("Split the file"));
    }
}

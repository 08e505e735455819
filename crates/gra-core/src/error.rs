use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("artifact not found: {reference}")]
    ArtifactNotFound { reference: String },
    #[error("artifact source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("artifact decode failed: {0}")]
    Decode(String),
}

use uuid::Uuid;

/// Error taxonomy for the collection subsystem.
///
/// Variants are deliberately closed so call sites can match on the
/// taxonomy (store vs. invalid input vs. collaborator failure) instead of
/// inspecting a message string.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("unknown timestamp field: {0}")]
    UnknownField(String),

    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("precondition violation: {0}")]
    Precondition(String),

    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CollectorError>;

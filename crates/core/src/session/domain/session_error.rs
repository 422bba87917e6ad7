/// Failures surfaced by session-scoped operations.
///
/// Each variant maps onto an HTTP-style status so an outer surface can
/// report it without inspecting messages.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Missing or malformed input. Nothing was touched.
    #[error("{0}")]
    Validation(String),

    /// The referenced session, group or image does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The target name or path is already taken.
    #[error("{0}")]
    Conflict(String),

    /// Ingest failed; the partial session has already been removed.
    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Processing(_) | Self::Io(_) => 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CineError {
    #[error("Invalid CINE file: {0}")]
    InvalidFormat(String),

    #[error("Truncated CINE file: {requested} frames requested, {available} present")]
    Truncated { requested: usize, available: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CineError::InvalidFormat(msg.into())
    }
}

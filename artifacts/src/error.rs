use std::io;

use crate::store::ArtifactKind;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Invalid artifact: {0}")]
    InvalidFormat(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Missing {kind} artifact for {name}")]
    MissingInput { name: String, kind: ArtifactKind },

    #[error("Encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ArtifactError {
    /// Filesystem hiccups that are worth one more attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ArtifactError::Io(e) => is_transient_io(e),
            _ => false,
        }
    }

    /// Read side of bincode: short or garbled input means a corrupt artifact.
    pub(crate) fn decode(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(e) if e.kind() != io::ErrorKind::UnexpectedEof => ArtifactError::Io(e),
            other => ArtifactError::InvalidFormat(other.to_string()),
        }
    }

    pub(crate) fn truncated(e: io::Error, what: &str) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ArtifactError::InvalidFormat(format!("{what} ends early"))
        } else {
            ArtifactError::Io(e)
        }
    }
}

/// Filesystem errors that may go away when the operation is repeated.
pub fn is_transient_io(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Other
    )
}

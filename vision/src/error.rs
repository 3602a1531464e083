use artifacts::ArtifactError;

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("OpenCV: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

pub type Result<T> = std::result::Result<T, VisionError>;

pub(crate) fn check_dims(what: &str, expected: (usize, usize), found: (usize, usize)) -> Result<()> {
    if expected != found {
        return Err(VisionError::ShapeMismatch(format!(
            "{what} is {}x{} but frames are {}x{}",
            found.0, found.1, expected.0, expected.1
        )));
    }
    Ok(())
}

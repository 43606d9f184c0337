use serde::Serialize;
use thiserror::Error;

pub type RecResult<T> = Result<T, RecError>;

#[derive(Error, Debug)]
pub enum RecError {
    /// Malformed table or missing required column. Raised before any training starts.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Non-finite parameters after a training run.
    #[error("Training diverged: {0}")]
    TrainingDiverged(String),

    /// Unreadable, truncated or version-mismatched model artifact.
    #[error("Corrupt model artifact: {0}")]
    CorruptArtifact(String),

    /// The excluded (favorite) item is not part of the candidate catalog.
    #[error("Favorite item not found in catalog: {0}")]
    UnknownFavorite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error kinds for callers that translate failures into responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    TrainingDiverged,
    CorruptArtifact,
    UnknownFavorite,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::TrainingDiverged => "training_diverged",
            ErrorKind::CorruptArtifact => "corrupt_artifact",
            ErrorKind::UnknownFavorite => "unknown_favorite",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

impl RecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecError::InvalidInput(_) => ErrorKind::InvalidInput,
            RecError::TrainingDiverged(_) => ErrorKind::TrainingDiverged,
            RecError::CorruptArtifact(_) => ErrorKind::CorruptArtifact,
            RecError::UnknownFavorite(_) => ErrorKind::UnknownFavorite,
            RecError::Config(_) => ErrorKind::Config,
            RecError::Io(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = RecError::UnknownFavorite("dune".to_string());
        assert_eq!(err.kind(), ErrorKind::UnknownFavorite);
        assert_eq!(err.kind().as_str(), "unknown_favorite");

        let err: RecError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_display_includes_detail() {
        let err = RecError::CorruptArtifact("format_version 9".to_string());
        assert_eq!(err.to_string(), "Corrupt model artifact: format_version 9");
    }
}

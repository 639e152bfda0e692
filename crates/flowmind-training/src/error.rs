use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    /// Failure reported by the backend itself, with the backend's own classification.
    #[error("{kind}: {message}")]
    Backend { kind: String, message: String },

    #[error("trainer process error: {0}")]
    Process(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("trainer panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TrainingError {
    pub fn backend(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend { kind: kind.into(), message: message.into() }
    }

    /// Short classification of the failure, e.g. `RuntimeError` or `IoError`.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Backend { kind, .. } => kind,
            Self::Process(_) => "ProcessError",
            Self::Artifact(_) => "ArtifactError",
            Self::Panic(_) => "Panic",
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
        }
    }

    /// The failure message without its classification.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Backend { message, .. } => message.clone(),
            Self::Process(msg) | Self::Artifact(msg) | Self::Panic(msg) => msg.clone(),
            Self::Io(e) => e.to_string(),
            Self::Json(e) => e.to_string(),
        }
    }

    /// `"<kind>: <message>"`, the form reported to callers.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}: {}", self.kind(), self.message())
    }
}

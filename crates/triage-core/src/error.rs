use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("already in the desired state: {0}")]
    AlreadyInState(String),

    #[error("no reviewers to assign: {0}")]
    NoReviewer(String),

    #[error("target is not open: {0}")]
    NotOpen(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid config syntax:\n{0}")]
    InvalidConfig(String),

    #[error("invalid behavior '{value}' for {key}")]
    InvalidBehavior { key: String, value: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidSetting { key: String, value: String },

    #[error("too many comments in a row by the same login: {0}")]
    TooManyComments(u64),

    #[error("notifications sent through a webhook cannot mention users")]
    MentionsUnsupported,

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("expression error: {0}")]
    Expression(String),

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("chat error: {0}")]
    Chat(String),

    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid event payload: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TriageError {
    /// Outcomes that end a phase without counting as a failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::AlreadyInState(_) | Self::NoReviewer(_))
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;

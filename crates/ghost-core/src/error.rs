//! Error types for the Ghost engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("session busy: {session_id}")]
    Busy { session_id: String },

    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    #[error("logic error: {0}")]
    Logic(String),

    #[error("operator chain exceeded {limit} steps")]
    OperatorDepthExceeded { limit: usize },

    #[error("stage error: {think}#{stage} - {message}")]
    Stage {
        think: String,
        stage: String,
        message: String,
    },

    #[error("mindset not found: {think}{}", stage_suffix(.stage))]
    MindsetNotFound { think: String, stage: Option<String> },

    #[error("lock lost: {key}")]
    LockLost { key: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn stage_suffix(stage: &Option<String>) -> String {
    stage.as_ref().map(|s| format!("#{}", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by the scheduler to pick the user-visible reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Busy,
    Bootstrap,
    Logic,
    Stage,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Bootstrap => "bootstrap",
            Self::Logic => "logic",
            Self::Stage => "stage",
            Self::Storage => "storage",
        }
    }
}

impl Error {
    pub fn busy(session_id: impl Into<String>) -> Self {
        Self::Busy {
            session_id: session_id.into(),
        }
    }

    pub fn bootstrap(message: impl Into<String>) -> Self {
        Self::Bootstrap(message.into())
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    pub fn stage(
        think: impl Into<String>,
        stage: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Stage {
            think: think.into(),
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn think_not_found(think: impl Into<String>) -> Self {
        Self::MindsetNotFound {
            think: think.into(),
            stage: None,
        }
    }

    pub fn stage_not_found(think: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::MindsetNotFound {
            think: think.into(),
            stage: Some(stage.into()),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Busy { .. } => ErrorKind::Busy,
            Self::Bootstrap(_) => ErrorKind::Bootstrap,
            Self::Logic(_) | Self::OperatorDepthExceeded { .. } => ErrorKind::Logic,
            Self::Stage { .. } | Self::MindsetNotFound { .. } => ErrorKind::Stage,
            Self::LockLost { .. } | Self::Cache(_) | Self::Json(_) | Self::Io(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Stage-level errors are turned into `OnFailed` events by the kernel.
    /// Everything else aborts the turn.
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::Stage
    }

    /// Render the error and its sources, at most `limit` frames deep.
    pub fn traceback(&self, limit: usize) -> Vec<String> {
        let mut frames = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            if frames.len() >= limit.max(1) {
                break;
            }
            frames.push(err.to_string());
            source = err.source();
        }
        frames
    }
}

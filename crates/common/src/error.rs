//! Error types shared across SeqSynth crates.

/// Top-level error type for SeqSynth operations.
///
/// Every failure of a render run ends up as one of these variants and is
/// surfaced exactly once through the run's completion event.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Rendering already in progress")]
    AlreadyRunning,

    #[error("Invalid timeline: {message}")]
    InvalidTimeline { message: String },

    #[error("No rendering targets selected")]
    NoTargetsSelected,

    #[error("Could not load the pipeline configuration: {message}")]
    ConfigLoadFailed { message: String },

    #[error("Render job subsystem is not available")]
    JobSubsystemUnavailable,

    #[error("Could not set up the render job queue: {message}")]
    QueueSetupFailed { message: String },

    #[error("Could not start the rendering of the {target} target: {message}")]
    JobSubmissionFailed { target: String, message: String },

    #[error("Failed while preparing the rendering of the {target} target: {message}")]
    PrepareHookFailed { target: String, message: String },

    #[error("Failed while finalizing the rendering of the {target} target: {message}")]
    FinalizeHookFailed { target: String, message: String },

    #[error("Failed while rendering the {target} target: {message}")]
    JobFailed { target: String, message: String },

    #[error("Rendering of the {target} target was cancelled")]
    Cancelled { target: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using RenderError.
pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    pub fn invalid_timeline(msg: impl Into<String>) -> Self {
        Self::InvalidTimeline {
            message: msg.into(),
        }
    }

    pub fn config_load(msg: impl Into<String>) -> Self {
        Self::ConfigLoadFailed {
            message: msg.into(),
        }
    }

    pub fn queue_setup(msg: impl Into<String>) -> Self {
        Self::QueueSetupFailed {
            message: msg.into(),
        }
    }

    pub fn job_submission(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::JobSubmissionFailed {
            target: target.into(),
            message: msg.into(),
        }
    }

    pub fn prepare(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::PrepareHookFailed {
            target: target.into(),
            message: msg.into(),
        }
    }

    pub fn finalize(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::FinalizeHookFailed {
            target: target.into(),
            message: msg.into(),
        }
    }

    pub fn job_failed(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::JobFailed {
            target: target.into(),
            message: msg.into(),
        }
    }

    pub fn cancelled(target: impl Into<String>) -> Self {
        Self::Cancelled {
            target: target.into(),
        }
    }

    /// Whether this failure may have left the shared timeline mutated.
    pub fn leaves_scene_mutated(&self) -> bool {
        matches!(self, Self::FinalizeHookFailed { .. })
    }
}

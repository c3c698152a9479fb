// THEORY:
// Every fallible step of the detector reports through a single `DetectorError`.
// Construction problems (no trees, malformed trees, bad tunables) abort
// construction. Stage problems (a kernel or transfer failing, a stage handing
// back a buffer of the wrong shape) abort only the current frame. A frame in
// which nothing survives filtering is NOT an error; it simply produces an empty
// blob table.

use crate::core_modules::body_part::Label;

/// Identifies which external stage of the per-frame pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classifier,
    Smoother,
    ComponentLabeler,
    RelationBuilder,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Classifier => "classifier",
            Stage::Smoother => "smoother",
            Stage::ComponentLabeler => "component labeler",
            Stage::RelationBuilder => "relation builder",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("at least one decision tree source is required")]
    EmptyEnsemble,

    #[error("tree source {index} failed to load: {message}")]
    Source { index: usize, message: String },

    #[error("tree {index} is malformed: {reason}")]
    MalformedTree { index: usize, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid resolution {rows}x{cols}")]
    InvalidResolution { rows: usize, cols: usize },

    #[error("dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("{stage} failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("label {label} at pixel {index} is outside the body-part range")]
    LabelOutOfRange { label: Label, index: usize },

    #[error("detector service is no longer running")]
    ServiceClosed,

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl DetectorError {
    /// Shorthand used by stage implementations to report a kernel failure.
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        DetectorError::Stage {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;

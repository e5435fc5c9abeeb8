use thiserror::Error;

use crate::lifecycle::Stage;
use crate::table::validate::ValidationReport;

/// Errors surfaced by the classification core.
///
/// Malformed address or port tokens are deliberately absent from this list:
/// the overlap engine skips them and treats them as "no overlap".
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(ValidationReport),

    #[error("not found: {what}")]
    Lookup { what: String },

    #[error("rule '{rule}' cannot move from {from} to {to}: only downward moves are analyzed")]
    UnsupportedDirection { rule: String, from: u32, to: u32 },

    #[error("rule '{rule}' is not an allow rule")]
    NotAllowRule { rule: String },

    #[error("stage {stage} requires completed stages: {}", join_stages(.missing))]
    StageOrder { stage: Stage, missing: Vec<Stage> },

    #[error("stage {stage} failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("sync for '{target}' rejected: {message}")]
    Sync { target: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn lookup(what: impl Into<String>) -> Self {
        Self::Lookup { what: what.into() }
    }

    /// Wraps `self` as the failure of `stage`. Ordering errors pass through.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Error::StageOrder { .. } | Error::StageFailed { .. } => self,
            other => Error::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }
}

fn join_stages(stages: &[Stage]) -> String {
    stages
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

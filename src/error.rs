//! Error taxonomy for the experiment engine.
//!
//! Criterion-not-met and operator abort are *outcomes* (see
//! [`crate::types::PhaseResult`]), not errors; everything here either
//! stops the session or, for [`ExperimentError::NotFound`], signals the
//! caller to create fresh state.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ParticipantId, Phase};

/// Errors surfaced by the store, generator, sequencer, and orchestrator.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// No persisted record for this participant. Recoverable: triggers
    /// rule generation on the load-or-create path.
    #[error("no persisted state for participant {participant_id}")]
    NotFound { participant_id: ParticipantId },

    /// A record for this participant exists with different contents.
    /// Never auto-resolved: overwriting would silently change the rule
    /// mid-study.
    #[error(
        "persisted state for participant {participant_id} already exists \
         with different contents ({path}); refusing to overwrite"
    )]
    AlreadyExists {
        participant_id: ParticipantId,
        path: PathBuf,
    },

    /// A phase's stimulus pool is smaller than the number of object slots.
    #[error("stimulus pool for {phase} has {available} entries, need {needed}")]
    InsufficientStimuli {
        phase: Phase,
        needed: usize,
        available: usize,
    },

    /// A later phase was requested before an earlier one completed.
    #[error(
        "cannot run {requested} for participant {participant_id}: \
         no completion record for prerequisite {missing}"
    )]
    PrerequisiteNotCompleted {
        participant_id: ParticipantId,
        requested: Phase,
        missing: Phase,
    },

    /// Propagated from the display layer (missing asset, closed window).
    #[error("presentation failure: {0}")]
    Presentation(String),

    /// A persisted record exists but cannot be parsed.
    #[error("malformed record at {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExperimentError>;

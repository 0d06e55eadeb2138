//! Shared run configuration for the library and the CLI binary.
//!
//! Consolidates the `UNSCRAMBLE_DATA_PATH` and `UNSCRAMBLE_SEED`
//! environment reads with the timing, sequencing, and criterion
//! parameters of the task.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    CHOICE_TIME_LIMIT_MS, DEFAULT_CRITERION, DEFAULT_CRITERION_WINDOW, DEFAULT_MAX_ATTEMPTS,
    ISI_MS, ITI_MS, N_OBJECTS, OBJECT_DURATION_MS, PROBE_ALONE_MS, QUIZ_TRIALS_PER_BLOCK,
    REST_DURATION_SECS, STUDY_SWEEPS_PER_BLOCK,
};
use crate::types::{RuleMode, ScramblingConstraint};

/// Everything a session needs beyond the persisted rule itself.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Shared canonical rule vs one rule per participant.
    pub rule_mode: RuleMode,
    /// Structural constraint the permutation must satisfy.
    pub constraint: ScramblingConstraint,
    /// Number of object slots; must be even.
    pub n_objects: usize,
    /// Base seed all participant seeds are derived from.
    pub base_seed: u64,
    /// Root directory for persisted rules and behavior logs.
    pub data_dir: PathBuf,

    pub object_duration: Duration,
    pub isi: Duration,
    pub iti: Duration,
    pub probe_alone: Duration,
    /// Response window for applied-learning queries. Training and
    /// structure-learning quizzes are untimed.
    pub choice_time_limit: Duration,
    pub rest_duration: Duration,

    /// Scrambled study sweeps per sequence per block.
    pub study_sweeps: usize,
    /// Quiz trials per training / structure-learning block.
    pub quiz_trials_per_block: usize,
    /// Rolling accuracy required to leave the criterion loop.
    pub criterion: f64,
    /// Trailing quiz trials the criterion is evaluated over.
    pub criterion_window: usize,
    /// Blocks to attempt before completing with criterion-not-met.
    pub max_attempts: u32,

    /// Run a phase without its prerequisites' completion records.
    /// Testing affordance; never the default.
    pub allow_skip_prerequisites: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            rule_mode: RuleMode::PerParticipant,
            constraint: ScramblingConstraint::Alternating,
            n_objects: N_OBJECTS,
            base_seed: 0,
            data_dir: PathBuf::from("data"),
            object_duration: Duration::from_millis(OBJECT_DURATION_MS),
            isi: Duration::from_millis(ISI_MS),
            iti: Duration::from_millis(ITI_MS),
            probe_alone: Duration::from_millis(PROBE_ALONE_MS),
            choice_time_limit: Duration::from_millis(CHOICE_TIME_LIMIT_MS),
            rest_duration: Duration::from_secs(REST_DURATION_SECS),
            study_sweeps: STUDY_SWEEPS_PER_BLOCK,
            quiz_trials_per_block: QUIZ_TRIALS_PER_BLOCK,
            criterion: DEFAULT_CRITERION,
            criterion_window: DEFAULT_CRITERION_WINDOW,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            allow_skip_prerequisites: false,
        }
    }
}

impl ExperimentConfig {
    /// Defaults with `UNSCRAMBLE_DATA_PATH` and `UNSCRAMBLE_SEED` applied.
    pub fn from_env() -> Self {
        let mut config = ExperimentConfig::default();
        if let Ok(path) = std::env::var("UNSCRAMBLE_DATA_PATH") {
            config.data_dir = PathBuf::from(path);
        }
        if let Some(seed) = std::env::var("UNSCRAMBLE_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.base_seed = seed;
        }
        config
    }

    /// Directory holding one rule record per participant.
    pub fn rules_dir(&self) -> PathBuf {
        self.data_dir.join("rules")
    }

    /// Directory holding the append-only behavior logs.
    pub fn behavior_dir(&self) -> PathBuf {
        self.data_dir.join("behavior")
    }

    /// Slots per true sequence.
    pub fn seq_len(&self) -> usize {
        self.n_objects / 2
    }
}

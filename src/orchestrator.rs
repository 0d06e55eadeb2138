//! Top-level session driver: resolve participant state, enforce phase
//! ordering, run phase controllers, and record completions.

use std::str::FromStr;

use chrono::Utc;
use tracing::info;

use crate::config::ExperimentConfig;
use crate::controller::PhaseController;
use crate::error::{ExperimentError, Result};
use crate::presentation::Presentation;
use crate::results::ResultsLog;
use crate::store::{CompletionRecord, PermutationStore};
use crate::types::{ParticipantId, Phase, PhaseResult};

/// What a single invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Phase(Phase),
    /// Day 1: training then structure learning.
    Session1,
    /// Day 2: applied learning.
    Session2,
    All,
}

impl Selector {
    /// Phases this selector runs, in fixed order.
    pub fn phases(self) -> Vec<Phase> {
        match self {
            Selector::Phase(p) => vec![p],
            Selector::Session1 => vec![Phase::Training, Phase::StructureLearning],
            Selector::Session2 => vec![Phase::AppliedLearning],
            Selector::All => Phase::ALL.to_vec(),
        }
    }
}

impl FromStr for Selector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "training" => Ok(Selector::Phase(Phase::Training)),
            "structure-learning" | "structure_learning" => {
                Ok(Selector::Phase(Phase::StructureLearning))
            }
            "applied-learning" | "applied_learning" => {
                Ok(Selector::Phase(Phase::AppliedLearning))
            }
            "session1" => Ok(Selector::Session1),
            "session2" => Ok(Selector::Session2),
            "all" => Ok(Selector::All),
            other => Err(format!(
                "unknown selector '{other}' (expected training, structure-learning, \
                 applied-learning, session1, session2, or all)"
            )),
        }
    }
}

/// Drives sessions for one configured experiment.
pub struct SessionOrchestrator {
    config: ExperimentConfig,
    store: PermutationStore,
}

impl SessionOrchestrator {
    pub fn new(config: ExperimentConfig) -> Self {
        let store = PermutationStore::new(config.rules_dir());
        SessionOrchestrator { config, store }
    }

    pub fn store(&self) -> &PermutationStore {
        &self.store
    }

    /// Run the selected phase(s) for a participant.
    ///
    /// Loads the participant's rule record, generating it on first
    /// contact; later invocations for the same ID reuse the identical
    /// permutation and assignments. Stops early (without error) when a
    /// phase is aborted; fails with `PrerequisiteNotCompleted` when a
    /// phase's predecessors lack completion records.
    pub fn run(
        &self,
        participant_id: ParticipantId,
        selector: Selector,
        presentation: &mut dyn Presentation,
    ) -> Result<Vec<PhaseResult>> {
        let (state, created) = self.store.load_or_create(&self.config, participant_id)?;
        info!(
            participant_id,
            created,
            permutation = ?state.permutation.0,
            "resolved participant state"
        );

        let mut results = Vec::new();
        for phase in selector.phases() {
            self.check_prerequisites(participant_id, phase)?;

            let mut log =
                ResultsLog::create(&self.config.behavior_dir(), participant_id, phase)?;
            let mut controller = PhaseController::new(&state, &self.config, phase);
            let result = controller.run(presentation, &mut log)?;

            if result.completed() {
                self.store.record_completion(
                    participant_id,
                    phase,
                    CompletionRecord {
                        completed_at: Utc::now(),
                        criterion_met: result.criterion_met,
                        blocks_run: result.blocks_run,
                    },
                )?;
            }
            let stop = !result.completed();
            results.push(result);
            if stop {
                break;
            }
        }
        Ok(results)
    }

    fn check_prerequisites(&self, participant_id: ParticipantId, phase: Phase) -> Result<()> {
        if self.config.allow_skip_prerequisites {
            return Ok(());
        }
        for &prereq in phase.prerequisites() {
            if !self.store.is_completed(participant_id, prereq)? {
                return Err(ExperimentError::PrerequisiteNotCompleted {
                    participant_id,
                    requested: phase,
                    missing: prereq,
                });
            }
        }
        Ok(())
    }
}

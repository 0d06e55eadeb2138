//! Per-phase state machine: drives trial blocks through the presentation
//! interface, evaluates the repeat-until-criterion loop, and aggregates
//! the phase outcome.
//!
//! States: `Instructions → RunningTrials ⇄ CriterionCheck → Rest (applied
//! only) → QueryTrials → Complete`. `Complete` is terminal. An operator
//! abort observed at a trial boundary, or a presentation failure
//! mid-trial, short-circuits to `Complete` with whatever partial results
//! have accumulated; the persisted rule record is never touched from
//! here, so nothing durable can be corrupted.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::error::{ExperimentError, Result};
use crate::presentation::{Presentation, ResponseOutcome, ResponseRequest, SequenceTiming};
use crate::results::ResultsLog;
use crate::sequencer::TrialSequencer;
use crate::types::{
    AbortReason, ExpectedResponse, PersistedState, Phase, PhaseResult, Trial, TrialRecord,
};

/// Controller states. `Rest` and `QueryTrials` are reached only by the
/// applied-learning phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseState {
    Instructions,
    RunningTrials,
    CriterionCheck,
    Rest,
    QueryTrials,
    Complete,
}

/// Runs one phase for one participant.
pub struct PhaseController<'a> {
    phase: Phase,
    config: &'a ExperimentConfig,
    sequencer: TrialSequencer<'a>,
    participant_id: crate::types::ParticipantId,

    state: PhaseState,
    blocks_run: u32,
    trial_counter: usize,
    quiz_outcomes: Vec<bool>,
    reaction_times_ms: Vec<u64>,
    criterion_met: bool,
    abort: Option<AbortReason>,
}

impl<'a> PhaseController<'a> {
    pub fn new(
        persisted: &'a PersistedState,
        config: &'a ExperimentConfig,
        phase: Phase,
    ) -> Self {
        PhaseController {
            phase,
            config,
            sequencer: TrialSequencer::new(persisted, config),
            participant_id: persisted.participant_id,
            state: PhaseState::Instructions,
            blocks_run: 0,
            trial_counter: 0,
            quiz_outcomes: Vec::new(),
            reaction_times_ms: Vec::new(),
            criterion_met: false,
            abort: None,
        }
    }

    /// Drive the phase to `Complete` and return its result.
    pub fn run(
        &mut self,
        presentation: &mut dyn Presentation,
        log: &mut ResultsLog,
    ) -> Result<PhaseResult> {
        while self.state != PhaseState::Complete {
            debug!(phase = %self.phase, state = ?self.state, "phase state");
            match self.state {
                PhaseState::Instructions => {
                    if presentation.abort_requested() {
                        self.abort_with(AbortReason::OperatorRequest);
                        continue;
                    }
                    if let Err(e) = presentation.show_instructions(instructions(self.phase)) {
                        self.presentation_failed(e);
                        continue;
                    }
                    self.state = PhaseState::RunningTrials;
                }
                PhaseState::RunningTrials => {
                    let block = self.sequencer.running_block(self.phase, self.blocks_run)?;
                    let block_ix = self.blocks_run;
                    self.blocks_run += 1;
                    self.run_trials(&block, block_ix, presentation, log)?;
                    if self.state != PhaseState::Complete {
                        self.state = PhaseState::CriterionCheck;
                    }
                }
                PhaseState::CriterionCheck => self.check_criterion(),
                PhaseState::Rest => {
                    // Input during rest is swallowed by the presentation
                    // layer; nothing is polled or recorded here.
                    if let Err(e) = presentation.present_rest_interval(self.config.rest_duration) {
                        self.presentation_failed(e);
                        continue;
                    }
                    self.state = PhaseState::QueryTrials;
                }
                PhaseState::QueryTrials => {
                    let queries = self.sequencer.applied_queries()?;
                    let block_ix = self.blocks_run;
                    self.run_trials(&queries, block_ix, presentation, log)?;
                    if self.state != PhaseState::Complete {
                        self.state = PhaseState::Complete;
                    }
                }
                PhaseState::Complete => unreachable!(),
            }
        }

        let quiz_trials = self.quiz_outcomes.len();
        let quiz_correct = self.quiz_outcomes.iter().filter(|&&c| c).count();
        let result = PhaseResult {
            participant_id: self.participant_id,
            phase: self.phase,
            blocks_run: self.blocks_run,
            quiz_trials,
            quiz_correct,
            accuracy: (quiz_trials > 0).then(|| quiz_correct as f64 / quiz_trials as f64),
            mean_reaction_time_ms: (!self.reaction_times_ms.is_empty()).then(|| {
                self.reaction_times_ms.iter().sum::<u64>() as f64
                    / self.reaction_times_ms.len() as f64
            }),
            criterion_met: self.criterion_met,
            abort: self.abort.clone(),
        };
        info!(
            phase = %self.phase,
            blocks = result.blocks_run,
            accuracy = ?result.accuracy,
            criterion_met = result.criterion_met,
            aborted = result.abort.is_some(),
            "phase complete"
        );
        Ok(result)
    }

    /// Run a list of trials, scoring and logging each. Aborts and
    /// presentation failures flip the machine straight to `Complete`.
    fn run_trials(
        &mut self,
        trials: &[Trial],
        block: u32,
        presentation: &mut dyn Presentation,
        log: &mut ResultsLog,
    ) -> Result<()> {
        for trial in trials {
            if presentation.abort_requested() {
                self.abort_with(AbortReason::OperatorRequest);
                return Ok(());
            }

            // Query probes stay on screen alone longer before the prompt.
            let stimulus_duration = if trial.kind == crate::types::TrialKind::PositionQuery {
                self.config.probe_alone
            } else {
                self.config.object_duration
            };
            let timing = SequenceTiming {
                stimulus_duration,
                isi: self.config.isi,
                response_window: trial.time_limit,
            };
            let request = match trial.expected {
                ExpectedResponse::None => ResponseRequest::None,
                ExpectedResponse::Choice { .. } => ResponseRequest::Choice,
                ExpectedResponse::Position { .. } => ResponseRequest::Position,
            };
            let outcome = match presentation.present_stimulus_sequence(
                &trial.stimuli,
                &timing,
                trial.prompt.as_deref(),
                request,
            ) {
                Ok(outcome) => outcome,
                Err(ExperimentError::Presentation(detail)) => {
                    self.presentation_failed(ExperimentError::Presentation(detail));
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let (response, correct, reaction_time_ms) = match outcome {
                ResponseOutcome::NotRequested => (None, None, None),
                ResponseOutcome::Responded {
                    response,
                    reaction_time,
                } => {
                    let correct = response.matches(&trial.expected);
                    (
                        Some(response),
                        Some(correct),
                        Some(reaction_time.as_millis() as u64),
                    )
                }
                // A timeout on a scored trial counts as incorrect.
                ResponseOutcome::Timeout => (None, Some(false), None),
            };

            if trial.expects_response() {
                if let Some(correct) = correct {
                    self.quiz_outcomes.push(correct);
                }
                if let Some(rt) = reaction_time_ms {
                    self.reaction_times_ms.push(rt);
                }
            }

            log.append(&TrialRecord {
                participant_id: self.participant_id,
                phase: self.phase,
                block,
                trial_index: self.trial_counter,
                kind: trial.kind,
                stimuli: trial.stimuli.clone(),
                response,
                correct: if trial.expects_response() { correct } else { None },
                reaction_time_ms,
                timestamp: Utc::now(),
            })?;
            self.trial_counter += 1;

            if trial.feedback {
                let text = match correct {
                    Some(true) => "Correct!",
                    _ => "Incorrect. The scrambled position maps to a different true position.",
                };
                if let Err(e) = presentation.show_instructions(text) {
                    self.presentation_failed(e);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Rolling-accuracy criterion over the trailing window of quiz
    /// outcomes. Phases without quiz trials (applied study) pass
    /// trivially.
    fn check_criterion(&mut self) {
        let met = if self.quiz_outcomes.is_empty() {
            true
        } else {
            let window = self.config.criterion_window.min(self.quiz_outcomes.len());
            let tail = &self.quiz_outcomes[self.quiz_outcomes.len() - window..];
            let accuracy = tail.iter().filter(|&&c| c).count() as f64 / window as f64;
            debug!(
                phase = %self.phase,
                window,
                accuracy,
                threshold = self.config.criterion,
                "criterion check"
            );
            accuracy >= self.config.criterion
        };

        if met {
            self.criterion_met = true;
            self.state = if self.phase == Phase::AppliedLearning {
                PhaseState::Rest
            } else {
                PhaseState::Complete
            };
        } else if self.blocks_run < self.config.max_attempts {
            self.state = PhaseState::RunningTrials;
        } else {
            // Attempts exhausted: a valid terminal outcome, not an error.
            info!(phase = %self.phase, attempts = self.blocks_run, "criterion not met");
            self.criterion_met = false;
            self.state = PhaseState::Complete;
        }
    }

    fn abort_with(&mut self, reason: AbortReason) {
        info!(phase = %self.phase, ?reason, "phase aborted");
        self.abort = Some(reason);
        self.state = PhaseState::Complete;
    }

    fn presentation_failed(&mut self, e: ExperimentError) {
        warn!(phase = %self.phase, error = %e, "presentation failure; completing with partial results");
        self.abort = Some(AbortReason::PresentationFailure {
            detail: e.to_string(),
        });
        self.state = PhaseState::Complete;
    }
}

/// Operator-facing phase instructions.
fn instructions(phase: Phase) -> &'static str {
    match phase {
        Phase::Training => {
            "Today's goal is to learn a rule that unscrambles two sequences of \
             pictures. You will see scrambled sequences, then their true order, \
             and answer quiz questions about the true (unscrambled) order."
        }
        Phase::StructureLearning => {
            "Now you will apply the rule you learned to unscramble a new set of \
             pictures. You will see the scrambled sequences, then answer quiz \
             questions about the true order. The rule stays the same."
        }
        Phase::AppliedLearning => {
            "Today you will see completely new pictures in their scrambled \
             order. The rule for reordering them is the same as yesterday. \
             After a rest period, you will report each picture's true position."
        }
    }
}

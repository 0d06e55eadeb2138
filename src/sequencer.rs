//! Trial sequencing: turns the persisted rule into ordered, randomized
//! (but constrained) trial lists per phase and block.
//!
//! Every block is built from a dedicated RNG stream keyed by
//! (participant seed, phase, block index), so sequencing is restartable:
//! re-running an interrupted block reproduces the identical trial list
//! and counterbalancing is never corrupted by a resume.
//!
//! Counterbalancing: quiz probes are drawn from a reshuffled cycle over
//! the eligible slots, so within any block each eligible probe appears
//! with frequency within ±1 of every other.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::ExperimentConfig;
use crate::constants::{slot_position, slot_sequence};
use crate::error::{ExperimentError, Result};
use crate::rule::{block_rng, participant_seed};
use crate::types::{
    ChoiceSide, ExpectedResponse, PersistedState, Phase, Trial, TrialKind,
};

/// Virtual block index for the applied-learning query stream, kept apart
/// from study-block indices.
const QUERY_BLOCK: u32 = u32::MAX;

/// Builds trial blocks for one participant from their persisted rule.
pub struct TrialSequencer<'a> {
    state: &'a PersistedState,
    config: &'a ExperimentConfig,
    p_seed: u64,
}

impl<'a> TrialSequencer<'a> {
    pub fn new(state: &'a PersistedState, config: &'a ExperimentConfig) -> Self {
        let p_seed = participant_seed(config.base_seed, state.participant_id);
        TrialSequencer {
            state,
            config,
            p_seed,
        }
    }

    /// Full default sequence for a phase: the first running block, plus —
    /// for applied learning — the post-rest queries. The controller
    /// inserts the rest interval between the two; no trial represents it.
    pub fn build(&self, phase: Phase) -> Result<Vec<Trial>> {
        let mut trials = self.running_block(phase, 0)?;
        if phase == Phase::AppliedLearning {
            trials.extend(self.applied_queries()?);
        }
        Ok(trials)
    }

    /// One block of the phase's criterion loop. Block indices give each
    /// repetition fresh (but reproducible) randomization.
    pub fn running_block(&self, phase: Phase, block: u32) -> Result<Vec<Trial>> {
        self.validate(phase)?;
        let mut rng = block_rng(self.p_seed, phase, block);
        Ok(match phase {
            Phase::Training => self.training_block(&mut rng),
            Phase::StructureLearning => self.structure_block(&mut rng),
            Phase::AppliedLearning => self.applied_study_block(&mut rng),
        })
    }

    /// Post-rest queries: exactly one per novel object, randomized order,
    /// no repeats, each asking the object's true sequence and position.
    pub fn applied_queries(&self) -> Result<Vec<Trial>> {
        let phase = Phase::AppliedLearning;
        self.validate(phase)?;
        let mut rng = block_rng(self.p_seed, phase, QUERY_BLOCK);
        let mut slots: Vec<u8> = (0..self.config.n_objects as u8).collect();
        slots.shuffle(&mut rng);
        Ok(slots
            .into_iter()
            .map(|slot| {
                let name = self.stimulus(phase, slot);
                Trial {
                    phase,
                    kind: TrialKind::PositionQuery,
                    stimuli: vec![name.clone()],
                    prompt: Some(format!(
                        "Where does {name} belong in the true order? \
                         Answer as: sequence position"
                    )),
                    expected: ExpectedResponse::Position {
                        sequence: slot_sequence(slot, self.config.n_objects),
                        position: slot_position(slot, self.config.n_objects),
                    },
                    time_limit: Some(self.config.choice_time_limit),
                    feedback: false,
                }
            })
            .collect())
    }

    // ── Block construction ──────────────────────────────────────────────

    /// Training: one scrambled-then-unscrambled demonstration sweep, then
    /// feedback quizzes alternating sequence-membership and order
    /// questions over a balanced probe cycle.
    fn training_block(&self, rng: &mut SmallRng) -> Vec<Trial> {
        let phase = Phase::Training;
        let mut trials = Vec::new();
        trials.extend(self.scrambled_sweep(phase));
        trials.extend(self.unscrambled_sweep(phase));

        let all_slots: Vec<u8> = (0..self.config.n_objects as u8).collect();
        let probes = balanced_cycle(&all_slots, self.config.quiz_trials_per_block, rng);
        for (i, &probe) in probes.iter().enumerate() {
            if i % 2 == 0 {
                trials.push(self.sequence_quiz(phase, probe));
            } else {
                trials.push(self.order_quiz(phase, probe, rng));
            }
        }
        trials
    }

    /// Structure learning: scrambled-only study sweeps, then probe
    /// quizzes without feedback.
    fn structure_block(&self, rng: &mut SmallRng) -> Vec<Trial> {
        let phase = Phase::StructureLearning;
        let mut trials = Vec::new();
        for _ in 0..self.config.study_sweeps {
            trials.extend(self.scrambled_sweep(phase));
        }

        let probes = balanced_cycle(
            &self.eligible_probes(),
            self.config.quiz_trials_per_block,
            rng,
        );
        for &probe in &probes {
            trials.push(self.probe_quiz(phase, probe, rng));
        }
        trials
    }

    /// Applied learning study: scrambled sweeps over the novel pool.
    /// Queries are sequenced separately ([`Self::applied_queries`]) so
    /// the rest interval sits between them with no stimulus inside it.
    fn applied_study_block(&self, _rng: &mut SmallRng) -> Vec<Trial> {
        let phase = Phase::AppliedLearning;
        let mut trials = Vec::new();
        for _ in 0..self.config.study_sweeps {
            trials.extend(self.scrambled_sweep(phase));
        }
        trials
    }

    // ── Trial kinds ─────────────────────────────────────────────────────

    /// The scrambled ordering, displayed one chunk per display sequence.
    fn scrambled_sweep(&self, phase: Phase) -> Vec<Trial> {
        let order = self.state.permutation.scrambled_order();
        let half = self.config.seq_len();
        (0..2)
            .map(|chunk| Trial {
                phase,
                kind: TrialKind::StudyScrambled,
                stimuli: order[chunk * half..(chunk + 1) * half]
                    .iter()
                    .map(|&slot| self.stimulus(phase, slot))
                    .collect(),
                prompt: None,
                expected: ExpectedResponse::None,
                time_limit: None,
                feedback: false,
            })
            .collect()
    }

    /// The true orderings, one trial per sequence (training demos only).
    fn unscrambled_sweep(&self, phase: Phase) -> Vec<Trial> {
        let half = self.config.seq_len();
        (0..2)
            .map(|chunk| Trial {
                phase,
                kind: TrialKind::StudyUnscrambled,
                stimuli: (chunk * half..(chunk + 1) * half)
                    .map(|slot| self.stimulus(phase, slot as u8))
                    .collect(),
                prompt: None,
                expected: ExpectedResponse::None,
                time_limit: None,
                feedback: false,
            })
            .collect()
    }

    /// "Which true sequence does this object belong to?" Left always
    /// answers sequence 1.
    fn sequence_quiz(&self, phase: Phase, probe: u8) -> Trial {
        let name = self.stimulus(phase, probe);
        let seq = slot_sequence(probe, self.config.n_objects);
        Trial {
            phase,
            kind: TrialKind::SequenceQuiz,
            stimuli: vec![name.clone()],
            prompt: Some(format!(
                "Which true sequence does {name} belong to? \
                 (left = sequence 1, right = sequence 2)"
            )),
            expected: ExpectedResponse::Choice {
                correct: if seq == 1 {
                    ChoiceSide::Left
                } else {
                    ChoiceSide::Right
                },
            },
            time_limit: None,
            feedback: true,
        }
    }

    /// Training order quiz: the probe against another object of the same
    /// true sequence, sides randomized.
    fn order_quiz(&self, phase: Phase, probe: u8, rng: &mut SmallRng) -> Trial {
        let n = self.config.n_objects;
        let half = self.config.seq_len() as u8;
        let seq = slot_sequence(probe, n);
        let base = (seq - 1) * half;
        let mut partner = base + rng.random_range(0..half);
        while partner == probe {
            partner = base + rng.random_range(0..half);
        }

        let later = if slot_position(probe, n) > slot_position(partner, n) {
            probe
        } else {
            partner
        };
        let later_on_left = rng.random::<bool>();
        let (left, right) = if later_on_left {
            (later, if later == probe { partner } else { probe })
        } else {
            (if later == probe { partner } else { probe }, later)
        };
        Trial {
            phase,
            kind: TrialKind::OrderQuiz,
            stimuli: vec![self.stimulus(phase, left), self.stimulus(phase, right)],
            prompt: Some(format!("Which comes later in true sequence {seq}?")),
            expected: ExpectedResponse::Choice {
                correct: if later_on_left {
                    ChoiceSide::Left
                } else {
                    ChoiceSide::Right
                },
            },
            time_limit: None,
            feedback: true,
        }
    }

    /// Structure-learning probe quiz: probe on top, two options below;
    /// the correct option comes later in the probe's true sequence, the
    /// foil comes earlier in the same sequence or from the other one.
    fn probe_quiz(&self, phase: Phase, probe: u8, rng: &mut SmallRng) -> Trial {
        let n = self.config.n_objects;
        let half = self.config.seq_len() as u8;
        let probe_seq = slot_sequence(probe, n);
        let probe_pos = slot_position(probe, n);

        let correct_pos = rng.random_range(probe_pos + 1..=half);
        let correct = crate::constants::slot_at(probe_seq, correct_pos, n);

        // A position-1 probe has no earlier same-sequence foil.
        let foil_seq = if probe_pos == 1 {
            3 - probe_seq
        } else if rng.random::<bool>() {
            probe_seq
        } else {
            3 - probe_seq
        };
        let foil_pos = if foil_seq == probe_seq {
            rng.random_range(1..probe_pos)
        } else {
            rng.random_range(1..=half)
        };
        let foil = crate::constants::slot_at(foil_seq, foil_pos, n);

        let correct_on_left = rng.random::<bool>();
        let (left, right) = if correct_on_left {
            (correct, foil)
        } else {
            (foil, correct)
        };
        Trial {
            phase,
            kind: TrialKind::OrderQuiz,
            stimuli: vec![
                self.stimulus(phase, probe),
                self.stimulus(phase, left),
                self.stimulus(phase, right),
            ],
            prompt: Some(format!(
                "Which comes later in the same true sequence as {}?",
                self.stimulus(phase, probe)
            )),
            expected: ExpectedResponse::Choice {
                correct: if correct_on_left {
                    ChoiceSide::Left
                } else {
                    ChoiceSide::Right
                },
            },
            time_limit: None,
            feedback: false,
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    /// Slots that can serve as structure-learning probes: every slot with
    /// at least one later object in its own sequence.
    fn eligible_probes(&self) -> Vec<u8> {
        let n = self.config.n_objects;
        (0..n as u8)
            .filter(|&slot| (slot_position(slot, n) as usize) < self.config.seq_len())
            .collect()
    }

    fn stimulus(&self, phase: Phase, slot: u8) -> String {
        self.state.stimulus(phase, slot).to_string()
    }

    fn validate(&self, phase: Phase) -> Result<()> {
        let available = self
            .state
            .assignments
            .get(&phase)
            .map(|a| a.len())
            .unwrap_or(0);
        if available < self.config.n_objects {
            return Err(ExperimentError::InsufficientStimuli {
                phase,
                needed: self.config.n_objects,
                available,
            });
        }
        Ok(())
    }
}

/// `count` items drawn by cycling reshuffled copies of `items`: any two
/// items' frequencies differ by at most one.
fn balanced_cycle(items: &[u8], count: usize, rng: &mut SmallRng) -> Vec<u8> {
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let mut round: Vec<u8> = items.to_vec();
        round.shuffle(rng);
        let take = (count - out.len()).min(round.len());
        out.extend(round.into_iter().take(take));
    }
    out
}

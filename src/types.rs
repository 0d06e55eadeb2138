//! Core data types: phases, the scrambling rule, persisted state, trials,
//! and per-trial / per-phase outcome records.
//!
//! [`PersistedState`] is the one durable type: created once per
//! participant by [`crate::rule`], stored by [`crate::store`], and read
//! back verbatim on every later run. Everything else is ephemeral.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{APPLIED_STIMULI, STRUCTURE_STIMULI, TRAINING_STIMULI};

/// Unique participant identifier; primary key for all persisted state.
pub type ParticipantId = u32;

/// Experiment phases, in their fixed run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Training,
    StructureLearning,
    AppliedLearning,
}

impl Phase {
    /// All phases in run order.
    pub const ALL: [Phase; 3] = [
        Phase::Training,
        Phase::StructureLearning,
        Phase::AppliedLearning,
    ];

    /// Stable identifier used in file names and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Training => "training",
            Phase::StructureLearning => "structure_learning",
            Phase::AppliedLearning => "applied_learning",
        }
    }

    /// The phase's stimulus pool. Pools are pairwise disjoint, so the
    /// applied-learning phase is always tested on never-seen objects.
    pub fn stimulus_pool(self) -> &'static [&'static str] {
        match self {
            Phase::Training => &TRAINING_STIMULI,
            Phase::StructureLearning => &STRUCTURE_STIMULI,
            Phase::AppliedLearning => &APPLIED_STIMULI,
        }
    }

    /// Phases that must have completed before this one may run.
    pub fn prerequisites(self) -> &'static [Phase] {
        match self {
            Phase::Training => &[],
            Phase::StructureLearning => &[Phase::Training],
            Phase::AppliedLearning => &[Phase::Training, Phase::StructureLearning],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether one canonical rule is shared by every participant or each
/// participant draws their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// Rule derived from the base seed alone; identical across
    /// participants. Only object assignments vary.
    Shared,
    /// Rule derived from the participant's seed.
    PerParticipant,
}

/// Structural constraint the scrambling permutation must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScramblingConstraint {
    /// One true sequence occupies all even scrambled positions and the
    /// other all odd positions (which parity goes to which is random).
    Alternating,
    /// No slot keeps its own position (a derangement).
    Derangement,
}

/// The scrambling rule: `perm[slot]` is the scrambled position the slot's
/// stimulus appears at. Invariant: a bijection on `0..len`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permutation(pub Vec<u8>);

impl Permutation {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scrambled position of a slot.
    pub fn position_of(&self, slot: u8) -> u8 {
        self.0[slot as usize]
    }

    /// Inverse view: the slot displayed at each scrambled position.
    pub fn scrambled_order(&self) -> Vec<u8> {
        let mut order = vec![0u8; self.0.len()];
        for (slot, &pos) in self.0.iter().enumerate() {
            order[pos as usize] = slot as u8;
        }
        order
    }

    /// True iff the mapping is a bijection on `0..len`.
    pub fn is_bijection(&self) -> bool {
        let n = self.0.len();
        let mut seen = vec![false; n];
        for &p in &self.0 {
            if (p as usize) >= n || seen[p as usize] {
                return false;
            }
            seen[p as usize] = true;
        }
        true
    }

    /// True iff the permutation satisfies the given constraint.
    pub fn satisfies(&self, constraint: ScramblingConstraint) -> bool {
        let n = self.0.len();
        match constraint {
            ScramblingConstraint::Alternating => {
                if n % 2 != 0 {
                    return false;
                }
                let first_parity = self.0[0] % 2;
                let half = n / 2;
                self.0[..half].iter().all(|p| p % 2 == first_parity)
                    && self.0[half..].iter().all(|p| p % 2 != first_parity)
            }
            ScramblingConstraint::Derangement => self
                .0
                .iter()
                .enumerate()
                .all(|(slot, &p)| p as usize != slot),
        }
    }
}

/// Durable per-participant record: the rule and every phase's
/// slot-to-stimulus assignment. Written once, immutable afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub participant_id: ParticipantId,
    pub rule_mode: RuleMode,
    pub constraint: ScramblingConstraint,
    pub permutation: Permutation,
    /// Slot-indexed stimulus names, one assignment per phase.
    pub assignments: BTreeMap<Phase, Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl PersistedState {
    /// Number of object slots.
    pub fn n_objects(&self) -> usize {
        self.permutation.len()
    }

    /// Stimulus name assigned to a slot in a phase.
    ///
    /// Panics if the phase has no assignment; state produced by
    /// [`crate::rule::generate`] always carries all three.
    pub fn stimulus(&self, phase: Phase, slot: u8) -> &str {
        &self.assignments[&phase][slot as usize]
    }

    /// Content equality ignoring `created_at`. Used by the store's
    /// idempotent-save check.
    pub fn same_rule(&self, other: &PersistedState) -> bool {
        self.participant_id == other.participant_id
            && self.rule_mode == other.rule_mode
            && self.constraint == other.constraint
            && self.permutation == other.permutation
            && self.assignments == other.assignments
    }
}

/// What a trial shows and asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialKind {
    /// Passive sweep through one scrambled display sequence.
    StudyScrambled,
    /// Passive sweep through one true sequence (training demonstrations).
    StudyUnscrambled,
    /// "Which true sequence does this object belong to?" (left = 1).
    SequenceQuiz,
    /// "Which of these two comes later in the same true sequence?"
    OrderQuiz,
    /// Post-rest query: true position and sequence of a novel object.
    PositionQuery,
}

/// Which of the two on-screen options the participant picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceSide {
    Left,
    Right,
}

/// The response a trial expects, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExpectedResponse {
    None,
    Choice { correct: ChoiceSide },
    Position { sequence: u8, position: u8 },
}

/// A response actually collected from the participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ParticipantResponse {
    Choice { side: ChoiceSide },
    Position { sequence: u8, position: u8 },
}

impl ParticipantResponse {
    /// Score against a trial's expectation. Study trials never match.
    pub fn matches(&self, expected: &ExpectedResponse) -> bool {
        match (self, expected) {
            (
                ParticipantResponse::Choice { side },
                ExpectedResponse::Choice { correct },
            ) => side == correct,
            (
                ParticipantResponse::Position { sequence, position },
                ExpectedResponse::Position {
                    sequence: s,
                    position: p,
                },
            ) => sequence == s && position == p,
            _ => false,
        }
    }
}

/// One trial: stimuli to show (in order), an optional prompt, the
/// expected response, and a response window. Ephemeral; produced by the
/// sequencer and consumed by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub phase: Phase,
    pub kind: TrialKind,
    /// Stimulus names in presentation order. For quiz trials the first
    /// entry is the probe and the remaining two are the left and right
    /// options.
    pub stimuli: Vec<String>,
    pub prompt: Option<String>,
    pub expected: ExpectedResponse,
    pub time_limit: Option<Duration>,
    /// Whether the controller reports correct/incorrect after scoring
    /// (training quizzes only; probes and queries stay silent).
    pub feedback: bool,
}

impl Trial {
    /// Whether this trial collects (and scores) a response.
    pub fn expects_response(&self) -> bool {
        self.expected != ExpectedResponse::None
    }
}

/// Why a phase stopped before finishing its normal path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum AbortReason {
    /// Operator abort signal observed at a trial boundary.
    OperatorRequest,
    /// The display layer failed mid-trial; the phase completed with
    /// partial results instead of crashing.
    PresentationFailure { detail: String },
}

/// One row of the append-only results log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub participant_id: ParticipantId,
    pub phase: Phase,
    pub block: u32,
    pub trial_index: usize,
    pub kind: TrialKind,
    pub stimuli: Vec<String>,
    pub response: Option<ParticipantResponse>,
    /// None for study trials (nothing to score).
    pub correct: Option<bool>,
    pub reaction_time_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated outcome of one phase run.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub participant_id: ParticipantId,
    pub phase: Phase,
    pub blocks_run: u32,
    pub quiz_trials: usize,
    pub quiz_correct: usize,
    /// Overall quiz accuracy; `None` when no quiz trial ran.
    pub accuracy: Option<f64>,
    pub mean_reaction_time_ms: Option<f64>,
    pub criterion_met: bool,
    pub abort: Option<AbortReason>,
}

impl PhaseResult {
    /// Whether the phase ran to its normal end (criterion-not-met still
    /// counts; aborts do not).
    pub fn completed(&self) -> bool {
        self.abort.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{slot_position, slot_sequence};

    #[test]
    fn scrambled_order_inverts_permutation() {
        let perm = Permutation(vec![2, 0, 3, 1]);
        assert!(perm.is_bijection());
        let order = perm.scrambled_order();
        for (slot, &pos) in perm.0.iter().enumerate() {
            assert_eq!(order[pos as usize] as usize, slot);
        }
    }

    #[test]
    fn bijection_rejects_duplicates_and_range() {
        assert!(!Permutation(vec![0, 0, 1, 2]).is_bijection());
        assert!(!Permutation(vec![0, 1, 2, 4]).is_bijection());
    }

    #[test]
    fn alternating_constraint() {
        // Seq 1 on evens, seq 2 on odds.
        assert!(Permutation(vec![0, 2, 1, 3]).satisfies(ScramblingConstraint::Alternating));
        // Mixed parity in the first half.
        assert!(!Permutation(vec![0, 1, 2, 3]).satisfies(ScramblingConstraint::Alternating));
    }

    #[test]
    fn derangement_constraint() {
        assert!(Permutation(vec![1, 2, 3, 0]).satisfies(ScramblingConstraint::Derangement));
        assert!(!Permutation(vec![0, 2, 3, 1]).satisfies(ScramblingConstraint::Derangement));
    }

    #[test]
    fn response_scoring() {
        let left = ParticipantResponse::Choice {
            side: ChoiceSide::Left,
        };
        assert!(left.matches(&ExpectedResponse::Choice {
            correct: ChoiceSide::Left
        }));
        assert!(!left.matches(&ExpectedResponse::Choice {
            correct: ChoiceSide::Right
        }));
        assert!(!left.matches(&ExpectedResponse::None));

        let pos = ParticipantResponse::Position {
            sequence: 2,
            position: 3,
        };
        assert!(pos.matches(&ExpectedResponse::Position {
            sequence: 2,
            position: 3
        }));
        assert!(!pos.matches(&ExpectedResponse::Position {
            sequence: 1,
            position: 3
        }));
    }

    #[test]
    fn phase_serializes_snake_case() {
        let s = serde_json::to_string(&Phase::StructureLearning).unwrap();
        assert_eq!(s, "\"structure_learning\"");
    }

    #[test]
    fn slot_helpers_agree_with_phase_pools() {
        for phase in Phase::ALL {
            assert_eq!(phase.stimulus_pool().len(), 8);
        }
        assert_eq!(slot_sequence(0, 8), 1);
        assert_eq!(slot_position(7, 8), 4);
    }
}

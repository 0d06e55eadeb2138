//! Task geometry, stimulus pools, and default parameters.
//!
//! The task uses two true sequences of [`SEQ_LEN`] object slots each
//! ([`N_OBJECTS`] total). Slots 0..3 form true sequence 1, slots 4..7 form
//! true sequence 2. A scrambling rule assigns every slot a scrambled
//! position in 0..[`N_OBJECTS`]; the scrambled ordering is displayed in
//! two chunks ("scrambled sequence 1" = positions 0..3, "scrambled
//! sequence 2" = positions 4..7).

/// Total number of object slots across both true sequences.
pub const N_OBJECTS: usize = 8;

/// Number of true sequences.
pub const SEQUENCE_COUNT: usize = 2;

/// Slots per true sequence.
pub const SEQ_LEN: usize = N_OBJECTS / SEQUENCE_COUNT;

/// Stimulus pool for the training phase.
pub const TRAINING_STIMULI: [&str; N_OBJECTS] = [
    "papaya",
    "broccoli",
    "eggplant",
    "strawberry",
    "banana",
    "fig",
    "asparagus",
    "pineapple",
];

/// Stimulus pool for the structure-learning phase (Day 1).
pub const STRUCTURE_STIMULI: [&str; N_OBJECTS] = [
    "backpack",
    "computer",
    "fish",
    "hair",
    "table",
    "key",
    "lettuce",
    "boat",
];

/// Stimulus pool for the applied-learning phase (Day 2). Disjoint from the
/// Day-1 pools: these objects are never seen before the applied phase.
pub const APPLIED_STIMULI: [&str; N_OBJECTS] = [
    "beach",
    "carrot",
    "chair",
    "drill",
    "hand",
    "teapot",
    "tree",
    "turkey",
];

// ── Default timing (milliseconds unless noted) ──────────────────────────

/// On-screen duration of a single stimulus.
pub const OBJECT_DURATION_MS: u64 = 900;

/// Inter-stimulus interval within a sweep.
pub const ISI_MS: u64 = 1000;

/// Blank interval between sweeps.
pub const ITI_MS: u64 = 1500;

/// How long a query probe is shown alone before choices appear.
pub const PROBE_ALONE_MS: u64 = 3000;

/// Response window for time-limited query trials.
pub const CHOICE_TIME_LIMIT_MS: u64 = 5000;

/// Rest interval after applied-learning study, in seconds (5 minutes).
pub const REST_DURATION_SECS: u64 = 300;

// ── Default sequencing parameters ───────────────────────────────────────

/// Scrambled study sweeps per sequence per block.
pub const STUDY_SWEEPS_PER_BLOCK: usize = 3;

/// Quiz trials appended to each training / structure-learning block.
pub const QUIZ_TRIALS_PER_BLOCK: usize = 10;

/// Rolling accuracy a block must reach to end the criterion loop.
pub const DEFAULT_CRITERION: f64 = 0.8;

/// Number of trailing quiz trials the criterion is evaluated over.
pub const DEFAULT_CRITERION_WINDOW: usize = 10;

/// Maximum blocks per phase before the loop gives up (criterion not met).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// True-sequence number (1-based) a slot belongs to.
///
/// Valid for any even `n_objects`; slots 0..n/2 are sequence 1.
pub fn slot_sequence(slot: u8, n_objects: usize) -> u8 {
    if (slot as usize) < n_objects / 2 {
        1
    } else {
        2
    }
}

/// Position (1-based) of a slot within its true sequence.
pub fn slot_position(slot: u8, n_objects: usize) -> u8 {
    (slot as usize % (n_objects / 2)) as u8 + 1
}

/// Slot for a (sequence, position) pair, both 1-based.
pub fn slot_at(sequence: u8, position: u8, n_objects: usize) -> u8 {
    debug_assert!(sequence >= 1 && sequence as usize <= SEQUENCE_COUNT);
    (sequence as usize - 1) as u8 * (n_objects / 2) as u8 + (position - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_are_disjoint() {
        for s in TRAINING_STIMULI {
            assert!(!STRUCTURE_STIMULI.contains(&s));
            assert!(!APPLIED_STIMULI.contains(&s));
        }
        for s in STRUCTURE_STIMULI {
            assert!(!APPLIED_STIMULI.contains(&s));
        }
    }

    #[test]
    fn slot_round_trip() {
        for slot in 0..N_OBJECTS as u8 {
            let seq = slot_sequence(slot, N_OBJECTS);
            let pos = slot_position(slot, N_OBJECTS);
            assert!(seq == 1 || seq == 2);
            assert!((1..=SEQ_LEN as u8).contains(&pos));
            assert_eq!(slot_at(seq, pos, N_OBJECTS), slot);
        }
    }

    #[test]
    fn slot_geometry_for_six_objects() {
        assert_eq!(slot_sequence(2, 6), 1);
        assert_eq!(slot_sequence(3, 6), 2);
        assert_eq!(slot_position(3, 6), 1);
        assert_eq!(slot_at(2, 1, 6), 3);
    }
}

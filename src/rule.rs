//! Rule generation: the scrambling permutation and per-phase object
//! assignments, derived deterministically from seeds.
//!
//! All randomness flows through [`SmallRng`] instances seeded from the
//! configured base seed and the participant ID, so a crashed session can
//! be re-run and reproduce the identical rule, and tests can pin exact
//! outputs. Distinct derivation tags keep the rule, each phase's
//! assignment, and each trial block on independent streams.

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::ExperimentConfig;
use crate::error::{ExperimentError, Result};
use crate::types::{
    ParticipantId, PersistedState, Phase, Permutation, RuleMode, ScramblingConstraint,
};

// Stream tags for seed derivation.
const TAG_RULE: u64 = 1;
const TAG_ASSIGNMENT: u64 = 2;
const TAG_BLOCK: u64 = 3;

/// SplitMix64 finalizer; spreads structured inputs over the seed space.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Seed for everything specific to one participant.
pub fn participant_seed(base_seed: u64, participant_id: ParticipantId) -> u64 {
    mix(base_seed ^ (participant_id as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

/// Independent RNG for a derivation stream below a seed.
fn stream_rng(seed: u64, tag: u64, index: u64) -> SmallRng {
    SmallRng::seed_from_u64(mix(seed ^ mix(tag) ^ mix(index.wrapping_add(0xa5a5))))
}

/// RNG for one trial block of one phase. Re-sequencing an interrupted
/// block with the same inputs reproduces the identical trial list.
pub fn block_rng(participant_seed: u64, phase: Phase, block: u32) -> SmallRng {
    stream_rng(
        participant_seed,
        TAG_BLOCK ^ ((phase as u64 + 1) << 8),
        block as u64,
    )
}

/// Generate the full persisted record for a participant: permutation plus
/// one object assignment per phase.
///
/// Deterministic: the same config and participant ID always produce the
/// same rule and assignments (`created_at` excepted).
pub fn generate(config: &ExperimentConfig, participant_id: ParticipantId) -> Result<PersistedState> {
    let p_seed = participant_seed(config.base_seed, participant_id);

    // In shared mode the rule stream ignores the participant entirely.
    let rule_seed = match config.rule_mode {
        RuleMode::Shared => config.base_seed,
        RuleMode::PerParticipant => p_seed,
    };
    let mut rule_rng = stream_rng(rule_seed, TAG_RULE, 0);
    let permutation = generate_permutation(config.n_objects, config.constraint, &mut rule_rng);

    let mut assignments = std::collections::BTreeMap::new();
    for (ix, phase) in Phase::ALL.into_iter().enumerate() {
        let mut rng = stream_rng(p_seed, TAG_ASSIGNMENT, ix as u64);
        assignments.insert(phase, generate_assignment(phase, config.n_objects, &mut rng)?);
    }

    Ok(PersistedState {
        participant_id,
        rule_mode: config.rule_mode,
        constraint: config.constraint,
        permutation,
        assignments,
        created_at: Utc::now(),
    })
}

/// Draw a permutation satisfying the constraint.
///
/// Alternating: flip which true sequence takes the even scrambled
/// positions, then shuffle each sequence's positions within its parity
/// class. Derangement: resample until no slot keeps its position
/// (expected ~e attempts).
fn generate_permutation(
    n_objects: usize,
    constraint: ScramblingConstraint,
    rng: &mut SmallRng,
) -> Permutation {
    debug_assert!(n_objects % 2 == 0, "slot count must split into two sequences");
    match constraint {
        ScramblingConstraint::Alternating => {
            let half = n_objects / 2;
            let mut evens: Vec<u8> = (0..n_objects as u8).step_by(2).collect();
            let mut odds: Vec<u8> = (1..n_objects as u8).step_by(2).collect();
            evens.shuffle(rng);
            odds.shuffle(rng);
            let (first, second) = if rng.random::<bool>() {
                (evens, odds)
            } else {
                (odds, evens)
            };
            let mut perm = vec![0u8; n_objects];
            perm[..half].copy_from_slice(&first);
            perm[half..].copy_from_slice(&second);
            Permutation(perm)
        }
        ScramblingConstraint::Derangement => loop {
            let mut perm: Vec<u8> = (0..n_objects as u8).collect();
            perm.shuffle(rng);
            if perm.iter().enumerate().all(|(slot, &p)| p as usize != slot) {
                return Permutation(perm);
            }
        },
    }
}

/// Uniformly random bijection from slots to the phase's stimulus pool.
fn generate_assignment(phase: Phase, n_objects: usize, rng: &mut SmallRng) -> Result<Vec<String>> {
    let pool = phase.stimulus_pool();
    if pool.len() < n_objects {
        return Err(ExperimentError::InsufficientStimuli {
            phase,
            needed: n_objects,
            available: pool.len(),
        });
    }
    let mut shuffled: Vec<&str> = pool.to_vec();
    shuffled.shuffle(rng);
    Ok(shuffled[..n_objects].iter().map(|s| s.to_string()).collect())
}

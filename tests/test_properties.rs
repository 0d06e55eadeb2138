//! Property-based tests for rule generation and trial sequencing.

use proptest::prelude::*;

use unscramble::config::ExperimentConfig;
use unscramble::rule;
use unscramble::sequencer::TrialSequencer;
use unscramble::types::{Phase, RuleMode, ScramblingConstraint, TrialKind};

fn config_with(base_seed: u64, constraint: ScramblingConstraint) -> ExperimentConfig {
    ExperimentConfig {
        base_seed,
        constraint,
        ..ExperimentConfig::default()
    }
}

proptest! {
    // 1. Generated permutations are bijections satisfying the alternation
    //    constraint, for any seed and participant.
    #[test]
    fn alternating_rules_are_valid(base_seed in any::<u64>(), id in 0u32..100_000) {
        let state = rule::generate(&config_with(base_seed, ScramblingConstraint::Alternating), id)
            .unwrap();
        prop_assert!(state.permutation.is_bijection());
        prop_assert!(state.permutation.satisfies(ScramblingConstraint::Alternating));
    }

    // 2. Derangement mode never leaves a slot in place.
    #[test]
    fn derangement_rules_have_no_fixed_points(base_seed in any::<u64>(), id in 0u32..100_000) {
        let state = rule::generate(&config_with(base_seed, ScramblingConstraint::Derangement), id)
            .unwrap();
        prop_assert!(state.permutation.is_bijection());
        prop_assert!(state.permutation.satisfies(ScramblingConstraint::Derangement));
    }

    // 3. Generation is a pure function of (config, participant).
    #[test]
    fn generation_is_deterministic(base_seed in any::<u64>(), id in any::<u32>()) {
        let config = config_with(base_seed, ScramblingConstraint::Alternating);
        let a = rule::generate(&config, id).unwrap();
        let b = rule::generate(&config, id).unwrap();
        prop_assert!(a.same_rule(&b));
    }

    // 4. Shared mode pins the permutation across participants.
    #[test]
    fn shared_rule_is_identical_across_participants(
        base_seed in any::<u64>(),
        id1 in any::<u32>(),
        id2 in any::<u32>(),
    ) {
        let config = ExperimentConfig {
            rule_mode: RuleMode::Shared,
            ..config_with(base_seed, ScramblingConstraint::Alternating)
        };
        let a = rule::generate(&config, id1).unwrap();
        let b = rule::generate(&config, id2).unwrap();
        prop_assert_eq!(a.permutation, b.permutation);
    }

    // 5. Assignments are bijections into each phase's pool.
    #[test]
    fn assignments_are_bijections(base_seed in any::<u64>(), id in any::<u32>()) {
        let state = rule::generate(&config_with(base_seed, ScramblingConstraint::Alternating), id)
            .unwrap();
        for phase in Phase::ALL {
            let assigned = &state.assignments[&phase];
            let mut unique = assigned.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), assigned.len());
            for s in assigned {
                prop_assert!(phase.stimulus_pool().contains(&s.as_str()));
            }
        }
    }

    // 6. Quiz probes are counterbalanced within ±1 for any block index
    //    and any block size.
    #[test]
    fn structure_probes_counterbalanced(
        base_seed in any::<u64>(),
        id in any::<u32>(),
        block in 0u32..1000,
        quiz_trials in 1usize..40,
    ) {
        let config = ExperimentConfig {
            quiz_trials_per_block: quiz_trials,
            ..config_with(base_seed, ScramblingConstraint::Alternating)
        };
        let state = rule::generate(&config, id).unwrap();
        let sequencer = TrialSequencer::new(&state, &config);
        let trials = sequencer.running_block(Phase::StructureLearning, block).unwrap();

        let mut counts = std::collections::HashMap::new();
        for t in trials.iter().filter(|t| t.kind == TrialKind::OrderQuiz) {
            *counts.entry(t.stimuli[0].clone()).or_insert(0usize) += 1;
        }
        let max = counts.values().max().copied().unwrap_or(0);
        let min = counts.values().min().copied().unwrap_or(0);
        prop_assert!(max - min <= 1, "counts {:?}", counts);
    }

    // 7. Sequencing is restartable: identical inputs, identical trials.
    #[test]
    fn blocks_resequence_identically(
        base_seed in any::<u64>(),
        id in any::<u32>(),
        block in 0u32..100,
    ) {
        let config = config_with(base_seed, ScramblingConstraint::Alternating);
        let state = rule::generate(&config, id).unwrap();
        let sequencer = TrialSequencer::new(&state, &config);
        for phase in Phase::ALL {
            prop_assert_eq!(
                sequencer.running_block(phase, block).unwrap(),
                sequencer.running_block(phase, block).unwrap()
            );
        }
    }

    // 8. Applied queries always cover every slot exactly once.
    #[test]
    fn applied_queries_are_a_permutation_of_slots(base_seed in any::<u64>(), id in any::<u32>()) {
        let config = config_with(base_seed, ScramblingConstraint::Alternating);
        let state = rule::generate(&config, id).unwrap();
        let sequencer = TrialSequencer::new(&state, &config);
        let queries = sequencer.applied_queries().unwrap();
        prop_assert_eq!(queries.len(), config.n_objects);

        let mut seen: Vec<_> = queries.iter().map(|t| t.stimuli[0].clone()).collect();
        seen.sort();
        seen.dedup();
        prop_assert_eq!(seen.len(), config.n_objects);
    }
}

// 9. Constraint check over a large participant sweep (non-proptest, fixed
//    seeds): at least 1000 generated instances per constraint.
#[test]
fn thousand_participant_sweep_holds_constraints() {
    for constraint in [
        ScramblingConstraint::Alternating,
        ScramblingConstraint::Derangement,
    ] {
        let config = config_with(7, constraint);
        for id in 0..1000u32 {
            let state = rule::generate(&config, id).unwrap();
            assert!(state.permutation.is_bijection());
            assert!(state.permutation.satisfies(constraint), "participant {id}");
        }
    }
}

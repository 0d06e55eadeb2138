//! # Unscramble — sequence-unscrambling experiment engine
//!
//! State and sequencing core for a two-session behavioral task: a
//! participant learns a fixed scrambling rule over two 4-object
//! sequences, then applies it to novel stimuli on a later day. The
//! engine owns everything with invariants — rule generation,
//! persistence, trial sequencing, and phase control — and drives a
//! display layer through the blocking [`presentation::Presentation`]
//! interface.
//!
//! | Concern | Module |
//! |---------|--------|
//! | Task geometry, stimulus pools, defaults | [`constants`] |
//! | Core types (rule, trials, results) | [`types`] |
//! | Error taxonomy | [`error`] |
//! | Run configuration and env overrides | [`config`] |
//! | Seeded rule + assignment generation | [`rule`] |
//! | Keyed per-participant persistence | [`store`] |
//! | Trial-block construction | [`sequencer`] |
//! | Display-layer boundary | [`presentation`] |
//! | Append-only behavior log | [`results`] |
//! | Per-phase state machine | [`controller`] |
//! | Session driver | [`orchestrator`] |
//!
//! ## Determinism
//!
//! Every random draw comes from a `SmallRng` seeded from the base seed,
//! the participant ID, and a stream tag. Re-running any session, phase,
//! or block with the same inputs reproduces the identical rule,
//! assignments, and trial order — the cross-session guarantee the task
//! depends on (Day 2 must scramble its novel stimuli with exactly the
//! Day 1 rule) falls out of persistence plus this seeding discipline.

pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod orchestrator;
pub mod presentation;
pub mod results;
pub mod rule;
pub mod sequencer;
pub mod store;
pub mod types;

//! CLI entry point: run experiment phases for a participant, or inspect
//! a persisted rule record.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use unscramble::config::ExperimentConfig;
use unscramble::error::ExperimentError;
use unscramble::orchestrator::{Selector, SessionOrchestrator};
use unscramble::presentation::ConsolePresentation;
use unscramble::types::{AbortReason, RuleMode, ScramblingConstraint};

/// Sequence-unscrambling experiment runner.
#[derive(Parser, Debug)]
#[command(name = "unscramble", about = "Two-session sequence-unscrambling task", version)]
struct Cli {
    /// Data directory root (overrides UNSCRAMBLE_DATA_PATH).
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Base seed (overrides UNSCRAMBLE_SEED).
    #[arg(long)]
    seed: Option<u64>,

    /// Share one canonical rule across all participants.
    #[arg(long)]
    shared_rule: bool,

    /// Use the no-fixed-points constraint instead of alternation.
    #[arg(long)]
    derangement: bool,

    /// Run a phase without its prerequisites' completion records.
    /// Testing affordance only.
    #[arg(long)]
    allow_skip_prerequisites: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a phase or session for a participant.
    Run {
        /// training | structure-learning | applied-learning | session1 |
        /// session2 | all
        selector: Selector,
        participant_id: u32,
    },
    /// Pretty-print a participant's persisted rule record.
    Inspect { participant_id: u32 },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unscramble=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ExperimentConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(seed) = cli.seed {
        config.base_seed = seed;
    }
    if cli.shared_rule {
        config.rule_mode = RuleMode::Shared;
    }
    if cli.derangement {
        config.constraint = ScramblingConstraint::Derangement;
    }
    config.allow_skip_prerequisites = cli.allow_skip_prerequisites;

    match cli.command {
        Command::Run {
            selector,
            participant_id,
        } => run(config, selector, participant_id),
        Command::Inspect { participant_id } => inspect(config, participant_id),
    }
}

fn run(config: ExperimentConfig, selector: Selector, participant_id: u32) -> ExitCode {
    let orchestrator = SessionOrchestrator::new(config);
    let mut presentation = ConsolePresentation::new();

    let results = match orchestrator.run(participant_id, selector, &mut presentation) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("error: {e}");
            return exit_code(&e);
        }
    };

    let mut presentation_failed = false;
    println!();
    println!("Session summary (participant {participant_id}):");
    for r in &results {
        let status = match &r.abort {
            None if r.criterion_met => "complete",
            None => "complete (criterion not met)",
            Some(AbortReason::OperatorRequest) => "aborted by operator",
            Some(AbortReason::PresentationFailure { .. }) => {
                presentation_failed = true;
                "aborted (presentation failure)"
            }
        };
        let accuracy = r
            .accuracy
            .map(|a| format!("{:.0}%", a * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:<32} blocks: {}  quiz: {}/{} ({})",
            r.phase.to_string(),
            status,
            r.blocks_run,
            r.quiz_correct,
            r.quiz_trials,
            accuracy,
        );
    }

    if presentation_failed {
        ExitCode::from(5)
    } else {
        ExitCode::SUCCESS
    }
}

fn inspect(config: ExperimentConfig, participant_id: u32) -> ExitCode {
    let orchestrator = SessionOrchestrator::new(config);
    match orchestrator.store().load(participant_id) {
        Ok(state) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&state).expect("record serializes infallibly")
            );
            match orchestrator.store().completions(participant_id) {
                Ok(completions) if !completions.is_empty() => {
                    println!();
                    println!("Completed phases:");
                    for (phase, record) in completions {
                        println!(
                            "  {:<20} at {}  criterion_met: {}  blocks: {}",
                            phase.to_string(),
                            record.completed_at.format("%Y-%m-%d %H:%M:%S"),
                            record.criterion_met,
                            record.blocks_run,
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("error reading completions: {e}");
                    return exit_code(&e);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            exit_code(&e)
        }
    }
}

/// Stable non-zero exit codes per failure class.
fn exit_code(e: &ExperimentError) -> ExitCode {
    let code = match e {
        ExperimentError::PrerequisiteNotCompleted { .. } => 2,
        ExperimentError::InsufficientStimuli { .. } => 3,
        ExperimentError::AlreadyExists { .. } => 4,
        ExperimentError::Presentation(_) => 5,
        ExperimentError::NotFound { .. } => 6,
        ExperimentError::Malformed { .. } | ExperimentError::Io(_) => 1,
    };
    ExitCode::from(code)
}

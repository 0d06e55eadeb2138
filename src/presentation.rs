//! The boundary between the core and the display/response layer.
//!
//! The core is single-threaded and callback-free: every interaction is a
//! blocking call that returns only when the stimulus run is over and a
//! response (or timeout) has been collected. A GUI runtime implements
//! [`Presentation`]; this module ships a line-oriented console
//! implementation so the CLI runs end-to-end without one, and a scripted
//! implementation for tests.

use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use crate::error::{ExperimentError, Result};
use crate::types::{ChoiceSide, ParticipantResponse};

/// What kind of input a stimulus run should collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseRequest {
    /// Passive presentation; collect nothing.
    None,
    /// Left/right choice.
    Choice,
    /// True (sequence, position) report.
    Position,
}

/// Outcome of one stimulus run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// No response was requested.
    NotRequested,
    Responded {
        response: ParticipantResponse,
        reaction_time: Duration,
    },
    /// The response window elapsed without usable input.
    Timeout,
}

/// Per-run timing handed to the display layer.
#[derive(Debug, Clone, Copy)]
pub struct SequenceTiming {
    /// On-screen duration per stimulus.
    pub stimulus_duration: Duration,
    /// Blank interval between stimuli.
    pub isi: Duration,
    /// Response window; `None` means wait indefinitely.
    pub response_window: Option<Duration>,
}

/// Blocking display/response interface implemented outside the core.
///
/// Contract notes:
/// - `present_rest_interval` must swallow any participant input for its
///   whole duration; nothing pressed during rest may surface as a
///   response or be recorded.
/// - `abort_requested` is polled by the controller at trial boundaries
///   and must be cheap.
pub trait Presentation {
    fn show_instructions(&mut self, text: &str) -> Result<()>;

    /// Show `stimuli` in order with `timing`, then (if `request` is not
    /// `None`) display `prompt` and collect one response.
    fn present_stimulus_sequence(
        &mut self,
        stimuli: &[String],
        timing: &SequenceTiming,
        prompt: Option<&str>,
        request: ResponseRequest,
    ) -> Result<ResponseOutcome>;

    /// Hold a blank screen for `duration`, ignoring all input.
    fn present_rest_interval(&mut self, duration: Duration) -> Result<()>;

    /// Operator abort signal (e.g. Esc), observed at trial boundaries.
    fn abort_requested(&mut self) -> bool;
}

// ── Console implementation ──────────────────────────────────────────────

/// Text-mode reference implementation: stimuli are printed as names and
/// responses read line-by-line from stdin.
///
/// Timing is approximated — stimuli are listed rather than timed out on
/// screen, and a response arriving after the window counts as a timeout
/// once read. Type `abort` at any prompt to raise the abort signal.
pub struct ConsolePresentation {
    abort: bool,
}

impl ConsolePresentation {
    pub fn new() -> Self {
        ConsolePresentation { abort: false }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| ExperimentError::Presentation(format!("stdin closed: {e}")))?;
        let line = line.trim().to_lowercase();
        if line == "abort" {
            self.abort = true;
        }
        Ok(line)
    }
}

impl Default for ConsolePresentation {
    fn default() -> Self {
        Self::new()
    }
}

impl Presentation for ConsolePresentation {
    fn show_instructions(&mut self, text: &str) -> Result<()> {
        println!();
        println!("{text}");
        print!("[press Enter to continue] ");
        std::io::stdout().flush().ok();
        self.read_line()?;
        Ok(())
    }

    fn present_stimulus_sequence(
        &mut self,
        stimuli: &[String],
        timing: &SequenceTiming,
        prompt: Option<&str>,
        request: ResponseRequest,
    ) -> Result<ResponseOutcome> {
        println!("  {}", stimuli.join("  ->  "));
        let Some(prompt) = prompt else {
            return Ok(ResponseOutcome::NotRequested);
        };

        let started = Instant::now();
        print!("  {prompt} ");
        std::io::stdout().flush().ok();
        let line = self.read_line()?;
        let reaction_time = started.elapsed();
        if self.abort {
            return Ok(ResponseOutcome::Timeout);
        }
        if let Some(window) = timing.response_window {
            if reaction_time > window {
                println!("  Too slow. Respond faster.");
                return Ok(ResponseOutcome::Timeout);
            }
        }

        let response = match request {
            ResponseRequest::None => return Ok(ResponseOutcome::NotRequested),
            ResponseRequest::Choice => match line.as_str() {
                "l" | "left" | "1" => ParticipantResponse::Choice {
                    side: ChoiceSide::Left,
                },
                "r" | "right" | "2" => ParticipantResponse::Choice {
                    side: ChoiceSide::Right,
                },
                _ => return Ok(ResponseOutcome::Timeout),
            },
            ResponseRequest::Position => {
                // Expected form: "<sequence> <position>", e.g. "2 3".
                let mut parts = line.split_whitespace();
                match (
                    parts.next().and_then(|p| p.parse::<u8>().ok()),
                    parts.next().and_then(|p| p.parse::<u8>().ok()),
                ) {
                    (Some(sequence), Some(position)) => ParticipantResponse::Position {
                        sequence,
                        position,
                    },
                    _ => return Ok(ResponseOutcome::Timeout),
                }
            }
        };
        Ok(ResponseOutcome::Responded {
            response,
            reaction_time,
        })
    }

    fn present_rest_interval(&mut self, duration: Duration) -> Result<()> {
        println!();
        println!(
            "Rest period: {} s. (Input during rest is discarded.)",
            duration.as_secs()
        );
        std::thread::sleep(duration);
        Ok(())
    }

    fn abort_requested(&mut self) -> bool {
        self.abort
    }
}

// ── Scripted implementation (tests, dry runs) ───────────────────────────

/// What a [`ScriptedPresentation`] saw, for asserting interaction order.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    Instructions(String),
    Sequence {
        stimuli: Vec<String>,
        request: ResponseRequest,
    },
    Rest {
        duration: Duration,
    },
}

/// Deterministic presentation double: pops pre-scripted outcomes for each
/// response request and records every interaction.
///
/// When the script runs dry, further response requests time out. Set
/// `abort_after_sequences` to raise the abort signal once that many
/// stimulus runs have been presented. Set `fail_on_sequence` to return a
/// presentation error on the n-th run (0-based).
#[derive(Debug, Default)]
pub struct ScriptedPresentation {
    pub responses: std::collections::VecDeque<ResponseOutcome>,
    pub abort_after_sequences: Option<usize>,
    pub fail_on_sequence: Option<usize>,
    pub events: Vec<PresentationEvent>,
    sequences_presented: usize,
}

impl ScriptedPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script that answers every request with the given outcomes, in order.
    pub fn with_responses(responses: impl IntoIterator<Item = ResponseOutcome>) -> Self {
        ScriptedPresentation {
            responses: responses.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Stimulus runs presented so far.
    pub fn sequences_presented(&self) -> usize {
        self.sequences_presented
    }

    /// Events between the rest interval and the end, for rest-isolation
    /// assertions.
    pub fn events_after_rest(&self) -> &[PresentationEvent] {
        let rest_ix = self
            .events
            .iter()
            .position(|e| matches!(e, PresentationEvent::Rest { .. }));
        match rest_ix {
            Some(ix) => &self.events[ix + 1..],
            None => &[],
        }
    }
}

impl Presentation for ScriptedPresentation {
    fn show_instructions(&mut self, text: &str) -> Result<()> {
        self.events
            .push(PresentationEvent::Instructions(text.to_string()));
        Ok(())
    }

    fn present_stimulus_sequence(
        &mut self,
        stimuli: &[String],
        _timing: &SequenceTiming,
        _prompt: Option<&str>,
        request: ResponseRequest,
    ) -> Result<ResponseOutcome> {
        if self.fail_on_sequence == Some(self.sequences_presented) {
            return Err(ExperimentError::Presentation(
                "scripted display failure".to_string(),
            ));
        }
        self.sequences_presented += 1;
        self.events.push(PresentationEvent::Sequence {
            stimuli: stimuli.to_vec(),
            request,
        });
        match request {
            ResponseRequest::None => Ok(ResponseOutcome::NotRequested),
            _ => Ok(self
                .responses
                .pop_front()
                .unwrap_or(ResponseOutcome::Timeout)),
        }
    }

    fn present_rest_interval(&mut self, duration: Duration) -> Result<()> {
        // No sleeping in tests; the rest is recorded, not waited out.
        self.events.push(PresentationEvent::Rest { duration });
        Ok(())
    }

    fn abort_requested(&mut self) -> bool {
        match self.abort_after_sequences {
            Some(limit) => self.sequences_presented >= limit,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_pops_responses_in_order_then_times_out() {
        let mut p = ScriptedPresentation::with_responses([ResponseOutcome::Responded {
            response: ParticipantResponse::Choice {
                side: ChoiceSide::Left,
            },
            reaction_time: Duration::from_millis(400),
        }]);
        let timing = SequenceTiming {
            stimulus_duration: Duration::from_millis(1),
            isi: Duration::from_millis(1),
            response_window: None,
        };
        let first = p
            .present_stimulus_sequence(
                &["fish".to_string()],
                &timing,
                Some("which?"),
                ResponseRequest::Choice,
            )
            .unwrap();
        assert!(matches!(first, ResponseOutcome::Responded { .. }));
        let second = p
            .present_stimulus_sequence(
                &["fish".to_string()],
                &timing,
                Some("which?"),
                ResponseRequest::Choice,
            )
            .unwrap();
        assert_eq!(second, ResponseOutcome::Timeout);
    }

    #[test]
    fn scripted_abort_fires_after_limit() {
        let mut p = ScriptedPresentation::new();
        p.abort_after_sequences = Some(1);
        assert!(!p.abort_requested());
        let timing = SequenceTiming {
            stimulus_duration: Duration::from_millis(1),
            isi: Duration::from_millis(1),
            response_window: None,
        };
        p.present_stimulus_sequence(&["x".to_string()], &timing, None, ResponseRequest::None)
            .unwrap();
        assert!(p.abort_requested());
    }
}

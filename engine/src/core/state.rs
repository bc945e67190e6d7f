//! Retry controller state machine.
//!
//! The controller's states are an explicit tagged type and every move goes
//! through [`advance`], so the terminal outcomes are exhaustive and the attempt
//! budget is enforced in one place:
//!
//! ```text
//! Generating -> Executing -> Validating -> Done(Succeeded)
//!     |             |             |
//!     |             +------+------+
//!     |                    v
//!     |      Retrying (attempt < max) -> Generating(attempt + 1)
//!     |      Done(Exhausted) (attempt == max)
//!     v
//! Done(GeneratorUnavailable)
//! ```
//!
//! Attempts are 1-based. The generator is called exactly once per attempt, so a
//! run makes at most `max_attempts` generation calls.

use thiserror::Error;

use crate::core::types::Feedback;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// Asking the generator for a candidate. `feedback` is `None` only on the
    /// first attempt.
    Generating {
        attempt: u32,
        feedback: Option<Feedback>,
    },
    Executing {
        attempt: u32,
    },
    /// Only reached after a passing execution.
    Validating {
        attempt: u32,
    },
    /// A failure with budget left; resumes into `Generating(attempt + 1)`.
    Retrying {
        attempt: u32,
        feedback: Feedback,
    },
    Done(Terminal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Succeeded { attempt: u32 },
    Exhausted { attempts: u32 },
    GeneratorUnavailable { attempt: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    CodeGenerated,
    GeneratorUnavailable(String),
    ExecutionPassed,
    ExecutionFailed(Feedback),
    ValidationPassed,
    ValidationFailed(Feedback),
    Resume,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid engine transition: {event} while {state}")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

impl EngineState {
    pub fn initial() -> Self {
        EngineState::Generating {
            attempt: 1,
            feedback: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Generating { .. } => "generating",
            EngineState::Executing { .. } => "executing",
            EngineState::Validating { .. } => "validating",
            EngineState::Retrying { .. } => "retrying",
            EngineState::Done(Terminal::Succeeded { .. }) => "succeeded",
            EngineState::Done(Terminal::Exhausted { .. }) => "exhausted",
            EngineState::Done(Terminal::GeneratorUnavailable { .. }) => "generator_unavailable",
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            EngineState::Generating { attempt, .. }
            | EngineState::Executing { attempt }
            | EngineState::Validating { attempt }
            | EngineState::Retrying { attempt, .. }
            | EngineState::Done(Terminal::Succeeded { attempt })
            | EngineState::Done(Terminal::GeneratorUnavailable { attempt, .. }) => *attempt,
            EngineState::Done(Terminal::Exhausted { attempts }) => *attempts,
        }
    }
}

impl EngineEvent {
    fn name(&self) -> &'static str {
        match self {
            EngineEvent::CodeGenerated => "code_generated",
            EngineEvent::GeneratorUnavailable(_) => "generator_unavailable",
            EngineEvent::ExecutionPassed => "execution_passed",
            EngineEvent::ExecutionFailed(_) => "execution_failed",
            EngineEvent::ValidationPassed => "validation_passed",
            EngineEvent::ValidationFailed(_) => "validation_failed",
            EngineEvent::Resume => "resume",
        }
    }
}

/// Apply `event` to `state`.
///
/// `max_attempts` must be at least 1; a failure on attempt `max_attempts`
/// ends the run as `Exhausted`.
pub fn advance(
    state: EngineState,
    event: EngineEvent,
    max_attempts: u32,
) -> Result<EngineState, InvalidTransition> {
    let invalid = InvalidTransition {
        state: state.name(),
        event: event.name(),
    };
    let next = match (state, event) {
        (EngineState::Generating { attempt, .. }, EngineEvent::CodeGenerated) => {
            EngineState::Executing { attempt }
        }
        (EngineState::Generating { attempt, .. }, EngineEvent::GeneratorUnavailable(reason)) => {
            EngineState::Done(Terminal::GeneratorUnavailable { attempt, reason })
        }
        (EngineState::Executing { attempt }, EngineEvent::ExecutionPassed) => {
            EngineState::Validating { attempt }
        }
        (EngineState::Executing { attempt }, EngineEvent::ExecutionFailed(feedback))
        | (EngineState::Validating { attempt }, EngineEvent::ValidationFailed(feedback)) => {
            fail(attempt, feedback, max_attempts)
        }
        (EngineState::Validating { attempt }, EngineEvent::ValidationPassed) => {
            EngineState::Done(Terminal::Succeeded { attempt })
        }
        (EngineState::Retrying { attempt, feedback }, EngineEvent::Resume) => {
            EngineState::Generating {
                attempt: attempt + 1,
                feedback: Some(feedback),
            }
        }
        _ => return Err(invalid),
    };
    Ok(next)
}

fn fail(attempt: u32, feedback: Feedback, max_attempts: u32) -> EngineState {
    if attempt >= max_attempts {
        EngineState::Done(Terminal::Exhausted { attempts: attempt })
    } else {
        EngineState::Retrying { attempt, feedback }
    }
}

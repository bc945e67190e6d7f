use serde::{Deserialize, Serialize};

use engine::core::types::EngineStop;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Exhausted,
    Unavailable,
    /// The engine refused to start (bad inputs, unreadable rules, I/O).
    Error,
}

/// `None` means the engine returned an error instead of an outcome.
pub fn classify_outcome(stop: Option<&EngineStop>) -> Outcome {
    match stop {
        Some(EngineStop::Succeeded { .. }) => Outcome::Succeeded,
        Some(EngineStop::Exhausted { .. }) => Outcome::Exhausted,
        Some(EngineStop::GeneratorUnavailable { .. }) => Outcome::Unavailable,
        None => Outcome::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_stop() {
        assert_eq!(
            classify_outcome(Some(&EngineStop::Succeeded { attempt: 2 })),
            Outcome::Succeeded
        );
        assert_eq!(
            classify_outcome(Some(&EngineStop::Exhausted {
                attempts: 3,
                max_attempts: 3
            })),
            Outcome::Exhausted
        );
        assert_eq!(
            classify_outcome(Some(&EngineStop::GeneratorUnavailable {
                attempt: 1,
                reason: "down".to_string()
            })),
            Outcome::Unavailable
        );
        assert_eq!(classify_outcome(None), Outcome::Error);
    }
}

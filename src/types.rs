// =============================================================================
// Shared types used across the signal service
// =============================================================================

use serde::{Deserialize, Serialize};

/// Discrete trading recommendation produced by the strategy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    /// Not enough data to decide.
    Wait,
    Buy,
    Sell,
    Hold,
}

impl Default for Signal {
    fn default() -> Self {
        Self::Wait
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wait => write!(f, "WAIT"),
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// State of the ingestion loop as seen from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    /// Last poll succeeded (or none has run yet).
    Polling,
    /// One or more consecutive polls have failed.
    ErrorRecovering,
}

impl Default for LoopState {
    fn default() -> Self {
        Self::Polling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_serialises_uppercase() {
        assert_eq!(serde_json::to_string(&Signal::Wait).unwrap(), "\"WAIT\"");
        assert_eq!(serde_json::to_string(&Signal::Hold).unwrap(), "\"HOLD\"");
        let s: Signal = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(s, Signal::Sell);
        assert_eq!(Signal::Buy.to_string(), "BUY");
    }

    #[test]
    fn loop_state_serialises_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&LoopState::ErrorRecovering).unwrap(),
            "\"ERROR_RECOVERING\""
        );
        assert_eq!(LoopState::default(), LoopState::Polling);
    }
}

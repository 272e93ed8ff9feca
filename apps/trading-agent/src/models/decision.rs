//! Trading decisions produced by the decision oracle.

use serde::{Deserialize, Serialize};

/// Trading action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Enter a new long position.
    Buy,
    /// Exit an existing position.
    Sell,
    /// Keep an existing position as-is.
    Hold,
    /// No trade for this symbol this cycle.
    NoAction,
}

impl Action {
    /// Lowercase wire/ledger representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Hold => "hold",
            Self::NoAction => "no_action",
        }
    }
}

/// A single decision for one symbol.
///
/// Decisions arrive schema-validated from the oracle boundary; the pipeline
/// treats them as read-only input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingDecision {
    /// Ticker symbol.
    pub symbol: String,
    /// What to do.
    pub action: Action,
    /// Confidence score, 0-100.
    pub confidence: f64,
    /// Proposed entry price (buys).
    #[serde(default)]
    pub entry_price: Option<f64>,
    /// Protective stop price (buys).
    #[serde(default)]
    pub stop_loss: Option<f64>,
    /// Take-profit target (buys).
    #[serde(default)]
    pub take_profit: Option<f64>,
    /// Expected holding horizon in days.
    #[serde(default)]
    pub holding_days: Option<u32>,
    /// Short free-text rationale.
    #[serde(default)]
    pub rationale: String,
}

impl TradingDecision {
    /// A safe no-op decision for `symbol`, used when an oracle entry fails
    /// validation and is coerced rather than dropped.
    #[must_use]
    pub fn no_action(symbol: &str, note: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: Action::NoAction,
            confidence: 0.0,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            holding_days: None,
            rationale: note.to_string(),
        }
    }

    /// True when this decision would open a new position.
    #[must_use]
    pub const fn is_entry(&self) -> bool {
        matches!(self.action, Action::Buy)
    }

    /// True when this decision would close an existing position.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        matches!(self.action, Action::Sell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Action::NoAction).unwrap(),
            "\"no_action\""
        );
        assert_eq!(serde_json::to_string(&Action::Buy).unwrap(), "\"buy\"");
    }

    #[test]
    fn no_action_decision_is_neither_entry_nor_exit() {
        let d = TradingDecision::no_action("AAPL", "missing stop_loss");
        assert!(!d.is_entry());
        assert!(!d.is_exit());
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.rationale, "missing stop_loss");
    }

    #[test]
    fn decision_deserializes_with_missing_optionals() {
        let json = r#"{"symbol":"MSFT","action":"hold","confidence":55.0}"#;
        let d: TradingDecision = serde_json::from_str(json).unwrap();
        assert_eq!(d.action, Action::Hold);
        assert!(d.entry_price.is_none());
        assert!(d.rationale.is_empty());
    }
}

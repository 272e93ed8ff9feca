//! Decision oracle boundary.
//!
//! The oracle is an external one-shot subprocess (an LLM CLI) producing a
//! batch of trade proposals as JSON. The boundary here is deliberately
//! lenient: a malformed entry is coerced to a `no_action` decision with a
//! note instead of rejecting the whole batch, so one bad proposal never
//! starves the run of the good ones.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::OracleSettings;
use crate::models::{Action, TradingDecision};

/// Oracle failure.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Subprocess could not be spawned or ran to failure.
    #[error("oracle subprocess failed: {0}")]
    Subprocess(String),

    /// Subprocess exceeded its deadline.
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),

    /// No JSON object could be located in the output.
    #[error("oracle output contained no JSON object")]
    NoJson,

    /// The located JSON did not match the batch schema.
    #[error("oracle output failed to parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of trade proposals.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Produce a decision batch for the given prompt context.
    async fn decide(&self, prompt: &str) -> Result<Vec<TradingDecision>, OracleError>;
}

// ---------------------------------------------------------------------------
// Wire schema
// ---------------------------------------------------------------------------

/// CLI wrapper envelope: `{"type": "result", "result": "<text>"}`.
#[derive(Debug, Deserialize)]
struct CliEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    result: String,
}

#[derive(Debug, Deserialize)]
struct DecisionBatch {
    #[serde(default)]
    decisions: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    symbol: String,
    action: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    entry_price: Option<f64>,
    #[serde(default)]
    stop_loss: Option<f64>,
    #[serde(default)]
    take_profit: Option<f64>,
    #[serde(default)]
    holding_days: Option<u32>,
    #[serde(default)]
    rationale: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Substring between the first `{` and the last `}`, the JSON the model
/// actually produced regardless of surrounding prose or code fences.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

/// Unwrap the CLI envelope if present, otherwise return the input unchanged.
fn unwrap_envelope(output: &str) -> String {
    if let Some(json) = extract_json(output)
        && let Ok(envelope) = serde_json::from_str::<CliEnvelope>(json)
        && envelope.kind == "result"
    {
        return envelope.result;
    }
    output.to_string()
}

/// Parse the decision batch from raw oracle output, coercing invalid entries
/// to `no_action` rather than failing the batch.
pub fn parse_decisions(output: &str) -> Result<Vec<TradingDecision>, OracleError> {
    let inner = unwrap_envelope(output);
    let json = extract_json(&inner).ok_or(OracleError::NoJson)?;
    let batch: DecisionBatch = serde_json::from_str(json)?;
    Ok(batch.decisions.iter().map(sanitize_entry).collect())
}

fn sanitize_entry(value: &serde_json::Value) -> TradingDecision {
    let symbol = value
        .get("symbol")
        .and_then(|v| v.as_str())
        .unwrap_or("UNKNOWN")
        .to_string();

    let raw: RawDecision = match serde_json::from_value(value.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(symbol = %symbol, error = %e, "Oracle entry malformed, coercing to no_action");
            return TradingDecision::no_action(&symbol, &format!("malformed entry: {e}"));
        }
    };

    let action = match raw.action.to_lowercase().as_str() {
        "buy" => Action::Buy,
        "sell" => Action::Sell,
        "hold" => Action::Hold,
        "no_action" | "none" => Action::NoAction,
        other => {
            tracing::warn!(symbol = %raw.symbol, action = %other, "Unknown oracle action, coercing to no_action");
            return TradingDecision::no_action(&raw.symbol, &format!("unknown action {other:?}"));
        }
    };

    // A buy without a coherent price triple is not executable.
    if action == Action::Buy {
        let prices = (raw.entry_price, raw.stop_loss, raw.take_profit);
        let valid = matches!(prices, (Some(e), Some(s), Some(t))
            if e > 0.0 && s > 0.0 && t > 0.0 && (e - s).abs() > f64::EPSILON);
        if !valid {
            tracing::warn!(symbol = %raw.symbol, "Buy entry missing valid prices, coercing to no_action");
            return TradingDecision::no_action(&raw.symbol, "buy without valid entry/stop/target");
        }
    }

    TradingDecision {
        symbol: raw.symbol,
        action,
        confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 100.0),
        entry_price: raw.entry_price,
        stop_loss: raw.stop_loss,
        take_profit: raw.take_profit,
        holding_days: raw.holding_days,
        rationale: raw.rationale.unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// CLI implementation
// ---------------------------------------------------------------------------

/// Production oracle invoking an LLM CLI as a one-shot subprocess.
#[derive(Debug, Clone)]
pub struct CliOracle {
    command: String,
    timeout: Duration,
}

impl CliOracle {
    /// New oracle from settings.
    #[must_use]
    pub fn new(settings: &OracleSettings) -> Self {
        Self {
            command: settings.command.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

#[async_trait]
impl DecisionOracle for CliOracle {
    async fn decide(&self, prompt: &str) -> Result<Vec<TradingDecision>, OracleError> {
        tracing::info!(command = %self.command, "Invoking decision oracle");

        let child = tokio::process::Command::new(&self.command)
            .arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("json")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))?
            .map_err(|e| OracleError::Subprocess(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OracleError::Subprocess(format!(
                "exit {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let decisions = parse_decisions(&stdout)?;
        tracing::info!(count = decisions.len(), "Oracle produced decision batch");
        Ok(decisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_batch() {
        let output = r#"{"decisions":[
            {"symbol":"AAPL","action":"buy","confidence":82,
             "entry_price":230.5,"stop_loss":221.0,"take_profit":252.0},
            {"symbol":"XOM","action":"sell","confidence":70}
        ]}"#;
        let decisions = parse_decisions(output).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].action, Action::Buy);
        assert_eq!(decisions[1].action, Action::Sell);
    }

    #[test]
    fn unwraps_cli_envelope() {
        let inner = r#"{\"decisions\":[{\"symbol\":\"KO\",\"action\":\"hold\",\"confidence\":50}]}"#;
        let output = format!(r#"{{"type":"result","result":"{inner}"}}"#);
        let decisions = parse_decisions(&output).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].symbol, "KO");
        assert_eq!(decisions[0].action, Action::Hold);
    }

    #[test]
    fn extracts_json_from_surrounding_prose() {
        let output = "Here is my analysis:\n```json\n{\"decisions\":[{\"symbol\":\"PG\",\"action\":\"no_action\"}]}\n```\nDone.";
        let decisions = parse_decisions(output).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].action, Action::NoAction);
    }

    #[test]
    fn invalid_entry_coerced_not_dropped() {
        let output = r#"{"decisions":[
            {"symbol":"AAPL","action":"buy"},
            {"symbol":"MSFT","action":"buy","confidence":90,
             "entry_price":400.0,"stop_loss":385.0,"take_profit":440.0}
        ]}"#;
        let decisions = parse_decisions(output).unwrap();
        assert_eq!(decisions.len(), 2);
        // Buy without prices becomes no_action; the valid sibling survives.
        assert_eq!(decisions[0].action, Action::NoAction);
        assert!(decisions[0].rationale.contains("valid"));
        assert_eq!(decisions[1].action, Action::Buy);
    }

    #[test]
    fn unknown_action_coerced() {
        let output = r#"{"decisions":[{"symbol":"GE","action":"short","confidence":60}]}"#;
        let decisions = parse_decisions(output).unwrap();
        assert_eq!(decisions[0].action, Action::NoAction);
    }

    #[test]
    fn buy_with_stop_equal_entry_coerced() {
        let output = r#"{"decisions":[{"symbol":"HD","action":"buy","confidence":75,
            "entry_price":350.0,"stop_loss":350.0,"take_profit":380.0}]}"#;
        let decisions = parse_decisions(output).unwrap();
        assert_eq!(decisions[0].action, Action::NoAction);
    }

    #[test]
    fn confidence_clamped_to_range() {
        let output = r#"{"decisions":[{"symbol":"KO","action":"hold","confidence":250}]}"#;
        let decisions = parse_decisions(output).unwrap();
        assert_eq!(decisions[0].confidence, 100.0);
    }

    #[test]
    fn empty_output_is_an_error() {
        assert!(matches!(parse_decisions("no json here"), Err(OracleError::NoJson)));
    }

    #[test]
    fn empty_decisions_array_is_fine() {
        let decisions = parse_decisions(r#"{"decisions":[]}"#).unwrap();
        assert!(decisions.is_empty());
    }
}

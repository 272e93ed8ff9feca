//! Volatility and macro trend regime classification.

use serde::{Deserialize, Serialize};

/// Volatility regime from the VIX level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VixRegime {
    /// VIX below 20.
    Low,
    /// VIX at or above 20.
    Elevated,
    /// VIX at or above 30.
    Extreme,
}

impl VixRegime {
    /// Classify a VIX close.
    #[must_use]
    pub fn classify(vix: f64) -> Self {
        if vix >= 30.0 {
            Self::Extreme
        } else if vix >= 20.0 {
            Self::Elevated
        } else {
            Self::Low
        }
    }

    /// Maximum concurrent open positions allowed under this regime.
    #[must_use]
    pub const fn max_positions(self) -> usize {
        match self {
            Self::Low => 5,
            Self::Elevated => 3,
            Self::Extreme => 0,
        }
    }
}

/// Broad market trend regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroRegime {
    /// Sustained uptrend.
    Bull,
    /// Sustained downtrend.
    Bear,
    /// No clear trend.
    Range,
}

impl MacroRegime {
    /// Classify from the SPY close vs its 200-day moving average, with the
    /// VIX regime as a tiebreaker in the neutral band.
    ///
    /// Ratio above 1.02 is a bull trend and below 0.98 a bear trend outright.
    /// Inside the band, low volatility plus price above the average reads
    /// bull, extreme volatility plus price below reads bear, anything else
    /// is range-bound.
    #[must_use]
    pub fn classify(spy_close: f64, spy_ma200: f64, vix: VixRegime) -> Self {
        if spy_ma200 <= 0.0 {
            return Self::Range;
        }
        let ratio = spy_close / spy_ma200;
        if ratio > 1.02 {
            return Self::Bull;
        }
        if ratio < 0.98 {
            return Self::Bear;
        }
        match vix {
            VixRegime::Low if ratio > 1.0 => Self::Bull,
            VixRegime::Extreme if ratio < 1.0 => Self::Bear,
            _ => Self::Range,
        }
    }
}

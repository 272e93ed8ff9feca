//! Core value types shared across the pipeline.

pub mod decision;
pub mod order;
pub mod portfolio;
pub mod regime;

pub use decision::{Action, TradingDecision};
pub use order::OrderResult;
pub use portfolio::{PortfolioState, PositionInfo};
pub use regime::{MacroRegime, VixRegime};

//! Risk controls: drawdown circuit breaker, entry gate, position sizer.

pub mod breaker;
pub mod gate;
pub mod sizing;

pub use breaker::{BreakerStatus, CircuitBreaker};
pub use gate::{GateRejection, PositionGate};
pub use sizing::PositionSizer;

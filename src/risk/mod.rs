//! Pure risk derivation for leveraged futures positions.
//!
//! Nothing in this module performs I/O or holds state; every function is
//! safe to call concurrently from any number of readers.

mod calculator;
mod classifier;

pub use calculator::{compute_risk_metrics, margin_pool, RiskMetrics, MAINTENANCE_MARGIN_RATE};
pub use classifier::{classify_risk, RiskLevel};

//! Margin-ratio severity buckets.

use std::fmt;

use serde::Serialize;

/// Discrete liquidation-risk severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a margin ratio (percent) to a severity level. First match wins,
/// evaluated high to low; NaN falls through to `Safe`.
#[must_use]
pub fn classify_risk(margin_ratio_percent: f64) -> RiskLevel {
    if margin_ratio_percent >= 80.0 {
        RiskLevel::Critical
    } else if margin_ratio_percent >= 60.0 {
        RiskLevel::High
    } else if margin_ratio_percent >= 40.0 {
        RiskLevel::Medium
    } else if margin_ratio_percent >= 20.0 {
        RiskLevel::Low
    } else {
        RiskLevel::Safe
    }
}

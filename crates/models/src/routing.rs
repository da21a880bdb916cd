use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceDimension {
    Extraction,
    Match,
    Intent,
}

/// The per-job confidence breakdown and its weakest-link aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub extraction: f64,
    #[serde(rename = "match")]
    pub match_: f64,
    pub intent: f64,
    pub overall: f64,
    pub weakest: ConfidenceDimension,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "route_action")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    AutoUpdate,
    UpdateAndNotify,
    ManualReview,
}

impl RouteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteAction::AutoUpdate => "auto_update",
            RouteAction::UpdateAndNotify => "update_and_notify",
            RouteAction::ManualReview => "manual_review",
        }
    }
}

/// Routing thresholds. `high` may never be configured below 0.75.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteThresholds {
    pub high: f64,
    pub low: f64,
}

impl Default for RouteThresholds {
    fn default() -> Self {
        Self {
            high: 0.85,
            low: 0.60,
        }
    }
}

impl RouteThresholds {
    pub const HIGH_FLOOR: f64 = 0.75;

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.high >= Self::HIGH_FLOOR,
            "high threshold {} is below the floor {}",
            self.high,
            Self::HIGH_FLOOR
        );
        anyhow::ensure!(
            self.low < self.high,
            "low threshold {} must be below high threshold {}",
            self.low,
            self.high
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn threshold_floor_is_enforced() {
        let bad = RouteThresholds {
            high: 0.70,
            low: 0.50,
        };
        assert!(bad.validate().is_err());
        assert!(RouteThresholds::default().validate().is_ok());
    }
}

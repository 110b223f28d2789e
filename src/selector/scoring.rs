//! Vendor score computation.
//!
//! Each vendor gets three component scores on a 0..=100 scale. Cost and speed
//! are linear interpolations between fixed anchors; success rate is used as
//! reported. Vendors with no observed data land on the midpoint so a fresh
//! vendor neither dominates nor starves.

use super::config::ScoringWeights;
use super::performance::VendorPerformance;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// Cost per number at or below which a vendor scores 100.
const COST_BEST: f64 = 0.05;
/// Cost per number at or above which a vendor scores 0.
const COST_WORST: f64 = 0.20;
/// Response time at or below which a vendor scores 100.
const SPEED_BEST_MS: f64 = 1_000.0;
/// Response time at or above which a vendor scores 0.
const SPEED_WORST_MS: f64 = 60_000.0;
/// Midpoint score assigned when a dimension has no observed data.
const NO_DATA_SCORE: f64 = 50.0;

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Score the average cost per number on a 0..=100 scale, cheaper is better.
fn cost_score(average_cost: f64) -> f64 {
    if average_cost == 0.0 {
        return NO_DATA_SCORE;
    }
    clamp01((COST_WORST - average_cost) / (COST_WORST - COST_BEST)) * 100.0
}

/// Score the average response time on a 0..=100 scale, faster is better.
fn speed_score(average_response_time_ms: f64) -> f64 {
    if average_response_time_ms == 0.0 {
        return NO_DATA_SCORE;
    }
    clamp01((SPEED_WORST_MS - average_response_time_ms) / (SPEED_WORST_MS - SPEED_BEST_MS)) * 100.0
}

/// Component scores for one vendor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Cost component, 0..=100.
    pub cost: f64,
    /// Speed component, 0..=100.
    pub speed: f64,
    /// Success rate component, 0..=100.
    pub success_rate: f64,
}

impl ScoreBreakdown {
    /// Compute component scores from a performance snapshot.
    pub fn from_performance(performance: &VendorPerformance) -> Self {
        Self {
            cost: cost_score(performance.average_cost),
            speed: speed_score(performance.average_response_time_ms),
            success_rate: performance.success_rate,
        }
    }

    /// Weighted total score.
    pub fn total(&self, weights: &ScoringWeights) -> f64 {
        self.cost * weights.cost
            + self.speed * weights.speed
            + self.success_rate * weights.success_rate
    }
}

impl Display for ScoreBreakdown {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cost={:.1} speed={:.1} success={:.1}",
            self.cost, self.speed, self.success_rate
        )
    }
}

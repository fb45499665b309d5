//! Season-scoped distribution policy.
//!
//! Per-season knobs (rank curve, builder share, residual placement) are a
//! small tagged configuration value resolved once per distribution run.
//! Conservation of the weekly pool is the hard contract; residual placement
//! is policy.

use serde::{Deserialize, Serialize};

/// Monotonically decreasing rank-weight curve, fixed per season.
///
/// The weekly pool for rank `r` is
/// `weekly_allocated_points * weight(r) / normalisation_factor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum PointsCurve {
    /// Geometric decay: rank 1 weighs `10_000`, each subsequent rank is
    /// scaled by `decay_bps / 10_000`.
    ExponentialDecay {
        /// Per-rank decay in basis points (< 10 000).
        decay_bps: u64,
    },
    /// Explicit weight table; ranks beyond the table use its last entry.
    Table {
        /// Weights indexed by rank − 1, non-increasing.
        weights: Vec<u64>,
    },
}

impl PointsCurve {
    /// Weight for a 1-based rank.
    #[must_use]
    pub fn weight(&self, rank: u32) -> u64 {
        let rank = rank.max(1);
        match self {
            Self::ExponentialDecay { decay_bps } => {
                let mut weight: u128 = 10_000;
                for _ in 1..rank {
                    weight = weight * u128::from(*decay_bps) / 10_000;
                }
                u64::try_from(weight).unwrap_or(u64::MAX)
            }
            Self::Table { weights } => weights
                .get(rank as usize - 1)
                .or_else(|| weights.last())
                .copied()
                .unwrap_or(0),
        }
    }
}

/// Where truncation residuals land when the backer pool does not divide
/// evenly across stakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualPolicy {
    /// All backer shares truncate toward zero; the residual (at most
    /// `backer_count - 1` minimal units) is credited to the builder.
    CreditBuilder,
    /// Residual units go to backers in largest-fractional-remainder order,
    /// ties broken by larger stake then insertion order.
    LargestRemainder,
}

/// All distribution knobs for one season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonPolicy {
    /// Points allocated to the top-ranked builder's pool each week.
    pub weekly_allocated_points: u64,
    /// Divisor applied to the curve weight.
    pub normalisation_factor: u64,
    /// Builder's fixed share of the pool, in basis points.
    pub builder_share_bps: u64,
    /// Rank curve.
    pub curve: PointsCurve,
    /// Residual placement.
    pub residual: ResidualPolicy,
}

impl SeasonPolicy {
    /// Weekly pool for a builder at the given 1-based rank.
    ///
    /// Intermediate math is u128; the result truncates toward zero.
    #[must_use]
    pub fn weekly_pool(&self, rank: u32) -> u64 {
        if self.normalisation_factor == 0 {
            return 0;
        }
        let pool = u128::from(self.weekly_allocated_points) * u128::from(self.curve.weight(rank))
            / u128::from(self.normalisation_factor);
        u64::try_from(pool).unwrap_or(u64::MAX)
    }
}

impl Default for SeasonPolicy {
    fn default() -> Self {
        Self {
            weekly_allocated_points: 100_000,
            normalisation_factor: 10_000,
            builder_share_bps: 2_000,
            curve: PointsCurve::ExponentialDecay { decay_bps: 9_500 },
            residual: ResidualPolicy::CreditBuilder,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn exponential_curve_decreases_with_rank() {
        let curve = PointsCurve::ExponentialDecay { decay_bps: 9_500 };
        let weights: Vec<u64> = (1..=5).map(|r| curve.weight(r)).collect();
        assert_eq!(weights.first().copied(), Some(10_000));
        for pair in weights.windows(2) {
            let [higher, lower] = pair else {
                panic!("window of two");
            };
            assert!(higher > lower, "curve must strictly decrease");
        }
    }

    #[test]
    fn table_curve_clamps_past_end() {
        let curve = PointsCurve::Table {
            weights: vec![100, 60, 30],
        };
        assert_eq!(curve.weight(1), 100);
        assert_eq!(curve.weight(3), 30);
        assert_eq!(curve.weight(50), 30);
    }

    #[test]
    fn weekly_pool_scales_by_rank() {
        let policy = SeasonPolicy::default();
        // Rank 1: 100_000 * 10_000 / 10_000.
        assert_eq!(policy.weekly_pool(1), 100_000);
        assert!(policy.weekly_pool(2) < policy.weekly_pool(1));
    }

    #[test]
    fn zero_normalisation_yields_zero_pool() {
        let policy = SeasonPolicy {
            normalisation_factor: 0,
            ..SeasonPolicy::default()
        };
        assert_eq!(policy.weekly_pool(1), 0);
    }
}

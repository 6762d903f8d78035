//! Regret score aggregation over toxicity dimensions

use crate::types::analysis::{ToxicityDimension, ToxicityProfile};

/// Weighted sums above this value are stretched
pub const BOOST_KNEE: f64 = 0.3;

/// Slope applied above [`BOOST_KNEE`]
pub const BOOST_FACTOR: f64 = 1.5;

/// Combines a toxicity profile into a single regret score in [0, 1].
///
/// Pure and deterministic: the same profile always yields the same score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreAggregator;

impl ScoreAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Fixed per-dimension weight. The weights sum to 1.25.
    pub fn weight(dimension: ToxicityDimension) -> f64 {
        match dimension {
            ToxicityDimension::Toxicity => 0.25,
            ToxicityDimension::SevereToxicity => 0.30,
            ToxicityDimension::Obscene => 0.10,
            ToxicityDimension::Threat => 0.25,
            ToxicityDimension::Insult => 0.15,
            ToxicityDimension::IdentityAttack => 0.20,
        }
    }

    /// Linear weighted sum over all six dimensions
    pub fn weighted_sum(&self, profile: &ToxicityProfile) -> f64 {
        profile
            .iter()
            .map(|(dimension, value)| value * Self::weight(dimension))
            .sum()
    }

    /// Aggregate a profile into a regret score.
    ///
    /// Sums above the knee are stretched so moderately high inputs reach the
    /// warning range sooner, then the result is clamped to [0, 1].
    pub fn aggregate(&self, profile: &ToxicityProfile) -> f64 {
        let mut score = self.weighted_sum(profile);

        if score > BOOST_KNEE {
            score = BOOST_KNEE + (score - BOOST_KNEE) * BOOST_FACTOR;
        }

        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(values: [f64; 6]) -> ToxicityProfile {
        let mut profile = ToxicityProfile::neutral();
        for (dimension, value) in ToxicityDimension::ALL.into_iter().zip(values) {
            profile.set(dimension, value);
        }
        profile
    }

    #[test]
    fn test_weights_sum() {
        let total: f64 = ToxicityDimension::ALL
            .iter()
            .map(|&d| ScoreAggregator::weight(d))
            .sum();
        assert!((total - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_boosted_scenario() {
        let aggregator = ScoreAggregator::new();
        let p = profile([0.9, 0.9, 0.1, 0.1, 0.8, 0.3]);

        // 0.225 + 0.27 + 0.01 + 0.025 + 0.12 + 0.06 = 0.71
        assert!((aggregator.weighted_sum(&p) - 0.71).abs() < 1e-9);
        // 0.3 + (0.71 - 0.3) * 1.5 = 0.915
        assert!((aggregator.aggregate(&p) - 0.915).abs() < 1e-9);
    }

    #[test]
    fn test_below_knee_is_linear() {
        let aggregator = ScoreAggregator::new();
        let p = profile([0.4, 0.0, 0.0, 0.0, 0.0, 0.0]);

        assert!((aggregator.aggregate(&p) - 0.1).abs() < 1e-12);

        // Exactly at the knee is not boosted
        let at_knee = profile([0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert!((aggregator.aggregate(&at_knee) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_neutral_profile_scores_zero() {
        assert_eq!(ScoreAggregator::new().aggregate(&ToxicityProfile::neutral()), 0.0);
    }

    #[test]
    fn test_saturated_profile_clamped() {
        let score = ScoreAggregator::new().aggregate(&profile([1.0; 6]));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_bounded_and_deterministic_over_grid() {
        let aggregator = ScoreAggregator::new();
        let steps = [0.0, 0.1, 0.35, 0.5, 0.77, 1.0];

        for &a in &steps {
            for &b in &steps {
                for &c in &steps {
                    let p = profile([a, b, c, b, a, c]);
                    let first = aggregator.aggregate(&p);
                    let second = aggregator.aggregate(&p);
                    assert!((0.0..=1.0).contains(&first));
                    assert_eq!(first.to_bits(), second.to_bits());
                }
            }
        }
    }
}

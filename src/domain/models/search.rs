//! Search results and similarity scoring

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One search result, ordered as produced by the search pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Url of the matched image.
    pub url: String,
    /// Parsed metadata stored with the image (JSON `null` when absent).
    pub metadata: Value,
    /// Similarity score in [0, 100]; 100 means identical.
    pub similarity: f64,
}

/// Converts a squared L2 distance between unit-norm vectors to a
/// similarity score.
///
/// The maximum squared distance between two unit vectors on the same
/// half-space is 2, so the score is `100 * (1 - distance / 2)`, clamped to
/// [0, 100] to absorb denormalised inputs.
#[must_use]
pub fn similarity_score(distance: f64) -> f64 {
    (100.0 * (1.0 - distance / 2.0)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_score_100() {
        assert!((similarity_score(0.0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_orthogonal_unit_vectors_score_0() {
        // Squared distance between orthogonal unit vectors is 2.
        assert!(similarity_score(2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_is_clamped() {
        assert!((similarity_score(4.0) - 0.0).abs() < f64::EPSILON);
        assert!((similarity_score(-0.5) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_midpoint() {
        assert!((similarity_score(1.0) - 50.0).abs() < f64::EPSILON);
    }
}

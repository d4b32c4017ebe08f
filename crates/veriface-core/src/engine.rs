//! Match decision engine.
//!
//! Turns a pair of embeddings into a distance, a similarity percentage, and
//! a threshold-gated match decision. Pure numeric policy; no side effects.

use crate::types::Embedding;

/// Default match threshold. Tightened from the customary 0.6 for stricter
/// identity assurance in attendance use.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.50;

/// Outcome of comparing two embeddings at a given threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchDecision {
    /// Euclidean distance between the embeddings. 0 = identical.
    pub distance: f32,
    /// `max(0, (1 - distance) * 100)`. Distances above 1 collapse to 0.
    pub similarity: f32,
    /// `distance < threshold` (strict).
    pub is_match: bool,
}

/// Compare a reference embedding against a candidate embedding.
///
/// Both embeddings must come from the same extractor configuration and have
/// equal length; the caller guards that contract.
pub fn decide(reference: &Embedding, candidate: &Embedding, threshold: f32) -> MatchDecision {
    debug_assert_eq!(
        reference.len(),
        candidate.len(),
        "embeddings from mismatched extractor configurations"
    );

    let distance = reference.euclidean_distance(candidate);
    let similarity = ((1.0 - distance) * 100.0).max(0.0);

    MatchDecision {
        distance,
        similarity,
        is_match: distance < threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_identical_embeddings_match_at_any_positive_threshold() {
        let a = emb(&[0.2, -0.5, 0.9, 0.0]);
        for threshold in [0.01, 0.5, 1.0, 10.0] {
            let d = decide(&a, &a, threshold);
            assert_eq!(d.distance, 0.0);
            assert_eq!(d.similarity, 100.0);
            assert!(d.is_match, "threshold {threshold}");
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = emb(&[0.1, 0.4, -0.3]);
        let b = emb(&[0.7, -0.2, 0.5]);
        let ab = decide(&a, &b, 0.5);
        let ba = decide(&b, &a, 0.5);
        assert_eq!(ab.distance, ba.distance);
        assert_eq!(ab.similarity, ba.similarity);
    }

    #[test]
    fn test_similarity_for_known_distance() {
        // distance 0.75 → similarity 25.0
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[0.75, 0.0]);
        let d = decide(&a, &b, 0.50);
        assert!((d.distance - 0.75).abs() < 1e-6);
        assert!((d.similarity - 25.0).abs() < 1e-4);
        assert!(!d.is_match);
    }

    #[test]
    fn test_similarity_clamped_at_zero_for_far_embeddings() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[2.0, 0.0]);
        let d = decide(&a, &b, 0.50);
        assert_eq!(d.similarity, 0.0);
        assert!(!d.is_match);
    }

    #[test]
    fn test_similarity_monotonically_non_increasing_in_distance() {
        let origin = emb(&[0.0, 0.0]);
        let mut previous = f32::INFINITY;
        for step in 0..30 {
            let distance = step as f32 * 0.05;
            let d = decide(&origin, &emb(&[distance, 0.0]), 0.50);
            assert!(d.similarity <= previous);
            assert!((0.0..=100.0).contains(&d.similarity));
            previous = d.similarity;
        }
    }

    #[test]
    fn test_threshold_boundary_is_strict() {
        // distance exactly equal to the threshold is NOT a match
        let a = emb(&[0.0]);
        let b = emb(&[0.5]);
        let d = decide(&a, &b, 0.5);
        assert!((d.distance - 0.5).abs() < 1e-7);
        assert!(!d.is_match);

        let just_inside = decide(&a, &emb(&[0.49]), 0.5);
        assert!(just_inside.is_match);
    }
}

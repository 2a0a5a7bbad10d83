//! The matching engine: text and image similarity of report pairs and the
//! all-pairs search built on top of it.

pub mod aggregate;
pub mod classifier;
pub mod http_classifier;
pub mod lexical;
pub mod lexicon;
pub mod search;
pub mod service;
pub mod tokenize;
pub mod visual;

pub use aggregate::{PairOutcome, SimilarityAggregator, SimilarityResult};
pub use classifier::{ClassificationPrediction, ClassifierError, ClassifierService, ImageClassifier};
pub use lexical::LexicalComparator;
pub use search::{MatchCandidate, MatchSearch, DEFAULT_THRESHOLD};
pub use service::{MatchingService, Persistence, SearchOutcome};

const WEIGHT_SUM_TOLERANCE: f32 = 1e-4;

/// Clamp to [0, 1]. NaN maps to 0.
pub(crate) fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Weights of one rule must be non-negative and add up to 1.
pub(crate) fn validate_weights(name: &str, weights: &[f32]) -> Result<(), String> {
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(format!("{name}: weights must be non-negative, got {w}"));
    }

    let sum: f32 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(format!("{name}: weights must sum to 1.0, got {sum}"));
    }

    Ok(())
}

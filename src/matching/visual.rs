//! Visual similarity from classifier labels.
//!
//! Two images are compared rank by rank over their top predictions: the
//! words of the labels at the same rank are matched with the lexical word
//! rule, and the label similarity is weighted by the mean probability of the
//! two predictions.

use crate::matching::classifier::ClassificationPrediction;
use crate::matching::lexical::LexicalComparator;

/// Number of ranks compared at most.
const MAX_COMPARED_RANKS: usize = 3;

/// Compare two prediction lists, each ordered by descending probability.
pub fn image_similarity(
    comparator: &LexicalComparator,
    predictions1: &[ClassificationPrediction],
    predictions2: &[ClassificationPrediction],
) -> f32 {
    if predictions1.is_empty() || predictions2.is_empty() {
        return 0.0;
    }

    let top_n = predictions1
        .len()
        .min(predictions2.len())
        .min(MAX_COMPARED_RANKS);

    let total: f32 = predictions1
        .iter()
        .zip(predictions2.iter())
        .take(top_n)
        .map(|(p1, p2)| {
            let class_similarity = label_similarity(comparator, &p1.label, &p2.label);
            let probability = (p1.probability + p2.probability) / 2.0;
            class_similarity * probability
        })
        .sum();

    // NaN is passed through for the caller to detect
    (total / top_n as f32).clamp(0.0, 1.0)
}

/// Word overlap of the first comma-separated descriptor of each label.
///
/// Classifier labels often list several names ("tabby, tabby cat"); only the
/// first one is compared. Matches are counted from `label1`'s words only.
pub fn label_similarity(comparator: &LexicalComparator, label1: &str, label2: &str) -> f32 {
    let words1 = primary_label_words(label1);
    let words2 = primary_label_words(label2);
    comparator.directed_overlap(&words1, &words2)
}

fn primary_label_words(label: &str) -> Vec<String> {
    let label = label.to_lowercase();
    label
        .split(',')
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

//! Lexical similarity between two free-text descriptions.
//!
//! Four independent measures are blended into one score:
//! - set overlap (Jaccard) of the token sets
//! - fuzzy word overlap, where words match through plurals, synonyms or
//!   near-identical substrings
//! - the same fuzzy overlap restricted to keywords (stop words removed)
//! - the ratio of the cleaned text lengths

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::matching::lexicon::Lexicon;
use crate::matching::tokenize::{clean_text, keywords, tokenize};
use crate::matching::{clamp01, validate_weights};

/// Maximum length difference for a substring to count as the same word.
const MAX_SUBSTRING_LEN_DIFF: usize = 2;

/// Blend weights of the four lexical measures.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LexicalWeights {
    pub jaccard: f32,
    pub word_overlap: f32,
    pub keyword_overlap: f32,
    pub length_ratio: f32,
}

impl Default for LexicalWeights {
    fn default() -> Self {
        Self {
            jaccard: 0.3,
            word_overlap: 0.4,
            keyword_overlap: 0.2,
            length_ratio: 0.1,
        }
    }
}

impl LexicalWeights {
    pub(crate) fn validate(&self) -> Result<(), String> {
        validate_weights(
            "matching.lexical_weights",
            &[
                self.jaccard,
                self.word_overlap,
                self.keyword_overlap,
                self.length_ratio,
            ],
        )
    }
}

/// Per-measure scores for one text pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TextScoreBreakdown {
    pub jaccard: f32,
    pub word_overlap: f32,
    pub keyword_overlap: f32,
    pub length_ratio: f32,
    /// Weighted blend, clamped to [0, 1]
    pub score: f32,
}

/// Compares texts using a fixed lexicon and blend weights.
#[derive(Clone, Debug, Default)]
pub struct LexicalComparator {
    lexicon: Lexicon,
    weights: LexicalWeights,
}

impl LexicalComparator {
    pub fn new(lexicon: Lexicon, weights: LexicalWeights) -> Self {
        Self { lexicon, weights }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Similarity of two texts in [0, 1]. Empty input on either side scores 0.
    pub fn text_similarity(&self, text1: &str, text2: &str) -> f32 {
        self.breakdown(text1, text2).score
    }

    /// Compute every lexical measure for a text pair.
    pub fn breakdown(&self, text1: &str, text2: &str) -> TextScoreBreakdown {
        if text1.is_empty() || text2.is_empty() {
            return TextScoreBreakdown::default();
        }

        let clean1 = clean_text(text1);
        let clean2 = clean_text(text2);

        let tokens1 = tokenize(&clean1, &self.lexicon);
        let tokens2 = tokenize(&clean2, &self.lexicon);
        let keywords1 = keywords(&clean1, &self.lexicon);
        let keywords2 = keywords(&clean2, &self.lexicon);

        let jaccard = jaccard(&tokens1, &tokens2);
        let word_overlap = self.fuzzy_overlap(&tokens1, &tokens2);
        let keyword_overlap = self.fuzzy_overlap(&keywords1, &keywords2);
        let length_ratio = length_ratio(&clean1, &clean2);

        let blended = jaccard * self.weights.jaccard
            + word_overlap * self.weights.word_overlap
            + keyword_overlap * self.weights.keyword_overlap
            + length_ratio * self.weights.length_ratio;

        TextScoreBreakdown {
            jaccard,
            word_overlap,
            keyword_overlap,
            length_ratio,
            score: clamp01(blended),
        }
    }

    /// Heuristic word equivalence. Symmetric in its arguments.
    pub fn are_similar(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }

        if is_plural_of(a, b) || is_plural_of(b, a) {
            return true;
        }

        if self.lexicon.are_synonyms(a, b) {
            return true;
        }

        if a.contains(b) || b.contains(a) {
            let len_a = a.chars().count();
            let len_b = b.chars().count();
            return len_a.abs_diff(len_b) <= MAX_SUBSTRING_LEN_DIFF;
        }

        false
    }

    /// Share of words that find a similar word on the other side.
    ///
    /// Each word counts at most once. Matches are counted from both sides and
    /// averaged so that swapping the arguments never changes the result; both
    /// counts are divided by the longer sequence.
    pub fn fuzzy_overlap<S: AsRef<str>>(&self, words1: &[S], words2: &[S]) -> f32 {
        if words1.is_empty() || words2.is_empty() {
            return 0.0;
        }

        let forward = self.count_matched(words1, words2);
        let backward = self.count_matched(words2, words1);
        let max_len = words1.len().max(words2.len());

        (forward + backward) as f32 / (2 * max_len) as f32
    }

    /// Share of `words1` that find a similar word in `words2`, over the
    /// longer list. Not symmetric.
    pub fn directed_overlap<S: AsRef<str>>(&self, words1: &[S], words2: &[S]) -> f32 {
        if words1.is_empty() || words2.is_empty() {
            return 0.0;
        }

        let matched = self.count_matched(words1, words2);
        matched as f32 / words1.len().max(words2.len()) as f32
    }

    fn count_matched<S: AsRef<str>>(&self, from: &[S], to: &[S]) -> usize {
        from.iter()
            .filter(|w1| to.iter().any(|w2| self.are_similar(w1.as_ref(), w2.as_ref())))
            .count()
    }
}

fn is_plural_of(singular: &str, plural: &str) -> bool {
    plural
        .strip_prefix(singular)
        .map(|rest| rest == "s" || rest == "es")
        .unwrap_or(false)
}

fn jaccard(tokens1: &[String], tokens2: &[String]) -> f32 {
    let set1: HashSet<&str> = tokens1.iter().map(String::as_str).collect();
    let set2: HashSet<&str> = tokens2.iter().map(String::as_str).collect();

    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }

    let intersection = set1.intersection(&set2).count();
    let union = set1.union(&set2).count();

    intersection as f32 / union as f32
}

fn length_ratio(clean1: &str, clean2: &str) -> f32 {
    let len1 = clean1.chars().count();
    let len2 = clean2.chars().count();

    if len1 == 0 || len2 == 0 {
        return 0.0;
    }

    len1.min(len2) as f32 / len1.max(len2) as f32
}

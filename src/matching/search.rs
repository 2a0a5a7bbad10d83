//! All-pairs search across a lost and a found collection.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::matching::aggregate::{PairOutcome, SimilarityAggregator, SimilarityResult};
use crate::matching::classifier::{ClassificationPrediction, ClassifierError, ImageClassifier};
use crate::reports::Report;

/// Candidates at or below this score are discarded.
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// A lost/found pair that cleared the threshold.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub lost_report: Report,
    pub found_report: Report,
    pub similarity: SimilarityResult,
    /// The text-only fallback produced the score
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// Remembers classifications per image reference.
///
/// A report image shows up in every pair the report takes part in, so one
/// search would otherwise classify it `len(other side)` times. Failures are
/// cached as well.
pub struct CachedClassifier {
    inner: Arc<dyn ImageClassifier>,
    cache: RwLock<HashMap<String, Result<Vec<ClassificationPrediction>, ClassifierError>>>,
}

impl CachedClassifier {
    pub fn new(inner: Arc<dyn ImageClassifier>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }
}

impl ImageClassifier for CachedClassifier {
    fn classify(&self, image: &str) -> Result<Vec<ClassificationPrediction>, ClassifierError> {
        if let Ok(cache) = self.cache.read() {
            if let Some(hit) = cache.get(image) {
                return hit.clone();
            }
        }

        let result = self.inner.classify(image);

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(image.to_string(), result.clone());
        }

        result
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

pub struct MatchSearch<'a> {
    aggregator: &'a SimilarityAggregator,
    classifier: Option<CachedClassifier>,
    parallel: bool,
    progress: Option<ProgressBar>,
}

impl<'a> MatchSearch<'a> {
    pub fn new(
        aggregator: &'a SimilarityAggregator,
        classifier: Option<Arc<dyn ImageClassifier>>,
    ) -> Self {
        Self {
            aggregator,
            classifier: classifier.map(CachedClassifier::new),
            parallel: false,
            progress: None,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Tick `progress` once per evaluated pair.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Compare every lost report with every found report and return the pairs
    /// scoring strictly above `threshold`, best first.
    ///
    /// Equal scores keep lost-major, found-minor order.
    pub fn find_matches(
        &self,
        lost: &[Report],
        found: &[Report],
        threshold: f32,
    ) -> Vec<MatchCandidate> {
        let pairs: Vec<(&Report, &Report)> = lost
            .iter()
            .flat_map(|l| found.iter().map(move |f| (l, f)))
            .collect();

        log::info!(
            "comparing {} lost and {} found reports ({} pairs)",
            lost.len(),
            found.len(),
            pairs.len()
        );

        if let Some(progress) = &self.progress {
            progress.set_length(pairs.len() as u64);
        }

        // par_iter keeps the input order on collect
        let outcomes: Vec<PairOutcome> = if self.parallel {
            pairs
                .par_iter()
                .map(|(l, f)| self.evaluate(l, f))
                .collect()
        } else {
            pairs.iter().map(|(l, f)| self.evaluate(l, f)).collect()
        };

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        let degraded = outcomes.iter().filter(|o| o.is_degraded()).count();
        if degraded > 0 {
            log::warn!("{degraded} pair(s) were scored on text only");
        }

        let mut candidates: Vec<MatchCandidate> = pairs
            .into_iter()
            .zip(outcomes)
            .filter(|(_, outcome)| outcome.similarity().score > threshold)
            .map(|((lost_report, found_report), outcome)| MatchCandidate {
                lost_report: lost_report.clone(),
                found_report: found_report.clone(),
                similarity: outcome.similarity(),
                degraded: outcome.is_degraded(),
            })
            .collect();

        // stable, so ties keep generation order
        candidates.sort_by(|a, b| b.similarity.score.total_cmp(&a.similarity.score));

        log::info!(
            "{} candidate(s) above threshold {threshold}",
            candidates.len()
        );

        candidates
    }

    fn evaluate(&self, lost: &Report, found: &Report) -> PairOutcome {
        let classifier = self
            .classifier
            .as_ref()
            .map(|c| c as &dyn ImageClassifier);
        let outcome = self.aggregator.overall_similarity(lost, found, classifier);

        log::debug!(
            "lost #{} vs found #{}: {:.3}",
            lost.id,
            found.id,
            outcome.similarity().score
        );

        if let Some(progress) = &self.progress {
            progress.inc(1);
        }

        outcome
    }
}

use indicatif::ProgressBar;
use std::sync::Arc;

use crate::config::Config;
use crate::matching::aggregate::{PairOutcome, SimilarityAggregator};
use crate::matching::classifier::{ClassifierError, ClassifierService, ImageClassifier};
use crate::matching::lexical::LexicalComparator;
use crate::matching::search::{MatchCandidate, MatchSearch};
use crate::reports::Report;
use crate::store::{MatchStore, NewMatch, StoreError, StoredMatch};

/// What happened to the candidates of a search after ranking.
#[derive(Debug)]
pub enum Persistence {
    /// No store was given
    NotRequested,
    /// Nothing cleared the threshold, the store was not called
    NothingToStore,
    Stored(Vec<StoredMatch>),
    /// The candidates are still valid, they just were not saved
    Failed(StoreError),
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub candidates: Vec<MatchCandidate>,
    pub persistence: Persistence,
}

/// Wires configuration, comparator and classifier together.
pub struct MatchingService {
    config: Config,
    aggregator: SimilarityAggregator,
    classifier: ClassifierService,
}

impl MatchingService {
    pub fn new(config: Config) -> Self {
        let classifier = ClassifierService::new(config.classifier.clone());
        Self::build(config, classifier)
    }

    /// Use an already-built classifier instead of the configured endpoint.
    pub fn with_classifier(config: Config, classifier: Arc<dyn ImageClassifier>) -> Self {
        let classifier = ClassifierService::with_classifier(config.classifier.clone(), classifier);
        Self::build(config, classifier)
    }

    fn build(config: Config, classifier: ClassifierService) -> Self {
        let comparator =
            LexicalComparator::new(config.lexicon.clone(), config.matching.lexical_weights);
        let aggregator = SimilarityAggregator::new(comparator, config.matching.weights);
        Self {
            config,
            aggregator,
            classifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn comparator(&self) -> &LexicalComparator {
        self.aggregator.comparator()
    }

    /// Ready classifier, or `None` when classification is turned off.
    ///
    /// Fails when the classifier is enabled but cannot be initialized.
    pub fn classifier(&self) -> Result<Option<Arc<dyn ImageClassifier>>, ClassifierError> {
        if !self.classifier.is_enabled() && !self.classifier.is_initialized() {
            return Ok(None);
        }
        self.classifier.initialize().map(Some)
    }

    /// Score one pair.
    pub fn compare(&self, lost: &Report, found: &Report) -> Result<PairOutcome, ClassifierError> {
        let classifier = self.classifier()?;
        if classifier.is_none() {
            warn_unscored_images(unscored_image_pairs(
                std::slice::from_ref(lost),
                std::slice::from_ref(found),
            ));
        }
        Ok(self
            .aggregator
            .overall_similarity(lost, found, classifier.as_deref()))
    }

    pub fn find_matches(
        &self,
        lost: &[Report],
        found: &[Report],
        threshold: f32,
        progress: Option<ProgressBar>,
    ) -> Result<Vec<MatchCandidate>, ClassifierError> {
        let classifier = self.classifier()?;
        if classifier.is_none() {
            warn_unscored_images(unscored_image_pairs(lost, found));
        }

        let mut search =
            MatchSearch::new(&self.aggregator, classifier).parallel(self.config.matching.parallel);
        if let Some(progress) = progress {
            search = search.with_progress(progress);
        }

        Ok(search.find_matches(lost, found, threshold))
    }

    /// Run a search and hand the ranked candidates to `store`.
    pub fn search(
        &self,
        lost: &[Report],
        found: &[Report],
        threshold: f32,
        store: Option<&dyn MatchStore>,
        progress: Option<ProgressBar>,
    ) -> Result<SearchOutcome, ClassifierError> {
        let candidates = self.find_matches(lost, found, threshold, progress)?;

        let persistence = match store {
            None => Persistence::NotRequested,
            Some(store) => persist_candidates(&candidates, store),
        };

        Ok(SearchOutcome {
            candidates,
            persistence,
        })
    }
}

/// Pairs in which both reports carry an image.
///
/// Without a classifier these keep the image weighting with an image score
/// of 0.
pub fn unscored_image_pairs(lost: &[Report], found: &[Report]) -> usize {
    let lost_with_images = lost.iter().filter(|r| r.image().is_some()).count();
    let found_with_images = found.iter().filter(|r| r.image().is_some()).count();
    lost_with_images * found_with_images
}

fn warn_unscored_images(pairs: usize) {
    if pairs > 0 {
        log::warn!(
            "image classification is disabled, {pairs} pair(s) with images get an image score of 0; \
             enable the classifier in config.yaml or pass --no-images"
        );
    }
}

/// Store candidates as pending matches, in ranking order.
pub fn persist_candidates(candidates: &[MatchCandidate], store: &dyn MatchStore) -> Persistence {
    if candidates.is_empty() {
        return Persistence::NothingToStore;
    }

    let new_matches: Vec<NewMatch> = candidates
        .iter()
        .map(|c| NewMatch {
            lost_item_id: c.lost_report.id,
            found_item_id: c.found_report.id,
            confidence: c.similarity.score,
        })
        .collect();

    match store.insert_pending(&new_matches) {
        Ok(stored) => Persistence::Stored(stored),
        Err(err) => {
            log::error!("failed to store {} match(es): {err}", new_matches.len());
            Persistence::Failed(err)
        }
    }
}

//! Image classification as consumed by the matcher.
//!
//! The matcher never runs a vision model itself. It talks to an
//! [`ImageClassifier`], which turns an image reference (URL or local path)
//! into labels ordered by probability. [`ClassifierService`] performs the
//! one-time initialization and hands out a ready handle.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::config::ClassifierConfig;
use crate::matching::http_classifier::HttpClassifier;

/// One label produced by the classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationPrediction {
    pub label: String,
    /// Probability in [0, 1]
    pub probability: f32,
}

impl ClassificationPrediction {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Error type for classification operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Image classification is disabled")]
    Disabled,

    #[error("Classifier initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to load image {image}: {reason}")]
    ImageLoad { image: String, reason: String },

    #[error("Classification failed for {image}: {reason}")]
    ClassificationFailed { image: String, reason: String },
}

/// Anything that can label an image.
pub trait ImageClassifier: Send + Sync {
    /// Classify the referenced image. Predictions are ordered by descending
    /// probability and non-empty on success.
    fn classify(&self, image: &str) -> Result<Vec<ClassificationPrediction>, ClassifierError>;

    /// Name for logging
    fn name(&self) -> &'static str;
}

/// Sort by descending probability and keep the first `top_k` entries.
pub fn rank_predictions(
    mut predictions: Vec<ClassificationPrediction>,
    top_k: usize,
) -> Vec<ClassificationPrediction> {
    predictions.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    predictions.truncate(top_k);
    predictions
}

/// Owns classifier initialization.
///
/// `initialize` may be called any number of times; only the first successful
/// call builds the classifier, later calls return the same handle. A failed
/// attempt leaves the service uninitialized so it can be retried.
pub struct ClassifierService {
    config: ClassifierConfig,
    handle: Mutex<Option<Arc<dyn ImageClassifier>>>,
}

impl ClassifierService {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            handle: Mutex::new(None),
        }
    }

    /// Wrap an already-built classifier. The service starts out initialized.
    pub fn with_classifier(config: ClassifierConfig, classifier: Arc<dyn ImageClassifier>) -> Self {
        Self {
            config,
            handle: Mutex::new(Some(classifier)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_initialized(&self) -> bool {
        self.handle
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Initialize the classifier if needed and return a ready handle.
    pub fn initialize(&self) -> Result<Arc<dyn ImageClassifier>, ClassifierError> {
        let mut guard = self
            .handle
            .lock()
            .map_err(|e| ClassifierError::InitFailed(format!("Lock poisoned: {}", e)))?;

        if let Some(classifier) = guard.as_ref() {
            return Ok(Arc::clone(classifier));
        }

        if !self.config.enabled {
            return Err(ClassifierError::Disabled);
        }

        log::info!(
            "Initializing image classifier at '{}'",
            self.config.endpoint
        );
        let classifier: Arc<dyn ImageClassifier> = Arc::new(HttpClassifier::new(&self.config)?);
        log::info!("Image classifier '{}' ready", classifier.name());

        *guard = Some(Arc::clone(&classifier));
        Ok(classifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClassifier;

    impl ImageClassifier for FixedClassifier {
        fn classify(&self, _image: &str) -> Result<Vec<ClassificationPrediction>, ClassifierError> {
            Ok(vec![ClassificationPrediction::new("wallet", 0.9)])
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn test_config(enabled: bool) -> ClassifierConfig {
        ClassifierConfig {
            enabled,
            ..Default::default()
        }
    }

    #[test]
    fn test_rank_predictions_sorts_and_truncates() {
        let ranked = rank_predictions(
            vec![
                ClassificationPrediction::new("b", 0.2),
                ClassificationPrediction::new("a", 0.7),
                ClassificationPrediction::new("d", 0.05),
                ClassificationPrediction::new("c", 0.1),
            ],
            3,
        );
        let labels: Vec<_> = ranked.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_disabled_service_returns_error() {
        let service = ClassifierService::new(test_config(false));
        assert!(matches!(service.initialize(), Err(ClassifierError::Disabled)));
        assert!(!service.is_initialized());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let service =
            ClassifierService::with_classifier(test_config(true), Arc::new(FixedClassifier));
        assert!(service.is_initialized());

        let first = service.initialize().unwrap();
        let second = service.initialize().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "fixed");
    }

    #[test]
    fn test_initialize_fails_without_endpoint() {
        let config = ClassifierConfig {
            enabled: true,
            endpoint: String::new(),
            ..Default::default()
        };
        let service = ClassifierService::new(config);
        assert!(matches!(
            service.initialize(),
            Err(ClassifierError::InitFailed(_))
        ));
        // a failed attempt can be retried
        assert!(!service.is_initialized());
    }
}

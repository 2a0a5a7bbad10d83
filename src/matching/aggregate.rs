//! Combined lexical and visual score for one lost/found pair.
//!
//! The text of both reports is always compared. When both reports carry an
//! image, the two images are classified concurrently and compared as well, and
//! the weighting shifts towards the image signal. The aggregator never fails
//! the caller: classification errors only zero the image score, and anything
//! unexpected falls back to a discounted text-only score, reported as
//! [`PairOutcome::Degraded`].

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::thread;

use crate::matching::classifier::ImageClassifier;
use crate::matching::lexical::LexicalComparator;
use crate::matching::visual::image_similarity;
use crate::matching::{clamp01, validate_weights};
use crate::reports::Report;

/// Text and image weights of one combination rule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightProfile {
    pub text: f32,
    pub image: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationWeights {
    /// Used when both reports have an image
    #[serde(default = "default_with_images")]
    pub with_images: WeightProfile,

    /// Used when at least one report has no image
    #[serde(default = "default_text_only")]
    pub text_only: WeightProfile,

    /// Multiplier applied to the text score on the degraded path
    #[serde(default = "default_fallback_factor")]
    pub fallback_factor: f32,
}

impl Default for AggregationWeights {
    fn default() -> Self {
        Self {
            with_images: default_with_images(),
            text_only: default_text_only(),
            fallback_factor: default_fallback_factor(),
        }
    }
}

fn default_with_images() -> WeightProfile {
    WeightProfile {
        text: 0.6,
        image: 0.4,
    }
}

fn default_text_only() -> WeightProfile {
    WeightProfile {
        text: 0.9,
        image: 0.1,
    }
}

fn default_fallback_factor() -> f32 {
    0.8
}

impl AggregationWeights {
    pub(crate) fn validate(&self) -> Result<(), String> {
        validate_weights(
            "matching.weights.with_images",
            &[self.with_images.text, self.with_images.image],
        )?;
        validate_weights(
            "matching.weights.text_only",
            &[self.text_only.text, self.text_only.image],
        )?;
        if !(0.0..=1.0).contains(&self.fallback_factor) {
            return Err(format!(
                "matching.weights.fallback_factor must be between 0.0 and 1.0, got {}",
                self.fallback_factor
            ));
        }
        Ok(())
    }
}

/// Scores for one report pair, each in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// Overall confidence
    pub score: f32,
    pub text_score: f32,
    pub image_score: f32,
}

/// Unexpected failure while combining the scores of a pair.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("{component} score is not a finite number ({value})")]
    NonFiniteScore { component: &'static str, value: f32 },

    #[error("image classifier panicked: {0}")]
    ClassifierPanicked(String),
}

/// Result of scoring one pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    /// Every signal was combined normally
    Scored(SimilarityResult),
    /// The combined computation failed and the text-only fallback was used
    Degraded {
        result: SimilarityResult,
        cause: AggregationError,
    },
}

impl PairOutcome {
    pub fn similarity(&self) -> SimilarityResult {
        match self {
            PairOutcome::Scored(result) => *result,
            PairOutcome::Degraded { result, .. } => *result,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, PairOutcome::Degraded { .. })
    }
}

#[derive(Clone, Debug, Default)]
pub struct SimilarityAggregator {
    comparator: LexicalComparator,
    weights: AggregationWeights,
}

impl SimilarityAggregator {
    pub fn new(comparator: LexicalComparator, weights: AggregationWeights) -> Self {
        Self {
            comparator,
            weights,
        }
    }

    pub fn comparator(&self) -> &LexicalComparator {
        &self.comparator
    }

    /// Score a pair of reports.
    ///
    /// `classifier` is only consulted when both reports have an image. Without
    /// a classifier such pairs get an image score of 0.
    pub fn overall_similarity(
        &self,
        report1: &Report,
        report2: &Report,
        classifier: Option<&dyn ImageClassifier>,
    ) -> PairOutcome {
        let text1 = report1.full_text();
        let text2 = report2.full_text();

        match self.combine(&text1, &text2, report1.image(), report2.image(), classifier) {
            Ok(result) => PairOutcome::Scored(result),
            Err(cause) => {
                log::warn!(
                    "reports {} and {}: {cause}; falling back to text similarity",
                    report1.id,
                    report2.id
                );
                PairOutcome::Degraded {
                    result: self.text_fallback(&text1, &text2),
                    cause,
                }
            }
        }
    }

    fn combine(
        &self,
        text1: &str,
        text2: &str,
        image1: Option<&str>,
        image2: Option<&str>,
        classifier: Option<&dyn ImageClassifier>,
    ) -> Result<SimilarityResult, AggregationError> {
        let text_score = ensure_finite("text", self.comparator.text_similarity(text1, text2))?;

        let (image_score, weights) = match (image1, image2) {
            (Some(image1), Some(image2)) => (
                self.image_score(image1, image2, classifier)?,
                self.weights.with_images,
            ),
            _ => (0.0, self.weights.text_only),
        };
        let image_score = ensure_finite("image", image_score)?;

        let overall = ensure_finite(
            "overall",
            text_score * weights.text + image_score * weights.image,
        )?;

        log::debug!(
            "text={text_score:.3} image={image_score:.3} overall={overall:.3} weights=({}, {})",
            weights.text,
            weights.image
        );

        Ok(SimilarityResult {
            score: clamp01(overall),
            text_score: clamp01(text_score),
            image_score: clamp01(image_score),
        })
    }

    /// Classify both images concurrently and compare the predictions.
    fn image_score(
        &self,
        image1: &str,
        image2: &str,
        classifier: Option<&dyn ImageClassifier>,
    ) -> Result<f32, AggregationError> {
        let Some(classifier) = classifier else {
            log::debug!("no image classifier available, image score is 0");
            return Ok(0.0);
        };

        let (joined1, joined2) = thread::scope(|s| {
            let handle1 = s.spawn(|| classifier.classify(image1));
            let handle2 = s.spawn(|| classifier.classify(image2));
            (handle1.join(), handle2.join())
        });

        let predictions1 = joined1.map_err(panic_message)?;
        let predictions2 = joined2.map_err(panic_message)?;

        match (predictions1, predictions2) {
            (Ok(predictions1), Ok(predictions2)) => Ok(image_similarity(
                &self.comparator,
                &predictions1,
                &predictions2,
            )),
            (Err(err), _) | (_, Err(err)) => {
                log::warn!("classifier '{}': {err}", classifier.name());
                Ok(0.0)
            }
        }
    }

    fn text_fallback(&self, text1: &str, text2: &str) -> SimilarityResult {
        let text_score = self.comparator.text_similarity(text1, text2);
        let text_score = if text_score.is_finite() {
            clamp01(text_score)
        } else {
            0.0
        };

        SimilarityResult {
            score: clamp01(text_score * self.weights.fallback_factor),
            text_score,
            image_score: 0.0,
        }
    }
}

fn ensure_finite(component: &'static str, value: f32) -> Result<f32, AggregationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AggregationError::NonFiniteScore { component, value })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> AggregationError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    AggregationError::ClassifierPanicked(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_are_valid() {
        assert!(AggregationWeights::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = AggregationWeights {
            with_images: WeightProfile {
                text: 0.7,
                image: 0.4,
            },
            ..Default::default()
        };
        assert!(weights.validate().is_err());

        let weights = AggregationWeights {
            text_only: WeightProfile {
                text: 1.1,
                image: -0.1,
            },
            ..Default::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_fallback_factor_range() {
        let weights = AggregationWeights {
            fallback_factor: 1.5,
            ..Default::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_outcome_accessors() {
        let result = SimilarityResult {
            score: 0.4,
            text_score: 0.5,
            image_score: 0.0,
        };
        let scored = PairOutcome::Scored(result);
        assert!(!scored.is_degraded());
        assert_eq!(scored.similarity(), result);

        let degraded = PairOutcome::Degraded {
            result,
            cause: AggregationError::ClassifierPanicked("boom".into()),
        };
        assert!(degraded.is_degraded());
        assert_eq!(degraded.similarity(), result);
    }

    #[test]
    fn test_ensure_finite() {
        assert_eq!(ensure_finite("text", 0.5), Ok(0.5));
        assert!(matches!(
            ensure_finite("image", f32::NAN),
            Err(AggregationError::NonFiniteScore { component: "image", .. })
        ));
    }
}

//! HTTP adapter for an external image classification service.
//!
//! The service receives raw image bytes in a POST body and answers with JSON,
//! either a bare list or an object with a `predictions` list:
//!
//! ```json
//! [{"label": "wallet", "probability": 0.83}, {"className": "purse", "score": 0.1}]
//! ```

use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::ClassifierConfig;
use crate::images::{detect_mime, load_image_bytes};
use crate::matching::classifier::{
    rank_predictions, ClassificationPrediction, ClassifierError, ImageClassifier,
};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    List(Vec<RawPrediction>),
    Wrapped { predictions: Vec<RawPrediction> },
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    #[serde(alias = "className", alias = "class_name")]
    label: String,
    #[serde(alias = "score", alias = "confidence")]
    probability: f32,
}

pub struct HttpClassifier {
    client: reqwest::blocking::Client,
    endpoint: Url,
    top_k: usize,
    retries: u32,
    max_image_bytes: usize,
}

impl HttpClassifier {
    /// Build the HTTP client and, when a health url is configured, check that
    /// the service is up and its model is loaded.
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ClassifierError::InitFailed(format!("invalid endpoint '{}': {}", config.endpoint, e))
        })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClassifierError::InitFailed(format!("failed to build http client: {}", e)))?;

        if let Some(health_url) = &config.health_url {
            probe_health(&client, health_url)?;
        }

        Ok(Self {
            client,
            endpoint,
            top_k: config.top_k,
            retries: config.retries,
            max_image_bytes: config.max_image_bytes,
        })
    }
}

impl ImageClassifier for HttpClassifier {
    fn classify(&self, image: &str) -> Result<Vec<ClassificationPrediction>, ClassifierError> {
        let bytes = load_image_bytes(&self.client, image, self.retries, self.max_image_bytes)
            .map_err(|e| ClassifierError::ImageLoad {
                image: image.to_string(),
                reason: format!("{e:#}"),
            })?;

        let failed = |reason: String| ClassifierError::ClassificationFailed {
            image: image.to_string(),
            reason,
        };

        log::debug!("classifying {image} ({} bytes)", bytes.len());

        let body = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, detect_mime(&bytes))
            .body(bytes)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .map_err(|e| failed(e.to_string()))?;

        parse_predictions(&body, self.top_k).map_err(failed)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn probe_health(client: &reqwest::blocking::Client, health_url: &str) -> Result<(), ClassifierError> {
    log::debug!("probing classifier health at {health_url}");
    let resp = client
        .get(health_url)
        .send()
        .map_err(|e| ClassifierError::InitFailed(format!("health check failed: {}", e)))?;

    if !resp.status().is_success() {
        return Err(ClassifierError::InitFailed(format!(
            "health check returned {}",
            resp.status()
        )));
    }

    Ok(())
}

/// Parse and validate a classification response body.
pub(crate) fn parse_predictions(
    body: &str,
    top_k: usize,
) -> Result<Vec<ClassificationPrediction>, String> {
    let response: ClassifyResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed response: {}", e))?;

    let raw = match response {
        ClassifyResponse::List(list) => list,
        ClassifyResponse::Wrapped { predictions } => predictions,
    };

    if raw.is_empty() {
        return Err("classifier returned no predictions".to_string());
    }

    let predictions = raw
        .into_iter()
        .map(|p| {
            if !p.probability.is_finite() || !(0.0..=1.0).contains(&p.probability) {
                return Err(format!(
                    "probability {} for '{}' is outside [0, 1]",
                    p.probability, p.label
                ));
            }
            Ok(ClassificationPrediction::new(p.label, p.probability))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rank_predictions(predictions, top_k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_list() {
        let body = r#"[{"label": "purse", "probability": 0.2}, {"label": "wallet", "probability": 0.7}]"#;
        let predictions = parse_predictions(body, 3).unwrap();
        assert_eq!(predictions[0], ClassificationPrediction::new("wallet", 0.7));
        assert_eq!(predictions[1], ClassificationPrediction::new("purse", 0.2));
    }

    #[test]
    fn test_parse_wrapped_with_aliases() {
        let body = r#"{"predictions": [
            {"className": "tabby, tabby cat", "probability": 0.6},
            {"class_name": "tiger cat", "score": 0.3},
            {"label": "Egyptian cat", "confidence": 0.05},
            {"label": "lynx", "probability": 0.01}
        ]}"#;
        let predictions = parse_predictions(body, 3).unwrap();
        assert_eq!(predictions.len(), 3);
        assert_eq!(predictions[0].label, "tabby, tabby cat");
        assert_eq!(predictions[2].label, "Egyptian cat");
    }

    #[test]
    fn test_parse_rejects_empty_and_out_of_range() {
        assert!(parse_predictions("[]", 3).is_err());
        assert!(parse_predictions(r#"[{"label": "x", "probability": 1.5}]"#, 3).is_err());
        assert!(parse_predictions(r#"{"error": "model not loaded"}"#, 3).is_err());
        assert!(parse_predictions("not json", 3).is_err());
    }

    #[test]
    fn test_new_rejects_invalid_endpoint() {
        let config = ClassifierConfig {
            enabled: true,
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpClassifier::new(&config),
            Err(ClassifierError::InitFailed(_))
        ));
    }

    #[test]
    fn test_missing_image_is_load_error() {
        let config = ClassifierConfig {
            enabled: true,
            ..Default::default()
        };
        let classifier = HttpClassifier::new(&config).unwrap();
        let result = classifier.classify("/nonexistent/lostfound/missing.jpg");
        assert!(matches!(result, Err(ClassifierError::ImageLoad { .. })));
    }
}

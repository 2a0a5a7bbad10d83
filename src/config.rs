use crate::{
    matching::{
        aggregate::AggregationWeights, lexical::LexicalWeights, lexicon::Lexicon,
        search::DEFAULT_THRESHOLD,
    },
    storage::{self, StorageManager},
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.yaml";

/// Default classification endpoint of a locally running classifier service
const DEFAULT_CLASSIFIER_ENDPOINT: &str = "http://127.0.0.1:8501/classify";
/// Default request timeout in seconds
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 10;
/// Number of labels kept per image
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_RETRIES: u32 = 2;
/// Larger images are not sent to the classifier
const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("config file is not valid utf8")]
    NotUtf8,

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the external image classifier
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Classify report images. When off, every pair is scored on text only.
    #[serde(default)]
    pub enabled: bool,

    /// Endpoint receiving image bytes in a POST body
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Checked once at initialization when set
    #[serde(default)]
    pub health_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Retries for fetching remote images
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            health_url: None,
            timeout_secs: DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            top_k: DEFAULT_TOP_K,
            retries: DEFAULT_RETRIES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_CLASSIFIER_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_CLASSIFIER_TIMEOUT_SECS
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_max_image_bytes() -> usize {
    DEFAULT_MAX_IMAGE_BYTES
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Pairs must score strictly above this to become candidates
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default)]
    pub weights: AggregationWeights,

    #[serde(default)]
    pub lexical_weights: LexicalWeights,

    /// Evaluate pairs on the rayon thread pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            weights: AggregationWeights::default(),
            lexical_weights: LexicalWeights::default(),
            parallel: true,
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_parallel() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub lexicon: Lexicon,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Match store file, relative to the base directory
    #[serde(default = "default_store_file")]
    pub store_file: String,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            matching: MatchingConfig::default(),
            lexicon: Lexicon::default(),
            classifier: ClassifierConfig::default(),
            store_file: default_store_file(),
            base_path: String::new(),
        }
    }
}

fn default_store_file() -> String {
    "matches.csv".to_string()
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let matching = &self.matching;
        if !(0.0..=1.0).contains(&matching.threshold) {
            return Err(ConfigError::Invalid(format!(
                "matching.threshold must be between 0.0 and 1.0, got {}",
                matching.threshold
            )));
        }

        matching.weights.validate().map_err(ConfigError::Invalid)?;
        matching
            .lexical_weights
            .validate()
            .map_err(ConfigError::Invalid)?;

        self.lexicon.validate().map_err(ConfigError::Invalid)?;

        let classifier = &self.classifier;
        if classifier.top_k == 0 {
            return Err(ConfigError::Invalid(
                "classifier.top_k must be greater than 0".to_string(),
            ));
        }
        if classifier.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "classifier.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if classifier.max_image_bytes == 0 {
            return Err(ConfigError::Invalid(
                "classifier.max_image_bytes must be greater than 0".to_string(),
            ));
        }
        if classifier.enabled && classifier.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "classifier.endpoint is required when the classifier is enabled".to_string(),
            ));
        }

        if self.store_file.trim().is_empty() {
            return Err(ConfigError::Invalid("store_file must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn load_with(base_path: &str) -> Result<Self, ConfigError> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            log::info!("Writing default config to {base_path}/{CONFIG_FILE}");
            store.write(
                CONFIG_FILE,
                serde_yml::to_string(&Self::default())?.as_bytes(),
            )?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).map_err(|_| ConfigError::NotUtf8)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_string();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            log::debug!("Upgrading {CONFIG_FILE}");
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

//! Word tables used by the lexical comparator.
//!
//! The lexicon is plain configuration data: a synonym table, a stop-word set,
//! suffix-stripping rules and the minimum token length. It is loaded from
//! `config.yaml` (or built from defaults) and handed to the comparator, which
//! never mutates it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Tokens shorter than this (in characters) are dropped.
const DEFAULT_MIN_TOKEN_LEN: usize = 3;

/// Tokens of this length or shorter are never stemmed.
const DEFAULT_MAX_UNSTEMMED_LEN: usize = 3;

const DEFAULT_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "can", "which", "that", "this",
    "these", "those", "then", "than", "when", "where", "why", "how", "what", "who",
];

const DEFAULT_SYNONYMS: &[(&str, &[&str])] = &[
    ("wallet", &["purse", "money", "cardholder"]),
    ("brown", &["tan", "beige", "dark"]),
    ("leather", &["fake", "genuine", "material"]),
    ("phone", &["mobile", "cellphone", "smartphone"]),
    ("keys", &["key", "keychain", "keyring"]),
    ("bag", &["purse", "handbag", "backpack"]),
    ("book", &["notebook", "textbook", "novel"]),
];

/// Suffix rules in priority order. `s` sits before `es`, so a word such as
/// "boxes" stems to "boxe"; `es` plurals are matched later by the plural rule
/// of the word comparison instead.
const DEFAULT_SUFFIXES: &[&str] = &["ing", "ed", "s"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    /// Base word -> variants considered equivalent to it.
    #[serde(default = "default_synonyms")]
    pub synonyms: BTreeMap<String, BTreeSet<String>>,

    #[serde(default = "default_stop_words")]
    pub stop_words: BTreeSet<String>,

    /// Suffixes tried in order; the first one that matches is stripped once.
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,

    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,

    #[serde(default = "default_max_unstemmed_len")]
    pub max_unstemmed_len: usize,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            synonyms: default_synonyms(),
            stop_words: default_stop_words(),
            suffixes: default_suffixes(),
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            max_unstemmed_len: DEFAULT_MAX_UNSTEMMED_LEN,
        }
    }
}

fn default_synonyms() -> BTreeMap<String, BTreeSet<String>> {
    DEFAULT_SYNONYMS
        .iter()
        .map(|(base, variants)| {
            (
                base.to_string(),
                variants.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

fn default_stop_words() -> BTreeSet<String> {
    DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect()
}

fn default_suffixes() -> Vec<String> {
    DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

fn default_min_token_len() -> usize {
    DEFAULT_MIN_TOKEN_LEN
}

fn default_max_unstemmed_len() -> usize {
    DEFAULT_MAX_UNSTEMMED_LEN
}

impl Lexicon {
    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    pub fn is_long_enough(&self, word: &str) -> bool {
        word.chars().count() >= self.min_token_len
    }

    /// True if one word is a base entry and the other is one of its variants.
    pub fn are_synonyms(&self, a: &str, b: &str) -> bool {
        let listed = |base: &str, variant: &str| {
            self.synonyms
                .get(base)
                .map(|variants| variants.contains(variant))
                .unwrap_or(false)
        };

        listed(a, b) || listed(b, a)
    }

    /// Strip the first matching suffix. Short words are returned unchanged.
    pub fn stem(&self, word: &str) -> String {
        if word.chars().count() <= self.max_unstemmed_len {
            return word.to_string();
        }

        self.suffixes
            .iter()
            .find_map(|suffix| word.strip_suffix(suffix.as_str()))
            .unwrap_or(word)
            .to_string()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.min_token_len == 0 {
            return Err("lexicon.min_token_len must be at least 1".to_string());
        }
        if self.suffixes.iter().any(|s| s.is_empty()) {
            return Err("lexicon.suffixes must not contain an empty suffix".to_string());
        }
        let not_lowercase = self
            .synonyms
            .iter()
            .flat_map(|(base, variants)| std::iter::once(base).chain(variants.iter()))
            .chain(self.stop_words.iter())
            .find(|word| word.to_lowercase() != **word);
        if let Some(word) = not_lowercase {
            return Err(format!("lexicon entries must be lowercase, got {word:?}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_priority_order() {
        let lexicon = Lexicon::default();
        assert_eq!(lexicon.stem("searching"), "search");
        assert_eq!(lexicon.stem("dropped"), "dropp");
        assert_eq!(lexicon.stem("wallets"), "wallet");
        // `s` wins over `es`
        assert_eq!(lexicon.stem("boxes"), "boxe");
    }

    #[test]
    fn test_stem_skips_short_words() {
        let lexicon = Lexicon::default();
        assert_eq!(lexicon.stem("bus"), "bus");
        assert_eq!(lexicon.stem("red"), "red");
        assert_eq!(lexicon.stem("keys"), "key");
    }

    #[test]
    fn test_stem_applies_once() {
        let lexicon = Lexicon::default();
        // only "ing" is removed, the remaining "s" stays
        assert_eq!(lexicon.stem("blessing"), "bless");
    }

    #[test]
    fn test_custom_suffix_order() {
        let lexicon = Lexicon {
            suffixes: vec!["es".into(), "s".into()],
            ..Default::default()
        };
        assert_eq!(lexicon.stem("boxes"), "box");
        assert_eq!(lexicon.stem("cards"), "card");
    }

    #[test]
    fn test_synonyms_both_directions() {
        let lexicon = Lexicon::default();
        assert!(lexicon.are_synonyms("wallet", "purse"));
        assert!(lexicon.are_synonyms("purse", "wallet"));
        assert!(lexicon.are_synonyms("smartphone", "phone"));
        // variants of the same base are not synonyms of each other
        assert!(!lexicon.are_synonyms("purse", "money"));
        assert!(!lexicon.are_synonyms("wallet", "phone"));
    }

    #[test]
    fn test_stop_words() {
        let lexicon = Lexicon::default();
        assert!(lexicon.is_stop_word("which"));
        assert!(lexicon.is_stop_word("the"));
        assert!(!lexicon.is_stop_word("wallet"));
    }

    #[test]
    fn test_validate_rejects_uppercase_entries() {
        let mut lexicon = Lexicon::default();
        lexicon
            .synonyms
            .insert("Umbrella".into(), BTreeSet::from(["brolly".to_string()]));
        assert!(lexicon.validate().is_err());
        assert!(Lexicon::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let lexicon: Lexicon = serde_yml::from_str("min_token_len: 4\n").unwrap();
        assert_eq!(lexicon.min_token_len, 4);
        assert_eq!(lexicon.synonyms, Lexicon::default().synonyms);
        assert_eq!(lexicon.suffixes, vec!["ing", "ed", "s"]);
    }
}

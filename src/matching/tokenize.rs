//! Text normalization for lexical comparison.
//!
//! Turns free text into comparable tokens:
//! 1. Lowercase
//! 2. Replace everything that is not a word character or whitespace with a space
//! 3. Collapse whitespace and trim
//! 4. Split, drop short tokens, strip one suffix per token

use crate::matching::lexicon::Lexicon;

/// Lowercase the text, turn punctuation into spaces and collapse whitespace.
///
/// Word characters are alphanumerics and `_`.
pub fn clean_text(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split already-cleaned text into stemmed tokens.
pub fn tokenize(cleaned: &str, lexicon: &Lexicon) -> Vec<String> {
    cleaned
        .split(' ')
        .filter(|word| lexicon.is_long_enough(word))
        .map(|word| lexicon.stem(word))
        .collect()
}

/// Clean and tokenize raw text.
pub fn normalize(text: &str, lexicon: &Lexicon) -> Vec<String> {
    tokenize(&clean_text(text), lexicon)
}

/// Tokens of already-cleaned text with stop words removed.
///
/// The length filter runs again because stemming can shorten a token.
pub fn keywords(cleaned: &str, lexicon: &Lexicon) -> Vec<String> {
    tokenize(cleaned, lexicon)
        .into_iter()
        .filter(|word| !lexicon.is_stop_word(word) && lexicon.is_long_enough(word))
        .collect()
}

/// Clean raw text and extract its keywords.
pub fn extract_keywords(text: &str, lexicon: &Lexicon) -> Vec<String> {
    keywords(&clean_text(text), lexicon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_punctuation_and_case() {
        assert_eq!(clean_text("Brown, Leather-Wallet!!"), "brown leather wallet");
        assert_eq!(clean_text("  lots   of\t\nspace  "), "lots of space");
        assert_eq!(clean_text("snake_case stays"), "snake_case stays");
    }

    #[test]
    fn test_clean_text_empty() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("?!.,"), "");
    }

    #[test]
    fn test_normalize_drops_short_tokens() {
        let lexicon = Lexicon::default();
        assert_eq!(
            normalize("I lost my red pen at it", &lexicon),
            vec!["lost", "red", "pen"]
        );
    }

    #[test]
    fn test_normalize_stems() {
        let lexicon = Lexicon::default();
        assert_eq!(
            normalize("Keys dropped while running", &lexicon),
            vec!["key", "dropp", "while", "runn"]
        );
    }

    #[test]
    fn test_normalize_empty_input() {
        let lexicon = Lexicon::default();
        assert!(normalize("", &lexicon).is_empty());
        assert!(normalize("a b c", &lexicon).is_empty());
    }

    #[test]
    fn test_extract_keywords_removes_stop_words() {
        let lexicon = Lexicon::default();
        assert_eq!(
            extract_keywords("The wallet which was found near the library", &lexicon),
            vec!["wallet", "found", "near", "library"]
        );
    }

    #[test]
    fn test_keywords_refilter_after_stemming() {
        let lexicon = Lexicon::default();
        // "sing" stems to "s" which is then too short
        assert_eq!(extract_keywords("sing songs", &lexicon), vec!["song"]);
    }
}

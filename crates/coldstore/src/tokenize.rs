//! Lexical tokenization matching `unicode61`-style FTS tokenizers: runs of
//! letters and digits, lowercased, everything else is a separator.

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("static pattern is valid"));

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_punctuation_and_lowercases() {
        assert_eq!(
            tokenize("Hello, World! 123"),
            vec!["hello", "world", "123"]
        );
    }

    #[test]
    fn empty_text_yields_no_tokens() {
        assert!(tokenize("").is_empty());
    }
}

//! Phrase detection and main-word extraction.

use std::collections::HashSet;

/// Words skipped when picking the significant word of a phrase.
///
/// `"no one"` never matches because phrases are scanned one token at a time.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "down", "something", "anything", "everything", "nothing", "someone", "anyone",
    "everyone", "no one",
];

/// Punctuation stripped from both ends of each token before the stopword check.
const TRIM_CHARS: &[char] = &['.', ',', '!', '?'];

/// A closed, case-insensitive stopword list.
#[derive(Debug, Clone)]
pub struct StopWords {
    words: HashSet<String>,
}

impl Default for StopWords {
    fn default() -> Self {
        Self::new(DEFAULT_STOPWORDS.iter().copied())
    }
}

impl StopWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Extend the list with additional words.
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.words.extend(
            extra
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty()),
        );
        self
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The most significant word of `phrase`: the first token that is not a
    /// stopword, stripped of `. , ! ?` and lower-cased.
    ///
    /// Falls back to the first token, lower-cased, when every token is a
    /// stopword, and to `phrase` itself when it has no tokens.
    pub fn main_word(&self, phrase: &str) -> String {
        let mut tokens = phrase.split_whitespace().peekable();
        let Some(first) = tokens.peek().copied() else {
            return phrase.to_string();
        };

        for token in tokens {
            let clean = token.trim_matches(TRIM_CHARS).to_lowercase();
            if !self.words.contains(&clean) {
                return clean;
            }
        }

        first.to_lowercase()
    }

    /// Search term for an image lookup: the main word of a phrase when it
    /// differs from the phrase, otherwise the text itself.
    pub fn image_query(&self, text: &str) -> String {
        if is_phrase(text) {
            let main = self.main_word(text);
            if main != text {
                return main;
            }
        }
        text.to_string()
    }
}

/// Whether `text` has more than one whitespace-separated token.
pub fn is_phrase(text: &str) -> bool {
    text.split_whitespace().nth(1).is_some()
}

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod batch;
pub mod dictionary;
pub mod enrich;
pub mod image;
pub mod media;
pub mod model;
pub mod package;
pub mod retry;
pub mod words;

#[cfg(test)]
mod test_support;

pub use batch::{BatchCancelled, CardEnricher, enrich_all};
pub use dictionary::{DictionaryClient, DictionaryEntry, DictionarySource};
pub use enrich::{EnrichError, Enricher};
pub use image::{ImageClient, ImageSource};
pub use media::{MediaCache, MediaError, MediaStore, sanitize_filename};
pub use model::{ExportFlashcard, Flashcard, RawFlashcard};
pub use package::{PackageError, Packager, ScriptPackager};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use words::{StopWords, is_phrase};

/// Returned when the root `CancellationToken` fires before an operation completes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Failure of a dictionary or image API lookup.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("word '{0}' not found")]
    NotFound(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("unauthorized: invalid access token")]
    Unauthorized,
    #[error("forbidden: missing permissions")]
    Forbidden,
    #[error("rate limit exceeded: too many requests")]
    RateLimited,
    #[error("API returned status {0}")]
    Status(u16),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no results for '{0}'")]
    Empty(String),
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Which media file a download was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    AudioUk,
    AudioUs,
    Image,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::AudioUk => write!(f, "UK audio"),
            MediaKind::AudioUs => write!(f, "US audio"),
            MediaKind::Image => write!(f, "image"),
        }
    }
}

/// Progress events emitted during enrichment.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Enriching {
        index: usize,
        total: usize,
        english: String,
    },
    DictionaryMiss {
        word: String,
        error: String,
    },
    MainWordRetry {
        english: String,
        main_word: String,
    },
    MediaUnavailable {
        english: String,
        kind: MediaKind,
        error: String,
    },
    ItemFailed {
        index: usize,
        english: String,
        error: String,
    },
    Enriched {
        index: usize,
        total: usize,
        english: String,
        has_dictionary_data: bool,
    },
}

/// Progress sink shared between the pipeline and the batch driver.
pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// A sink that drops every event.
pub fn silent_progress() -> ProgressFn {
    std::sync::Arc::new(|_| {})
}

/// Configuration for the enrichment run.
#[derive(Debug, Clone)]
pub struct Config {
    pub unsplash_key: Option<String>,
    pub media_dir: PathBuf,
    pub dictionary_base_url: String,
    pub image_base_url: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub api_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub extra_stopwords: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unsplash_key: None,
            media_dir: PathBuf::from("media"),
            dictionary_base_url: dictionary::DEFAULT_BASE_URL.to_string(),
            image_base_url: image::DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            api_timeout_secs: 30,
            download_timeout_secs: 60,
            extra_stopwords: Vec::new(),
        }
    }
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay)
    }

    pub fn stopwords(&self) -> StopWords {
        StopWords::default().with_extra(&self.extra_stopwords)
    }
}

//! Free Dictionary API client.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::LookupError;
use crate::retry::{RetryPolicy, retry_with_backoff};

pub const DEFAULT_BASE_URL: &str = "https://api.dictionaryapi.dev/api/v2/entries/en";

/// One lexical entry returned for a word.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DictionaryEntry {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub phonetics: Vec<Phonetic>,
    #[serde(default)]
    pub meanings: Vec<Meaning>,
}

/// A transcription, optionally with a pronunciation recording.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Phonetic {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
}

impl Phonetic {
    /// The audio URL, if the API supplied a non-empty one.
    pub fn audio_url(&self) -> Option<&str> {
        self.audio.as_deref().filter(|a| !a.is_empty())
    }

    pub fn transcription(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meaning {
    #[serde(default)]
    pub part_of_speech: String,
    #[serde(default)]
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub example: Option<String>,
}

/// Error body the API sends with non-200 responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
}

/// Anything that can look up dictionary entries for a single word.
pub trait DictionarySource: Send + Sync {
    fn lookup<'a>(
        &'a self,
        word: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<DictionaryEntry>, LookupError>>;
}

/// HTTP client for `api.dictionaryapi.dev`.
#[derive(Debug, Clone)]
pub struct DictionaryClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl DictionaryClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn entry_url(&self, word: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(word)
        )
    }

    /// Fetch every entry the API has for `word`.
    pub async fn get_word_info(
        &self,
        word: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DictionaryEntry>, LookupError> {
        let url = self.entry_url(word);
        log::debug!("Fetching word info for '{}': {}", word, url);

        let client = &self.client;
        let timeout = self.timeout;
        let url_ref = url.as_str();
        let resp = retry_with_backoff(self.retry, cancel, move || async move {
            client
                .get(url_ref)
                .timeout(timeout)
                .send()
                .await
                .map_err(LookupError::from)
        })
        .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(word.to_string()));
        }
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            if let Ok(api_err) = serde_json::from_str::<ApiErrorBody>(&body) {
                if !api_err.title.is_empty() {
                    return Err(LookupError::Api(format!(
                        "{} - {}",
                        api_err.title, api_err.message
                    )));
                }
            }
            return Err(LookupError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        let entries: Vec<DictionaryEntry> = serde_json::from_str(&body)?;
        if entries.is_empty() {
            return Err(LookupError::Empty(word.to_string()));
        }

        log::debug!("Got {} dictionary entries for '{}'", entries.len(), word);
        Ok(entries)
    }
}

impl DictionarySource for DictionaryClient {
    fn lookup<'a>(
        &'a self,
        word: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<DictionaryEntry>, LookupError>> {
        Box::pin(self.get_word_info(word, cancel))
    }
}

//! Turns a raw word pair into a fully populated flashcard.
//!
//! The pipeline:
//! 1. Looks the English text up verbatim. Single words that miss are retried
//!    once with their main word; phrases are never retried.
//! 2. For single words with dictionary data, takes part of speech and
//!    definition from the first entry, picks UK/US pronunciations across all
//!    entries, downloads the audio and looks up an image.
//! 3. Otherwise keeps only the sheet's part of speech.
//!
//! Lookup and download failures never fail the card; they are reported
//! through the progress sink and leave the field empty. Only cancellation is
//! returned as an error.

use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::batch::CardEnricher;
use crate::dictionary::{DictionaryClient, DictionaryEntry, DictionarySource};
use crate::image::{ImageClient, ImageSource};
use crate::media::{MediaCache, MediaError, MediaStore};
use crate::model::{Flashcard, RawFlashcard};
use crate::words::{StopWords, is_phrase};
use crate::{Cancelled, Config, LookupError, MediaKind, ProgressEvent, ProgressFn, silent_progress};

const UK_AUDIO_MARKER: &str = "-uk.mp3";
const US_AUDIO_MARKER: &str = "-us.mp3";

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("failed to enrich '{english}': {reason}")]
    Failed { english: String, reason: String },
}

/// Audio URLs and transcriptions found for each region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pronunciations {
    pub uk_audio: Option<String>,
    pub us_audio: Option<String>,
    pub uk_ipa: Option<String>,
    pub us_ipa: Option<String>,
}

impl Pronunciations {
    /// Scan every phonetic of every entry in order. The first audio URL
    /// containing `-uk.mp3` fixes the UK audio and transcription, likewise
    /// `-us.mp3` for US.
    pub fn from_entries(entries: &[DictionaryEntry]) -> Self {
        let mut found = Self::default();
        for phonetic in entries.iter().flat_map(|e| &e.phonetics) {
            if found.uk_audio.is_some() && found.us_audio.is_some() {
                break;
            }
            let Some(audio) = phonetic.audio_url() else {
                continue;
            };
            let ipa = phonetic.transcription().map(str::to_string);
            if audio.contains(UK_AUDIO_MARKER) {
                if found.uk_audio.is_none() {
                    found.uk_audio = Some(audio.to_string());
                    found.uk_ipa = ipa;
                }
            } else if audio.contains(US_AUDIO_MARKER) && found.us_audio.is_none() {
                found.us_audio = Some(audio.to_string());
                found.us_ipa = ipa;
            }
        }
        found
    }

    /// UK transcription, or the US one when no UK transcription exists.
    pub fn ipa_uk(&self) -> String {
        self.uk_ipa
            .as_ref()
            .or(self.us_ipa.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    /// US transcription, or the UK one when no US transcription exists.
    pub fn ipa_us(&self) -> String {
        self.us_ipa
            .as_ref()
            .or(self.uk_ipa.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

/// Part of speech and definition of the first entry's first meaning.
pub fn primary_sense(entries: &[DictionaryEntry]) -> Option<(String, String)> {
    let meaning = entries.first()?.meanings.first()?;
    let definition = meaning
        .definitions
        .first()
        .map(|d| d.definition.clone())
        .unwrap_or_default();
    Some((meaning.part_of_speech.clone(), definition))
}

/// Composes a dictionary, an image source and a media store.
pub struct Enricher {
    dictionary: Box<dyn DictionarySource>,
    images: Box<dyn ImageSource>,
    media: Box<dyn MediaStore>,
    stopwords: StopWords,
    progress: ProgressFn,
}

impl Enricher {
    pub fn new(
        dictionary: Box<dyn DictionarySource>,
        images: Box<dyn ImageSource>,
        media: Box<dyn MediaStore>,
    ) -> Self {
        Self {
            dictionary,
            images,
            media,
            stopwords: StopWords::default(),
            progress: silent_progress(),
        }
    }

    /// Build the HTTP-backed pipeline described by `config`.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let retry = config.retry_policy();
        let api_timeout = Duration::from_secs(config.api_timeout_secs);

        let dictionary = DictionaryClient::new(client.clone())
            .with_base_url(config.dictionary_base_url.clone())
            .with_timeout(api_timeout)
            .with_retry(retry);
        let images = ImageClient::new(
            client.clone(),
            config.unsplash_key.clone().unwrap_or_default(),
        )
        .with_base_url(config.image_base_url.clone())
        .with_timeout(api_timeout)
        .with_retry(retry);
        let media = MediaCache::new(client, config.media_dir.clone())
            .with_timeout(Duration::from_secs(config.download_timeout_secs))
            .with_retry(retry);

        Self::new(Box::new(dictionary), Box::new(images), Box::new(media))
            .with_stopwords(config.stopwords())
    }

    pub fn with_stopwords(mut self, stopwords: StopWords) -> Self {
        self.stopwords = stopwords;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = progress;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        (self.progress)(event);
    }

    /// Enrich `raw` as card number `id`.
    ///
    /// Only returns an error when `cancel` fires mid-way; the partially built
    /// card is dropped in that case.
    pub async fn enrich(
        &self,
        raw: &RawFlashcard,
        id: usize,
        cancel: &CancellationToken,
    ) -> Result<Flashcard, EnrichError> {
        let english = raw.english.as_str();
        let phrase = is_phrase(english);
        let entries = self.lookup_entries(english, phrase, cancel).await?;

        let mut card = Flashcard::bare(id, raw);
        match entries {
            Some(entries) if !phrase => {
                self.apply_dictionary(&mut card, &entries, cancel).await?;
            }
            _ => card.reset_to_sheet_data(raw),
        }

        card.updated_at = Utc::now();
        Ok(card)
    }

    async fn lookup_entries(
        &self,
        english: &str,
        phrase: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<DictionaryEntry>>, Cancelled> {
        let err = match self.dictionary.lookup(english, cancel).await {
            Ok(entries) => return Ok(Some(entries)),
            Err(LookupError::Cancelled(c)) => return Err(c),
            Err(err) => err,
        };
        self.emit(ProgressEvent::DictionaryMiss {
            word: english.to_string(),
            error: err.to_string(),
        });

        if phrase {
            return Ok(None);
        }
        let main_word = self.stopwords.main_word(english);
        if main_word == english {
            return Ok(None);
        }

        self.emit(ProgressEvent::MainWordRetry {
            english: english.to_string(),
            main_word: main_word.clone(),
        });
        match self.dictionary.lookup(&main_word, cancel).await {
            Ok(entries) => Ok(Some(entries)),
            Err(LookupError::Cancelled(c)) => Err(c),
            Err(err) => {
                self.emit(ProgressEvent::DictionaryMiss {
                    word: main_word,
                    error: err.to_string(),
                });
                Ok(None)
            }
        }
    }

    async fn apply_dictionary(
        &self,
        card: &mut Flashcard,
        entries: &[DictionaryEntry],
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        if let Some((part_of_speech, definition)) = primary_sense(entries) {
            card.part_of_speech = part_of_speech;
            card.definition = definition;
        }

        let pron = Pronunciations::from_entries(entries);
        card.ipa_uk = pron.ipa_uk();
        card.ipa_us = pron.ipa_us();

        let id = card.id;
        let english = card.english.clone();
        if let Some(url) = &pron.uk_audio {
            let name = format!("{}_{}_uk.mp3", id, english);
            card.audio_uk = self
                .download(url, &name, &english, MediaKind::AudioUk, cancel)
                .await?;
        }
        if let Some(url) = &pron.us_audio {
            let name = format!("{}_{}_us.mp3", id, english);
            card.audio_us = self
                .download(url, &name, &english, MediaKind::AudioUs, cancel)
                .await?;
        }

        let query = self.stopwords.image_query(&english);
        match self.images.search(&query, cancel).await {
            Ok(url) => {
                let name = format!("{}_{}.jpg", id, english);
                card.image_path = self
                    .download(&url, &name, &english, MediaKind::Image, cancel)
                    .await?;
            }
            Err(LookupError::Cancelled(c)) => return Err(c),
            Err(err) => self.emit(ProgressEvent::MediaUnavailable {
                english,
                kind: MediaKind::Image,
                error: err.to_string(),
            }),
        }
        Ok(())
    }

    /// Local filename of the downloaded media, or empty on failure.
    async fn download(
        &self,
        url: &str,
        filename: &str,
        english: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<String, Cancelled> {
        match self.media.fetch(url, filename, cancel).await {
            Ok(name) => Ok(name),
            Err(MediaError::Cancelled(c)) => Err(c),
            Err(err) => {
                self.emit(ProgressEvent::MediaUnavailable {
                    english: english.to_string(),
                    kind,
                    error: err.to_string(),
                });
                Ok(String::new())
            }
        }
    }
}

impl CardEnricher for Enricher {
    fn enrich_card<'a>(
        &'a self,
        raw: &'a RawFlashcard,
        id: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Flashcard, EnrichError>> {
        Box::pin(self.enrich(raw, id, cancel))
    }
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("stopwords", &self.stopwords.len())
            .finish_non_exhaustive()
    }
}

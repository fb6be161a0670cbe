use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A word pair read from the input sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawFlashcard {
    pub russian: String,
    pub english: String,
    #[serde(default)]
    pub part_of_speech: Option<String>,
}

impl RawFlashcard {
    pub fn new(russian: impl Into<String>, english: impl Into<String>) -> Self {
        Self {
            russian: russian.into(),
            english: english.into(),
            part_of_speech: None,
        }
    }

    pub fn with_part_of_speech(mut self, part_of_speech: impl Into<String>) -> Self {
        self.part_of_speech = Some(part_of_speech.into());
        self
    }
}

/// A fully enriched flashcard.
///
/// `russian` and `english` are always the input pair; enrichment only fills
/// the remaining fields. Media fields hold filenames relative to the media
/// directory, or are empty when nothing was downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Flashcard {
    pub id: usize,
    pub russian: String,
    pub english: String,
    pub part_of_speech: String,
    pub definition: String,
    /// Never populated; dictionary examples are not carried over.
    pub example: String,
    pub ipa_uk: String,
    pub ipa_us: String,
    pub audio_uk: String,
    pub audio_us: String,
    pub image_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flashcard {
    /// A card carrying only the identity fields and fresh timestamps.
    pub fn bare(id: usize, raw: &RawFlashcard) -> Self {
        let now = Utc::now();
        Self {
            id,
            russian: raw.russian.clone(),
            english: raw.english.clone(),
            part_of_speech: String::new(),
            definition: String::new(),
            example: String::new(),
            ipa_uk: String::new(),
            ipa_us: String::new(),
            audio_uk: String::new(),
            audio_us: String::new(),
            image_path: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Keep only what the sheet provided, clearing every enrichment field.
    pub fn reset_to_sheet_data(&mut self, raw: &RawFlashcard) {
        self.part_of_speech = raw.part_of_speech.clone().unwrap_or_default();
        self.definition.clear();
        self.example.clear();
        self.ipa_uk.clear();
        self.ipa_us.clear();
        self.audio_uk.clear();
        self.audio_us.clear();
        self.image_path.clear();
    }

    pub fn has_dictionary_data(&self) -> bool {
        !self.definition.is_empty() || !self.ipa_uk.is_empty() || !self.ipa_us.is_empty()
    }

    pub fn to_export(&self) -> ExportFlashcard {
        ExportFlashcard {
            id: self.id,
            russian: self.russian.clone(),
            english: self.english.clone(),
            part_of_speech: self.part_of_speech.clone(),
            definition: self.definition.clone(),
            example: self.example.clone(),
            ipa_uk: self.ipa_uk.clone(),
            ipa_us: self.ipa_us.clone(),
            audio_uk: self.audio_uk.clone(),
            audio_us: self.audio_us.clone(),
            image: self.image_path.clone(),
        }
    }
}

/// The record shape consumed by the deck packaging step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFlashcard {
    pub id: usize,
    pub russian: String,
    pub english: String,
    pub part_of_speech: String,
    pub definition: String,
    pub example: String,
    pub ipa_uk: String,
    pub ipa_us: String,
    pub audio_uk: String,
    pub audio_us: String,
    pub image: String,
}

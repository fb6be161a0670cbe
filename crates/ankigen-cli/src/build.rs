use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;

use ankigen_core::{
    Config, Enricher, Flashcard, MediaCache, Packager, ProgressEvent, ProgressFn, ScriptPackager,
    enrich_all,
};

use crate::report::Reporter;
use crate::{BuildArgs, ExtractPdfArgs};

/// Counts shown once a deck is built.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub flashcards: usize,
    pub with_dictionary_data: usize,
    pub with_audio: usize,
    pub with_image: usize,
    pub json_path: PathBuf,
}

impl BuildSummary {
    fn new(cards: &[Flashcard], json_path: PathBuf) -> Self {
        Self {
            flashcards: cards.len(),
            with_dictionary_data: cards.iter().filter(|c| c.has_dictionary_data()).count(),
            with_audio: cards
                .iter()
                .filter(|c| !c.audio_uk.is_empty() || !c.audio_us.is_empty())
                .count(),
            with_image: cards.iter().filter(|c| !c.image_path.is_empty()).count(),
            json_path,
        }
    }
}

/// Resolve config from CLI flags > env vars > defaults.
pub fn resolve_config(args: &BuildArgs, env: impl Fn(&str) -> Option<String>) -> Config {
    let defaults = Config::default();

    let unsplash_key = args
        .unsplash_key
        .clone()
        .or_else(|| env("UNSPLASH_ACCESS_KEY"))
        .filter(|k| !k.trim().is_empty());
    let media_dir = args
        .media_dir
        .clone()
        .or_else(|| env("ANKIGEN_MEDIA_DIR").map(PathBuf::from))
        .unwrap_or(defaults.media_dir);
    let api_timeout_secs = env("API_TIMEOUT")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.api_timeout_secs);
    let download_timeout_secs = env("DOWNLOAD_TIMEOUT")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.download_timeout_secs);

    Config {
        unsplash_key,
        media_dir,
        max_retries: args.max_retries,
        api_timeout_secs,
        download_timeout_secs,
        extra_stopwords: args
            .extra_stopwords
            .iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect(),
        ..defaults
    }
}

/// Validate, read, enrich, export and package.
pub async fn run(
    args: &BuildArgs,
    config: Config,
    show_progress: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<BuildSummary> {
    log::info!(
        "Building {} from {}",
        args.output.display(),
        args.sheet.display()
    );

    log::info!("Step 1: validating spreadsheet");
    ankigen_export::validate_sheet(&args.sheet)
        .with_context(|| format!("spreadsheet validation failed for {}", args.sheet.display()))?;

    log::info!("Step 2: reading word pairs");
    let raws = ankigen_export::read_word_pairs(&args.sheet)
        .with_context(|| format!("failed to read {}", args.sheet.display()))?;
    if raws.is_empty() {
        bail!("no word pairs found in {}", args.sheet.display());
    }

    if config.unsplash_key.is_none() {
        log::warn!(
            "No Unsplash access key (--unsplash-key or UNSPLASH_ACCESS_KEY); image lookups will fail"
        );
    }

    log::info!("Step 3: enriching {} flashcards", raws.len());
    let reporter = Arc::new(Reporter::new(raws.len(), show_progress)?);
    let progress: ProgressFn = {
        let reporter = reporter.clone();
        Arc::new(move |event: ProgressEvent| reporter.handle(event))
    };

    let client = reqwest::Client::builder()
        .user_agent(concat!("ankigen/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let enricher = Enricher::from_config(&config, client.clone()).with_progress(progress.clone());

    let json_path = args.enriched_dir.join("enriched.json");
    let outcome = enrich_all(&enricher, &raws, progress.as_ref(), cancel).await;
    reporter.finish();

    let cards = match outcome {
        Ok(cards) => cards,
        Err(cancelled) => {
            ankigen_export::export_json(&cancelled.partial, &json_path)
                .with_context(|| format!("failed to write {}", json_path.display()))?;
            bail!(
                "{}; partial results written to {}",
                cancelled,
                json_path.display()
            );
        }
    };

    log::info!("Step 4: exporting to {}", json_path.display());
    ankigen_export::export_json(&cards, &json_path)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    log::info!("Step 5: packaging deck '{}'", args.deck_name);
    let packager = ScriptPackager::new(&args.python, &args.script);
    packager
        .package(&json_path, &config.media_dir, &args.output, &args.deck_name)
        .await
        .context("failed to generate Anki package")?;

    if args.no_media_cache {
        log::info!("Cleaning up media directory {}", config.media_dir.display());
        match MediaCache::new(client, config.media_dir.clone()).clear().await {
            Ok(removed) => log::info!("Removed {} media files", removed),
            Err(e) => log::warn!("Failed to clean up media directory: {}", e),
        }
    }

    Ok(BuildSummary::new(&cards, json_path))
}

/// Write the annotated words of a PDF to a new spreadsheet.
pub async fn extract_pdf(args: &ExtractPdfArgs) -> anyhow::Result<usize> {
    if !args.pdf.exists() {
        bail!("PDF file not found: {}", args.pdf.display());
    }

    let path = args.pdf.clone();
    let words = tokio::task::spawn_blocking(move || ankigen_pdf::extract_annotated_words(&path))
        .await
        .context("PDF extraction task failed")?
        .with_context(|| format!("failed to extract annotations from {}", args.pdf.display()))?;

    ankigen_export::write_words(&words, &args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    Ok(words.len())
}

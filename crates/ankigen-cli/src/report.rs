use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use ankigen_core::ProgressEvent;

use crate::build::BuildSummary;

/// Turns pipeline events into log lines, and into a progress bar when asked.
pub struct Reporter {
    bar: Option<ProgressBar>,
}

impl Reporter {
    pub fn new(total: usize, show_bar: bool) -> anyhow::Result<Self> {
        let bar = if show_bar {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} Enriching flashcards [{bar:30.cyan/blue}] {pos}/{len} {msg}",
                )?
                .progress_chars("=> "),
            );
            Some(bar)
        } else {
            None
        };
        Ok(Self { bar })
    }

    pub fn handle(&self, event: ProgressEvent) {
        match &self.bar {
            Some(bar) => {
                match &event {
                    ProgressEvent::Enriching { english, .. } => bar.set_message(english.clone()),
                    ProgressEvent::Enriched { .. } => bar.inc(1),
                    _ => {}
                }
                bar.suspend(|| log_event(&event));
            }
            None => log_event(&event),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    #[cfg(test)]
    fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(|b| b.position())
    }
}

fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Enriching {
            index,
            total,
            english,
        } => log::info!("[{}/{}] Enriching '{}'", index + 1, total, english),
        ProgressEvent::DictionaryMiss { word, error } => {
            log::warn!("No dictionary data for '{}': {}", word, error)
        }
        ProgressEvent::MainWordRetry { english, main_word } => {
            log::info!("Retrying '{}' with main word '{}'", english, main_word)
        }
        ProgressEvent::MediaUnavailable {
            english,
            kind,
            error,
        } => log::warn!("No {} for '{}': {}", kind, english, error),
        ProgressEvent::ItemFailed {
            index,
            english,
            error,
        } => log::error!(
            "Flashcard {} ('{}') failed, keeping sheet data: {}",
            index + 1,
            english,
            error
        ),
        ProgressEvent::Enriched {
            english,
            has_dictionary_data,
            ..
        } => log::debug!(
            "Enriched '{}' (dictionary data: {})",
            english,
            has_dictionary_data
        ),
    }
}

fn summary_lines(summary: &BuildSummary, output: &Path, color: bool) -> Vec<String> {
    let headline = format!("Built {} flashcards", summary.flashcards);
    let headline = if color {
        headline.green().bold().to_string()
    } else {
        headline
    };
    vec![
        headline,
        format!(
            "  dictionary data: {}/{}",
            summary.with_dictionary_data, summary.flashcards
        ),
        format!("  audio:           {}/{}", summary.with_audio, summary.flashcards),
        format!("  image:           {}/{}", summary.with_image, summary.flashcards),
        format!("  json:            {}", summary.json_path.display()),
        format!("  deck:            {}", output.display()),
    ]
}

pub fn print_summary(summary: &BuildSummary, output: &Path, color: bool) {
    for line in summary_lines(summary, output, color) {
        println!("{}", line);
    }
}

pub fn print_extracted(count: usize, output: &Path, color: bool) {
    let line = format!("Wrote {} words to {}", count, output.display());
    if color {
        println!("{}", line.green());
    } else {
        println!("{}", line);
    }
    if count == 0 {
        let hint = "No highlight or underline annotations with text were found";
        if color {
            println!("{}", hint.yellow());
        } else {
            println!("{}", hint);
        }
    }
}

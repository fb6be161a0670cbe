use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod build;
mod report;

/// Anki flashcard builder - enrich Russian/English word lists with
/// definitions, pronunciations, audio and images.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Show a progress bar instead of per-card log lines
    #[arg(long, global = true)]
    progress: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enrich the words in a spreadsheet and package them as an Anki deck
    Build(BuildArgs),
    /// Extract highlighted/underlined words from a PDF into a spreadsheet
    ExtractPdf(ExtractPdfArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Spreadsheet with Russian/English word pairs
    #[arg(long)]
    pub sheet: PathBuf,

    /// Path of the deck file to create
    #[arg(long)]
    pub output: PathBuf,

    /// Name of the Anki deck
    #[arg(long, default_value = "English Vocabulary")]
    pub deck_name: String,

    /// Unsplash access key
    #[arg(long)]
    pub unsplash_key: Option<String>,

    /// Directory for downloaded audio and images
    #[arg(long)]
    pub media_dir: Option<PathBuf>,

    /// Directory for the enriched JSON export
    #[arg(long, default_value = "enriched")]
    pub enriched_dir: PathBuf,

    /// Empty the media directory once the deck is built
    #[arg(long)]
    pub no_media_cache: bool,

    /// Retries after the first attempt for each network request
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Comma-separated extra words to skip when picking a phrase's main word
    #[arg(long, value_delimiter = ',')]
    pub extra_stopwords: Vec<String>,

    /// Packaging script
    #[arg(long, default_value = "scripts/make_apkg.py")]
    pub script: PathBuf,

    /// Interpreter for the packaging script
    #[arg(long, default_value = "./venv/bin/python")]
    pub python: PathBuf,
}

#[derive(Args, Debug)]
pub struct ExtractPdfArgs {
    /// PDF file with highlight or underline annotations
    #[arg(long)]
    pub pdf: PathBuf,

    /// Spreadsheet to write the words to
    #[arg(long)]
    pub output: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if cli.no_color {
        logger.write_style(env_logger::WriteStyle::Never);
    }
    logger.init();

    let color = !cli.no_color;
    match cli.command {
        Command::Build(args) => {
            let config = build::resolve_config(&args, |key| std::env::var(key).ok());

            let cancel = CancellationToken::new();
            let cancel_for_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, finishing the current step");
                    cancel_for_signal.cancel();
                }
            });

            let summary = build::run(&args, config, cli.progress, &cancel).await?;
            report::print_summary(&summary, &args.output, color);
        }
        Command::ExtractPdf(args) => {
            let count = build::extract_pdf(&args).await?;
            report::print_extracted(count, &args.output, color);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_with_defaults() {
        let cli = Cli::try_parse_from([
            "ankigen", "build", "--sheet", "words.xlsx", "--output", "out/deck.apkg",
        ])
        .unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.sheet, PathBuf::from("words.xlsx"));
        assert_eq!(args.deck_name, "English Vocabulary");
        assert_eq!(args.enriched_dir, PathBuf::from("enriched"));
        assert_eq!(args.max_retries, 3);
        assert!(args.extra_stopwords.is_empty());
        assert!(!args.no_media_cache);
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ankigen",
            "build",
            "--sheet",
            "w.xlsx",
            "--output",
            "d.apkg",
            "--extra-stopwords",
            "up,down",
            "--verbose",
            "--progress",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.progress);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.extra_stopwords, vec!["up", "down"]);
    }

    #[test]
    fn parses_extract_pdf() {
        let cli = Cli::try_parse_from([
            "ankigen",
            "extract-pdf",
            "--pdf",
            "book.pdf",
            "--output",
            "words.xlsx",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::ExtractPdf(_)));
    }

    #[test]
    fn build_requires_sheet() {
        assert!(Cli::try_parse_from(["ankigen", "build", "--output", "d.apkg"]).is_err());
    }
}

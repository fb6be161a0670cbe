use std::path::PathBuf;

use thiserror::Error;

pub mod json;
pub mod sheet;

pub use json::{export_json, load_json};
pub use sheet::{read_word_pairs, validate_sheet, write_words};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to open spreadsheet {}: {message}", .path.display())]
    Open { path: PathBuf, message: String },
    #[error("no sheets found in {}", .0.display())]
    NoSheets(PathBuf),
    #[error("spreadsheet must have at least 2 rows (header + data)")]
    TooFewRows,
    #[error("header row must have at least 2 columns")]
    NarrowHeader,
    #[error("no valid data rows found in spreadsheet")]
    NoDataRows,
    #[error("failed to write spreadsheet: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

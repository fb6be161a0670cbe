//! Word-pair spreadsheets.
//!
//! Layout: a header row, then one word per row with Russian in column A,
//! English in column B and an optional part of speech in column C. Only the
//! first sheet of a workbook is read.

use std::path::Path;

use ankigen_core::RawFlashcard;
use calamine::{Data, Reader, open_workbook_auto};
use rust_xlsxwriter::Workbook;

use crate::ExportError;

/// Sheet name used by [`write_words`].
pub const WORDS_SHEET: &str = "WordsSheet1";

const HEADERS: [&str; 3] = ["Russian", "English", "PartOfSpeech"];

/// Rows of the first sheet as strings, trailing empty cells removed.
fn first_sheet_rows(path: &Path) -> Result<Vec<Vec<String>>, ExportError> {
    let open_err = |message: String| ExportError::Open {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| open_err(e.to_string()))?;
    let sheet_names = workbook.sheet_names().to_vec();
    let Some(name) = sheet_names.first() else {
        return Err(ExportError::NoSheets(path.to_path_buf()));
    };
    log::debug!("Reading sheet '{}' of {}", name, path.display());

    let range = workbook
        .worksheet_range(name)
        .map_err(|e| open_err(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| {
            let mut cells: Vec<String> = row.iter().map(cell_to_string).collect();
            while cells.last().is_some_and(|c| c.is_empty()) {
                cells.pop();
            }
            cells
        })
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 => format!("{:.0}", f),
        other => other.to_string(),
    }
}

/// Read Russian/English pairs from the first sheet, skipping the header.
///
/// Rows with fewer than two cells, or with either word empty, are skipped.
pub fn read_word_pairs(path: &Path) -> Result<Vec<RawFlashcard>, ExportError> {
    log::info!("Reading word pairs from {}", path.display());
    let rows = first_sheet_rows(path)?;
    if rows.len() < 2 {
        return Err(ExportError::TooFewRows);
    }

    let mut pairs = Vec::new();
    for (i, row) in rows.iter().enumerate().skip(1) {
        let row_number = i + 1;
        if row.len() < 2 {
            log::warn!(
                "Skipping row {} with insufficient columns ({})",
                row_number,
                row.len()
            );
            continue;
        }
        let (russian, english) = (&row[0], &row[1]);
        if russian.is_empty() || english.is_empty() {
            log::debug!("Skipping empty row {}", row_number);
            continue;
        }

        let mut raw = RawFlashcard::new(russian.as_str(), english.as_str());
        if let Some(pos) = row.get(2).filter(|p| !p.is_empty()) {
            raw = raw.with_part_of_speech(pos.as_str());
        }
        log::debug!("Read word pair {} -> {}", raw.russian, raw.english);
        pairs.push(raw);
    }

    log::info!("Read {} word pairs", pairs.len());
    Ok(pairs)
}

/// Check the sheet has a header of at least two columns and at least one
/// usable data row.
pub fn validate_sheet(path: &Path) -> Result<(), ExportError> {
    let rows = first_sheet_rows(path)?;
    if rows.len() < 2 {
        return Err(ExportError::TooFewRows);
    }
    if rows[0].len() < 2 {
        return Err(ExportError::NarrowHeader);
    }

    let data_rows = rows[1..]
        .iter()
        .filter(|row| row.len() >= 2 && !row[0].is_empty() && !row[1].is_empty())
        .count();
    if data_rows == 0 {
        return Err(ExportError::NoDataRows);
    }

    log::info!(
        "Spreadsheet {} is valid: {} rows, {} data rows",
        path.display(),
        rows.len(),
        data_rows
    );
    Ok(())
}

/// Write a new spreadsheet with the standard header and `words`, lower-cased,
/// in the English column. The Russian column is left for the user to fill.
pub fn write_words(words: &[String], path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(WORDS_SHEET)?;

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }
    for (i, word) in words.iter().enumerate() {
        worksheet.write_string(i as u32 + 1, 1, word.to_lowercase())?;
    }

    workbook.save(path)?;
    log::info!("Wrote {} words to {}", words.len(), path.display());
    Ok(())
}

use std::path::Path;

use ankigen_core::{ExportFlashcard, Flashcard};

use crate::ExportError;

/// Write `flashcards` as a pretty-printed JSON array of [`ExportFlashcard`],
/// creating parent directories as needed.
pub fn export_json(flashcards: &[Flashcard], path: &Path) -> Result<(), ExportError> {
    log::info!(
        "Exporting {} flashcards to {}",
        flashcards.len(),
        path.display()
    );

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let records: Vec<ExportFlashcard> = flashcards.iter().map(Flashcard::to_export).collect();
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, json).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Read back a file written by [`export_json`].
pub fn load_json(path: &Path) -> Result<Vec<ExportFlashcard>, ExportError> {
    let data = std::fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<ExportFlashcard> = serde_json::from_str(&data)?;
    log::info!("Loaded {} flashcards from {}", records.len(), path.display());
    Ok(records)
}

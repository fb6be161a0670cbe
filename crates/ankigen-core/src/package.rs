//! Deck packaging through an external script.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("packaging script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),
    #[error("failed to create output directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to run {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("packaging script failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },
}

/// Builds a deck file from an exported JSON file and a media directory.
pub trait Packager: Send + Sync {
    fn package<'a>(
        &'a self,
        json_path: &'a Path,
        media_dir: &'a Path,
        output: &'a Path,
        deck_name: &'a str,
    ) -> BoxFuture<'a, Result<(), PackageError>>;
}

/// Runs `<interpreter> <script> <json> <media_dir> <output> <deck_name>`.
#[derive(Debug, Clone)]
pub struct ScriptPackager {
    interpreter: PathBuf,
    script: PathBuf,
}

impl Default for ScriptPackager {
    fn default() -> Self {
        Self::new("./venv/bin/python", "scripts/make_apkg.py")
    }
}

impl ScriptPackager {
    pub fn new(interpreter: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
        }
    }

    pub async fn run(
        &self,
        json_path: &Path,
        media_dir: &Path,
        output: &Path,
        deck_name: &str,
    ) -> Result<(), PackageError> {
        if !tokio::fs::try_exists(&self.script).await.unwrap_or(false) {
            return Err(PackageError::ScriptNotFound(self.script.clone()));
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PackageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        log::info!(
            "Running {} {} (json: {}, media: {}, output: {}, deck: {})",
            self.interpreter.display(),
            self.script.display(),
            json_path.display(),
            media_dir.display(),
            output.display(),
            deck_name
        );

        let result = Command::new(&self.interpreter)
            .arg(&self.script)
            .arg(json_path)
            .arg(media_dir)
            .arg(output)
            .arg(deck_name)
            .output()
            .await
            .map_err(|source| PackageError::Spawn {
                program: self.interpreter.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&result.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            log::info!("packager: {}", line);
        }

        if !result.status.success() {
            return Err(PackageError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Packager for ScriptPackager {
    fn package<'a>(
        &'a self,
        json_path: &'a Path,
        media_dir: &'a Path,
        output: &'a Path,
        deck_name: &'a str,
    ) -> BoxFuture<'a, Result<(), PackageError>> {
        Box::pin(self.run(json_path, media_dir, output, deck_name))
    }
}

//! On-disk media cache for pronunciation audio and card images.
//!
//! Files are keyed purely by their sanitized name: if a file with that name
//! exists, it is returned without touching the network. There is no content
//! verification, and the existence check is not safe against a concurrent
//! writer using the same directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::Cancelled;
use crate::retry::{RetryPolicy, retry_with_backoff};

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9._-]").unwrap());
static UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("filename '{0}' has no usable characters")]
    InvalidFilename(String),
    #[error("failed to create media directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("download request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download of {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`, collapse runs
/// of underscores and trim them from both ends.
pub fn sanitize_filename(filename: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(filename, "_");
    let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
    collapsed.trim_matches('_').to_string()
}

/// Anything that can materialize a remote file under a local name.
pub trait MediaStore: Send + Sync {
    /// Returns the filename, relative to the store, the media was saved under.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        filename: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String, MediaError>>;
}

/// Downloads media into a local directory.
#[derive(Debug, Clone)]
pub struct MediaCache {
    client: reqwest::Client,
    dir: PathBuf,
    timeout: Duration,
    retry: RetryPolicy,
}

impl MediaCache {
    pub fn new(client: reqwest::Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download `url` to `filename` (sanitized) unless it is already cached.
    pub async fn download(
        &self,
        url: &str,
        filename: &str,
        cancel: &CancellationToken,
    ) -> Result<String, MediaError> {
        let safe_name = sanitize_filename(filename);
        if safe_name.is_empty() {
            return Err(MediaError::InvalidFilename(filename.to_string()));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| MediaError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.dir.join(&safe_name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            log::debug!("{} already cached", path.display());
            return Ok(safe_name);
        }

        log::debug!("Downloading {} -> {}", url, path.display());
        let client = &self.client;
        let timeout = self.timeout;
        let resp = retry_with_backoff(self.retry, cancel, move || async move {
            client
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(MediaError::from)
        })
        .await?;

        if resp.status() != StatusCode::OK {
            return Err(MediaError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        // Stream into a sibling file so an interrupted download never looks cached.
        let partial = self.dir.join(format!("{}.part", safe_name));
        if let Err(e) = write_body(resp, &partial, cancel).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        commit_partial(&partial, &path).await?;

        log::debug!("Saved {}", path.display());
        Ok(safe_name)
    }

    /// Remove everything inside the media directory, returning how many
    /// entries were deleted. Entries that cannot be removed are logged and
    /// skipped.
    pub async fn clear(&self) -> std::io::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => tokio::fs::remove_dir_all(&path).await,
                _ => tokio::fs::remove_file(&path).await,
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to delete {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

async fn write_body(
    resp: reqwest::Response,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<(), MediaError> {
    let write_err = |source| MediaError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;
    let mut stream = resp.bytes_stream();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        file.write_all(&chunk?).await.map_err(write_err)?;
    }
    file.flush().await.map_err(write_err)?;
    Ok(())
}

/// Move a finished download into place; the partial file never outlives a
/// failed rename.
async fn commit_partial(partial: &Path, path: &Path) -> Result<(), MediaError> {
    if let Err(source) = tokio::fs::rename(partial, path).await {
        let _ = tokio::fs::remove_file(partial).await;
        return Err(MediaError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

impl MediaStore for MediaCache {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        filename: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String, MediaError>> {
        Box::pin(self.download(url, filename, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{closed_port_url, serve};
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn is_clean(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !name.starts_with('_')
            && !name.ends_with('_')
            && !name.contains("__")
    }

    #[test]
    fn sanitize_cyrillic_and_spaces() {
        let name = sanitize_filename("1_дом_uk.mp3");
        assert_eq!(name, "1_uk.mp3");
        assert!(is_clean(&name));

        let name = sanitize_filename("12_keep something in mind!.jpg");
        assert_eq!(name, "12_keep_something_in_mind_.jpg");
        assert!(is_clean(&name));
    }

    #[test]
    fn sanitize_trims_and_collapses() {
        assert_eq!(sanitize_filename("  ответ  "), "");
        assert_eq!(sanitize_filename("__a__b__"), "a_b");
        assert_eq!(sanitize_filename("3_ice-cream_us.mp3"), "3_ice-cream_us.mp3");
    }

    async fn audio_server(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new()
            .route(
                "/audio.mp3",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (AxumStatus::OK, vec![0x49u8, 0x44, 0x33, 0x04])
                }),
            )
            .route(
                "/missing.mp3",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::NOT_FOUND
                }),
            )
            .with_state(hits);
        serve(app).await
    }

    fn cache(dir: &Path) -> MediaCache {
        MediaCache::new(reqwest::Client::new(), dir)
            .with_retry(RetryPolicy::new(0, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn downloads_then_hits_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let media_dir = tmp.path().join("media");
        let hits = Arc::new(AtomicUsize::new(0));
        let base = audio_server(hits.clone()).await;
        let cache = cache(&media_dir);
        let url = format!("{}/audio.mp3", base);
        let cancel = CancellationToken::new();

        let name = cache.download(&url, "1_дом_uk.mp3", &cancel).await.unwrap();
        assert_eq!(name, "1_uk.mp3");
        assert_eq!(
            std::fs::read(media_dir.join(&name)).unwrap(),
            vec![0x49u8, 0x44, 0x33, 0x04]
        );
        assert!(!media_dir.join("1_uk.mp3.part").exists());

        let again = cache.download(&url, "1_дом_uk.mp3", &cancel).await.unwrap();
        assert_eq!(again, name);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_file_skips_network() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("2_house.jpg"), b"cached").unwrap();
        // Nothing listens here; any request would fail.
        let url = format!("{}/house.jpg", closed_port_url().await);

        let name = cache(tmp.path())
            .download(&url, "2_house.jpg", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(name, "2_house.jpg");
        assert_eq!(std::fs::read(tmp.path().join(name)).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn non_200_is_a_failure_and_leaves_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let base = audio_server(hits.clone()).await;

        let err = cache(tmp.path())
            .download(
                &format!("{}/missing.mp3", base),
                "3_x_us.mp3",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Status { status: 404, .. }));
        assert!(!tmp.path().join("3_x_us.mp3").exists());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_rename_removes_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let partial = tmp.path().join("4_house_uk.mp3.part");
        std::fs::write(&partial, b"ID3").unwrap();
        let target = tmp.path().join("gone").join("4_house_uk.mp3");

        let err = commit_partial(&partial, &target).await.unwrap_err();
        assert!(matches!(err, MediaError::Write { ref path, .. } if *path == target));
        assert!(!partial.exists());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn committed_partial_becomes_the_cached_file() {
        let tmp = tempfile::tempdir().unwrap();
        let partial = tmp.path().join("5_cat.jpg.part");
        std::fs::write(&partial, b"jpeg").unwrap();
        let target = tmp.path().join("5_cat.jpg");

        commit_partial(&partial, &target).await.unwrap();
        assert!(!partial.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn unusable_filename_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = cache(tmp.path())
            .download("http://127.0.0.1:1/x", "дом", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidFilename(_)));
    }

    #[tokio::test]
    async fn clear_empties_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.mp3"), b"a").unwrap();
        std::fs::write(tmp.path().join("b.jpg"), b"b").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();

        let removed = cache(tmp.path()).clear().await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}

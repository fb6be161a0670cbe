//! Unsplash photo search client.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::LookupError;
use crate::retry::{RetryPolicy, retry_with_backoff};

pub const DEFAULT_BASE_URL: &str = "https://api.unsplash.com/search/photos";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    urls: PhotoUrls,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// Anything that can find a representative photo URL for a search term.
pub trait ImageSource: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String, LookupError>>;
}

/// HTTP client for the Unsplash search API.
#[derive(Debug, Clone)]
pub struct ImageClient {
    client: reqwest::Client,
    base_url: String,
    access_key: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ImageClient {
    pub fn new(client: reqwest::Client, access_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_key: access_key.into(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// URL of the first landscape photo matching `query`.
    pub async fn get_image_url(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LookupError> {
        log::debug!("Searching image for '{}'", query);

        let client = &self.client;
        let url = self.base_url.as_str();
        let timeout = self.timeout;
        let auth = format!("Client-ID {}", self.access_key);
        let auth = auth.as_str();
        let resp = retry_with_backoff(self.retry, cancel, move || async move {
            client
                .get(url)
                .query(&[
                    ("query", query),
                    ("per_page", "1"),
                    ("orientation", "landscape"),
                ])
                .header(AUTHORIZATION, auth)
                .timeout(timeout)
                .send()
                .await
                .map_err(LookupError::from)
        })
        .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            if let Ok(api_err) = serde_json::from_str::<ApiErrorBody>(&body) {
                if let Some(first) = api_err.errors.into_iter().next() {
                    return Err(LookupError::Api(first));
                }
            }
            return Err(match status {
                StatusCode::UNAUTHORIZED => LookupError::Unauthorized,
                StatusCode::FORBIDDEN => LookupError::Forbidden,
                StatusCode::TOO_MANY_REQUESTS => LookupError::RateLimited,
                other => LookupError::Status(other.as_u16()),
            });
        }

        let body = resp.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;
        let image_url = parsed
            .results
            .into_iter()
            .next()
            .map(|r| r.urls.regular)
            .ok_or_else(|| LookupError::Empty(query.to_string()))?;

        log::debug!("Image for '{}': {}", query, image_url);
        Ok(image_url)
    }
}

impl ImageSource for ImageClient {
    fn search<'a>(
        &'a self,
        query: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String, LookupError>> {
        Box::pin(self.get_image_url(query, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use std::collections::HashMap;

    async fn search(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Response {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Client-ID secret" {
            return (AxumStatus::UNAUTHORIZED, "").into_response();
        }
        if params.get("per_page").map(String::as_str) != Some("1")
            || params.get("orientation").map(String::as_str) != Some("landscape")
        {
            return (AxumStatus::BAD_REQUEST, "").into_response();
        }
        match params.get("query").map(String::as_str) {
            Some("house") => (
                AxumStatus::OK,
                r#"{"total": 1, "results": [{"id": "x", "urls": {"regular": "https://images.example/house.jpg", "small": "s"}}]}"#,
            )
                .into_response(),
            Some("nothing") => (AxumStatus::OK, r#"{"total": 0, "results": []}"#).into_response(),
            Some("busy") => (AxumStatus::TOO_MANY_REQUESTS, "").into_response(),
            Some("hidden") => (AxumStatus::FORBIDDEN, "").into_response(),
            _ => (
                AxumStatus::BAD_REQUEST,
                r#"{"errors": ["query is invalid", "second"]}"#,
            )
                .into_response(),
        }
    }

    async fn client(key: &str) -> ImageClient {
        let base = serve(Router::new().route("/search/photos", get(search))).await;
        ImageClient::new(reqwest::Client::new(), key)
            .with_base_url(format!("{}/search/photos", base))
            .with_retry(RetryPolicy::new(0, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn returns_first_regular_url() {
        let client = client("secret").await;
        let url = client
            .get_image_url("house", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(url, "https://images.example/house.jpg");
    }

    #[tokio::test]
    async fn empty_results_is_an_error() {
        let client = client("secret").await;
        let err = client
            .get_image_url("nothing", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::Empty(ref q) if q == "nothing"));
    }

    #[tokio::test]
    async fn bad_key_is_unauthorized() {
        let client = client("wrong").await;
        let err = client
            .get_image_url("house", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::Unauthorized));
    }

    #[tokio::test]
    async fn maps_status_codes() {
        let client = client("secret").await;
        let cancel = CancellationToken::new();
        assert!(matches!(
            client.get_image_url("busy", &cancel).await,
            Err(LookupError::RateLimited)
        ));
        assert!(matches!(
            client.get_image_url("hidden", &cancel).await,
            Err(LookupError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn surfaces_first_api_error() {
        let client = client("secret").await;
        let err = client
            .get_image_url("???", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::Api(ref m) if m == "query is invalid"));
    }
}

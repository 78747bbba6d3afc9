use std::time::Duration;

use reqwest::Client;

use pulsewatch_core::{CommentSource, FetchedComment, ResourceMetadata, SourceError};

use crate::types::{CommentsPage, MetadataPayload};

/// Maximum number of pages to walk in one fetch.
/// Prevents infinite loops on cycling continuation tokens.
const MAX_PAGES: usize = 50;

/// Upstream page-size ceiling per request.
const MAX_PAGE_SIZE: u32 = 100;

/// Fallback retry delay when a 429 carries no `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP client for the upstream comment/metadata API.
///
/// Maps HTTP failures onto the engine's three fetch failure modes:
/// 429 (+`Retry-After`) becomes [`SourceError::RateLimited`], 404 becomes
/// [`SourceError::NotFound`], and timeouts, connection failures, unexpected
/// statuses, and undecodable bodies all become [`SourceError::Unavailable`]
/// (transient from the scheduler's point of view).
pub struct CommentApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CommentApiClient {
    /// Creates a `CommentApiClient` with configured timeout and `User-Agent`.
    ///
    /// `base_url` is the upstream API root; a trailing slash is tolerated.
    /// `api_key`, when set, is sent as the `key` query parameter on every
    /// request.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the underlying client cannot be
    /// constructed (e.g., invalid TLS config).
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.map(ToOwned::to_owned),
        })
    }

    /// Fetches one page of the comment listing for `resource_id`.
    ///
    /// # Errors
    ///
    /// - [`SourceError::RateLimited`] — HTTP 429; `retry_after_secs` from the
    ///   `Retry-After` header, defaulting to 60.
    /// - [`SourceError::NotFound`] — HTTP 404.
    /// - [`SourceError::Unavailable`] — network/timeout failure, any other
    ///   non-2xx status, or a body that does not decode.
    async fn fetch_comments_page(
        &self,
        resource_id: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<CommentsPage, SourceError> {
        let url = format!("{}/resources/{resource_id}/comments", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[("limit", page_size.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(rate_limited(&response));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                resource_id: resource_id.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Unavailable {
                reason: format!("unexpected HTTP status {status} from {url}"),
            });
        }

        let body = response.text().await.map_err(|e| map_transport_error(&e))?;
        serde_json::from_str::<CommentsPage>(&body).map_err(|e| SourceError::Unavailable {
            reason: format!("undecodable comments page for {resource_id}: {e}"),
        })
    }

    async fn fetch_metadata_inner(&self, resource_id: &str) -> Result<ResourceMetadata, SourceError> {
        let url = format!("{}/resources/{resource_id}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(rate_limited(&response));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                resource_id: resource_id.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Unavailable {
                reason: format!("unexpected HTTP status {status} from {url}"),
            });
        }

        let body = response.text().await.map_err(|e| map_transport_error(&e))?;
        let payload =
            serde_json::from_str::<MetadataPayload>(&body).map_err(|e| SourceError::Unavailable {
                reason: format!("undecodable metadata for {resource_id}: {e}"),
            })?;

        Ok(ResourceMetadata {
            title: payload.title,
            owner_name: payload.owner_name,
        })
    }

    /// Walks the paginated listing until `limit` comments are collected, the
    /// pages are exhausted, or `since_comment_id` is reached (exclusive).
    ///
    /// The upstream delivers newest-first; the collected comments are
    /// returned normalized to ascending `published_at` order so downstream
    /// consumers see one consistent ordering.
    async fn fetch_new_comments_inner(
        &self,
        resource_id: &str,
        since_comment_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<FetchedComment>, SourceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut collected: Vec<FetchedComment> = Vec::new();
        let mut token: Option<String> = None;
        let mut page_count = 0usize;

        'pages: loop {
            page_count += 1;
            if page_count > MAX_PAGES {
                tracing::warn!(
                    resource_id,
                    max_pages = MAX_PAGES,
                    "comment pagination cap reached; returning partial fetch"
                );
                break;
            }

            let remaining = limit.saturating_sub(u32::try_from(collected.len()).unwrap_or(u32::MAX));
            let page = self
                .fetch_comments_page(resource_id, token.as_deref(), remaining.min(MAX_PAGE_SIZE))
                .await?;

            for comment in page.comments {
                if since_comment_id == Some(comment.id.as_str()) {
                    break 'pages;
                }
                collected.push(FetchedComment {
                    comment_id: comment.id,
                    text: comment.text,
                    author: comment.author,
                    like_count: comment.like_count,
                    reply_count: comment.reply_count,
                    published_at: comment.published_at,
                });
                if collected.len() >= limit as usize {
                    break 'pages;
                }
            }

            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        // Newest-first upstream order becomes ascending published_at.
        collected.reverse();
        Ok(collected)
    }
}

impl CommentSource for CommentApiClient {
    async fn fetch_new_comments(
        &self,
        resource_id: &str,
        since_comment_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<FetchedComment>, SourceError> {
        self.fetch_new_comments_inner(resource_id, since_comment_id, limit)
            .await
    }

    async fn fetch_metadata(&self, resource_id: &str) -> Result<ResourceMetadata, SourceError> {
        self.fetch_metadata_inner(resource_id).await
    }
}

/// Builds a `RateLimited` error from a 429 response, honoring `Retry-After`.
fn rate_limited(response: &reqwest::Response) -> SourceError {
    let retry_after_secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    SourceError::RateLimited { retry_after_secs }
}

/// Network-level failures (timeouts included) are transient.
fn map_transport_error(e: &reqwest::Error) -> SourceError {
    let reason = if e.is_timeout() {
        format!("request timed out: {e}")
    } else {
        e.to_string()
    };
    SourceError::Unavailable { reason }
}

//! Remote comment service client.
//!
//! [`CommentService`] is the seam between the harvest pipeline and the
//! network: one paginated page request, or one video metadata lookup.
//! [`YoutubeClient`] implements it against the YouTube Data API v3:
//!
//! | Request | Endpoint | Scope filter |
//! |---------|----------|--------------|
//! | Thread page (video) | `GET /commentThreads` | `videoId` |
//! | Thread page (channel) | `GET /commentThreads` | `allThreadsRelatedToChannelId` |
//! | Reply page | `GET /comments` | `parentId` |
//! | Video metadata | `GET /videos` | `id` |
//!
//! Every request carries the API key as the `key` query parameter. There is
//! no retry here: a failed request surfaces as a [`TransportFailure`] and the
//! caller decides whether to abort, skip, or re-issue at the same cursor.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::TransportFailure;
use crate::models::{Endpoint, Page, RawRecord, ScopeKind, Video};

/// A paginated comment source plus its single-video lookup.
#[async_trait]
pub trait CommentService: Send + Sync {
    /// Fetch one page from `endpoint`, continuing from `cursor` if given.
    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        cursor: Option<&str>,
    ) -> Result<Page<RawRecord>, TransportFailure>;

    /// Fetch metadata for one video. `Ok(None)` means the service knows no
    /// such video.
    async fn fetch_video(&self, video_id: &str) -> Result<Option<Video>, TransportFailure>;
}

/// [`CommentService`] backed by the YouTube Data API.
pub struct YoutubeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_results: u32,
}

impl YoutubeClient {
    /// Build a client with the configured per-request deadline.
    pub fn new(config: &ApiConfig, api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("API key is empty");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_results: config.max_results,
        })
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, TransportFailure> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|source| TransportFailure::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| TransportFailure::Http {
                url: url.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(TransportFailure::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| TransportFailure::Body {
            url,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl CommentService for YoutubeClient {
    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        cursor: Option<&str>,
    ) -> Result<Page<RawRecord>, TransportFailure> {
        let max_results = self.max_results.to_string();
        let (path, filter_key, filter_value) = match endpoint {
            Endpoint::Threads(scope) => match scope.kind {
                ScopeKind::Video => ("commentThreads", "videoId", scope.id.as_str()),
                ScopeKind::Channel => (
                    "commentThreads",
                    "allThreadsRelatedToChannelId",
                    scope.id.as_str(),
                ),
            },
            Endpoint::Replies { parent_id } => ("comments", "parentId", parent_id.as_str()),
        };

        let mut params = vec![
            ("part", "snippet"),
            ("textFormat", "plainText"),
            (filter_key, filter_value),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = cursor {
            params.push(("pageToken", token));
        }

        let json = self.get_json(path, &params).await?;
        parse_page(&json).map_err(|reason| TransportFailure::Body {
            url: format!("{}/{}", self.base_url, path),
            reason,
        })
    }

    async fn fetch_video(&self, video_id: &str) -> Result<Option<Video>, TransportFailure> {
        let json = self
            .get_json("videos", &[("part", "snippet"), ("id", video_id)])
            .await?;
        Ok(parse_video(json))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Split a listing response into its records and continuation cursor.
///
/// A missing or empty `nextPageToken` marks the terminal page.
pub fn parse_page(json: &serde_json::Value) -> std::result::Result<Page<RawRecord>, String> {
    if !json.is_object() {
        return Err("expected a JSON object envelope".to_string());
    }
    let envelope: Envelope = serde_json::from_value(json.clone()).map_err(|e| e.to_string())?;

    Ok(Page {
        items: envelope.items.into_iter().map(RawRecord).collect(),
        next_cursor: envelope.next_page_token.filter(|t| !t.is_empty()),
    })
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct VideoListing {
    items: Vec<VideoItem>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct VideoItem {
    snippet: Option<VideoSnippet>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct VideoSnippet {
    title: Option<String>,
    thumbnails: Option<Thumbnails>,
    channel_id: Option<String>,
    channel_title: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Thumbnail {
    url: Option<String>,
}

/// Read the first video of a `videos` listing; missing fields become blank.
fn parse_video(json: serde_json::Value) -> Option<Video> {
    let listing: VideoListing = serde_json::from_value(json).ok()?;
    let snippet = listing.items.into_iter().next()?.snippet?;

    Some(Video {
        title: snippet.title.unwrap_or_default(),
        thumbnail_url: snippet
            .thumbnails
            .and_then(|t| t.default)
            .and_then(|t| t.url)
            .unwrap_or_default(),
        channel_id: snippet.channel_id.unwrap_or_default(),
        channel_title: snippet.channel_title.unwrap_or_default(),
    })
}

//! In-memory [`CommentService`] for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::TransportFailure;
use crate::models::{Endpoint, Page, RawRecord, Video};
use crate::youtube::CommentService;

enum Scripted {
    Page(Vec<Value>, Option<String>),
    Fail,
}

fn endpoint_key(endpoint: &Endpoint) -> String {
    match endpoint {
        Endpoint::Threads(scope) => format!("threads:{}", scope),
        Endpoint::Replies { parent_id } => format!("replies:{}", parent_id),
    }
}

#[derive(Default)]
pub struct FakeService {
    pages: HashMap<(String, Option<String>), Scripted>,
    videos: HashMap<String, Video>,
    failing_videos: HashSet<String>,
    video_delay: Option<Duration>,
    video_fetches: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(
        mut self,
        endpoint: Endpoint,
        cursor: Option<&str>,
        items: Vec<Value>,
        next: Option<&str>,
    ) -> Self {
        self.pages.insert(
            (endpoint_key(&endpoint), cursor.map(str::to_string)),
            Scripted::Page(items, next.map(str::to_string)),
        );
        self
    }

    pub fn failing_page(mut self, endpoint: Endpoint, cursor: Option<&str>) -> Self {
        self.pages.insert(
            (endpoint_key(&endpoint), cursor.map(str::to_string)),
            Scripted::Fail,
        );
        self
    }

    pub fn video(mut self, id: &str, video: Video) -> Self {
        self.videos.insert(id.to_string(), video);
        self
    }

    pub fn failing_video(mut self, id: &str) -> Self {
        self.failing_videos.insert(id.to_string());
        self
    }

    pub fn video_delay(mut self, delay: Duration) -> Self {
        self.video_delay = Some(delay);
        self
    }

    pub fn video_fetches(&self) -> usize {
        self.video_fetches.load(Ordering::SeqCst)
    }

    /// Page requests in the order they were issued, as `endpoint@cursor`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn failure(key: &str) -> TransportFailure {
    TransportFailure::Status {
        url: key.to_string(),
        status: 503,
        body: "scripted failure".to_string(),
    }
}

#[async_trait]
impl CommentService for FakeService {
    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        cursor: Option<&str>,
    ) -> Result<Page<RawRecord>, TransportFailure> {
        let key = endpoint_key(endpoint);
        self.requests
            .lock()
            .unwrap()
            .push(format!("{}@{}", key, cursor.unwrap_or("")));
        tokio::task::yield_now().await;

        match self.pages.get(&(key.clone(), cursor.map(str::to_string))) {
            Some(Scripted::Page(items, next)) => Ok(Page {
                items: items.iter().cloned().map(RawRecord).collect(),
                next_cursor: next.clone(),
            }),
            Some(Scripted::Fail) | None => Err(failure(&key)),
        }
    }

    async fn fetch_video(&self, video_id: &str) -> Result<Option<Video>, TransportFailure> {
        self.video_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.video_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_videos.contains(video_id) {
            return Err(failure(video_id));
        }
        Ok(self.videos.get(video_id).cloned())
    }
}

/// A `commentThreads` item.
pub fn raw_thread(id: &str, video_id: &str, replies: u64, text: &str) -> Value {
    let mut snippet = json!({
        "totalReplyCount": replies,
        "topLevelComment": {
            "id": id,
            "snippet": {
                "authorDisplayName": format!("author of {}", id),
                "authorProfileImageUrl": format!("https://img/{}.jpg", id),
                "authorChannelId": {"value": format!("UC-{}", id)},
                "textDisplay": text,
                "likeCount": 2,
                "publishedAt": "2022-01-01T00:00:00Z",
                "updatedAt": "2022-01-01T00:00:00Z"
            }
        }
    });
    if !video_id.is_empty() {
        snippet["videoId"] = json!(video_id);
    }
    json!({"id": id, "snippet": snippet})
}

/// A `comments` item replying to `parent_id`.
pub fn raw_reply(id: &str, parent_id: &str, text: &str) -> Value {
    json!({
        "id": id,
        "snippet": {
            "parentId": parent_id,
            "authorDisplayName": format!("author of {}", id),
            "authorChannelId": {"value": format!("UC-{}", id)},
            "textDisplay": text,
            "likeCount": 1,
            "publishedAt": "2022-01-02T00:00:00Z",
            "updatedAt": "2022-01-02T00:00:00Z"
        }
    })
}

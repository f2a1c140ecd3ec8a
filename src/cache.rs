//! Read-through video metadata cache.
//!
//! One [`MetadataCache`] lives for exactly one harvest run (or one query
//! invocation) and is owned by whoever drives that run. Entries are never
//! evicted. Each key holds a [`OnceCell`], so concurrent resolutions of the
//! same `videoId` share a single in-flight fetch.
//!
//! Lookups never fail: an empty id, a transport failure, or an unknown
//! video all resolve to [`Video::empty`]. Failures are cached for the rest
//! of the run like any other result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::models::Video;
use crate::youtube::CommentService;

#[derive(Default)]
pub struct MetadataCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Video>>>>,
    fetches: AtomicUsize,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `video_id`, fetching from `service` only on first sight.
    pub async fn resolve(&self, service: &dyn CommentService, video_id: &str) -> Video {
        if video_id.is_empty() {
            return Video::empty();
        }

        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.entry(video_id.to_string()).or_default().clone()
        };

        cell.get_or_init(move || async move {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            match service.fetch_video(video_id).await {
                Ok(Some(video)) => video,
                Ok(None) => {
                    tracing::warn!(video_id, "video metadata not found; using blank video");
                    Video::empty()
                }
                Err(e) => {
                    tracing::warn!(video_id, error = %e, "video metadata lookup failed; using blank video");
                    Video::empty()
                }
            }
        })
        .await
        .clone()
    }

    /// Number of distinct video ids seen.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of network fetches issued so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeService;
    use futures::future::join_all;
    use std::time::Duration;

    fn launch_video() -> Video {
        Video {
            title: "Launch".to_string(),
            thumbnail_url: "https://img/launch.jpg".to_string(),
            channel_id: "UC1".to_string(),
            channel_title: "Rockets".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_id_never_fetches_or_caches() {
        let service = FakeService::new();
        let cache = MetadataCache::new();

        let video = cache.resolve(&service, "").await;
        assert_eq!(video, Video::empty());
        assert_eq!(service.video_fetches(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let service = FakeService::new().video("v1", launch_video());
        let cache = MetadataCache::new();

        assert_eq!(cache.resolve(&service, "v1").await, launch_video());
        assert_eq!(cache.resolve(&service, "v1").await, launch_video());
        assert_eq!(service.video_fetches(), 1);
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_fetch() {
        let service = FakeService::new()
            .video("v1", launch_video())
            .video_delay(Duration::from_millis(50));
        let cache = MetadataCache::new();

        let results = join_all((0..16).map(|_| cache.resolve(&service, "v1"))).await;

        assert_eq!(service.video_fetches(), 1);
        assert!(results.iter().all(|v| *v == launch_video()));
    }

    #[tokio::test]
    async fn unknown_or_failing_video_resolves_blank() {
        let service = FakeService::new().failing_video("broken");
        let cache = MetadataCache::new();

        assert_eq!(cache.resolve(&service, "missing").await, Video::empty());
        assert_eq!(cache.resolve(&service, "broken").await, Video::empty());
        assert_eq!(cache.resolve(&service, "broken").await, Video::empty());
        assert_eq!(service.video_fetches(), 2);
    }
}

//! Core data models used throughout the harvester.
//!
//! These types represent the comments, video metadata, and pages that flow
//! through the harvest pipeline, and the denormalized documents written to
//! the store.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Kind of root entity whose comment threads are harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Video,
    Channel,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Video => "video",
            ScopeKind::Channel => "channel",
        }
    }
}

/// A harvest scope: a video or a channel, by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: String,
}

impl Scope {
    pub fn video(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Video,
            id: id.into(),
        }
    }

    pub fn channel(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Channel,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Which paginated endpoint a page request targets, with its scope filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Top-level threads under a video or channel.
    Threads(Scope),
    /// Replies under one top-level comment.
    Replies { parent_id: String },
}

/// One page of a paginated listing.
///
/// `next_cursor` is opaque: callers re-submit it verbatim and stop when it
/// is absent.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// An undecoded record exactly as the remote service returned it.
#[derive(Debug, Clone)]
pub struct RawRecord(pub serde_json::Value);

/// A normalized comment, top-level or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub comment_id: String,
    /// Empty for top-level comments.
    pub parent_id: String,
    pub user_id: String,
    pub user_name: String,
    pub profile_picture: String,
    /// Empty for channel discussions with no video.
    pub video_id: String,
    pub text: String,
    pub publish_time: String,
    pub update_time: String,
    pub like_count: u64,
    /// Always 0 on replies.
    pub reply_count: u64,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        !self.parent_id.is_empty()
    }
}

/// Video metadata denormalized onto each stored comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub title: String,
    pub thumbnail_url: String,
    pub channel_id: String,
    pub channel_title: String,
}

impl Video {
    /// The canonical blank video used for unknown or unresolvable ids.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A comment joined with its resolved video, as written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDocument {
    pub comment: Comment,
    pub video: Video,
}

impl IndexedDocument {
    pub fn new(comment: Comment, video: Video) -> Self {
        Self { comment, video }
    }

    /// Storage key.
    pub fn key(&self) -> &str {
        &self.comment.comment_id
    }

    /// SHA-256 over every stored field, used to tell changed documents from
    /// unchanged ones on re-harvest.
    pub fn content_hash(&self) -> String {
        let c = &self.comment;
        let v = &self.video;
        let mut hasher = Sha256::new();
        for field in [
            c.comment_id.as_str(),
            c.parent_id.as_str(),
            c.user_id.as_str(),
            c.user_name.as_str(),
            c.profile_picture.as_str(),
            c.video_id.as_str(),
            c.text.as_str(),
            c.publish_time.as_str(),
            c.update_time.as_str(),
            v.title.as_str(),
            v.thumbnail_url.as_str(),
            v.channel_id.as_str(),
            v.channel_title.as_str(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(c.like_count.to_le_bytes());
        hasher.update(c.reply_count.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str) -> Comment {
        Comment {
            comment_id: id.to_string(),
            parent_id: String::new(),
            user_id: "UC1".to_string(),
            user_name: "alice".to_string(),
            profile_picture: String::new(),
            video_id: "v1".to_string(),
            text: "hello".to_string(),
            publish_time: "2020-01-01T00:00:00Z".to_string(),
            update_time: "2020-01-01T00:00:00Z".to_string(),
            like_count: 3,
            reply_count: 0,
        }
    }

    #[test]
    fn content_hash_stable_and_field_sensitive() {
        let a = IndexedDocument::new(comment("c1"), Video::empty());
        let b = IndexedDocument::new(comment("c1"), Video::empty());
        assert_eq!(a.content_hash(), b.content_hash());

        let mut c = b.clone();
        c.comment.like_count = 4;
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn content_hash_separates_field_boundaries() {
        let mut a = IndexedDocument::new(comment("c1"), Video::empty());
        let mut b = a.clone();
        a.comment.user_name = "ab".to_string();
        a.comment.text = "c".to_string();
        b.comment.user_name = "a".to_string();
        b.comment.text = "bc".to_string();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn empty_video_is_blank() {
        let v = Video::empty();
        assert!(v.is_empty());
        assert_eq!(v.title, "");
        assert_eq!(v.thumbnail_url, "");
        assert_eq!(v.channel_id, "");
        assert_eq!(v.channel_title, "");
    }
}

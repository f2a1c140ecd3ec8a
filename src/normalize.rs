//! Raw record → [`Comment`] normalization.
//!
//! Decoding happens in two steps. A raw JSON record is first read into a
//! shape where every field is optional ([`RawThread`], [`RawComment`]), so
//! absent paths never abort decoding. [`PartialComment::validate`] then
//! checks the required fields (`commentId`, author channel id, text) and
//! names the first one missing. Optional fields default to empty strings
//! and zero counts. Comment text loses the control characters the search
//! highlighter reserves as match delimiters.

use serde::Deserialize;

use crate::error::MalformedRecordFailure;
use crate::models::{Comment, RawRecord};
use crate::search::{MARK_CLOSE, MARK_OPEN};

/// A `commentThreads` item.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawThread {
    pub id: Option<String>,
    pub snippet: Option<RawThreadSnippet>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawThreadSnippet {
    pub video_id: Option<String>,
    pub channel_id: Option<String>,
    pub top_level_comment: Option<RawComment>,
    pub total_reply_count: Option<u64>,
}

/// A `comments` item, or the `topLevelComment` of a thread.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawComment {
    pub id: Option<String>,
    pub snippet: Option<RawCommentSnippet>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawCommentSnippet {
    pub author_display_name: Option<String>,
    pub author_profile_image_url: Option<String>,
    pub author_channel_id: Option<AuthorChannelId>,
    pub text_display: Option<String>,
    pub text_original: Option<String>,
    pub parent_id: Option<String>,
    pub video_id: Option<String>,
    pub like_count: Option<u64>,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AuthorChannelId {
    pub value: Option<String>,
}

/// Every [`Comment`] field, each possibly missing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PartialComment {
    pub comment_id: Option<String>,
    pub parent_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub profile_picture: Option<String>,
    pub video_id: Option<String>,
    pub text: Option<String>,
    pub publish_time: Option<String>,
    pub update_time: Option<String>,
    pub like_count: Option<u64>,
    pub reply_count: Option<u64>,
}

impl PartialComment {
    fn from_snippet(comment_id: Option<String>, snippet: Option<RawCommentSnippet>) -> Self {
        let s = snippet.unwrap_or_default();
        Self {
            comment_id: non_empty(comment_id),
            parent_id: non_empty(s.parent_id),
            user_id: non_empty(s.author_channel_id.and_then(|a| a.value)),
            user_name: s.author_display_name,
            profile_picture: s.author_profile_image_url,
            video_id: non_empty(s.video_id),
            text: s.text_display.or(s.text_original).map(strip_marks),
            publish_time: s.published_at,
            update_time: s.updated_at,
            like_count: s.like_count,
            reply_count: None,
        }
    }

    /// Check required fields and fill the rest with blanks.
    pub fn validate(self) -> Result<Comment, MalformedRecordFailure> {
        let record = self
            .comment_id
            .clone()
            .unwrap_or_else(|| "<unknown>".to_string());
        let missing = |field: &'static str| MalformedRecordFailure::MissingField {
            record: record.clone(),
            field,
        };

        let comment_id = self.comment_id.clone().ok_or_else(|| missing("commentId"))?;
        let user_id = self
            .user_id
            .ok_or_else(|| missing("authorChannelId.value"))?;
        let text = self.text.ok_or_else(|| missing("textDisplay"))?;

        Ok(Comment {
            comment_id,
            parent_id: self.parent_id.unwrap_or_default(),
            user_id,
            user_name: self.user_name.unwrap_or_default(),
            profile_picture: self.profile_picture.unwrap_or_default(),
            video_id: self.video_id.unwrap_or_default(),
            text,
            publish_time: self.publish_time.unwrap_or_default(),
            update_time: self.update_time.unwrap_or_default(),
            like_count: self.like_count.unwrap_or(0),
            reply_count: self.reply_count.unwrap_or(0),
        })
    }
}

fn strip_marks(text: String) -> String {
    if text.contains(MARK_OPEN) || text.contains(MARK_CLOSE) {
        text.replace(MARK_OPEN, "").replace(MARK_CLOSE, "")
    } else {
        text
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn decode<T: for<'de> Deserialize<'de>>(raw: &RawRecord) -> Result<T, MalformedRecordFailure> {
    if !raw.0.is_object() {
        return Err(MalformedRecordFailure::Undecodable(
            "record is not a JSON object".to_string(),
        ));
    }
    serde_json::from_value(raw.0.clone())
        .map_err(|e| MalformedRecordFailure::Undecodable(e.to_string()))
}

/// Read the partial form of a thread's top-level comment.
pub fn partial_top_level(raw: &RawRecord) -> Result<PartialComment, MalformedRecordFailure> {
    let thread: RawThread = decode(raw)?;
    let snippet = thread.snippet.unwrap_or_default();
    let top = snippet.top_level_comment.unwrap_or_default();

    let mut partial = PartialComment::from_snippet(top.id, top.snippet);
    // The thread id and the top-level comment id coincide; prefer the thread's.
    if let Some(id) = non_empty(thread.id) {
        partial.comment_id = Some(id);
    }
    partial.parent_id = None;
    partial.video_id = non_empty(snippet.video_id).or(partial.video_id);
    partial.reply_count = snippet.total_reply_count;
    Ok(partial)
}

/// Normalize one `commentThreads` item into its top-level [`Comment`].
pub fn normalize_top_level(raw: &RawRecord) -> Result<Comment, MalformedRecordFailure> {
    partial_top_level(raw)?.validate()
}

/// Normalize one `comments` item under the thread `parent_id`.
///
/// Replies carry no video id of their own, so the owning thread's
/// `video_id` is stamped on. `replyCount` is always 0.
pub fn normalize_reply(
    raw: &RawRecord,
    parent_id: &str,
    video_id: &str,
) -> Result<Comment, MalformedRecordFailure> {
    let reply: RawComment = decode(raw)?;
    let mut partial = PartialComment::from_snippet(reply.id, reply.snippet);

    if partial.parent_id.is_none() && !parent_id.is_empty() {
        partial.parent_id = Some(parent_id.to_string());
    }
    partial.video_id = Some(video_id.to_string());
    partial.reply_count = Some(0);
    partial.validate()
}

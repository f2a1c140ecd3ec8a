//! Document retrieval by comment id, for `chv get`.

use anyhow::{bail, Result};
use std::path::Path;

use crate::models::IndexedDocument;
use crate::store;

/// Fetch one stored document; a missing id is an error.
pub async fn get_document(store_path: &Path, comment_id: &str) -> Result<IndexedDocument> {
    let pool = store::open_reader(store_path).await?;
    let doc = store::get_document(&pool, comment_id).await;
    pool.close().await;

    match doc? {
        Some(doc) => Ok(doc),
        None => bail!("comment not found: {}", comment_id),
    }
}

pub async fn run_get(store_path: &Path, comment_id: &str, json: bool) -> Result<()> {
    let doc = get_document(store_path, comment_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let c = &doc.comment;
    let v = &doc.video;
    println!("--- Comment ---");
    println!("id:              {}", c.comment_id);
    if c.is_reply() {
        println!("parent:          {}", c.parent_id);
    }
    println!("author:          {} ({})", c.user_name, c.user_id);
    println!("profile picture: {}", c.profile_picture);
    println!("published:       {}", c.publish_time);
    println!("updated:         {}", c.update_time);
    println!("likes:           {}", c.like_count);
    println!("replies:         {}", c.reply_count);
    println!();

    println!("--- Video ---");
    if c.video_id.is_empty() {
        println!("(none)");
    } else {
        println!("id:              {}", c.video_id);
        println!(
            "title:           {}",
            if v.title.is_empty() { "(unknown)" } else { &v.title }
        );
        println!("thumbnail:       {}", v.thumbnail_url);
        println!("channel:         {} ({})", v.channel_title, v.channel_id);
    }
    println!();

    println!("--- Text ---");
    println!("{}", c.text);

    Ok(())
}

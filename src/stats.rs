//! Store statistics and recent harvest runs, for `chv stats`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::store::{self, RunRecord};

/// Document counts for one store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub documents: i64,
    pub threads: i64,
    pub replies: i64,
    pub videos: i64,
    pub channels: i64,
    pub authors: i64,
    /// Documents whose video metadata is blank.
    pub without_video: i64,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<StoreStats> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS documents,
            COALESCE(SUM(parent_id = ''), 0) AS threads,
            COALESCE(SUM(parent_id != ''), 0) AS replies,
            COUNT(DISTINCT NULLIF(video_id, '')) AS videos,
            COUNT(DISTINCT NULLIF(channel_id, '')) AS channels,
            COUNT(DISTINCT user_id) AS authors,
            COALESCE(SUM(video_title = ''), 0) AS without_video
        FROM comments
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(StoreStats {
        documents: row.get("documents"),
        threads: row.get("threads"),
        replies: row.get("replies"),
        videos: row.get("videos"),
        channels: row.get("channels"),
        authors: row.get("authors"),
        without_video: row.get("without_video"),
    })
}

pub async fn run_stats(store_path: &Path) -> Result<()> {
    let pool = store::open_reader(store_path).await?;
    let stats = collect_stats(&pool).await;
    let runs = store::recent_runs(&pool, 10).await;
    pool.close().await;
    let (stats, runs) = (stats?, runs?);

    let size = std::fs::metadata(store_path).map(|m| m.len()).unwrap_or(0);

    println!("Comment Harvester — Store Stats");
    println!("===============================");
    println!();
    println!("  Store:       {}", store_path.display());
    println!("  Size:        {}", format_bytes(size));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Threads:     {}", stats.threads);
    println!("  Replies:     {}", stats.replies);
    println!("  Videos:      {}", stats.videos);
    println!("  Channels:    {}", stats.channels);
    println!("  Authors:     {}", stats.authors);
    println!("  No video:    {}", stats.without_video);

    if !runs.is_empty() {
        println!();
        println!("  Recent harvests:");
        println!(
            "  {:<32} {:<10} {:>9}   {}",
            "SCOPE", "STATUS", "DOCS", "STARTED"
        );
        println!("  {}", "-".repeat(72));
        for run in &runs {
            print_run(run);
        }
    }

    println!();
    Ok(())
}

fn print_run(run: &RunRecord) {
    let scope = format!("{}:{}", run.scope_kind, run.scope_id);
    println!(
        "  {:<32} {:<10} {:>9}   {}",
        scope,
        run.status,
        run.documents,
        format_ts_relative(run.started_at)
    );
    if let Some(cursor) = run.cursor.as_deref().filter(|_| run.status != "complete") {
        println!("  {:<32} resume cursor: {}", "", cursor);
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

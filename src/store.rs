//! SQLite-backed comment store.
//!
//! Layout:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `comments` | one row per `comment_id` (unique key), all stored fields |
//! | `comments_fts` | FTS5 over `user_name`, `comment_text`, `video_title`, `channel_title`; `rowid` = `comments.id` |
//! | `harvest_runs` | one row per harvest run: scope, status, last cursor |
//!
//! Identity fields (`comment_id`, `parent_id`, `user_id`, `video_id`,
//! `channel_id`) are plain indexed columns compared by equality. Counts and
//! URLs are stored only.
//!
//! Writes go through an [`IndexWriter`] session: a single-connection pool,
//! so upserts are serialized, and each upsert is one transaction that
//! replaces both the row and its FTS entry.

use anyhow::{bail, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::WriteFailure;
use crate::models::{Comment, IndexedDocument, Scope, Video};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    /// Create the file if missing; WAL journal.
    Write,
    /// Existing file only; every statement that writes is rejected.
    Read,
}

async fn connect(path: &Path, mode: OpenMode, max_connections: u32) -> Result<SqlitePool> {
    if mode == OpenMode::Write {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    } else if !path.exists() {
        bail!("store not found: {}", path.display());
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?;
    // The journal mode is persisted by the writer; readers leave it alone.
    let options = match mode {
        OpenMode::Write => options
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal),
        OpenMode::Read => options.read_only(true),
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open store: {}", path.display()))?;

    Ok(pool)
}

/// Create every table and index the store needs. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY,
            comment_id TEXT NOT NULL UNIQUE,
            parent_id TEXT NOT NULL DEFAULT '',
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL DEFAULT '',
            profile_picture TEXT NOT NULL DEFAULT '',
            video_id TEXT NOT NULL DEFAULT '',
            comment_text TEXT NOT NULL,
            publish_time TEXT NOT NULL DEFAULT '',
            update_time TEXT NOT NULL DEFAULT '',
            like_count INTEGER NOT NULL DEFAULT 0,
            reply_count INTEGER NOT NULL DEFAULT 0,
            video_title TEXT NOT NULL DEFAULT '',
            video_thumbnail TEXT NOT NULL DEFAULT '',
            channel_id TEXT NOT NULL DEFAULT '',
            channel_title TEXT NOT NULL DEFAULT '',
            content_hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS harvest_runs (
            run_id TEXT PRIMARY KEY,
            scope_kind TEXT NOT NULL,
            scope_id TEXT NOT NULL,
            status TEXT NOT NULL,
            cursor TEXT,
            documents INTEGER NOT NULL DEFAULT 0,
            started_at INTEGER NOT NULL,
            finished_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='comments_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE comments_fts USING fts5(
                user_name,
                comment_text,
                video_title,
                channel_title
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_comments_parent_id ON comments(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_comments_user_id ON comments(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_comments_video_id ON comments(video_id)",
        "CREATE INDEX IF NOT EXISTS idx_comments_channel_id ON comments(channel_id)",
        "CREATE INDEX IF NOT EXISTS idx_harvest_runs_scope ON harvest_runs(scope_kind, scope_id, started_at DESC)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}

/// Create (or extend) the store at `path` and close it again.
pub async fn init_store(path: &Path) -> Result<()> {
    let pool = connect(path, OpenMode::Write, 1).await?;
    run_migrations(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Open an existing store read-only.
///
/// Fails if the file does not exist or was never initialized; a reader
/// never creates a store.
pub async fn open_reader(path: &Path) -> Result<SqlitePool> {
    let pool = connect(path, OpenMode::Read, 4).await?;

    let initialized: bool = sqlx::query_scalar(
        "SELECT COUNT(*) = 2 FROM sqlite_master WHERE type='table' AND name IN ('comments', 'comments_fts')",
    )
    .fetch_one(&pool)
    .await?;

    if !initialized {
        pool.close().await;
        bail!(
            "store at {} is not initialized; run `chv init` or `chv harvest` first",
            path.display()
        );
    }

    Ok(pool)
}

/// What an upsert did to the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Replaced with different content.
    Updated,
    /// Replaced with identical content.
    Unchanged,
}

/// A write session on one store.
///
/// Opening creates the store if it is missing and appends to it otherwise.
/// The session owns a single connection; call [`close`](IndexWriter::close)
/// on every exit path to flush and release it.
pub struct IndexWriter {
    pool: SqlitePool,
    path: PathBuf,
}

impl IndexWriter {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = connect(path, OpenMode::Write, 1).await?;
        run_migrations(&pool).await?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert `doc`, or replace the document with the same `comment_id`.
    pub async fn upsert(&self, doc: &IndexedDocument) -> Result<UpsertOutcome, WriteFailure> {
        self.upsert_inner(doc).await.map_err(|source| WriteFailure {
            key: doc.key().to_string(),
            source,
        })
    }

    async fn upsert_inner(&self, doc: &IndexedDocument) -> Result<UpsertOutcome, sqlx::Error> {
        let c = &doc.comment;
        let v = &doc.video;
        let hash = doc.content_hash();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        let previous_hash: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM comments WHERE comment_id = ?")
                .bind(&c.comment_id)
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO comments (comment_id, parent_id, user_id, user_name, profile_picture,
                                  video_id, comment_text, publish_time, update_time,
                                  like_count, reply_count, video_title, video_thumbnail,
                                  channel_id, channel_title, content_hash, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(comment_id) DO UPDATE SET
                parent_id = excluded.parent_id,
                user_id = excluded.user_id,
                user_name = excluded.user_name,
                profile_picture = excluded.profile_picture,
                video_id = excluded.video_id,
                comment_text = excluded.comment_text,
                publish_time = excluded.publish_time,
                update_time = excluded.update_time,
                like_count = excluded.like_count,
                reply_count = excluded.reply_count,
                video_title = excluded.video_title,
                video_thumbnail = excluded.video_thumbnail,
                channel_id = excluded.channel_id,
                channel_title = excluded.channel_title,
                content_hash = excluded.content_hash,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&c.comment_id)
        .bind(&c.parent_id)
        .bind(&c.user_id)
        .bind(&c.user_name)
        .bind(&c.profile_picture)
        .bind(&c.video_id)
        .bind(&c.text)
        .bind(&c.publish_time)
        .bind(&c.update_time)
        .bind(to_i64(c.like_count))
        .bind(to_i64(c.reply_count))
        .bind(&v.title)
        .bind(&v.thumbnail_url)
        .bind(&v.channel_id)
        .bind(&v.channel_title)
        .bind(&hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM comments WHERE comment_id = ?")
            .bind(&c.comment_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM comments_fts WHERE rowid = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO comments_fts (rowid, user_name, comment_text, video_title, channel_title) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&c.user_name)
        .bind(&c.text)
        .bind(&v.title)
        .bind(&v.channel_title)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(match previous_hash {
            None => UpsertOutcome::Inserted,
            Some(h) if h == hash => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Columns selected wherever a full document is read back.
pub const DOCUMENT_COLUMNS: &str = "c.comment_id, c.parent_id, c.user_id, c.user_name, \
    c.profile_picture, c.video_id, c.comment_text, c.publish_time, c.update_time, \
    c.like_count, c.reply_count, c.video_title, c.video_thumbnail, c.channel_id, c.channel_title";

/// Rebuild an [`IndexedDocument`] from a row selected with [`DOCUMENT_COLUMNS`].
pub fn document_from_row(row: &SqliteRow) -> IndexedDocument {
    let like_count: i64 = row.get("like_count");
    let reply_count: i64 = row.get("reply_count");
    IndexedDocument {
        comment: Comment {
            comment_id: row.get("comment_id"),
            parent_id: row.get("parent_id"),
            user_id: row.get("user_id"),
            user_name: row.get("user_name"),
            profile_picture: row.get("profile_picture"),
            video_id: row.get("video_id"),
            text: row.get("comment_text"),
            publish_time: row.get("publish_time"),
            update_time: row.get("update_time"),
            like_count: like_count.max(0) as u64,
            reply_count: reply_count.max(0) as u64,
        },
        video: Video {
            title: row.get("video_title"),
            thumbnail_url: row.get("video_thumbnail"),
            channel_id: row.get("channel_id"),
            channel_title: row.get("channel_title"),
        },
    }
}

/// Fetch one document by key.
pub async fn get_document(pool: &SqlitePool, comment_id: &str) -> Result<Option<IndexedDocument>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM comments c WHERE c.comment_id = ?",
        DOCUMENT_COLUMNS
    ))
    .bind(comment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(document_from_row))
}

// ============ Harvest run ledger ============

/// Terminal (or current) state of a harvest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Complete,
    Aborted,
    /// Stopped by the page cap before reaching a terminal cursor.
    Capped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Complete => "complete",
            RunStatus::Aborted => "aborted",
            RunStatus::Capped => "capped",
        }
    }
}

/// Record the start of a run and return its id.
pub async fn begin_run(pool: &SqlitePool, scope: &Scope) -> Result<String> {
    let run_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO harvest_runs (run_id, scope_kind, scope_id, status, started_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&run_id)
    .bind(scope.kind.as_str())
    .bind(&scope.id)
    .bind(RunStatus::Running.as_str())
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(run_id)
}

pub async fn finish_run(
    pool: &SqlitePool,
    run_id: &str,
    status: RunStatus,
    cursor: Option<&str>,
    documents: u64,
) -> Result<()> {
    sqlx::query(
        "UPDATE harvest_runs SET status = ?, cursor = ?, documents = ?, finished_at = ? WHERE run_id = ?",
    )
    .bind(status.as_str())
    .bind(cursor)
    .bind(to_i64(documents))
    .bind(chrono::Utc::now().timestamp())
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Cursor to resume `scope` from, if its most recent finished run stopped
/// early. `Some(None)` means resume from the first page.
pub async fn resume_cursor(pool: &SqlitePool, scope: &Scope) -> Result<Option<Option<String>>> {
    let row = sqlx::query(
        r#"
        SELECT status, cursor FROM harvest_runs
        WHERE scope_kind = ? AND scope_id = ? AND status != 'running'
        ORDER BY started_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(scope.kind.as_str())
    .bind(&scope.id)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|row| {
        let status: String = row.get("status");
        match status.as_str() {
            "aborted" | "capped" => Some(row.get::<Option<String>, _>("cursor")),
            _ => None,
        }
    }))
}

/// A row of `harvest_runs`, for reporting.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub scope_kind: String,
    pub scope_id: String,
    pub status: String,
    pub cursor: Option<String>,
    pub documents: i64,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

pub async fn recent_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<RunRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT run_id, scope_kind, scope_id, status, cursor, documents, started_at, finished_at
        FROM harvest_runs
        ORDER BY started_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| RunRecord {
            run_id: row.get("run_id"),
            scope_kind: row.get("scope_kind"),
            scope_id: row.get("scope_id"),
            status: row.get("status"),
            cursor: row.get("cursor"),
            documents: row.get("documents"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
        })
        .collect())
}

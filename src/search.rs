//! Search executor and paginator.
//!
//! Every invocation runs inside one read transaction, so the count, the
//! page walk and the highlighting all see the same store snapshot.
//!
//! Hits are ranked by `-bm25` when the query has a text clause and by a
//! constant 0 otherwise; ties break on `comment_id` ascending. There is no
//! offset: page `p` is reached by chaining search-after from the last hit
//! of each earlier page, `p - 1` times.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::cache::MetadataCache;
use crate::config::Config;
use crate::models::IndexedDocument;
use crate::query::{self, CompiledQuery, Field, Query};
use crate::render::{render, OutputFormat};
use crate::store::{self, document_from_row, DOCUMENT_COLUMNS};
use crate::youtube::{CommentService, YoutubeClient};

/// Match delimiters passed to `highlight()`. Normalized text never
/// contains them.
pub(crate) const MARK_OPEN: &str = "\u{1}";
pub(crate) const MARK_CLOSE: &str = "\u{2}";

/// One page of results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultWindow {
    pub items: Vec<Hit>,
    pub total_hits: u64,
    pub page: u32,
    pub page_size: u32,
    /// `ceil(total_hits / page_size)`; 0 when nothing matched.
    pub last_page: u64,
}

impl ResultWindow {
    /// 1-based rank of the first item on this page.
    pub fn first_rank(&self) -> u64 {
        1 + (self.page as u64 - 1) * self.page_size as u64
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
    pub document: IndexedDocument,
    pub score: f64,
    /// Comment text, highlighted when the query constrained it.
    pub snippet: Snippet,
}

/// A run of comment text, matched or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    pub matched: bool,
}

/// Comment text split into matched and unmatched runs. Covers the whole
/// text; nothing is truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub segments: Vec<Segment>,
}

impl Snippet {
    pub fn plain(text: &str) -> Self {
        Self {
            segments: vec![Segment {
                text: text.to_string(),
                matched: false,
            }],
        }
    }

    /// Parse highlighter output delimited by the internal marker pair.
    fn from_marked(marked: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = marked;
        while !rest.is_empty() {
            match rest.find(MARK_OPEN) {
                Some(start) => {
                    push_segment(&mut segments, &rest[..start], false);
                    let inner = &rest[start + MARK_OPEN.len()..];
                    let end = inner.find(MARK_CLOSE).unwrap_or(inner.len());
                    push_segment(&mut segments, &inner[..end], true);
                    rest = inner.get(end + MARK_CLOSE.len()..).unwrap_or("");
                }
                None => {
                    push_segment(&mut segments, rest, false);
                    rest = "";
                }
            }
        }
        Self { segments }
    }

    pub fn is_highlighted(&self) -> bool {
        self.segments.iter().any(|s| s.matched)
    }

    /// Text without markup.
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Wrap matched runs in `open`/`close`, passing every run through
    /// `escape` first.
    pub fn render(&self, open: &str, close: &str, escape: impl Fn(&str) -> String) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            if seg.matched {
                out.push_str(open);
                out.push_str(&escape(&seg.text));
                out.push_str(close);
            } else {
                out.push_str(&escape(&seg.text));
            }
        }
        out
    }
}

fn push_segment(segments: &mut Vec<Segment>, text: &str, matched: bool) {
    if text.is_empty() {
        return;
    }
    match segments.last_mut() {
        Some(last) if last.matched == matched => last.text.push_str(text),
        _ => segments.push(Segment {
            text: text.to_string(),
            matched,
        }),
    }
}

/// Position of a hit in the ranked order.
#[derive(Debug, Clone, PartialEq)]
struct RankedHit {
    rid: i64,
    comment_id: String,
    score: f64,
}

/// Run `compiled` and return page `page` of size `page_size`.
///
/// A page past the last one is an empty window, not an error.
pub async fn search(
    pool: &SqlitePool,
    compiled: &CompiledQuery,
    page: u32,
    page_size: u32,
) -> Result<ResultWindow> {
    if page == 0 {
        bail!("page must be a positive integer");
    }
    if page_size == 0 {
        bail!("page size must be a positive integer");
    }

    let fts = compiled.fts_expression();
    let mut tx = pool.begin().await?;

    let total_hits = count_hits(&mut tx, compiled, fts.as_deref()).await?;
    let last_page = total_hits.div_ceil(page_size as u64);

    let mut items = Vec::new();
    if page as u64 <= last_page {
        let mut after: Option<RankedHit> = None;
        for _ in 1..page {
            let skipped = search_after(&mut tx, compiled, fts.as_deref(), after.as_ref(), page_size).await?;
            match skipped.into_iter().last() {
                Some(last) => after = Some(last),
                None => break,
            }
        }

        let ranked = search_after(&mut tx, compiled, fts.as_deref(), after.as_ref(), page_size).await?;
        let rids: Vec<i64> = ranked.iter().map(|h| h.rid).collect();
        let mut documents = load_documents(&mut tx, &rids).await?;

        // The highlighter is only meaningful on a field the query constrained.
        let mut snippets = match fts.as_deref() {
            Some(expr) if compiled.has_clause(Field::CommentText) => {
                highlight_comment_text(&mut tx, expr, &rids).await?
            }
            _ => HashMap::new(),
        };

        for hit in ranked {
            let Some(document) = documents.remove(&hit.rid) else {
                continue;
            };
            let snippet = snippets
                .remove(&hit.rid)
                .unwrap_or_else(|| Snippet::plain(&document.comment.text));
            items.push(Hit {
                document,
                score: hit.score,
                snippet,
            });
        }
    }

    tx.rollback().await?;

    tracing::debug!(total_hits, page, page_size, returned = items.len(), "search complete");

    Ok(ResultWindow {
        items,
        total_hits,
        page,
        page_size,
        last_page,
    })
}

/// `FROM ... WHERE ...` shared by counting and ranking.
fn push_from_where(qb: &mut QueryBuilder<'_, Sqlite>, compiled: &CompiledQuery, fts: Option<&str>) {
    match fts {
        Some(expr) => {
            qb.push(" FROM comments_fts JOIN comments c ON c.id = comments_fts.rowid WHERE comments_fts MATCH ");
            qb.push_bind(expr.to_string());
        }
        None => {
            qb.push(" FROM comments c WHERE 1 = 1");
        }
    }

    for (field, values) in compiled.exact_clauses() {
        if values.is_empty() {
            qb.push(" AND 0");
            continue;
        }
        qb.push(" AND c.");
        qb.push(field.column());
        qb.push(" IN (");
        let mut list = qb.separated(", ");
        for value in values {
            list.push_bind(value.clone());
        }
        list.push_unseparated(")");
    }
}

async fn count_hits(
    conn: &mut SqliteConnection,
    compiled: &CompiledQuery,
    fts: Option<&str>,
) -> Result<u64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    push_from_where(&mut qb, compiled, fts);
    let count: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
    Ok(count.max(0) as u64)
}

/// Up to `limit` hits ranked strictly after `after`.
async fn search_after(
    conn: &mut SqliteConnection,
    compiled: &CompiledQuery,
    fts: Option<&str>,
    after: Option<&RankedHit>,
    limit: u32,
) -> Result<Vec<RankedHit>> {
    let score = if fts.is_some() {
        "-bm25(comments_fts)"
    } else {
        "0.0"
    };

    let mut qb = QueryBuilder::<Sqlite>::new(
        "WITH hits AS MATERIALIZED (SELECT c.id AS rid, c.comment_id AS comment_id, ",
    );
    qb.push(score);
    qb.push(" AS score");
    push_from_where(&mut qb, compiled, fts);
    qb.push(") SELECT rid, comment_id, score FROM hits");

    if let Some(after) = after {
        qb.push(" WHERE score < ");
        qb.push_bind(after.score);
        qb.push(" OR (score = ");
        qb.push_bind(after.score);
        qb.push(" AND comment_id > ");
        qb.push_bind(after.comment_id.clone());
        qb.push(")");
    }

    qb.push(" ORDER BY score DESC, comment_id ASC LIMIT ");
    qb.push_bind(limit as i64);

    let rows = qb.build().fetch_all(&mut *conn).await?;
    Ok(rows
        .iter()
        .map(|row| RankedHit {
            rid: row.get("rid"),
            comment_id: row.get("comment_id"),
            score: row.get("score"),
        })
        .collect())
}

async fn load_documents(
    conn: &mut SqliteConnection,
    rids: &[i64],
) -> Result<HashMap<i64, IndexedDocument>> {
    if rids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT c.id AS rid, ");
    qb.push(DOCUMENT_COLUMNS);
    qb.push(" FROM comments c WHERE c.id IN (");
    let mut list = qb.separated(", ");
    for rid in rids {
        list.push_bind(*rid);
    }
    list.push_unseparated(")");

    let rows = qb.build().fetch_all(&mut *conn).await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<i64, _>("rid"), document_from_row(row)))
        .collect())
}

/// Full-length highlighted `comment_text` for the given rows.
async fn highlight_comment_text(
    conn: &mut SqliteConnection,
    fts: &str,
    rids: &[i64],
) -> Result<HashMap<i64, Snippet>> {
    if rids.is_empty() {
        return Ok(HashMap::new());
    }

    // Column 1 of comments_fts is comment_text.
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT rowid AS rid, highlight(comments_fts, 1, ");
    qb.push_bind(MARK_OPEN);
    qb.push(", ");
    qb.push_bind(MARK_CLOSE);
    qb.push(") AS marked FROM comments_fts WHERE comments_fts MATCH ");
    qb.push_bind(fts.to_string());
    qb.push(" AND rowid IN (");
    let mut list = qb.separated(", ");
    for rid in rids {
        list.push_bind(*rid);
    }
    list.push_unseparated(")");

    let rows = qb.build().fetch_all(&mut *conn).await?;
    Ok(rows
        .iter()
        .map(|row| {
            let marked: String = row.get("marked");
            (row.get::<i64, _>("rid"), Snippet::from_marked(&marked))
        })
        .collect())
}

/// Fill in video metadata for hits stored without a title.
///
/// Returns how many hits were enriched.
pub async fn enrich_videos(
    window: &mut ResultWindow,
    service: &dyn CommentService,
    cache: &MetadataCache,
) -> usize {
    let mut enriched = 0;
    for hit in &mut window.items {
        let doc = &mut hit.document;
        if doc.comment.video_id.is_empty() || !doc.video.title.is_empty() {
            continue;
        }
        let video = cache.resolve(service, &doc.comment.video_id).await;
        if !video.is_empty() {
            doc.video = video;
            enriched += 1;
        }
    }
    enriched
}

/// Arguments of `chv query`.
#[derive(Debug, Clone)]
pub struct QueryArgs {
    pub store: Option<PathBuf>,
    pub query: Query,
    pub page: u32,
    pub page_size: Option<u32>,
    pub format: OutputFormat,
    pub webpage_url: Option<String>,
    pub api_key: Option<String>,
}

/// CLI entry point: compile, search, enrich, render to stdout.
pub async fn run_query(config: &Config, args: QueryArgs) -> Result<()> {
    let compiled = query::build(&args.query)?;
    let page_size = args.page_size.unwrap_or(config.search.page_size);

    let store_path = args.store.as_ref().unwrap_or(&config.store.path);
    let pool = store::open_reader(store_path).await?;
    let result = search(&pool, &compiled, args.page, page_size).await;
    pool.close().await;
    let mut window = result?;

    if let Some(api_key) = config.api_key(args.api_key.as_deref()) {
        let client = YoutubeClient::new(&config.api, api_key)?;
        let cache = MetadataCache::new();
        let enriched = enrich_videos(&mut window, &client, &cache).await;
        tracing::debug!(enriched, lookups = cache.fetch_count(), "render-time video enrichment");
    }

    let webpage_url = args
        .webpage_url
        .as_deref()
        .or(config.search.webpage_url.as_deref())
        .unwrap_or("");
    print!("{}", render(args.format, &window, &args.query, webpage_url)?);
    Ok(())
}

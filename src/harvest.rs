//! Harvest orchestration.
//!
//! A run walks two nested pagination loops:
//!
//! ```text
//! threads page ──▶ normalize ──▶ resolve video ──▶ upsert
//!      │                                             │
//!      │            for each thread with replies:    ▼
//!      │            replies page ──▶ normalize ──▶ upsert   (bounded concurrency)
//!      ▼
//! next threads page (only after every reply loop of this page has ended)
//! ```
//!
//! Failure policy:
//!
//! - a transport failure on a threads page aborts the run with a
//!   [`HarvestAborted`] carrying the cursor to resume from;
//! - a transport failure (or the page cap) on a replies page ends that
//!   thread's reply loop and records it under `incomplete_threads`;
//! - a malformed record or a failed write skips that one record.
//!
//! The CLI entry point [`run_harvest`] wraps a run with the store session
//! and the `harvest_runs` ledger.

use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::PathBuf;

use crate::cache::MetadataCache;
use crate::config::{Config, API_KEY_ENV};
use crate::error::HarvestAborted;
use crate::models::{Endpoint, IndexedDocument, Scope};
use crate::normalize::{normalize_reply, normalize_top_level};
use crate::progress::{HarvestProgressEvent, HarvestProgressReporter, ProgressMode};
use crate::store::{self, IndexWriter, RunStatus, UpsertOutcome};
use crate::youtube::{CommentService, YoutubeClient};

/// Counters for one harvest run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    /// Thread pages fetched.
    pub pages: u64,
    pub threads: u64,
    pub replies: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub malformed: u64,
    pub write_failures: u64,
    /// Threads whose replies were not fully collected.
    pub incomplete_threads: Vec<String>,
}

impl HarvestReport {
    /// Documents successfully written.
    pub fn documents(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    fn absorb(&mut self, other: HarvestReport) {
        self.pages += other.pages;
        self.threads += other.threads;
        self.replies += other.replies;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.malformed += other.malformed;
        self.write_failures += other.write_failures;
        self.incomplete_threads.extend(other.incomplete_threads);
    }
}

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Reply loops run concurrently, at most this many at a time.
    pub reply_concurrency: usize,
    /// Cap on pages per pagination loop.
    pub max_pages: Option<usize>,
    /// Threads cursor to start from instead of the first page.
    pub start_cursor: Option<String>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            reply_concurrency: 4,
            max_pages: None,
            start_cursor: None,
        }
    }
}

/// How a run that did not abort ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestOutcome {
    pub report: HarvestReport,
    /// [`RunStatus::Complete`] or [`RunStatus::Capped`].
    pub status: RunStatus,
    /// Next threads cursor when capped.
    pub cursor: Option<String>,
}

pub struct Harvester<'a> {
    service: &'a dyn CommentService,
    writer: &'a IndexWriter,
    cache: MetadataCache,
    options: HarvestOptions,
    progress: &'a dyn HarvestProgressReporter,
}

impl<'a> Harvester<'a> {
    pub fn new(
        service: &'a dyn CommentService,
        writer: &'a IndexWriter,
        options: HarvestOptions,
        progress: &'a dyn HarvestProgressReporter,
    ) -> Self {
        Self {
            service,
            writer,
            cache: MetadataCache::new(),
            options,
            progress,
        }
    }

    /// Harvest every thread (and its replies) under `scope`.
    pub async fn harvest(&self, scope: &Scope) -> Result<HarvestOutcome, HarvestAborted> {
        let endpoint = Endpoint::Threads(scope.clone());
        let mut report = HarvestReport::default();
        let mut cursor = self.options.start_cursor.clone();
        let mut pages = 0usize;

        tracing::info!(%scope, start_cursor = ?cursor, "harvest started");

        loop {
            if self.options.max_pages.is_some_and(|max| pages >= max) {
                tracing::warn!(%scope, pages, cursor = ?cursor, "page cap reached; stopping early");
                return Ok(self.finish(scope, report, RunStatus::Capped, cursor));
            }

            let page = match self.service.fetch_page(&endpoint, cursor.as_deref()).await {
                Ok(page) => page,
                Err(source) => {
                    tracing::error!(%scope, cursor = ?cursor, error = %source, "threads page failed; aborting");
                    self.progress.report(HarvestProgressEvent::Finished {
                        scope: scope.to_string(),
                        status: RunStatus::Aborted.as_str(),
                        documents: report.documents(),
                    });
                    return Err(HarvestAborted {
                        resume_cursor: cursor,
                        report,
                        source,
                    });
                }
            };
            pages += 1;
            report.pages += 1;

            let mut with_replies = Vec::new();
            for raw in &page.items {
                let comment = match normalize_top_level(raw) {
                    Ok(comment) => comment,
                    Err(e) => {
                        tracing::warn!(%scope, error = %e, "skipping malformed thread record");
                        report.malformed += 1;
                        continue;
                    }
                };
                report.threads += 1;

                let video = self.cache.resolve(self.service, &comment.video_id).await;
                if comment.reply_count > 0 {
                    with_replies.push((comment.comment_id.clone(), comment.video_id.clone()));
                }
                self.write(IndexedDocument::new(comment, video), &mut report)
                    .await;
            }

            // Replies of this page are finished before the next page is requested.
            let threads: Vec<HarvestReport> = stream::iter(with_replies)
                .map(|(parent_id, video_id)| self.harvest_replies(parent_id, video_id))
                .buffered(self.options.reply_concurrency.max(1))
                .collect()
                .await;
            for thread in threads {
                for thread_id in &thread.incomplete_threads {
                    self.progress.report(HarvestProgressEvent::IncompleteThread {
                        scope: scope.to_string(),
                        thread_id: thread_id.clone(),
                    });
                }
                report.absorb(thread);
            }

            tracing::debug!(%scope, page = pages, items = page.items.len(), "threads page done");
            self.progress.report(HarvestProgressEvent::Page {
                scope: scope.to_string(),
                page: pages as u64,
                threads: report.threads,
                replies: report.replies,
            });

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(self.finish(scope, report, RunStatus::Complete, None)),
            }
        }
    }

    fn finish(
        &self,
        scope: &Scope,
        report: HarvestReport,
        status: RunStatus,
        cursor: Option<String>,
    ) -> HarvestOutcome {
        tracing::info!(
            %scope,
            status = status.as_str(),
            threads = report.threads,
            replies = report.replies,
            incomplete = report.incomplete_threads.len(),
            videos = self.cache.len(),
            "harvest finished"
        );
        self.progress.report(HarvestProgressEvent::Finished {
            scope: scope.to_string(),
            status: status.as_str(),
            documents: report.documents(),
        });
        HarvestOutcome {
            report,
            status,
            cursor,
        }
    }

    /// Reply loop for one thread. Never fails; problems are tallied in the
    /// returned report.
    async fn harvest_replies(&self, parent_id: String, video_id: String) -> HarvestReport {
        let endpoint = Endpoint::Replies {
            parent_id: parent_id.clone(),
        };
        let mut tally = HarvestReport::default();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        let video = self.cache.resolve(self.service, &video_id).await;

        loop {
            if self.options.max_pages.is_some_and(|max| pages >= max) {
                tracing::warn!(thread = %parent_id, pages, "reply page cap reached; thread incomplete");
                tally.incomplete_threads.push(parent_id);
                return tally;
            }

            let page = match self.service.fetch_page(&endpoint, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(thread = %parent_id, cursor = ?cursor, error = %e, "reply page failed; thread incomplete");
                    tally.incomplete_threads.push(parent_id);
                    return tally;
                }
            };
            pages += 1;

            for raw in &page.items {
                let reply = match normalize_reply(raw, &parent_id, &video_id) {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::warn!(thread = %parent_id, error = %e, "skipping malformed reply record");
                        tally.malformed += 1;
                        continue;
                    }
                };
                tally.replies += 1;
                self.write(IndexedDocument::new(reply, video.clone()), &mut tally)
                    .await;
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return tally,
            }
        }
    }

    async fn write(&self, doc: IndexedDocument, report: &mut HarvestReport) {
        match self.writer.upsert(&doc).await {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "write failed; continuing");
                report.write_failures += 1;
            }
        }
    }
}

/// Arguments of `chv harvest`.
#[derive(Debug, Clone)]
pub struct HarvestArgs {
    pub scope: Scope,
    pub store: Option<PathBuf>,
    pub api_key: Option<String>,
    pub max_pages: Option<usize>,
    pub progress: ProgressMode,
    pub resume: bool,
    pub from_cursor: Option<String>,
}

/// CLI entry point: harvest `args.scope` into the store and print a report.
pub async fn run_harvest(config: &Config, args: HarvestArgs) -> Result<()> {
    let api_key = config.api_key(args.api_key.as_deref()).ok_or_else(|| {
        anyhow!(
            "no API key: pass --api-key, set [api].key, or export {}",
            API_KEY_ENV
        )
    })?;
    let client = YoutubeClient::new(&config.api, api_key)?;

    let store_path = args
        .store
        .clone()
        .unwrap_or_else(|| config.store.path.clone());
    let writer = IndexWriter::open(&store_path).await?;

    let result = harvest_into(config, &args, &client, &writer).await;
    writer.close().await;
    result
}

async fn harvest_into(
    config: &Config,
    args: &HarvestArgs,
    service: &dyn CommentService,
    writer: &IndexWriter,
) -> Result<()> {
    let scope = &args.scope;

    let start_cursor = if let Some(cursor) = &args.from_cursor {
        Some(cursor.clone())
    } else if args.resume {
        match store::resume_cursor(writer.pool(), scope).await? {
            Some(cursor) => {
                tracing::info!(%scope, cursor = ?cursor, "resuming interrupted run");
                cursor
            }
            None => {
                tracing::info!(%scope, "no interrupted run to resume; starting from the first page");
                None
            }
        }
    } else {
        None
    };

    let options = HarvestOptions {
        reply_concurrency: config.harvest.reply_concurrency,
        max_pages: args.max_pages.or(config.harvest.max_pages),
        start_cursor,
    };

    let run_id = store::begin_run(writer.pool(), scope).await?;
    let reporter = args.progress.reporter();
    let harvester = Harvester::new(service, writer, options, reporter.as_ref());

    match harvester.harvest(scope).await {
        Ok(outcome) => {
            store::finish_run(
                writer.pool(),
                &run_id,
                outcome.status,
                outcome.cursor.as_deref(),
                outcome.report.documents(),
            )
            .await?;
            print_report(scope, &outcome.report, outcome.status, outcome.cursor.as_deref());
            println!("ok");
            Ok(())
        }
        Err(aborted) => {
            store::finish_run(
                writer.pool(),
                &run_id,
                RunStatus::Aborted,
                aborted.resume_cursor.as_deref(),
                aborted.report.documents(),
            )
            .await?;
            print_report(
                scope,
                &aborted.report,
                RunStatus::Aborted,
                Some(aborted.resume_cursor.as_deref().unwrap_or("")),
            );
            Err(aborted.into())
        }
    }
}

fn print_report(scope: &Scope, report: &HarvestReport, status: RunStatus, cursor: Option<&str>) {
    println!("harvest {}", scope);
    println!("  thread pages: {}", report.pages);
    println!("  threads: {}", report.threads);
    println!("  replies: {}", report.replies);
    println!("  inserted: {}", report.inserted);
    println!("  updated: {}", report.updated);
    println!("  unchanged: {}", report.unchanged);
    println!("  malformed: {}", report.malformed);
    println!("  write failures: {}", report.write_failures);
    println!("  incomplete threads: {}", report.incomplete_threads.len());
    for thread_id in &report.incomplete_threads {
        println!("    - {}", thread_id);
    }
    println!("  status: {}", status.as_str());
    if let Some(cursor) = cursor {
        println!("  resume cursor: {}", if cursor.is_empty() { "<start>" } else { cursor });
    }
}

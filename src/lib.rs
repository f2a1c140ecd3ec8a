//! # Comment Harvester
//!
//! Harvest two-level discussion threads (top-level comments and their
//! replies) from the YouTube Data API into a local SQLite store, then
//! query that store with per-field search expressions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Page fetch  │──▶│  Normalize  │──▶│ Video cache  │──▶│  Upsert  │
//! │ (youtube)   │   │             │   │ (read-thru)  │   │ (store)  │
//! └─────────────┘   └─────────────┘   └──────────────┘   └────┬─────┘
//!                                                             │
//!                     ┌─────────────┐   ┌──────────────┐      │
//!                     │ Query build │──▶│ Search/page  │◀─────┘
//!                     └─────────────┘   └──────┬───────┘
//!                                              ▼
//!                                        render (text/html/json)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chv harvest dQw4w9WgXcQ --scope video --api-key $KEY
//! chv query --text "great song" --page 2
//! chv get Ugx1234
//! chv stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Failure taxonomy |
//! | [`youtube`] | Remote comment service client |
//! | [`normalize`] | Raw record → comment |
//! | [`cache`] | Per-run video metadata cache |
//! | [`harvest`] | Harvest orchestration |
//! | [`store`] | SQLite store, upserts, run ledger |
//! | [`query`] | Per-field query compilation |
//! | [`search`] | Ranked, paginated search |
//! | [`render`] | Result rendering |
//! | [`progress`] | Harvest progress on stderr |

pub mod cache;
pub mod config;
pub mod error;
pub mod get;
pub mod harvest;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod query;
pub mod render;
pub mod search;
pub mod stats;
pub mod store;
pub mod youtube;

#[cfg(test)]
mod testing;

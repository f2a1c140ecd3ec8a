//! Error taxonomy for harvesting and querying.
//!
//! | Error | Scope of damage |
//! |-------|-----------------|
//! | [`TransportFailure`] | one page request; retryable at the same cursor |
//! | [`MalformedRecordFailure`] | one record; skipped |
//! | [`WriteFailure`] | one document write; the run continues |
//! | [`ParseFailure`] | one query invocation |
//! | [`HarvestAborted`] | the whole run; carries the resume cursor |

use thiserror::Error;

use crate::query::Field;

/// Talking to the remote comment service failed, or its response could not
/// be read as a page envelope.
#[derive(Debug, Error)]
pub enum TransportFailure {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("malformed response body from {url}: {reason}")]
    Body { url: String, reason: String },
}

/// A raw record lacks a field that a [`Comment`](crate::models::Comment)
/// cannot exist without, or could not be decoded at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedRecordFailure {
    #[error("record {record} is missing required field `{field}`")]
    MissingField { record: String, field: &'static str },

    #[error("record could not be decoded: {0}")]
    Undecodable(String),
}

/// The store rejected a document write.
#[derive(Debug, Error)]
#[error("failed to write comment {key}: {source}")]
pub struct WriteFailure {
    pub key: String,
    #[source]
    pub source: sqlx::Error,
}

/// A per-field search expression could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot parse {field} query \"{input}\": {reason}")]
pub struct ParseFailure {
    pub field: Field,
    pub input: String,
    pub reason: String,
}

/// The outer thread loop hit a transport failure; the run did not reach a
/// terminal cursor.
#[derive(Debug, Error)]
#[error("harvest aborted (resume cursor: {}): {source}", resume_cursor.as_deref().unwrap_or("<start>"))]
pub struct HarvestAborted {
    /// Cursor of the page that failed; `None` means the first page.
    pub resume_cursor: Option<String>,
    pub report: crate::harvest::HarvestReport,
    #[source]
    pub source: TransportFailure,
}

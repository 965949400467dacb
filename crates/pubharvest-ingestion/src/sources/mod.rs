//! Remote service clients and their seams.

pub mod entrez;
pub mod openaccess;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pubharvest_common::records::ArticleRecord;
use pubharvest_common::Result;

/// Inclusive publication-date window for a sweep.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Result of fetching one record. Per-record failures are data, not control
/// flow; they never propagate as errors past the client.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(Box<ArticleRecord>),
    Failed { pubmed_id: String, message: String },
}

/// Keyword search + per-ID fetch against the remote bibliographic service.
#[async_trait]
pub trait BibliographicSource: Send + Sync {
    /// IDs of records matching `query` published inside `window`, paginated
    /// until a short page or `cap` is reached.
    async fn search(&self, query: &str, window: &DateWindow, cap: usize) -> Result<Vec<String>>;

    /// Structured record for one ID.
    async fn fetch(&self, pubmed_id: &str) -> FetchOutcome;
}

/// Where the open-access service says a record's full text lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OaLocation {
    DirectPdf(String),
    Archive(String),
}

/// Open-access resolution for a secondary identifier.
#[async_trait]
pub trait OpenAccessResolver: Send + Sync {
    /// `Ok(None)` means the service answered and the record is not open
    /// access; `Err` means the lookup itself failed.
    async fn resolve(&self, pmcid: &str) -> Result<Option<OaLocation>>;
}

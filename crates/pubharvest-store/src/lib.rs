//! pubharvest-store — Document-store interface for the harvest pipeline.
//!
//! The pipeline talks to storage only through [`HarvestStore`]: keyed find
//! and upsert on the article partition, upsert on the full-text partition,
//! input merges, and the run lifecycle (insert, per-record error append,
//! terminal transition, watermark query). Two implementations are provided:
//! [`sqlite::SqliteStore`] for real runs and [`memory::MemoryStore`] for
//! tests and dry runs.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pubharvest_common::records::{
    AccessTier, ArticleRecord, ReviewStatus, RunErrorEntry, RunRecord,
};
use pubharvest_common::Result;

#[async_trait]
pub trait HarvestStore: Send + Sync {
    /// Create all partitions and the unique index on the full-text ID field.
    /// Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<()>;

    // ── Article partition ────────────────────────────────────────────────

    async fn find_article(&self, pubmed_id: &str) -> Result<Option<ArticleRecord>>;

    /// Insert the record, or field-merge it onto the stored one keyed by
    /// `pubmed_id`. The merge never touches `updated_title`,
    /// `review_status`, or `approved_tags` on an existing record; those are
    /// preserved from the store. Returns whether the record was new.
    async fn upsert_article(&self, record: &ArticleRecord) -> Result<bool>;

    async fn article_count(&self) -> Result<u64>;
    async fn count_by_review_status(&self, status: ReviewStatus) -> Result<u64>;
    async fn count_by_access(&self, tier: AccessTier) -> Result<u64>;
    /// Records whose pdf field holds a real path (download health).
    async fn count_with_pdf(&self) -> Result<u64>;

    // ── Full-text partition (at most one entry per ID) ───────────────────

    async fn upsert_full_text(&self, pubmed_id: &str, text: &str) -> Result<()>;
    async fn full_text(&self, pubmed_id: &str) -> Result<Option<String>>;

    // ── Run inputs ───────────────────────────────────────────────────────

    async fn merge_keywords(&self, keywords: &[String]) -> Result<()>;
    async fn merge_abbreviations(&self, entries: &[(String, String)]) -> Result<()>;

    // ── Run lifecycle ────────────────────────────────────────────────────

    async fn insert_run(&self, run: &RunRecord) -> Result<()>;
    async fn append_run_error(&self, run_id: Uuid, entry: &RunErrorEntry) -> Result<()>;
    async fn complete_run(
        &self,
        run_id: Uuid,
        end_time: DateTime<Utc>,
        articles_processed: u64,
    ) -> Result<()>;
    async fn fail_run(&self, run_id: Uuid, end_time: DateTime<Utc>, message: &str) -> Result<()>;

    /// End time of the most recent completed run that processed at least one
    /// record. Completed zero-record runs and abandoned `started` runs never
    /// move this forward.
    async fn last_watermark(&self) -> Result<Option<DateTime<Utc>>>;

    /// Most recent completed run, regardless of processed count.
    async fn last_completed_run(&self) -> Result<Option<RunRecord>>;

    async fn run_errors(&self, run_id: Uuid) -> Result<Vec<RunErrorEntry>>;
}

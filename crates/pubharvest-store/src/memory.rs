//! In-memory store for tests and dry runs.
//!
//! Mirrors the SQLite implementation's merge semantics exactly, including
//! the preserve-on-merge rule for `updated_title`, `review_status`, and
//! `approved_tags`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pubharvest_common::records::{
    AccessTier, ArticleRecord, ReviewStatus, RunErrorEntry, RunRecord, RunStatus,
};
use pubharvest_common::Result;

use crate::HarvestStore;

#[derive(Default)]
struct Inner {
    articles: BTreeMap<String, ArticleRecord>,
    full_text: HashMap<String, String>,
    keywords: BTreeSet<String>,
    abbreviations: BTreeMap<String, String>,
    runs: HashMap<Uuid, RunRecord>,
    run_errors: HashMap<Uuid, Vec<RunErrorEntry>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HarvestStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn find_article(&self, pubmed_id: &str) -> Result<Option<ArticleRecord>> {
        Ok(self.inner.lock().unwrap().articles.get(pubmed_id).cloned())
    }

    async fn upsert_article(&self, record: &ArticleRecord) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.articles.get_mut(&record.pubmed_id) {
            Some(existing) => {
                let mut merged = record.clone();
                merged.updated_title = existing.updated_title.clone();
                merged.review_status = existing.review_status;
                merged.approved_tags = existing.approved_tags.clone();
                *existing = merged;
                Ok(false)
            }
            None => {
                inner
                    .articles
                    .insert(record.pubmed_id.clone(), record.clone());
                Ok(true)
            }
        }
    }

    async fn article_count(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().articles.len() as u64)
    }

    async fn count_by_review_status(&self, status: ReviewStatus) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .articles
            .values()
            .filter(|a| a.review_status == status)
            .count() as u64)
    }

    async fn count_by_access(&self, tier: AccessTier) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.articles.values().filter(|a| a.access == tier).count() as u64)
    }

    async fn count_with_pdf(&self) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .articles
            .values()
            .filter(|a| a.pdf_file.is_file())
            .count() as u64)
    }

    async fn upsert_full_text(&self, pubmed_id: &str, text: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .full_text
            .insert(pubmed_id.to_string(), text.to_string());
        Ok(())
    }

    async fn full_text(&self, pubmed_id: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().full_text.get(pubmed_id).cloned())
    }

    async fn merge_keywords(&self, keywords: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.keywords.extend(keywords.iter().cloned());
        Ok(())
    }

    async fn merge_abbreviations(&self, entries: &[(String, String)]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for (term, abbreviation) in entries {
            inner
                .abbreviations
                .insert(term.clone(), abbreviation.clone());
        }
        Ok(())
    }

    async fn insert_run(&self, run: &RunRecord) -> Result<()> {
        self.inner.lock().unwrap().runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn append_run_error(&self, run_id: Uuid, entry: &RunErrorEntry) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .run_errors
            .entry(run_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: Uuid,
        end_time: DateTime<Utc>,
        articles_processed: u64,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.get_mut(&run_id) {
            if run.status == RunStatus::Started {
                run.end_time = Some(end_time);
                run.status = RunStatus::Completed;
                run.articles_processed = articles_processed;
            }
        }
        Ok(())
    }

    async fn fail_run(&self, run_id: Uuid, end_time: DateTime<Utc>, message: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.get_mut(&run_id) {
            if run.status == RunStatus::Started {
                run.end_time = Some(end_time);
                run.status = RunStatus::Error;
                run.error = Some(message.to_string());
            }
        }
        Ok(())
    }

    async fn last_watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .runs
            .values()
            .filter(|r| r.status == RunStatus::Completed && r.articles_processed > 0)
            .filter_map(|r| r.end_time)
            .max())
    }

    async fn last_completed_run(&self) -> Result<Option<RunRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .runs
            .values()
            .filter(|r| r.status == RunStatus::Completed)
            .max_by_key(|r| r.end_time)
            .cloned())
    }

    async fn run_errors(&self, run_id: Uuid) -> Result<Vec<RunErrorEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.run_errors.get(&run_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pubharvest_common::records::PdfArtifact;

    fn sample(id: &str) -> ArticleRecord {
        ArticleRecord {
            pubmed_id: id.to_string(),
            updated_title: "Original Title SMITH 2023".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn merge_preserves_frozen_fields() {
        let store = MemoryStore::new();
        assert!(store.upsert_article(&sample("1")).await.unwrap());

        let mut refreshed = sample("1");
        refreshed.updated_title = "Recomputed".to_string();
        refreshed.pdf_file = PdfArtifact::File("pdfs/x.pdf".to_string());
        assert!(!store.upsert_article(&refreshed).await.unwrap());

        let stored = store.find_article("1").await.unwrap().unwrap();
        assert_eq!(stored.updated_title, "Original Title SMITH 2023");
        assert!(stored.pdf_file.is_file());
    }

    #[tokio::test]
    async fn watermark_matches_sqlite_semantics() {
        let store = MemoryStore::new();
        let t0 = Utc::now();

        let run = RunRecord::started(vec![], t0);
        store.insert_run(&run).await.unwrap();
        store.complete_run(run.id, t0 + Duration::hours(1), 3).await.unwrap();

        let empty = RunRecord::started(vec![], t0 + Duration::days(1));
        store.insert_run(&empty).await.unwrap();
        store
            .complete_run(empty.id, t0 + Duration::days(1), 0)
            .await
            .unwrap();

        assert_eq!(
            store.last_watermark().await.unwrap(),
            Some(t0 + Duration::hours(1))
        );
    }
}

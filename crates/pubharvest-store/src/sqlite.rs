//! SQLite-backed store.
//!
//! List-valued fields are stored as JSON text; timestamps as RFC 3339 text.
//! The article merge updates only the fields the pipeline owns, so review
//! edits and the frozen `updated_title` survive re-ingestion at the store
//! level as well as in the reconciler.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use pubharvest_common::records::{
    AccessTier, ArticleRecord, PdfArtifact, ReviewStatus, RunErrorEntry, RunRecord, RunStatus,
};
use pubharvest_common::{HarvestError, Result};

use crate::HarvestStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    pubmed_id        TEXT PRIMARY KEY,
    title            TEXT NOT NULL DEFAULT '',
    abstract_text    TEXT NOT NULL DEFAULT '',
    authors          TEXT NOT NULL DEFAULT '[]',
    keywords         TEXT NOT NULL DEFAULT '[]',
    journal          TEXT NOT NULL DEFAULT '',
    publication_date TEXT NOT NULL DEFAULT 'unknown',
    doi              TEXT NOT NULL DEFAULT '',
    fulltext_link    TEXT NOT NULL DEFAULT '',
    pmcid            TEXT,
    access           TEXT NOT NULL DEFAULT 'Paid',
    volume           TEXT NOT NULL DEFAULT '',
    issue            TEXT NOT NULL DEFAULT '',
    pages            TEXT NOT NULL DEFAULT '',
    updated_title    TEXT NOT NULL DEFAULT '',
    pdf_file         TEXT NOT NULL DEFAULT 'Not available',
    suggested_tags   TEXT NOT NULL DEFAULT '[]',
    review_status    TEXT NOT NULL DEFAULT 'Pending',
    approved_tags    TEXT NOT NULL DEFAULT '[]',
    ingested_date    TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS article_text (
    pubmed_id TEXT NOT NULL,
    full_text TEXT NOT NULL DEFAULT ''
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_article_text_pubmed_id
    ON article_text(pubmed_id);

CREATE TABLE IF NOT EXISTS keywords (
    keyword TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS abbreviations (
    term         TEXT PRIMARY KEY,
    abbreviation TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
    id                 TEXT PRIMARY KEY,
    start_time         TEXT NOT NULL,
    end_time           TEXT,
    status             TEXT NOT NULL,
    keywords           TEXT NOT NULL DEFAULT '[]',
    articles_processed INTEGER NOT NULL DEFAULT 0,
    error              TEXT
);

CREATE TABLE IF NOT EXISTS run_errors (
    run_id    TEXT NOT NULL,
    pubmed_id TEXT NOT NULL,
    message   TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
"#;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `uri`, e.g.
    /// `sqlite://harvest.db` or `sqlite::memory:`.
    pub async fn open(uri: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(uri)
            .map_err(HarvestError::Store)?
            .create_if_missing(true);

        // An in-memory database exists per connection; pin the pool to one
        // persistent handle so every caller sees the same data.
        let memory = uri.contains("memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(if memory { 1 } else { 5 })
            .min_connections(if memory { 1 } else { 0 })
            .idle_timeout(if memory { None } else { Some(std::time::Duration::from_secs(600)) })
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn scalar_count(&self, sql: &str) -> Result<u64> {
        let row = sqlx::query(sql).fetch_one(&self.pool).await?;
        let n: i64 = row.try_get(0)?;
        Ok(n as u64)
    }
}

fn encode_list(values: &[String]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

fn decode_list(raw: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(raw)?)
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HarvestError::Other(anyhow::anyhow!("bad timestamp in store: {e}")))
}

fn row_to_article(row: &SqliteRow) -> Result<ArticleRecord> {
    Ok(ArticleRecord {
        pubmed_id: row.try_get("pubmed_id")?,
        title: row.try_get("title")?,
        abstract_text: row.try_get("abstract_text")?,
        authors: decode_list(&row.try_get::<String, _>("authors")?)?,
        keywords: decode_list(&row.try_get::<String, _>("keywords")?)?,
        journal: row.try_get("journal")?,
        publication_date: row.try_get("publication_date")?,
        doi: row.try_get("doi")?,
        fulltext_link: row.try_get("fulltext_link")?,
        pmcid: row.try_get("pmcid")?,
        access: AccessTier::parse(&row.try_get::<String, _>("access")?),
        volume: row.try_get("volume")?,
        issue: row.try_get("issue")?,
        pages: row.try_get("pages")?,
        updated_title: row.try_get("updated_title")?,
        pdf_file: PdfArtifact::from(row.try_get::<String, _>("pdf_file")?),
        suggested_tags: decode_list(&row.try_get::<String, _>("suggested_tags")?)?,
        review_status: ReviewStatus::parse(&row.try_get::<String, _>("review_status")?),
        approved_tags: decode_list(&row.try_get::<String, _>("approved_tags")?)?,
        ingested_date: row.try_get("ingested_date")?,
    })
}

fn row_to_run(row: &SqliteRow) -> Result<RunRecord> {
    let id: String = row.try_get("id")?;
    let start_time: String = row.try_get("start_time")?;
    let end_time: Option<String> = row.try_get("end_time")?;
    Ok(RunRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| HarvestError::Other(anyhow::anyhow!("bad run id in store: {e}")))?,
        start_time: decode_time(&start_time)?,
        end_time: end_time.as_deref().map(decode_time).transpose()?,
        status: RunStatus::parse(&row.try_get::<String, _>("status")?),
        keywords: decode_list(&row.try_get::<String, _>("keywords")?)?,
        articles_processed: row.try_get::<i64, _>("articles_processed")? as u64,
        error: row.try_get("error")?,
    })
}

#[async_trait]
impl HarvestStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_article(&self, pubmed_id: &str) -> Result<Option<ArticleRecord>> {
        let row = sqlx::query("SELECT * FROM articles WHERE pubmed_id = ?")
            .bind(pubmed_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_article).transpose()
    }

    async fn upsert_article(&self, record: &ArticleRecord) -> Result<bool> {
        let existing = sqlx::query("SELECT 1 FROM articles WHERE pubmed_id = ?")
            .bind(&record.pubmed_id)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            // updated_title, review_status, and approved_tags are
            // deliberately absent from this list.
            sqlx::query(
                "UPDATE articles SET
                     title = ?, abstract_text = ?, authors = ?, keywords = ?,
                     journal = ?, publication_date = ?, doi = ?,
                     fulltext_link = ?, pmcid = ?, access = ?, volume = ?,
                     issue = ?, pages = ?, pdf_file = ?, suggested_tags = ?,
                     ingested_date = ?
                 WHERE pubmed_id = ?",
            )
            .bind(&record.title)
            .bind(&record.abstract_text)
            .bind(encode_list(&record.authors)?)
            .bind(encode_list(&record.keywords)?)
            .bind(&record.journal)
            .bind(&record.publication_date)
            .bind(&record.doi)
            .bind(&record.fulltext_link)
            .bind(&record.pmcid)
            .bind(record.access.as_str())
            .bind(&record.volume)
            .bind(&record.issue)
            .bind(&record.pages)
            .bind(record.pdf_file.wire())
            .bind(encode_list(&record.suggested_tags)?)
            .bind(&record.ingested_date)
            .bind(&record.pubmed_id)
            .execute(&self.pool)
            .await?;
            tracing::debug!(pubmed_id = %record.pubmed_id, "Article merged onto stored record");
            Ok(false)
        } else {
            sqlx::query(
                "INSERT INTO articles (
                     pubmed_id, title, abstract_text, authors, keywords,
                     journal, publication_date, doi, fulltext_link, pmcid,
                     access, volume, issue, pages, updated_title, pdf_file,
                     suggested_tags, review_status, approved_tags,
                     ingested_date
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.pubmed_id)
            .bind(&record.title)
            .bind(&record.abstract_text)
            .bind(encode_list(&record.authors)?)
            .bind(encode_list(&record.keywords)?)
            .bind(&record.journal)
            .bind(&record.publication_date)
            .bind(&record.doi)
            .bind(&record.fulltext_link)
            .bind(&record.pmcid)
            .bind(record.access.as_str())
            .bind(&record.volume)
            .bind(&record.issue)
            .bind(&record.pages)
            .bind(&record.updated_title)
            .bind(record.pdf_file.wire())
            .bind(encode_list(&record.suggested_tags)?)
            .bind(record.review_status.as_str())
            .bind(encode_list(&record.approved_tags)?)
            .bind(&record.ingested_date)
            .execute(&self.pool)
            .await?;
            tracing::debug!(pubmed_id = %record.pubmed_id, "Article inserted");
            Ok(true)
        }
    }

    async fn article_count(&self) -> Result<u64> {
        self.scalar_count("SELECT COUNT(*) FROM articles").await
    }

    async fn count_by_review_status(&self, status: ReviewStatus) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) FROM articles WHERE review_status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get(0)?;
        Ok(n as u64)
    }

    async fn count_by_access(&self, tier: AccessTier) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) FROM articles WHERE access = ?")
            .bind(tier.as_str())
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get(0)?;
        Ok(n as u64)
    }

    async fn count_with_pdf(&self) -> Result<u64> {
        self.scalar_count("SELECT COUNT(*) FROM articles WHERE pdf_file LIKE '%.pdf'")
            .await
    }

    async fn upsert_full_text(&self, pubmed_id: &str, text: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO article_text (pubmed_id, full_text) VALUES (?, ?)
             ON CONFLICT(pubmed_id) DO UPDATE SET full_text = excluded.full_text",
        )
        .bind(pubmed_id)
        .bind(text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn full_text(&self, pubmed_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT full_text FROM article_text WHERE pubmed_id = ?")
            .bind(pubmed_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("full_text")).transpose().map_err(Into::into)
    }

    async fn merge_keywords(&self, keywords: &[String]) -> Result<()> {
        for keyword in keywords {
            sqlx::query("INSERT INTO keywords (keyword) VALUES (?) ON CONFLICT DO NOTHING")
                .bind(keyword)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn merge_abbreviations(&self, entries: &[(String, String)]) -> Result<()> {
        for (term, abbreviation) in entries {
            sqlx::query(
                "INSERT INTO abbreviations (term, abbreviation) VALUES (?, ?)
                 ON CONFLICT(term) DO UPDATE SET abbreviation = excluded.abbreviation",
            )
            .bind(term)
            .bind(abbreviation)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn insert_run(&self, run: &RunRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO runs (id, start_time, end_time, status, keywords,
                               articles_processed, error)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(run.start_time.to_rfc3339())
        .bind(run.end_time.map(|t| t.to_rfc3339()))
        .bind(run.status.as_str())
        .bind(encode_list(&run.keywords)?)
        .bind(run.articles_processed as i64)
        .bind(&run.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_run_error(&self, run_id: Uuid, entry: &RunErrorEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO run_errors (run_id, pubmed_id, message, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(run_id.to_string())
        .bind(&entry.pubmed_id)
        .bind(&entry.message)
        .bind(entry.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: Uuid,
        end_time: DateTime<Utc>,
        articles_processed: u64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE runs SET end_time = ?, status = 'completed',
                             articles_processed = ?
             WHERE id = ? AND status = 'started'",
        )
        .bind(end_time.to_rfc3339())
        .bind(articles_processed as i64)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_run(&self, run_id: Uuid, end_time: DateTime<Utc>, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE runs SET end_time = ?, status = 'error', error = ?
             WHERE id = ? AND status = 'started'",
        )
        .bind(end_time.to_rfc3339())
        .bind(message)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT end_time FROM runs
             WHERE status = 'completed' AND articles_processed > 0
               AND end_time IS NOT NULL
             ORDER BY end_time DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => {
                let raw: String = r.try_get("end_time")?;
                Ok(Some(decode_time(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn last_completed_run(&self) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            "SELECT * FROM runs WHERE status = 'completed'
             ORDER BY end_time DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_run).transpose()
    }

    async fn run_errors(&self, run_id: Uuid) -> Result<Vec<RunErrorEntry>> {
        let rows = sqlx::query(
            "SELECT pubmed_id, message, timestamp FROM run_errors
             WHERE run_id = ? ORDER BY rowid",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(RunErrorEntry {
                    pubmed_id: r.try_get("pubmed_id")?,
                    message: r.try_get("message")?,
                    timestamp: decode_time(&r.try_get::<String, _>("timestamp")?)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn open_store() -> SqliteStore {
        let store = SqliteStore::open("sqlite::memory:").await.unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    fn sample(id: &str) -> ArticleRecord {
        ArticleRecord {
            pubmed_id: id.to_string(),
            title: "Aortic stenosis outcomes".to_string(),
            authors: vec!["Jane Smith".to_string()],
            updated_title: "AS outcomes SMITH 2024".to_string(),
            publication_date: "2024-03-01".to_string(),
            pdf_file: PdfArtifact::NotAvailable,
            ingested_date: "2024-04-01".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_preserves_review_fields_and_title() {
        let store = open_store().await;

        let mut first = sample("100");
        first.review_status = ReviewStatus::Pending;
        assert!(store.upsert_article(&first).await.unwrap());

        // Review collaborator approves the record out-of-band.
        sqlx::query(
            "UPDATE articles SET review_status = 'approved',
                                 approved_tags = '[\"valve\"]'
             WHERE pubmed_id = '100'",
        )
        .execute(store.pool())
        .await
        .unwrap();

        // A later run refreshes the record with a different computed title.
        let mut second = sample("100");
        second.updated_title = "recomputed differently".to_string();
        second.abstract_text = "refreshed abstract".to_string();
        assert!(!store.upsert_article(&second).await.unwrap());

        let stored = store.find_article("100").await.unwrap().unwrap();
        assert_eq!(stored.updated_title, "AS outcomes SMITH 2024");
        assert_eq!(stored.review_status, ReviewStatus::Approved);
        assert_eq!(stored.approved_tags, vec!["valve".to_string()]);
        assert_eq!(stored.abstract_text, "refreshed abstract");
    }

    #[tokio::test]
    async fn full_text_upsert_is_single_entry() {
        let store = open_store().await;
        store.upsert_full_text("7", "first").await.unwrap();
        store.upsert_full_text("7", "second").await.unwrap();
        assert_eq!(store.full_text("7").await.unwrap().as_deref(), Some("second"));

        let n = store.scalar_count("SELECT COUNT(*) FROM article_text").await.unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn watermark_requires_processed_records() {
        let store = open_store().await;
        let t0 = Utc::now() - Duration::days(10);

        let run_a = RunRecord::started(vec!["stenosis".to_string()], t0);
        store.insert_run(&run_a).await.unwrap();
        store.complete_run(run_a.id, t0 + Duration::hours(1), 4).await.unwrap();

        // A later completed run with zero records must not advance the mark.
        let run_b = RunRecord::started(vec!["stenosis".to_string()], t0 + Duration::days(1));
        store.insert_run(&run_b).await.unwrap();
        store
            .complete_run(run_b.id, t0 + Duration::days(1) + Duration::hours(1), 0)
            .await
            .unwrap();

        // An abandoned run never counts at all.
        let run_c = RunRecord::started(vec!["stenosis".to_string()], t0 + Duration::days(2));
        store.insert_run(&run_c).await.unwrap();

        let mark = store.last_watermark().await.unwrap().unwrap();
        assert_eq!(mark, t0 + Duration::hours(1));
    }

    #[tokio::test]
    async fn run_error_log_appends_in_order() {
        let store = open_store().await;
        let run = RunRecord::started(vec![], Utc::now());
        store.insert_run(&run).await.unwrap();

        for i in 0..3 {
            store
                .append_run_error(
                    run.id,
                    &RunErrorEntry {
                        pubmed_id: format!("{i}"),
                        message: format!("fetch failed {i}"),
                        timestamp: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }

        let errors = store.run_errors(run.id).await.unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].pubmed_id, "0");
        assert_eq!(errors[2].message, "fetch failed 2");
    }

    #[tokio::test]
    async fn terminal_runs_are_immutable() {
        let store = open_store().await;
        let run = RunRecord::started(vec![], Utc::now());
        store.insert_run(&run).await.unwrap();
        let end = Utc::now();
        store.complete_run(run.id, end, 2).await.unwrap();

        // A second terminal write must not clobber the first.
        store.fail_run(run.id, Utc::now(), "late failure").await.unwrap();

        let stored = store.last_completed_run().await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.articles_processed, 2);
        assert!(stored.error.is_none());
    }
}

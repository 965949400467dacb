//! Per-record reconciliation: fetch → normalize → acquire → persist.
//!
//! Each step is idempotent, so re-running an ID converges instead of
//! duplicating work: a stored record's `updated_title` is reused verbatim
//! (recomputing it could silently rename an already-downloaded PDF and
//! orphan it), an existing local PDF short-circuits the download, and both
//! store writes are keyed upserts.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};
use uuid::Uuid;

use pubharvest_common::records::{PdfArtifact, RunErrorEntry};
use pubharvest_common::Result;
use pubharvest_store::HarvestStore;

use crate::acquire::{pdf_file_name, AcquisitionChain};
use crate::models::Outcome;
use crate::normalise::title::compute_updated_title;
use crate::normalise::TermReplacer;
use crate::sources::{BibliographicSource, FetchOutcome};
use crate::tags::TagSuggester;
use crate::text::extract_pdf_text_blocking;

const SUGGESTED_TAGS: usize = 10;

#[derive(Clone)]
pub struct RecordReconciler {
    source: Arc<dyn BibliographicSource>,
    chain: Arc<AcquisitionChain>,
    store: Arc<dyn HarvestStore>,
    suggester: Arc<dyn TagSuggester>,
    max_pdf_pages: usize,
}

impl RecordReconciler {
    pub fn new(
        source: Arc<dyn BibliographicSource>,
        chain: Arc<AcquisitionChain>,
        store: Arc<dyn HarvestStore>,
        suggester: Arc<dyn TagSuggester>,
        max_pdf_pages: usize,
    ) -> Self {
        Self {
            source,
            chain,
            store,
            suggester,
            max_pdf_pages,
        }
    }

    /// Process one ID.
    ///
    /// Fetch failures are data: they are appended to the run's error log and
    /// returned as [`Outcome::Error`]. Store failures propagate; the run
    /// controller turns them into the run-fatal transition.
    #[instrument(skip(self, replacer, run_id))]
    pub async fn process(
        &self,
        pubmed_id: &str,
        replacer: &TermReplacer,
        run_id: Uuid,
    ) -> Result<Outcome> {
        let mut record = match self.source.fetch(pubmed_id).await {
            FetchOutcome::Fetched(record) => *record,
            FetchOutcome::Failed { pubmed_id, message } => {
                self.store
                    .append_run_error(
                        run_id,
                        &RunErrorEntry {
                            pubmed_id,
                            message: message.clone(),
                            timestamp: Utc::now(),
                        },
                    )
                    .await?;
                return Ok(Outcome::Error(message));
            }
        };

        let existing = self.store.find_article(pubmed_id).await?;

        record.updated_title = match &existing {
            Some(stored) => stored.updated_title.clone(),
            None => compute_updated_title(&record, replacer),
        };

        let file_name = pdf_file_name(&record.updated_title);
        let local_path = self.chain.pdf_dir().join(&file_name);

        if local_path.exists() {
            debug!(path = %local_path.display(), "Existing PDF reused");
            record.access = match &existing {
                Some(stored) => stored.access,
                None => self.chain.classify(&record).await,
            };
            record.pdf_file = PdfArtifact::File(local_path.to_string_lossy().into_owned());
        } else {
            let acquisition = self.chain.acquire(&record, &file_name).await;
            record.access = acquisition.access;
            record.pdf_file = acquisition.outcome.to_artifact();
        }

        let full_text = match &record.pdf_file {
            PdfArtifact::File(path) => {
                extract_pdf_text_blocking(PathBuf::from(path), self.max_pdf_pages).await
            }
            _ => String::new(),
        };
        self.store.upsert_full_text(pubmed_id, &full_text).await?;

        let tag_source = format!("{} {} {}", record.title, record.abstract_text, full_text);
        record.suggested_tags = self.suggester.suggest(&tag_source, SUGGESTED_TAGS);

        if let Some(stored) = &existing {
            record.review_status = stored.review_status;
            record.approved_tags = stored.approved_tags.clone();
        }
        record.ingested_date = Utc::now().format("%Y-%m-%d").to_string();

        self.store.upsert_article(&record).await?;

        Ok(Outcome::Processed(Box::new(record)))
    }
}

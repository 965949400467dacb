//! Run controller: watermark state machine and the keyword × ID sweep.
//!
//! One controller instance owns one run end-to-end. The fetch window starts
//! at the end time of the most recent completed run that processed at least
//! one record (a zero-record completed run advances nothing), falling back
//! to a fixed lookback. Keywords are swept strictly in order; within one
//! keyword, IDs go through a bounded pool that is fully drained before the
//! next keyword begins. Batch writers run exactly once, after the sweep.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Local, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use pubharvest_common::records::{AccessTier, ArticleRecord, RunRecord};
use pubharvest_common::{Config, HarvestError, Result};
use pubharvest_store::HarvestStore;

use crate::acquire::AcquisitionChain;
use crate::export::{generate_citation, run_stamp, CitationWriter, ExportWriter};
use crate::inputs;
use crate::models::Outcome;
use crate::normalise::TermReplacer;
use crate::reconcile::RecordReconciler;
use crate::sources::{BibliographicSource, DateWindow};
use crate::tags::TagSuggester;

/// Everything a run needs, constructed once and passed down explicitly.
/// No component reaches for ambient singletons.
pub struct HarvestContext {
    pub config: Config,
    pub store: Arc<dyn HarvestStore>,
    pub source: Arc<dyn BibliographicSource>,
    pub chain: Arc<AcquisitionChain>,
    pub suggester: Arc<dyn TagSuggester>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub keywords: usize,
    pub articles_processed: u64,
    pub skipped: u64,
    pub record_errors: u64,
    pub citation_files: Vec<PathBuf>,
    pub export_file: Option<PathBuf>,
}

pub struct RunController {
    ctx: HarvestContext,
}

impl RunController {
    pub fn new(ctx: HarvestContext) -> Self {
        Self { ctx }
    }

    /// Execute one full run. Always leaves a terminal, inspectable run
    /// record: `completed` with a count, or `error` with a message.
    pub async fn execute(&self) -> Result<RunSummary> {
        let harvest = &self.ctx.config.harvest;
        std::fs::create_dir_all(&harvest.pdf_dir)?;

        let keywords = inputs::load_keywords(Path::new(&harvest.keyword_source))?;
        if keywords.is_empty() {
            return Err(HarvestError::Config(format!(
                "no keywords found in {}",
                harvest.keyword_source
            )));
        }
        let abbreviations =
            inputs::load_abbreviations(Path::new(&harvest.abbreviation_source))?;

        self.ctx.store.merge_keywords(&keywords).await?;
        self.ctx.store.merge_abbreviations(&abbreviations).await?;

        let replacer = TermReplacer::new(&inputs::build_abbreviation_map(&abbreviations));

        let run = RunRecord::started(keywords.clone(), Utc::now());
        self.ctx.store.insert_run(&run).await?;
        info!(run_id = %run.id, keywords = keywords.len(), "Run started");

        match self.sweep(&run, &keywords, &replacer).await {
            Ok(summary) => {
                self.ctx
                    .store
                    .complete_run(run.id, Utc::now(), summary.articles_processed)
                    .await?;
                info!(
                    run_id = %run.id,
                    processed = summary.articles_processed,
                    skipped = summary.skipped,
                    record_errors = summary.record_errors,
                    "Run completed"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Run aborted");
                self.ctx
                    .store
                    .fail_run(run.id, Utc::now(), &e.to_string())
                    .await?;
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(run_id = %run.id))]
    async fn sweep(
        &self,
        run: &RunRecord,
        keywords: &[String],
        replacer: &TermReplacer,
    ) -> Result<RunSummary> {
        let harvest = &self.ctx.config.harvest;
        let window = self.fetch_window().await?;
        info!(
            start = %window.start.format("%Y-%m-%d"),
            end = %window.end.format("%Y-%m-%d"),
            "Fetch window computed"
        );

        let reconciler = RecordReconciler::new(
            self.ctx.source.clone(),
            self.ctx.chain.clone(),
            self.ctx.store.clone(),
            self.ctx.suggester.clone(),
            harvest.max_pdf_pages,
        );
        let workers = harvest.workers.max(1);

        let mut seen: HashSet<String> = HashSet::new();
        let mut paid_seen: HashSet<String> = HashSet::new();
        let mut paid_citations: Vec<String> = Vec::new();
        let mut export_rows: Vec<ArticleRecord> = Vec::new();
        let mut processed: u64 = 0;
        let mut skipped: u64 = 0;
        let mut record_errors: u64 = 0;

        for keyword in keywords {
            let ids = self
                .ctx
                .source
                .search(keyword, &window, harvest.search_cap)
                .await?;
            if ids.is_empty() {
                info!(keyword = %keyword, "No new records");
                continue;
            }
            info!(keyword = %keyword, n = ids.len(), "Records found");

            // An ID already dispatched for an earlier keyword this run is
            // skipped, not reprocessed.
            let jobs: Vec<Option<String>> = ids
                .into_iter()
                .map(|id| seen.insert(id.clone()).then_some(id))
                .collect();

            // Bounded pool; outcomes arrive in completion order and are
            // aggregated at this single point after the pool drains.
            let outcomes: Vec<Result<Outcome>> = stream::iter(jobs)
                .map(|job| {
                    let reconciler = reconciler.clone();
                    let run_id = run.id;
                    async move {
                        match job {
                            Some(id) => reconciler.process(&id, replacer, run_id).await,
                            None => Ok(Outcome::Skipped),
                        }
                    }
                })
                .buffer_unordered(workers)
                .collect()
                .await;

            for outcome in outcomes {
                match outcome? {
                    Outcome::Processed(snapshot) => {
                        processed += 1;
                        if snapshot.access == AccessTier::Paid
                            && paid_seen.insert(snapshot.pubmed_id.clone())
                        {
                            paid_citations.push(generate_citation(&snapshot));
                        }
                        export_rows.push(*snapshot);
                    }
                    Outcome::Error(_) => record_errors += 1,
                    Outcome::Skipped => skipped += 1,
                }
            }
        }

        let stamp = run_stamp(Local::now());
        let citation_files =
            CitationWriter::new(&harvest.citation_dir).write_all(&paid_citations, &stamp)?;
        let export_file = ExportWriter::new(&harvest.export_dir).write(&export_rows, &stamp)?;

        Ok(RunSummary {
            run_id: run.id,
            keywords: keywords.len(),
            articles_processed: processed,
            skipped,
            record_errors,
            citation_files,
            export_file,
        })
    }

    async fn fetch_window(&self) -> Result<DateWindow> {
        let end = Utc::now();
        let start = match self.ctx.store.last_watermark().await? {
            Some(mark) => mark,
            None => end - Duration::days(self.ctx.config.harvest.lookback_days),
        };
        Ok(DateWindow { start, end })
    }
}

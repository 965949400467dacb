//! PDF acquisition chain.
//!
//! Ordered, short-circuiting strategy for one record:
//!   1. resolve the secondary identifier via the open-access service,
//!   2. stream a direct PDF link (content-type gated), or
//!   3. unpack the archive bundle in memory and take its first `.pdf` member.
//!
//! Downloads land in a temp file first and are atomically promoted, so a
//! crash mid-stream never leaves a half-written file at the canonical path.
//! The same resolution also classifies the record's access tier (the lookup,
//! not the download, is the source of truth).

use std::io::Read;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use pubharvest_common::net::GuardedClient;
use pubharvest_common::records::{AccessTier, ArticleRecord};
use pubharvest_common::{HarvestError, Result};

use crate::models::AcquisitionOutcome;
use crate::sources::{OaLocation, OpenAccessResolver};

/// Character budget for a PDF file name before the `.pdf` suffix, keeping
/// full paths under the ceiling of constrained filesystems.
const FILENAME_BUDGET: usize = 140;

/// Strip characters that are not letters, digits, spaces, underscores, or
/// hyphens, then collapse whitespace.
pub fn sanitize_filename(s: &str) -> String {
    let filtered: String = s
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Filesystem-safe `.pdf` name derived from an updated title, truncated to
/// the filename budget.
pub fn pdf_file_name(updated_title: &str) -> String {
    let mut name = sanitize_filename(updated_title);
    if name.chars().count() > FILENAME_BUDGET {
        name = name.chars().take(FILENAME_BUDGET).collect();
    }
    format!("{name}.pdf")
}

/// Outcome of one acquisition attempt, with the access tier the open-access
/// lookup implied.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub access: AccessTier,
    pub outcome: AcquisitionOutcome,
}

pub struct AcquisitionChain {
    client: GuardedClient,
    resolver: Arc<dyn OpenAccessResolver>,
    pdf_dir: PathBuf,
}

impl AcquisitionChain {
    pub fn new(
        client: GuardedClient,
        resolver: Arc<dyn OpenAccessResolver>,
        pdf_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            resolver,
            pdf_dir: pdf_dir.into(),
        }
    }

    pub fn pdf_dir(&self) -> &Path {
        &self.pdf_dir
    }

    /// Try to obtain a PDF for `record` under `file_name`.
    ///
    /// Never fails: every network or decode problem collapses into the
    /// `NotDownloaded` sentinel, while a record with no usable secondary
    /// identifier (or one outside the open-access subset) is `NotAvailable`.
    pub async fn acquire(&self, record: &ArticleRecord, file_name: &str) -> Acquisition {
        let Some(pmcid) = record.pmcid.as_deref() else {
            debug!(pubmed_id = %record.pubmed_id, "No secondary identifier, PDF not available");
            return Acquisition {
                access: AccessTier::Paid,
                outcome: AcquisitionOutcome::NotAvailable,
            };
        };

        match self.resolver.resolve(pmcid).await {
            Ok(Some(location)) => {
                let outcome = match self.download(&location, file_name).await {
                    Ok(path) => {
                        info!(pubmed_id = %record.pubmed_id, path = %path.display(), "PDF saved");
                        AcquisitionOutcome::Saved(path)
                    }
                    Err(e) => {
                        warn!(pubmed_id = %record.pubmed_id, error = %e, "PDF download failed");
                        AcquisitionOutcome::NotDownloaded
                    }
                };
                Acquisition {
                    access: AccessTier::Free,
                    outcome,
                }
            }
            Ok(None) => Acquisition {
                access: AccessTier::Paid,
                outcome: AcquisitionOutcome::NotAvailable,
            },
            Err(e) => {
                warn!(pubmed_id = %record.pubmed_id, error = %e, "Open-access lookup failed");
                Acquisition {
                    access: AccessTier::Paid,
                    outcome: AcquisitionOutcome::NotDownloaded,
                }
            }
        }
    }

    /// Access tier from the open-access lookup alone, for records whose PDF
    /// is reused from disk and therefore skip [`Self::acquire`].
    pub async fn classify(&self, record: &ArticleRecord) -> AccessTier {
        let Some(pmcid) = record.pmcid.as_deref() else {
            return AccessTier::Paid;
        };
        match self.resolver.resolve(pmcid).await {
            Ok(Some(_)) => AccessTier::Free,
            Ok(None) => AccessTier::Paid,
            Err(e) => {
                warn!(pubmed_id = %record.pubmed_id, error = %e, "Open-access lookup failed");
                AccessTier::Paid
            }
        }
    }

    async fn download(&self, location: &OaLocation, file_name: &str) -> Result<PathBuf> {
        match location {
            OaLocation::DirectPdf(url) => self.download_direct(url, file_name).await,
            OaLocation::Archive(url) => self.download_archive(url, file_name).await,
        }
    }

    async fn download_direct(&self, url: &str, file_name: &str) -> Result<PathBuf> {
        let response = self.client.get(url)?.send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("application/pdf") {
            return Err(HarvestError::Other(anyhow::anyhow!(
                "direct link did not return a PDF (content-type: {content_type})"
            )));
        }

        let bytes = response.bytes().await?;
        self.promote(&bytes, file_name)
    }

    async fn download_archive(&self, url: &str, file_name: &str) -> Result<PathBuf> {
        let bytes = self.client.get(url)?.send().await?.error_for_status()?.bytes().await?;

        let member = tokio::task::spawn_blocking(move || extract_first_pdf(&bytes))
            .await
            .map_err(|e| HarvestError::Other(anyhow::Error::from(e)))??;

        match member {
            Some(pdf_bytes) => self.promote(&pdf_bytes, file_name),
            None => Err(HarvestError::Other(anyhow::anyhow!(
                "archive contained no .pdf member"
            ))),
        }
    }

    /// Write bytes to a temp file in the target directory, then atomically
    /// promote to the canonical path.
    fn promote(&self, bytes: &[u8], file_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.pdf_dir)?;
        let mut tmp = NamedTempFile::new_in(&self.pdf_dir)?;
        tmp.write_all(bytes)?;
        let dest = self.pdf_dir.join(file_name);
        tmp.persist(&dest)
            .map_err(|e| HarvestError::Io(e.error))?;
        Ok(dest)
    }
}

/// First `.pdf` member of a gzip-compressed tar archive, if any.
fn extract_first_pdf(bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_pdf = entry
            .path()
            .map(|p| p.to_string_lossy().to_lowercase().ends_with(".pdf"))
            .unwrap_or(false);
        if is_pdf {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

//! Pipeline-internal result types.
//!
//! "Not found" and "not retrievable" conditions are values, not errors;
//! every variant here is data the run controller aggregates.

use std::path::PathBuf;

use pubharvest_common::records::{ArticleRecord, PdfArtifact};

/// Result of reconciling one record.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// ID already dispatched earlier in this run (matched by several
    /// keywords); processed once, counted once.
    Skipped,
    /// Per-record fetch failure, already appended to the run's error log.
    Error(String),
    /// Merged snapshot as persisted.
    Processed(Box<ArticleRecord>),
}

/// Result of the PDF acquisition chain for one record.
///
/// `NotAvailable` and `NotDownloaded` are distinct on purpose: the first
/// means no open-access avenue existed, the second that an avenue existed
/// but the transfer or decode failed. A later run can retry the second case
/// for free because nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    Saved(PathBuf),
    NotAvailable,
    NotDownloaded,
}

impl AcquisitionOutcome {
    pub fn to_artifact(&self) -> PdfArtifact {
        match self {
            AcquisitionOutcome::Saved(path) => {
                PdfArtifact::File(path.to_string_lossy().into_owned())
            }
            AcquisitionOutcome::NotAvailable => PdfArtifact::NotAvailable,
            AcquisitionOutcome::NotDownloaded => PdfArtifact::NotDownloaded,
        }
    }
}

//! Domain records shared by the store and the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel for a publication date the remote payload did not carry.
pub const UNKNOWN_DATE: &str = "unknown";

/// Access tier, classified from the open-access lookup (never from download
/// success).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AccessTier {
    Free,
    #[default]
    Paid,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Free => "Free",
            AccessTier::Paid => "Paid",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Free" => AccessTier::Free,
            _ => AccessTier::Paid,
        }
    }
}

/// Review status owned by the external review collaborator once set.
/// Wire strings keep the historical casing of the review workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReviewStatus {
    #[default]
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "rejected")]
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending  => "Pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "approved" => ReviewStatus::Approved,
            "rejected" => ReviewStatus::Rejected,
            _ => ReviewStatus::Pending,
        }
    }
}

/// Where (or why not) a PDF exists for a record.
///
/// `NotAvailable` means no open-access avenue existed; `NotDownloaded` means
/// an avenue existed but the download failed. Downstream consumers rely on
/// the distinction, so both survive as distinct wire strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PdfArtifact {
    File(String),
    NotAvailable,
    NotDownloaded,
}

impl PdfArtifact {
    pub const NOT_AVAILABLE: &'static str = "Not available";
    pub const NOT_DOWNLOADED: &'static str = "Not downloaded";

    pub fn wire(&self) -> String {
        match self {
            PdfArtifact::File(path)    => path.clone(),
            PdfArtifact::NotAvailable  => Self::NOT_AVAILABLE.to_string(),
            PdfArtifact::NotDownloaded => Self::NOT_DOWNLOADED.to_string(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, PdfArtifact::File(_))
    }
}

impl Default for PdfArtifact {
    fn default() -> Self {
        PdfArtifact::NotAvailable
    }
}

impl From<String> for PdfArtifact {
    fn from(s: String) -> Self {
        match s.as_str() {
            PdfArtifact::NOT_AVAILABLE => PdfArtifact::NotAvailable,
            PdfArtifact::NOT_DOWNLOADED => PdfArtifact::NotDownloaded,
            _ => PdfArtifact::File(s),
        }
    }
}

impl From<PdfArtifact> for String {
    fn from(p: PdfArtifact) -> Self {
        p.wire()
    }
}

/// One bibliographic record, canonical form.
///
/// Identity is the external bibliographic ID. On re-ingestion,
/// `updated_title`, `review_status`, and `approved_tags` are preserved;
/// everything else is refreshed from the latest fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub pubmed_id: String,
    pub title: String,
    pub abstract_text: String,
    /// Ordered author list, "Forename Lastname".
    pub authors: Vec<String>,
    /// Keywords carried by the remote record itself.
    pub keywords: Vec<String>,
    pub journal: String,
    /// ISO `YYYY-MM-DD`, or [`UNKNOWN_DATE`].
    pub publication_date: String,
    pub doi: String,
    pub fulltext_link: String,
    /// Secondary identifier usable for open-access retrieval.
    pub pmcid: Option<String>,
    pub access: AccessTier,
    pub volume: String,
    pub issue: String,
    pub pages: String,
    pub updated_title: String,
    pub pdf_file: PdfArtifact,
    pub suggested_tags: Vec<String>,
    pub review_status: ReviewStatus,
    pub approved_tags: Vec<String>,
    /// Date this record was last ingested, `YYYY-MM-DD`.
    pub ingested_date: String,
}

/// Run lifecycle states. Terminal states are immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started   => "started",
            RunStatus::Completed => "completed",
            RunStatus::Error     => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => RunStatus::Completed,
            "error" => RunStatus::Error,
            _ => RunStatus::Started,
        }
    }
}

/// One harvest run's lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub keywords: Vec<String>,
    pub articles_processed: u64,
    /// Run-fatal message, set only on the `error` transition.
    pub error: Option<String>,
}

impl RunRecord {
    pub fn started(keywords: Vec<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time,
            end_time: None,
            status: RunStatus::Started,
            keywords,
            articles_processed: 0,
            error: None,
        }
    }
}

/// One per-record fetch failure, appended to the run's error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunErrorEntry {
    pub pubmed_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_artifact_round_trips_sentinels() {
        assert_eq!(PdfArtifact::from("Not available".to_string()), PdfArtifact::NotAvailable);
        assert_eq!(PdfArtifact::from("Not downloaded".to_string()), PdfArtifact::NotDownloaded);
        assert_eq!(
            PdfArtifact::from("pdfs/Some Title SMITH 2024.pdf".to_string()),
            PdfArtifact::File("pdfs/Some Title SMITH 2024.pdf".to_string())
        );
        assert_eq!(PdfArtifact::NotDownloaded.wire(), "Not downloaded");
    }

    #[test]
    fn review_status_wire_casing() {
        assert_eq!(ReviewStatus::Pending.as_str(), "Pending");
        assert_eq!(ReviewStatus::Approved.as_str(), "approved");
        assert_eq!(ReviewStatus::parse("rejected"), ReviewStatus::Rejected);
        assert_eq!(ReviewStatus::parse("anything else"), ReviewStatus::Pending);
    }
}

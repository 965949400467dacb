//! End-of-run batch writers.
//!
//! Both writers run exactly once per run, after the keyword sweep has fully
//! drained: the citation writer chunks paid-access citations into ≤50-entry
//! text files, the export writer emits one 16-column CSV of every processed
//! record. Existing files are never overwritten.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use pubharvest_common::records::ArticleRecord;
use pubharvest_common::{HarvestError, Result};

pub const CITATIONS_PER_FILE: usize = 50;

/// Citation string for a record:
/// ```text
/// Title
/// Journal. PublicationDate;Volume(Issue):Pages
/// doi: DOI
/// ```
pub fn generate_citation(record: &ArticleRecord) -> String {
    let mut vol_issue_pages = String::new();
    if !record.volume.is_empty() || !record.issue.is_empty() || !record.pages.is_empty() {
        vol_issue_pages.push_str(&record.volume);
        if !record.issue.is_empty() {
            vol_issue_pages.push_str(&format!("({})", record.issue));
        }
        if !record.pages.is_empty() {
            vol_issue_pages.push_str(&format!(":{}", record.pages));
        }
    }

    format!(
        "{}\n{}. {};{}\ndoi: {}",
        record.title, record.journal, record.publication_date, vol_issue_pages, record.doi
    )
}

/// Writes citations in fixed-size chunks to timestamped files, never
/// overwriting: on a name collision a numeric suffix is appended until a
/// free name is found.
pub struct CitationWriter {
    dir: PathBuf,
}

impl CitationWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write_all(&self, citations: &[String], stamp: &str) -> Result<Vec<PathBuf>> {
        if citations.is_empty() {
            return Ok(Vec::new());
        }
        std::fs::create_dir_all(&self.dir)?;

        let mut written = Vec::new();
        for (index, chunk) in citations.chunks(CITATIONS_PER_FILE).enumerate() {
            let chunk_no = index + 1;
            let mut path = self.dir.join(format!("citations_{stamp}_{chunk_no}.txt"));
            let mut counter = 1;
            while path.exists() {
                path = self
                    .dir
                    .join(format!("citations_{stamp}_{chunk_no}_{counter}.txt"));
                counter += 1;
            }
            std::fs::write(&path, chunk.join("\n\n"))?;
            info!(n = chunk.len(), path = %path.display(), "Citations saved");
            written.push(path);
        }
        Ok(written)
    }
}

/// Fixed 16-column projection of a processed record. Field order is the
/// export file's column order; missing values render as empty strings.
#[derive(Debug, Serialize)]
struct ExportRow {
    pubmed_id: String,
    title: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
    authors: String,
    journal: String,
    publication_date: String,
    doi: String,
    fulltext_link: String,
    pmcid: String,
    access: String,
    updated_title: String,
    pdf_file: String,
    suggested_tags: String,
    webscraped_date: String,
    status: String,
    keywords: String,
}

impl From<&ArticleRecord> for ExportRow {
    fn from(record: &ArticleRecord) -> Self {
        Self {
            pubmed_id: record.pubmed_id.clone(),
            title: record.title.clone(),
            abstract_text: record.abstract_text.clone(),
            authors: record.authors.join(", "),
            journal: record.journal.clone(),
            publication_date: record.publication_date.clone(),
            doi: record.doi.clone(),
            fulltext_link: record.fulltext_link.clone(),
            pmcid: record.pmcid.clone().unwrap_or_default(),
            access: record.access.as_str().to_string(),
            updated_title: record.updated_title.clone(),
            pdf_file: record.pdf_file.wire(),
            suggested_tags: record.suggested_tags.join(", "),
            webscraped_date: record.ingested_date.clone(),
            status: record.review_status.as_str().to_string(),
            keywords: record.keywords.join(", "),
        }
    }
}

/// One tabular file per run with every processed record; nothing is written
/// for a run that processed zero records.
pub struct ExportWriter {
    dir: PathBuf,
}

impl ExportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write(&self, records: &[ArticleRecord], stamp: &str) -> Result<Option<PathBuf>> {
        if records.is_empty() {
            info!("Nothing new to export this run");
            return Ok(None);
        }
        std::fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(format!("scraped_articles_{stamp}.csv"));
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| HarvestError::Other(e.into()))?;
        for record in records {
            writer
                .serialize(ExportRow::from(record))
                .map_err(|e| HarvestError::Other(e.into()))?;
        }
        writer
            .flush()
            .map_err(HarvestError::Io)?;

        info!(n = records.len(), path = %path.display(), "Export written");
        Ok(Some(path))
    }
}

/// Shared artifact timestamp for one run.
pub fn run_stamp(now: chrono::DateTime<chrono::Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubharvest_common::records::{AccessTier, PdfArtifact};

    fn record() -> ArticleRecord {
        ArticleRecord {
            pubmed_id: "31415".to_string(),
            title: "Valve outcomes at five years".to_string(),
            journal: "Eur Heart J".to_string(),
            publication_date: "2020-05-01".to_string(),
            volume: "41".to_string(),
            issue: "18".to_string(),
            pages: "1723-1731".to_string(),
            doi: "10.1093/eurheartj/ehaa123".to_string(),
            authors: vec!["Maria Rossi".to_string(), "Tom Baker".to_string()],
            access: AccessTier::Paid,
            pdf_file: PdfArtifact::NotAvailable,
            ingested_date: "2020-06-01".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn citation_format_matches_contract() {
        assert_eq!(
            generate_citation(&record()),
            "Valve outcomes at five years\nEur Heart J. 2020-05-01;41(18):1723-1731\ndoi: 10.1093/eurheartj/ehaa123"
        );
    }

    #[test]
    fn citation_omits_empty_volume_issue_pages() {
        let mut rec = record();
        rec.volume.clear();
        rec.issue.clear();
        rec.pages.clear();
        assert_eq!(
            generate_citation(&rec),
            "Valve outcomes at five years\nEur Heart J. 2020-05-01;\ndoi: 10.1093/eurheartj/ehaa123"
        );
    }

    #[test]
    fn chunks_citations_at_fifty_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CitationWriter::new(dir.path());
        let citations: Vec<String> = (0..120).map(|i| format!("citation {i}")).collect();

        let files = writer.write_all(&citations, "20240101_090000").unwrap();
        assert_eq!(files.len(), 3);

        let sizes: Vec<usize> = files
            .iter()
            .map(|f| {
                std::fs::read_to_string(f)
                    .unwrap()
                    .split("\n\n")
                    .count()
            })
            .collect();
        assert_eq!(sizes, vec![50, 50, 20]);
    }

    #[test]
    fn never_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("citations_20240101_090000_1.txt");
        std::fs::write(&existing, "already here").unwrap();

        let writer = CitationWriter::new(dir.path());
        let files = writer
            .write_all(&["fresh citation".to_string()], "20240101_090000")
            .unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0],
            dir.path().join("citations_20240101_090000_1_1.txt")
        );
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "already here");
    }

    #[test]
    fn no_citations_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CitationWriter::new(dir.path());
        assert!(writer.write_all(&[], "20240101_090000").unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn export_writes_sixteen_column_header() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ExportWriter::new(dir.path());
        let path = writer.write(&[record()], "20240101_090000").unwrap().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(
            header,
            "pubmed_id,title,abstract,authors,journal,publication_date,doi,\
             fulltext_link,pmcid,access,updated_title,pdf_file,suggested_tags,\
             webscraped_date,status,keywords"
        );
        assert_eq!(header.split(',').count(), 16);
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("Maria Rossi, Tom Baker"));
    }

    #[test]
    fn empty_export_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ExportWriter::new(dir.path());
        assert!(writer.write(&[], "20240101_090000").unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

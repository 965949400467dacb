//! Canonical "updated title" computation.
//!
//! The result is frozen on first ingestion (it names the PDF on disk), so
//! this function must be pure: same record + same abbreviation map, same
//! output, always. No clock or global state.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use pubharvest_common::records::{ArticleRecord, UNKNOWN_DATE};

use super::TermReplacer;

lazy_static! {
    static ref DASHES: Regex = Regex::new(r"[-–—]").unwrap();
    static ref PUNCT: Regex = Regex::new(r"[.,;:()]+").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Normalize punctuation, apply abbreviations, and append the first
/// author's uppercased last name and the 4-digit publication year.
///
/// Missing title, authors, or date degrade to empty segments with a
/// data-quality warning; this never fails.
pub fn compute_updated_title(record: &ArticleRecord, replacer: &TermReplacer) -> String {
    if record.title.is_empty() {
        warn!(
            pubmed_id = %record.pubmed_id,
            "Record has minimal metadata (no title)"
        );
    }

    let flattened = DASHES.replace_all(&record.title, " ");
    let flattened = PUNCT.replace_all(&flattened, " ");
    let flattened = WHITESPACE.replace_all(&flattened, " ");
    let normalized = flattened.trim();

    let abbreviated = replacer.apply(normalized);

    let author_suffix = first_author_last_name(&record.authors);
    let year_suffix = publication_year(&record.publication_date);

    format!("{abbreviated} {author_suffix} {year_suffix}")
        .trim()
        .to_string()
}

fn first_author_last_name(authors: &[String]) -> String {
    authors
        .first()
        .and_then(|name| name.split_whitespace().last())
        .map(|last| last.to_uppercase())
        .unwrap_or_default()
}

fn publication_year(publication_date: &str) -> String {
    if publication_date.is_empty() || publication_date == UNKNOWN_DATE {
        return String::new();
    }
    let year = publication_date.split('-').next().unwrap_or_default();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        year.to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalise::AbbreviationMap;

    fn record(title: &str, authors: &[&str], date: &str) -> ArticleRecord {
        ArticleRecord {
            pubmed_id: "42".to_string(),
            title: title.to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            publication_date: date.to_string(),
            ..Default::default()
        }
    }

    fn replacer(entries: &[(&str, &str)]) -> TermReplacer {
        let map: AbbreviationMap = entries
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_string()))
            .collect();
        TermReplacer::new(&map)
    }

    #[test]
    fn flattens_punctuation_and_appends_author_year() {
        let rec = record(
            "Mitral regurgitation: long-term outcomes (a registry study)",
            &["Ana María García", "Bo Chen"],
            "2021-06-15",
        );
        let out = compute_updated_title(&rec, &replacer(&[]));
        assert_eq!(
            out,
            "Mitral regurgitation long term outcomes a registry study GARCÍA 2021"
        );
    }

    #[test]
    fn applies_abbreviations_after_flattening() {
        let rec = record(
            "Transcatheter aortic-valve replacement in low-risk patients",
            &["John Smith"],
            "2019-03-01",
        );
        let out = compute_updated_title(
            &rec,
            &replacer(&[("transcatheter aortic valve replacement", "TAVR")]),
        );
        assert_eq!(out, "TAVR in low risk patients SMITH 2019");
    }

    #[test]
    fn missing_pieces_degrade_to_empty_segments() {
        let rec = record("", &[], UNKNOWN_DATE);
        assert_eq!(compute_updated_title(&rec, &replacer(&[])), "");

        let rec = record("Valve outcomes", &[], "");
        assert_eq!(compute_updated_title(&rec, &replacer(&[])), "Valve outcomes");
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let rec = record("Stenosis — a review; part (II)", &["Kim Lee"], "2022-11-02");
        let rep = replacer(&[("stenosis", "AS")]);
        let first = compute_updated_title(&rec, &rep);
        let second = compute_updated_title(&rec, &rep);
        assert_eq!(first, second);
        assert_eq!(first, "AS a review part II LEE 2022");
    }
}

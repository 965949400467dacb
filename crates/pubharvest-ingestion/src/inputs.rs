//! Run inputs: keyword and abbreviation CSV loading.
//!
//! Both files come from spreadsheet exports, so headers may carry a UTF-8
//! BOM and arbitrary casing. Loaded once per run; immutable afterwards.

use std::path::Path;

use tracing::warn;

use pubharvest_common::{HarvestError, Result};

use crate::normalise::AbbreviationMap;

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case(name))
}

/// Ordered keyword set from a CSV with a `Keyword` column.
pub fn load_keywords(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| HarvestError::Config(format!("cannot read {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| HarvestError::Config(format!("bad header in {}: {e}", path.display())))?
        .clone();
    let idx = column_index(&headers, "keyword").ok_or_else(|| {
        HarvestError::Config(format!("no Keyword column in {}", path.display()))
    })?;

    let mut keywords = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| HarvestError::Config(format!("bad row: {e}")))?;
        if let Some(value) = row.get(idx) {
            let value = value.trim();
            if !value.is_empty() && !keywords.iter().any(|k| k == value) {
                keywords.push(value.to_string());
            }
        }
    }
    Ok(keywords)
}

/// Term/abbreviation pairs from a CSV with `Term` and `Abbreviation`
/// columns, in file order.
pub fn load_abbreviations(path: &Path) -> Result<Vec<(String, String)>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| HarvestError::Config(format!("cannot read {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| HarvestError::Config(format!("bad header in {}: {e}", path.display())))?
        .clone();
    let term_idx = column_index(&headers, "term")
        .ok_or_else(|| HarvestError::Config(format!("no Term column in {}", path.display())))?;
    let abbr_idx = column_index(&headers, "abbreviation").ok_or_else(|| {
        HarvestError::Config(format!("no Abbreviation column in {}", path.display()))
    })?;

    let mut entries = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| HarvestError::Config(format!("bad row: {e}")))?;
        let term = row.get(term_idx).unwrap_or_default().trim();
        let abbreviation = row.get(abbr_idx).unwrap_or_default().trim();
        if !term.is_empty() && !abbreviation.is_empty() {
            entries.push((term.to_string(), abbreviation.to_string()));
        }
    }
    Ok(entries)
}

/// Build the lower-cased abbreviation map. Keys must be unique after
/// lower-casing; duplicates are logged and the last entry wins.
pub fn build_abbreviation_map(entries: &[(String, String)]) -> AbbreviationMap {
    let mut map = AbbreviationMap::new();
    for (term, abbreviation) in entries {
        let key = term.to_lowercase();
        if map.insert(key.clone(), abbreviation.clone()).is_some() {
            warn!(term = %key, "Duplicate abbreviation term after lower-casing");
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_keywords_with_bom_header() {
        let (_dir, path) = write_csv("\u{feff}Keyword\naortic stenosis\n\nmitral valve\naortic stenosis\n");
        let keywords = load_keywords(&path).unwrap();
        assert_eq!(keywords, vec!["aortic stenosis", "mitral valve"]);
    }

    #[test]
    fn loads_abbreviations_and_builds_map() {
        let (_dir, path) = write_csv(
            "Term,Abbreviation\n\
             Transcatheter Aortic Valve Replacement,TAVR\n\
             transcatheter aortic valve replacement,TAVR2\n",
        );
        let entries = load_abbreviations(&path).unwrap();
        assert_eq!(entries.len(), 2);

        let map = build_abbreviation_map(&entries);
        assert_eq!(map.len(), 1);
        assert_eq!(map["transcatheter aortic valve replacement"], "TAVR2");
    }

    #[test]
    fn missing_column_is_a_config_error() {
        let (_dir, path) = write_csv("Something\nvalue\n");
        assert!(load_keywords(&path).is_err());
    }
}

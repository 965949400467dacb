//! Configuration loading.
//! Reads pubharvest.toml from the current directory or the path in the
//! PUBHARVEST_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub entrez: EntrezConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default = "default_pdf_dir")]
    pub pdf_dir: String,
    #[serde(default = "default_citation_dir")]
    pub citation_dir: String,
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
    #[serde(default = "default_keyword_source")]
    pub keyword_source: String,
    #[serde(default = "default_abbreviation_source")]
    pub abbreviation_source: String,
    #[serde(default = "default_max_pdf_pages")]
    pub max_pdf_pages: usize,
    #[serde(default = "default_search_cap")]
    pub search_cap: usize,
    /// Fallback fetch window when no prior successful run exists.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Per-keyword dispatch concurrency; 1 means fully sequential.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_pdf_dir()             -> String { "pdfs".to_string() }
fn default_citation_dir()        -> String { "citations".to_string() }
fn default_export_dir()          -> String { "exports".to_string() }
fn default_keyword_source()      -> String { "inputs/keywords.csv".to_string() }
fn default_abbreviation_source() -> String { "inputs/abbreviations.csv".to_string() }
fn default_max_pdf_pages()       -> usize  { 2 }
fn default_search_cap()          -> usize  { 1000 }
fn default_lookback_days()       -> i64    { 30 }
fn default_workers()             -> usize  { 1 }

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            pdf_dir: default_pdf_dir(),
            citation_dir: default_citation_dir(),
            export_dir: default_export_dir(),
            keyword_source: default_keyword_source(),
            abbreviation_source: default_abbreviation_source(),
            max_pdf_pages: default_max_pdf_pages(),
            search_cap: default_search_cap(),
            lookback_days: default_lookback_days(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrezConfig {
    /// API key for higher rate limits; NCBI_API_KEY env var wins if set.
    pub api_key: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: usize,
    /// Sleep between retries after a rate-limit response.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

fn default_page_size()     -> usize { 100 }
fn default_fetch_retries() -> usize { 3 }
fn default_backoff_secs()  -> u64   { 60 }

impl Default for EntrezConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            page_size: default_page_size(),
            fetch_retries: default_fetch_retries(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

impl Config {
    /// Load configuration from pubharvest.toml.
    /// Checks PUBHARVEST_CONFIG env var first, then the current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("PUBHARVEST_CONFIG")
            .unwrap_or_else(|_| "pubharvest.toml".to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            anyhow::bail!("Config file not found: {path}");
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        if let Ok(key) = std::env::var("NCBI_API_KEY") {
            if !key.is_empty() {
                config.entrez.api_key = Some(key);
            }
        }
        Ok(config)
    }
}

//! E-utilities client for the bibliographic service.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

use pubharvest_common::config::EntrezConfig;
use pubharvest_common::net::GuardedClient;
use pubharvest_common::records::{ArticleRecord, UNKNOWN_DATE};
use pubharvest_common::{HarvestError, Result};

use super::{BibliographicSource, DateWindow, FetchOutcome};

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

pub struct EntrezClient {
    client: GuardedClient,
    config: EntrezConfig,
}

impl EntrezClient {
    pub fn new(client: GuardedClient, config: EntrezConfig) -> Self {
        Self { client, config }
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("db", "pubmed".to_string())];
        if let Some(key) = &self.config.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// One efetch round-trip with bounded rate-limit retries.
    async fn efetch(&self, pubmed_id: &str) -> Result<ArticleRecord> {
        let mut params = self.base_params();
        params.push(("id", pubmed_id.to_string()));
        params.push(("retmode", "xml".to_string()));

        for attempt in 0..self.config.fetch_retries {
            let response = self
                .client
                .get(EFETCH_URL)?
                .query(&params)
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                warn!(
                    pubmed_id,
                    attempt = attempt + 1,
                    backoff_secs = self.config.backoff_secs,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(Duration::from_secs(self.config.backoff_secs)).await;
                continue;
            }

            let xml = response.error_for_status()?.text().await?;
            return parse_article_xml(&xml, pubmed_id);
        }

        Err(HarvestError::RateLimited)
    }
}

#[async_trait]
impl BibliographicSource for EntrezClient {
    /// Paginate esearch until a short page or `cap`.
    #[instrument(skip(self, window))]
    async fn search(&self, query: &str, window: &DateWindow, cap: usize) -> Result<Vec<String>> {
        let page_size = self.config.page_size;
        let mut all_ids: Vec<String> = Vec::new();
        let mut retstart = 0usize;

        loop {
            let mut params = self.base_params();
            params.push(("term", query.to_string()));
            params.push(("retmode", "json".to_string()));
            params.push(("retmax", page_size.to_string()));
            params.push(("retstart", retstart.to_string()));
            params.push(("datetype", "pdat".to_string()));
            params.push(("mindate", window.start.format("%Y/%m/%d").to_string()));
            params.push(("maxdate", window.end.format("%Y/%m/%d").to_string()));

            let response = match self.client.get(ESEARCH_URL)?.query(&params).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(query, error = %e, "Search request failed, stopping pagination");
                    break;
                }
            };

            let payload: serde_json::Value = match response.error_for_status() {
                Ok(r) => match r.json().await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(query, error = %e, "Search payload unreadable, stopping pagination");
                        break;
                    }
                },
                Err(e) => {
                    warn!(query, error = %e, "Search returned an error status, stopping pagination");
                    break;
                }
            };

            let page: Vec<String> = payload["esearchresult"]["idlist"]
                .as_array()
                .unwrap_or(&vec![])
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();

            debug!(query, retstart, n = page.len(), "Search page returned");
            let short_page = page.len() < page_size;
            all_ids.extend(page);

            if short_page || all_ids.len() >= cap {
                break;
            }
            retstart += page_size;
        }

        all_ids.truncate(cap);
        Ok(all_ids)
    }

    #[instrument(skip(self))]
    async fn fetch(&self, pubmed_id: &str) -> FetchOutcome {
        match self.efetch(pubmed_id).await {
            Ok(record) => FetchOutcome::Fetched(Box::new(record)),
            Err(e) => {
                warn!(pubmed_id, error = %e, "Fetch failed");
                FetchOutcome::Failed {
                    pubmed_id: pubmed_id.to_string(),
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Parse one record's efetch XML into an [`ArticleRecord`].
///
/// Handles the `<PubmedArticleSet><PubmedArticle>` structure. Missing text
/// fields stay empty; a payload without a publication year gets the
/// `unknown` date sentinel.
pub fn parse_article_xml(xml: &str, pubmed_id: &str) -> Result<ArticleRecord> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut record = ArticleRecord {
        pubmed_id: pubmed_id.to_string(),
        publication_date: UNKNOWN_DATE.to_string(),
        ..Default::default()
    };

    let mut abstract_parts: Vec<String> = Vec::new();
    let mut self_id: Option<String> = None;

    // State machine over the element stream.
    let mut in_title = false;
    let mut in_abstract = false;
    let mut abstract_label: Option<String> = None;
    let mut in_author = false;
    let mut in_fore_name = false;
    let mut in_last_name = false;
    let mut current_fore = String::new();
    let mut current_last = String::new();
    let mut in_journal_title = false;
    let mut in_pub_date = false;
    let mut in_year = false;
    let mut in_month = false;
    let mut in_day = false;
    let mut year = String::new();
    let mut month = String::new();
    let mut day = String::new();
    let mut in_keyword = false;
    let mut in_volume = false;
    let mut in_issue = false;
    let mut in_pages = false;
    let mut article_id_type: Option<String> = None;
    let mut elocation_doi_valid = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"ArticleTitle" => in_title = true,
                b"AbstractText" => {
                    in_abstract = true;
                    abstract_label = attr_value(e, b"Label");
                }
                b"Author" => {
                    in_author = true;
                    current_fore.clear();
                    current_last.clear();
                }
                b"ForeName" => in_fore_name = true,
                b"LastName" => in_last_name = true,
                b"Title" => in_journal_title = true,
                b"PubDate" => in_pub_date = true,
                b"Year" if in_pub_date => in_year = true,
                b"Month" if in_pub_date => in_month = true,
                b"Day" if in_pub_date => in_day = true,
                b"Keyword" => in_keyword = true,
                b"Volume" => in_volume = true,
                b"Issue" => in_issue = true,
                b"MedlinePgn" => in_pages = true,
                b"ArticleId" => article_id_type = attr_value(e, b"IdType"),
                b"ELocationID" => {
                    elocation_doi_valid = attr_value(e, b"EIdType").as_deref() == Some("doi")
                        && attr_value(e, b"ValidYN").as_deref() == Some("Y");
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if in_title {
                    record.title = text;
                } else if in_abstract {
                    match &abstract_label {
                        Some(label) => abstract_parts.push(format!("{label}: {text}")),
                        None => abstract_parts.push(text),
                    }
                } else if in_fore_name {
                    current_fore = text;
                } else if in_last_name {
                    current_last = text;
                } else if in_journal_title {
                    record.journal = text;
                } else if in_year {
                    year = text;
                } else if in_month {
                    month = text;
                } else if in_day {
                    day = text;
                } else if in_keyword {
                    if !text.is_empty() {
                        record.keywords.push(text);
                    }
                } else if in_volume {
                    record.volume = text;
                } else if in_issue {
                    record.issue = text;
                } else if in_pages {
                    record.pages = text;
                } else if elocation_doi_valid {
                    record.fulltext_link = format!("https://doi.org/{}", text.trim());
                } else if let Some(id_type) = &article_id_type {
                    match id_type.as_str() {
                        "doi" if record.doi.is_empty() => record.doi = text.trim().to_string(),
                        "pmc" if record.pmcid.is_none() => {
                            let raw = text.trim();
                            let pmcid = if raw.starts_with("PMC") {
                                raw.to_string()
                            } else {
                                format!("PMC{raw}")
                            };
                            record.pmcid = Some(pmcid);
                        }
                        "pubmed" if self_id.is_none() => {
                            self_id = Some(text.trim().to_string());
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"ArticleTitle" => in_title = false,
                b"AbstractText" => {
                    in_abstract = false;
                    abstract_label = None;
                }
                b"Author" => {
                    if in_author {
                        let name = if current_fore.is_empty() {
                            current_last.clone()
                        } else {
                            format!("{current_fore} {current_last}")
                        };
                        if !name.is_empty() {
                            record.authors.push(name);
                        }
                        in_author = false;
                    }
                }
                b"ForeName" => in_fore_name = false,
                b"LastName" => in_last_name = false,
                b"Title" => in_journal_title = false,
                b"PubDate" => in_pub_date = false,
                b"Year" => in_year = false,
                b"Month" => in_month = false,
                b"Day" => in_day = false,
                b"Keyword" => in_keyword = false,
                b"Volume" => in_volume = false,
                b"Issue" => in_issue = false,
                b"MedlinePgn" => in_pages = false,
                b"ArticleId" => article_id_type = None,
                b"ELocationID" => elocation_doi_valid = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(HarvestError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    record.abstract_text = abstract_parts.join("\n");
    record.publication_date = assemble_date(&year, &month, &day);

    // A secondary identifier is only trusted if the payload's own record ID
    // matches the requested one.
    if let Some(self_id) = self_id {
        if self_id != pubmed_id {
            warn!(
                pubmed_id,
                payload_id = %self_id,
                "Payload record ID mismatch, discarding secondary identifier"
            );
            record.pmcid = None;
        }
    }

    Ok(record)
}

fn attr_value(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| String::from_utf8(a.value.into_owned()).ok())
}

/// Assemble ISO `YYYY-MM-DD` from the payload's Year/Month/Day fields.
/// Month may be a name; missing month/day default to 01. Without a year the
/// date is unknown.
fn assemble_date(year: &str, month: &str, day: &str) -> String {
    let Ok(y) = year.parse::<u32>() else {
        return UNKNOWN_DATE.to_string();
    };
    let m = parse_month(month).unwrap_or(1);
    let d = day.parse::<u32>().ok().filter(|d| (1..=31).contains(d)).unwrap_or(1);
    format!("{y:04}-{m:02}-{d:02}")
}

fn parse_month(month: &str) -> Option<u32> {
    if let Ok(n) = month.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let n = match month.get(..3)?.to_ascii_lowercase().as_str() {
        "jan" => 1, "feb" => 2, "mar" => 3, "apr" => 4,
        "may" => 5, "jun" => 6, "jul" => 7, "aug" => 8,
        "sep" => 9, "oct" => 10, "nov" => 11, "dec" => 12,
        _ => return None,
    };
    Some(n)
}

//! Domain-allowlisted HTTP client.
//!
//! Every outbound request the pipeline makes goes through [`GuardedClient`],
//! which refuses URLs whose host is not on the approved list. The allowlist
//! covers the bibliographic service and the open-access archive hosts; run
//! configuration can extend it.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use url::Url;

use crate::error::HarvestError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct GuardedClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl GuardedClient {
    /// Client with the default allowlist of bibliographic-service hosts.
    pub fn new() -> Result<Self, HarvestError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HarvestError> {
        let allowlist = [
            "eutils.ncbi.nlm.nih.gov", // search + fetch
            "www.ncbi.nlm.nih.gov",    // open-access resolution + downloads
            "ftp.ncbi.nlm.nih.gov",    // archive links (served over https)
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("pubharvest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, allowlist })
    }

    /// Append an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Whether a URL is permitted under the current policy. Subdomains of an
    /// allowed host are allowed.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, HarvestError> {
        if !self.is_allowed(url) {
            return Err(HarvestError::NetPolicy(format!(
                "host not in allowlist for URL {url}"
            )));
        }
        Ok(self.client.get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_known_hosts_and_subdomains() {
        let client = GuardedClient::new().unwrap();
        assert!(client.is_allowed("https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi"));
        assert!(client.is_allowed("https://ftp.ncbi.nlm.nih.gov/pub/pmc/oa.tar.gz"));
        assert!(!client.is_allowed("https://example.com/paper.pdf"));
        assert!(!client.is_allowed("not a url"));
    }

    #[test]
    fn allow_domain_extends_policy() {
        let mut client = GuardedClient::new().unwrap();
        assert!(!client.is_allowed("https://europepmc.org/search"));
        client.allow_domain("europepmc.org");
        assert!(client.is_allowed("https://europepmc.org/search"));
    }
}

//! Open-access resolution service client.
//!
//! Endpoint: https://www.ncbi.nlm.nih.gov/pmc/utils/oa/oa.fcgi
//!
//! For an open-access record the service answers with `<link>` elements; a
//! direct PDF link is preferred over the archive bundle. Records outside the
//! open-access subset answer with an `<error>` element.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, instrument};

use pubharvest_common::net::GuardedClient;
use pubharvest_common::{HarvestError, Result};

use super::{OaLocation, OpenAccessResolver};

const OA_URL: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/oa/oa.fcgi";

pub struct OaClient {
    client: GuardedClient,
}

impl OaClient {
    pub fn new(client: GuardedClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OpenAccessResolver for OaClient {
    #[instrument(skip(self))]
    async fn resolve(&self, pmcid: &str) -> Result<Option<OaLocation>> {
        if !pmcid.starts_with("PMC") {
            return Ok(None);
        }

        let xml = self
            .client
            .get(OA_URL)?
            .query(&[("id", pmcid)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let location = parse_oa_response(&xml)?;
        debug!(pmcid, ?location, "Open-access lookup resolved");
        Ok(location)
    }
}

/// Extract the best available link from an oa.fcgi response.
/// Archive links are served from an ftp-scheme mirror; rewrite to https.
pub fn parse_oa_response(xml: &str) -> Result<Option<OaLocation>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut pdf: Option<String> = None;
    let mut archive: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"error" => return Ok(None),
                b"link" => {
                    let mut format = None;
                    let mut href = None;
                    for attr in e.attributes().filter_map(|a| a.ok()) {
                        let value = String::from_utf8(attr.value.into_owned())
                            .map_err(|e| HarvestError::Xml(e.to_string()))?;
                        match attr.key.as_ref() {
                            b"format" => format = Some(value),
                            b"href" => href = Some(value),
                            _ => {}
                        }
                    }
                    if let (Some(format), Some(href)) = (format, href) {
                        let href = rewrite_scheme(&href);
                        match format.as_str() {
                            "pdf" if pdf.is_none() => pdf = Some(href),
                            "tgz" if archive.is_none() => archive = Some(href),
                            _ => {}
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(HarvestError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(pdf
        .map(OaLocation::DirectPdf)
        .or(archive.map(OaLocation::Archive)))
}

fn rewrite_scheme(url: &str) -> String {
    match url.strip_prefix("ftp://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_direct_pdf_over_archive() {
        let xml = r#"<OA><records>
            <record id="PMC123">
              <link format="tgz" href="ftp://ftp.ncbi.nlm.nih.gov/pub/pmc/bundle.tar.gz"/>
              <link format="pdf" href="https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123.pdf"/>
            </record></records></OA>"#;
        assert_eq!(
            parse_oa_response(xml).unwrap(),
            Some(OaLocation::DirectPdf(
                "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123.pdf".to_string()
            ))
        );
    }

    #[test]
    fn archive_only_with_scheme_rewrite() {
        let xml = r#"<OA><records><record id="PMC9">
            <link format="tgz" href="ftp://ftp.ncbi.nlm.nih.gov/pub/pmc/b.tar.gz"/>
            </record></records></OA>"#;
        assert_eq!(
            parse_oa_response(xml).unwrap(),
            Some(OaLocation::Archive(
                "https://ftp.ncbi.nlm.nih.gov/pub/pmc/b.tar.gz".to_string()
            ))
        );
    }

    #[test]
    fn error_payload_means_not_open_access() {
        let xml = r#"<OA><error code="idIsNotOpenAccess">PMC4 not in OA subset</error></OA>"#;
        assert_eq!(parse_oa_response(xml).unwrap(), None);
    }
}

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::config::ResolvedConfig;
use crate::domain::Doi;
use crate::error::{FetchFailure, PulseError};

/// Bibliographic metadata collaborator.
///
/// `Ok(None)` means the work exists but the registry reports no count.
pub trait MetadataRegistryClient: Send + Sync {
    fn get_citation_count(&self, work_id: &Doi) -> Result<Option<u64>, FetchFailure>;
}

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    #[serde(default)]
    message: Option<CrossrefWork>,
}

#[derive(Debug, Deserialize)]
struct CrossrefWork {
    #[serde(rename = "is-referenced-by-count", default)]
    is_referenced_by_count: Option<u64>,
}

#[derive(Clone)]
pub struct CrossrefHttpClient {
    client: Client,
    base_url: String,
}

impl CrossrefHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, PulseError> {
        // Crossref routes requests that carry a mailto to its polite pool.
        let agent = match config.contact_email.as_deref() {
            Some(email) => format!(
                "citation-pulse/{} (mailto:{email})",
                env!("CARGO_PKG_VERSION")
            ),
            None => format!("citation-pulse/{}", env!("CARGO_PKG_VERSION")),
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&agent).map_err(|err| PulseError::CrossrefHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| PulseError::CrossrefHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.crossref_api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn work_url(&self, work_id: &Doi) -> String {
        format!(
            "{}/works/{}",
            self.base_url,
            encode_url_component(work_id.as_str())
        )
    }
}

impl MetadataRegistryClient for CrossrefHttpClient {
    fn get_citation_count(&self, work_id: &Doi) -> Result<Option<u64>, FetchFailure> {
        let url = self.work_url(work_id);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| FetchFailure::Unavailable(err.to_string()))?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(FetchFailure::NotFound(work_id.to_string()));
        }
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Crossref request failed".to_string());
            return Err(FetchFailure::Unavailable(format!(
                "Crossref returned status {}: {message}",
                status.as_u16()
            )));
        }
        let body = response
            .text()
            .map_err(|err| FetchFailure::Unavailable(err.to_string()))?;
        parse_citation_count(&body)
    }
}

/// Reads `message.is-referenced-by-count` from a Crossref works payload.
pub fn parse_citation_count(body: &str) -> Result<Option<u64>, FetchFailure> {
    let payload: CrossrefResponse =
        serde_json::from_str(body).map_err(|err| FetchFailure::Malformed(err.to_string()))?;
    Ok(payload
        .message
        .and_then(|message| message.is_referenced_by_count))
}

fn encode_url_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

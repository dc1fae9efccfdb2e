use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ResolvedConfig;
use crate::domain::{Identity, SubjectId};
use crate::error::{FetchFailure, PulseError};

/// Identity registry collaborator: profile, works and employment records.
pub trait IdentityRegistryClient: Send + Sync {
    fn get_profile(&self, subject: &SubjectId) -> Result<ProfileRecord, FetchFailure>;
    fn get_works(&self, subject: &SubjectId) -> Result<WorksRecord, FetchFailure>;
    fn get_employments(&self, subject: &SubjectId) -> Result<EmploymentsRecord, FetchFailure>;
}

// Raw payloads. Every field may be absent or null upstream.

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ValueField {
    #[serde(default)]
    pub value: Option<String>,
}

impl ValueField {
    fn non_empty(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProfileRecord {
    #[serde(default)]
    pub name: Option<PersonName>,
    #[serde(default)]
    pub emails: Option<EmailList>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PersonName {
    #[serde(rename = "given-names", default)]
    pub given_names: Option<ValueField>,
    #[serde(rename = "family-name", default)]
    pub family_name: Option<ValueField>,
    #[serde(rename = "credit-name", default)]
    pub credit_name: Option<ValueField>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EmailList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: Vec<EmailEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EmailEntry {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub primary: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WorksRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub group: Vec<WorkGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkGroup {
    #[serde(rename = "work-summary", default, deserialize_with = "null_as_default")]
    pub work_summary: Vec<WorkSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkSummary {
    #[serde(default)]
    pub title: Option<WorkTitle>,
    #[serde(rename = "type", default)]
    pub work_type: Option<String>,
    #[serde(rename = "publication-date", default)]
    pub publication_date: Option<PublicationDate>,
    #[serde(rename = "journal-title", default)]
    pub journal_title: Option<ValueField>,
    #[serde(rename = "external-ids", default)]
    pub external_ids: Option<ExternalIds>,
}

impl WorkSummary {
    pub fn title_text(&self) -> Option<&str> {
        self.title
            .as_ref()
            .and_then(|title| title.title.as_ref())
            .and_then(ValueField::non_empty)
    }

    pub fn publication_year(&self) -> Option<i32> {
        self.publication_date
            .as_ref()
            .and_then(|date| date.year.as_ref())
            .and_then(ValueField::non_empty)
            .and_then(|year| year.parse().ok())
    }

    pub fn external_ids(&self) -> &[ExternalId] {
        self.external_ids
            .as_ref()
            .map(|ids| ids.external_id.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkTitle {
    #[serde(default)]
    pub title: Option<ValueField>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PublicationDate {
    #[serde(default)]
    pub year: Option<ValueField>,
    #[serde(default)]
    pub month: Option<ValueField>,
    #[serde(default)]
    pub day: Option<ValueField>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExternalIds {
    #[serde(rename = "external-id", default, deserialize_with = "null_as_default")]
    pub external_id: Vec<ExternalId>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExternalId {
    #[serde(rename = "external-id-type", default)]
    pub id_type: Option<String>,
    #[serde(rename = "external-id-value", default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EmploymentsRecord {
    #[serde(rename = "affiliation-group", default, deserialize_with = "null_as_default")]
    pub affiliation_group: Vec<AffiliationGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AffiliationGroup {
    #[serde(default, deserialize_with = "null_as_default")]
    pub summaries: Vec<EmploymentSummaryWrapper>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EmploymentSummaryWrapper {
    #[serde(rename = "employment-summary", default)]
    pub employment_summary: Option<EmploymentSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EmploymentSummary {
    #[serde(rename = "role-title", default)]
    pub role_title: Option<String>,
    #[serde(rename = "end-date", default)]
    pub end_date: Option<serde_json::Value>,
    #[serde(default)]
    pub organization: Option<Organization>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Organization {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Address {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Builds an [`Identity`] from raw registry records.
///
/// A missing employment record only means no current affiliation is known.
pub fn extract_identity(
    subject: &SubjectId,
    profile: &ProfileRecord,
    employments: Option<&EmploymentsRecord>,
) -> Identity {
    let display_name = profile
        .name
        .as_ref()
        .and_then(display_name)
        .unwrap_or_else(|| "Name not available".to_string());

    let emails = profile
        .emails
        .as_ref()
        .map(|list| list.email.as_slice())
        .unwrap_or_default();
    let primary_contact = emails
        .iter()
        .find(|entry| entry.primary == Some(true) && entry.email.is_some())
        .or_else(|| emails.iter().find(|entry| entry.email.is_some()))
        .and_then(|entry| entry.email.clone());

    let current = employments.and_then(current_employment);
    let current_affiliation = current
        .and_then(|summary| summary.organization.as_ref())
        .and_then(|org| org.name.clone());
    let current_location = current
        .and_then(|summary| summary.organization.as_ref())
        .and_then(|org| org.address.as_ref())
        .and_then(format_location);

    Identity {
        subject_id: subject.clone(),
        display_name,
        primary_contact,
        current_affiliation,
        current_location,
        profile_url: subject.profile_url(),
    }
}

fn display_name(name: &PersonName) -> Option<String> {
    if let Some(credit) = name.credit_name.as_ref().and_then(ValueField::non_empty) {
        return Some(credit.to_string());
    }
    let given = name
        .given_names
        .as_ref()
        .and_then(ValueField::non_empty)
        .unwrap_or("");
    let family = name
        .family_name
        .as_ref()
        .and_then(ValueField::non_empty)
        .unwrap_or("");
    let full = format!("{given} {family}").trim().to_string();
    (!full.is_empty()).then_some(full)
}

fn current_employment(record: &EmploymentsRecord) -> Option<&EmploymentSummary> {
    record
        .affiliation_group
        .iter()
        .flat_map(|group| group.summaries.iter())
        .filter_map(|wrapper| wrapper.employment_summary.as_ref())
        .find(|summary| summary.end_date.is_none())
}

fn format_location(address: &Address) -> Option<String> {
    let parts = [&address.city, &address.region, &address.country]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    (!parts.is_empty()).then(|| parts.join(", "))
}

#[derive(Clone)]
pub struct OrcidHttpClient {
    client: Client,
    base_url: String,
    max_retries: usize,
}

impl OrcidHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, PulseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("citation-pulse/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PulseError::OrcidHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Ok(token) = std::env::var("ORCID_ACCESS_TOKEN") {
            if !token.trim().is_empty() {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                        .map_err(|err| PulseError::OrcidHttp(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| PulseError::OrcidHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.orcid_api_base.trim_end_matches('/').to_string(),
            max_retries: config.orcid_max_retries,
        })
    }

    fn section_url(&self, subject: &SubjectId, section: &str) -> String {
        format!("{}/{}/{}", self.base_url, subject.as_str(), section)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchFailure> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(FetchFailure::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "ORCID request failed".to_string());
            return Err(FetchFailure::Unavailable(format!(
                "ORCID returned status {}: {message}",
                status.as_u16()
            )));
        }
        let body = response
            .text()
            .map_err(|err| FetchFailure::Unavailable(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| FetchFailure::Malformed(err.to_string()))
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, FetchFailure>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        tracing::debug!(status, attempt, "retrying ORCID request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        tracing::debug!(error = %err, attempt, "retrying ORCID request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchFailure::Unavailable(err.to_string()));
                }
            }
        }
    }
}

impl IdentityRegistryClient for OrcidHttpClient {
    fn get_profile(&self, subject: &SubjectId) -> Result<ProfileRecord, FetchFailure> {
        self.get_json(&self.section_url(subject, "person"))
    }

    fn get_works(&self, subject: &SubjectId) -> Result<WorksRecord, FetchFailure> {
        self.get_json(&self.section_url(subject, "works"))
    }

    fn get_employments(&self, subject: &SubjectId) -> Result<EmploymentsRecord, FetchFailure> {
        self.get_json(&self.section_url(subject, "employments"))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SubjectId {
        "0000-0002-1825-0097".parse().unwrap()
    }

    #[test]
    fn identity_prefers_credit_name_and_primary_email() {
        let profile: ProfileRecord = serde_json::from_value(serde_json::json!({
            "name": {
                "given-names": {"value": "Josiah"},
                "family-name": {"value": "Carberry"},
                "credit-name": {"value": "J. S. Carberry"}
            },
            "emails": {"email": [
                {"email": "first@example.org", "primary": false},
                {"email": "main@example.org", "primary": true}
            ]}
        }))
        .unwrap();

        let identity = extract_identity(&subject(), &profile, None);
        assert_eq!(identity.display_name, "J. S. Carberry");
        assert_eq!(identity.primary_contact.as_deref(), Some("main@example.org"));
        assert_eq!(identity.current_affiliation, None);
        assert_eq!(identity.profile_url, "https://orcid.org/0000-0002-1825-0097");
    }

    #[test]
    fn identity_tolerates_null_sections() {
        let profile: ProfileRecord = serde_json::from_value(serde_json::json!({
            "name": {"given-names": null, "family-name": {"value": "Carberry"}, "credit-name": null},
            "emails": {"email": null}
        }))
        .unwrap();

        let identity = extract_identity(&subject(), &profile, None);
        assert_eq!(identity.display_name, "Carberry");
        assert_eq!(identity.primary_contact, None);
    }

    #[test]
    fn current_employment_skips_ended_positions() {
        let employments: EmploymentsRecord = serde_json::from_value(serde_json::json!({
            "affiliation-group": [
                {"summaries": [{"employment-summary": {
                    "end-date": {"year": {"value": "2019"}},
                    "organization": {"name": "Old Lab", "address": {"city": "Ghent"}}
                }}]},
                {"summaries": [{"employment-summary": {
                    "end-date": null,
                    "organization": {"name": "Brown University",
                        "address": {"city": "Providence", "region": "RI", "country": "US"}}
                }}]}
            ]
        }))
        .unwrap();

        let identity = extract_identity(&subject(), &ProfileRecord::default(), Some(&employments));
        assert_eq!(identity.display_name, "Name not available");
        assert_eq!(identity.current_affiliation.as_deref(), Some("Brown University"));
        assert_eq!(identity.current_location.as_deref(), Some("Providence, RI, US"));
    }
}

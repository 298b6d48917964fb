//! Lead source: the ad platform's lead-form endpoint.
//!
//! A fetch either returns every lead the endpoint lists (following
//! `paging.next`) or fails with [`SourceError`]. An error payload is never
//! mistaken for "zero new leads", and nothing is retried here.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

use leadable_core::{AppConfig, LeadRecord, SourceSettings};

use crate::error::SourceError;
use crate::http::api_error_message;

const LEAD_FIELDS: &str = "created_time,field_data";

/// Fetches raw lead records for one sync.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self, source: &SourceSettings) -> Result<Vec<LeadRecord>, SourceError>;
}

/// Graph API implementation of [`RecordSource`].
#[derive(Debug, Clone)]
pub struct GraphRecordSource {
    client: Client,
    base_url: String,
    max_pages: u32,
}

impl GraphRecordSource {
    pub fn new(client: Client, base_url: impl Into<String>, max_pages: u32) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            max_pages: max_pages.max(1),
        }
    }

    pub fn from_config(client: Client, config: &AppConfig) -> Self {
        Self::new(client, config.graph_api_base.clone(), config.max_lead_pages)
    }

    fn leads_url(&self, source: &SourceSettings) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| SourceError::Api {
            message: format!("invalid Graph API base URL: {e}"),
        })?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Api {
                message: format!("Graph API base URL cannot be a base: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend([source.form_id.as_str(), "leads"]);
        url.query_pairs_mut()
            .append_pair("access_token", &source.access_token)
            .append_pair("fields", LEAD_FIELDS);
        Ok(url)
    }

    async fn get_page(&self, url: Url) -> Result<LeadsPage, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Http(e.without_url()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::Http(e.without_url()))?;
        let body: Value = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(SourceError::Api {
                    message: format!("HTTP {}", status.as_u16()),
                })
            }
            Err(err) => return Err(SourceError::Decode(err)),
        };
        parse_leads_page(status.is_success(), status.as_u16(), body)
    }
}

#[async_trait]
impl RecordSource for GraphRecordSource {
    async fn fetch(&self, source: &SourceSettings) -> Result<Vec<LeadRecord>, SourceError> {
        check_settings(source)?;

        let mut records = Vec::new();
        let mut next = Some(self.leads_url(source)?);
        let mut pages = 0;

        while let Some(url) = next.take() {
            let page = self.get_page(url).await?;
            pages += 1;
            records.extend(page.records);

            if pages >= self.max_pages {
                if page.next.is_some() {
                    debug!(form = %source.form_id, pages, "lead page cap reached");
                }
                break;
            }
            next = match page.next {
                Some(link) => Some(Url::parse(&link).map_err(|e| SourceError::Api {
                    message: format!("invalid paging link: {e}"),
                })?),
                None => None,
            };
        }

        debug!(form = %source.form_id, leads = records.len(), pages, "fetched leads");
        Ok(records)
    }
}

/// One page of the leads listing.
#[derive(Debug, PartialEq)]
pub(crate) struct LeadsPage {
    pub records: Vec<LeadRecord>,
    pub next: Option<String>,
}

fn check_settings(source: &SourceSettings) -> Result<(), SourceError> {
    if source.access_token.trim().is_empty() {
        return Err(SourceError::InvalidSettings("access_token"));
    }
    if source.account_id.trim().is_empty() {
        return Err(SourceError::InvalidSettings("account_id"));
    }
    if source.form_id.trim().is_empty() {
        return Err(SourceError::InvalidSettings("form_id"));
    }
    Ok(())
}

/// Interpret one response body.
///
/// An `error` field wins over everything, then a non-success status, then a
/// missing `data` array.
pub(crate) fn parse_leads_page(
    success: bool,
    status: u16,
    body: Value,
) -> Result<LeadsPage, SourceError> {
    if let Some(message) = api_error_message(&body) {
        return Err(SourceError::Api { message });
    }
    if !success {
        return Err(SourceError::Api {
            message: format!("HTTP {status}"),
        });
    }

    let next = body
        .get("paging")
        .and_then(|p| p.get("next"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let data = match body {
        Value::Object(mut map) => map.remove("data"),
        _ => None,
    };
    let data = match data {
        Some(data @ Value::Array(_)) => data,
        _ => return Err(SourceError::MissingData),
    };
    let records: Vec<LeadRecord> = serde_json::from_value(data)?;
    Ok(LeadsPage { records, next })
}

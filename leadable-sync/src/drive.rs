//! Spreadsheet discovery, so a user can pick a destination by name.

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::http::api_error_message;

const SPREADSHEET_QUERY: &str =
    "mimeType='application/vnd.google-apps.spreadsheet' and trashed=false";

/// A spreadsheet visible to the signed-in Google account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetEntry {
    pub id: String,
    pub name: String,
}

/// List spreadsheets the token can see (first page, up to 1000 entries).
pub async fn list_spreadsheets(
    client: &Client,
    drive_api_base: &str,
    access_token: &str,
) -> Result<Vec<SpreadsheetEntry>, StoreError> {
    let mut url =
        Url::parse(drive_api_base).map_err(|e| StoreError::InvalidUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::InvalidUrl(drive_api_base.to_string()))?
        .pop_if_empty()
        .push("files");
    url.query_pairs_mut()
        .append_pair("q", SPREADSHEET_QUERY)
        .append_pair("fields", "files(id,name)")
        .append_pair("pageSize", "1000");

    let response = client
        .get(url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(StoreError::Http)?;
    let status = response.status();
    let body: Value = response.json().await.map_err(StoreError::Http)?;

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(StoreError::Unauthorized {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(StoreError::Api {
            status: status.as_u16(),
            message: api_error_message(&body).unwrap_or_else(|| "unknown error".to_string()),
        });
    }
    Ok(parse_files(&body))
}

/// Entries without an id or a name are skipped.
pub(crate) fn parse_files(body: &Value) -> Vec<SpreadsheetEntry> {
    body.get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(|file| {
                    Some(SpreadsheetEntry {
                        id: file.get("id")?.as_str()?.to_string(),
                        name: file.get("name")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

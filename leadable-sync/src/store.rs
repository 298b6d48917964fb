//! Destination spreadsheet.
//!
//! Rows land in the first worksheet. Column A holds the dedupe key; it is
//! re-read on every cycle so rows edited or added by hand are respected.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::{json, Value};
use tracing::debug;

use leadable_core::{AppConfig, CanonicalRow, DestinationSettings, SHEET_HEADER};

use crate::error::StoreError;
use crate::http::api_error_message;

/// A resolved destination worksheet plus the credential used to reach it.
#[derive(Clone, PartialEq, Eq)]
pub struct SheetHandle {
    pub spreadsheet_id: String,
    /// Title of the worksheet rows are appended to.
    pub worksheet: String,
    pub access_token: String,
}

impl fmt::Debug for SheetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetHandle")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("worksheet", &self.worksheet)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Reads and appends rows of a destination spreadsheet.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Resolve the destination. Fails when the credential is rejected or the
    /// sheet id does not resolve.
    async fn open(&self, destination: &DestinationSettings) -> Result<SheetHandle, StoreError>;

    /// Write [`SHEET_HEADER`] if the first row is empty. Never overwrites.
    async fn ensure_header(&self, sheet: &SheetHandle) -> Result<(), StoreError>;

    /// Every value in column A below the header.
    async fn existing_keys(&self, sheet: &SheetHandle) -> Result<HashSet<String>, StoreError>;

    /// Append one `[date, name, email, other fields]` row.
    async fn append(&self, sheet: &SheetHandle, row: &CanonicalRow) -> Result<(), StoreError>;
}

/// Sheets API v4 implementation of [`SheetStore`].
#[derive(Debug, Clone)]
pub struct GoogleSheetStore {
    client: Client,
    base_url: String,
}

impl GoogleSheetStore {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn from_config(client: Client, config: &AppConfig) -> Self {
        Self::new(client, config.sheets_api_base.clone())
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| StoreError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, sheet: &SheetHandle, range: &str) -> Result<Url, StoreError> {
        self.url(&["spreadsheets", sheet.spreadsheet_id.as_str(), "values", range])
    }

    async fn read_values(
        &self,
        sheet: &SheetHandle,
        range: &str,
        major_dimension: &str,
    ) -> Result<Vec<Vec<String>>, StoreError> {
        let mut url = self.values_url(sheet, range)?;
        url.query_pairs_mut()
            .append_pair("majorDimension", major_dimension);
        let response = self
            .client
            .get(url)
            .bearer_auth(&sheet.access_token)
            .send()
            .await
            .map_err(StoreError::Http)?;
        let body = checked_json(response, &sheet.spreadsheet_id).await?;
        Ok(parse_values(&body))
    }

    async fn append_cells(&self, sheet: &SheetHandle, cells: &[&str]) -> Result<(), StoreError> {
        let range = format!("{}!A1:append", quote_worksheet(&sheet.worksheet));
        let mut url = self.values_url(sheet, &range)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let response = self
            .client
            .post(url)
            .bearer_auth(&sheet.access_token)
            .json(&json!({ "values": [cells] }))
            .send()
            .await
            .map_err(StoreError::Http)?;
        checked_json(response, &sheet.spreadsheet_id).await?;
        Ok(())
    }
}

#[async_trait]
impl SheetStore for GoogleSheetStore {
    async fn open(&self, destination: &DestinationSettings) -> Result<SheetHandle, StoreError> {
        let mut url = self.url(&["spreadsheets", destination.sheet_id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let response = self
            .client
            .get(url)
            .bearer_auth(&destination.access_token)
            .send()
            .await
            .map_err(StoreError::Http)?;
        let body = checked_json(response, &destination.sheet_id).await?;
        let worksheet = first_worksheet(&body).ok_or_else(|| StoreError::NoWorksheet {
            sheet_id: destination.sheet_id.clone(),
        })?;
        debug!(sheet = %destination.sheet_id, worksheet = %worksheet, "opened spreadsheet");
        Ok(SheetHandle {
            spreadsheet_id: destination.sheet_id.clone(),
            worksheet,
            access_token: destination.access_token.clone(),
        })
    }

    async fn ensure_header(&self, sheet: &SheetHandle) -> Result<(), StoreError> {
        let range = format!("{}!1:1", quote_worksheet(&sheet.worksheet));
        let rows = self.read_values(sheet, &range, "ROWS").await?;
        let first_row_empty = rows
            .first()
            .map(|row| row.iter().all(|cell| cell.is_empty()))
            .unwrap_or(true);
        if first_row_empty {
            debug!(sheet = %sheet.spreadsheet_id, "writing header row");
            self.append_cells(sheet, &SHEET_HEADER).await?;
        }
        Ok(())
    }

    async fn existing_keys(&self, sheet: &SheetHandle) -> Result<HashSet<String>, StoreError> {
        let range = format!("{}!A:A", quote_worksheet(&sheet.worksheet));
        let columns = self.read_values(sheet, &range, "COLUMNS").await?;
        Ok(keys_below_header(columns))
    }

    async fn append(&self, sheet: &SheetHandle, row: &CanonicalRow) -> Result<(), StoreError> {
        let cells = row.cells();
        let cells: Vec<&str> = cells.iter().map(String::as_str).collect();
        self.append_cells(sheet, &cells).await
    }
}

/// Map status codes onto [`StoreError`] and decode the body.
async fn checked_json(response: Response, sheet_id: &str) -> Result<Value, StoreError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(StoreError::Http)?;
    let parsed = serde_json::from_slice::<Value>(&bytes);

    match status {
        s if s.is_success() => Ok(parsed?),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Unauthorized {
            status: status.as_u16(),
        }),
        StatusCode::NOT_FOUND => Err(StoreError::SheetNotFound {
            sheet_id: sheet_id.to_string(),
        }),
        _ => Err(StoreError::Api {
            status: status.as_u16(),
            message: parsed
                .ok()
                .and_then(|body| api_error_message(&body))
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned()),
        }),
    }
}

/// A1-notation worksheet reference: `'Title'` with embedded quotes doubled.
pub(crate) fn quote_worksheet(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

pub(crate) fn first_worksheet(body: &Value) -> Option<String> {
    body.get("sheets")?
        .as_array()?
        .first()?
        .get("properties")?
        .get("title")?
        .as_str()
        .map(str::to_string)
}

/// `values` of a ValueRange as strings. Absent `values` means an empty range.
pub(crate) fn parse_values(body: &Value) -> Vec<Vec<String>> {
    let Some(rows) = body.get("values").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(cell_to_string).collect())
                .unwrap_or_default()
        })
        .collect()
}

fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn keys_below_header(columns: Vec<Vec<String>>) -> HashSet<String> {
    columns
        .into_iter()
        .next()
        .map(|column| column.into_iter().skip(1).collect())
        .unwrap_or_default()
}

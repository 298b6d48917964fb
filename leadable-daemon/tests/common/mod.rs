//! In-memory collaborators for driving the engine without a network.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use leadable_core::{
    CanonicalRow, DestinationSettings, LeadField, LeadRecord, SourceSettings, SyncSpec,
    SHEET_HEADER,
};
use leadable_daemon::{EngineTiming, StatusEvent, StatusSink, SyncRegistry};
use leadable_sync::{RecordSource, SheetHandle, SheetStore, SourceError, StoreError};

/// What one `fetch` call does.
#[derive(Debug, Clone)]
pub enum Step {
    Leads(Vec<LeadRecord>),
    Fail(String),
    /// Never completes.
    Hang,
    /// Holds the worker thread without yielding.
    Block(Duration),
    Panic(&'static str),
}

/// Per-form scripted lead source. The last step of a script repeats forever.
pub struct FakeSource {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls_tx: mpsc::UnboundedSender<(String, Instant)>,
}

impl FakeSource {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Instant)>) {
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();
        let source = Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            calls_tx,
        });
        (source, calls_rx)
    }

    pub fn script(&self, form_id: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(form_id.to_string(), steps.into());
    }

    fn next_step(&self, form_id: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(form_id) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) => steps.front().cloned().unwrap_or(Step::Leads(Vec::new())),
            None => Step::Leads(Vec::new()),
        }
    }
}

#[async_trait]
impl RecordSource for FakeSource {
    async fn fetch(&self, settings: &SourceSettings) -> Result<Vec<LeadRecord>, SourceError> {
        let _ = self
            .calls_tx
            .send((settings.form_id.clone(), Instant::now()));
        match self.next_step(&settings.form_id) {
            Step::Leads(leads) => Ok(leads),
            Step::Fail(message) => Err(SourceError::Api { message }),
            Step::Hang => std::future::pending().await,
            Step::Block(duration) => {
                std::thread::sleep(duration);
                Ok(Vec::new())
            }
            Step::Panic(message) => panic!("{message}"),
        }
    }
}

/// Spreadsheets keyed by id; each is a list of rows.
#[derive(Default)]
pub struct FakeSheet {
    pub sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
    pub open_fails: bool,
    pub reject_email: Option<String>,
}

impl FakeSheet {
    pub fn rows(&self, sheet_id: &str) -> Vec<Vec<String>> {
        self.sheets
            .lock()
            .unwrap()
            .get(sheet_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seed(&self, sheet_id: &str, rows: Vec<Vec<String>>) {
        self.sheets
            .lock()
            .unwrap()
            .insert(sheet_id.to_string(), rows);
    }
}

#[async_trait]
impl SheetStore for FakeSheet {
    async fn open(&self, destination: &DestinationSettings) -> Result<SheetHandle, StoreError> {
        if self.open_fails {
            return Err(StoreError::SheetNotFound {
                sheet_id: destination.sheet_id.clone(),
            });
        }
        Ok(SheetHandle {
            spreadsheet_id: destination.sheet_id.clone(),
            worksheet: "Sheet1".into(),
            access_token: destination.access_token.clone(),
        })
    }

    async fn ensure_header(&self, sheet: &SheetHandle) -> Result<(), StoreError> {
        let mut sheets = self.sheets.lock().unwrap();
        let rows = sheets.entry(sheet.spreadsheet_id.clone()).or_default();
        if rows.is_empty() {
            rows.push(header());
        }
        Ok(())
    }

    async fn existing_keys(&self, sheet: &SheetHandle) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .rows(&sheet.spreadsheet_id)
            .iter()
            .skip(1)
            .filter_map(|row| row.first().cloned())
            .collect())
    }

    async fn append(&self, sheet: &SheetHandle, row: &CanonicalRow) -> Result<(), StoreError> {
        if self.reject_email.as_deref() == Some(row.email.as_str()) {
            return Err(StoreError::Api {
                status: 500,
                message: "backend error".into(),
            });
        }
        self.sheets
            .lock()
            .unwrap()
            .entry(sheet.spreadsheet_id.clone())
            .or_default()
            .push(row.cells().to_vec());
        Ok(())
    }
}

pub fn header() -> Vec<String> {
    SHEET_HEADER.iter().map(|c| c.to_string()).collect()
}

pub fn lead(created: &str, name: &str, email: &str) -> LeadRecord {
    LeadRecord {
        created_time: created.into(),
        field_data: vec![
            LeadField {
                name: "full_name".into(),
                values: vec![name.into()],
            },
            LeadField {
                name: "email".into(),
                values: vec![email.into()],
            },
        ],
    }
}

pub fn spec(form_id: &str, sheet_id: &str, frequency: &str) -> SyncSpec {
    SyncSpec {
        name: None,
        source_token: "fb-secret-token".into(),
        account_id: "act_1".into(),
        form_id: form_id.into(),
        sheet_id: sheet_id.into(),
        frequency: frequency.into(),
        google_token: "google-secret-token".into(),
    }
}

pub fn registry(source: Arc<FakeSource>, sheet: Arc<FakeSheet>) -> SyncRegistry {
    SyncRegistry::new(
        source,
        sheet,
        StatusSink::default(),
        EngineTiming::default(),
    )
}

/// Collect status messages up to and including the first one matching `done`.
pub async fn messages_until(
    rx: &mut broadcast::Receiver<StatusEvent>,
    done: impl Fn(&str) -> bool,
) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(24 * 3600), rx.recv())
            .await
            .expect("status message within a day")
            .expect("status channel open");
        let matched = done(&event.message);
        seen.push(event.message);
        if matched {
            return seen;
        }
    }
}

/// Drain calls already recorded without waiting.
pub fn drain_calls(rx: &mut mpsc::UnboundedReceiver<(String, Instant)>) -> usize {
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

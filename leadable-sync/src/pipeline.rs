//! One poll cycle: fetch → normalise → dedupe → append.
//!
//! Dedupe is an exact match of each row's `date` against column A as it is
//! right now. Nothing is cached between cycles, so a re-run against an
//! unchanged source appends nothing.

use leadable_core::{normalize, SyncSettings};

use crate::error::SyncError;
use crate::source::RecordSource;
use crate::store::{SheetHandle, SheetStore};

/// What happened to one normalised row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Row was appended to the sheet.
    Appended { date: String, name: String },
    /// Row was skipped: its date is already present in column A.
    Skipped { date: String },
    /// The append call failed; the row is retried on a later cycle.
    Failed { date: String, error: String },
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub outcomes: Vec<RowOutcome>,
}

impl CycleReport {
    pub fn appended(&self) -> usize {
        self.count(|o| matches!(o, RowOutcome::Appended { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RowOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RowOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&RowOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Run one cycle against an already-opened sheet.
///
/// `observe` sees every row outcome as it happens, in source order. Fetch,
/// header and key-read failures abort the cycle with [`SyncError`]; a failed
/// append is recorded as [`RowOutcome::Failed`] and the pass continues.
pub async fn run_cycle<F>(
    source: &dyn RecordSource,
    store: &dyn SheetStore,
    settings: &SyncSettings,
    sheet: &SheetHandle,
    mut observe: F,
) -> Result<CycleReport, SyncError>
where
    F: FnMut(&RowOutcome) + Send,
{
    let records = source.fetch(&settings.source).await?;
    let rows = normalize(&records);

    store.ensure_header(sheet).await?;
    let existing = store.existing_keys(sheet).await?;

    let mut report = CycleReport {
        fetched: records.len(),
        outcomes: Vec::with_capacity(rows.len()),
    };
    for row in rows {
        let outcome = if existing.contains(&row.date) {
            RowOutcome::Skipped { date: row.date }
        } else {
            match store.append(sheet, &row).await {
                Ok(()) => RowOutcome::Appended {
                    date: row.date,
                    name: row.name,
                },
                Err(err) => RowOutcome::Failed {
                    date: row.date,
                    error: err.to_string(),
                },
            }
        };
        observe(&outcome);
        report.outcomes.push(outcome);
    }

    tracing::debug!(
        sync = %settings.name,
        fetched = report.fetched,
        appended = report.appended(),
        skipped = report.skipped(),
        failed = report.failed(),
        "cycle complete",
    );
    Ok(report)
}

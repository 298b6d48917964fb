//! # leadable-sync
//!
//! Remote collaborators of a sync and the single poll cycle that ties them
//! together.
//!
//! - [`source`]: [`RecordSource`] and the Graph API implementation
//! - [`store`]: [`SheetStore`] and the Sheets API implementation
//! - [`drive`]: spreadsheet discovery for pickers
//! - [`pipeline`]: fetch → normalise → dedupe → append, once

pub mod drive;
pub mod error;
mod http;
pub mod pipeline;
pub mod source;
pub mod store;

pub use error::{SourceError, StoreError, SyncError};
pub use http::build_client;
pub use pipeline::{run_cycle, CycleReport, RowOutcome};
pub use source::{GraphRecordSource, RecordSource};
pub use store::{GoogleSheetStore, SheetHandle, SheetStore};

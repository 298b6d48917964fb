//! Leadable core library: domain types, lead normalisation, configuration.
//!
//! - [`types`]: sync identity, settings, raw lead records and canonical rows
//! - [`transform`]: raw lead → canonical row normalisation
//! - [`config`]: process-wide [`AppConfig`] loaded once at startup
//! - [`error`]: [`ValidationError`] and [`ConfigError`]

pub mod config;
pub mod error;
pub mod transform;
pub mod types;

pub use config::{AppConfig, OAuthConfig};
pub use error::{ConfigError, ValidationError};
pub use transform::normalize;
pub use types::{
    CanonicalRow, DestinationSettings, Frequency, LeadField, LeadRecord, SourceSettings,
    SyncName, SyncSettings, SyncSpec, ValidSpec, SHEET_HEADER,
};

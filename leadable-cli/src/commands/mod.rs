use std::path::PathBuf;

use anyhow::{Context, Result};

pub mod auth;
pub mod daemon;
pub mod sheets;
pub mod sync;

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

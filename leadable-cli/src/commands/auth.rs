//! `leadable auth`: Google consent URL for obtaining a spreadsheet token.

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use leadable_core::config;

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Print the consent URL configured by `oauth.client_id` in config.yaml.
    Url,
}

pub fn run(command: AuthCommand) -> Result<()> {
    let home = home_dir()?;
    match command {
        AuthCommand::Url => {
            let config = config::load_at(&home).context("failed to load config")?;
            if config.oauth.client_id.trim().is_empty() {
                bail!(
                    "oauth.client_id is not set; add it to {}",
                    config::config_path_at(&home).display()
                );
            }
            println!("{}", config.oauth.authorization_url());
        }
    }
    Ok(())
}

//! `tether config`: print the effective configuration.

use std::path::Path;

use anyhow::Result;
use console::style;
use tether_infra::config::config_path;
use tether_types::config::TetherConfig;

/// Print `config` as TOML (or JSON). The remote token is never printed.
pub fn show_config(config: &TetherConfig, data_dir: &Path, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    let path = config_path(data_dir);
    println!();
    println!(
        "  {} {}{}",
        style("Config:").bold(),
        style(path.display()).cyan(),
        if path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!();
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

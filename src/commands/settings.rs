//! Config inspection and permission management.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::effects::PermissionState;

/// Print the effective configuration (file plus env overrides) as JSON.
pub fn show() -> Result<()> {
    let config = Config::load()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("# {}", Config::config_path()?.display());
    Ok(())
}

/// Persist the desktop notification decision.
pub fn set_permission(state: PermissionState) -> Result<()> {
    let mut config = Config::load_file()?;
    config.notification_permission = state;
    config
        .save()
        .context("Failed to save notification permission")?;
    println!("Desktop notifications: {}", state);
    Ok(())
}

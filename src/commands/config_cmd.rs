// The 'config' command: read and write the recognized settings. Writes go
// through the typed Setting enum, so unknown keys and ill-typed values are
// rejected before they reach the document.

use crate::commands::Context;
use crate::schemas::global_config::Setting;
use anyhow::{Result, bail};

pub fn get(ctx: &Context, key: &str) -> Result<()> {
    let settings = ctx.config.load_global()?.settings;
    let value = match key {
        "download.timeout" => settings.download.timeout.to_string(),
        "download.retries" => settings.download.retries.to_string(),
        "download.concurrent_downloads" => settings.download.concurrent_downloads.to_string(),
        "proxy.enabled" => settings.proxy.enabled.to_string(),
        "proxy.shims_in_path" => settings.proxy.shims_in_path.to_string(),
        "logging.level" => settings.logging.level,
        "logging.file" => settings
            .logging
            .file
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(unset)".to_string()),
        _ => bail!("unrecognized setting key '{key}'"),
    };
    println!("{value}");
    Ok(())
}

pub fn set(ctx: &Context, key: &str, value: &str) -> Result<()> {
    let setting = Setting::parse(key, value)?;
    ctx.config.update_global(|config| {
        config.settings.apply(setting);
    })?;
    println!("Set {key} = {value}");
    Ok(())
}

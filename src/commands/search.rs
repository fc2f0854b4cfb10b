// The 'search' command: list remotely available versions of a tool.
// Only sources that can enumerate (GitHub) support this.

use crate::commands::{Context, check_tool_name};
use crate::libs::fetchers::strategy_for;
use anyhow::{Result, bail};
use colored::Colorize;

pub fn run(ctx: &Context, tool: &str) -> Result<()> {
    check_tool_name(tool)?;
    let descriptor = ctx.config.load_tool(tool)?;
    let settings = ctx.config.load_global()?.settings;
    let strategy = strategy_for(&descriptor, &settings.download);

    let versions = match strategy.list_versions() {
        Ok(versions) => versions,
        Err(crate::schemas::errors::FetchError::Unsupported) => {
            bail!("'{tool}' is fetched from a direct URL; it has no listable versions")
        }
        Err(e) => return Err(e.into()),
    };
    if versions.is_empty() {
        println!("No remote versions found for {tool}.");
        return Ok(());
    }

    for info in versions {
        let mut line = info.version.clone();
        if info.prerelease {
            line = format!("{line} {}", "(pre-release)".dimmed());
        }
        if ctx.registry.is_installed(tool, &info.version) {
            line = format!("{line} {}", "[installed]".green());
        }
        println!("{line}");
    }
    Ok(())
}

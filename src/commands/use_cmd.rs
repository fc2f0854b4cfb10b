// The 'use' / 'global' / 'local' commands: pin a tool's version in the
// project config (default) or the global one.

use crate::commands::{Context, check_tool_name};
use crate::libs::versioning::{self, SYSTEM_VERSION};
use crate::log_debug;
use anyhow::{Result, bail};
use colored::Colorize;

/// Which document receives the pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Project,
    Global,
}

pub fn run(ctx: &Context, tool: &str, version: &str, scope: Scope) -> Result<()> {
    check_tool_name(tool)?;
    versioning::validate_version_string(version)
        .map_err(|msg| anyhow::anyhow!("'{version}': {msg}"))?;

    // A pin must point at something the resolver can actually use: an
    // installed version, 'system', or an alias that expands to one.
    if version != SYSTEM_VERSION && !pin_is_satisfiable(ctx, tool, version) {
        bail!(
            "'{tool}' {version} is not installed (install it first: vman install {tool} {version})"
        );
    }

    match scope {
        Scope::Global => {
            ctx.config.update_global(|config| {
                config
                    .global_versions
                    .insert(tool.to_string(), version.to_string());
            })?;
            println!("Set global {tool} to {version}");
        }
        Scope::Project => {
            let cwd = std::env::current_dir()?;
            let mut project = ctx.config.load_project(&cwd)?;
            project
                .tools
                .insert(tool.to_string(), version.to_string());
            ctx.config.save_project(&cwd, &project)?;
            println!(
                "Pinned {tool} to {version} in {}",
                cwd.join(crate::schemas::project_config::PROJECT_CONFIG_FILENAME).display()
            );
        }
    }
    log_debug!("[Use] Pin recorded for {} -> {}", tool.bold(), version);
    Ok(())
}

/// Whether a pin would resolve right now: installed as-is, or an alias
/// (descriptor or built-in) with at least one installed version behind it.
fn pin_is_satisfiable(ctx: &Context, tool: &str, version: &str) -> bool {
    if ctx.registry.is_installed(tool, version) {
        return true;
    }
    let expanded = match ctx.config.load_tool(tool) {
        Ok(descriptor) => descriptor.expand_alias(version).to_string(),
        Err(_) => version.to_string(),
    };
    if expanded == "latest" || expanded == "stable" {
        let installed = ctx.registry.list_versions(tool);
        return versioning::highest(&installed, expanded == "latest").is_some();
    }
    ctx.registry.is_installed(tool, &expanded)
}

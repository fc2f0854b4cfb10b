// The 'remove' command: delete one installed version (or all of them),
// fix up the global config, and drop the shim when nothing is left.

use crate::commands::{Context, check_tool_name};
use crate::{log_debug, log_warn};
use anyhow::{Result, bail};
use colored::Colorize;

pub fn run(ctx: &Context, tool: &str, version: Option<String>, all: bool) -> Result<()> {
    check_tool_name(tool)?;

    let doomed: Vec<String> = match (&version, all) {
        (Some(v), false) => vec![v.clone()],
        (None, true) => ctx.registry.list_versions(tool),
        (Some(_), true) => bail!("pass either a version or --all, not both"),
        (None, false) => bail!("specify a version to remove, or --all for every version"),
    };
    if doomed.is_empty() {
        bail!("no installed versions of '{tool}' found");
    }

    for v in &doomed {
        ctx.registry.remove(tool, v, &ctx.config)?;
        log_debug!("[Remove] Deleted {} {}", tool.bold(), v);
    }

    // Orphaned references elsewhere in the config go with the versions.
    ctx.config.cleanup_orphans(&ctx.registry)?;

    if ctx.registry.list_versions(tool).is_empty() {
        if let Err(e) = ctx.shim_builder().remove(tool) {
            log_warn!("[Remove] Could not remove the shim for {}: {}", tool.bold(), e);
        }
    }

    println!(
        "Removed {} version{} of {tool}",
        doomed.len(),
        if doomed.len() == 1 { "" } else { "s" }
    );
    Ok(())
}

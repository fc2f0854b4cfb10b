// The 'update' command: install the source's latest version and point the
// global pin at it.

use crate::commands::install::ensure_shim;
use crate::commands::{Context, check_tool_name};
use crate::libs::installer::{InstallOptions, Installer};
use crate::libs::utilities::http::CancelToken;
use anyhow::Result;

pub fn run(ctx: &Context, tool: &str) -> Result<()> {
    check_tool_name(tool)?;
    ctx.layout.ensure_tree()?;

    let installer = Installer::new(ctx.config.clone(), ctx.registry.clone());
    let cancel = CancelToken::new();
    let outcome = installer.install(tool, None, InstallOptions::default(), &cancel, None)?;
    let version = outcome.version().to_string();

    ctx.config.update_global(|config| {
        config
            .global_versions
            .insert(tool.to_string(), version.clone());
    })?;
    ensure_shim(ctx, tool);

    println!("{tool} is now {version} globally");
    Ok(())
}

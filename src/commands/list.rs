// The 'list' command: tools and their installed versions, from the
// registry (never the network).

use crate::commands::{Context, check_tool_name};
use crate::libs::utilities::timestamps;
use anyhow::Result;

pub fn run(ctx: &Context, tool: Option<String>) -> Result<()> {
    match tool {
        Some(tool) => list_versions(ctx, &tool),
        None => list_tools(ctx),
    }
}

fn list_tools(ctx: &Context) -> Result<()> {
    let tools = ctx.registry.list_tools();
    if tools.is_empty() {
        println!("No tools known yet. Add a descriptor under {} or run 'vman register'.",
            ctx.layout.tools_dir().display());
        return Ok(());
    }
    let global = ctx.config.load_global()?;
    for tool in tools {
        let versions = ctx.registry.list_versions(&tool);
        let current = global
            .tools
            .get(&tool)
            .and_then(|entry| entry.current_version.clone());
        match (versions.is_empty(), current) {
            (true, _) => println!("{tool}  (descriptor only, nothing installed)"),
            (false, Some(current)) => {
                println!("{tool}  {}  (current: {current})", versions.join(", "))
            }
            (false, None) => println!("{tool}  {}", versions.join(", ")),
        }
    }
    Ok(())
}

fn list_versions(ctx: &Context, tool: &str) -> Result<()> {
    check_tool_name(tool)?;
    let versions = ctx.registry.list_versions(tool);
    if versions.is_empty() {
        println!("No installed versions of {tool}.");
        return Ok(());
    }
    let global = ctx.config.load_global()?;
    let current = global
        .tools
        .get(tool)
        .and_then(|entry| entry.current_version.as_deref().map(String::from));
    for version in versions {
        let marker = if current.as_deref() == Some(version.as_str()) {
            "*"
        } else {
            " "
        };
        match ctx.registry.metadata(tool, &version) {
            Some(meta) => println!(
                "{marker} {version}  (installed {})",
                timestamps::time_since(&meta.installed_at)
            ),
            None => println!("{marker} {version}"),
        }
    }
    Ok(())
}

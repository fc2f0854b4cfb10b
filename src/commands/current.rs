// The 'current' command: what would run here, and why.

use crate::commands::{Context, check_tool_name};
use crate::libs::resolver::Resolver;
use anyhow::Result;

pub fn run(ctx: &Context, tool: Option<String>) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let resolver = Resolver::new(&ctx.config, &ctx.registry);

    match tool {
        Some(tool) => {
            check_tool_name(&tool)?;
            match resolver.resolve(&tool, &cwd) {
                Ok(resolved) => println!("{}  ({})", resolved.version, resolved.source),
                Err(e) => println!("{e}"),
            }
        }
        None => {
            let effective = resolver.effective_config(&cwd);
            if effective.versions.is_empty() {
                println!("No tools resolve in {}.", cwd.display());
                return Ok(());
            }
            for (tool, version) in &effective.versions {
                println!("{tool}  {version}  ({})", effective.sources[tool]);
            }
        }
    }
    Ok(())
}

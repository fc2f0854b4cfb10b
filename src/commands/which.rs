// The 'which' command: print the absolute binary path the shim would exec.

use crate::commands::{Context, check_tool_name};
use crate::libs::dispatcher::Dispatcher;
use crate::libs::resolver::{Resolver, VersionSource};
use anyhow::{Result, bail};

pub fn run(ctx: &Context, tool: &str) -> Result<()> {
    check_tool_name(tool)?;
    let cwd = std::env::current_dir()?;
    let resolver = Resolver::new(&ctx.config, &ctx.registry);
    let resolved = resolver.resolve(tool, &cwd)?;

    if resolved.source == VersionSource::System {
        let dispatcher = Dispatcher::new(ctx.layout.clone());
        match dispatcher.find_on_system_path(tool) {
            Some(path) => println!("{}", path.display()),
            None => bail!("'{tool}' resolves to the system version but is not on PATH"),
        }
        return Ok(());
    }

    println!(
        "{}",
        ctx.registry.binary_path(tool, &resolved.version).display()
    );
    Ok(())
}

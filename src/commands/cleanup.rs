// The 'cleanup' command: drop configured versions that have no registry
// record (orphans) from the global document.

use crate::commands::Context;
use anyhow::Result;

pub fn run(ctx: &Context) -> Result<()> {
    let dropped = ctx.config.cleanup_orphans(&ctx.registry)?;
    if dropped.is_empty() {
        println!("No orphaned entries found.");
    } else {
        for orphan in &dropped {
            println!(
                "Dropped {} {} ({})",
                orphan.tool, orphan.version, orphan.location
            );
        }
        println!("Removed {} orphaned entr{}.", dropped.len(),
            if dropped.len() == 1 { "y" } else { "ies" });
    }
    Ok(())
}

// The 'rehash' command: regenerate the whole shim set to match the
// currently registered tools.

use crate::commands::Context;
use anyhow::{Context as _, Result};

pub fn run(ctx: &Context) -> Result<()> {
    ctx.layout.ensure_tree()?;
    let summary = ctx
        .shim_builder()
        .rehash()
        .context("rehash failed")?;
    println!(
        "Rehashed {} shim{}{}",
        summary.written.len(),
        if summary.written.len() == 1 { "" } else { "s" },
        if summary.pruned.is_empty() {
            String::new()
        } else {
            format!(" (pruned {})", summary.pruned.join(", "))
        }
    );
    Ok(())
}

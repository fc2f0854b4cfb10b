// The 'init' command: create the on-disk tree and a default global config,
// then tell the user how to put shims/ on PATH for their shell.

use crate::commands::Context;
use crate::schemas::global_config::GlobalConfig;
use crate::{log_debug, log_info};
use anyhow::{Context as _, Result};
use colored::Colorize;

pub fn run(ctx: &Context, shell: Option<String>) -> Result<()> {
    ctx.layout
        .ensure_tree()
        .context("could not create the vman directory tree")?;
    log_debug!("[Init] Tree ensured at {}", ctx.layout.root().display());

    let config_path = ctx.layout.global_config_path();
    if !ctx.layout.fs().is_file(&config_path) {
        ctx.config.save_global(&GlobalConfig::default())?;
        log_info!(
            "[Init] Wrote default config to {}",
            config_path.display().to_string().cyan()
        );
    } else {
        log_debug!("[Init] Keeping existing config at {}", config_path.display());
    }

    let shims = ctx.layout.shims_dir();
    let shell = shell
        .or_else(|| {
            std::env::var("SHELL")
                .ok()
                .and_then(|s| s.rsplit('/').next().map(String::from))
        })
        .unwrap_or_default();

    // The PATH edit itself is left to the user; vman never touches rc files.
    let hint = match shell.as_str() {
        "fish" => format!("fish_add_path {}", shims.display()),
        "powershell" | "pwsh" => format!("$env:Path = \"{};$env:Path\"", shims.display()),
        _ => format!("export PATH=\"{}:$PATH\"", shims.display()),
    };
    println!("Initialized {}", ctx.layout.root().display());
    println!("Add the shim directory to your PATH: {}", hint.bold());
    Ok(())
}

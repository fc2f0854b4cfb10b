// The 'install' command: run the installer pipeline for one tool, then
// make sure its shim exists.

use crate::commands::{Context, check_tool_name};
use crate::libs::installer::{InstallOptions, Installed, Installer};
use crate::libs::utilities::http::{CancelToken, Progress, ProgressStatus};
use crate::{log_info, log_warn};
use anyhow::Result;
use colored::Colorize;
use std::io::Write;

pub fn run(
    ctx: &Context,
    tool: &str,
    version: Option<String>,
    options: InstallOptions,
) -> Result<()> {
    check_tool_name(tool)?;
    ctx.layout.ensure_tree()?;

    let installer = Installer::new(ctx.config.clone(), ctx.registry.clone());
    let cancel = CancelToken::new();
    let progress = |p: &Progress| print_progress(p);

    let outcome = installer.install(
        tool,
        version.as_deref(),
        options,
        &cancel,
        Some(&progress),
    )?;

    match &outcome {
        Installed::Fresh { version } => {
            // Terminate the carriage-return progress line before the summary.
            eprintln!();
            ensure_shim(ctx, tool);
            println!("Installed {tool} {version}");
        }
        Installed::AlreadyInstalled { version } => {
            println!("{tool} {version} is already installed (use --force to reinstall)");
        }
    }
    Ok(())
}

/// One carriage-return-updated progress line on stderr.
fn print_progress(p: &Progress) {
    let mb = p.downloaded as f64 / (1024.0 * 1024.0);
    let line = match (p.status, p.total) {
        (ProgressStatus::Done, _) => format!("downloaded {mb:.1} MiB"),
        (_, Some(total)) => {
            let total_mb = total as f64 / (1024.0 * 1024.0);
            let percent = if total > 0 {
                p.downloaded * 100 / total
            } else {
                0
            };
            format!(
                "downloading {mb:.1}/{total_mb:.1} MiB ({percent}%) at {:.1} MiB/s",
                p.bytes_per_sec as f64 / (1024.0 * 1024.0)
            )
        }
        (_, None) => format!("downloading {mb:.1} MiB"),
    };
    eprint!("\r\x1b[2K{line}");
    let _ = std::io::stderr().flush();
}

/// Best-effort shim generation after a successful install. A missing
/// vman-shim binary downgrades to a warning so the install itself stands.
pub fn ensure_shim(ctx: &Context, tool: &str) {
    match ctx.shim_builder().generate(tool) {
        Ok(path) => log_info!(
            "[Install] Shim ready at {}",
            path.display().to_string().cyan()
        ),
        Err(e) => log_warn!(
            "[Install] Installed {} but could not write its shim: {} (run 'vman rehash' later)",
            tool.bold(),
            e
        ),
    }
}

// The 'register' command: import an existing local binary into the
// registry as (tool, version), without any download.

use crate::commands::install::ensure_shim;
use crate::commands::{Context, check_tool_name};
use crate::libs::utilities::checksum;
use crate::libs::utilities::path_helpers::expand_user_path;
use crate::libs::versioning;
use anyhow::{Result, bail};
use crate::schemas::version_metadata::InstallSource;

pub fn run(ctx: &Context, tool: &str, version: &str, path: &str) -> Result<()> {
    check_tool_name(tool)?;
    versioning::validate_version_string(version)
        .map_err(|msg| anyhow::anyhow!("'{version}': {msg}"))?;
    if versioning::is_reserved(version) {
        bail!("'{version}' is a reserved name; register a concrete version");
    }
    ctx.layout.ensure_tree()?;

    let source = expand_user_path(path);
    if !source.is_file() {
        bail!("{} does not exist or is not a regular file", source.display());
    }
    let normalized = versioning::strip_v_prefix(version);

    // Imports are copies: the user's original binary stays where it is.
    let staging = ctx
        .layout
        .tmp_dir()
        .join(format!("register-{tool}-{normalized}"));
    std::fs::create_dir_all(ctx.layout.tmp_dir())?;
    std::fs::copy(&source, &staging)?;

    let sha256 = checksum::sha256_file(&staging).ok();
    ctx.registry.register(
        tool,
        normalized,
        &staging,
        InstallSource::Manual,
        sha256,
        &ctx.config,
    )?;
    let _ = std::fs::remove_file(&staging);
    ensure_shim(ctx, tool);

    println!("Registered {tool} {normalized} from {}", source.display());
    Ok(())
}

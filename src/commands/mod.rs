// Register application subcommands.
// Each module corresponds to a specific `vman` command-line action.

pub mod cleanup;
pub mod config_cmd;
pub mod current;
pub mod exec;
pub mod init;
pub mod install;
pub mod list;
pub mod register;
pub mod remove;
pub mod rehash;
pub mod search;
pub mod update;
pub mod use_cmd;
pub mod which;

use crate::libs::config_store::ConfigStore;
use crate::libs::filesystem::OsFileSystem;
use crate::libs::layout::Layout;
use crate::libs::registry::Registry;
use crate::libs::shims::ShimBuilder;
use crate::schemas::tool_descriptor::is_valid_tool_name;
use anyhow::{Context as _, Result, bail};
use std::sync::Arc;

/// Shared wiring every command needs: the discovered layout and the stores
/// built on it.
pub struct Context {
    pub layout: Layout,
    pub config: ConfigStore,
    pub registry: Registry,
}

impl Context {
    pub fn new() -> Result<Context> {
        let layout = Layout::discover(Arc::new(OsFileSystem))
            .context("could not locate the vman directory")?;
        let config = ConfigStore::new(layout.clone());
        let registry = Registry::new(layout.clone());
        Ok(Context {
            layout,
            config,
            registry,
        })
    }

    pub fn shim_builder(&self) -> ShimBuilder {
        ShimBuilder::new(self.layout.clone(), self.registry.clone())
    }
}

/// Rejects tool names that violate the grammar before they reach paths.
pub fn check_tool_name(tool: &str) -> Result<()> {
    if !is_valid_tool_name(tool) {
        bail!("'{tool}' is not a valid tool name (1-50 ASCII letters, digits, '_' or '-')");
    }
    Ok(())
}

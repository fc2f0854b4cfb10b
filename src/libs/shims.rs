//! # Shim Builder
//!
//! Maintains the `shims/` directory: one tiny executable per managed tool,
//! each a copy of the compiled `vman-shim` binary named after the tool.
//! The shim reads its own invocation name at runtime, so a single build of
//! `vman-shim` serves every tool; generating a shim is just a file copy
//! plus execute bits. Shims are created and destroyed only here.

use crate::libs::layout::Layout;
use crate::libs::registry::Registry;
use crate::{log_debug, log_info, log_warn};
use colored::Colorize;
use std::io;
use std::path::PathBuf;

/// Environment override for the shim template binary; tests point this at
/// a stand-in instead of a full cargo build.
pub const SHIM_BIN_ENV_VAR: &str = "VMAN_SHIM_BIN";

/// What a `rehash` did, for the command's summary line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RehashSummary {
    pub written: Vec<String>,
    pub pruned: Vec<String>,
}

pub struct ShimBuilder {
    layout: Layout,
    registry: Registry,
}

impl ShimBuilder {
    pub fn new(layout: Layout, registry: Registry) -> ShimBuilder {
        ShimBuilder { layout, registry }
    }

    /// Locates the `vman-shim` template binary: the `VMAN_SHIM_BIN`
    /// override, else the sibling of the running executable.
    fn shim_template(&self) -> io::Result<PathBuf> {
        if let Ok(custom) = std::env::var(SHIM_BIN_ENV_VAR) {
            let path = PathBuf::from(custom);
            if path.is_file() {
                return Ok(path);
            }
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{SHIM_BIN_ENV_VAR} points at {} which does not exist", path.display()),
            ));
        }

        let me = std::env::current_exe()?;
        let dir = me.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "running executable has no parent directory")
        })?;
        let candidate = dir.join(format!("vman-shim{}", std::env::consts::EXE_SUFFIX));
        if candidate.is_file() {
            Ok(candidate)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "shim template not found at {} (is vman-shim installed next to vman?)",
                    candidate.display()
                ),
            ))
        }
    }

    /// Writes (or refreshes) the shim for one tool.
    pub fn generate(&self, tool: &str) -> io::Result<PathBuf> {
        let template = self.shim_template()?;
        let target = self.layout.shim_path(tool);
        self.layout.fs().create_dir_all(&self.layout.shims_dir())?;

        // Copy over any previous shim so a stale binary never lingers.
        std::fs::copy(&template, &target)?;
        self.layout.fs().set_exec_bits(&target)?;
        log_debug!(
            "[Shims] Wrote shim for {} at {}",
            tool.bold(),
            target.display().to_string().cyan()
        );
        Ok(target)
    }

    /// Removes the shim for one tool. Missing shims are not an error.
    pub fn remove(&self, tool: &str) -> io::Result<()> {
        let target = self.layout.shim_path(tool);
        if self.layout.fs().is_file(&target) {
            self.layout.fs().remove_file(&target)?;
            log_debug!("[Shims] Removed shim for {}.", tool.bold());
        }
        Ok(())
    }

    /// Regenerates the whole shim set to match the registry: every
    /// registered tool gets a fresh shim, and shims for tools that are no
    /// longer registered are pruned.
    pub fn rehash(&self) -> io::Result<RehashSummary> {
        let mut summary = RehashSummary::default();
        let tools = self.registry.list_tools();

        for tool in &tools {
            match self.generate(tool) {
                Ok(_) => summary.written.push(tool.clone()),
                Err(e) => {
                    log_warn!("[Shims] Could not write shim for {}: {}", tool.bold(), e);
                    return Err(e);
                }
            }
        }

        // Prune strays: files in shims/ that no longer map to a tool.
        for entry in self
            .layout
            .fs()
            .list_dir(&self.layout.shims_dir())
            .unwrap_or_default()
        {
            let Some(name) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.strip_suffix(".exe").unwrap_or(n).to_string())
            else {
                continue;
            };
            if !tools.iter().any(|t| *t == name) {
                if self.layout.fs().remove_file(&entry).is_ok() {
                    summary.pruned.push(name);
                }
            }
        }

        log_info!(
            "[Shims] Rehash complete: {} shims written, {} pruned.",
            summary.written.len(),
            summary.pruned.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::config_store::ConfigStore;
    use crate::libs::filesystem::{FileSystem, OsFileSystem};
    use crate::schemas::version_metadata::InstallSource;
    use std::sync::Arc;

    struct Fixture {
        _home: tempfile::TempDir,
        builder: ShimBuilder,
        registry: Registry,
        config: ConfigStore,
        template: PathBuf,
    }

    // Shims are real file copies, so these tests run on the real
    // filesystem under a temp directory.
    fn fixture() -> Fixture {
        let home = tempfile::tempdir().unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
        let layout = Layout::at(home.path().join("vman"), fs);
        layout.ensure_tree().unwrap();

        let template = home.path().join("fake-shim-template");
        std::fs::write(&template, b"#!/bin/sh\nexit 0\n").unwrap();

        let registry = Registry::new(layout.clone());
        let config = ConfigStore::new(layout.clone());
        Fixture {
            _home: home,
            builder: ShimBuilder::new(layout.clone(), registry.clone()),
            registry,
            config,
            template,
        }
    }

    impl Fixture {
        fn with_template<T>(&self, f: impl FnOnce() -> T) -> T {
            // Serialize env mutation across tests in this module.
            static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
            let _guard = ENV_LOCK.lock().unwrap();
            unsafe { std::env::set_var(SHIM_BIN_ENV_VAR, &self.template) };
            let out = f();
            unsafe { std::env::remove_var(SHIM_BIN_ENV_VAR) };
            out
        }

        fn install(&self, tool: &str) {
            let src = self.registry.layout().tmp_dir().join(tool);
            std::fs::write(&src, b"bin").unwrap();
            self.registry
                .register(tool, "1.0.0", &src, InstallSource::Manual, None, &self.config)
                .unwrap();
        }
    }

    #[test]
    fn generate_and_remove_roundtrip() {
        let f = fixture();
        f.with_template(|| {
            let shim = f.builder.generate("kubectl").unwrap();
            assert!(shim.is_file());
            assert!(f.registry.layout().fs().is_executable(&shim) || cfg!(not(unix)));
            f.builder.remove("kubectl").unwrap();
            assert!(!shim.exists());
            // Removing again is fine.
            f.builder.remove("kubectl").unwrap();
        });
    }

    #[test]
    fn rehash_writes_registered_and_prunes_strays() {
        let f = fixture();
        f.with_template(|| {
            f.install("jq");
            f.install("rg");
            // A stray shim for a tool that is not registered.
            f.builder.generate("ghost").unwrap();

            let summary = f.builder.rehash().unwrap();
            assert_eq!(summary.written, vec!["jq".to_string(), "rg".to_string()]);
            assert_eq!(summary.pruned, vec!["ghost".to_string()]);
            assert!(f.registry.layout().shim_path("jq").is_file());
            assert!(!f.registry.layout().shim_path("ghost").exists());
        });
    }
}

//! # Registry
//!
//! The authoritative record of installed (tool, version) pairs. Its state is
//! the union of the directory tree under `versions/` and one
//! `metadata.json` per pair; `is_installed` trusts the filesystem, never a
//! cached document. Records are created only by the installer (through
//! [`Registry::register`]) and destroyed only through [`Registry::remove`].

use crate::libs::config_store::ConfigStore;
use crate::libs::layout::Layout;
use crate::libs::utilities::timestamps;
use crate::libs::versioning;
use crate::schemas::errors::RegistryError;
use crate::schemas::version_metadata::{InstallSource, VersionMetadata};
use crate::{log_debug, log_warn};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Clone)]
pub struct Registry {
    layout: Layout,
}

impl Registry {
    pub fn new(layout: Layout) -> Registry {
        Registry { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Pure path computation; existence is not checked.
    pub fn binary_path(&self, tool: &str, version: &str) -> PathBuf {
        self.layout.binary_path(tool, version)
    }

    /// True iff the version's binary exists and is a regular file.
    pub fn is_installed(&self, tool: &str, version: &str) -> bool {
        self.layout.fs().is_file(&self.binary_path(tool, version))
    }

    /// Directory listing of `versions/<tool>/`, highest version last.
    /// Versions that do not parse sort after the ones that do, alphabetically.
    pub fn list_versions(&self, tool: &str) -> Vec<String> {
        let dir = self.layout.tool_versions_dir(tool);
        let mut versions: Vec<String> = self
            .layout
            .fs()
            .list_dir(&dir)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| self.layout.fs().is_dir(p))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        versions.sort_by(|a, b| match versioning::compare(a, b) {
            Some(ordering) => ordering,
            None => match (versioning::parse_lenient(a), versioning::parse_lenient(b)) {
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                _ => a.cmp(b),
            },
        });
        versions
    }

    /// All known tools: the union of installed version trees and descriptor
    /// files under `tools/`.
    pub fn list_tools(&self) -> Vec<String> {
        let fs = self.layout.fs();
        let mut tools: Vec<String> = fs
            .list_dir(&self.layout.versions_dir())
            .unwrap_or_default()
            .into_iter()
            .filter(|p| fs.is_dir(p))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        for entry in fs.list_dir(&self.layout.tools_dir()).unwrap_or_default() {
            if let Some(stem) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".toml"))
            {
                tools.push(stem.to_string());
            }
        }
        tools.sort();
        tools.dedup();
        tools
    }

    /// Reads the metadata record for an installed pair, if it exists and
    /// parses. A missing or corrupt record does not make the version
    /// uninstalled; the binary on disk is what counts.
    pub fn metadata(&self, tool: &str, version: &str) -> Option<VersionMetadata> {
        let path = self.layout.metadata_path(tool, version);
        let text = self.layout.fs().read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(meta) => Some(meta),
            Err(e) => {
                log_warn!(
                    "[Registry] Ignoring unreadable metadata at {}: {}",
                    path.display().to_string().yellow(),
                    e
                );
                None
            }
        }
    }

    /// Moves a binary into `versions/<tool>/<version>/bin/`, sets execute
    /// bits, writes `metadata.json`, and mirrors the install into the global
    /// config. A failure at any step rolls the half-written version
    /// directory back out so no partial record survives.
    pub fn register(
        &self,
        tool: &str,
        version: &str,
        src_binary: &std::path::Path,
        install_source: InstallSource,
        sha256: Option<String>,
        config: &ConfigStore,
    ) -> Result<VersionMetadata, RegistryError> {
        let fs = self.layout.fs();
        if !fs.is_file(src_binary) {
            return Err(RegistryError::BadSourceBinary {
                path: src_binary.to_path_buf(),
            });
        }

        let version_dir = self.layout.version_dir(tool, version);
        let binary_path = self.binary_path(tool, version);
        log_debug!(
            "[Registry] Registering {} {} from {}",
            tool.bold(),
            version,
            src_binary.display().to_string().cyan()
        );

        let result = (|| -> Result<VersionMetadata, RegistryError> {
            let io_err = |path: PathBuf| {
                move |source: std::io::Error| RegistryError::Io { path, source }
            };

            fs.create_dir_all(&self.layout.version_bin_dir(tool, version))
                .map_err(io_err(version_dir.clone()))?;

            // Rename first (atomic on the same filesystem); fall back to a
            // copy for cross-device sources like /tmp.
            if fs.rename(src_binary, &binary_path).is_err() {
                fs.copy(src_binary, &binary_path)
                    .map_err(io_err(binary_path.clone()))?;
            }
            fs.set_exec_bits(&binary_path)
                .map_err(io_err(binary_path.clone()))?;

            let metadata = VersionMetadata {
                tool: tool.to_string(),
                version: version.to_string(),
                install_path: version_dir.clone(),
                binary_path: binary_path.clone(),
                installed_at: timestamps::now(),
                install_source,
                size_bytes: fs
                    .file_size(&binary_path)
                    .map_err(io_err(binary_path.clone()))?,
                sha256,
            };

            let encoded = serde_json::to_vec_pretty(&metadata).map_err(|e| {
                RegistryError::Metadata {
                    tool: tool.to_string(),
                    version: version.to_string(),
                    message: e.to_string(),
                }
            })?;
            self.layout
                .atomic_write(&self.layout.metadata_path(tool, version), &encoded)
                .map_err(io_err(self.layout.metadata_path(tool, version)))?;

            Ok(metadata)
        })();

        match result {
            Ok(metadata) => {
                if let Err(e) = config.record_installed(tool, version) {
                    log_warn!(
                        "[Registry] Installed {} {} but could not update the global config: {}",
                        tool.bold(),
                        version,
                        e
                    );
                }
                Ok(metadata)
            }
            Err(e) => {
                // Partial copies leave no record behind.
                let _ = self.layout.remove_tree_path(&version_dir);
                Err(e)
            }
        }
    }

    /// Deletes `versions/<tool>/<version>/` and fixes up the global config.
    /// Re-entrant: a remove that failed half-way can simply be retried.
    pub fn remove(
        &self,
        tool: &str,
        version: &str,
        config: &ConfigStore,
    ) -> Result<(), RegistryError> {
        let version_dir = self.layout.version_dir(tool, version);
        if !self.layout.fs().exists(&version_dir) && !self.is_installed(tool, version) {
            return Err(RegistryError::NotInstalled {
                tool: tool.to_string(),
                version: version.to_string(),
            });
        }

        self.layout
            .remove_tree_path(&version_dir)
            .map_err(|source| RegistryError::Io {
                path: version_dir.clone(),
                source,
            })?;

        // Drop the now-empty tool directory so list_tools stays clean.
        let tool_dir = self.layout.tool_versions_dir(tool);
        if self
            .layout
            .fs()
            .list_dir(&tool_dir)
            .map(|entries| entries.is_empty())
            .unwrap_or(false)
        {
            let _ = self.layout.remove_tree_path(&tool_dir);
        }

        if let Err(e) = config.record_removed(tool, version, self) {
            log_warn!(
                "[Registry] Removed {} {} but could not update the global config: {}",
                tool.bold(),
                version,
                e
            );
        }
        Ok(())
    }
}

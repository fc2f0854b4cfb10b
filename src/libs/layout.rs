//! # On-Disk Layout
//!
//! Owns the canonical vman tree and every path computed inside it. The tree
//! lives under the per-OS config directory (or `$VMAN_HOME` when set):
//!
//! ```text
//! <root>/
//!   config.yaml                      global configuration
//!   tools/<tool>.toml                tool descriptors
//!   versions/<tool>/<version>/bin/<tool>[.exe]
//!   versions/<tool>/<version>/metadata.json
//!   shims/<tool>[.exe]               generated shim executables
//!   cache/                           downloaded artifacts kept for resume
//!   logs/
//!   tmp/                             installer scratch space
//! ```
//!
//! Path-returning methods are pure; only `ensure_tree`, `atomic_write` and
//! `remove_tree_path` touch the filesystem, and the latter refuses to delete
//! anything outside the tree.

use crate::libs::filesystem::FileSystem;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable overriding the tree root. Useful for tests and for
/// keeping several independent trees side by side.
pub const HOME_ENV_VAR: &str = "VMAN_HOME";

const APP_DIR_NAME: &str = "vman";

#[derive(Clone)]
pub struct Layout {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl Layout {
    /// Builds a layout rooted at `$VMAN_HOME` when set, else the per-OS
    /// config directory (`~/Library/Application Support/vman`,
    /// `$XDG_CONFIG_HOME/vman` / `~/.config/vman`, `%APPDATA%/vman`).
    /// Performs no I/O.
    pub fn discover(fs: Arc<dyn FileSystem>) -> io::Result<Layout> {
        if let Ok(home) = std::env::var(HOME_ENV_VAR) {
            if !home.trim().is_empty() {
                let expanded = shellexpand::tilde(&home).into_owned();
                return Ok(Layout::at(PathBuf::from(expanded), fs));
            }
        }
        let base = dirs::config_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "could not determine the user config directory (is HOME set?)",
            )
        })?;
        Ok(Layout::at(base.join(APP_DIR_NAME), fs))
    }

    /// Builds a layout rooted at an explicit directory.
    pub fn at(root: PathBuf, fs: Arc<dyn FileSystem>) -> Layout {
        Layout { root, fs }
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // Derived directories.

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn shims_dir(&self) -> PathBuf {
        self.root.join("shims")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    // Derived file paths.

    pub fn global_config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn descriptor_path(&self, tool: &str) -> PathBuf {
        self.tools_dir().join(format!("{tool}.toml"))
    }

    pub fn tool_versions_dir(&self, tool: &str) -> PathBuf {
        self.versions_dir().join(tool)
    }

    pub fn version_dir(&self, tool: &str, version: &str) -> PathBuf {
        self.tool_versions_dir(tool).join(version)
    }

    pub fn version_bin_dir(&self, tool: &str, version: &str) -> PathBuf {
        self.version_dir(tool, version).join("bin")
    }

    /// Where the executable for (tool, version) lives. Pure computation;
    /// existence is the registry's concern.
    pub fn binary_path(&self, tool: &str, version: &str) -> PathBuf {
        self.version_bin_dir(tool, version)
            .join(format!("{tool}{}", std::env::consts::EXE_SUFFIX))
    }

    pub fn metadata_path(&self, tool: &str, version: &str) -> PathBuf {
        self.version_dir(tool, version).join("metadata.json")
    }

    pub fn shim_path(&self, tool: &str) -> PathBuf {
        self.shims_dir()
            .join(format!("{tool}{}", std::env::consts::EXE_SUFFIX))
    }

    /// Creates the whole tree. Safe to call repeatedly.
    pub fn ensure_tree(&self) -> io::Result<()> {
        for dir in [
            self.root.clone(),
            self.tools_dir(),
            self.versions_dir(),
            self.shims_dir(),
            self.cache_dir(),
            self.logs_dir(),
            self.tmp_dir(),
        ] {
            self.fs.create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Writes `data` atomically: a sibling temp file is written and synced,
    /// then renamed over the target. Readers either see the old content or
    /// the new, never a torn file.
    pub fn atomic_write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target path has no parent")
        })?;
        self.fs.create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target path has no filename"))?;
        let tmp = parent.join(format!(".{file_name}.tmp.{}", std::process::id()));

        self.fs.write(&tmp, data)?;
        match self.fs.rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self.fs.remove_file(&tmp);
                Err(e)
            }
        }
    }

    /// Recursively deletes a path, but only when it is strictly inside the
    /// tree. Anything else is an error, not a no-op.
    pub fn remove_tree_path(&self, path: &Path) -> io::Result<()> {
        if !path.starts_with(&self.root) || path == self.root {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("refusing to delete {} (outside the vman tree)", path.display()),
            ));
        }
        if !self.fs.exists(path) {
            return Ok(());
        }
        if self.fs.is_dir(path) {
            self.fs.remove_dir_all(path)
        } else {
            self.fs.remove_file(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::filesystem::MemFileSystem;

    fn layout() -> Layout {
        Layout::at(PathBuf::from("/cfg/vman"), Arc::new(MemFileSystem::new()))
    }

    #[test]
    fn derived_paths_are_stable() {
        let l = layout();
        assert_eq!(
            l.binary_path("kubectl", "1.29.0"),
            PathBuf::from("/cfg/vman/versions/kubectl/1.29.0/bin/kubectl")
                .with_file_name(format!("kubectl{}", std::env::consts::EXE_SUFFIX))
        );
        assert_eq!(
            l.metadata_path("kubectl", "1.29.0"),
            PathBuf::from("/cfg/vman/versions/kubectl/1.29.0/metadata.json")
        );
        assert_eq!(l.descriptor_path("jq"), PathBuf::from("/cfg/vman/tools/jq.toml"));
    }

    #[test]
    fn ensure_tree_is_idempotent() {
        let l = layout();
        l.ensure_tree().unwrap();
        l.ensure_tree().unwrap();
        assert!(l.fs().is_dir(&l.shims_dir()));
        assert!(l.fs().is_dir(&l.tmp_dir()));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let l = layout();
        let path = l.global_config_path();
        l.atomic_write(&path, b"first").unwrap();
        l.atomic_write(&path, b"second").unwrap();
        assert_eq!(l.fs().read(&path).unwrap(), b"second");
        // No temp siblings left behind.
        let siblings = l.fs().list_dir(l.root()).unwrap();
        assert!(siblings.iter().all(|p| !p.to_string_lossy().contains(".tmp.")));
    }

    #[test]
    fn remove_tree_path_refuses_outside_root() {
        let l = layout();
        l.ensure_tree().unwrap();
        assert!(l.remove_tree_path(Path::new("/etc/passwd")).is_err());
        assert!(l.remove_tree_path(l.root()).is_err());
        // Inside the tree is fine, and missing paths are not an error.
        l.remove_tree_path(&l.version_dir("t", "1.0.0")).unwrap();
    }
}

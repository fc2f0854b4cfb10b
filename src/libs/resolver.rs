//! # Resolver
//!
//! The pure selection function: given a tool name and a working directory,
//! decide which installed version should run and where that decision came
//! from. Precedence, first match wins:
//!
//! 1. The nearest ancestor of `cwd` whose `.vman.yaml` pins the tool to an
//!    installed version (`project:<dir>`).
//! 2. `global_versions[tool]` (`global`).
//! 3. `tools[tool].current_version` (`global_tool`).
//!
//! A configured-but-not-installed version is an orphan: it is logged and
//! skipped, never allowed to short-circuit the next precedence level. The
//! pseudo-version `system` resolves as-is with source `system`; the
//! dispatcher then defers to `PATH`.

use crate::libs::config_store::ConfigStore;
use crate::libs::registry::Registry;
use crate::libs::versioning::{self, SYSTEM_VERSION};
use crate::schemas::errors::ResolveError;
use crate::{log_debug, log_warn};
use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a resolved version came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    Project(PathBuf),
    Global,
    GlobalTool,
    System,
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSource::Project(dir) => write!(f, "project:{}", dir.display()),
            VersionSource::Global => f.write_str("global"),
            VersionSource::GlobalTool => f.write_str("global_tool"),
            VersionSource::System => f.write_str("system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: String,
    pub source: VersionSource,
}

/// The derived view of "what would run here" across all known tools, plus
/// the per-tool source for diagnostics. Never persisted.
#[derive(Debug, Default)]
pub struct EffectiveConfig {
    pub versions: BTreeMap<String, String>,
    pub sources: BTreeMap<String, VersionSource>,
}

pub struct Resolver<'a> {
    config: &'a ConfigStore,
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a ConfigStore, registry: &'a Registry) -> Resolver<'a> {
        Resolver { config, registry }
    }

    /// Resolves one tool for one working directory.
    pub fn resolve(&self, tool: &str, cwd: &Path) -> Result<ResolvedVersion, ResolveError> {
        // 1. Project-local pins, nearest directory first.
        if let Some(resolved) = self.resolve_from_projects(tool, cwd) {
            return Ok(resolved);
        }

        let global = match self.config.load_global() {
            Ok(global) => global,
            Err(e) => {
                log_warn!("[Resolver] Could not read the global config: {}", e);
                return Err(ResolveError::Unresolved { tool: tool.to_string() });
            }
        };

        // 2. The explicit global pin.
        if let Some(pinned) = global.global_versions.get(tool) {
            if pinned == SYSTEM_VERSION {
                return Ok(system_resolution());
            }
            if let Some(version) = self.installed_version_for(tool, pinned) {
                return Ok(ResolvedVersion {
                    version,
                    source: VersionSource::Global,
                });
            }
            log_warn!(
                "[Resolver] Skipping orphan global pin {} {} (not installed).",
                tool.bold(),
                pinned.yellow()
            );
        }

        // 3. The registry mirror's current version.
        if let Some(current) = global
            .tools
            .get(tool)
            .and_then(|entry| entry.current_version.as_deref())
        {
            if current == SYSTEM_VERSION {
                return Ok(system_resolution());
            }
            if let Some(version) = self.installed_version_for(tool, current) {
                return Ok(ResolvedVersion {
                    version,
                    source: VersionSource::GlobalTool,
                });
            }
            log_warn!(
                "[Resolver] Skipping orphan current_version {} {} (not installed).",
                tool.bold(),
                current.yellow()
            );
        }

        Err(ResolveError::Unresolved { tool: tool.to_string() })
    }

    /// Walks from `cwd` to the filesystem root looking for the first
    /// `.vman.yaml` whose entry for `tool` points at an installed version.
    /// Files lacking the tool or pinning an orphan are skipped; the walk
    /// stops early below a `.git` marker (treated as the project boundary).
    /// The walk is purely lexical, so symlinked ancestors above the
    /// starting directory are never followed.
    fn resolve_from_projects(&self, tool: &str, cwd: &Path) -> Option<ResolvedVersion> {
        let fs = self.config.layout().fs();
        for dir in cwd.ancestors() {
            let marker = dir.join(crate::schemas::project_config::PROJECT_CONFIG_FILENAME);
            if fs.is_file(&marker) {
                match self.config.load_project(dir) {
                    Ok(project) => {
                        if let Some(pinned) = project.tools.get(tool) {
                            if pinned == SYSTEM_VERSION {
                                return Some(system_resolution());
                            }
                            if let Some(version) = self.installed_version_for(tool, pinned) {
                                return Some(ResolvedVersion {
                                    version,
                                    source: VersionSource::Project(dir.to_path_buf()),
                                });
                            }
                            log_warn!(
                                "[Resolver] Skipping orphan project pin {} {} in {} (not installed).",
                                tool.bold(),
                                pinned.yellow(),
                                dir.display()
                            );
                        }
                    }
                    Err(e) => {
                        log_warn!(
                            "[Resolver] Ignoring unreadable project config in {}: {}",
                            dir.display(),
                            e
                        );
                    }
                }
            }
            // A VCS root bounds the search: configs above it belong to
            // someone else's tree.
            if fs.is_dir(&dir.join(".git")) {
                log_debug!("[Resolver] Stopping project search at VCS root {}", dir.display());
                break;
            }
        }
        None
    }

    /// Maps a configured version string to an installed concrete version:
    /// descriptor aliases are expanded first, then the built-in
    /// `latest`/`stable` names fall back to the highest installed version
    /// (pre-releases only eligible for `latest`). Returns `None` when the
    /// result has no registry record.
    fn installed_version_for(&self, tool: &str, configured: &str) -> Option<String> {
        let descriptor = self.config.load_tool(tool).ok();
        let expanded = descriptor
            .as_ref()
            .map(|d| d.expand_alias(configured).to_string())
            .unwrap_or_else(|| configured.to_string());

        if expanded == "latest" || expanded == "stable" {
            let installed = self.registry.list_versions(tool);
            return versioning::highest(&installed, expanded == "latest");
        }

        if self.registry.is_installed(tool, &expanded) {
            Some(expanded)
        } else {
            None
        }
    }

    /// Builds the effective view for `cwd` across every tool that appears
    /// in the registry, the global document, or a reachable project file.
    pub fn effective_config(&self, cwd: &Path) -> EffectiveConfig {
        let mut tools: Vec<String> = self.registry.list_tools();
        if let Ok(global) = self.config.load_global() {
            tools.extend(global.global_versions.keys().cloned());
            tools.extend(global.tools.keys().cloned());
        }
        for dir in cwd.ancestors() {
            if let Ok(project) = self.config.load_project(dir) {
                tools.extend(project.tools.keys().cloned());
            }
        }
        tools.sort();
        tools.dedup();

        let mut effective = EffectiveConfig::default();
        for tool in tools {
            if let Ok(resolved) = self.resolve(&tool, cwd) {
                effective.versions.insert(tool.clone(), resolved.version);
                effective.sources.insert(tool, resolved.source);
            }
        }
        effective
    }
}

fn system_resolution() -> ResolvedVersion {
    ResolvedVersion {
        version: SYSTEM_VERSION.to_string(),
        source: VersionSource::System,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::filesystem::{FileSystem, MemFileSystem};
    use crate::libs::layout::Layout;
    use crate::schemas::version_metadata::InstallSource;
    use std::sync::Arc;

    struct Fixture {
        config: ConfigStore,
        registry: Registry,
    }

    fn fixture() -> Fixture {
        let fs: Arc<dyn FileSystem> = Arc::new(MemFileSystem::new());
        let layout = Layout::at(PathBuf::from("/tree"), fs);
        layout.ensure_tree().unwrap();
        Fixture {
            config: ConfigStore::new(layout.clone()),
            registry: Registry::new(layout),
        }
    }

    impl Fixture {
        fn resolver(&self) -> Resolver<'_> {
            Resolver::new(&self.config, &self.registry)
        }

        fn install(&self, tool: &str, version: &str) {
            let src = self.registry.layout().tmp_dir().join(format!("{tool}-{version}"));
            self.registry.layout().fs().write(&src, b"bin").unwrap();
            self.registry
                .register(tool, version, &src, InstallSource::Download, None, &self.config)
                .unwrap();
        }

        fn write_project(&self, dir: &str, yaml: &str) {
            let dir = PathBuf::from(dir);
            self.config.layout().fs().create_dir_all(&dir).unwrap();
            self.config
                .layout()
                .fs()
                .write(&dir.join(".vman.yaml"), yaml.as_bytes())
                .unwrap();
        }

        fn pin_global(&self, tool: &str, version: &str) {
            self.config
                .update_global(|doc| {
                    doc.global_versions
                        .insert(tool.to_string(), version.to_string());
                })
                .unwrap();
        }
    }

    #[test]
    fn project_overrides_global() {
        let f = fixture();
        f.install("kubectl", "1.28.0");
        f.install("kubectl", "1.29.0");
        f.pin_global("kubectl", "1.28.0");
        f.write_project("/p", "version: \"1.0\"\ntools:\n  kubectl: 1.29.0\n");
        f.config.layout().fs().create_dir_all(Path::new("/p/sub")).unwrap();

        let resolved = f.resolver().resolve("kubectl", Path::new("/p/sub")).unwrap();
        assert_eq!(resolved.version, "1.29.0");
        assert_eq!(resolved.source, VersionSource::Project(PathBuf::from("/p")));
    }

    #[test]
    fn orphan_project_pin_falls_through_to_global() {
        let f = fixture();
        f.install("kubectl", "1.29.0");
        f.pin_global("kubectl", "1.29.0");
        // The project pins a version that is not installed.
        f.write_project("/p", "version: \"1.0\"\ntools:\n  kubectl: 1.30.0\n");

        let resolved = f.resolver().resolve("kubectl", Path::new("/p")).unwrap();
        assert_eq!(resolved.version, "1.29.0");
        assert_eq!(resolved.source, VersionSource::Global);
    }

    #[test]
    fn global_tool_current_version_is_the_last_resort() {
        let f = fixture();
        f.install("jq", "1.7.0");
        // register() recorded current_version = 1.7.0; no explicit pin exists.
        let resolved = f.resolver().resolve("jq", Path::new("/anywhere")).unwrap();
        assert_eq!(resolved.version, "1.7.0");
        assert_eq!(resolved.source, VersionSource::GlobalTool);
    }

    #[test]
    fn unresolved_when_nothing_is_configured() {
        let f = fixture();
        match f.resolver().resolve("ghost", Path::new("/")) {
            Err(ResolveError::Unresolved { tool }) => assert_eq!(tool, "ghost"),
            other => panic!("expected Unresolved, got {other:?}"),
        }
    }

    #[test]
    fn system_pseudo_version_passes_through() {
        let f = fixture();
        f.pin_global("node", "system");
        let resolved = f.resolver().resolve("node", Path::new("/")).unwrap();
        assert_eq!(resolved.version, "system");
        assert_eq!(resolved.source, VersionSource::System);
    }

    #[test]
    fn latest_alias_resolves_to_highest_installed() {
        let f = fixture();
        f.install("rg", "13.0.0");
        f.install("rg", "14.1.0");
        f.install("rg", "15.0.0-rc.1");
        f.pin_global("rg", "latest");

        let resolved = f.resolver().resolve("rg", Path::new("/")).unwrap();
        assert_eq!(resolved.version, "15.0.0-rc.1");

        // 'stable' skips the pre-release.
        f.pin_global("rg", "stable");
        let resolved = f.resolver().resolve("rg", Path::new("/")).unwrap();
        assert_eq!(resolved.version, "14.1.0");
    }

    #[test]
    fn nested_project_files_nearest_installed_entry_wins() {
        let f = fixture();
        f.install("kubectl", "1.28.0");
        f.install("kubectl", "1.29.0");
        // Outer project pins an installed version; inner one lacks the tool.
        f.write_project("/outer", "version: \"1.0\"\ntools:\n  kubectl: 1.28.0\n");
        f.write_project("/outer/inner", "version: \"1.0\"\ntools:\n  jq: 1.7.0\n");

        let resolved = f
            .resolver()
            .resolve("kubectl", Path::new("/outer/inner"))
            .unwrap();
        assert_eq!(resolved.version, "1.28.0");
        assert_eq!(
            resolved.source,
            VersionSource::Project(PathBuf::from("/outer"))
        );
    }

    #[test]
    fn effective_config_reports_sources() {
        let f = fixture();
        f.install("jq", "1.7.0");
        f.install("kubectl", "1.29.0");
        f.pin_global("kubectl", "1.29.0");

        let effective = f.resolver().effective_config(Path::new("/"));
        assert_eq!(effective.versions["jq"], "1.7.0");
        assert_eq!(effective.sources["jq"], VersionSource::GlobalTool);
        assert_eq!(effective.sources["kubectl"], VersionSource::Global);
    }
}

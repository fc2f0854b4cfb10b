//! # Config Store
//!
//! Loads, validates and persists the three document kinds: the global
//! `config.yaml`, per-project `.vman.yaml` files, and per-tool TOML
//! descriptors. Writers go through an in-process lock and the layout's
//! atomic write, so a document is never observed half-written; cross-process
//! writers are not defended against.
//!
//! Interested parties can [`ConfigStore::subscribe`] to a channel of
//! [`ConfigEvent`]s; every successful save publishes one. Publishing never
//! blocks or fails a save: dead receivers are simply pruned.

use crate::libs::layout::Layout;
use crate::libs::registry::Registry;
use crate::libs::versioning;
use crate::schemas::errors::{ConfigError, ValidationError};
use crate::schemas::global_config::GlobalConfig;
use crate::schemas::project_config::{PROJECT_CONFIG_FILENAME, ProjectConfig};
use crate::schemas::tool_descriptor::ToolDescriptor;
use crate::{log_debug, log_info};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

/// Which document a change event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigDocument {
    Global,
    Project(PathBuf),
    Tool(String),
}

/// Published after every successful save.
#[derive(Debug, Clone)]
pub struct ConfigEvent {
    pub document: ConfigDocument,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct ConfigStore {
    layout: Layout,
    /// Serializes read-modify-write cycles on the global document.
    write_lock: Arc<Mutex<()>>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<ConfigEvent>>>>,
}

/// One entry dropped by `cleanup_orphans`, for the command's summary line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanEntry {
    /// Where the entry lived: "global_versions", "tools.current_version",
    /// or "tools.installed_versions".
    pub location: &'static str,
    pub tool: String,
    pub version: String,
}

impl ConfigStore {
    pub fn new(layout: Layout) -> ConfigStore {
        ConfigStore {
            layout,
            write_lock: Arc::new(Mutex::new(())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the receiving end of the change feed. Each subscriber gets
    /// its own channel; events fan out to all of them.
    pub fn subscribe(&self) -> mpsc::Receiver<ConfigEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn publish(&self, event: ConfigEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        // A send only fails when the receiver is gone; prune as we go.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Distinguishes a schema violation (unknown field) from a syntax
    /// error, so the user gets the validation taxonomy the docs promise.
    fn map_parse_error(path: &Path, message: String) -> ConfigError {
        if message.contains("unknown field") {
            ConfigError::Validation(ValidationError::new(
                "<document>",
                message,
                path.display().to_string(),
            ))
        } else {
            ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            }
        }
    }

    // ------------------------------------------------------------------
    // Global config
    // ------------------------------------------------------------------

    /// Loads `config.yaml`, returning a fully-defaulted document when the
    /// file is absent. Bounds and unknown fields are validated on the way in.
    pub fn load_global(&self) -> Result<GlobalConfig, ConfigError> {
        let path = self.layout.global_config_path();
        if !self.layout.fs().is_file(&path) {
            log_debug!("[Config] No global config at {}; using defaults.", path.display());
            return Ok(GlobalConfig::default());
        }
        let text = self
            .layout
            .fs()
            .read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let config: GlobalConfig = serde_yaml::from_str(&text)
            .map_err(|e| Self::map_parse_error(&path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates and atomically persists the global document, then
    /// publishes a change event.
    pub fn save_global(&self, config: &GlobalConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let path = self.layout.global_config_path();
        let text = serde_yaml::to_string(config).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let _guard = self.write_lock.lock().unwrap();
        self.layout
            .atomic_write(&path, text.as_bytes())
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        drop(_guard);
        self.publish(ConfigEvent {
            document: ConfigDocument::Global,
            path,
        });
        Ok(())
    }

    /// Read-modify-write on the global document under the writer lock, so
    /// two in-process updaters cannot interleave their edits.
    pub fn update_global<F>(&self, mutate: F) -> Result<GlobalConfig, ConfigError>
    where
        F: FnOnce(&mut GlobalConfig),
    {
        let _guard = self.write_lock.lock().unwrap();
        let mut config = self.load_global_unlocked()?;
        mutate(&mut config);
        config.validate()?;
        let path = self.layout.global_config_path();
        let text = serde_yaml::to_string(&config).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        self.layout
            .atomic_write(&path, text.as_bytes())
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        drop(_guard);
        self.publish(ConfigEvent {
            document: ConfigDocument::Global,
            path,
        });
        Ok(config)
    }

    fn load_global_unlocked(&self) -> Result<GlobalConfig, ConfigError> {
        // Same as load_global; split out so update_global can hold the lock
        // across the whole cycle without re-entering it.
        let path = self.layout.global_config_path();
        if !self.layout.fs().is_file(&path) {
            return Ok(GlobalConfig::default());
        }
        let text = self
            .layout
            .fs()
            .read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let config: GlobalConfig = serde_yaml::from_str(&text)
            .map_err(|e| Self::map_parse_error(&path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    // ------------------------------------------------------------------
    // Project config
    // ------------------------------------------------------------------

    /// Loads `<dir>/.vman.yaml`, returning defaults when missing. Never
    /// traverses parent directories; the upward walk is the resolver's job.
    pub fn load_project(&self, dir: &Path) -> Result<ProjectConfig, ConfigError> {
        let path = dir.join(PROJECT_CONFIG_FILENAME);
        if !self.layout.fs().is_file(&path) {
            return Ok(ProjectConfig::default());
        }
        let text = self
            .layout
            .fs()
            .read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let config: ProjectConfig = serde_yaml::from_str(&text)
            .map_err(|e| Self::map_parse_error(&path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates and atomically persists a project document.
    pub fn save_project(&self, dir: &Path, config: &ProjectConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let path = dir.join(PROJECT_CONFIG_FILENAME);
        let text = serde_yaml::to_string(config).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        // Project files live outside the tree, so this writes directly
        // through the filesystem capability with a temp-and-rename.
        let tmp = dir.join(format!(".{PROJECT_CONFIG_FILENAME}.tmp.{}", std::process::id()));
        self.layout
            .fs()
            .write(&tmp, text.as_bytes())
            .and_then(|_| self.layout.fs().rename(&tmp, &path))
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        self.publish(ConfigEvent {
            document: ConfigDocument::Project(dir.to_path_buf()),
            path,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tool descriptors
    // ------------------------------------------------------------------

    /// Loads and validates `tools/<name>.toml`. Unlike the other loaders,
    /// absence is an error: nothing can be fetched without a descriptor.
    pub fn load_tool(&self, name: &str) -> Result<ToolDescriptor, ConfigError> {
        let path = self.layout.descriptor_path(name);
        if !self.layout.fs().is_file(&path) {
            return Err(ConfigError::DescriptorNotFound(name.to_string()));
        }
        let text = self
            .layout
            .fs()
            .read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let descriptor: ToolDescriptor = toml::from_str(&text)
            .map_err(|e| Self::map_parse_error(&path, e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    // ------------------------------------------------------------------
    // Registry mirror maintenance
    // ------------------------------------------------------------------

    /// Records a fresh install in the `tools` mirror: appends to
    /// `installed_versions` and adopts the version as `current_version`
    /// when the tool had none.
    pub fn record_installed(&self, tool: &str, version: &str) -> Result<(), ConfigError> {
        self.update_global(|config| {
            let entry = config.tools.entry(tool.to_string()).or_default();
            if !entry.installed_versions.iter().any(|v| v == version) {
                entry.installed_versions.push(version.to_string());
            }
            if entry.current_version.is_none() {
                entry.current_version = Some(version.to_string());
            }
        })
        .map(|_| ())
    }

    /// Fixes the mirror up after a removal: the version disappears from
    /// `installed_versions`, `current_version` falls back to the highest
    /// remaining one, an emptied tool entry is dropped entirely, and a
    /// `global_versions` pin pointing at the removed version goes with it.
    pub fn record_removed(
        &self,
        tool: &str,
        version: &str,
        registry: &Registry,
    ) -> Result<(), ConfigError> {
        let remaining = registry.list_versions(tool);
        self.update_global(|config| {
            if let Some(entry) = config.tools.get_mut(tool) {
                entry.installed_versions.retain(|v| v != version);
                if entry.current_version.as_deref() == Some(version) {
                    entry.current_version = versioning::highest(&remaining, true);
                }
                if entry.installed_versions.is_empty() {
                    config.tools.remove(tool);
                }
            }
            if config.global_versions.get(tool).map(String::as_str) == Some(version) {
                config.global_versions.remove(tool);
            }
        })
        .map(|_| ())
    }

    /// Whether a configured version counts as an orphan: reserved names
    /// never do (they are resolved specially), everything else must pass
    /// `Registry::is_installed` after descriptor alias expansion.
    fn is_orphan(&self, registry: &Registry, tool: &str, version: &str) -> bool {
        if versioning::is_reserved(version) {
            return false;
        }
        let expanded = match self.load_tool(tool) {
            Ok(descriptor) => descriptor.expand_alias(version).to_string(),
            Err(_) => version.to_string(),
        };
        !registry.is_installed(tool, &expanded)
    }

    /// Walks every version reference in the global document and drops the
    /// ones with no registry record. Returns what was dropped.
    pub fn cleanup_orphans(&self, registry: &Registry) -> Result<Vec<OrphanEntry>, ConfigError> {
        let mut dropped = Vec::new();
        let config = self.load_global()?;

        for (tool, version) in &config.global_versions {
            if self.is_orphan(registry, tool, version) {
                dropped.push(OrphanEntry {
                    location: "global_versions",
                    tool: tool.clone(),
                    version: version.clone(),
                });
            }
        }
        for (tool, entry) in &config.tools {
            for version in &entry.installed_versions {
                if self.is_orphan(registry, tool, version) {
                    dropped.push(OrphanEntry {
                        location: "tools.installed_versions",
                        tool: tool.clone(),
                        version: version.clone(),
                    });
                }
            }
            if let Some(current) = &entry.current_version {
                if self.is_orphan(registry, tool, current) {
                    dropped.push(OrphanEntry {
                        location: "tools.current_version",
                        tool: tool.clone(),
                        version: current.clone(),
                    });
                }
            }
        }

        if dropped.is_empty() {
            return Ok(dropped);
        }

        let doomed = dropped.clone();
        self.update_global(move |config| {
            for orphan in &doomed {
                match orphan.location {
                    "global_versions" => {
                        config.global_versions.remove(&orphan.tool);
                    }
                    "tools.installed_versions" => {
                        if let Some(entry) = config.tools.get_mut(&orphan.tool) {
                            entry.installed_versions.retain(|v| *v != orphan.version);
                        }
                    }
                    "tools.current_version" => {
                        if let Some(entry) = config.tools.get_mut(&orphan.tool) {
                            entry.current_version = None;
                        }
                    }
                    _ => unreachable!("unknown orphan location"),
                }
            }
            // Tool entries whose installed list emptied out disappear.
            config
                .tools
                .retain(|_, entry| !entry.installed_versions.is_empty());
        })?;

        for orphan in &dropped {
            log_info!(
                "[Config] Dropped orphan {} {} from {}",
                orphan.tool.bold(),
                orphan.version,
                orphan.location.dimmed()
            );
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::filesystem::{FileSystem, MemFileSystem};
    use crate::schemas::version_metadata::InstallSource;
    use std::sync::Arc;

    fn fixture() -> (ConfigStore, Registry) {
        let fs: Arc<dyn FileSystem> = Arc::new(MemFileSystem::new());
        let layout = Layout::at(PathBuf::from("/tree"), fs);
        layout.ensure_tree().unwrap();
        (ConfigStore::new(layout.clone()), Registry::new(layout))
    }

    fn install(registry: &Registry, config: &ConfigStore, tool: &str, version: &str) {
        let src = registry.layout().tmp_dir().join(format!("{tool}-{version}"));
        registry.layout().fs().write(&src, b"bin").unwrap();
        registry
            .register(tool, version, &src, InstallSource::Download, None, config)
            .unwrap();
    }

    #[test]
    fn load_global_defaults_when_absent_and_roundtrips() {
        let (config, _) = fixture();
        let loaded = config.load_global().unwrap();
        assert!(loaded.global_versions.is_empty());

        let mut doc = loaded;
        doc.global_versions
            .insert("kubectl".to_string(), "1.29.0".to_string());
        config.save_global(&doc).unwrap();

        let reloaded = config.load_global().unwrap();
        assert_eq!(reloaded.global_versions["kubectl"], "1.29.0");
        assert_eq!(reloaded.settings.download.retries, doc.settings.download.retries);
    }

    #[test]
    fn unknown_top_level_field_is_a_validation_error() {
        let (config, _) = fixture();
        let path = config.layout().global_config_path();
        config
            .layout()
            .fs()
            .write(&path, b"version: \"1.0\"\nmystery: 1\n")
            .unwrap();
        match config.load_global() {
            Err(ConfigError::Validation(_)) => {}
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn load_project_does_not_traverse_parents() {
        let (config, _) = fixture();
        let parent = PathBuf::from("/projects");
        let child = parent.join("app/sub");
        config.layout().fs().create_dir_all(&child).unwrap();
        config
            .layout()
            .fs()
            .write(
                &parent.join(PROJECT_CONFIG_FILENAME),
                b"version: \"1.0\"\ntools:\n  jq: 1.7.0\n",
            )
            .unwrap();

        // The child directory itself has no project file, so defaults win.
        let loaded = config.load_project(&child).unwrap();
        assert!(loaded.tools.is_empty());
    }

    #[test]
    fn load_tool_requires_the_descriptor() {
        let (config, _) = fixture();
        assert!(matches!(
            config.load_tool("kubectl"),
            Err(ConfigError::DescriptorNotFound(_))
        ));
    }

    #[test]
    fn record_removed_promotes_the_highest_remaining_version() {
        let (config, registry) = fixture();
        install(&registry, &config, "kubectl", "1.9.0");
        install(&registry, &config, "kubectl", "1.10.0");

        // First install became current; remove it.
        let before = config.load_global().unwrap();
        assert_eq!(before.tools["kubectl"].current_version.as_deref(), Some("1.9.0"));
        registry.remove("kubectl", "1.9.0", &config).unwrap();

        let after = config.load_global().unwrap();
        assert_eq!(after.tools["kubectl"].current_version.as_deref(), Some("1.10.0"));
    }

    #[test]
    fn cleanup_drops_orphans_but_spares_reserved_names() {
        let (config, registry) = fixture();
        install(&registry, &config, "jq", "1.7.0");
        config
            .update_global(|doc| {
                doc.global_versions.insert("jq".to_string(), "9.9.9".to_string());
                doc.global_versions
                    .insert("node".to_string(), "system".to_string());
                doc.tools.entry("ghost".to_string()).or_default().installed_versions =
                    vec!["1.0.0".to_string()];
            })
            .unwrap();

        let dropped = config.cleanup_orphans(&registry).unwrap();
        assert_eq!(dropped.len(), 2);

        let doc = config.load_global().unwrap();
        // The orphaned pin and the ghost tool entry are gone...
        assert!(!doc.global_versions.contains_key("jq"));
        assert!(!doc.tools.contains_key("ghost"));
        // ...while the reserved 'system' pin and real installs survive.
        assert_eq!(doc.global_versions["node"], "system");
        assert!(doc.tools.contains_key("jq"));
    }

    #[test]
    fn saves_publish_events_to_subscribers() {
        let (config, _) = fixture();
        let events = config.subscribe();
        config.save_global(&GlobalConfig::default()).unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.document, ConfigDocument::Global);
        assert_eq!(event.path, config.layout().global_config_path());
    }
}

//! # Global Configuration Schema
//!
//! The single `config.yaml` document at the root of the vman tree. It holds
//! the default version selection (`global_versions`), a mirror of the
//! registry for display and selection (`tools`), and the `settings` block.
//!
//! Settings mutation goes through the [`Setting`] enum so the set of
//! recognized keys and their value types is closed at compile time; there is
//! no stringly-typed `set(key, value)` surface in the core.

use crate::libs::versioning;
use crate::logger::LogLevel;
use crate::schemas::errors::ValidationError;
use crate::schemas::tool_descriptor::is_valid_tool_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// The document schema version this build reads and writes.
pub const CONFIG_DOC_VERSION: &str = "1.0";

fn default_doc_version() -> String {
    CONFIG_DOC_VERSION.to_string()
}

/// The whole `config.yaml` document. Unknown top-level fields are a
/// validation error, caught by serde before field validation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    #[serde(default = "default_doc_version")]
    pub version: String,

    /// Default version selection per tool, consulted by the resolver after
    /// project-local pins.
    #[serde(default)]
    pub global_versions: BTreeMap<String, String>,

    /// Mirror of the registry, maintained by register/remove so `list` and
    /// selection UIs never need to scan the versions tree.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolVersions>,

    #[serde(default)]
    pub settings: Settings,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            version: default_doc_version(),
            global_versions: BTreeMap::new(),
            tools: BTreeMap::new(),
            settings: Settings::default(),
        }
    }
}

/// Per-tool mirror entry: which version is current and which are installed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolVersions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(default)]
    pub installed_versions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadSettings {
    /// Per-download timeout in seconds. Bounded to (0, 1800].
    pub timeout: u64,
    /// Local retries for transient network failures. Bounded to [0, 10].
    pub retries: u32,
    /// Size of the install worker pool. Bounded to [1, 10].
    pub concurrent_downloads: u32,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        DownloadSettings {
            timeout: 300,
            retries: 3,
            concurrent_downloads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySettings {
    pub enabled: bool,
    /// Whether `init` is expected to have put `shims/` on PATH. Informational
    /// for diagnostics; the dispatcher works either way.
    pub shims_in_path: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        ProxySettings {
            enabled: false,
            shims_in_path: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// One of `debug`, `info`, `warn`, `error`.
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl GlobalConfig {
    /// Validates the recognized fields against the schema bounds. Called on
    /// every load and before every save.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version != CONFIG_DOC_VERSION {
            return Err(ValidationError::new(
                "version",
                format!("unsupported config document version (expected \"{CONFIG_DOC_VERSION}\")"),
                &self.version,
            ));
        }

        let d = &self.settings.download;
        if d.timeout == 0 || d.timeout > 1800 {
            return Err(ValidationError::new(
                "settings.download.timeout",
                "must be between 1 and 1800 seconds",
                d.timeout,
            ));
        }
        if d.retries > 10 {
            return Err(ValidationError::new(
                "settings.download.retries",
                "must be between 0 and 10",
                d.retries,
            ));
        }
        if d.concurrent_downloads < 1 || d.concurrent_downloads > 10 {
            return Err(ValidationError::new(
                "settings.download.concurrent_downloads",
                "must be between 1 and 10",
                d.concurrent_downloads,
            ));
        }

        if LogLevel::parse(&self.settings.logging.level).is_none() {
            return Err(ValidationError::new(
                "settings.logging.level",
                "must be one of: debug, info, warn, error",
                &self.settings.logging.level,
            ));
        }

        for (tool, version) in &self.global_versions {
            if !is_valid_tool_name(tool) {
                return Err(ValidationError::new("global_versions", "invalid tool name", tool));
            }
            versioning::validate_version_string(version).map_err(|msg| {
                ValidationError::new(format!("global_versions.{tool}"), msg, version)
            })?;
        }

        for (tool, entry) in &self.tools {
            if !is_valid_tool_name(tool) {
                return Err(ValidationError::new("tools", "invalid tool name", tool));
            }
            for version in entry
                .installed_versions
                .iter()
                .chain(entry.current_version.iter())
            {
                versioning::validate_version_string(version).map_err(|msg| {
                    ValidationError::new(format!("tools.{tool}"), msg, version)
                })?;
            }
        }

        Ok(())
    }
}

/// Every recognized setting, with its value already parsed to the right
/// type. The CLI's `config set` goes through [`Setting::parse`]; the switch
/// in [`Settings::apply`] is total, so adding a variant without handling it
/// is a compile error.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    DownloadTimeout(Duration),
    DownloadRetries(u32),
    ConcurrentDownloads(u32),
    ProxyEnabled(bool),
    ShimsInPath(bool),
    LogLevel(LogLevel),
    LogFile(PathBuf),
}

impl Setting {
    /// Parses a dotted key and raw value into a typed setting.
    pub fn parse(key: &str, value: &str) -> Result<Setting, ValidationError> {
        let bad = |message: &str| ValidationError::new(key, message, value);
        match key {
            "download.timeout" => value
                .parse::<u64>()
                .ok()
                .filter(|s| *s >= 1 && *s <= 1800)
                .map(|s| Setting::DownloadTimeout(Duration::from_secs(s)))
                .ok_or_else(|| bad("must be a number of seconds between 1 and 1800")),
            "download.retries" => value
                .parse::<u32>()
                .ok()
                .filter(|r| *r <= 10)
                .map(Setting::DownloadRetries)
                .ok_or_else(|| bad("must be an integer between 0 and 10")),
            "download.concurrent_downloads" => value
                .parse::<u32>()
                .ok()
                .filter(|c| (1..=10).contains(c))
                .map(Setting::ConcurrentDownloads)
                .ok_or_else(|| bad("must be an integer between 1 and 10")),
            "proxy.enabled" => value
                .parse::<bool>()
                .map(Setting::ProxyEnabled)
                .map_err(|_| bad("must be true or false")),
            "proxy.shims_in_path" => value
                .parse::<bool>()
                .map(Setting::ShimsInPath)
                .map_err(|_| bad("must be true or false")),
            "logging.level" => LogLevel::parse(value)
                .map(Setting::LogLevel)
                .ok_or_else(|| bad("must be one of: debug, info, warn, error")),
            "logging.file" => Ok(Setting::LogFile(PathBuf::from(value))),
            _ => Err(ValidationError::new(
                key,
                "unrecognized setting key",
                value,
            )),
        }
    }
}

impl Settings {
    /// Applies a typed setting to this settings block.
    pub fn apply(&mut self, setting: Setting) {
        match setting {
            Setting::DownloadTimeout(d) => self.download.timeout = d.as_secs(),
            Setting::DownloadRetries(r) => self.download.retries = r,
            Setting::ConcurrentDownloads(c) => self.download.concurrent_downloads = c,
            Setting::ProxyEnabled(b) => self.proxy.enabled = b,
            Setting::ShimsInPath(b) => self.proxy.shims_in_path = b,
            Setting::LogLevel(l) => self.logging.level = l.as_str().to_string(),
            Setting::LogFile(p) => self.logging.file = Some(p),
        }
    }
}

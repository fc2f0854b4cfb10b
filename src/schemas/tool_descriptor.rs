//! # Tool Descriptor Schema
//!
//! A tool descriptor is the immutable metadata for one managed tool, stored
//! as `tools/<name>.toml` inside the vman tree. It tells the installer where
//! releases come from (`fetch`), which HTTP headers to attach, and how
//! user-facing version aliases map onto concrete versions.
//!
//! ## Example descriptor
//!
//! ```toml
//! # tools/kubectl.toml
//! name = "kubectl"
//! description = "Kubernetes command-line client"
//! homepage = "https://kubernetes.io"
//!
//! [fetch]
//! type = "direct"
//! url_template = "https://dl.k8s.io/release/v{version}/bin/{os}/{arch}/kubectl"
//! ```

use crate::schemas::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable metadata for a managed tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique identifier; also the shim name. ASCII `[A-Za-z0-9_-]{1,50}`.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Informational URL; must be `http(s)://` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// Informational URL; must be `http(s)://` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Where releases of this tool come from.
    pub fetch: FetchSource,

    /// HTTP headers attached to every fetch request for this tool
    /// (e.g. an auth token for a private release host).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// User-defined alias -> concrete version mappings. Built-in alias names
    /// (`latest`, `stable`, `main`, `master`) may be overridden here.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub version_aliases: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_constraints: Option<VersionConstraints>,
}

/// The fetch variant, tagged by `type` in the TOML table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FetchSource {
    /// A GitHub repository's Releases page.
    Github {
        /// `owner/repo` form.
        repository: String,
        /// Optional regex with `{os}`, `{arch}` and `{version}` placeholders
        /// used to select one asset per release. Without it, the default
        /// platform matcher applies.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset_pattern: Option<String>,
    },

    /// A single file at a templated URL.
    Direct {
        /// URL with `{version}`, `{os}` and `{arch}` placeholders.
        url_template: String,
        /// Expected SHA-256 of the artifact, verified after download.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },

    /// Same as `Direct`, but the downloaded file is an archive that the
    /// extractor must unpack.
    Archive {
        url_template: String,
        /// Exact basename of the binary to pick out of the extracted tree.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extract_binary: Option<String>,
        /// Expected SHA-256 of the archive, verified after download.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
}

/// Optional semver bounds applied to concrete versions; aliases are exempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<String>,
}

/// Checks the tool-name grammar: ASCII letters, digits, `_` and `-`,
/// between 1 and 50 characters.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 50
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl ToolDescriptor {
    /// Validates the descriptor's fields against the schema rules.
    /// Runs on every load so a hand-edited descriptor fails early with a
    /// field-level message instead of surfacing mid-install.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_tool_name(&self.name) {
            return Err(ValidationError::new(
                "name",
                "tool names are 1-50 ASCII letters, digits, '_' or '-'",
                &self.name,
            ));
        }

        for (field, url) in [("homepage", &self.homepage), ("repository", &self.repository)] {
            if let Some(url) = url {
                if !is_http_url(url) {
                    return Err(ValidationError::new(
                        field,
                        "must be an http(s):// URL",
                        url,
                    ));
                }
            }
        }

        match &self.fetch {
            FetchSource::Github { repository, asset_pattern } => {
                let mut parts = repository.splitn(2, '/');
                let owner = parts.next().unwrap_or("");
                let repo = parts.next().unwrap_or("");
                if owner.is_empty() || repo.is_empty() || repo.contains('/') {
                    return Err(ValidationError::new(
                        "fetch.repository",
                        "must be in 'owner/repo' form",
                        repository,
                    ));
                }
                if let Some(pattern) = asset_pattern {
                    // Placeholders are substituted before compilation, so
                    // validate the substituted form.
                    let probe = pattern
                        .replace("{os}", "linux")
                        .replace("{arch}", "x86_64")
                        .replace("{version}", "0.0.0");
                    if let Err(e) = regex::Regex::new(&probe) {
                        return Err(ValidationError::new(
                            "fetch.asset_pattern",
                            format!("not a valid regex: {e}"),
                            pattern,
                        ));
                    }
                }
            }
            FetchSource::Direct { url_template, .. }
            | FetchSource::Archive { url_template, .. } => {
                if !is_http_url(url_template) {
                    return Err(ValidationError::new(
                        "fetch.url_template",
                        "must be an http(s):// URL template",
                        url_template,
                    ));
                }
            }
        }

        Ok(())
    }

    /// Expands a version alias through the descriptor's mapping. Unmapped
    /// names (including the built-in aliases) pass through unchanged.
    pub fn expand_alias<'a>(&'a self, version: &'a str) -> &'a str {
        self.version_aliases
            .get(version)
            .map(String::as_str)
            .unwrap_or(version)
    }
}

//! # Project Configuration Schema
//!
//! One `.vman.yaml` per project directory, pinning tool versions for that
//! project and everything beneath it. Loaded by the config store for the
//! directory it names; the upward search over parents belongs to the
//! resolver, not here.

use crate::libs::versioning;
use crate::schemas::errors::ValidationError;
use crate::schemas::global_config::CONFIG_DOC_VERSION;
use crate::schemas::tool_descriptor::is_valid_tool_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filename looked for at the root of a project directory.
pub const PROJECT_CONFIG_FILENAME: &str = ".vman.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default = "default_doc_version")]
    pub version: String,

    /// tool -> pinned version (or alias, or `system`).
    #[serde(default)]
    pub tools: BTreeMap<String, String>,
}

fn default_doc_version() -> String {
    CONFIG_DOC_VERSION.to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            version: default_doc_version(),
            tools: BTreeMap::new(),
        }
    }
}

impl ProjectConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version != CONFIG_DOC_VERSION {
            return Err(ValidationError::new(
                "version",
                format!("unsupported project config version (expected \"{CONFIG_DOC_VERSION}\")"),
                &self.version,
            ));
        }
        for (tool, version) in &self.tools {
            if !is_valid_tool_name(tool) {
                return Err(ValidationError::new("tools", "invalid tool name", tool));
            }
            versioning::validate_version_string(version)
                .map_err(|msg| ValidationError::new(format!("tools.{tool}"), msg, version))?;
        }
        Ok(())
    }
}

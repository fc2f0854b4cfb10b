//! # Installed Version Record
//!
//! One `metadata.json` per installed (tool, version) pair, written next to
//! the binary under `versions/<tool>/<version>/`. Registry state is the
//! union of the directory tree and these records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a version ended up in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallSource {
    /// Fetched by the installer pipeline.
    Download,
    /// Imported from an existing local binary via `vman register`.
    Manual,
}

/// The durable record for one installed (tool, version) pair.
///
/// Invariant: `binary_path` exists, is a regular file, and carries execute
/// bits on POSIX (or the `.exe` suffix on Windows). `is_installed` checks
/// the filesystem half of that invariant on every call rather than trusting
/// this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub tool: String,
    pub version: String,

    /// Directory owned exclusively by this record.
    pub install_path: PathBuf,

    /// Absolute path of the executable inside `install_path`.
    pub binary_path: PathBuf,

    pub installed_at: DateTime<Utc>,
    pub install_source: InstallSource,
    pub size_bytes: u64,

    /// SHA-256 of the binary, when the pipeline computed or verified one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

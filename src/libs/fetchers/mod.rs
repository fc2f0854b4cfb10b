//! # Fetch Strategies
//!
//! A strategy knows how to locate and download one artifact per (tool,
//! version) from a particular kind of source. Three exist: GitHub releases,
//! direct URLs, and archive URLs (direct plus forced extraction). They share
//! the [`FetchStrategy`] contract; the installer composes them with the
//! retry combinator and the HTTP engine.

pub mod direct;
pub mod github;
pub mod retry;

use crate::schemas::errors::FetchError;
use crate::schemas::global_config::DownloadSettings;
use crate::schemas::tool_descriptor::{FetchSource, ToolDescriptor};
use std::collections::HashMap;
use std::time::Duration;

/// Everything the installer needs to fetch one artifact.
#[derive(Debug, Clone)]
pub struct DownloadInfo {
    pub url: String,
    /// Filename the artifact should be stored under; its suffix drives
    /// archive detection.
    pub filename: String,
    pub size: Option<u64>,
    /// Expected SHA-256, when the source publishes one.
    pub checksum: Option<String>,
    /// Headers to attach to the artifact request.
    pub headers: HashMap<String, String>,
    /// Forces extraction even when the filename has no archive suffix
    /// (the `archive` fetch variant).
    pub force_extract: bool,
    /// Basename to pick out of the extracted tree, from the descriptor.
    pub extract_binary: Option<String>,
}

/// One remotely available version, as reported by `list_versions`.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub version: String,
    pub prerelease: bool,
    pub published_at: Option<String>,
}

/// The common contract all fetch sources implement.
pub trait FetchStrategy: Send + Sync {
    /// Resolves a concrete version to a downloadable artifact.
    fn download_info(&self, version: &str) -> Result<DownloadInfo, FetchError>;

    /// Enumerates remotely available versions, newest first.
    /// `Err(Unsupported)` for sources that cannot enumerate.
    fn list_versions(&self) -> Result<Vec<VersionInfo>, FetchError>;

    /// The newest version the source advertises.
    fn latest_version(&self) -> Result<String, FetchError>;

    /// Cheap existence probe: `Ok(())` or `Err(NotFound)`.
    fn validate(&self, version: &str) -> Result<(), FetchError>;

    /// Whether interrupted downloads from this source may be resumed.
    fn supports_resume(&self) -> bool;
}

/// Selects and configures the strategy for a descriptor.
pub fn strategy_for(
    descriptor: &ToolDescriptor,
    settings: &DownloadSettings,
) -> Box<dyn FetchStrategy> {
    let timeout = Duration::from_secs(settings.timeout);
    match &descriptor.fetch {
        FetchSource::Github { repository, asset_pattern } => Box::new(github::GithubStrategy::new(
            descriptor.name.clone(),
            repository.clone(),
            asset_pattern.clone(),
            descriptor.headers.clone(),
            timeout,
        )),
        FetchSource::Direct { url_template, sha256 } => Box::new(direct::DirectStrategy::new(
            url_template.clone(),
            descriptor.headers.clone(),
            timeout,
            false,
            None,
            sha256.clone(),
        )),
        FetchSource::Archive { url_template, extract_binary, sha256 } => {
            Box::new(direct::DirectStrategy::new(
                url_template.clone(),
                descriptor.headers.clone(),
                timeout,
                true,
                extract_binary.clone(),
                sha256.clone(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn descriptor(fetch: FetchSource) -> ToolDescriptor {
        ToolDescriptor {
            name: "tool".to_string(),
            description: None,
            homepage: None,
            repository: None,
            fetch,
            headers: HashMap::new(),
            version_aliases: HashMap::new(),
            version_constraints: None,
        }
    }

    #[test]
    fn archive_variant_forces_extraction() {
        let d = descriptor(FetchSource::Archive {
            url_template: "https://example.com/tool-{version}.bin".to_string(),
            extract_binary: Some("tool".to_string()),
            sha256: None,
        });
        let strategy = strategy_for(&d, &DownloadSettings::default());
        let info = strategy.download_info("1.0.0").unwrap();
        assert!(info.force_extract);
        assert_eq!(info.extract_binary.as_deref(), Some("tool"));
    }

    #[test]
    fn direct_variant_does_not_force_extraction() {
        let d = descriptor(FetchSource::Direct {
            url_template: "https://example.com/tool-{version}".to_string(),
            sha256: None,
        });
        let strategy = strategy_for(&d, &DownloadSettings::default());
        let info = strategy.download_info("1.0.0").unwrap();
        assert!(!info.force_extract);
        assert_eq!(info.url, "https://example.com/tool-1.0.0");
    }
}

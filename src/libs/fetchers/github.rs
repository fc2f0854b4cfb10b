//! GitHub Releases fetch strategy. Talks to the GitHub REST API to
//! enumerate releases, resolve version tags (with or without a leading
//! `v`), and select the one asset that fits the running platform, either
//! through the descriptor's `asset_pattern` or the default matcher.

use crate::libs::fetchers::{DownloadInfo, FetchStrategy, VersionInfo};
use crate::libs::utilities::http;
use crate::libs::utilities::platform;
use crate::libs::versioning;
use crate::schemas::errors::FetchError;
use crate::{log_debug, log_warn};
use colored::Colorize;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Environment variable carrying a GitHub token, attached as a bearer
/// credential to raise the API rate limit and reach private releases.
pub const GITHUB_TOKEN_ENV_VAR: &str = "VMAN_GITHUB_TOKEN";

/// Environment override for the API endpoint; integration tests point this
/// at a local fixture server.
pub const GITHUB_API_ENV_VAR: &str = "VMAN_GITHUB_API";

const DEFAULT_API_BASE: &str = "https://api.github.com";
const RELEASES_PER_PAGE: usize = 100;
const MAX_RELEASE_PAGES: usize = 10;

/// The slice of the GitHub release JSON this strategy consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
}

pub struct GithubStrategy {
    tool: String,
    repository: String,
    asset_pattern: Option<String>,
    headers: HashMap<String, String>,
    timeout: Duration,
}

impl GithubStrategy {
    pub fn new(
        tool: String,
        repository: String,
        asset_pattern: Option<String>,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> GithubStrategy {
        GithubStrategy {
            tool,
            repository,
            asset_pattern,
            headers,
            timeout,
        }
    }

    fn api_base() -> String {
        std::env::var(GITHUB_API_ENV_VAR).unwrap_or_else(|_| DEFAULT_API_BASE.to_string())
    }

    /// Headers for API calls: the v3 Accept header, the descriptor's own
    /// headers, and a bearer token when the environment provides one.
    fn api_headers(&self) -> HashMap<String, String> {
        let mut headers = self.headers.clone();
        headers
            .entry("Accept".to_string())
            .or_insert_with(|| "application/vnd.github.v3+json".to_string());
        if let Ok(token) = std::env::var(GITHUB_TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                headers
                    .entry("Authorization".to_string())
                    .or_insert_with(|| format!("Bearer {}", token.trim()));
            }
        }
        headers
    }

    fn get(&self, path: &str) -> Result<serde_json::Value, FetchError> {
        let url = format!("{}{path}", Self::api_base());
        http::get_json(&url, &self.api_headers(), self.timeout)
    }

    /// Fetches the release for a version, trying the tag as given, with a
    /// leading `v`, and without one.
    fn fetch_release(&self, version: &str) -> Result<Release, FetchError> {
        let bare = versioning::strip_v_prefix(version);
        let mut candidates = vec![version.to_string()];
        for alt in [format!("v{bare}"), bare.to_string()] {
            if !candidates.contains(&alt) {
                candidates.push(alt);
            }
        }

        let mut last = None;
        for tag in candidates {
            match self.get(&format!("/repos/{}/releases/tags/{tag}", self.repository)) {
                Ok(json) => {
                    return serde_json::from_value(json).map_err(|e| {
                        FetchError::Network(format!("unexpected release payload: {e}"))
                    });
                }
                Err(FetchError::Http { status: 404, .. }) => {
                    log_debug!("[Fetch::GitHub] No release tagged '{}'.", tag.dimmed());
                    last = Some(FetchError::NotFound {
                        version: version.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or(FetchError::NotFound {
            version: version.to_string(),
        }))
    }

    /// Picks the single asset for this platform. With an `asset_pattern`,
    /// the substituted regex decides; otherwise the default matcher tries
    /// exact OS+arch, then OS-only, then falls back to the first asset.
    fn select_asset<'r>(
        &self,
        release: &'r Release,
        version: &str,
    ) -> Result<&'r ReleaseAsset, FetchError> {
        let os = platform::detect_os();
        let arch = platform::detect_arch();

        if release.assets.is_empty() {
            return Err(FetchError::NoMatchingAsset { os, arch });
        }

        if let Some(pattern) = &self.asset_pattern {
            let substituted = platform::substitute_placeholders(
                pattern,
                &os,
                &arch,
                versioning::strip_v_prefix(version),
            );
            let regex = regex::Regex::new(&substituted)
                .map_err(|e| FetchError::Network(format!("bad asset_pattern: {e}")))?;
            return release
                .assets
                .iter()
                .find(|a| regex.is_match(&a.name))
                .ok_or(FetchError::NoMatchingAsset { os, arch });
        }

        if let Some(asset) = release
            .assets
            .iter()
            .find(|a| platform::asset_matches_platform(&a.name, &os, &arch))
        {
            return Ok(asset);
        }
        if let Some(asset) = release
            .assets
            .iter()
            .find(|a| platform::asset_matches_os_only(&a.name, &os))
        {
            log_debug!(
                "[Fetch::GitHub] No OS+arch asset for {}; using OS-only match {}.",
                self.tool.bold(),
                asset.name.cyan()
            );
            return Ok(asset);
        }

        let first = &release.assets[0];
        log_warn!(
            "[Fetch::GitHub] No asset of {} matches {}-{}; falling back to the first asset '{}'.",
            self.repository.bold(),
            os,
            arch,
            first.name.yellow()
        );
        Ok(first)
    }
}

impl FetchStrategy for GithubStrategy {
    fn download_info(&self, version: &str) -> Result<DownloadInfo, FetchError> {
        let release = self.fetch_release(version)?;
        let asset = self.select_asset(&release, version)?;
        log_debug!(
            "[Fetch::GitHub] Selected asset {} for {} {}.",
            asset.name.green(),
            self.tool.bold(),
            version
        );
        Ok(DownloadInfo {
            url: asset.browser_download_url.clone(),
            filename: asset.name.clone(),
            size: asset.size,
            checksum: None,
            headers: self.headers.clone(),
            force_extract: false,
            extract_binary: None,
        })
    }

    /// Pages through `releases`, newest first, mapping tags to versions
    /// (leading `v` stripped).
    fn list_versions(&self) -> Result<Vec<VersionInfo>, FetchError> {
        let mut versions = Vec::new();
        for page in 1..=MAX_RELEASE_PAGES {
            let json = self.get(&format!(
                "/repos/{}/releases?per_page={RELEASES_PER_PAGE}&page={page}",
                self.repository
            ))?;
            let releases: Vec<Release> = serde_json::from_value(json)
                .map_err(|e| FetchError::Network(format!("unexpected releases payload: {e}")))?;
            let count = releases.len();
            for release in releases {
                versions.push(VersionInfo {
                    version: versioning::strip_v_prefix(&release.tag_name).to_string(),
                    prerelease: release.prerelease,
                    published_at: release.published_at,
                });
            }
            if count < RELEASES_PER_PAGE {
                break;
            }
        }
        Ok(versions)
    }

    fn latest_version(&self) -> Result<String, FetchError> {
        let json = self.get(&format!("/repos/{}/releases/latest", self.repository))?;
        let release: Release = serde_json::from_value(json)
            .map_err(|e| FetchError::Network(format!("unexpected release payload: {e}")))?;
        Ok(versioning::strip_v_prefix(&release.tag_name).to_string())
    }

    fn validate(&self, version: &str) -> Result<(), FetchError> {
        self.fetch_release(version).map(|_| ())
    }

    fn supports_resume(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(pattern: Option<&str>) -> GithubStrategy {
        GithubStrategy::new(
            "gh".to_string(),
            "cli/cli".to_string(),
            pattern.map(String::from),
            HashMap::new(),
            Duration::from_secs(30),
        )
    }

    fn release(assets: &[&str]) -> Release {
        Release {
            tag_name: "v1.0.0".to_string(),
            prerelease: false,
            published_at: None,
            assets: assets
                .iter()
                .map(|name| ReleaseAsset {
                    name: name.to_string(),
                    browser_download_url: format!("https://example.com/{name}"),
                    size: Some(1024),
                })
                .collect(),
        }
    }

    #[test]
    fn pattern_matching_substitutes_placeholders() {
        let s = strategy(Some(r"gh_{version}_{os}_{arch}\.tar\.gz"));
        let os = platform::detect_os();
        let arch = platform::detect_arch();
        let matching = format!("gh_1.0.0_{os}_{arch}.tar.gz");
        let r = release(&["gh_1.0.0_checksums.txt", &matching]);

        let asset = s.select_asset(&r, "v1.0.0").unwrap();
        assert_eq!(asset.name, matching);
    }

    #[test]
    fn default_matcher_prefers_exact_platform() {
        let s = strategy(None);
        let os = platform::detect_os();
        let arch = platform::detect_arch();
        let exact = format!("gh-{os}-{arch}.tar.gz");
        let os_only = format!("gh-{os}.tar.gz");
        let r = release(&["gh-plan9-mips.tar.gz", &os_only, &exact]);

        let asset = s.select_asset(&r, "1.0.0").unwrap();
        assert_eq!(asset.name, exact);
    }

    #[test]
    fn default_matcher_falls_back_to_os_then_first() {
        let s = strategy(None);
        let os = platform::detect_os();
        let os_only = format!("gh-{os}.tar.gz");
        let r = release(&["gh-plan9-mips.tar.gz", &os_only]);
        assert_eq!(s.select_asset(&r, "1.0.0").unwrap().name, os_only);

        let r = release(&["gh-plan9-mips.tar.gz", "gh-amiga.tar.gz"]);
        assert_eq!(s.select_asset(&r, "1.0.0").unwrap().name, "gh-plan9-mips.tar.gz");
    }

    #[test]
    fn empty_asset_list_is_no_match() {
        let s = strategy(None);
        let r = release(&[]);
        assert!(matches!(
            s.select_asset(&r, "1.0.0"),
            Err(FetchError::NoMatchingAsset { .. })
        ));
    }
}

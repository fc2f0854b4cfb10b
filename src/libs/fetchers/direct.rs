//! Direct-URL fetch strategy: one templated URL per version, with `{os}`,
//! `{arch}` and `{version}` placeholders. The archive variant is the same
//! strategy with extraction forced. Enumeration is impossible for a bare
//! URL, so `list_versions`/`latest_version` report `Unsupported`.

use crate::libs::fetchers::{DownloadInfo, FetchStrategy, VersionInfo};
use crate::libs::utilities::http;
use crate::libs::utilities::platform;
use crate::libs::versioning;
use crate::log_debug;
use crate::schemas::errors::FetchError;
use colored::Colorize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub struct DirectStrategy {
    url_template: String,
    headers: HashMap<String, String>,
    timeout: Duration,
    force_extract: bool,
    extract_binary: Option<String>,
    checksum: Option<String>,
}

impl DirectStrategy {
    pub fn new(
        url_template: String,
        headers: HashMap<String, String>,
        timeout: Duration,
        force_extract: bool,
        extract_binary: Option<String>,
        checksum: Option<String>,
    ) -> DirectStrategy {
        DirectStrategy {
            url_template,
            headers,
            timeout,
            force_extract,
            extract_binary,
            checksum,
        }
    }

    fn url_for(&self, version: &str) -> String {
        // Templates conventionally take the bare version; a leading 'v'
        // belongs in the template itself when the host wants one.
        let bare = versioning::strip_v_prefix(version);
        platform::substitute_placeholders(
            &self.url_template,
            &platform::detect_os(),
            &platform::detect_arch(),
            bare,
        )
    }
}

impl FetchStrategy for DirectStrategy {
    fn download_info(&self, version: &str) -> Result<DownloadInfo, FetchError> {
        let url = self.url_for(version);
        let filename = Path::new(&url)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("{version}-download"));
        log_debug!(
            "[Fetch::Direct] {} resolves to {}",
            version.bold(),
            url.cyan()
        );
        Ok(DownloadInfo {
            url,
            filename,
            size: None,
            checksum: self.checksum.clone(),
            headers: self.headers.clone(),
            force_extract: self.force_extract,
            extract_binary: self.extract_binary.clone(),
        })
    }

    fn list_versions(&self) -> Result<Vec<VersionInfo>, FetchError> {
        Err(FetchError::Unsupported)
    }

    fn latest_version(&self) -> Result<String, FetchError> {
        Err(FetchError::Unsupported)
    }

    /// `HEAD`-probes the templated URL. A 404 means the version does not
    /// exist; servers that refuse `HEAD` get the benefit of the doubt.
    fn validate(&self, version: &str) -> Result<(), FetchError> {
        let url = self.url_for(version);
        match http::probe(&url, &self.headers, self.timeout) {
            Ok(_) => Ok(()),
            Err(FetchError::Http { status: 404, .. }) => Err(FetchError::NotFound {
                version: version.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    fn supports_resume(&self) -> bool {
        true
    }
}

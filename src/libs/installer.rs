//! # Installer
//!
//! Orchestrates one `install(tool, version)` pipeline end to end:
//! descriptor -> strategy -> validate -> download (with resume and retry)
//! -> checksum -> extract -> select binary -> smoke check -> register.
//!
//! Artifacts download into `cache/` under a deterministic name, which is
//! what makes cross-invocation resume possible; extraction happens in a
//! unique scratch directory under `tmp/` that is deleted on success. A
//! failed pipeline leaves nothing under `versions/`.
//!
//! Concurrent installs of the same (tool, version) deduplicate through a
//! single-inflight map: the first caller runs, later callers block on its
//! outcome and observe the same result. Independent pairs run freely on a
//! worker pool bounded by `settings.download.concurrent_downloads`.

use crate::libs::config_store::ConfigStore;
use crate::libs::fetchers::retry::{RetryPolicy, with_retry};
use crate::libs::fetchers::{DownloadInfo, FetchStrategy, strategy_for};
use crate::libs::registry::Registry;
use crate::libs::utilities::binary;
use crate::libs::utilities::checksum;
use crate::libs::utilities::compression;
use crate::libs::utilities::http::{CancelToken, DownloadRequest, ProgressFn};
use crate::libs::versioning;
use crate::schemas::errors::{
    ConfigError, FetchError, InstallError, InstallErrorCode, RegistryError, classify_io,
};
use crate::schemas::global_config::Settings;
use crate::schemas::tool_descriptor::ToolDescriptor;
use crate::schemas::version_metadata::InstallSource;
use crate::{log_debug, log_info};
use colored::Colorize;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Knobs for one install run.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Re-run the pipeline even when the version is already installed.
    pub force: bool,
    /// Skip checksum verification even when the source publishes one.
    pub skip_checksum: bool,
    /// Keep the downloaded artifact in `cache/` after a successful install.
    pub keep_download: bool,
}

/// A successful outcome: either work was done, or there was nothing to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Installed {
    Fresh { version: String },
    AlreadyInstalled { version: String },
}

impl Installed {
    pub fn version(&self) -> &str {
        match self {
            Installed::Fresh { version } | Installed::AlreadyInstalled { version } => version,
        }
    }
}

/// Install failures split into configuration problems (bad descriptor,
/// unknown tool) and pipeline failures carrying the error-code envelope.
#[derive(Debug, Error)]
pub enum InstallerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] InstallError),
}

/// Outcome shared with waiters of a deduplicated pipeline.
#[derive(Debug, Clone)]
enum SharedOutcome {
    Success(Installed),
    Failure {
        code: InstallErrorCode,
        cause: String,
        url: Option<String>,
    },
}

#[derive(Default)]
struct Inflight {
    outcome: Mutex<Option<SharedOutcome>>,
    done: Condvar,
}

pub struct Installer {
    config: ConfigStore,
    registry: Registry,
    inflight: Mutex<HashMap<(String, String), Arc<Inflight>>>,
}

impl Installer {
    pub fn new(config: ConfigStore, registry: Registry) -> Installer {
        Installer {
            config,
            registry,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the version request for a tool: aliases expand through the
    /// descriptor, an absent or `latest` request asks the source, and the
    /// result is normalized (leading `v` stripped) and constraint-checked.
    pub fn resolve_version_request(
        &self,
        descriptor: &ToolDescriptor,
        strategy: &dyn FetchStrategy,
        requested: Option<&str>,
    ) -> Result<String, InstallerError> {
        let requested = requested.unwrap_or("latest");
        let expanded = descriptor.expand_alias(requested).to_string();

        let concrete = if expanded == "latest" || expanded == "stable" {
            strategy.latest_version().map_err(|e| {
                self.pipeline_error(&descriptor.name, requested, None, map_fetch_code(&e), &e)
            })?
        } else {
            expanded
        };
        let version = versioning::strip_v_prefix(&concrete).to_string();

        if let Some(constraints) = &descriptor.version_constraints {
            versioning::check_constraints(&version, constraints).map_err(|msg| {
                InstallerError::Config(ConfigError::Validation(
                    crate::schemas::errors::ValidationError::new(
                        "version_constraints",
                        msg,
                        &version,
                    ),
                ))
            })?;
        }
        Ok(version)
    }

    /// Installs one (tool, version). `requested` may be a concrete version,
    /// an alias, or `None` for the source's latest.
    pub fn install(
        &self,
        tool: &str,
        requested: Option<&str>,
        options: InstallOptions,
        cancel: &CancelToken,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Installed, InstallerError> {
        let descriptor = self.config.load_tool(tool)?;
        let settings = self.config.load_global()?.settings;
        let strategy = strategy_for(&descriptor, &settings.download);
        let version = self.resolve_version_request(&descriptor, strategy.as_ref(), requested)?;

        // Idempotence: an installed version without --force is a no-op.
        if !options.force && self.registry.is_installed(tool, &version) {
            log_info!(
                "[Install] {} {} is already installed.",
                tool.bold(),
                version.green()
            );
            return Ok(Installed::AlreadyInstalled {
                version: version.clone(),
            });
        }

        // Single-inflight guard: only the first caller for a pair runs the
        // pipeline; everyone else waits for its outcome.
        let key = (tool.to_string(), version.clone());
        let (handle, runner) = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(&key) {
                Some(handle) => (Arc::clone(handle), false),
                None => {
                    let handle = Arc::new(Inflight::default());
                    inflight.insert(key.clone(), Arc::clone(&handle));
                    (handle, true)
                }
            }
        };

        if !runner {
            log_debug!(
                "[Install] Another pipeline for {} {} is in flight; waiting on it.",
                tool.bold(),
                version
            );
            let mut outcome = handle.outcome.lock().unwrap();
            while outcome.is_none() {
                outcome = handle.done.wait(outcome).unwrap();
            }
            return match outcome.clone().unwrap() {
                SharedOutcome::Success(installed) => Ok(installed),
                SharedOutcome::Failure { code, cause, url } => Err(InstallerError::Pipeline(
                    InstallError::new(tool, &version, url, code, cause),
                )),
            };
        }

        let result = self.run_pipeline(
            &descriptor,
            strategy.as_ref(),
            &version,
            &settings,
            options,
            cancel,
            progress,
        );

        // Publish the outcome and retire the inflight slot.
        let shared = match &result {
            Ok(installed) => SharedOutcome::Success(installed.clone()),
            Err(InstallerError::Pipeline(e)) => SharedOutcome::Failure {
                code: e.code,
                cause: e.cause.clone(),
                url: e.url.clone(),
            },
            Err(InstallerError::Config(e)) => SharedOutcome::Failure {
                code: InstallErrorCode::ExtractionError,
                cause: e.to_string(),
                url: None,
            },
        };
        *handle.outcome.lock().unwrap() = Some(shared);
        handle.done.notify_all();
        self.inflight.lock().unwrap().remove(&key);

        result
    }

    /// Runs several install requests on a worker pool bounded by
    /// `concurrent_downloads`. Results come back in request order.
    pub fn install_many(
        &self,
        requests: &[(String, Option<String>)],
        options: InstallOptions,
        cancel: &CancelToken,
    ) -> Vec<Result<Installed, InstallerError>> {
        let workers = self
            .config
            .load_global()
            .map(|g| g.settings.download.concurrent_downloads as usize)
            .unwrap_or(1)
            .max(1)
            .min(requests.len().max(1));

        let queue: Mutex<VecDeque<usize>> = Mutex::new((0..requests.len()).collect());
        let results: Mutex<Vec<Option<Result<Installed, InstallerError>>>> =
            Mutex::new((0..requests.len()).map(|_| None).collect());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = match queue.lock().unwrap().pop_front() {
                            Some(index) => index,
                            None => break,
                        };
                        let (tool, requested) = &requests[index];
                        let result =
                            self.install(tool, requested.as_deref(), options, cancel, None);
                        results.lock().unwrap()[index] = Some(result);
                    }
                });
            }
        });

        results
            .into_inner()
            .unwrap()
            .into_iter()
            .map(|r| r.expect("worker left a request unprocessed"))
            .collect()
    }

    fn pipeline_error(
        &self,
        tool: &str,
        version: &str,
        url: Option<String>,
        code: InstallErrorCode,
        cause: impl ToString,
    ) -> InstallerError {
        InstallerError::Pipeline(InstallError::new(tool, version, url, code, cause))
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pipeline(
        &self,
        descriptor: &ToolDescriptor,
        strategy: &dyn FetchStrategy,
        version: &str,
        settings: &Settings,
        options: InstallOptions,
        cancel: &CancelToken,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Installed, InstallerError> {
        let tool = descriptor.name.as_str();
        let layout = self.registry.layout().clone();
        let policy = RetryPolicy::from_settings(&settings.download);
        let timeout = Duration::from_secs(settings.download.timeout);

        // Stage 1: the source must know this version at all.
        with_retry(&policy, |_| strategy.validate(version)).map_err(|e| {
            self.pipeline_error(tool, version, None, map_fetch_code(&e), &e)
        })?;

        // Stage 2: where the artifact lives.
        let info: DownloadInfo = with_retry(&policy, |_| strategy.download_info(version))
            .map_err(|e| self.pipeline_error(tool, version, None, map_fetch_code(&e), &e))?;
        let url = info.url.clone();
        let fail = |code: InstallErrorCode, cause: &dyn std::fmt::Display| {
            self.pipeline_error(tool, version, Some(url.clone()), code, cause)
        };

        log_info!(
            "[Install] Fetching {} {} from {}",
            tool.bold(),
            version.green(),
            info.url.cyan()
        );

        // Stage 3: download into the cache under a deterministic name so an
        // interrupted transfer resumes next run.
        std::fs::create_dir_all(layout.cache_dir())
            .map_err(|e| fail(classify_io(&e), &e))?;
        let artifact = layout
            .cache_dir()
            .join(format!("{tool}-{version}-{}", info.filename));

        let resume = strategy.supports_resume();
        with_retry(&policy, |attempt| {
            log_debug!("[Install] Download attempt {} for {} {}.", attempt, tool, version);
            crate::libs::utilities::http::download(&DownloadRequest {
                url: &info.url,
                dest: &artifact,
                headers: &info.headers,
                timeout,
                resume,
                cancel,
                progress,
            })
            .map(|_| ())
        })
        .map_err(|e| fail(map_fetch_code(&e), &e))?;

        // Stage 4: checksum, when one is expected.
        if let (Some(expected), false) = (&info.checksum, options.skip_checksum) {
            let actual = checksum::sha256_file(&artifact).map_err(|e| fail(classify_io(&e), &e))?;
            if !checksum::digests_match(expected, &actual) {
                // A corrupt artifact must not survive for a later resume.
                let _ = std::fs::remove_file(&artifact);
                return Err(fail(
                    InstallErrorCode::ChecksumMismatch,
                    &format!("expected sha256 {expected}, got {actual}"),
                ));
            }
        }

        // Stage 5: extract into a unique scratch directory under tmp/.
        std::fs::create_dir_all(layout.tmp_dir()).map_err(|e| fail(classify_io(&e), &e))?;
        let workdir = tempfile::Builder::new()
            .prefix(&format!("vman-install-{tool}-"))
            .tempdir_in(layout.tmp_dir())
            .map_err(|e| fail(classify_io(&e), &e))?;

        let extract_dir = workdir.path().join("extracted");
        compression::extract_archive(&artifact, &extract_dir)
            .map_err(|e| fail(InstallErrorCode::ExtractionError, &e))?;

        // Stage 6: find the binary and make sure it is a real executable.
        let selected = binary::select_binary(&extract_dir, tool, info.extract_binary.as_deref())
            .map_err(|e| fail(InstallErrorCode::ExtractionError, &e))?;
        if !binary::is_smoke_clean(&selected) {
            return Err(fail(
                InstallErrorCode::CorruptedFile,
                &format!(
                    "{} does not look like an executable (truncated download?)",
                    selected.display()
                ),
            ));
        }

        // Stage 7: hand over to the registry; it owns rollback from here.
        let sha256 = checksum::sha256_file(&selected).ok();
        self.registry
            .register(tool, version, &selected, InstallSource::Download, sha256, &self.config)
            .map_err(|e| match &e {
                RegistryError::Io { source, .. } => fail(classify_io(source), &e),
                other => fail(InstallErrorCode::ExtractionError, other),
            })?;

        // Stage 8: scratch space goes away with the TempDir guard; the
        // cached artifact only survives on request.
        if !options.keep_download {
            let _ = std::fs::remove_file(&artifact);
        }
        drop(workdir);

        log_info!(
            "[Install] Installed {} {} successfully.",
            tool.bold(),
            version.bright_green()
        );
        Ok(Installed::Fresh {
            version: version.to_string(),
        })
    }
}

/// Maps fetch-layer failures onto the installer's code taxonomy.
fn map_fetch_code(e: &FetchError) -> InstallErrorCode {
    match e {
        FetchError::NotFound { .. } | FetchError::Unsupported | FetchError::NoMatchingAsset { .. } => {
            InstallErrorCode::VersionNotFound
        }
        FetchError::Io(io) => classify_io(io),
        _ => InstallErrorCode::NetworkError,
    }
}

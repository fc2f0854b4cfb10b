//! # HTTP Download Engine
//!
//! The one place network bytes enter the system. Wraps `ureq` with the
//! behaviors every fetch strategy shares: per-download timeout, cooperative
//! cancellation, `Range`-based resume when the server advertises it, and a
//! progress callback throttled to one invocation per 100 ms.
//!
//! Cancellation and timeout both abort the transfer but keep the partial
//! file on disk so a later attempt can resume it.

use crate::log_debug;
use crate::schemas::errors::FetchError;
use colored::Colorize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Minimum interval between two progress callback invocations.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation token checked at every suspension point of a
/// download. Cloneable; any holder may cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// What a download reports while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Connecting,
    Downloading,
    Resuming,
    Done,
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub downloaded: u64,
    pub total: Option<u64>,
    pub bytes_per_sec: u64,
    pub eta: Option<Duration>,
    pub status: ProgressStatus,
}

pub type ProgressFn<'a> = &'a (dyn Fn(&Progress) + Send + Sync);

/// Result of a `HEAD` probe: content length and whether byte ranges are
/// supported, which together decide resumability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Probe {
    pub size: Option<u64>,
    pub accepts_ranges: bool,
}

/// One download, fully described.
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    pub dest: &'a Path,
    pub headers: &'a HashMap<String, String>,
    /// Hard wall-clock budget for the whole transfer.
    pub timeout: Duration,
    /// Attempt to continue a partial file at `dest` when possible.
    pub resume: bool,
    pub cancel: &'a CancelToken,
    pub progress: Option<ProgressFn<'a>>,
}

fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout.min(Duration::from_secs(20)))
        // Per-read timeout; the overall budget is enforced in the copy loop.
        .timeout_read(timeout.min(Duration::from_secs(60)))
        .user_agent(concat!("vman/", env!("CARGO_PKG_VERSION")))
        .build()
}

fn map_ureq_error(url: &str, err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(status, _) => FetchError::Http {
            status,
            url: url.to_string(),
        },
        ureq::Error::Transport(t) => FetchError::Network(t.to_string()),
    }
}

fn apply_headers(mut req: ureq::Request, headers: &HashMap<String, String>) -> ureq::Request {
    for (name, value) in headers {
        req = req.set(name, value);
    }
    req
}

/// `HEAD`-probes a URL for size and resume support. Servers that reject
/// `HEAD` outright are reported as non-resumable rather than an error.
pub fn probe(
    url: &str,
    headers: &HashMap<String, String>,
    timeout: Duration,
) -> Result<Probe, FetchError> {
    let request = apply_headers(agent(timeout).head(url), headers);
    match request.call() {
        Ok(response) => {
            let size = response
                .header("Content-Length")
                .and_then(|v| v.parse::<u64>().ok());
            let accepts_ranges = response
                .header("Accept-Ranges")
                .map(|v| v.eq_ignore_ascii_case("bytes"))
                .unwrap_or(false);
            Ok(Probe { size, accepts_ranges })
        }
        Err(ureq::Error::Status(405, _)) | Err(ureq::Error::Status(501, _)) => {
            log_debug!("[Http] Server rejected HEAD for {}; treating as non-resumable.", url.dimmed());
            Ok(Probe::default())
        }
        Err(e) => Err(map_ureq_error(url, e)),
    }
}

/// Downloads `req.url` into `req.dest`, resuming a partial file when the
/// request allows it and the server advertises `Accept-Ranges: bytes`.
/// Returns the total size of the file on disk afterwards.
pub fn download(req: &DownloadRequest) -> Result<u64, FetchError> {
    let started = Instant::now();
    let deadline = started + req.timeout;

    emit(req, 0, None, started, ProgressStatus::Connecting);

    // Decide whether this run continues an earlier partial file.
    let existing = if req.resume && req.dest.exists() {
        std::fs::metadata(req.dest).map(|m| m.len()).unwrap_or(0)
    } else {
        0
    };

    let mut offset = 0u64;
    let mut request = apply_headers(agent(req.timeout).get(req.url), req.headers);
    if existing > 0 {
        let served = probe(req.url, req.headers, req.timeout)?;
        // A completed file needs no request at all.
        if served.size == Some(existing) {
            log_debug!("[Http] {} already fully downloaded ({} bytes).", req.dest.display(), existing);
            emit(req, existing, served.size, started, ProgressStatus::Done);
            return Ok(existing);
        }
        if served.accepts_ranges {
            request = request.set("Range", &format!("bytes={existing}-"));
            offset = existing;
            log_debug!(
                "[Http] Resuming {} at byte {} of {:?}.",
                req.url.dimmed(),
                existing,
                served.size
            );
        }
    }

    let response = request.call().map_err(|e| map_ureq_error(req.url, e))?;

    // A 200 despite our Range header means the server restarted from zero.
    if offset > 0 && response.status() != 206 {
        offset = 0;
    }

    let total = response
        .header("Content-Length")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|remaining| remaining + offset);

    let mut file = if offset > 0 {
        OpenOptions::new().append(true).open(req.dest)?
    } else {
        std::fs::File::create(req.dest)?
    };

    let status = if offset > 0 {
        ProgressStatus::Resuming
    } else {
        ProgressStatus::Downloading
    };

    let mut reader = response.into_reader();
    let mut downloaded = offset;
    let mut last_emit: Option<Instant> = None;
    let mut buf = [0u8; 64 * 1024];

    loop {
        if req.cancel.is_cancelled() {
            // Partial file is deliberately kept for a later resume.
            file.flush()?;
            return Err(FetchError::Cancelled);
        }
        if Instant::now() > deadline {
            file.flush()?;
            return Err(FetchError::TimedOut {
                seconds: req.timeout.as_secs(),
            });
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                file.flush()?;
                return Err(FetchError::Io(e));
            }
        };
        file.write_all(&buf[..n])?;
        downloaded += n as u64;

        if last_emit.map_or(true, |t| t.elapsed() >= PROGRESS_INTERVAL) {
            emit(req, downloaded, total, started, status);
            last_emit = Some(Instant::now());
        }
    }

    file.flush()?;
    emit(req, downloaded, total, started, ProgressStatus::Done);
    Ok(downloaded)
}

/// Fetches a URL into memory; used for API responses, not artifacts.
pub fn get_json(
    url: &str,
    headers: &HashMap<String, String>,
    timeout: Duration,
) -> Result<serde_json::Value, FetchError> {
    let request = apply_headers(agent(timeout).get(url), headers);
    let response = request.call().map_err(|e| map_ureq_error(url, e))?;
    response
        .into_json()
        .map_err(|e| FetchError::Network(format!("invalid JSON from {url}: {e}")))
}

fn emit(
    req: &DownloadRequest,
    downloaded: u64,
    total: Option<u64>,
    started: Instant,
    status: ProgressStatus,
) {
    let Some(callback) = req.progress else { return };
    let elapsed = started.elapsed().as_secs_f64();
    let bytes_per_sec = if elapsed > 0.0 {
        (downloaded as f64 / elapsed) as u64
    } else {
        0
    };
    let eta = match (total, bytes_per_sec) {
        (Some(total), speed) if speed > 0 && total > downloaded => {
            Some(Duration::from_secs((total - downloaded) / speed))
        }
        _ => None,
    };
    callback(&Progress {
        downloaded,
        total,
        bytes_per_sec,
        eta,
        status,
    });
}

//! # Error Taxonomy
//!
//! Every failure the core can produce is one of the kinds defined here.
//! Pipeline stages wrap lower-level failures with contextual metadata
//! (tool, version, url) on the way up; the command layer turns the top-level
//! error into a single stderr line and a non-zero exit code.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A malformed configuration field, reported with enough context for the
/// user to fix the document: the field path, what was wrong, and the
/// offending value.
#[derive(Debug, Clone, Error)]
#[error("invalid config field '{field}': {message} (got: '{value}')")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub value: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
            value: value.to_string(),
        }
    }
}

/// Failures while loading or persisting configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `load_tool` was asked for a descriptor that does not exist.
    #[error("no tool descriptor found for '{0}' (expected tools/{0}.toml)")]
    DescriptorNotFound(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Resolution outcomes that are not a version: either nothing is configured
/// for the tool, or the configured version has no registry record.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("no version configured for '{tool}' (try: vman install {tool})")]
    Unresolved { tool: String },

    #[error("'{tool}' {version} is not installed (try: vman install {tool} {version})")]
    NotInstalled { tool: String, version: String },
}

/// Failures from a fetch strategy. `is_transient` decides what the retry
/// combinator may re-attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The strategy cannot enumerate or probe remote versions (direct URLs).
    #[error("operation not supported by this fetch source")]
    Unsupported,

    /// The remote source has no such version.
    #[error("version '{version}' not found at the remote source")]
    NotFound { version: String },

    /// Transport-level failure: connect error, DNS, broken stream.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The per-download timeout elapsed.
    #[error("download timed out after {seconds}s")]
    TimedOut { seconds: u64 },

    /// The operation's cancellation token fired.
    #[error("download cancelled")]
    Cancelled,

    /// A release carried no asset usable on this platform.
    #[error("no release asset matches this platform ({os}-{arch})")]
    NoMatchingAsset { os: String, arch: String },

    #[error("failed to write download to disk: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    /// Connect failures, 5xx responses and broken reads are worth retrying;
    /// everything else is deterministic and surfaces immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::TimedOut { .. } => true,
            FetchError::Http { status, .. } => *status >= 500,
            FetchError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Failures while unpacking a downloaded artifact.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("archive is malformed: {0}")]
    Malformed(String),

    /// Every entry in the archive escaped the target directory.
    #[error("archive contains only unsafe paths")]
    UnsafePathsOnly,

    /// Extraction succeeded but nothing in the tree looks like the binary.
    #[error("no executable named '{wanted}' found in the extracted archive")]
    BinaryNotFound { wanted: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures from the registry's filesystem-backed operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("'{tool}' {version} is not installed")]
    NotInstalled { tool: String, version: String },

    #[error("source binary {path} does not exist or is not a regular file")]
    BadSourceBinary { path: PathBuf },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode metadata for {tool} {version}: {message}")]
    Metadata {
        tool: String,
        version: String,
        message: String,
    },
}

/// Classification codes the installer stamps on its error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallErrorCode {
    NetworkError,
    ChecksumMismatch,
    VersionNotFound,
    ExtractionError,
    PermissionError,
    DiskSpaceError,
    CorruptedFile,
}

impl std::fmt::Display for InstallErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InstallErrorCode::NetworkError => "NetworkError",
            InstallErrorCode::ChecksumMismatch => "ChecksumMismatch",
            InstallErrorCode::VersionNotFound => "VersionNotFound",
            InstallErrorCode::ExtractionError => "ExtractionError",
            InstallErrorCode::PermissionError => "PermissionError",
            InstallErrorCode::DiskSpaceError => "DiskSpaceError",
            InstallErrorCode::CorruptedFile => "CorruptedFile",
        };
        f.write_str(name)
    }
}

/// The installer's error envelope: which pipeline failed, where it was
/// fetching from, the classification code, and the underlying cause.
#[derive(Debug, Error)]
#[error("install of {tool} {version} failed [{code}]: {cause}")]
pub struct InstallError {
    pub tool: String,
    pub version: String,
    pub url: Option<String>,
    pub code: InstallErrorCode,
    pub cause: String,
}

impl InstallError {
    pub fn new(
        tool: &str,
        version: &str,
        url: Option<String>,
        code: InstallErrorCode,
        cause: impl ToString,
    ) -> Self {
        InstallError {
            tool: tool.to_string(),
            version: version.to_string(),
            url,
            code,
            cause: cause.to_string(),
        }
    }
}

/// Maps an I/O failure onto the installer taxonomy: permission and
/// disk-space problems get their own codes, the rest counts as extraction.
pub fn classify_io(e: &io::Error) -> InstallErrorCode {
    match e.kind() {
        io::ErrorKind::PermissionDenied => InstallErrorCode::PermissionError,
        io::ErrorKind::StorageFull => InstallErrorCode::DiskSpaceError,
        _ => InstallErrorCode::ExtractionError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FetchError::Network("connect refused".into()).is_transient());
        assert!(
            FetchError::Http {
                status: 503,
                url: "https://example.com".into()
            }
            .is_transient()
        );
        assert!(
            !FetchError::Http {
                status: 404,
                url: "https://example.com".into()
            }
            .is_transient()
        );
        assert!(!FetchError::NotFound { version: "1.0.0".into() }.is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }

    #[test]
    fn validation_error_formats_field_and_value() {
        let err = ValidationError::new("settings.download.retries", "must be <= 10", 42);
        let text = err.to_string();
        assert!(text.contains("settings.download.retries"));
        assert!(text.contains("42"));
    }
}

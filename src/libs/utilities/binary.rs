//! # Binary Identification and Selection
//!
//! After extraction, the intended executable may be nested anywhere in the
//! unpacked tree and named anything. This module decides what "looks
//! executable" and which candidate is the one the registry should adopt,
//! and provides the post-install smoke check that catches corrupted
//! downloads before they are registered.

use crate::schemas::errors::ExtractError;
use crate::{log_debug, log_warn};
use colored::Colorize;
use goblin::Object;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Filenames that are never the binary, whatever their mode bits say.
const NON_BINARY_NAMES: [&str; 6] = [
    "readme", "license", "licence", "changelog", "notice", "copying",
];

fn has_non_binary_name(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();
    NON_BINARY_NAMES.iter().any(|bad| name.starts_with(bad))
        || name.ends_with(".md")
        || name.ends_with(".txt")
        || name.ends_with(".json")
        || name.ends_with(".yaml")
        || name.ends_with(".yml")
        || name.ends_with(".1")
}

fn under_bin_like_dir(path: &Path) -> bool {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(|n| n == "bin" || n == "sbin" || n == "libexec")
        .unwrap_or(false)
}

/// Whether a file looks executable: on POSIX any regular file with an
/// execute bit, or a bit-less file under a `bin/`-like directory; on
/// Windows, the `.exe`/`.bat`/`.cmd` suffix. Obvious non-binaries are
/// excluded by name on both.
pub fn looks_executable(path: &Path) -> bool {
    if has_non_binary_name(path) {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match fs::metadata(path) {
            Ok(m) if m.is_file() => {
                m.permissions().mode() & 0o111 != 0 || under_bin_like_dir(path)
            }
            _ => false,
        }
    }

    #[cfg(not(unix))]
    {
        path.is_file()
            && matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("exe") | Some("bat") | Some("cmd")
            )
    }
}

/// Smoke check for a freshly installed binary: it must parse as a native
/// executable (ELF, Mach-O, PE) or start with a shebang. Catches truncated
/// downloads and HTML error pages saved as "binaries".
pub fn is_smoke_clean(path: &Path) -> bool {
    // The first 64 KiB is plenty for headers and keeps huge binaries cheap.
    let data = match read_prefix(path, 64 * 1024) {
        Ok(data) if !data.is_empty() => data,
        _ => return false,
    };
    if data.starts_with(b"#!") {
        return true;
    }
    match Object::parse(&data) {
        Ok(Object::Elf(_)) | Ok(Object::Mach(_)) | Ok(Object::PE(_)) => true,
        // goblin needs the whole file for some Mach-O fat binaries; fall
        // back to magic-number checks on the prefix.
        _ => {
            data.starts_with(&[0x7f, b'E', b'L', b'F'])
                || data.starts_with(&[0xfe, 0xed, 0xfa, 0xce])
                || data.starts_with(&[0xfe, 0xed, 0xfa, 0xcf])
                || data.starts_with(&[0xcf, 0xfa, 0xed, 0xfe])
                || data.starts_with(&[0xca, 0xfe, 0xba, 0xbe])
                || data.starts_with(b"MZ")
        }
    }
}

fn read_prefix(path: &Path, limit: usize) -> io::Result<Vec<u8>> {
    use std::io::Read;
    let mut file = fs::File::open(path)?;
    let mut buf = Vec::with_capacity(limit.min(8192));
    file.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Selects the intended binary inside an extracted tree.
///
/// Order follows the installer contract:
/// 1. With `wanted_basename` (the descriptor's `extract_binary`), only exact
///    basename matches count, preferring one under `bin/` over the rest.
/// 2. Otherwise, gather everything that looks executable and prefer an
///    exact match on the tool name, then a substring match, then the first
///    candidate found.
///
/// Directories never match; a miss is `BinaryNotFound`.
pub fn select_binary(
    root: &Path,
    tool: &str,
    wanted_basename: Option<&str>,
) -> Result<PathBuf, ExtractError> {
    let files: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    if let Some(wanted) = wanted_basename {
        let wanted_exe = format!("{wanted}{}", std::env::consts::EXE_SUFFIX);
        let mut matches: Vec<&PathBuf> = files
            .iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n == wanted || n == wanted_exe)
                    .unwrap_or(false)
            })
            .collect();
        matches.sort_by_key(|p| if under_bin_like_dir(p) { 0 } else { 1 });
        return matches
            .first()
            .map(|p| (*p).clone())
            .ok_or_else(|| ExtractError::BinaryNotFound {
                wanted: wanted.to_string(),
            });
    }

    let tool_lower = tool.to_lowercase();
    let tool_exe = format!("{tool_lower}{}", std::env::consts::EXE_SUFFIX);
    let candidates: Vec<&PathBuf> = files.iter().filter(|p| looks_executable(p)).collect();

    if candidates.is_empty() {
        log_warn!(
            "[Binary] Nothing under {} looks executable.",
            root.display().to_string().yellow()
        );
        return Err(ExtractError::BinaryNotFound {
            wanted: tool.to_string(),
        });
    }

    let name_of = |p: &Path| {
        p.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_lowercase()
    };

    let chosen = candidates
        .iter()
        .find(|p| {
            let n = name_of(p);
            n == tool_lower || n == tool_exe
        })
        .or_else(|| candidates.iter().find(|p| name_of(p).contains(&tool_lower)))
        .or_else(|| candidates.first())
        .map(|p| (*p).clone())
        .expect("candidates is non-empty");

    log_debug!(
        "[Binary] Selected {} out of {} candidates.",
        chosen.display().to_string().green(),
        candidates.len()
    );
    Ok(chosen)
}

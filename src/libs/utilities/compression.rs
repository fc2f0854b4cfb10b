//! # Archive Extraction
//!
//! Unpacks downloaded artifacts into a target directory, dispatching on the
//! filename suffix: `.zip`, `.tar`, `.tar.gz`/`.tgz`, `.tar.bz2`, `.tar.xz`.
//! A file with no recognized suffix is treated as a bare binary and copied
//! through unchanged.
//!
//! Safety invariants enforced on every entry:
//! - Path containment: after normalization, no entry may land outside the
//!   target directory. Offenders are skipped with a warning; an archive
//!   whose entries are all unsafe fails with `UnsafePathsOnly`.
//! - Symlinks and hardlinks are skipped.
//! - POSIX modes are preserved; files under `bin/` (or a sole regular file)
//!   that arrive without execute bits get them added afterwards.

use crate::schemas::errors::ExtractError;
use crate::{log_debug, log_info, log_warn};
use bzip2::read::BzDecoder;
use colored::Colorize;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use walkdir::WalkDir;
use xz2::read::XzDecoder;
use zip::ZipArchive;

/// Recognized artifact containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    /// No recognized suffix: the artifact is the binary itself.
    Bare,
}

/// Classifies a filename by suffix.
pub fn archive_format(filename: &str) -> ArchiveFormat {
    let name = filename.to_lowercase();
    if name.ends_with(".zip") {
        ArchiveFormat::Zip
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        ArchiveFormat::TarGz
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        ArchiveFormat::TarBz2
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        ArchiveFormat::TarXz
    } else if name.ends_with(".tar") {
        ArchiveFormat::Tar
    } else {
        ArchiveFormat::Bare
    }
}

/// Whether the installer should even attempt extraction for this filename.
pub fn is_archive(filename: &str) -> bool {
    archive_format(filename) != ArchiveFormat::Bare
}

/// Sniffs the container format from magic bytes, for artifacts whose URL
/// carries no usable suffix (the `archive` fetch variant). Falls back to
/// `Bare` when nothing is recognized.
pub fn sniff_format(path: &Path) -> ArchiveFormat {
    let mut prefix = [0u8; 512 + 8];
    let read = File::open(path)
        .and_then(|mut f| {
            let mut total = 0;
            loop {
                match f.read(&mut prefix[total..]) {
                    Ok(0) => break Ok(total),
                    Ok(n) => total += n,
                    Err(e) => break Err(e),
                }
            }
        })
        .unwrap_or(0);

    if read >= 4 && prefix.starts_with(b"PK\x03\x04") {
        ArchiveFormat::Zip
    } else if read >= 2 && prefix.starts_with(&[0x1f, 0x8b]) {
        // Gzip almost always wraps a tarball in tool distribution.
        ArchiveFormat::TarGz
    } else if read >= 3 && prefix.starts_with(b"BZh") {
        ArchiveFormat::TarBz2
    } else if read >= 6 && prefix.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
        ArchiveFormat::TarXz
    } else if read >= 262 && &prefix[257..262] == b"ustar" {
        ArchiveFormat::Tar
    } else {
        ArchiveFormat::Bare
    }
}

#[derive(Debug, Default)]
struct ExtractStats {
    files_written: usize,
    skipped_unsafe: usize,
    skipped_links: usize,
}

/// Extracts `src` into `dest` (created if missing) and returns `dest`.
/// Bare binaries are copied into `dest` under their original filename.
pub fn extract_archive(src: &Path, dest: &Path) -> Result<PathBuf, ExtractError> {
    let filename = src
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExtractError::Malformed("artifact path has no filename".to_string()))?;
    let mut format = archive_format(filename);
    // Suffix-less artifacts from an archive source still need unpacking;
    // the magic bytes decide how.
    if format == ArchiveFormat::Bare {
        format = sniff_format(src);
    }
    log_debug!(
        "[Extract] Unpacking {} into {} as {:?}",
        src.display().to_string().blue(),
        dest.display().to_string().cyan(),
        format
    );

    fs::create_dir_all(dest)?;

    let stats = match format {
        ArchiveFormat::Zip => extract_zip(src, dest)?,
        ArchiveFormat::Tar => extract_tar(File::open(src)?, dest)?,
        ArchiveFormat::TarGz => extract_tar(GzDecoder::new(File::open(src)?), dest)?,
        ArchiveFormat::TarBz2 => extract_tar(BzDecoder::new(File::open(src)?), dest)?,
        ArchiveFormat::TarXz => extract_tar(XzDecoder::new(File::open(src)?), dest)?,
        ArchiveFormat::Bare => {
            fs::copy(src, dest.join(filename))?;
            ExtractStats { files_written: 1, ..Default::default() }
        }
    };

    if stats.files_written == 0 && stats.skipped_unsafe > 0 {
        return Err(ExtractError::UnsafePathsOnly);
    }
    if stats.skipped_links > 0 {
        log_debug!("[Extract] Skipped {} link entries.", stats.skipped_links);
    }

    fixup_exec_bits(dest)?;
    log_debug!(
        "[Extract] Wrote {} files from {}.",
        stats.files_written,
        filename.green()
    );
    Ok(dest.to_path_buf())
}

/// Normalizes an archive entry path and joins it under `dest`, or returns
/// `None` when the entry would escape (absolute path, `..` traversal, or a
/// non-relative prefix). This is the Zip-Slip guard.
fn contained_join(dest: &Path, entry_path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            // '..', drive prefixes and root markers all escape.
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => return None,
        }
    }
    if out.as_os_str().is_empty() {
        return None;
    }
    Some(dest.join(out))
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<ExtractStats, ExtractError> {
    let mut stats = ExtractStats::default();
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive
        .entries()
        .map_err(|e| ExtractError::Malformed(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| ExtractError::Malformed(e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| ExtractError::Malformed(e.to_string()))?
            .into_owned();

        let Some(target) = contained_join(dest, &entry_path) else {
            log_warn!(
                "[Extract] Skipping unsafe archive entry {:?} (escapes the extraction directory).",
                entry_path
            );
            stats.skipped_unsafe += 1;
            continue;
        };

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                // Entry::unpack preserves the header's mode bits.
                entry
                    .unpack(&target)
                    .map_err(|e| ExtractError::Malformed(e.to_string()))?;
                stats.files_written += 1;
            }
            EntryType::Symlink | EntryType::Link => {
                stats.skipped_links += 1;
            }
            other => {
                log_debug!("[Extract] Ignoring special entry {:?} ({:?}).", entry_path, other);
            }
        }
    }
    Ok(stats)
}

fn extract_zip(src: &Path, dest: &Path) -> Result<ExtractStats, ExtractError> {
    let mut stats = ExtractStats::default();
    let mut archive =
        ZipArchive::new(File::open(src)?).map_err(|e| ExtractError::Malformed(e.to_string()))?;

    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| ExtractError::Malformed(e.to_string()))?;

        // `enclosed_name` refuses traversal; double-check with our own guard
        // so zip and tar entries go through the same policy.
        let Some(target) = file
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .and_then(|p| contained_join(dest, &p))
        else {
            log_warn!(
                "[Extract] Skipping unsafe zip entry '{}' (escapes the extraction directory).",
                file.name()
            );
            stats.skipped_unsafe += 1;
            continue;
        };

        // Unix mode 0o120000 marks a symlink entry.
        if file
            .unix_mode()
            .map(|m| m & 0o170000 == 0o120000)
            .unwrap_or(false)
        {
            stats.skipped_links += 1;
            continue;
        }

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut file, &mut out)?;
        stats.files_written += 1;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))?;
        }
    }
    Ok(stats)
}

/// Post-pass over the extracted tree: a regular file that has no execute
/// bits but sits under a `bin/` directory, or is the only regular file in
/// the whole tree, gets the executable bit added.
#[cfg(unix)]
fn fixup_exec_bits(dest: &Path) -> Result<(), ExtractError> {
    use std::os::unix::fs::PermissionsExt;

    let files: Vec<PathBuf> = WalkDir::new(dest)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    let sole_file = files.len() == 1;

    for path in files {
        let metadata = fs::metadata(&path)?;
        let mut perms = metadata.permissions();
        if perms.mode() & 0o111 != 0 {
            continue;
        }
        let under_bin = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n == "bin")
            .unwrap_or(false);
        if under_bin || sole_file {
            log_info!(
                "[Extract] Adding execute bit to {}",
                path.display().to_string().yellow()
            );
            perms.set_mode(perms.mode() | 0o755);
            fs::set_permissions(&path, perms)?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn fixup_exec_bits(_dest: &Path) -> Result<(), ExtractError> {
    Ok(())
}

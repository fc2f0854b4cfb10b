//! # Filesystem Capability
//!
//! All state-bearing subsystems (layout, registry, config store) reach the
//! disk through this small trait instead of `std::fs` directly, so tests can
//! substitute the in-memory implementation and exercise failure paths
//! without touching the real filesystem. The real implementation is a thin
//! veneer over `std::fs`.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// The operations the core needs from a filesystem.
pub trait FileSystem: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    /// Writes the whole file and flushes it to stable storage.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn file_size(&self, path: &Path) -> io::Result<u64>;
    /// Immediate children of a directory, in unspecified order.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
    /// Adds owner/group/other execute bits (no-op on Windows).
    fn set_exec_bits(&self, path: &Path) -> io::Result<()>;
    /// Whether the file would be runnable: any exec bit on POSIX, the
    /// `.exe`/`.bat`/`.cmd` suffix on Windows.
    fn is_executable(&self, path: &Path) -> bool;
}

/// The OS-backed implementation used outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)?;
        file.write_all(data)?;
        // Flushed to stable storage so a rename over this file is durable.
        file.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        Ok(entries)
    }

    #[cfg(unix)]
    fn set_exec_bits(&self, path: &Path) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        std::fs::set_permissions(path, perms)
    }

    #[cfg(not(unix))]
    fn set_exec_bits(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn is_executable(&self, path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_executable(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("exe") | Some("bat") | Some("cmd")
        )
    }
}

/// Normalizes a path without hitting the disk: resolves `.` and `..`
/// lexically. Enough for the in-memory store's key space.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[derive(Debug, Clone)]
enum MemEntry {
    File { data: Vec<u8>, exec: bool },
    Dir,
}

/// In-memory filesystem for tests. Paths are normalized lexically; parent
/// directories are created implicitly on write, mirroring how the real
/// subsystems always `create_dir_all` before writing.
#[derive(Debug, Default)]
pub struct MemFileSystem {
    entries: Mutex<HashMap<PathBuf, MemEntry>>,
}

impl MemFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
    }

    fn insert_parents(entries: &mut HashMap<PathBuf, MemEntry>, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            entries.entry(dir.to_path_buf()).or_insert(MemEntry::Dir);
            current = dir.parent();
        }
    }
}

impl FileSystem for MemFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let entries = self.entries.lock().unwrap();
        match entries.get(&normalize(path)) {
            Some(MemEntry::File { data, .. }) => Ok(data.clone()),
            _ => Err(Self::not_found(path)),
        }
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        String::from_utf8(self.read(path)?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let path = normalize(path);
        let mut entries = self.entries.lock().unwrap();
        Self::insert_parents(&mut entries, &path);
        let exec = matches!(entries.get(&path), Some(MemEntry::File { exec: true, .. }));
        entries.insert(path, MemEntry::File { data: data.to_vec(), exec });
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut entries = self.entries.lock().unwrap();
        let moved: Vec<(PathBuf, MemEntry)> = entries
            .iter()
            .filter(|(p, _)| **p == from || p.starts_with(&from))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();
        if moved.is_empty() {
            return Err(Self::not_found(&from));
        }
        for (p, _) in &moved {
            entries.remove(p);
        }
        Self::insert_parents(&mut entries, &to);
        for (p, e) in moved {
            let suffix = p.strip_prefix(&from).unwrap().to_path_buf();
            let target = if suffix.as_os_str().is_empty() { to.clone() } else { to.join(suffix) };
            entries.insert(target, e);
        }
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let data = self.read(from)?;
        let len = data.len() as u64;
        self.write(to, &data)?;
        // Copies preserve the exec flag like a real file copy preserves mode.
        let from_exec = {
            let entries = self.entries.lock().unwrap();
            matches!(entries.get(&normalize(from)), Some(MemEntry::File { exec: true, .. }))
        };
        if from_exec {
            self.set_exec_bits(to)?;
        }
        Ok(len)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        match entries.remove(&normalize(path)) {
            Some(MemEntry::File { .. }) => Ok(()),
            Some(dir @ MemEntry::Dir) => {
                entries.insert(normalize(path), dir);
                Err(io::Error::new(io::ErrorKind::IsADirectory, "is a directory"))
            }
            None => Err(Self::not_found(path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut entries = self.entries.lock().unwrap();
        let doomed: Vec<PathBuf> = entries
            .keys()
            .filter(|p| **p == path || p.starts_with(&path))
            .cloned()
            .collect();
        if doomed.is_empty() {
            return Err(Self::not_found(&path));
        }
        for p in doomed {
            entries.remove(&p);
        }
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut entries = self.entries.lock().unwrap();
        Self::insert_parents(&mut entries, &path.join("x"));
        entries.insert(path, MemEntry::Dir);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries.lock().unwrap().contains_key(&normalize(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(
            self.entries.lock().unwrap().get(&normalize(path)),
            Some(MemEntry::File { .. })
        )
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(
            self.entries.lock().unwrap().get(&normalize(path)),
            Some(MemEntry::Dir)
        )
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        match self.entries.lock().unwrap().get(&normalize(path)) {
            Some(MemEntry::File { data, .. }) => Ok(data.len() as u64),
            _ => Err(Self::not_found(path)),
        }
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let path = normalize(path);
        let entries = self.entries.lock().unwrap();
        if !matches!(entries.get(&path), Some(MemEntry::Dir)) {
            return Err(Self::not_found(&path));
        }
        Ok(entries
            .keys()
            .filter(|p| p.parent() == Some(path.as_path()))
            .cloned()
            .collect())
    }

    fn set_exec_bits(&self, path: &Path) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&normalize(path)) {
            Some(MemEntry::File { exec, .. }) => {
                *exec = true;
                Ok(())
            }
            _ => Err(Self::not_found(path)),
        }
    }

    fn is_executable(&self, path: &Path) -> bool {
        matches!(
            self.entries.lock().unwrap().get(&normalize(path)),
            Some(MemEntry::File { exec: true, .. })
        )
    }
}

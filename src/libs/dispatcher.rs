//! # Dispatcher
//!
//! The shim's runtime: resolve the version for (tool, cwd), locate the
//! binary, exec it. This path runs on every invocation of every managed
//! tool, so it is deliberately frugal: no network, no full config
//! validation, only the fields needed for resolution are deserialized, and
//! nothing is written anywhere.
//!
//! Resolution precedence matches the resolver exactly (project pin ->
//! global pin -> tool current version, orphans skipped at every step); the
//! slim document structs below exist so a 30-tool config costs one YAML
//! parse of three fields instead of a full validation pass.
//!
//! Exit codes: the child's own code on success, 127 for unresolved or
//! missing binaries (the shell's "command not found"), 126 when the shim
//! detects it re-entered itself.

use crate::libs::layout::Layout;
use crate::libs::registry::Registry;
use crate::libs::versioning::{self, SYSTEM_VERSION};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Set to the tool name on every child exec. A shim that starts up and
/// finds its own tool already named here is dispatching to itself (e.g. a
/// stale registry entry pointing back into `shims/`) and fails fast; a
/// different tool's name is fine, since managed tools legitimately invoke
/// each other through their shims.
pub const REENTRY_GUARD_ENV_VAR: &str = "VMAN_SHIM_REENTRY";

/// Exit code for re-entry detection.
pub const EXIT_REENTERED: i32 = 126;
/// Exit code for "nothing to run": unresolved tool or missing binary.
pub const EXIT_NOT_FOUND: i32 = 127;

// Slim views of the config documents: serde skips everything else.

#[derive(Debug, Default, Deserialize)]
struct SlimGlobal {
    #[serde(default)]
    global_versions: BTreeMap<String, String>,
    #[serde(default)]
    tools: BTreeMap<String, SlimTool>,
}

#[derive(Debug, Default, Deserialize)]
struct SlimTool {
    #[serde(default)]
    current_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SlimProject {
    #[serde(default)]
    tools: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct SlimDescriptor {
    #[serde(default)]
    version_aliases: HashMap<String, String>,
}

pub struct Dispatcher {
    layout: Layout,
    registry: Registry,
}

impl Dispatcher {
    pub fn new(layout: Layout) -> Dispatcher {
        let registry = Registry::new(layout.clone());
        Dispatcher { layout, registry }
    }

    /// Resolves, locates and execs. On POSIX a successful dispatch never
    /// returns (the process image is replaced); otherwise the return value
    /// is the exit code the caller should exit with.
    pub fn run(&self, tool: &str, args: &[OsString]) -> i32 {
        if std::env::var(REENTRY_GUARD_ENV_VAR).is_ok_and(|guard| guard == tool) {
            eprintln!(
                "vman-shim: refusing to dispatch '{tool}': the shim re-entered itself \
                 (is a shim registered as the tool's binary?)"
            );
            return EXIT_REENTERED;
        }

        let cwd = match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(e) => {
                eprintln!("vman-shim: cannot determine the working directory: {e}");
                return 1;
            }
        };

        let Some(version) = self.resolve(tool, &cwd) else {
            eprintln!("vman: no version of '{tool}' is configured or installed (try: vman install {tool})");
            return EXIT_NOT_FOUND;
        };

        if version == SYSTEM_VERSION {
            return match self.find_on_system_path(tool) {
                Some(binary) => exec(tool, &binary, args),
                None => {
                    eprintln!("vman: '{tool}' resolves to the system version but is not on PATH");
                    EXIT_NOT_FOUND
                }
            };
        }

        let binary = self.layout.binary_path(tool, &version);
        if !binary.is_file() {
            eprintln!(
                "vman: '{tool}' {version} is not installed (try: vman install {tool} {version})"
            );
            return EXIT_NOT_FOUND;
        }
        exec(tool, &binary, args)
    }

    /// The resolver's precedence, on slim documents.
    pub fn resolve(&self, tool: &str, cwd: &Path) -> Option<String> {
        // 1. Nearest project pin that resolves to something runnable.
        for dir in cwd.ancestors() {
            let candidate = dir.join(crate::schemas::project_config::PROJECT_CONFIG_FILENAME);
            if let Ok(text) = std::fs::read_to_string(&candidate) {
                if let Ok(project) = serde_yaml::from_str::<SlimProject>(&text) {
                    if let Some(pinned) = project.tools.get(tool) {
                        if let Some(version) = self.runnable_version(tool, pinned) {
                            return Some(version);
                        }
                    }
                }
            }
            if dir.join(".git").is_dir() {
                break;
            }
        }

        // 2/3. Global pin, then the tool's current version.
        let global: SlimGlobal = std::fs::read_to_string(self.layout.global_config_path())
            .ok()
            .and_then(|text| serde_yaml::from_str(&text).ok())
            .unwrap_or_default();

        if let Some(pinned) = global.global_versions.get(tool) {
            if let Some(version) = self.runnable_version(tool, pinned) {
                return Some(version);
            }
        }
        if let Some(current) = global
            .tools
            .get(tool)
            .and_then(|entry| entry.current_version.as_deref())
        {
            if let Some(version) = self.runnable_version(tool, current) {
                return Some(version);
            }
        }
        None
    }

    /// Maps a configured string to something the dispatcher can run:
    /// `system` passes through, installed versions win directly, and only
    /// then are descriptor aliases and the built-in `latest`/`stable`
    /// fallbacks consulted. Orphans yield `None` so the caller steps to
    /// the next precedence level.
    fn runnable_version(&self, tool: &str, configured: &str) -> Option<String> {
        if configured == SYSTEM_VERSION {
            return Some(SYSTEM_VERSION.to_string());
        }
        // Fast path: the configured string is installed as-is.
        if self.registry.is_installed(tool, configured) {
            return Some(configured.to_string());
        }

        // Alias expansion, descriptor first.
        let aliases = std::fs::read_to_string(self.layout.descriptor_path(tool))
            .ok()
            .and_then(|text| toml::from_str::<SlimDescriptor>(&text).ok())
            .map(|d| d.version_aliases)
            .unwrap_or_default();
        let expanded = aliases
            .get(configured)
            .map(String::as_str)
            .unwrap_or(configured);

        if expanded == "latest" || expanded == "stable" {
            let installed = self.registry.list_versions(tool);
            return versioning::highest(&installed, expanded == "latest");
        }
        if expanded != configured && self.registry.is_installed(tool, expanded) {
            return Some(expanded.to_string());
        }
        None
    }

    /// Searches `PATH` for the tool, skipping the owned `shims/` directory
    /// (and only that one: foreign shim directories are left alone).
    pub fn find_on_system_path(&self, tool: &str) -> Option<PathBuf> {
        let shims_dir = self.layout.shims_dir();
        let path = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path) {
            if dir.as_path() == shims_dir.as_path() {
                continue;
            }
            let candidate = dir.join(format!("{tool}{}", std::env::consts::EXE_SUFFIX));
            if is_executable_file(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// Replaces this process with the target binary (POSIX) or spawns it and
/// forwards the exit code (elsewhere). argv[0] becomes the binary; all
/// other arguments, the environment (plus the re-entry guard carrying the
/// tool name), stdio and cwd pass through untouched.
fn exec(tool: &str, binary: &Path, args: &[OsString]) -> i32 {
    let mut command = Command::new(binary);
    command.args(args).env(REENTRY_GUARD_ENV_VAR, tool);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // exec only returns on failure.
        let err = command.exec();
        eprintln!("vman-shim: failed to exec {}: {err}", binary.display());
        EXIT_NOT_FOUND
    }

    #[cfg(not(unix))]
    {
        match command.status() {
            Ok(status) => status.code().unwrap_or(1),
            Err(e) => {
                eprintln!("vman-shim: failed to run {}: {e}", binary.display());
                EXIT_NOT_FOUND
            }
        }
    }
}

/// Exit-status mapping for the spawn-and-wait path used by `vman exec` on
/// POSIX when exec is not desirable (never currently) and by tests: a
/// signal death becomes 128+signo, matching shell convention.
#[cfg(unix)]
pub fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
pub fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::filesystem::{FileSystem, OsFileSystem};
    use std::sync::Arc;

    // The dispatcher reads through std::fs directly (it is the hot path),
    // so its tests build a real tree under a temp directory.
    struct Fixture {
        _home: tempfile::TempDir,
        dispatcher: Dispatcher,
        layout: Layout,
    }

    fn fixture() -> Fixture {
        let home = tempfile::tempdir().unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
        let layout = Layout::at(home.path().join("vman"), fs);
        layout.ensure_tree().unwrap();
        Fixture {
            dispatcher: Dispatcher::new(layout.clone()),
            layout,
            _home: home,
        }
    }

    impl Fixture {
        fn install(&self, tool: &str, version: &str) {
            let binary = self.layout.binary_path(tool, version);
            std::fs::create_dir_all(binary.parent().unwrap()).unwrap();
            std::fs::write(&binary, b"#!/bin/sh\n").unwrap();
            self.layout.fs().set_exec_bits(&binary).unwrap();
        }

        fn write_global(&self, yaml: &str) {
            std::fs::write(self.layout.global_config_path(), yaml).unwrap();
        }

        fn project_dir(&self, rel: &str, yaml: &str) -> PathBuf {
            let dir = self._home.path().join(rel);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(".vman.yaml"), yaml).unwrap();
            dir
        }
    }

    #[test]
    fn project_pin_beats_global_pin() {
        let f = fixture();
        f.install("kubectl", "1.28.0");
        f.install("kubectl", "1.29.0");
        f.write_global("global_versions:\n  kubectl: 1.28.0\n");
        let dir = f.project_dir("p", "tools:\n  kubectl: 1.29.0\n");
        let sub = dir.join("sub");
        std::fs::create_dir_all(&sub).unwrap();

        assert_eq!(f.dispatcher.resolve("kubectl", &sub).unwrap(), "1.29.0");
    }

    #[test]
    fn orphan_pins_fall_through() {
        let f = fixture();
        f.install("kubectl", "1.29.0");
        f.write_global("global_versions:\n  kubectl: 1.29.0\n");
        let dir = f.project_dir("p", "tools:\n  kubectl: 1.30.0\n");

        assert_eq!(f.dispatcher.resolve("kubectl", &dir).unwrap(), "1.29.0");
    }

    #[test]
    fn current_version_is_last_and_unresolved_is_none() {
        let f = fixture();
        f.install("jq", "1.7.0");
        f.write_global("tools:\n  jq:\n    current_version: 1.7.0\n");

        assert_eq!(
            f.dispatcher.resolve("jq", f._home.path()).unwrap(),
            "1.7.0"
        );
        assert!(f.dispatcher.resolve("ghost", f._home.path()).is_none());
    }

    #[test]
    fn system_passes_through_and_extra_fields_are_ignored() {
        let f = fixture();
        // A full config with settings the dispatcher never looks at.
        f.write_global(
            "version: \"1.0\"\nglobal_versions:\n  node: system\nsettings:\n  download:\n    timeout: 300\n    retries: 3\n    concurrent_downloads: 4\n",
        );
        assert_eq!(
            f.dispatcher.resolve("node", f._home.path()).unwrap(),
            "system"
        );
    }

    #[test]
    fn latest_alias_uses_highest_installed() {
        let f = fixture();
        f.install("rg", "13.0.0");
        f.install("rg", "14.1.0");
        f.write_global("global_versions:\n  rg: latest\n");

        assert_eq!(
            f.dispatcher.resolve("rg", f._home.path()).unwrap(),
            "14.1.0"
        );
    }

    #[cfg(unix)]
    #[test]
    fn system_path_search_skips_the_shims_dir() {
        let f = fixture();
        // Same basename in shims/ and in a regular bin dir.
        let shim = f.layout.shim_path("fake");
        std::fs::create_dir_all(shim.parent().unwrap()).unwrap();
        std::fs::write(&shim, b"#!/bin/sh\n").unwrap();
        f.layout.fs().set_exec_bits(&shim).unwrap();

        let bin_dir = f._home.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let real = bin_dir.join("fake");
        std::fs::write(&real, b"#!/bin/sh\n").unwrap();
        f.layout.fs().set_exec_bits(&real).unwrap();

        let path_var = std::env::join_paths([f.layout.shims_dir(), bin_dir]).unwrap();
        // Narrow scope for the PATH override.
        let old_path = std::env::var_os("PATH");
        unsafe { std::env::set_var("PATH", &path_var) };
        let found = f.dispatcher.find_on_system_path("fake");
        match old_path {
            Some(old) => unsafe { std::env::set_var("PATH", old) },
            None => unsafe { std::env::remove_var("PATH") },
        }

        assert_eq!(found.unwrap(), real);
    }

    #[cfg(unix)]
    #[test]
    fn signal_deaths_map_to_128_plus_signo() {
        use std::process::Command;
        let mut child = Command::new("/bin/sleep").arg("30").spawn().unwrap();
        // Child::kill delivers SIGKILL (signo 9).
        child.kill().unwrap();
        let status = child.wait().unwrap();
        assert_eq!(exit_code_of(status), 128 + 9);
    }
}

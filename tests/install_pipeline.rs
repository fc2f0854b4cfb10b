// End-to-end installer pipeline tests against a local HTTP fixture:
// fetch, extract, register; checksum failures; same-version dedup.

mod common;

use common::{Route, TestServer, build_tar_gz};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use vman::libs::config_store::ConfigStore;
use vman::libs::filesystem::{FileSystem, OsFileSystem};
use vman::libs::installer::{InstallOptions, Installed, Installer, InstallerError};
use vman::libs::layout::Layout;
use vman::libs::registry::Registry;
use vman::libs::utilities::checksum::sha256_bytes;
use vman::libs::utilities::http::CancelToken;
use vman::schemas::errors::InstallErrorCode;

struct Fixture {
    _home: tempfile::TempDir,
    layout: Layout,
    config: ConfigStore,
    registry: Registry,
}

fn fixture() -> Fixture {
    let home = tempfile::tempdir().unwrap();
    let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
    let layout = Layout::at(home.path().join("vman"), fs);
    layout.ensure_tree().unwrap();
    Fixture {
        config: ConfigStore::new(layout.clone()),
        registry: Registry::new(layout.clone()),
        layout,
        _home: home,
    }
}

impl Fixture {
    fn installer(&self) -> Installer {
        Installer::new(self.config.clone(), self.registry.clone())
    }

    fn write_descriptor(&self, name: &str, body: &str) {
        std::fs::write(self.layout.descriptor_path(name), body).unwrap();
    }

    /// Leftover scratch directories under tmp/, which a clean pipeline
    /// must not leave behind.
    fn tmp_leftovers(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.layout.tmp_dir())
            .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
            .unwrap_or_default()
    }
}

fn fake_tool_archive() -> Vec<u8> {
    build_tar_gz(&[(
        "bin/fake-tool",
        b"#!/bin/sh\necho \"fake-tool 1.0.0\"\n".as_slice(),
        0o755,
    )])
}

#[test]
fn install_fetches_extracts_and_registers() {
    let f = fixture();
    let server = TestServer::start();
    server.route("/fake-tool-1.0.0.tar.gz", fake_tool_archive());

    f.write_descriptor(
        "fake-tool",
        &format!(
            "name = \"fake-tool\"\n\n[fetch]\ntype = \"direct\"\nurl_template = \"{}/fake-tool-{{version}}.tar.gz\"\n",
            server.base_url()
        ),
    );

    let outcome = f
        .installer()
        .install("fake-tool", Some("1.0.0"), InstallOptions::default(), &CancelToken::new(), None)
        .unwrap();
    assert_eq!(outcome, Installed::Fresh { version: "1.0.0".to_string() });

    // The binary landed in its content-addressed home with exec bits.
    assert!(f.registry.is_installed("fake-tool", "1.0.0"));
    let binary = f.registry.binary_path("fake-tool", "1.0.0");
    let content = std::fs::read(&binary).unwrap();
    assert!(content.starts_with(b"#!/bin/sh"));
    assert!(f.layout.fs().is_executable(&binary));

    // Metadata and the config mirror agree.
    let meta = f.registry.metadata("fake-tool", "1.0.0").unwrap();
    assert_eq!(meta.size_bytes, content.len() as u64);
    let global = f.config.load_global().unwrap();
    assert_eq!(
        global.tools["fake-tool"].current_version.as_deref(),
        Some("1.0.0")
    );

    // Scratch space is gone; the artifact was not kept.
    assert!(f.tmp_leftovers().is_empty());
    assert_eq!(server.get_hits("/fake-tool-1.0.0.tar.gz"), 1);
}

#[test]
fn reinstalling_without_force_is_a_noop() {
    let f = fixture();
    let server = TestServer::start();
    server.route("/fake-tool-1.0.0.tar.gz", fake_tool_archive());
    f.write_descriptor(
        "fake-tool",
        &format!(
            "name = \"fake-tool\"\n\n[fetch]\ntype = \"direct\"\nurl_template = \"{}/fake-tool-{{version}}.tar.gz\"\n",
            server.base_url()
        ),
    );

    let installer = f.installer();
    let cancel = CancelToken::new();
    installer
        .install("fake-tool", Some("1.0.0"), InstallOptions::default(), &cancel, None)
        .unwrap();
    let second = installer
        .install("fake-tool", Some("1.0.0"), InstallOptions::default(), &cancel, None)
        .unwrap();

    assert_eq!(second, Installed::AlreadyInstalled { version: "1.0.0".to_string() });
    // No second fetch happened.
    assert_eq!(server.get_hits("/fake-tool-1.0.0.tar.gz"), 1);
}

#[test]
fn checksum_mismatch_fails_and_leaves_no_residue() {
    let f = fixture();
    let server = TestServer::start();
    server.route("/fake-tool-1.0.0.tar.gz", fake_tool_archive());

    // The descriptor expects a digest of different bytes.
    let wrong = sha256_bytes(b"different payload");
    f.write_descriptor(
        "fake-tool",
        &format!(
            "name = \"fake-tool\"\n\n[fetch]\ntype = \"direct\"\nurl_template = \"{}/fake-tool-{{version}}.tar.gz\"\nsha256 = \"{wrong}\"\n",
            server.base_url()
        ),
    );

    let err = f
        .installer()
        .install("fake-tool", Some("1.0.0"), InstallOptions::default(), &CancelToken::new(), None)
        .unwrap_err();
    match err {
        InstallerError::Pipeline(e) => {
            assert_eq!(e.code, InstallErrorCode::ChecksumMismatch);
            assert_eq!(e.tool, "fake-tool");
            assert!(e.url.is_some());
        }
        other => panic!("expected a pipeline error, got {other:?}"),
    }

    // Nothing under versions/, no cached artifact, no scratch directories.
    assert!(!f.registry.is_installed("fake-tool", "1.0.0"));
    assert!(!f.layout.fs().exists(&f.layout.version_dir("fake-tool", "1.0.0")));
    let cache: Vec<_> = std::fs::read_dir(f.layout.cache_dir())
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert!(cache.is_empty(), "corrupt artifact was retained: {cache:?}");
    assert!(f.tmp_leftovers().is_empty());
}

#[test]
fn skip_checksum_overrides_a_bad_digest() {
    let f = fixture();
    let server = TestServer::start();
    server.route("/fake-tool-1.0.0.tar.gz", fake_tool_archive());
    let wrong = sha256_bytes(b"different payload");
    f.write_descriptor(
        "fake-tool",
        &format!(
            "name = \"fake-tool\"\n\n[fetch]\ntype = \"direct\"\nurl_template = \"{}/fake-tool-{{version}}.tar.gz\"\nsha256 = \"{wrong}\"\n",
            server.base_url()
        ),
    );

    let options = InstallOptions {
        skip_checksum: true,
        ..Default::default()
    };
    f.installer()
        .install("fake-tool", Some("1.0.0"), options, &CancelToken::new(), None)
        .unwrap();
    assert!(f.registry.is_installed("fake-tool", "1.0.0"));
}

#[test]
fn concurrent_same_version_installs_fetch_once() {
    let f = fixture();
    let server = TestServer::start();
    server.route_full(
        "/fake-tool-1.0.0.tar.gz",
        Route {
            body: fake_tool_archive(),
            ranges: false,
            // Hold the body long enough for the second caller to pile in.
            delay: Duration::from_millis(200),
        },
    );
    f.write_descriptor(
        "fake-tool",
        &format!(
            "name = \"fake-tool\"\n\n[fetch]\ntype = \"direct\"\nurl_template = \"{}/fake-tool-{{version}}.tar.gz\"\n",
            server.base_url()
        ),
    );

    let installer = f.installer();
    let cancel = CancelToken::new();
    let outcomes: Vec<Result<Installed, InstallerError>> = std::thread::scope(|scope| {
        let first = scope.spawn(|| {
            installer.install("fake-tool", Some("1.0.0"), InstallOptions::default(), &cancel, None)
        });
        std::thread::sleep(Duration::from_millis(10));
        let second = scope.spawn(|| {
            installer.install("fake-tool", Some("1.0.0"), InstallOptions::default(), &cancel, None)
        });
        vec![first.join().unwrap(), second.join().unwrap()]
    });

    for outcome in &outcomes {
        assert_eq!(
            outcome.as_ref().unwrap().version(),
            "1.0.0",
            "both callers observe the same success"
        );
    }
    // Exactly one network fetch and one registry record.
    assert_eq!(server.get_hits("/fake-tool-1.0.0.tar.gz"), 1);
    assert_eq!(f.registry.list_versions("fake-tool"), vec!["1.0.0"]);
}

#[test]
fn install_many_handles_independent_tools_on_the_worker_pool() {
    let f = fixture();
    let server = TestServer::start();
    server.route(
        "/alpha-1.0.0.tar.gz",
        build_tar_gz(&[("bin/alpha", b"#!/bin/sh\necho alpha\n".as_slice(), 0o755)]),
    );
    server.route(
        "/beta-2.0.0.tar.gz",
        build_tar_gz(&[("bin/beta", b"#!/bin/sh\necho beta\n".as_slice(), 0o755)]),
    );
    for tool in ["alpha", "beta"] {
        f.write_descriptor(
            tool,
            &format!(
                "name = \"{tool}\"\n\n[fetch]\ntype = \"direct\"\nurl_template = \"{}/{tool}-{{version}}.tar.gz\"\n",
                server.base_url()
            ),
        );
    }

    let requests = vec![
        ("alpha".to_string(), Some("1.0.0".to_string())),
        ("beta".to_string(), Some("2.0.0".to_string())),
    ];
    let outcomes = f
        .installer()
        .install_many(&requests, InstallOptions::default(), &CancelToken::new());

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].as_ref().unwrap().version(), "1.0.0");
    assert_eq!(outcomes[1].as_ref().unwrap().version(), "2.0.0");
    assert!(f.registry.is_installed("alpha", "1.0.0"));
    assert!(f.registry.is_installed("beta", "2.0.0"));
}

#[test]
fn missing_remote_version_is_version_not_found() {
    let f = fixture();
    let server = TestServer::start();
    // No route registered: every request 404s.
    f.write_descriptor(
        "fake-tool",
        &format!(
            "name = \"fake-tool\"\n\n[fetch]\ntype = \"direct\"\nurl_template = \"{}/fake-tool-{{version}}.tar.gz\"\n",
            server.base_url()
        ),
    );

    let err = f
        .installer()
        .install("fake-tool", Some("9.9.9"), InstallOptions::default(), &CancelToken::new(), None)
        .unwrap_err();
    match err {
        InstallerError::Pipeline(e) => assert_eq!(e.code, InstallErrorCode::VersionNotFound),
        other => panic!("expected VersionNotFound, got {other:?}"),
    }
    assert!(!f.registry.is_installed("fake-tool", "9.9.9"));
}

// Library root for `vman`. Both executables link against this crate:
// `vman` (the CLI, src/main.rs) uses everything; `vman-shim`
// (src/bin/vman-shim.rs) uses only the dispatch-critical corner of it.

pub mod commands; // Subcommand logic ('install', 'use', 'which', ...).
pub mod libs; // Core subsystems: layout, registry, resolver, installer, shims.
pub mod logger; // Macro logger with optional file sink.
pub mod schemas; // On-disk document structures and the error taxonomy.

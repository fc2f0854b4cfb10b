// The shim executable. One copy of this binary lives in shims/ under each
// managed tool's name; invoking it resolves the version for the current
// directory, locates the installed binary, and execs it with everything
// (argv, env, stdio, cwd, exit status) passed through untouched.
//
// This main stays as small as possible: argv[0] tells us the tool, the
// dispatcher does the rest. No CLI parsing, no logging setup, no network.

use std::ffi::OsString;
use std::sync::Arc;
use vman::libs::dispatcher::Dispatcher;
use vman::libs::filesystem::OsFileSystem;
use vman::libs::layout::Layout;
use vman::libs::utilities::path_helpers::invocation_name;

fn main() {
    let mut args = std::env::args_os();
    let argv0 = args
        .next()
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tool = invocation_name(&argv0);
    let rest: Vec<OsString> = args.collect();

    if tool.is_empty() || tool == "vman-shim" {
        eprintln!(
            "vman-shim: run me through a shim named after a tool (e.g. shims/kubectl), \
             not directly"
        );
        std::process::exit(2);
    }

    let layout = match Layout::discover(Arc::new(OsFileSystem)) {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("vman-shim: {e}");
            std::process::exit(1);
        }
    };

    let code = Dispatcher::new(layout).run(&tool, &rest);
    std::process::exit(code);
}

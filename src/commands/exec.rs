// The 'exec' command: run a tool through the dispatcher without a shim.
// The process exits with the child's code; on POSIX a successful dispatch
// replaces the process entirely and never returns here.

use crate::commands::{Context, check_tool_name};
use crate::libs::dispatcher::Dispatcher;
use anyhow::Result;
use std::ffi::OsString;

pub fn run(ctx: &Context, tool: &str, args: Vec<OsString>) -> Result<()> {
    check_tool_name(tool)?;
    let code = Dispatcher::new(ctx.layout.clone()).run(tool, &args);
    std::process::exit(code);
}

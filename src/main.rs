// This is the core of the `vman` application.
// It parses command-line arguments and dispatches to the appropriate
// subcommand logic; everything interesting lives in the library crate.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::ffi::OsString;
use vman::commands::{self, Context};
use vman::libs::installer::InstallOptions;
use vman::logger::{self, LogLevel};
use vman::{log_debug, log_error};

/// Defines the command-line interface (CLI) for 'vman'.
/// `#[derive(Parser)]` generates the argument parsing code via `clap`.
#[derive(Parser)]
#[command(name = "vman", version, about = "Manage and dispatch multiple versions of your command-line tools")]
struct Cli {
    /// Enables detailed debug output.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Enumerates all supported subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Create the vman tree and a default configuration.
    Init {
        /// Shell to print the PATH hint for (defaults to $SHELL).
        shell: Option<String>,
    },
    /// Download and install a version of a tool.
    Install {
        tool: String,
        /// Version, alias, or nothing for the latest release.
        version: Option<String>,
        /// Reinstall even when the version is already present.
        #[arg(long)]
        force: bool,
        /// Skip checksum verification.
        #[arg(long)]
        skip_checksum: bool,
        /// Keep the downloaded artifact in the cache.
        #[arg(long)]
        keep_download: bool,
    },
    /// Pin a tool's version for the current project (or globally).
    Use {
        tool: String,
        version: String,
        /// Pin globally instead of in the project config.
        #[arg(long)]
        global: bool,
    },
    /// Pin a tool's version globally.
    Global { tool: String, version: String },
    /// Pin a tool's version in the current project.
    Local { tool: String, version: String },
    /// Remove an installed version (or all of them).
    Remove {
        tool: String,
        version: Option<String>,
        /// Remove every installed version of the tool.
        #[arg(long)]
        all: bool,
    },
    /// List known tools, or the installed versions of one tool.
    List { tool: Option<String> },
    /// Show the version(s) that resolve for the current directory.
    Current { tool: Option<String> },
    /// Print the binary path the shim would exec.
    Which { tool: String },
    /// List versions available at the tool's remote source.
    Search { tool: String },
    /// Install the latest version and point the global pin at it.
    Update { tool: String },
    /// Import an existing local binary as (tool, version).
    Register {
        tool: String,
        version: String,
        path: String,
    },
    /// Regenerate all shims to match the registry.
    Rehash,
    /// Run a tool through the dispatcher without a shim.
    Exec {
        tool: String,
        /// Arguments passed to the tool untouched.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Drop configured versions that are no longer installed.
    Cleanup,
    /// Read or change a setting.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a setting's current value.
    Get { key: String },
    /// Change a setting (e.g. 'download.retries 5').
    Set { key: String, value: String },
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.debug);
    log_debug!("[Vman] Command line arguments successfully parsed.");

    let ctx = match Context::new() {
        Ok(ctx) => ctx,
        Err(e) => {
            log_error!("{e:#}");
            std::process::exit(1);
        }
    };

    // The configured logging level and file sink apply unless --debug
    // already forced the threshold down.
    if let Ok(global) = ctx.config.load_global() {
        if !cli.debug {
            if let Some(level) = LogLevel::parse(&global.settings.logging.level) {
                logger::set_level(level);
            }
        }
        if let Some(file) = &global.settings.logging.file {
            logger::attach_file(file);
        }
    }

    let result = match cli.command {
        Commands::Init { shell } => commands::init::run(&ctx, shell),
        Commands::Install {
            tool,
            version,
            force,
            skip_checksum,
            keep_download,
        } => commands::install::run(
            &ctx,
            &tool,
            version,
            InstallOptions {
                force,
                skip_checksum,
                keep_download,
            },
        ),
        Commands::Use { tool, version, global } => {
            let scope = if global {
                commands::use_cmd::Scope::Global
            } else {
                commands::use_cmd::Scope::Project
            };
            commands::use_cmd::run(&ctx, &tool, &version, scope)
        }
        Commands::Global { tool, version } => {
            commands::use_cmd::run(&ctx, &tool, &version, commands::use_cmd::Scope::Global)
        }
        Commands::Local { tool, version } => {
            commands::use_cmd::run(&ctx, &tool, &version, commands::use_cmd::Scope::Project)
        }
        Commands::Remove { tool, version, all } => {
            commands::remove::run(&ctx, &tool, version, all)
        }
        Commands::List { tool } => commands::list::run(&ctx, tool),
        Commands::Current { tool } => commands::current::run(&ctx, tool),
        Commands::Which { tool } => commands::which::run(&ctx, &tool),
        Commands::Search { tool } => commands::search::run(&ctx, &tool),
        Commands::Update { tool } => commands::update::run(&ctx, &tool),
        Commands::Register { tool, version, path } => {
            commands::register::run(&ctx, &tool, &version, &path)
        }
        Commands::Rehash => commands::rehash::run(&ctx),
        Commands::Exec { tool, args } => commands::exec::run(&ctx, &tool, args),
        Commands::Cleanup => commands::cleanup::run(&ctx),
        Commands::Config { action } => match action {
            ConfigAction::Get { key } => commands::config_cmd::get(&ctx, &key),
            ConfigAction::Set { key, value } => commands::config_cmd::set(&ctx, &key, &value),
        },
    };

    if let Err(e) = result {
        // One line on stderr; detailed context went to the log file.
        log_error!("{}", format!("{e:#}").red());
        std::process::exit(1);
    }
    log_debug!("[Vman] Command execution completed.");
}

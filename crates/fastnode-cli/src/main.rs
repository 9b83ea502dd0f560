#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use fastnode_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "howth")]
#[command(author, version, about = "A deterministic JS/CSS linker", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Bundle a JS entry point into output chunks
    Bundle {
        /// Entry point file
        entry: PathBuf,

        /// Output directory/file (prints to stdout if omitted)
        #[arg(short, long)]
        outfile: Option<PathBuf>,

        /// Output format: esm, cjs, iife, preserve
        #[arg(long, default_value = "preserve")]
        format: String,

        /// Minify output
        #[arg(long)]
        minify: bool,

        /// Generate a linked source map
        #[arg(long)]
        sourcemap: bool,

        /// Disable tree shaking
        #[arg(long)]
        no_treeshake: bool,

        /// Enable code splitting for dynamic imports
        #[arg(long)]
        splitting: bool,

        /// Banner text to prepend to output
        #[arg(long)]
        banner: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    if let Some(Commands::Bundle {
        entry,
        outfile,
        format,
        minify,
        sourcemap,
        no_treeshake,
        splitting,
        banner,
    }) = &cli.command
    {
        let format = commands::bundle::parse_format(format).unwrap_or_else(|| {
            eprintln!("error: invalid --format value {format:?}");
            std::process::exit(2);
        });
        let action = commands::bundle::BundleAction {
            entry: entry.clone(),
            cwd: cwd.clone(),
            outfile: outfile.clone(),
            format,
            minify: *minify,
            sourcemap: *sourcemap,
            treeshake: !*no_treeshake,
            splitting: *splitting,
            banner: banner.clone(),
        };
        return commands::bundle::run(action, cli.json);
    }

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Bundle { .. }) => unreachable!("handled above"),
    }
}

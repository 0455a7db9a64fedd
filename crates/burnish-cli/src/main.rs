//! Burnish - burn CDs with cdrecord or wodim
//!
//! # Usage
//!
//! ```bash
//! # Burn a cue sheet in disc-at-once mode
//! burnish write /dev/sr0 --cue album.cue --mode dao
//!
//! # Simulate a data track at 8x with wodim
//! burnish write /dev/sr0 --backend wodim --simulate --speed 8 -- -data image.iso
//!
//! # Stream events as JSON lines for another program
//! burnish write 0,0,0 --cue album.cue --json --yes
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use console::style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use burnish_core::{Backend, WritingMode};

mod commands;
mod progress;

/// Burnish - burn CDs with cdrecord or wodim
#[derive(Parser)]
#[command(name = "burnish")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Suppress ALL output (implies --quiet and --yes)
    #[arg(long, global = true)]
    silent: bool,

    /// Use this configuration file instead of the default location
    #[arg(long, global = true, value_name = "FILE", env = "BURNISH_CONFIG")]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write tracks or a cue sheet to a disc
    Write {
        /// Target drive (e.g., /dev/sr0, sr0, 0,0,0, ATA:1,0,0)
        device: String,

        /// Track arguments passed to the backend as-is (after --)
        #[arg(last = true)]
        tracks: Vec<String>,

        /// Write from a cue sheet
        #[arg(long, value_name = "FILE")]
        cue: Option<PathBuf>,

        /// Writing mode (tao, dao, raw)
        #[arg(short, long, default_value = "tao")]
        mode: WritingMode,

        /// Speed factor (0 picks the drive maximum)
        #[arg(short, long, default_value_t = 0)]
        speed: u32,

        /// Simulate the write with the laser off
        #[arg(long, visible_alias = "dummy")]
        simulate: bool,

        /// Do not request buffer underrun protection
        #[arg(long)]
        no_burnfree: bool,

        /// Eject the disc when done (overrides the configuration file)
        #[arg(long, conflicts_with = "no_eject")]
        eject: bool,

        /// Leave the disc in the drive when done
        #[arg(long)]
        no_eject: bool,

        /// Allow writing beyond the official capacity
        #[arg(long)]
        overburn: bool,

        /// Write in clone mode
        #[arg(long)]
        clone: bool,

        /// Backend fifo size in MB
        #[arg(long, value_name = "MB")]
        buffer_size: Option<u32>,

        /// Backend program (cdrecord, wodim)
        #[arg(short, long, default_value = "cdrecord")]
        backend: Backend,

        /// Maximum write speed of the drive in KB/s, used when --speed is 0
        #[arg(long, value_name = "KBPS")]
        max_write_speed: Option<u32>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show or create the configuration file
    Config {
        /// Create a configuration file with default values
        #[arg(long)]
        init: bool,

        /// Print the configuration file path
        #[arg(long)]
        path: bool,

        /// Show configuration in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // Set up panic handler for nicer error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    if let Err(e) = run() {
        eprintln!("{} {}", style("Error:").red().bold(), e);

        // Show cause chain in verbose mode
        if std::env::var("RUST_BACKTRACE").is_ok() {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  {} {}", style("Caused by:").yellow(), cause);
                source = cause.source();
            }
        }

        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // --silent implies --quiet
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet || cli.silent {
        EnvFilter::new("off")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let silent = cli.silent;

    // First Ctrl+C asks the running job to cancel, the second one exits
    let running = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        if !r.load(std::sync::atomic::Ordering::SeqCst) {
            if !silent {
                eprintln!("\n{}", style("Forced exit").red().bold());
            }
            std::process::exit(130);
        }
        r.store(false, std::sync::atomic::Ordering::SeqCst);
        if !silent {
            eprintln!(
                "\n{}",
                style("Cancelling... Press Ctrl+C again to force exit").yellow()
            );
        }
    })?;

    match cli.command {
        Commands::Write {
            device,
            tracks,
            cue,
            mode,
            speed,
            simulate,
            no_burnfree,
            eject,
            no_eject,
            overburn,
            clone,
            buffer_size,
            backend,
            max_write_speed,
            json,
            yes,
        } => commands::write::execute(commands::write::WriteArgs {
            device,
            tracks,
            cue,
            mode,
            speed,
            simulate,
            burnfree: !no_burnfree,
            eject: match (eject, no_eject) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
            overburn,
            clone,
            buffer_size,
            backend,
            max_write_speed,
            json,
            skip_confirm: yes || silent,
            cancel_flag: running,
            silent: silent || cli.quiet,
            config_file: cli.config_file,
        }),
        Commands::Config { init, path, json } => {
            commands::config::execute(commands::config::ConfigArgs {
                init,
                path,
                json,
                silent,
                config_file: cli.config_file,
            })
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

//! Write command - burns tracks or a cue sheet with an external backend
//!
//! This is the main functionality of Burnish. It handles:
//! - Drive identifier normalization
//! - Merging command line options with the configuration file
//! - User confirmation
//! - Running the backend with live event output
//! - Cancellation on Ctrl+C

use anyhow::{bail, Result};
use console::style;
use dialoguer::Confirm;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use burnish_core::{
    Backend, BurnDevice, RunOutcome, Settings, WriteRequest, WriterEngine, WritingMode,
};
use burnish_platform::{has_elevated_privileges, normalize_device_path};

use crate::progress::{EventRenderer, OutputMode};

/// Arguments for the write command
pub struct WriteArgs {
    pub device: String,
    pub tracks: Vec<String>,
    pub cue: Option<PathBuf>,
    pub mode: WritingMode,
    pub speed: u32,
    pub simulate: bool,
    pub burnfree: bool,
    /// Eject override, `None` keeps the configured default
    pub eject: Option<bool>,
    pub overburn: bool,
    pub clone: bool,
    pub buffer_size: Option<u32>,
    pub backend: Backend,
    pub max_write_speed: Option<u32>,
    pub json: bool,
    pub skip_confirm: bool,
    pub cancel_flag: Arc<AtomicBool>,
    pub silent: bool,
    pub config_file: Option<PathBuf>,
}

/// Conditionally println based on silent mode
macro_rules! println_if {
    ($silent:expr) => {
        if !$silent {
            println!();
        }
    };
    ($silent:expr, $($arg:tt)*) => {
        if !$silent {
            println!($($arg)*);
        }
    };
}

/// Drive addressed from the command line
///
/// Nothing is probed, the backend reports unsupported features itself.
#[derive(Debug, Clone)]
pub struct CliDevice {
    path: String,
    max_write_speed: Option<u32>,
}

impl CliDevice {
    /// Create a drive from a user supplied identifier
    pub fn new(id: &str, max_write_speed: Option<u32>) -> Self {
        Self {
            path: normalize_device_path(id),
            max_write_speed,
        }
    }
}

impl BurnDevice for CliDevice {
    fn external_parameter(&self) -> String {
        self.path.clone()
    }

    fn supports_dao(&self) -> bool {
        true
    }

    fn supports_burnfree(&self) -> bool {
        true
    }

    fn max_write_speed(&self) -> Option<u32> {
        self.max_write_speed
    }

    fn unlock_and_eject(&self) -> burnish_core::Result<()> {
        burnish_platform::unlock_and_eject(&self.path)
            .map_err(|e| burnish_core::Error::Device(e.to_string()))
    }
}

/// Execute the write command
pub fn execute(args: WriteArgs) -> Result<()> {
    let config_path = args.config_file.clone().or_else(Settings::config_path);
    let settings = Settings::load_from_path(config_path);

    check_inputs(&args)?;

    let mode = output_mode(&args, &settings);
    let quiet = mode != OutputMode::Text;
    let skip_confirm = args.skip_confirm || args.json || settings.behavior.skip_confirmation;

    let device = CliDevice::new(&args.device, args.max_write_speed);
    let request = build_request(&args, &settings);

    if !has_elevated_privileges() {
        tracing::debug!(
            "Not running with elevated privileges; {} needs setuid root or device group access",
            args.backend
        );
    }

    // Step 1: Summary
    println_if!(
        quiet,
        "{} {}",
        style("Drive:").bold(),
        style(device.external_parameter()).cyan()
    );
    println_if!(quiet, "  {} {}", style("Backend:").dim(), args.backend);
    println_if!(quiet, "  {} {}", style("Mode:").dim(), request.mode);
    if let Some(cue) = &request.cue_file {
        println_if!(quiet, "  {} {}", style("Cue sheet:").dim(), cue.display());
    }
    if !args.tracks.is_empty() {
        println_if!(quiet, "  {} {}", style("Tracks:").dim(), args.tracks.join(" "));
    }
    if request.simulate {
        println_if!(quiet, "  {} laser off, nothing is written", style("Simulation:").dim());
    }
    println_if!(quiet);

    // Step 2: Confirmation
    if !skip_confirm {
        let verb = if request.simulate {
            "Simulate writing to"
        } else {
            "Write to"
        };
        let proceed = Confirm::new()
            .with_prompt(format!("{} {}?", verb, device.external_parameter()))
            .default(false)
            .interact()?;

        if !proceed {
            println!("{}", style("Aborted.").yellow());
            return Ok(());
        }
    }

    // Step 3: Run
    let renderer = Arc::new(EventRenderer::new(mode));
    let observer = Arc::clone(&renderer);
    let prompter = Arc::clone(&renderer);

    let mut engine = WriterEngine::new(args.backend)
        .with_locator(settings.locator())
        .on_event(move |event| observer.render(event))
        .on_reload_request(move || {
            if skip_confirm {
                return true;
            }
            prompter.suspend(|| {
                Confirm::new()
                    .with_prompt("Please reload the disc. Continue?")
                    .default(true)
                    .interact()
                    .unwrap_or(false)
            })
        });

    let finished = Arc::new(AtomicBool::new(false));
    let watcher = spawn_cancel_watcher(&engine, args.cancel_flag.clone(), finished.clone());

    let outcome = engine.run(&request, &device);

    finished.store(true, Ordering::SeqCst);
    if watcher.join().is_err() {
        tracing::warn!("Cancel watcher thread panicked");
    }
    renderer.finish();

    match outcome {
        RunOutcome::Succeeded => Ok(()),
        RunOutcome::Canceled => bail!("Write canceled"),
        RunOutcome::Failed(cause) => bail!("Write failed: {}", cause),
    }
}

/// Reject invocations that have nothing to write
fn check_inputs(args: &WriteArgs) -> Result<()> {
    if normalize_device_path(&args.device).is_empty() {
        bail!("No drive given");
    }

    if let Some(cue) = &args.cue {
        if !cue.is_file() {
            bail!("Cue sheet not found: {}", cue.display());
        }
    } else if args.tracks.is_empty() {
        bail!("Nothing to write: pass --cue <FILE> or track arguments after --");
    }

    Ok(())
}

/// Pick how events are shown
fn output_mode(args: &WriteArgs, settings: &Settings) -> OutputMode {
    if args.json {
        OutputMode::Json
    } else if args.silent || settings.behavior.quiet {
        OutputMode::Silent
    } else {
        OutputMode::Text
    }
}

/// Build the request from command line options and configured defaults
fn build_request(args: &WriteArgs, settings: &Settings) -> WriteRequest {
    let mut request = WriteRequest::new()
        .mode(args.mode)
        .speed(args.speed)
        .simulate(args.simulate)
        .clone_mode(args.clone)
        .overburn(args.overburn)
        .buffer_size(args.buffer_size);

    if let Some(cue) = &args.cue {
        request = request.cue_file(cue.clone());
    }
    for track in &args.tracks {
        request = request.arg(track.clone());
    }

    let mut request = settings.apply_to(request);
    request.burnfree = args.burnfree && settings.writer.burnfree;
    if let Some(eject) = args.eject {
        request.eject_on_finish = eject;
    }
    request
}

/// Forward Ctrl+C to the engine until the run has finished
///
/// A Ctrl+C seen while the engine is still idle (locating the backend) is
/// retried until the run becomes active and accepts it.
fn spawn_cancel_watcher(
    engine: &WriterEngine,
    cancel_flag: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    let handle = engine.cancel_handle();
    std::thread::spawn(move || {
        while !finished.load(Ordering::SeqCst) {
            if !cancel_flag.load(Ordering::SeqCst) && handle.cancel() {
                tracing::debug!("Cancellation requested");
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    })
}

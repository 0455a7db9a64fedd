//! Rendering of job events on the terminal
//!
//! Text mode drives a progress bar and prints messages above it. JSON mode
//! prints one serialized event per line on stdout.

use burnish_core::{format_speed, JobEvent, Severity};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

const MIB: u64 = 1024 * 1024;

/// How events are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress bar and coloured messages
    Text,
    /// One JSON object per event on stdout
    Json,
    /// Nothing but debug logging
    Silent,
}

/// Latest values shown next to the progress bar
#[derive(Debug, Default)]
struct Status {
    processed: Option<(u64, u64)>,
    speed: Option<(u64, f64)>,
    fifo: Option<u8>,
}

impl Status {
    fn message(&self) -> String {
        let mut parts = Vec::new();
        if let Some((done, total)) = self.processed {
            parts.push(format_processed(done, total));
        }
        if let Some((bps, multiplier)) = self.speed {
            parts.push(format!("{} ({:.1}x)", format_speed(bps), multiplier));
        }
        if let Some(fifo) = self.fifo {
            parts.push(format!("fifo {}%", fifo));
        }
        parts.join(", ")
    }
}

/// Turns job events into terminal output
pub struct EventRenderer {
    mode: OutputMode,
    bar: ProgressBar,
    status: Mutex<Status>,
}

impl EventRenderer {
    /// Create a renderer for the given mode
    pub fn new(mode: OutputMode) -> Self {
        let bar = match mode {
            OutputMode::Text => create_burn_progress_bar(),
            OutputMode::Json | OutputMode::Silent => ProgressBar::hidden(),
        };

        Self {
            mode,
            bar,
            status: Mutex::new(Status::default()),
        }
    }

    /// Render a single event
    pub fn render(&self, event: &JobEvent) {
        if let JobEvent::DebugLine { source, text } = event {
            tracing::debug!("{}: {}", source, text);
        }

        match self.mode {
            OutputMode::Silent => {}
            OutputMode::Json => match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Cannot serialize event: {}", e),
            },
            OutputMode::Text => self.render_text(event),
        }
    }

    fn render_text(&self, event: &JobEvent) {
        match event {
            JobEvent::Started => {
                self.bar.set_prefix("Preparing");
            }
            JobEvent::NewTask(task) => {
                self.bar.println(format!("{}", style(task).bold()));
                self.bar.set_prefix(task.clone());
            }
            JobEvent::NewSubTask(task) => {
                self.bar.println(format!("  {}", style(task).cyan()));
            }
            JobEvent::InfoMessage { text, severity } => {
                self.bar.println(format_message(text, *severity));
            }
            JobEvent::Percent(percent) => {
                self.bar.set_position(u64::from(*percent));
            }
            JobEvent::Processed { done, total } => {
                self.update_status(|s| s.processed = Some((*done, *total)));
            }
            JobEvent::Speed {
                bytes_per_sec,
                multiplier,
            } => {
                self.update_status(|s| s.speed = Some((*bytes_per_sec, *multiplier)));
            }
            JobEvent::BufferFifo(fifo) => {
                self.update_status(|s| s.fifo = Some(*fifo));
            }
            JobEvent::NextTrack { index, total } => {
                self.bar.set_prefix(format!("Track {}/{}", index, total));
            }
            JobEvent::Canceled => {
                self.bar.println(format!("{}", style("Canceled.").yellow()));
            }
            JobEvent::Finished { .. } => {
                self.bar.finish_and_clear();
            }
            JobEvent::ProcessedSub { .. }
            | JobEvent::SubPercent(_)
            | JobEvent::DebugLine { .. } => {}
        }
    }

    fn update_status(&self, update: impl FnOnce(&mut Status)) {
        if let Ok(mut status) = self.status.lock() {
            update(&mut status);
            self.bar.set_message(status.message());
        }
    }

    /// Hide the progress bar while `f` talks to the user
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.bar.suspend(f)
    }

    /// Clear the progress bar if a run ended without a terminal event
    pub fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

/// Format an informational message with a severity marker
pub fn format_message(text: &str, severity: Severity) -> String {
    match severity {
        Severity::Info => format!("  {} {}", style("ℹ").blue(), text),
        Severity::Warning => format!("  {} {}", style("⚠").yellow().bold(), style(text).yellow()),
        Severity::Error => format!("  {} {}", style("✗").red().bold(), style(text).red()),
        Severity::Success => format!("  {} {}", style("✓").green(), style(text).green()),
    }
}

/// Format overall progress given in MB units
pub fn format_processed(done_mb: u64, total_mb: u64) -> String {
    format!(
        "{} / {}",
        format_size(done_mb.saturating_mul(MIB), BINARY),
        format_size(total_mb.saturating_mul(MIB), BINARY)
    )
}

/// Create the progress bar shown while burning
fn create_burn_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);

    if let Ok(style) = ProgressStyle::default_bar()
        .template("  {spinner:.green} {prefix:<12} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
    {
        pb.set_style(style.progress_chars("█▓░"));
    }

    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(s: &str) -> String {
        console::strip_ansi_codes(s).to_string()
    }

    // -------------------------------------------------------------------------
    // Message formatting tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_format_message_markers() {
        assert_eq!(plain(&format_message("hello", Severity::Info)), "  ℹ hello");
        assert_eq!(plain(&format_message("careful", Severity::Warning)), "  ⚠ careful");
        assert_eq!(plain(&format_message("broken", Severity::Error)), "  ✗ broken");
        assert_eq!(plain(&format_message("done", Severity::Success)), "  ✓ done");
    }

    #[test]
    fn test_format_processed_units() {
        let text = format_processed(350, 700);
        assert!(text.contains("350"));
        assert!(text.contains("700"));
        assert!(text.contains("MiB"));
    }

    #[test]
    fn test_format_processed_zero_total() {
        let text = format_processed(0, 0);
        assert!(text.contains(" / "));
    }

    // -------------------------------------------------------------------------
    // Status line tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_status_message_empty() {
        assert_eq!(Status::default().message(), "");
    }

    #[test]
    fn test_status_message_parts() {
        let status = Status {
            processed: None,
            speed: Some((1_228_800, 8.0)),
            fifo: Some(97),
        };
        assert_eq!(status.message(), "1.2 MB/s (8.0x), fifo 97%");
    }

    // -------------------------------------------------------------------------
    // Renderer tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_silent_renderer_accepts_all_events() {
        let renderer = EventRenderer::new(OutputMode::Silent);
        renderer.render(&JobEvent::Started);
        renderer.render(&JobEvent::Percent(50));
        renderer.render(&JobEvent::BufferFifo(80));
        renderer.render(&JobEvent::Finished { success: true });
        renderer.finish();
    }

    #[test]
    fn test_text_renderer_tracks_status() {
        let renderer = EventRenderer::new(OutputMode::Text);
        renderer.render(&JobEvent::Processed { done: 10, total: 100 });
        renderer.render(&JobEvent::BufferFifo(95));
        let message = renderer.status.lock().unwrap().message();
        assert!(message.contains("fifo 95%"));
        renderer.render(&JobEvent::Finished { success: false });
        assert!(renderer.bar.is_finished());
    }
}

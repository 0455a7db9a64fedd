//! Job lifecycle and event protocol
//!
//! A writer job never reports through `Result` values once it is running.
//! Everything it has to say (progress, warnings, the final verdict) is a
//! [`JobEvent`] delivered to a [`JobObserver`]. Every run ends with exactly one
//! [`JobEvent::Finished`], preceded by [`JobEvent::Canceled`] when the run was
//! cancelled.

use serde::Serialize;
use std::fmt;

/// Severity of an informational message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Plain information
    Info,
    /// Something the user should know about, the run continues
    Warning,
    /// Part of a failure report
    Error,
    /// The run completed successfully
    Success,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Success => write!(f, "SUCCESS"),
        }
    }
}

/// Events emitted by a writer job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum JobEvent {
    /// The job has started
    Started,

    /// A new top-level task began (e.g. "Writing")
    NewTask(String),

    /// A new sub task began (e.g. "Fixating")
    NewSubTask(String),

    /// A human-readable message
    InfoMessage {
        /// Message text
        text: String,
        /// Message severity
        severity: Severity,
    },

    /// Overall progress in backend capacity units (MB for cdrecord)
    Processed {
        /// Units done
        done: u64,
        /// Units in total
        total: u64,
    },

    /// Progress of the current track
    ProcessedSub {
        /// Units done in this track
        done: u64,
        /// Units in this track
        total: u64,
    },

    /// Overall percentage (0..=100)
    Percent(u8),

    /// Current track percentage (0..=100)
    SubPercent(u8),

    /// Backend buffer fill level (0..=100)
    BufferFifo(u8),

    /// Smoothed write speed
    Speed {
        /// Bytes per second
        bytes_per_sec: u64,
        /// Multiple of the 1x baseline
        multiplier: f64,
    },

    /// The backend started a new track
    NextTrack {
        /// 1-based track index
        index: u32,
        /// Number of tracks in the roster
        total: u32,
    },

    /// Raw backend output, for debugging logs
    DebugLine {
        /// Where the line came from
        source: String,
        /// Line text
        text: String,
    },

    /// Terminal event of every run
    Finished {
        /// Whether the write succeeded
        success: bool,
    },

    /// The run was cancelled, always followed by `Finished { success: false }`
    Canceled,
}

impl JobEvent {
    /// Shorthand for an informational message
    pub fn info(text: impl Into<String>, severity: Severity) -> Self {
        JobEvent::InfoMessage {
            text: text.into(),
            severity,
        }
    }

    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Finished { .. })
    }
}

/// Receiver of job events
pub trait JobObserver: Send + Sync {
    /// Called for every event, in emission order
    fn on_event(&self, event: &JobEvent);
}

impl<F> JobObserver for F
where
    F: Fn(&JobEvent) + Send + Sync,
{
    fn on_event(&self, event: &JobEvent) {
        self(event)
    }
}

/// Observer that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl JobObserver for NullObserver {
    fn on_event(&self, _event: &JobEvent) {}
}

/// Lifecycle state of a writer run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// No run in progress
    Idle,
    /// Backend started, waiting for it to begin writing
    Preparing,
    /// Backend is writing
    Running,
    /// Backend is writing in simulation mode
    Simulating,
    /// Backend is closing the disc
    Fixating,
    /// Run ended; `true` on success
    Finished(bool),
    /// Run was cancelled
    Canceled,
}

impl RunState {
    /// Whether a run is in progress and may be cancelled
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunState::Preparing | RunState::Running | RunState::Simulating | RunState::Fixating
        )
    }
}

/// Closed set of backend-reported failure causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// No specific cause was recognised
    Unknown,
    /// The drive ran out of data while writing
    BufferUnderrun,
    /// Data does not fit on the medium
    Oversize,
    /// The backend rejected an option
    BadOption,
    /// Shared memory for the fifo could not be allocated
    ShmgetFailed,
    /// Optimum power calibration failed
    OpcFailed,
    /// The requested speed was rejected
    CannotSetSpeed,
    /// A new session could not be opened
    CannotOpenSession,
    /// The cue sheet was rejected
    CannotSendCueSheet,
    /// The device could not be opened
    PermissionDenied,
    /// Ultra high speed medium in an unsuitable writer
    HighSpeedMedium,
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The backend executable was not found; nothing was started
    BackendNotFound,
    /// The backend could not be spawned
    LaunchFailed(String),
    /// The backend exited with a non-zero code
    Backend {
        /// Latched (or inferred) cause
        code: ErrorCode,
        /// Backend exit code
        exit_code: i32,
    },
    /// The backend was killed by a signal or crashed
    AbnormalExit,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::BackendNotFound => write!(f, "backend executable not found"),
            FailureCause::LaunchFailed(reason) => write!(f, "could not start backend: {}", reason),
            FailureCause::Backend { code, exit_code } => {
                write!(f, "backend exited with code {} ({:?})", exit_code, code)
            }
            FailureCause::AbnormalExit => write!(f, "backend terminated abnormally"),
        }
    }
}

/// Final result of [`crate::WriterEngine::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The backend finished successfully
    Succeeded,
    /// The run failed
    Failed(FailureCause),
    /// The run was cancelled
    Canceled,
}

impl RunOutcome {
    /// Whether the run succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Info.to_string(), "INFO");
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(Severity::Error.to_string(), "ERROR");
        assert_eq!(Severity::Success.to_string(), "SUCCESS");
    }

    #[test]
    fn test_run_state_is_active() {
        assert!(!RunState::Idle.is_active());
        assert!(RunState::Preparing.is_active());
        assert!(RunState::Running.is_active());
        assert!(RunState::Simulating.is_active());
        assert!(RunState::Fixating.is_active());
        assert!(!RunState::Finished(true).is_active());
        assert!(!RunState::Finished(false).is_active());
        assert!(!RunState::Canceled.is_active());
    }

    #[test]
    fn test_terminal_event() {
        assert!(JobEvent::Finished { success: true }.is_terminal());
        assert!(!JobEvent::Canceled.is_terminal());
        assert!(!JobEvent::Started.is_terminal());
    }

    #[test]
    fn test_closure_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = |event: &JobEvent| seen.lock().unwrap().push(event.clone());
        observer.on_event(&JobEvent::Started);
        observer.on_event(&JobEvent::Percent(10));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![JobEvent::Started, JobEvent::Percent(10)]
        );
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&JobEvent::info("hello", Severity::Warning)).unwrap();
        assert!(json.contains("\"event\":\"info_message\""));
        assert!(json.contains("\"severity\":\"warning\""));

        let json = serde_json::to_string(&JobEvent::NextTrack { index: 1, total: 3 }).unwrap();
        assert!(json.contains("\"index\":1"));
    }

    #[test]
    fn test_outcome_is_success() {
        assert!(RunOutcome::Succeeded.is_success());
        assert!(!RunOutcome::Canceled.is_success());
        assert!(!RunOutcome::Failed(FailureCause::AbnormalExit).is_success());
    }

    #[test]
    fn test_failure_cause_display() {
        let cause = FailureCause::Backend {
            code: ErrorCode::BufferUnderrun,
            exit_code: 254,
        };
        assert_eq!(
            cause.to_string(),
            "backend exited with code 254 (BufferUnderrun)"
        );
        assert_eq!(
            FailureCause::BackendNotFound.to_string(),
            "backend executable not found"
        );
    }
}

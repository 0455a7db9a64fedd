//! # Burnish Core
//!
//! Core library for supervising command-line disc burning backends such as
//! cdrecord and wodim.
//!
//! ## Modules
//!
//! - `engine`: Runs a backend and reports the run as job events
//! - `process`: Child process supervision with a merged line feed
//! - `parser`: Rule-driven scanner for backend status output
//! - `backend`: Command templates and rule tables per backend
//! - `throughput`: Smoothed write speed estimation
//! - `job`: Event protocol, run state and outcomes
//! - `external`: Backend executable lookup and version probing
//! - `error`: Error types and result aliases
//! - `settings`: Persistent user settings from configuration file
//!
//! ## Example
//!
//! ```ignore
//! use burnish_core::{Backend, Settings, WriteRequest, WriterEngine};
//!
//! let settings = Settings::load();
//! let request = settings.apply_to(WriteRequest::new().cue_file("disc.cue"));
//!
//! let mut engine = WriterEngine::new(Backend::Cdrecord)
//!     .with_locator(settings.locator())
//!     .on_event(|event| println!("{:?}", event));
//!
//! let outcome = engine.run(&request, &my_device);
//! println!("{:?}", outcome);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod engine;
pub mod error;
pub mod external;
pub mod job;
pub mod parser;
pub mod process;
pub mod settings;
pub mod throughput;

pub use backend::{
    Backend, BurnDevice, CommandLine, LineAction, Matcher, ParseRule, WriteRequest, WritingMode,
    AUTO_SPEED_DIVISOR,
};
pub use engine::{CancelHandle, WriterEngine, LOW_FIFO_THRESHOLD};
pub use error::{Error, Result};
pub use external::{
    derive_features, parse_version_banner, BinVersion, BinaryLocator, ExternalBin, FixedLocator,
    SearchPathLocator, FEATURE_BURNFREE, FEATURE_GRACETIME, FEATURE_OVERBURN, FEATURE_SUIDROOT,
};
pub use job::{
    ErrorCode, FailureCause, JobEvent, JobObserver, NullObserver, RunOutcome, RunState, Severity,
};
pub use parser::{parse_progress_line, OutputParser, ParseOutput, ParserContext, ProgressLine, TrackProgress};
pub use process::{
    InputSink, KillHandle, LineSplitter, ProcessEvent, ProcessExit, ProcessSupervisor, Stream,
};
pub use settings::{BehaviorSettings, ProgramSettings, Settings, SettingsError, WriterSettings};
pub use throughput::{
    format_speed, speed_multiplier, SpeedUpdate, ThroughputEstimator, CD_BASELINE_BPS,
    SPEED_CHANGE_THRESHOLD, WINDOW_SIZE,
};

//! The writer engine
//!
//! [`WriterEngine`] runs one backend process per call to
//! [`WriterEngine::run`]: it locates the binary, builds the command line,
//! starts a [`ProcessSupervisor`], feeds every output line through the
//! [`OutputParser`] and maps the exit status to a final verdict. Everything
//! it has to report reaches the caller as [`JobEvent`]s.
//!
//! # Example
//!
//! ```no_run
//! use burnish_core::{Backend, BurnDevice, JobEvent, WriteRequest, WriterEngine};
//!
//! fn burn(device: &dyn BurnDevice) {
//!     let mut engine = WriterEngine::new(Backend::Cdrecord).on_event(|event: &JobEvent| {
//!         if let JobEvent::Percent(p) = event {
//!             println!("{}%", p);
//!         }
//!     });
//!
//!     let request = WriteRequest::new().cue_file("/tmp/disc.cue").speed(16);
//!     let outcome = engine.run(&request, device);
//!     println!("{:?}", outcome);
//! }
//! ```

use crate::backend::{Backend, BurnDevice, CommandLine, WriteRequest, WritingMode};
use crate::external::{BinaryLocator, ExternalBin, SearchPathLocator, FEATURE_OVERBURN, FEATURE_SUIDROOT};
use crate::job::{
    ErrorCode, FailureCause, JobEvent, JobObserver, NullObserver, RunOutcome, RunState, Severity,
};
use crate::parser::{OutputParser, ParseOutput, ParserContext};
use crate::process::{InputSink, KillHandle, ProcessEvent, ProcessExit, ProcessSupervisor};
use crate::throughput::{speed_multiplier, ThroughputEstimator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Fifo fill level (percent) at or below which an unexplained failure is
/// reported as a buffer underrun
pub const LOW_FIFO_THRESHOLD: u8 = 3;

type ReloadHandler = Box<dyn Fn() -> bool + Send + Sync>;

#[derive(Debug)]
struct Shared {
    state: Mutex<RunState>,
    cancel_requested: AtomicBool,
    killer: Mutex<Option<KillHandle>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn killer(&self) -> MutexGuard<'_, Option<KillHandle>> {
        self.killer.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Handle for cancelling a run from another thread
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Request cancellation of the active run
    ///
    /// Returns `false` when no run is active. The backend is terminated at
    /// most once no matter how often this is called.
    pub fn cancel(&self) -> bool {
        let state = self.shared.state();
        if !state.is_active() {
            return false;
        }

        self.shared.cancel_requested.store(true, Ordering::SeqCst);
        info!("Cancelling write");
        if let Some(killer) = self.shared.killer().as_ref() {
            killer.terminate();
        }
        true
    }

    /// Whether cancellation was requested for the current run
    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::SeqCst)
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        *self.shared.state()
    }
}

/// Supervises one backend run at a time and reports it as job events
pub struct WriterEngine {
    backend: Backend,
    locator: Box<dyn BinaryLocator>,
    observer: Box<dyn JobObserver>,
    reload: Option<ReloadHandler>,
    shared: Arc<Shared>,
}

impl WriterEngine {
    /// Create an engine for `backend` that searches `$PATH` for the binary
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            locator: Box::new(SearchPathLocator::new()),
            observer: Box::new(NullObserver),
            reload: None,
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::Idle),
                cancel_requested: AtomicBool::new(false),
                killer: Mutex::new(None),
            }),
        }
    }

    /// Use a custom binary locator
    pub fn with_locator(mut self, locator: impl BinaryLocator + 'static) -> Self {
        self.locator = Box::new(locator);
        self
    }

    /// Deliver events to `observer`
    pub fn with_observer(mut self, observer: impl JobObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Deliver events to a closure
    pub fn on_event<F>(self, callback: F) -> Self
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        self.with_observer(callback)
    }

    /// Ask the caller to reload the medium when the backend cannot close the
    /// tray itself
    ///
    /// The backend is told to continue when the callback returns `true`.
    /// Without a callback the engine continues right away.
    pub fn on_reload_request<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.reload = Some(Box::new(callback));
        self
    }

    /// Backend this engine drives
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Handle for cancelling runs of this engine
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        *self.shared.state()
    }

    /// Run the backend to completion
    ///
    /// Blocks until the backend exited (or could not be started) and the
    /// terminal [`JobEvent::Finished`] was emitted.
    pub fn run(&mut self, request: &WriteRequest, device: &dyn BurnDevice) -> RunOutcome {
        self.reset();

        let program = self.backend.program();
        let Some(bin) = self.locator.locate(program) else {
            warn!("{} not found", program);
            self.emit(JobEvent::info(
                format!("Could not find {} executable.", program),
                Severity::Error,
            ));
            self.emit(JobEvent::Finished { success: false });
            return RunOutcome::Failed(FailureCause::BackendNotFound);
        };

        self.set_state(RunState::Preparing);
        self.emit(JobEvent::Started);

        if let Some(ref copyright) = bin.copyright {
            self.emit(JobEvent::info(
                format!("Using {} {} - Copyright (C) {}", bin.name, bin.version, copyright),
                Severity::Info,
            ));
        }

        let command = self.backend.build_command(&bin, request, device);
        for warning in &command.warnings {
            self.emit(JobEvent::info(warning.clone(), Severity::Warning));
        }
        info!("Running {}", command.display());
        self.emit(JobEvent::DebugLine {
            source: format!("{} command:", bin.name),
            text: command.display(),
        });

        self.emit(JobEvent::NewSubTask("Preparing write process...".to_string()));

        let mut supervisor =
            match ProcessSupervisor::start(&command.program, &command.args, command.cwd.as_deref()) {
                Ok(supervisor) => supervisor,
                Err(e) => {
                    error!("{}", e);
                    self.emit(JobEvent::info(
                        format!("Could not start {}.", bin.name),
                        Severity::Error,
                    ));
                    self.set_state(RunState::Finished(false));
                    self.emit(JobEvent::Finished { success: false });
                    return RunOutcome::Failed(FailureCause::LaunchFailed(e.to_string()));
                }
            };

        self.emit(JobEvent::NewTask(
            if request.simulate { "Simulating" } else { "Writing" }.to_string(),
        ));
        self.emit(JobEvent::info(
            start_message(request.mode, request.simulate, command.speed),
            Severity::Info,
        ));

        *self.shared.killer() = Some(supervisor.kill_handle());
        if self.shared.cancel_requested.load(Ordering::SeqCst) {
            supervisor.terminate();
        }

        let mut session = RunSession::new(self.backend, bin, request, &command);
        let mut exit = ProcessExit::Abnormal;
        while let Some(event) = supervisor.recv() {
            match event {
                ProcessEvent::Line { text, .. } => self.on_line(&mut session, &text, &mut supervisor),
                ProcessEvent::Exited(status) => {
                    exit = status;
                    break;
                }
            }
        }

        *self.shared.killer() = None;
        drop(supervisor);
        self.on_exit(&session, exit, device)
    }

    fn reset(&mut self) {
        *self.shared.state() = RunState::Idle;
        self.shared.cancel_requested.store(false, Ordering::SeqCst);
        *self.shared.killer() = None;
    }

    fn emit(&self, event: JobEvent) {
        self.observer.on_event(&event);
    }

    fn set_state(&self, state: RunState) {
        let mut current = self.shared.state();
        debug!("Run state {:?} -> {:?}", *current, state);
        *current = state;
    }

    /// Move to `next` if a run is in progress and has not been cancelled
    fn advance(&self, next: RunState) {
        let mut current = self.shared.state();
        if current.is_active() && !self.shared.cancel_requested.load(Ordering::SeqCst) {
            debug!("Run state {:?} -> {:?}", *current, next);
            *current = next;
        }
    }

    fn on_line(&self, session: &mut RunSession, line: &str, input: &mut dyn InputSink) {
        for output in session.parser.parse_line(line) {
            match output {
                ParseOutput::Event(event) => self.emit(event),
                ParseOutput::Written(bytes) => {
                    if let Some(update) = session.estimator.sample(bytes, Instant::now()) {
                        self.emit(JobEvent::Speed {
                            bytes_per_sec: update.bytes_per_sec,
                            multiplier: update.multiplier,
                        });
                    }
                }
                ParseOutput::WritingStarted => {
                    let preparing = *self.shared.state() == RunState::Preparing;
                    if preparing {
                        self.advance(if session.simulate {
                            RunState::Simulating
                        } else {
                            RunState::Running
                        });
                    }
                }
                ParseOutput::Fixating => self.advance(RunState::Fixating),
                ParseOutput::ReloadRequested => {
                    let proceed = self.reload.as_ref().map_or(true, |ask| ask());
                    if proceed {
                        if let Err(e) = input.write_input(b"\n") {
                            warn!("Could not answer reload prompt: {}", e);
                        }
                    }
                }
            }
        }
    }

    fn on_exit(
        &self,
        session: &RunSession,
        exit: ProcessExit,
        device: &dyn BurnDevice,
    ) -> RunOutcome {
        // Decided under the state lock so a racing cancel() either lands before
        // this point or is rejected as inactive.
        let canceled = {
            let mut state = self.shared.state();
            if self.shared.cancel_requested.load(Ordering::SeqCst) {
                *state = RunState::Canceled;
                true
            } else {
                *state = RunState::Finished(exit == ProcessExit::Normal(0));
                false
            }
        };

        if canceled {
            if let Err(e) = device.unlock_and_eject() {
                warn!("Could not unlock and eject the medium: {}", e);
            }
            self.emit(JobEvent::Canceled);
            self.emit(JobEvent::Finished { success: false });
            return RunOutcome::Canceled;
        }

        match exit {
            ProcessExit::Normal(0) => {
                let text = if session.simulate {
                    "Simulation successfully finished"
                } else {
                    "Writing successfully finished"
                };
                self.emit(JobEvent::info(text, Severity::Success));

                let average = session.estimator.average();
                self.emit(JobEvent::info(
                    format!(
                        "Average overall write speed: {} KB/s ({:.2}x)",
                        average / 1024,
                        speed_multiplier(average)
                    ),
                    Severity::Info,
                ));
                self.emit(JobEvent::Finished { success: true });
                RunOutcome::Succeeded
            }
            ProcessExit::Normal(code) => {
                debug!("{} exited with code {}", session.bin.name, code);
                let cause = session.failure_cause();
                for text in session.failure_messages(cause, code, device) {
                    self.emit(JobEvent::info(text, Severity::Error));
                }
                self.emit(JobEvent::Finished { success: false });
                RunOutcome::Failed(FailureCause::Backend {
                    code: cause,
                    exit_code: code,
                })
            }
            ProcessExit::Abnormal => {
                self.emit(JobEvent::info(
                    format!("{} did not exit cleanly.", session.bin.name),
                    Severity::Error,
                ));
                self.emit(JobEvent::Finished { success: false });
                RunOutcome::Failed(FailureCause::AbnormalExit)
            }
        }
    }
}

fn start_message(mode: WritingMode, simulate: bool, speed: u32) -> String {
    let what = if simulate { "simulation" } else { "writing" };
    if speed > 0 {
        format!("Starting {} {} at {}x speed...", mode, what, speed)
    } else {
        format!("Starting {} {}...", mode, what)
    }
}

/// Per-run state, created when a run starts and dropped when it ends
struct RunSession {
    bin: ExternalBin,
    parser: OutputParser,
    estimator: ThroughputEstimator,
    simulate: bool,
    speed: u32,
    burnfree: bool,
    overburn: bool,
}

impl RunSession {
    fn new(backend: Backend, bin: ExternalBin, request: &WriteRequest, command: &CommandLine) -> Self {
        let overburn = request.overburn && bin.has_feature(FEATURE_OVERBURN);
        let parser = OutputParser::new(
            backend,
            ParserContext {
                binary_name: bin.name.clone(),
                requested_speed: command.speed,
                overburn,
            },
        );

        Self {
            bin,
            parser,
            estimator: ThroughputEstimator::new(),
            simulate: request.simulate,
            speed: command.speed,
            burnfree: command.burnfree,
            overburn,
        }
    }

    /// Latched cause, with the low-fifo underrun heuristic applied
    fn failure_cause(&self) -> ErrorCode {
        match self.parser.error_code() {
            Some(code) => code,
            None if self
                .parser
                .last_fifo()
                .is_some_and(|fifo| fifo <= LOW_FIFO_THRESHOLD) =>
            {
                ErrorCode::BufferUnderrun
            }
            None => ErrorCode::Unknown,
        }
    }

    fn failure_messages(&self, cause: ErrorCode, exit_code: i32, device: &dyn BurnDevice) -> Vec<String> {
        let name = &self.bin.name;
        match cause {
            ErrorCode::Oversize => {
                if self.overburn {
                    vec!["Data did not fit on disk.".to_string()]
                } else {
                    vec!["Data does not fit on disk.".to_string()]
                }
            }
            // Reported when the line was seen
            ErrorCode::BadOption => Vec::new(),
            ErrorCode::ShmgetFailed => vec![
                format!("{} could not reserve shared memory segment of requested size.", name),
                "Probably you chose a too large buffer size.".to_string(),
            ],
            ErrorCode::OpcFailed => {
                vec!["OPC failed. Probably the writer does not like the medium.".to_string()]
            }
            ErrorCode::CannotSetSpeed => vec![
                format!("Unable to set write speed to {}.", self.speed),
                "Probably this is lower than your writer's lowest writing speed.".to_string(),
            ],
            ErrorCode::CannotSendCueSheet => vec![
                "Unable to send CUE sheet.".to_string(),
                "This may be caused by wrong settings.".to_string(),
            ],
            ErrorCode::CannotOpenSession => vec![
                "Unable to open new session.".to_string(),
                "Probably a problem with the medium.".to_string(),
            ],
            ErrorCode::PermissionDenied => vec![
                format!("{} has no permission to open the device.", name),
                "Run the backend setuid root or from a burning group to solve this problem."
                    .to_string(),
            ],
            ErrorCode::BufferUnderrun => {
                let hint = if !self.burnfree && device.supports_burnfree() {
                    "Please enable Burnfree or choose a lower burning speed."
                } else {
                    "Please choose a lower burning speed."
                };
                vec![
                    "Probably a buffer underrun occurred.".to_string(),
                    hint.to_string(),
                ]
            }
            ErrorCode::HighSpeedMedium => vec![
                "Found a high speed medium not suitable for the writer being used.".to_string(),
            ],
            ErrorCode::Unknown => {
                let mut messages = vec![
                    format!("{} returned an unknown error (code {}).", name, exit_code),
                    std::io::Error::from_raw_os_error(exit_code).to_string(),
                ];
                if self.bin.has_feature(FEATURE_SUIDROOT) {
                    messages.push(
                        "Please include the debugging output when reporting this problem."
                            .to_string(),
                    );
                } else {
                    messages.push(format!("{} is not being run with root privileges.", name));
                    messages.push(
                        "This influences the stability of the burning process.".to_string(),
                    );
                }
                messages
            }
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

//! Line scanner for backend status output
//!
//! [`OutputParser`] consumes the backend's merged output one line at a time.
//! Each line is matched against the backend's ordered rule table and the
//! first matching rule decides what happens. The parser never fails: lines
//! it cannot make sense of are logged at debug level and dropped.

use crate::backend::{Backend, LineAction};
use crate::job::{ErrorCode, JobEvent, Severity};
use tracing::{debug, error};

const MIB: u64 = 1024 * 1024;

/// Track bookkeeping for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackProgress {
    /// Track being written, 1-based (0 before the first track starts)
    pub current_track: u32,
    /// Highest track number seen in the roster
    pub total_tracks: u32,
    /// Roster sizes in MB, in announcement order
    pub track_sizes: Vec<u64>,
    /// Sum of the roster sizes in MB
    pub total_size: u64,
    /// MB of fully written tracks
    pub already_written: u64,
}

impl TrackProgress {
    fn current_size(&self) -> Option<u64> {
        if self.current_track == 0 {
            return None;
        }
        self.track_sizes
            .get(self.current_track as usize - 1)
            .copied()
    }
}

/// Fields of a progress line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressLine {
    /// Track number as printed
    pub track: u32,
    /// MB written in this track
    pub made: u64,
    /// Track size in MB as printed
    pub size: u64,
    /// Fifo fill level in percent
    pub fifo: u8,
}

/// Run-level facts the parser needs to phrase its messages
#[derive(Debug, Clone, Default)]
pub struct ParserContext {
    /// Backend name used in messages
    pub binary_name: String,
    /// Speed factor passed to the backend (0 = backend default)
    pub requested_speed: u32,
    /// Overburning is both allowed and supported by the binary
    pub overburn: bool,
}

/// Something the engine has to act on after a line was parsed
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutput {
    /// Forward an event to the observer
    Event(JobEvent),
    /// Total bytes committed so far, for the throughput estimator
    Written(u64),
    /// The backend started writing (first track or lead-in)
    WritingStarted,
    /// The backend is fixating the disc
    Fixating,
    /// The backend waits for the user to reload the medium
    ReloadRequested,
}

/// Stateful scanner for one run of a backend
#[derive(Debug)]
pub struct OutputParser {
    backend: Backend,
    context: ParserContext,
    roster_closed: bool,
    tracks: TrackProgress,
    error: Option<ErrorCode>,
    last_fifo: Option<u8>,
}

impl OutputParser {
    /// Create a parser for a fresh run
    pub fn new(backend: Backend, context: ParserContext) -> Self {
        Self {
            backend,
            context,
            roster_closed: false,
            tracks: TrackProgress::default(),
            error: None,
            last_fifo: None,
        }
    }

    /// Latched failure cause, if any
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error
    }

    /// Last fifo fill level seen on a progress line
    pub fn last_fifo(&self) -> Option<u8> {
        self.last_fifo
    }

    /// Track bookkeeping
    pub fn tracks(&self) -> &TrackProgress {
        &self.tracks
    }

    /// Whether the roster has been closed by a track start or lead-in
    pub fn roster_closed(&self) -> bool {
        self.roster_closed
    }

    /// Parse a single line
    pub fn parse_line(&mut self, line: &str) -> Vec<ParseOutput> {
        let mut out = vec![ParseOutput::Event(JobEvent::DebugLine {
            source: self.context.binary_name.clone(),
            text: line.to_string(),
        })];

        let action = self
            .backend
            .rules()
            .iter()
            .find(|rule| rule.matcher.matches(line))
            .map(|rule| rule.action);

        match action {
            Some(action) => self.apply(action, line, &mut out),
            None => debug!("({}) {}", self.context.binary_name, line),
        }

        out
    }

    fn apply(&mut self, action: LineAction, line: &str, out: &mut Vec<ParseOutput>) {
        match action {
            LineAction::Track => {
                if !self.roster_closed {
                    self.parse_roster_entry(line);
                } else if line.to_ascii_lowercase().contains("fifo") {
                    self.handle_progress(line, out);
                } else {
                    debug!("({}) {}", self.context.binary_name, line);
                }
            }
            LineAction::Progress => {
                if self.roster_closed {
                    self.handle_progress(line, out);
                } else {
                    debug!("({}) {}", self.context.binary_name, line);
                }
            }
            LineAction::SpeedAnnouncement => self.handle_speed(line, out),
            LineAction::TrackStart => self.handle_track_start(out),
            LineAction::Fixating => {
                out.push(ParseOutput::Fixating);
                out.push(event(JobEvent::NewSubTask("Fixating".to_string())));
            }
            LineAction::Countdown => {
                if let Some(secs) = countdown_seconds(line).filter(|s| *s > 0) {
                    let text = if secs == 1 {
                        "Starting in 1 second".to_string()
                    } else {
                        format!("Starting in {} seconds", secs)
                    };
                    out.push(info(text, Severity::Info));
                }
            }
            LineAction::LeadIn => {
                self.roster_closed = true;
                out.push(ParseOutput::WritingStarted);
                out.push(event(JobEvent::NewSubTask("Writing Leadin".to_string())));
            }
            LineAction::LeadOut => {
                out.push(event(JobEvent::NewSubTask("Writing Leadout".to_string())))
            }
            LineAction::Pregap => {
                out.push(event(JobEvent::NewSubTask("Writing pregap".to_string())))
            }
            LineAction::Opc => out.push(info(
                "Performing Optimum Power Calibration",
                Severity::Info,
            )),
            LineAction::SendingCueSheet => out.push(info("Sending CUE sheet", Severity::Info)),
            LineAction::BurnfreeEnabled => out.push(info("Enabled BURN-Proof", Severity::Info)),
            LineAction::ReloadNeeded => {
                out.push(info("Reloading of media required", Severity::Info))
            }
            LineAction::DaoUnsupported => {
                out.push(info(
                    "DAO (Disk At Once) recording not supported with this writer",
                    Severity::Error,
                ));
                out.push(info(
                    "Please choose TAO (Track At Once) and try again",
                    Severity::Error,
                ));
            }
            LineAction::IoError => out.push(info(
                "Input/output error. Not necessarily serious.",
                Severity::Warning,
            )),
            LineAction::ReloadPrompt => out.push(ParseOutput::ReloadRequested),
            LineAction::Latch(code) => {
                match code {
                    ErrorCode::Oversize if self.context.overburn => out.push(info(
                        "Trying to write more than the official disk capacity",
                        Severity::Warning,
                    )),
                    ErrorCode::BadOption => {
                        let option = bad_option(line);
                        out.push(info(
                            format!(
                                "No valid {} option: {}",
                                self.context.binary_name, option
                            ),
                            Severity::Error,
                        ));
                    }
                    _ => {}
                }
                self.latch(code);
            }
        }
    }

    fn latch(&mut self, code: ErrorCode) {
        if self.error.is_none() {
            debug!("Latched backend error {:?}", code);
            self.error = Some(code);
        }
    }

    fn parse_roster_entry(&mut self, line: &str) {
        let rest = &line["Track ".len()..];
        let number_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());

        let number = match rest[..number_len].parse::<u32>() {
            Ok(n) => n,
            Err(_) => {
                debug!("Track number parse error: {:?}", line);
                return;
            }
        };
        self.tracks.total_tracks = self.tracks.total_tracks.max(number);

        let after = &rest[number_len..];
        let size = after
            .find(|c: char| c.is_ascii_digit())
            .and_then(|start| {
                let end = after[start..].find("MB")? + start;
                after[start..end].trim().parse::<u64>().ok()
            });

        match size {
            Some(size) => {
                self.tracks.track_sizes.push(size);
                self.tracks.total_size += size;
            }
            None => debug!("Track size parse error: {:?}", line),
        }
    }

    fn handle_progress(&mut self, line: &str, out: &mut Vec<ParseOutput>) {
        let Some(progress) = parse_progress_line(line) else {
            debug!("Progress parse error: {:?}", line);
            return;
        };

        self.last_fifo = Some(progress.fifo);
        out.push(event(JobEvent::BufferFifo(progress.fifo)));

        let mut made = progress.made;
        let mut size = progress.size;
        match self.tracks.current_size() {
            Some(roster_size) if size > 0 => {
                made = (made as f64 * roster_size as f64 / size as f64) as u64;
                size = roster_size;
            }
            _ => error!("Did not parse all track sizes"),
        }

        if size > 0 {
            out.push(event(JobEvent::ProcessedSub { done: made, total: size }));
            out.push(event(JobEvent::SubPercent(percent(made, size))));
        }

        let done = self.tracks.already_written + made;
        if self.tracks.total_size > 0 {
            out.push(event(JobEvent::Processed {
                done,
                total: self.tracks.total_size,
            }));
            out.push(event(JobEvent::Percent(percent(
                done,
                self.tracks.total_size,
            ))));
        }

        out.push(ParseOutput::Written(done * MIB));
    }

    fn handle_speed(&self, line: &str, out: &mut Vec<ParseOutput>) {
        let Some(speed) = announced_speed(line) else {
            debug!("Speed parse error: {:?}", line);
            return;
        };

        if speed < self.context.requested_speed {
            out.push(info(
                format!(
                    "Medium or burner do not support writing at {}x speed",
                    self.context.requested_speed
                ),
                Severity::Warning,
            ));
            out.push(info(
                format!("Switching down burn speed to {}x", speed),
                Severity::Warning,
            ));
        }
    }

    fn handle_track_start(&mut self, out: &mut Vec<ParseOutput>) {
        self.roster_closed = true;

        if self.tracks.current_track > 0 {
            match self.tracks.current_size() {
                Some(size) => self.tracks.already_written += size,
                None => error!("Did not parse all track sizes"),
            }
        } else {
            out.push(ParseOutput::WritingStarted);
            out.push(info("Starting writing", Severity::Info));
        }

        self.tracks.current_track += 1;
        debug!(
            "Writing track {} of {} tracks",
            self.tracks.current_track, self.tracks.total_tracks
        );
        out.push(event(JobEvent::NextTrack {
            index: self.tracks.current_track,
            total: self.tracks.total_tracks,
        }));
    }
}

fn event(event: JobEvent) -> ParseOutput {
    ParseOutput::Event(event)
}

fn info(text: impl Into<String>, severity: Severity) -> ParseOutput {
    ParseOutput::Event(JobEvent::info(text, severity))
}

fn percent(part: u64, whole: u64) -> u8 {
    (100 * part / whole).min(100) as u8
}

/// Split a progress line into its four numbers
///
/// The anchors `:`, `of`, `MB`, `fifo` and `%` are searched one after the
/// other. `Track 01:  350 of  700 MB written (fifo 100%)` and
/// `01:350 of 700MB written fifo 80%` both parse.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let colon = line.find(':')?;
    let of = colon + line[colon..].find("of")?;
    let mb = of + line[of..].find("MB")?;
    let fifo = mb + line[mb..].find("fifo")?;
    let pct = fifo + line[fifo..].find('%')?;

    let track_field = line[..colon].trim();
    let track_field = track_field.strip_prefix("Track").unwrap_or(track_field);

    Some(ProgressLine {
        track: track_field.trim().parse().ok()?,
        made: line[colon + 1..of].trim().parse().ok()?,
        size: line[of + 2..mb].trim().parse().ok()?,
        fifo: line[fifo + 4..pct].trim().parse::<u8>().ok()?.min(100),
    })
}

fn announced_speed(line: &str) -> Option<u32> {
    let start = line.find("at speed")? + "at speed".len();
    let rest = line[start..].trim_start();
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

fn countdown_seconds(line: &str) -> Option<u32> {
    let head = line[..line.find("seconds.")?].trim_end();
    let start = head
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    head[start..].parse().ok()
}

fn bad_option(line: &str) -> &str {
    line.find("Bad Option")
        .map(|pos| &line[pos + "Bad Option".len()..])
        .unwrap_or("")
        .trim_start_matches(':')
        .trim()
}

// ============================================================================
// UNIT TESTS
// ============================================================================

//! Backend descriptions: command template and output rule tables
//!
//! A [`Backend`] bundles everything that differs between burning tools: the
//! program to look up, how a [`WriteRequest`] becomes an argument vector, and
//! the ordered table of [`ParseRule`]s the output parser walks for every line.

use crate::error::Result;
use crate::external::{
    BinVersion, ExternalBin, FEATURE_BURNFREE, FEATURE_GRACETIME, FEATURE_OVERBURN,
};
use crate::job::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Divisor turning a drive's maximal write speed in KB/s into a speed factor
pub const AUTO_SPEED_DIVISOR: u32 = 175;

/// Writing mode requested from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritingMode {
    /// Track at once
    #[default]
    Tao,
    /// Disc at once
    Dao,
    /// Raw writing
    Raw,
}

impl WritingMode {
    /// Lower-case name as used in messages
    pub fn name(&self) -> &'static str {
        match self {
            WritingMode::Tao => "tao",
            WritingMode::Dao => "dao",
            WritingMode::Raw => "raw",
        }
    }
}

impl fmt::Display for WritingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for WritingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tao" => Ok(WritingMode::Tao),
            "dao" | "sao" => Ok(WritingMode::Dao),
            "raw" => Ok(WritingMode::Raw),
            _ => Err(format!("Unknown writing mode: {}", s)),
        }
    }
}

/// Capabilities and control of the target drive
pub trait BurnDevice: Send + Sync {
    /// Device identifier passed to the backend (`dev=<this>`)
    fn external_parameter(&self) -> String;

    /// Whether the drive supports disc-at-once writing
    fn supports_dao(&self) -> bool;

    /// Whether the drive supports buffer underrun protection
    fn supports_burnfree(&self) -> bool;

    /// Maximal write speed in KB/s, if known
    fn max_write_speed(&self) -> Option<u32>;

    /// Unlock the tray and eject the medium
    fn unlock_and_eject(&self) -> Result<()>;
}

/// Parameters of a single write run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteRequest {
    /// Writing mode
    pub mode: WritingMode,
    /// Speed factor; 0 lets the engine pick the drive's maximum
    pub speed: u32,
    /// Simulate instead of writing
    pub simulate: bool,
    /// Request buffer underrun protection
    pub burnfree: bool,
    /// Cue sheet to write from
    pub cue_file: Option<PathBuf>,
    /// Clone mode
    pub clone: bool,
    /// Extra arguments appended last
    pub extra_args: Vec<String>,
    /// Eject the medium when done
    pub eject_on_finish: bool,
    /// Allow writing beyond the official capacity
    pub overburn: bool,
    /// Backend fifo size in MB
    pub buffer_size: Option<u32>,
}

impl WriteRequest {
    /// Create a request with defaults (TAO, auto speed)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set writing mode
    pub fn mode(mut self, mode: WritingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set speed factor
    pub fn speed(mut self, speed: u32) -> Self {
        self.speed = speed;
        self
    }

    /// Set simulation
    pub fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Set buffer underrun protection
    pub fn burnfree(mut self, burnfree: bool) -> Self {
        self.burnfree = burnfree;
        self
    }

    /// Write from a cue sheet
    pub fn cue_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cue_file = Some(path.into());
        self
    }

    /// Set clone mode
    pub fn clone_mode(mut self, clone: bool) -> Self {
        self.clone = clone;
        self
    }

    /// Append an extra backend argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Set eject on finish
    pub fn eject_on_finish(mut self, eject: bool) -> Self {
        self.eject_on_finish = eject;
        self
    }

    /// Set overburning
    pub fn overburn(mut self, overburn: bool) -> Self {
        self.overburn = overburn;
        self
    }

    /// Set a manual fifo size in MB
    pub fn buffer_size(mut self, megabytes: Option<u32>) -> Self {
        self.buffer_size = megabytes;
        self
    }
}

/// A ready-to-spawn command line plus the warnings produced while building it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable
    pub program: PathBuf,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Working directory, if the backend needs one
    pub cwd: Option<PathBuf>,
    /// Speed factor actually requested (0 = backend default)
    pub speed: u32,
    /// Whether buffer underrun protection was switched on
    pub burnfree: bool,
    /// Messages for the user about options that had to be dropped
    pub warnings: Vec<String>,
}

impl CommandLine {
    /// Program and arguments joined for display
    pub fn display(&self) -> String {
        let mut s = self.program.display().to_string();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }
}

/// How a rule decides whether it applies to a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Line starts with the text
    StartsWith(&'static str),
    /// Line contains the text
    Contains(&'static str),
}

impl Matcher {
    /// Whether the line matches
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Matcher::StartsWith(prefix) => line.starts_with(prefix),
            Matcher::Contains(needle) => line.contains(needle),
        }
    }

    /// The text the matcher looks for
    pub fn text(&self) -> &'static str {
        match self {
            Matcher::StartsWith(s) | Matcher::Contains(s) => s,
        }
    }
}

/// What the parser does with a matching line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    /// `Track NN ...`: roster entry or progress line
    Track,
    /// Progress line without the `Track` prefix
    Progress,
    /// Negotiated speed announcement
    SpeedAnnouncement,
    /// Start of a new track
    TrackStart,
    /// Disc is being fixated
    Fixating,
    /// Countdown before writing starts
    Countdown,
    /// Lead-in is being written
    LeadIn,
    /// Lead-out is being written
    LeadOut,
    /// Pregap is being written
    Pregap,
    /// Optimum power calibration
    Opc,
    /// Cue sheet is being sent
    SendingCueSheet,
    /// Underrun protection switched on
    BurnfreeEnabled,
    /// Drive announced a media reload
    ReloadNeeded,
    /// Drive cannot write disc-at-once
    DaoUnsupported,
    /// Harmless I/O error notice
    IoError,
    /// Backend waits for the user to reload the medium
    ReloadPrompt,
    /// A failure cause
    Latch(ErrorCode),
}

/// One entry of a backend's ordered rule table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseRule {
    /// When the rule applies
    pub matcher: Matcher,
    /// What to do
    pub action: LineAction,
}

const fn rule(matcher: Matcher, action: LineAction) -> ParseRule {
    ParseRule { matcher, action }
}

use LineAction as A;
use Matcher::{Contains, StartsWith};

/// Rules for cdrecord and its wodim fork, evaluated top to bottom
static CDRECORD_RULES: &[ParseRule] = &[
    rule(StartsWith("Track "), A::Track),
    rule(Contains("fifo"), A::Progress),
    rule(Contains("at speed"), A::SpeedAnnouncement),
    rule(StartsWith("Starting new"), A::TrackStart),
    rule(StartsWith("Fixating"), A::Fixating),
    rule(Contains("seconds."), A::Countdown),
    rule(StartsWith("Writing lead-in"), A::LeadIn),
    rule(StartsWith("Writing Leadout"), A::LeadOut),
    rule(StartsWith("Writing pregap"), A::Pregap),
    rule(StartsWith("Performing OPC"), A::Opc),
    rule(StartsWith("Sending"), A::SendingCueSheet),
    rule(Contains("Turning BURN-Proof"), A::BurnfreeEnabled),
    rule(Contains("Drive needs to reload the media"), A::ReloadNeeded),
    rule(
        Contains("The current problem looks like a buffer underrun"),
        A::Latch(ErrorCode::BufferUnderrun),
    ),
    rule(Contains("Drive does not support SAO"), A::DaoUnsupported),
    rule(Contains("Data may not fit"), A::Latch(ErrorCode::Oversize)),
    rule(Contains("Bad Option"), A::Latch(ErrorCode::BadOption)),
    rule(Contains("shmget failed"), A::Latch(ErrorCode::ShmgetFailed)),
    rule(Contains("OPC failed"), A::Latch(ErrorCode::OpcFailed)),
    rule(
        Contains("Cannot set speed/dummy"),
        A::Latch(ErrorCode::CannotSetSpeed),
    ),
    rule(
        Contains("Cannot open new session"),
        A::Latch(ErrorCode::CannotOpenSession),
    ),
    rule(
        Contains("Cannot send CUE sheet"),
        A::Latch(ErrorCode::CannotSendCueSheet),
    ),
    rule(Contains("Input/output error."), A::IoError),
    rule(
        Contains("Permission denied. Cannot open"),
        A::Latch(ErrorCode::PermissionDenied),
    ),
    rule(
        Contains("Trying to use ultra high speed medium on improper writer"),
        A::Latch(ErrorCode::HighSpeedMedium),
    ),
    rule(StartsWith("Re-load disk and hit"), A::ReloadPrompt),
];

/// Supported burning backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Jörg Schilling's cdrecord
    #[default]
    Cdrecord,
    /// The cdrkit fork of cdrecord
    Wodim,
}

impl Backend {
    /// Program name looked up by the locator
    pub fn program(&self) -> &'static str {
        match self {
            Backend::Cdrecord => "cdrecord",
            Backend::Wodim => "wodim",
        }
    }

    /// Ordered rule table for this backend's output
    pub fn rules(&self) -> &'static [ParseRule] {
        match self {
            Backend::Cdrecord | Backend::Wodim => CDRECORD_RULES,
        }
    }

    /// Phrases that latch a failure cause, in table order
    pub fn error_phrases(&self) -> impl Iterator<Item = (&'static str, ErrorCode)> {
        self.rules().iter().filter_map(|r| match r.action {
            LineAction::Latch(code) => Some((r.matcher.text(), code)),
            _ => None,
        })
    }

    /// Build the command line for a run
    pub fn build_command(
        &self,
        bin: &ExternalBin,
        request: &WriteRequest,
        device: &dyn BurnDevice,
    ) -> CommandLine {
        let mut args = Vec::new();
        let mut warnings = Vec::new();
        let mut cwd = None;

        args.push("-v".to_string());

        if bin.has_feature(FEATURE_GRACETIME) {
            // 2 is the lowest value cdrecord accepts
            args.push("gracetime=2".to_string());
        }

        args.push(format!("dev={}", device.external_parameter()));

        let mut speed = request.speed;
        if speed == 0 {
            speed = device.max_write_speed().unwrap_or(0) / AUTO_SPEED_DIVISOR;
        }
        if speed != 0 {
            args.push(format!("speed={}", speed));
        }

        match request.mode {
            WritingMode::Dao => {
                if device.supports_dao() {
                    args.push("-dao".to_string());
                } else {
                    warnings.push("Writer does not support disk at once (DAO) recording".to_string());
                }
            }
            WritingMode::Raw => args.push("-raw".to_string()),
            WritingMode::Tao => {}
        }

        if request.simulate {
            args.push("-dummy".to_string());
        }

        let mut burnfree = false;
        if request.burnfree {
            if device.supports_burnfree() {
                burnfree = true;
                args.push(self.burnfree_option(bin).to_string());
            } else {
                warnings.push(
                    "Writer does not support buffer underrun free recording (BURNPROOF)"
                        .to_string(),
                );
            }
        }

        if let Some(ref cue) = request.cue_file {
            cwd = cue.parent().filter(|p| !p.as_os_str().is_empty()).map(PathBuf::from);
            args.push(format!("cuefile={}", cue.display()));
        }

        if request.clone {
            args.push("-clone".to_string());
        }

        if request.eject_on_finish {
            args.push("-eject".to_string());
        }

        if let Some(size) = request.buffer_size {
            args.push(format!("fs={}m", size));
        }

        if request.overburn {
            if bin.has_feature(FEATURE_OVERBURN) {
                args.push("-overburn".to_string());
            } else {
                warnings.push(format!(
                    "{} {} does not support overburning!",
                    bin.name, bin.version
                ));
            }
        }

        args.extend(bin.user_parameters.iter().cloned());
        args.extend(request.extra_args.iter().cloned());

        CommandLine {
            program: bin.path.clone(),
            args,
            cwd,
            speed,
            burnfree,
            warnings,
        }
    }

    fn burnfree_option(&self, bin: &ExternalBin) -> &'static str {
        // cdrecord 1.11a02 renamed burnproof to burnfree
        let renamed = BinVersion::new(1, 11, None, Some("a02"));
        match self {
            Backend::Cdrecord
                if !bin.has_feature(FEATURE_BURNFREE) && bin.version < renamed =>
            {
                "driveropts=burnproof"
            }
            _ => "driveropts=burnfree",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cdrecord" => Ok(Backend::Cdrecord),
            "wodim" => Ok(Backend::Wodim),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

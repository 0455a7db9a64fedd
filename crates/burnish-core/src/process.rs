//! Supervision of the backend child process
//!
//! [`ProcessSupervisor`] spawns the backend with piped stdio and turns its two
//! output streams into a single, ordered feed of [`ProcessEvent`]s. Each stream
//! gets a reader thread. A third thread waits for both readers to reach EOF,
//! reaps the child, and sends exactly one [`ProcessEvent::Exited`].

use crate::error::{Error, Result};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Read buffer size for the output pipes
const READ_BUFFER_SIZE: usize = 4096;

/// Delay between polls of the child's exit status once its pipes are closed
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Output stream a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// How the backend ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Regular exit with an exit code
    Normal(i32),
    /// Killed by a signal, or the exit status could not be determined
    Abnormal,
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ProcessExit::Normal(code),
            None => ProcessExit::Abnormal,
        }
    }
}

/// Events delivered by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One complete, non-empty line of output
    Line {
        /// Stream the line came from
        stream: Stream,
        /// Line text without terminator
        text: String,
    },
    /// The child exited; always the last event
    Exited(ProcessExit),
}

/// Something that accepts bytes for the backend's standard input
pub trait InputSink {
    /// Write all of `bytes`, returning the number written
    fn write_input(&mut self, bytes: &[u8]) -> Result<usize>;
}

/// Splits a byte stream into lines on `\n` and `\r`
///
/// cdrecord redraws its progress line with carriage returns, so both
/// characters end a line. Empty lines are dropped and invalid UTF-8 is
/// replaced.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Create an empty splitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the lines it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush an unterminated last line
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Shared handle that terminates the backend at most once
#[derive(Debug, Clone)]
pub struct KillHandle {
    child: Arc<Mutex<Child>>,
    killed: Arc<AtomicBool>,
}

impl KillHandle {
    /// Kill the child process
    ///
    /// Returns `true` for the call that actually sent the signal; every later
    /// call, from any clone, is a no-op returning `false`.
    pub fn terminate(&self) -> bool {
        if self.killed.swap(true, Ordering::SeqCst) {
            return false;
        }

        let mut child = lock_child(&self.child);
        debug!("Terminating backend process {}", child.id());
        if let Err(e) = child.kill() {
            // Already reaped or gone
            debug!("Kill failed: {}", e);
        }
        true
    }

    /// Whether [`KillHandle::terminate`] has been called
    pub fn is_terminated(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owner of a running backend process
#[derive(Debug)]
pub struct ProcessSupervisor {
    program: PathBuf,
    pid: u32,
    stdin: Option<ChildStdin>,
    killer: KillHandle,
    events: Receiver<ProcessEvent>,
    waiter: Option<JoinHandle<()>>,
    exited: bool,
}

impl ProcessSupervisor {
    /// Spawn `program` with `args`, optionally inside `cwd`
    pub fn start(program: &Path, args: &[String], cwd: Option<&Path>) -> Result<Self> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| Error::Launch {
            program: program.to_path_buf(),
            source,
        })?;
        let pid = child.id();
        debug!("Started {} (pid {})", program.display(), pid);

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = stdout {
            readers.push(spawn_reader(out, Stream::Stdout, tx.clone()));
        }
        if let Some(err) = stderr {
            readers.push(spawn_reader(err, Stream::Stderr, tx.clone()));
        }

        let child = Arc::new(Mutex::new(child));
        let killer = KillHandle {
            child: Arc::clone(&child),
            killed: Arc::new(AtomicBool::new(false)),
        };

        let waiter = thread::Builder::new()
            .name("backend-waiter".to_string())
            .spawn(move || wait_for_exit(child, readers, tx))?;

        Ok(Self {
            program: program.to_path_buf(),
            pid,
            stdin,
            killer,
            events: rx,
            waiter: Some(waiter),
            exited: false,
        })
    }

    /// Program this supervisor runs
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// OS process id of the child
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// A cloneable handle that can kill the child from another thread
    pub fn kill_handle(&self) -> KillHandle {
        self.killer.clone()
    }

    /// Kill the child; see [`KillHandle::terminate`]
    pub fn terminate(&self) -> bool {
        self.killer.terminate()
    }

    /// Close the child's standard input
    pub fn close_input(&mut self) {
        self.stdin = None;
    }

    /// Block until the next event
    ///
    /// Returns `None` once [`ProcessEvent::Exited`] has been delivered.
    pub fn recv(&mut self) -> Option<ProcessEvent> {
        if self.exited {
            return None;
        }
        match self.events.recv() {
            Ok(event) => {
                if matches!(event, ProcessEvent::Exited(_)) {
                    self.exited = true;
                }
                Some(event)
            }
            Err(_) => {
                // Waiter thread died without reporting
                self.exited = true;
                Some(ProcessEvent::Exited(ProcessExit::Abnormal))
            }
        }
    }
}

impl InputSink for ProcessSupervisor {
    fn write_input(&mut self, bytes: &[u8]) -> Result<usize> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            Error::Pipe(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"))
        })?;
        stdin.write_all(bytes).map_err(Error::Pipe)?;
        stdin.flush().map_err(Error::Pipe)?;
        Ok(bytes.len())
    }
}

impl Iterator for ProcessSupervisor {
    type Item = ProcessEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.stdin = None;
        if !self.exited {
            self.killer.terminate();
        }
        if let Some(waiter) = self.waiter.take() {
            if waiter.join().is_err() {
                warn!("Backend waiter thread panicked");
            }
        }
    }
}

fn spawn_reader<R>(mut pipe: R, stream: Stream, tx: Sender<ProcessEvent>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut splitter = LineSplitter::new();
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            let n = match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("Read from backend {:?} failed: {}", stream, e);
                    break;
                }
            };
            for text in splitter.push(&buf[..n]) {
                if tx.send(ProcessEvent::Line { stream, text }).is_err() {
                    return;
                }
            }
        }

        if let Some(text) = splitter.finish() {
            let _ = tx.send(ProcessEvent::Line { stream, text });
        }
    })
}

fn wait_for_exit(child: Arc<Mutex<Child>>, readers: Vec<JoinHandle<()>>, tx: Sender<ProcessEvent>) {
    for reader in readers {
        if reader.join().is_err() {
            warn!("Backend output reader panicked");
        }
    }

    // The lock is released between polls so a concurrent kill is never blocked
    let exit = loop {
        let status = lock_child(&child).try_wait();
        match status {
            Ok(Some(status)) => break ProcessExit::from(status),
            Ok(None) => thread::sleep(REAP_POLL_INTERVAL),
            Err(e) => {
                warn!("Could not reap backend process: {}", e);
                break ProcessExit::Abnormal;
            }
        }
    };

    debug!("Backend exited: {:?}", exit);
    let _ = tx.send(ProcessEvent::Exited(exit));
}

// ============================================================================
// UNIT TESTS
// ============================================================================

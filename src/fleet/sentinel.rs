//! Sentinel completion protocol.
//!
//! A remote shell's output is an unframed byte stream, so there is no way to
//! tell when a command is done. After each command we send a second line,
//! `echo <sentinel>`, and read until a line equal to the sentinel shows up.
//! Everything before that line is the command's output.
//!
//! Each invocation gets a fresh random sentinel, so a marker left over from a
//! command that timed out can never end a later read early. A command that
//! itself prints the exact sentinel line still truncates its own output.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::session::ShellOutput;

pub const SENTINEL_PREFIX: &str = "cook-exec-label:done";

fn is_stale_marker(line: &str) -> bool {
    line.strip_prefix(SENTINEL_PREFIX)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// A completion marker unique to one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel(String);

impl Sentinel {
    pub fn generate() -> Self {
        Self(format!("{}:{}", SENTINEL_PREFIX, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The input written to the shell: the command line, then the echo.
    pub fn wrap(&self, command: &str) -> String {
        format!("{}\necho {}\n", command.trim_end(), self.0)
    }
}

/// How a read loop ended, with the output gathered before it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The sentinel arrived.
    Done(String),
    /// The deadline passed first; the output is partial.
    TimedOut(String),
    /// The stream ended first; the output is partial.
    Closed(String),
}

impl Completion {
    pub fn output(&self) -> &str {
        match self {
            Completion::Done(out) | Completion::TimedOut(out) | Completion::Closed(out) => out,
        }
    }

    pub fn into_output(self) -> String {
        match self {
            Completion::Done(out) | Completion::TimedOut(out) | Completion::Closed(out) => out,
        }
    }
}

/// Splits incoming bytes into lines and watches for the sentinel.
///
/// Bytes past the sentinel line stay in `pending` for the next invocation on
/// the same session.
#[derive(Debug, Default)]
pub struct LineScanner {
    pending: Vec<u8>,
    output: Vec<u8>,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `chunk` and scan it. Returns true once the sentinel line is seen.
    pub fn feed(&mut self, chunk: &[u8], sentinel: &str) -> bool {
        self.pending.extend_from_slice(chunk);
        self.scan(sentinel)
    }

    /// Move complete lines from `pending` to the output until the sentinel.
    ///
    /// A marker from an earlier, abandoned invocation closes that command's
    /// late output: the marker and everything gathered before it are dropped.
    pub fn scan(&mut self, sentinel: &str) -> bool {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text == sentinel {
                return true;
            }
            if is_stale_marker(text) {
                debug!("Discarding output of an abandoned command");
                self.output.clear();
                continue;
            }
            self.output.extend_from_slice(&line);
        }
        false
    }

    /// Take the completed lines, keeping any unterminated tail.
    pub fn take_output(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.output).into_owned();
        self.output.clear();
        out
    }

    /// Take everything buffered, including an unterminated tail.
    pub fn take_partial(&mut self) -> String {
        self.output.append(&mut self.pending);
        self.take_output()
    }
}

/// Read from `source` until the sentinel line arrives, the stream closes, or
/// `timeout` elapses.
pub async fn read_until_sentinel(
    source: &mut dyn ShellOutput,
    scanner: &mut LineScanner,
    sentinel: &Sentinel,
    timeout: Duration,
) -> Completion {
    let deadline = Instant::now() + timeout;

    if scanner.scan(sentinel.as_str()) {
        return Completion::Done(scanner.take_output());
    }

    loop {
        match tokio::time::timeout_at(deadline, source.next_chunk()).await {
            Ok(Some(chunk)) => {
                if scanner.feed(&chunk, sentinel.as_str()) {
                    return Completion::Done(scanner.take_output());
                }
            }
            Ok(None) => return Completion::Closed(scanner.take_partial()),
            Err(_) => return Completion::TimedOut(scanner.take_partial()),
        }
    }
}

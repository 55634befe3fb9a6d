//! Interactive remote shell sessions.
//!
//! # Architecture
//!
//! - `SshClientHandler`: russh handler that accepts every host key (like
//!   `StrictHostKeyChecking=no`). This is a known, not-fully-secure default.
//! - `ShellInput` / `ShellOutput`: the write and read halves of one shell.
//!   The SSH implementations wrap a split russh channel.
//! - `Session`: one live shell keyed by its host label. Commands run on it
//!   through the sentinel protocol.
//!
//! # Thread Safety
//!
//! The read half sits behind a `tokio::sync::Mutex` so only one read loop runs
//! per session at a time, and that lock is taken before the command is
//! written. The write half needs no lock since russh writes take `&self`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{ChannelMsg, ChannelReadHalf, ChannelWriteHalf, Disconnect, client, keys};
use tokio::sync::Mutex;
use tracing::debug;

use super::error::CookError;
use super::sentinel::{Completion, LineScanner, Sentinel, read_until_sentinel};
use super::types::SessionInfo;

/// Client handler for russh that accepts all host keys.
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Write side of a shell: command input.
#[async_trait]
pub trait ShellInput: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<(), String>;

    /// Close the shell and its underlying connection.
    async fn close(&self);
}

/// Read side of a shell: combined stdout and stderr.
#[async_trait]
pub trait ShellOutput: Send {
    /// Next chunk of output, or `None` once the stream has ended.
    async fn next_chunk(&mut self) -> Option<Vec<u8>>;
}

/// Command input over an SSH channel.
///
/// Holds the connection handle too, since dropping the last handle ends the
/// connection.
pub struct SshShellInput {
    write_half: ChannelWriteHalf<client::Msg>,
    handle: Arc<client::Handle<SshClientHandler>>,
}

impl SshShellInput {
    pub fn new(
        write_half: ChannelWriteHalf<client::Msg>,
        handle: Arc<client::Handle<SshClientHandler>>,
    ) -> Self {
        Self { write_half, handle }
    }
}

#[async_trait]
impl ShellInput for SshShellInput {
    async fn write(&self, data: &[u8]) -> Result<(), String> {
        self.write_half
            .data(data)
            .await
            .map_err(|e| format!("Failed to write to shell: {}", e))
    }

    async fn close(&self) {
        if let Err(e) = self.write_half.close().await {
            debug!("Error closing shell channel: {}", e);
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "Session closed by cook", "en")
            .await
        {
            debug!("Error during disconnect: {}", e);
        }
    }
}

/// Shell output over an SSH channel. Stderr is merged into the same stream.
pub struct SshShellOutput {
    read_half: ChannelReadHalf,
}

impl SshShellOutput {
    pub fn new(read_half: ChannelReadHalf) -> Self {
        Self { read_half }
    }
}

#[async_trait]
impl ShellOutput for SshShellOutput {
    async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.read_half.wait().await? {
                ChannelMsg::Data { data } => return Some(data.to_vec()),
                ChannelMsg::ExtendedData { data, .. } => return Some(data.to_vec()),
                ChannelMsg::Eof | ChannelMsg::Close => return None,
                _ => {}
            }
        }
    }
}

struct SessionReader {
    source: Box<dyn ShellOutput>,
    scanner: LineScanner,
}

/// One live interactive shell on a remote host.
pub struct Session {
    info: SessionInfo,
    input: Box<dyn ShellInput>,
    reader: Mutex<SessionReader>,
}

impl Session {
    pub fn new(info: SessionInfo, input: Box<dyn ShellInput>, output: Box<dyn ShellOutput>) -> Self {
        Self {
            info,
            input,
            reader: Mutex::new(SessionReader {
                source: output,
                scanner: LineScanner::new(),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.info.label
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Run `command` and wait up to `timeout` for its sentinel.
    ///
    /// Only a failed write is an error; timeouts and closed streams come back
    /// as a [`Completion`] carrying the partial output.
    pub async fn run(&self, command: &str, timeout: Duration) -> Result<Completion, CookError> {
        let sentinel = Sentinel::generate();
        let mut reader = self.reader.lock().await;

        self.input
            .write(sentinel.wrap(command).as_bytes())
            .await
            .map_err(|reason| CookError::Write {
                host: self.info.label.clone(),
                reason,
            })?;

        let SessionReader { source, scanner } = &mut *reader;
        Ok(read_until_sentinel(source.as_mut(), scanner, &sentinel, timeout).await)
    }

    pub async fn close(&self) {
        self.input.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::sentinel::SENTINEL_PREFIX;
    use crate::fleet::testing::{FakeHost, fake_session};

    mod running {
        use super::*;

        #[tokio::test]
        async fn test_run_returns_command_output() {
            let session = fake_session("web-1", FakeHost::new("root", "/root"));
            let result = session.run("pwd", Duration::from_secs(1)).await.unwrap();
            assert_eq!(result, Completion::Done("/root\n".to_string()));
        }

        #[tokio::test]
        async fn test_consecutive_runs_do_not_mix_output() {
            let session = fake_session("web-1", FakeHost::new("deploy", "/srv"));
            let first = session.run("whoami", Duration::from_secs(1)).await.unwrap();
            let second = session.run("pwd", Duration::from_secs(1)).await.unwrap();
            assert_eq!(first.output(), "deploy\n");
            assert_eq!(second.output(), "/srv\n");
        }

        #[tokio::test]
        async fn test_hung_host_times_out() {
            let session = fake_session("slow", FakeHost::new("root", "/").hung());
            let result = session.run("pwd", Duration::from_millis(50)).await.unwrap();
            assert!(matches!(result, Completion::TimedOut(_)));
        }

        #[tokio::test]
        async fn test_late_output_of_timed_out_run_is_not_carried_over() {
            let host = FakeHost::new("root", "/root").with_delay(Duration::from_millis(200));
            let session = fake_session("web-1", host);

            let first = session.run("pwd", Duration::from_millis(50)).await.unwrap();
            assert_eq!(first, Completion::TimedOut(String::new()));

            tokio::time::sleep(Duration::from_millis(400)).await;

            let second = session.run("echo hi", Duration::from_secs(2)).await.unwrap();
            assert_eq!(second, Completion::Done("hi\n".to_string()));
            assert!(!second.output().contains(SENTINEL_PREFIX));
        }

        #[tokio::test]
        async fn test_next_run_waits_past_abandoned_output() {
            let host = FakeHost::new("root", "/root").with_delay(Duration::from_millis(200));
            let session = fake_session("web-1", host);

            let first = session.run("pwd", Duration::from_millis(50)).await.unwrap();
            assert!(matches!(first, Completion::TimedOut(_)));

            let second = session.run("echo hi", Duration::from_secs(2)).await.unwrap();
            assert_eq!(second, Completion::Done("hi\n".to_string()));
        }

        #[tokio::test]
        async fn test_write_after_close_fails() {
            let session = fake_session("db-1", FakeHost::new("root", "/"));
            session.close().await;
            let result = session.run("pwd", Duration::from_millis(50)).await;
            assert!(matches!(result, Err(CookError::Write { host, .. }) if host == "db-1"));
        }
    }

    mod metadata {
        use super::*;

        #[tokio::test]
        async fn test_label_and_info() {
            let session = fake_session("edge-3", FakeHost::new("root", "/"));
            assert_eq!(session.label(), "edge-3");
            assert_eq!(session.info().user, "root");
        }
    }
}

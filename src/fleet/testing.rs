//! In-memory shells for exercising sessions without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::CookError;
use super::pool::Connector;
use super::registry::ServerSpec;
use super::session::{Session, ShellInput, ShellOutput};
use super::types::SessionInfo;

/// Output that replays fixed chunks, then either ends or goes quiet forever.
pub(crate) struct ScriptedOutput {
    chunks: VecDeque<String>,
    close_at_end: bool,
}

impl ScriptedOutput {
    pub(crate) fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks: chunks.into(),
            close_at_end: false,
        }
    }

    pub(crate) fn closing(chunks: Vec<String>) -> Self {
        Self {
            chunks: chunks.into(),
            close_at_end: true,
        }
    }
}

#[async_trait]
impl ShellOutput for ScriptedOutput {
    async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Some(chunk.into_bytes());
        }
        if self.close_at_end {
            return None;
        }
        std::future::pending().await
    }
}

/// Behavior of a simulated remote shell.
///
/// Understands `whoami`, `pwd`, `echo`, and `sleep <secs>`; anything else
/// prints a "command not found" line.
#[derive(Debug, Clone)]
pub(crate) struct FakeHost {
    user: String,
    cwd: String,
    delay: Duration,
    hung: bool,
    banner: String,
}

impl FakeHost {
    pub(crate) fn new(user: &str, cwd: &str) -> Self {
        Self {
            user: user.to_string(),
            cwd: cwd.to_string(),
            delay: Duration::ZERO,
            hung: false,
            banner: String::new(),
        }
    }

    /// Wait this long before answering each non-echo command.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Print `banner` ahead of the first answer, like a login profile.
    pub(crate) fn with_banner(mut self, banner: &str) -> Self {
        self.banner = banner.to_string();
        self
    }

    /// Accept input but never write anything back.
    pub(crate) fn hung(mut self) -> Self {
        self.hung = true;
        self
    }

    fn respond(&self, line: &str) -> String {
        match line {
            "" => String::new(),
            "whoami" => format!("{}\n", self.user),
            "pwd" => format!("{}\n", self.cwd),
            _ if line.starts_with("sleep ") => String::new(),
            _ => match line.strip_prefix("echo ") {
                Some(text) => format!("{}\n", text),
                None => format!("sh: {}: command not found\n", line),
            },
        }
    }
}

struct FakeInput {
    tx: StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl ShellInput for FakeInput {
    async fn write(&self, data: &[u8]) -> Result<(), String> {
        let guard = self.tx.lock().map_err(|e| e.to_string())?;
        match guard.as_ref() {
            Some(tx) => tx
                .send(data.to_vec())
                .map_err(|_| "broken pipe".to_string()),
            None => Err("broken pipe".to_string()),
        }
    }

    async fn close(&self) {
        let sender = self.tx.lock().ok().and_then(|mut guard| guard.take());
        if sender.is_some() {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeOutput {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl ShellOutput for FakeOutput {
    async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

fn spawn_session(info: SessionInfo, host: FakeHost, closes: Arc<AtomicUsize>) -> Session {
    let (in_tx, mut in_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        let mut banner = Some(host.banner.clone()).filter(|b| !b.is_empty());
        let mut pending: Vec<u8> = Vec::new();
        while let Some(bytes) = in_rx.recv().await {
            pending.extend_from_slice(&bytes);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if host.hung {
                    continue;
                }
                if let Some(secs) = line
                    .strip_prefix("sleep ")
                    .and_then(|s| s.trim().parse::<u64>().ok())
                {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                }
                if !line.starts_with("echo ") && !host.delay.is_zero() {
                    tokio::time::sleep(host.delay).await;
                }
                let mut answer = banner.take().unwrap_or_default();
                answer.push_str(&host.respond(&line));
                if out_tx.send(answer.into_bytes()).is_err() {
                    return;
                }
            }
        }
    });

    Session::new(
        info,
        Box::new(FakeInput {
            tx: StdMutex::new(Some(in_tx)),
            closes,
        }),
        Box::new(FakeOutput { rx: out_rx }),
    )
}

/// A session backed by a simulated shell. Must be called inside a runtime.
pub(crate) fn fake_session(label: &str, host: FakeHost) -> Session {
    let info = SessionInfo {
        label: label.to_string(),
        address: format!("{}:22", label),
        user: host.user.clone(),
        connected_at: "2026-01-01T00:00:00+00:00".to_string(),
    };
    spawn_session(info, host, Arc::new(AtomicUsize::new(0)))
}

/// Connector that opens simulated shells for known labels and refuses others.
pub(crate) struct FakeConnector {
    hosts: HashMap<String, FakeHost>,
    opened: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self {
            hosts: HashMap::new(),
            opened: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_host(mut self, label: &str, host: FakeHost) -> Self {
        self.hosts.insert(label.to_string(), host);
        self
    }

    /// Count of sessions opened so far.
    pub(crate) fn opened(&self) -> Arc<AtomicUsize> {
        self.opened.clone()
    }

    /// Count of sessions closed so far.
    pub(crate) fn closes(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, spec: &ServerSpec) -> Result<Session, CookError> {
        let host = self
            .hosts
            .get(&spec.label)
            .cloned()
            .ok_or_else(|| CookError::Dial {
                host: spec.address(),
                reason: "Connection refused".to_string(),
            })?;

        self.opened.fetch_add(1, Ordering::SeqCst);

        let info = SessionInfo {
            label: spec.label.clone(),
            address: spec.address(),
            user: spec.user.clone(),
            connected_at: chrono::Utc::now().to_rfc3339(),
        };
        Ok(spawn_session(info, host, self.closes.clone()))
    }
}

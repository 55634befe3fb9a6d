//! Line-oriented operator commands.
//!
//! - `connect --all` / `connect --tags t1,t2`: open sessions to a selection
//! - `exec <command>`: broadcast a command to every pooled session
//! - `sessions`: list pooled sessions
//! - `disconnect <label>`: close one session
//! - `tags`: list known tags
//! - `quit` / `exit`: leave

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

use super::broadcast::broadcast;
use super::error::CookError;
use super::pool::SessionPool;
use super::registry::SharedRegistry;
use super::selector::{Selection, select};
use super::types::{ConnectSummary, HostOutput};

pub const PROMPT: &str = "cook> ";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Connect(Selection),
    Exec(String),
    Sessions,
    Disconnect(String),
    Tags,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, CookError> {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(Command::Empty);
        };

        match head {
            "quit" | "exit" => Ok(Command::Quit),
            "connect" => {
                let incomplete = || CookError::IncompleteArguments {
                    input: line.to_string(),
                };
                match (words.next(), words.next(), words.next()) {
                    (Some("--all"), None, _) => Ok(Command::Connect(Selection::All)),
                    (Some("--tags"), Some(list), None) => {
                        let tags: Vec<String> = list
                            .split(',')
                            .map(str::trim)
                            .filter(|t| !t.is_empty())
                            .map(str::to_string)
                            .collect();
                        if tags.is_empty() {
                            return Err(incomplete());
                        }
                        Ok(Command::Connect(Selection::Tags(tags)))
                    }
                    _ => Err(incomplete()),
                }
            }
            "exec" => {
                let command = line["exec".len()..].trim();
                if command.is_empty() {
                    return Err(CookError::EmptyCommand);
                }
                Ok(Command::Exec(command.to_string()))
            }
            "sessions" => Ok(Command::Sessions),
            "tags" => Ok(Command::Tags),
            "disconnect" => match (words.next(), words.next()) {
                (Some(label), None) => Ok(Command::Disconnect(label.to_string())),
                _ => Err(CookError::IncompleteArguments {
                    input: line.to_string(),
                }),
            },
            _ => Err(CookError::UnknownCommand {
                input: line.to_string(),
            }),
        }
    }
}

/// Whether the front end should keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Dispatches parsed commands against the registry and the session pool.
pub struct Executor {
    registry: SharedRegistry,
    pool: SessionPool,
    exec_timeout: Duration,
}

impl Executor {
    pub fn new(registry: SharedRegistry, pool: SessionPool, exec_timeout: Duration) -> Self {
        Self {
            registry,
            pool,
            exec_timeout,
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Handle one input line. Every error is reported and recovered from.
    pub async fn exec(&self, line: &str) -> Flow {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("{}", e);
                return Flow::Continue;
            }
        };

        match command {
            Command::Empty => {}
            Command::Quit => {
                println!("Bye!");
                return Flow::Quit;
            }
            Command::Connect(selection) => {
                self.connect(&selection).await;
            }
            Command::Exec(command) => {
                self.run(&command).await;
            }
            Command::Sessions => self.print_sessions(),
            Command::Tags => self.print_tags(),
            Command::Disconnect(label) => {
                if !self.pool.disconnect(&label).await {
                    warn!("No session for {}", label);
                }
            }
        }
        Flow::Continue
    }

    /// Resolve `selection` and connect to the resulting targets.
    pub async fn connect(&self, selection: &Selection) -> ConnectSummary {
        let targets = {
            let registry = match self.registry.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let (targets, _unknown) = select(&registry, selection);
            targets
        };

        info!(
            "Connecting to {} servers: {:?}",
            targets.len(),
            targets.labels()
        );
        self.pool.connect(targets.into_servers()).await
    }

    /// Broadcast `command`, printing each host's block as it completes.
    pub async fn run(&self, command: &str) -> Vec<HostOutput> {
        broadcast(self.pool.sessions(), command, self.exec_timeout, |output| {
            println!("{}", output.render())
        })
        .await
    }

    fn print_sessions(&self) {
        let sessions = self.pool.list();
        if sessions.is_empty() {
            println!("No established connections");
            return;
        }
        for info in sessions {
            println!(
                "{}\t{}@{}\tsince {}",
                info.label, info.user, info.address, info.connected_at
            );
        }
    }

    fn print_tags(&self) {
        let registry = match self.registry.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for tag in registry.tags() {
            let count = registry.servers_for_tag(tag).map_or(0, <[_]>::len);
            println!("{}\t{} servers", tag, count);
        }
    }

    /// Close every pooled session.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Read and run commands until quit, end of input, or `interrupt`.
    ///
    /// `interrupt` is watched while a command runs too, so a long connect or
    /// exec is abandoned when it fires. Every session is closed on return.
    pub async fn serve<R, I>(&self, input: R, interrupt: I)
    where
        R: AsyncBufRead + Unpin,
        I: Future,
    {
        let mut lines = input.lines();
        tokio::pin!(interrupt);

        loop {
            prompt();
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = &mut interrupt => {
                    println!();
                    info!("Interrupted");
                    break;
                }
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            };

            let flow = tokio::select! {
                flow = self.exec(&line) => flow,
                _ = &mut interrupt => {
                    println!();
                    info!("Interrupted");
                    break;
                }
            };
            if flow == Flow::Quit {
                break;
            }
        }

        self.shutdown().await;
    }
}

fn prompt() {
    print!("{}", PROMPT);
    if let Err(e) = std::io::stdout().flush() {
        warn!("Failed to flush stdout: {}", e);
    }
}

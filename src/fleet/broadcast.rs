//! Broadcast one command to every pooled session.
//!
//! Each session gets its own task that writes the command and waits for the
//! sentinel. Results are reported as each host finishes, so a hung host only
//! delays its own block. The call returns once every host has finished or
//! timed out.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::error::CookError;
use super::sentinel::Completion;
use super::session::Session;
use super::types::{HostOutput, HostStatus};

/// Run `command` on every session, calling `report` as each host finishes.
pub async fn broadcast<F>(
    sessions: Vec<Arc<Session>>,
    command: &str,
    timeout: Duration,
    mut report: F,
) -> Vec<HostOutput>
where
    F: FnMut(&HostOutput),
{
    if sessions.is_empty() {
        warn!("No established connections");
        return Vec::new();
    }

    let mut workers = JoinSet::new();
    for session in sessions {
        let command = command.to_string();
        workers.spawn(async move { run_on_host(&session, &command, timeout).await });
    }

    let mut results = Vec::with_capacity(workers.len());
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(output) => {
                report(&output);
                results.push(output);
            }
            Err(e) => error!("Broadcast worker panicked: {}", e),
        }
    }
    results
}

async fn run_on_host(session: &Session, command: &str, timeout: Duration) -> HostOutput {
    let label = session.label().to_string();
    info!("Running on {}: {}", label, command);

    let (status, output, error) = match session.run(command, timeout).await {
        Ok(completion) => {
            let status = match &completion {
                Completion::Done(_) => HostStatus::Completed,
                Completion::TimedOut(_) => {
                    warn!(
                        "{}",
                        CookError::SentinelTimeout {
                            host: label.clone(),
                            timeout,
                        }
                    );
                    HostStatus::TimedOut
                }
                Completion::Closed(_) => {
                    warn!("Shell on {} closed before the command finished", label);
                    HostStatus::Closed
                }
            };
            (status, completion.into_output(), None)
        }
        Err(e) => {
            warn!("{}", e);
            (HostStatus::Failed, String::new(), Some(e.to_string()))
        }
    };

    HostOutput {
        label,
        status,
        output,
        error,
    }
}

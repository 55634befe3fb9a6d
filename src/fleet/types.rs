//! Plain data types shared by the pool, broadcaster, and front end.

use std::fmt;

/// Metadata for a pooled session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub label: String,
    /// `host:port` that was dialed
    pub address: String,
    pub user: String,
    /// RFC 3339 timestamp of when the session passed verification
    pub connected_at: String,
}

/// Final state of one host's broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Completed,
    TimedOut,
    Closed,
    Failed,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostStatus::Completed => write!(f, "completed"),
            HostStatus::TimedOut => write!(f, "timed out"),
            HostStatus::Closed => write!(f, "closed"),
            HostStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One host's result from a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutput {
    pub label: String,
    pub status: HostStatus,
    pub output: String,
    /// Error message when `status` is `Failed`
    pub error: Option<String>,
}

impl HostOutput {
    /// The labeled block shown to the operator.
    ///
    /// ```text
    /// ------- [web-1] log -------
    /// /root
    /// ------- [web-1] -------
    /// ```
    pub fn render(&self) -> String {
        let note = match self.status {
            HostStatus::Completed => String::new(),
            status => format!(" ({})", status),
        };

        let mut block = format!("------- [{}] log{} -------\n", self.label, note);
        block.push_str(&self.output);
        if !self.output.is_empty() && !self.output.ends_with('\n') {
            block.push('\n');
        }
        if let Some(error) = &self.error {
            block.push_str(error);
            block.push('\n');
        }
        block.push_str(&format!("------- [{}] -------", self.label));
        block
    }
}

/// Outcome of one `connect` batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectSummary {
    /// Labels admitted to the pool by this batch
    pub connected: Vec<String>,
    /// Labels that failed, with the reason
    pub failed: Vec<(String, String)>,
    /// Live sessions in the pool after the batch
    pub live: usize,
}

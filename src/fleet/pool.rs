//! Connection pool: concurrent dial, authenticate, and verify.
//!
//! Each target host gets its own task. A host only enters the session map
//! once its shell has answered `whoami` with the configured user. Failures
//! are logged per host and never abort the batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{error, info, warn};

use super::error::CookError;
use super::registry::ServerSpec;
use super::sentinel::Completion;
use super::session::Session;
use super::storage::{DashMapSessionStorage, SessionStorage};
use super::types::{ConnectSummary, SessionInfo};

/// Sanity command run over every new shell.
pub const VERIFY_COMMAND: &str = "whoami";

/// Opens an unverified shell session to one server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, spec: &ServerSpec) -> Result<Session, CookError>;
}

/// Owns the live sessions, keyed by host label.
pub struct SessionPool {
    connector: Arc<dyn Connector>,
    storage: Arc<DashMapSessionStorage>,
    verify_timeout: Duration,
}

impl SessionPool {
    pub fn new(connector: Arc<dyn Connector>, verify_timeout: Duration) -> Self {
        Self {
            connector,
            storage: Arc::new(DashMapSessionStorage::new()),
            verify_timeout,
        }
    }

    /// Connect to every target concurrently and wait for all of them.
    pub async fn connect(&self, targets: Vec<ServerSpec>) -> ConnectSummary {
        let workers = targets.into_iter().map(|spec| {
            let connector = self.connector.clone();
            let storage = self.storage.clone();
            let verify_timeout = self.verify_timeout;
            tokio::spawn(async move {
                let label = spec.label.clone();
                let result = establish(connector.as_ref(), &spec, verify_timeout).await;
                if let Ok(session) = &result
                    && let Some(previous) = storage.insert(label.clone(), session.clone())
                {
                    info!("Replacing existing session for {}", label);
                    previous.close().await;
                }
                (label, result.map(|_| ()))
            })
        });

        let mut summary = ConnectSummary::default();
        for joined in join_all(workers).await {
            match joined {
                Ok((label, Ok(()))) => summary.connected.push(label),
                Ok((label, Err(e))) => {
                    warn!("{}", e);
                    summary.failed.push((label, e.to_string()));
                }
                Err(e) => error!("Connect worker panicked: {}", e),
            }
        }

        summary.live = self.storage.len();
        info!("{} connections established", summary.live);
        summary
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.storage.snapshot()
    }

    pub fn get(&self, label: &str) -> Option<Arc<Session>> {
        self.storage.get(label)
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        self.storage.list()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Close and forget one session. Returns false if the label was unknown.
    pub async fn disconnect(&self, label: &str) -> bool {
        match self.storage.remove(label) {
            Some(session) => {
                session.close().await;
                info!("Session {} disconnected", label);
                true
            }
            None => false,
        }
    }

    /// Close every session.
    pub async fn shutdown(&self) {
        let sessions = self.storage.drain();
        if sessions.is_empty() {
            return;
        }
        info!("Closing {} sessions", sessions.len());
        join_all(sessions.iter().map(|s| s.close())).await;
    }
}

/// Open a session and verify it before it may join the pool.
async fn establish(
    connector: &dyn Connector,
    spec: &ServerSpec,
    verify_timeout: Duration,
) -> Result<Arc<Session>, CookError> {
    let session = connector.open(spec).await?;

    if let Err(e) = verify(&session, spec, verify_timeout).await {
        session.close().await;
        return Err(e);
    }

    Ok(Arc::new(session))
}

/// Run [`VERIFY_COMMAND`] and check it answers with the expected user.
///
/// Only the last non-empty line counts: without a PTY, a login shell may print
/// profile output ahead of the first command's answer.
async fn verify(session: &Session, spec: &ServerSpec, timeout: Duration) -> Result<(), CookError> {
    let failure = |reason: String| CookError::Verification {
        host: spec.address(),
        reason,
    };

    let completion = session
        .run(VERIFY_COMMAND, timeout)
        .await
        .map_err(|e| failure(e.to_string()))?;
    let answer = completion
        .output()
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or_default();

    match &completion {
        Completion::Done(_) if answer == spec.user => Ok(()),
        Completion::Done(_) => Err(failure(format!(
            "expected user '{}', got '{}'",
            spec.user, answer
        ))),
        Completion::TimedOut(_) => Err(failure(format!("no response within {:?}", timeout))),
        Completion::Closed(_) => Err(failure("shell closed during handshake".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::registry::Credential;
    use crate::fleet::testing::{FakeConnector, FakeHost};

    fn spec(label: &str, user: &str) -> ServerSpec {
        ServerSpec {
            host: format!("{}.internal", label),
            port: 22,
            user: user.to_string(),
            credential: Credential::Password("pw".to_string()),
            label: label.to_string(),
            tags: vec!["web".to_string()],
        }
    }

    fn pool(connector: FakeConnector) -> SessionPool {
        SessionPool::new(Arc::new(connector), Duration::from_millis(500))
    }

    mod connecting {
        use super::*;

        #[tokio::test]
        async fn test_connects_all_reachable_hosts() {
            let connector = FakeConnector::new()
                .with_host("a", FakeHost::new("root", "/root"))
                .with_host("b", FakeHost::new("root", "/root"));
            let pool = pool(connector);

            let summary = pool.connect(vec![spec("a", "root"), spec("b", "root")]).await;
            assert_eq!(summary.live, 2);
            assert!(summary.failed.is_empty());
            assert!(pool.get("a").is_some());
            assert!(pool.get("b").is_some());
        }

        #[tokio::test]
        async fn test_unreachable_host_does_not_block_others() {
            let connector = FakeConnector::new().with_host("a", FakeHost::new("root", "/"));
            let pool = pool(connector);

            let summary = pool
                .connect(vec![spec("a", "root"), spec("missing", "root")])
                .await;
            assert_eq!(summary.connected, vec!["a".to_string()]);
            assert_eq!(summary.failed.len(), 1);
            assert_eq!(summary.failed[0].0, "missing");
            assert_eq!(pool.len(), 1);
        }

        #[tokio::test]
        async fn test_empty_target_set() {
            let pool = pool(FakeConnector::new());
            let summary = pool.connect(vec![]).await;
            assert_eq!(summary, ConnectSummary::default());
            assert!(pool.is_empty());
        }
    }

    mod verification {
        use super::*;

        #[tokio::test]
        async fn test_user_mismatch_is_rejected_and_closed() {
            let connector = FakeConnector::new().with_host("a", FakeHost::new("nobody", "/"));
            let closes = connector.closes();
            let pool = pool(connector);

            let summary = pool.connect(vec![spec("a", "root")]).await;
            assert_eq!(summary.live, 0);
            assert!(summary.failed[0].1.contains("expected user 'root'"));
            assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_profile_noise_before_answer_is_accepted() {
            let host = FakeHost::new("root", "/").with_banner("Welcome to web-a\nLast login: today\n");
            let connector = FakeConnector::new().with_host("a", host);
            let pool = pool(connector);

            let summary = pool.connect(vec![spec("a", "root")]).await;
            assert_eq!(summary.live, 1);
            assert!(summary.failed.is_empty());
        }

        #[tokio::test]
        async fn test_noise_ending_in_wrong_user_is_rejected() {
            let host = FakeHost::new("nobody", "/").with_banner("root\n");
            let connector = FakeConnector::new().with_host("a", host);
            let pool = pool(connector);

            let summary = pool.connect(vec![spec("a", "root")]).await;
            assert_eq!(summary.live, 0);
            assert!(summary.failed[0].1.contains("got 'nobody'"));
        }

        #[tokio::test]
        async fn test_silent_shell_fails_verification() {
            let connector = FakeConnector::new().with_host("a", FakeHost::new("root", "/").hung());
            let pool = SessionPool::new(Arc::new(connector), Duration::from_millis(50));

            let summary = pool.connect(vec![spec("a", "root")]).await;
            assert_eq!(summary.live, 0);
            assert!(summary.failed[0].1.contains("no response"));
        }
    }

    mod reconnecting {
        use super::*;

        #[tokio::test]
        async fn test_reconnect_replaces_and_closes_previous() {
            let connector = FakeConnector::new().with_host("a", FakeHost::new("root", "/"));
            let closes = connector.closes();
            let opened = connector.opened();
            let pool = pool(connector);

            pool.connect(vec![spec("a", "root")]).await;
            let first = pool.get("a").unwrap();

            pool.connect(vec![spec("a", "root")]).await;
            let second = pool.get("a").unwrap();

            assert_eq!(pool.len(), 1);
            assert!(!Arc::ptr_eq(&first, &second));
            assert_eq!(opened.load(std::sync::atomic::Ordering::SeqCst), 2);
            assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        }
    }

    mod teardown {
        use super::*;

        #[tokio::test]
        async fn test_disconnect_removes_session() {
            let connector = FakeConnector::new().with_host("a", FakeHost::new("root", "/"));
            let pool = pool(connector);
            pool.connect(vec![spec("a", "root")]).await;

            assert!(pool.disconnect("a").await);
            assert!(!pool.disconnect("a").await);
            assert!(pool.is_empty());
        }

        #[tokio::test]
        async fn test_shutdown_closes_everything() {
            let connector = FakeConnector::new()
                .with_host("a", FakeHost::new("root", "/"))
                .with_host("b", FakeHost::new("root", "/"));
            let closes = connector.closes();
            let pool = pool(connector);
            pool.connect(vec![spec("a", "root"), spec("b", "root")]).await;

            pool.shutdown().await;
            assert!(pool.is_empty());
            assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 2);
        }
    }
}

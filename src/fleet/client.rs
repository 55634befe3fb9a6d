//! SSH connection, authentication, and shell setup.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connect**: TCP + SSH handshake, bounded by the connect timeout.
//! 2. **Authenticate**: password or private key, per the server's credential.
//! 3. **Shell**: open a session channel, request a shell, split the channel
//!    into independent input and output halves.
//!
//! ## Retry Strategy
//!
//! Dial attempts use exponential backoff with jitter via `backon`, capped at
//! [`MAX_RETRY_DELAY`]. Authentication failures are never retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use russh::client;
use tracing::{info, warn};

use super::auth::strategy_for;
use super::config::{DialSettings, MAX_RETRY_DELAY};
use super::error::CookError;
use super::pool::Connector;
use super::registry::ServerSpec;
use super::session::{Session, SshClientHandler, SshShellInput, SshShellOutput};
use super::types::SessionInfo;

/// Build the russh client configuration.
///
/// Sessions stay open until replaced or closed, so there is no inactivity
/// timeout; keepalives detect dead peers instead.
pub(crate) fn build_client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Connect and authenticate, retrying transient dial failures.
pub(crate) async fn connect_with_retry(
    spec: &ServerSpec,
    settings: &DialSettings,
) -> Result<client::Handle<SshClientHandler>, CookError> {
    let attempt_counter = AtomicU32::new(0);

    let backoff = ExponentialBuilder::default()
        .with_min_delay(settings.retry_delay)
        .with_max_delay(MAX_RETRY_DELAY)
        .with_max_times(settings.max_retries as usize)
        .with_jitter();

    let result = (|| async {
        let current_attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);
        if current_attempt > 0 {
            warn!(
                "Retry attempt {} to {}@{} ({})",
                current_attempt,
                spec.user,
                spec.address(),
                spec.label
            );
        }
        connect(spec, settings.connect_timeout).await
    })
    .retry(backoff)
    .when(CookError::is_retryable)
    .notify(|err, dur| {
        warn!("{}. Retrying in {:?}", err, dur);
    })
    .await;

    let retries = attempt_counter.load(Ordering::SeqCst).saturating_sub(1);
    if result.is_ok() && retries > 0 {
        info!(
            "Connected to {} after {} retry attempt(s)",
            spec.label, retries
        );
    }

    result
}

/// One dial + authentication attempt.
async fn connect(
    spec: &ServerSpec,
    timeout: Duration,
) -> Result<client::Handle<SshClientHandler>, CookError> {
    let address = spec.address();
    let connect_future = client::connect(
        build_client_config(),
        (spec.host.as_str(), spec.port),
        SshClientHandler,
    );

    let mut handle = tokio::time::timeout(timeout, connect_future)
        .await
        .map_err(|_| CookError::Dial {
            host: address.clone(),
            reason: format!("Connection timed out after {:?}", timeout),
        })?
        .map_err(|e| CookError::Dial {
            host: address.clone(),
            reason: format!("Failed to connect: {}", e),
        })?;

    let strategy = strategy_for(&spec.credential);
    let accepted = strategy
        .authenticate(&mut handle, &spec.user)
        .await
        .map_err(|reason| CookError::Auth {
            host: address.clone(),
            reason,
        })?;

    if !accepted {
        return Err(CookError::Auth {
            host: address,
            reason: format!("{} authentication rejected for {}", strategy.name(), spec.user),
        });
    }

    Ok(handle)
}

/// Open an interactive shell on an authenticated connection.
///
/// No PTY is requested, so the remote shell neither echoes input nor prints
/// prompts; the output stream carries only what commands write.
pub(crate) async fn open_shell(
    spec: &ServerSpec,
    handle: client::Handle<SshClientHandler>,
) -> Result<Session, CookError> {
    let shell_error = |reason: String| CookError::Shell {
        host: spec.address(),
        reason,
    };

    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| shell_error(format!("Failed to open channel: {}", e)))?;

    channel
        .request_shell(true)
        .await
        .map_err(|e| shell_error(format!("Failed to request shell: {}", e)))?;

    let (read_half, write_half) = channel.split();

    let info = SessionInfo {
        label: spec.label.clone(),
        address: spec.address(),
        user: spec.user.clone(),
        connected_at: chrono::Utc::now().to_rfc3339(),
    };

    Ok(Session::new(
        info,
        Box::new(SshShellInput::new(write_half, Arc::new(handle))),
        Box::new(SshShellOutput::new(read_half)),
    ))
}

/// Opens real SSH shells.
pub struct SshConnector {
    settings: DialSettings,
}

impl SshConnector {
    pub fn new(settings: DialSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(&self, spec: &ServerSpec) -> Result<Session, CookError> {
        let handle = connect_with_retry(spec, &self.settings).await?;
        open_shell(spec, handle).await
    }
}

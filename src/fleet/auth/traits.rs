//! Authentication strategy trait definition.

use async_trait::async_trait;
use russh::client;

use crate::fleet::session::SshClientHandler;

/// Trait for SSH authentication strategies.
///
/// Implementations must be `Send + Sync` since every host authenticates on
/// its own task.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// * `Ok(true)` - Authentication succeeded
    /// * `Ok(false)` - Credentials rejected
    /// * `Err(message)` - Error during the attempt
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String>;

    /// Name used in log messages.
    fn name(&self) -> &'static str;
}

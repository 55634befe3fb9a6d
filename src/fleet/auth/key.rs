//! Private key file SSH authentication.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::fleet::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Loads a passphrase-less private key and offers it for public key auth.
pub struct KeyAuth {
    key_path: String,
}

impl KeyAuth {
    /// `key_path` may start with `~`, which expands to the home directory.
    pub fn new(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }

    fn expanded_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.key_path).into_owned())
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let path = self.expanded_path();

        let key_pair = keys::load_secret_key(&path, None)
            .map_err(|e| format!("Failed to load private key from {:?}: {}", path, e))?;

        // RSA keys need the strongest hash the server supports
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| format!("Key authentication failed: {}", e))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}

//! Authentication strategies for SSH connections.
//!
//! A server is authenticated with exactly one strategy, picked from its
//! configured credential:
//!
//! - [`PasswordAuth`]: the configured password
//! - [`KeyAuth`]: a private key file, with `~` expanded

mod key;
mod password;
mod traits;

pub use key::KeyAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;

use crate::fleet::registry::Credential;

/// The strategy matching a server's credential.
pub fn strategy_for(credential: &Credential) -> Box<dyn AuthStrategy> {
    match credential {
        Credential::Password(password) => Box::new(PasswordAuth::new(password.clone())),
        Credential::IdentityFile(path) => Box::new(KeyAuth::new(path.clone())),
    }
}

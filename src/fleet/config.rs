//! Runtime settings resolution.
//!
//! Every value follows a three-tier priority:
//!
//! 1. **Parameter** - explicitly provided (command-line flag)
//! 2. **Environment Variable**
//! 3. **Default**
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `COOK_CONNECT_TIMEOUT` | 5s | Per-host dial timeout in seconds |
//! | `COOK_VERIFY_TIMEOUT` | 10s | Post-login handshake timeout in seconds |
//! | `COOK_EXEC_TIMEOUT` | 60s | Wait for a broadcast command to finish, in seconds |
//! | `COOK_MAX_RETRIES` | 1 | Dial retries for transient failures |
//! | `COOK_RETRY_DELAY_MS` | 500ms | Initial retry delay in milliseconds |

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub(crate) const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;
pub(crate) const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 60;
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 1;
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Maximum retry delay cap
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "COOK_CONNECT_TIMEOUT";
pub(crate) const VERIFY_TIMEOUT_ENV_VAR: &str = "COOK_VERIFY_TIMEOUT";
pub(crate) const EXEC_TIMEOUT_ENV_VAR: &str = "COOK_EXEC_TIMEOUT";
pub(crate) const MAX_RETRIES_ENV_VAR: &str = "COOK_MAX_RETRIES";
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "COOK_RETRY_DELAY_MS";

/// Resolve a value with priority: parameter -> env var -> default.
///
/// Unparsable environment values are ignored.
fn resolve<T: FromStr>(param: Option<T>, env_var: &str, default: T) -> T {
    if let Some(value) = param {
        return value;
    }

    if let Ok(raw) = env::var(env_var)
        && let Ok(value) = raw.trim().parse::<T>()
    {
        return value;
    }

    default
}

pub(crate) fn resolve_connect_timeout(param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        param,
        CONNECT_TIMEOUT_ENV_VAR,
        DEFAULT_CONNECT_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_verify_timeout(param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        param,
        VERIFY_TIMEOUT_ENV_VAR,
        DEFAULT_VERIFY_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_exec_timeout(param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        param,
        EXEC_TIMEOUT_ENV_VAR,
        DEFAULT_EXEC_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_max_retries(param: Option<u32>) -> u32 {
    resolve(param, MAX_RETRIES_ENV_VAR, DEFAULT_MAX_RETRIES)
}

pub(crate) fn resolve_retry_delay(param: Option<u64>) -> Duration {
    Duration::from_millis(resolve(
        param,
        RETRY_DELAY_MS_ENV_VAR,
        DEFAULT_RETRY_DELAY_MS,
    ))
}

/// Dial parameters handed to the SSH connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialSettings {
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// All resolved runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub dial: DialSettings,
    pub verify_timeout: Duration,
    pub exec_timeout: Duration,
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsOverrides {
    pub connect_timeout_secs: Option<u64>,
    pub verify_timeout_secs: Option<u64>,
    pub exec_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl Settings {
    pub fn resolve(overrides: SettingsOverrides) -> Self {
        Self {
            dial: DialSettings {
                connect_timeout: resolve_connect_timeout(overrides.connect_timeout_secs),
                max_retries: resolve_max_retries(overrides.max_retries),
                retry_delay: resolve_retry_delay(overrides.retry_delay_ms),
            },
            verify_timeout: resolve_verify_timeout(overrides.verify_timeout_secs),
            exec_timeout: resolve_exec_timeout(overrides.exec_timeout_secs),
        }
    }
}

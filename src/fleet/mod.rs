//! Tag-addressed SSH fleet control.
//!
//! This module is organized into the following submodules:
//!
//! - `registry`: Server inventory loaded from YAML, indexed by tag, with hot reload
//! - `selector`: Resolves tag selections into a deduplicated target set
//! - `config`: Timeout and retry resolution with environment variable support
//! - `error`: Error type and retry classification
//! - `auth`: Password and private key authentication
//! - `client`: SSH dialing and interactive shell setup
//! - `session`: A verified shell and its input/output seams
//! - `sentinel`: Completion detection on an unbounded shell stream
//! - `storage`: Session map storage
//! - `pool`: Concurrent connect, verification, and teardown
//! - `broadcast`: Run one command on every pooled session
//! - `commands`: Operator command parsing and dispatch

pub mod auth;
pub mod broadcast;
pub mod client;
pub mod commands;
pub(crate) mod config;
pub mod error;
pub mod pool;
pub mod registry;
pub mod selector;
pub mod sentinel;
pub mod session;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::{Command, Executor, Flow};
pub use config::{DialSettings, Settings, SettingsOverrides};
pub use error::CookError;
pub use pool::SessionPool;
pub use registry::{Registry, SharedRegistry, watch_config};

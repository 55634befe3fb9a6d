//! Server registry loaded from the YAML servers file.
//!
//! ```yaml
//! servers:
//!   - host: 10.0.0.11
//!     label: web-1
//!     tags: [web]
//!   - host: 10.0.0.21
//!     port: 2222
//!     user: deploy
//!     password: hunter2
//!     label: db-1
//!     tags: [db, web]
//! ```
//!
//! Missing fields get defaults: port 22, user `root`, and identity file
//! `~/.ssh/id_rsa` when neither a password nor an identity file is given.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tracing::{info, warn};

use super::error::CookError;

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_IDENTITY_FILE: &str = "~/.ssh/id_rsa";

/// How a server is authenticated. A password wins when both are configured.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Credential {
    Password(String),
    IdentityFile(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(***)"),
            Credential::IdentityFile(path) => f.debug_tuple("IdentityFile").field(path).finish(),
        }
    }
}

/// One remote host as declared in the servers file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credential: Credential,
    pub label: String,
    pub tags: Vec<String>,
}

/// The fields that define a server's identity when merging selections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerKey {
    host: String,
    port: u16,
    user: String,
    credential: Credential,
    label: String,
}

impl ServerSpec {
    pub fn key(&self) -> ServerKey {
        ServerKey {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            credential: self.credential.clone(),
            label: self.label.clone(),
        }
    }

    /// `host:port`, as dialed.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawServer {
    #[serde(alias = "Host")]
    host: String,
    #[serde(default, alias = "Port")]
    port: Option<PortValue>,
    #[serde(default, alias = "User")]
    user: Option<String>,
    #[serde(default, alias = "Password")]
    password: Option<String>,
    #[serde(default, alias = "identityFile", alias = "IdentityFile")]
    identity_file: Option<String>,
    #[serde(default, alias = "Label")]
    label: Option<String>,
    #[serde(default, alias = "Tags")]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default, alias = "Servers")]
    servers: Vec<RawServer>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RawServer {
    fn into_spec(self) -> Result<ServerSpec, CookError> {
        let host = self.host.trim().to_string();
        if host.is_empty() {
            return Err(CookError::Config("server entry with empty host".to_string()));
        }

        let port = match self.port {
            None => DEFAULT_PORT,
            Some(PortValue::Number(port)) => port,
            Some(PortValue::Text(text)) if text.trim().is_empty() => DEFAULT_PORT,
            Some(PortValue::Text(text)) => text.trim().parse::<u16>().map_err(|e| {
                CookError::Config(format!("invalid port '{}' for {}: {}", text, host, e))
            })?,
        };

        let user = non_empty(self.user).unwrap_or_else(|| DEFAULT_USER.to_string());

        let credential = match (non_empty(self.password), non_empty(self.identity_file)) {
            (Some(password), _) => Credential::Password(password),
            (None, Some(path)) => Credential::IdentityFile(path),
            (None, None) => Credential::IdentityFile(DEFAULT_IDENTITY_FILE.to_string()),
        };

        let label = non_empty(self.label).unwrap_or_else(|| format!("{}:{}", host, port));

        Ok(ServerSpec {
            host,
            port,
            user,
            credential,
            label,
            tags: self.tags,
        })
    }
}

/// Servers indexed by tag, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    servers: Vec<ServerSpec>,
    by_tag: HashMap<String, Vec<ServerSpec>>,
    tags: Vec<String>,
}

impl Registry {
    pub fn from_servers(servers: Vec<ServerSpec>) -> Self {
        let mut by_tag: HashMap<String, Vec<ServerSpec>> = HashMap::new();
        let mut tags = Vec::new();

        for server in &servers {
            for tag in &server.tags {
                let entry = by_tag.entry(tag.clone()).or_default();
                if entry.is_empty() {
                    tags.push(tag.clone());
                }
                entry.push(server.clone());
            }
        }

        Self {
            servers,
            by_tag,
            tags,
        }
    }

    pub fn parse(yaml: &str) -> Result<Self, CookError> {
        let raw: RawConfig = serde_yaml::from_str(yaml)
            .map_err(|e| CookError::Config(format!("invalid servers file: {}", e)))?;

        let servers = raw
            .servers
            .into_iter()
            .map(RawServer::into_spec)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_servers(servers))
    }

    pub fn load(path: &Path) -> Result<Self, CookError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CookError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Servers carrying `tag`, or `None` if no server declares it.
    pub fn servers_for_tag(&self, tag: &str) -> Option<&[ServerSpec]> {
        self.by_tag.get(tag).map(Vec::as_slice)
    }

    /// Known tags, in first-seen order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn servers(&self) -> &[ServerSpec] {
        &self.servers
    }

    /// Every server group, tag by tag, followed by the untagged servers.
    pub fn all_groups(&self) -> Vec<Vec<ServerSpec>> {
        let mut groups: Vec<Vec<ServerSpec>> = self
            .tags
            .iter()
            .filter_map(|tag| self.by_tag.get(tag).cloned())
            .collect();

        let untagged: Vec<ServerSpec> = self
            .servers
            .iter()
            .filter(|s| s.tags.is_empty())
            .cloned()
            .collect();
        if !untagged.is_empty() {
            groups.push(untagged);
        }

        groups
    }
}

/// Registry shared between the front end and the reload watcher.
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// Keeps the file watcher alive. Dropping it stops hot reload.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

/// Re-read `path` and swap it into `registry`.
///
/// Returns false and leaves `registry` untouched if the file cannot be read
/// or parsed.
pub(crate) fn reload(path: &Path, registry: &SharedRegistry) -> bool {
    match Registry::load(path) {
        Ok(fresh) => {
            info!(
                "Reloaded {}: {} servers, {} tags",
                path.display(),
                fresh.servers().len(),
                fresh.tags().len()
            );
            match registry.write() {
                Ok(mut guard) => *guard = fresh,
                Err(poisoned) => *poisoned.into_inner() = fresh,
            }
            true
        }
        Err(e) => {
            warn!("Keeping previous configuration: {}", e);
            false
        }
    }
}

/// Reload `path` into `registry` whenever the file changes.
///
/// The parent directory is watched so that editors which replace the file
/// (write to temp, then rename) are still picked up. A reload that fails to
/// parse keeps the previous registry.
pub fn watch_config(path: PathBuf, registry: SharedRegistry) -> Result<ConfigWatcher, CookError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| CookError::Config(format!("{} is not a file", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let reload_path = path.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!("Config watcher error: {}", e);
                return;
            }
        };

        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        if !event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
        {
            return;
        }

        reload(&reload_path, &registry);
    })
    .map_err(|e| CookError::Config(format!("cannot watch {}: {}", path.display(), e)))?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| CookError::Config(format!("cannot watch {}: {}", dir.display(), e)))?;

    Ok(ConfigWatcher { _watcher: watcher })
}

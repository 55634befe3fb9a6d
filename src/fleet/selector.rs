//! Resolves a tag selection into a deduplicated, order-stable target list.

use std::collections::HashSet;

use tracing::warn;

use super::error::CookError;
use super::registry::{Registry, ServerKey, ServerSpec};

/// Which hosts a `connect` should reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Tags(Vec<String>),
}

/// Ordered servers with no two sharing the same [`ServerKey`].
#[derive(Debug, Default)]
pub struct TargetSet {
    servers: Vec<ServerSpec>,
    seen: HashSet<ServerKey>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every server from `incoming` that is not already present.
    pub fn merge(&mut self, incoming: &[ServerSpec]) {
        for server in incoming {
            if self.seen.insert(server.key()) {
                self.servers.push(server.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.label.clone()).collect()
    }

    pub fn into_servers(self) -> Vec<ServerSpec> {
        self.servers
    }
}

/// Resolve `selection` against the registry.
///
/// Unknown tags are reported through the returned error list and skipped;
/// they never stop the remaining tags from being resolved.
pub fn select(registry: &Registry, selection: &Selection) -> (TargetSet, Vec<CookError>) {
    let mut targets = TargetSet::new();
    let mut unknown = Vec::new();

    match selection {
        Selection::All => {
            for group in registry.all_groups() {
                targets.merge(&group);
            }
        }
        Selection::Tags(tags) => {
            for tag in tags {
                match registry.servers_for_tag(tag) {
                    Some(servers) => targets.merge(servers),
                    None => {
                        let err = CookError::UnknownTag { tag: tag.clone() };
                        warn!("{}", err);
                        unknown.push(err);
                    }
                }
            }
        }
    }

    (targets, unknown)
}

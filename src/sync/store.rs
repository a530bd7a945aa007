//! Contract for the hosted key-path database every client treats as the source of truth.
//!
//! Paths are relative to the configured database root. All writes go through
//! [`RemoteStore::atomic_update`], which either applies every staged path or none of them.
//! Adapters never retry; a failed call is reported to the caller as-is.

use std::{fmt, sync::Arc};

use color_eyre::{Result, eyre::eyre};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::config::{StoreBackend, StoreConfig};

pub mod firebase;
pub mod memory;
mod tree;

pub use firebase::FirebaseStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote store is not reachable")]
    Offline,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("remote store rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid store path {0:?}")]
    InvalidPath(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '#', '$', '[', ']', '/'];

/// Whether `key` may be used as a single path segment.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.chars().any(|c| FORBIDDEN_KEY_CHARS.contains(&c) || c.is_control())
}

/// Replaces every character the store refuses in keys with `_`.
pub fn sanitize_key(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if FORBIDDEN_KEY_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_owned()
    } else {
        sanitized
    }
}

/// Slash-separated location of a node below the database root. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StorePath(String);

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        if trimmed.split('/').all(is_valid_key) {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(StoreError::InvalidPath(raw.to_owned()))
        }
    }

    pub fn child(&self, key: &str) -> Result<Self, StoreError> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidPath(format!("{}/{key}", self.0)));
        }
        if self.is_root() {
            Ok(Self(key.to_owned()))
        } else {
            Ok(Self(format!("{}/{key}", self.0)))
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|it| !it.is_empty())
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// A set of writes submitted as one transaction. `None` writes absence (a tombstone).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiPathUpdate {
    entries: Vec<(StorePath, Option<Value>)>,
}

impl MultiPathUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(&mut self, path: StorePath, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.stage(path, Some(value));
        Ok(())
    }

    pub fn remove(&mut self, path: StorePath) {
        self.stage(path, None);
    }

    fn stage(&mut self, path: StorePath, value: Option<Value>) {
        if let Some(existing) = self.entries.iter_mut().find(|(it, _)| *it == path) {
            existing.1 = value;
        } else {
            self.entries.push((path, value));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &StorePath) -> Option<&Option<Value>> {
        self.entries
            .iter()
            .find(|(it, _)| it == path)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(StorePath, Option<Value>)> {
        self.entries.iter()
    }

    /// Body for a multi-location PATCH against the root, tombstones as `null`.
    pub fn to_patch_body(&self) -> serde_json::Map<String, Value> {
        self.entries
            .iter()
            .map(|(path, value)| (path.as_str().to_owned(), value.clone().unwrap_or(Value::Null)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Child added/removed notifications, replaying existing children first.
    Children,
    /// The whole value at the path after every change, absence as `None`.
    Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Added { key: String, value: Value },
    Removed { key: String },
    /// The whole collection became absent. Sent on children subscriptions after the removals.
    Cleared,
    Value(Option<Value>),
}

pub type EventStream = UnboundedReceiver<StoreEvent>;

pub trait RemoteStore: Send + Sync {
    /// Point-in-time read without subscribing.
    fn read_once(&self, path: StorePath) -> BoxFuture<'_, Result<Option<Value>, StoreError>>;

    /// Push notifications for `path`, in the order the store applied the writes.
    fn subscribe(
        &self,
        path: StorePath,
        kind: SubscriptionKind,
    ) -> BoxFuture<'_, Result<EventStream, StoreError>>;

    /// Applies every staged write or none of them.
    fn atomic_update(&self, update: MultiPathUpdate) -> BoxFuture<'_, Result<(), StoreError>>;

    fn is_connected(&self) -> bool;
}

pub type SharedStore = Arc<dyn RemoteStore>;

pub fn connect(config: &StoreConfig) -> Result<SharedStore> {
    match config.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store, nothing will be shared with other clients.");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Firebase => {
            if config.url.is_empty() {
                return Err(eyre!("store.url must be set for the firebase backend"));
            }
            info!("Using firebase store at {} (root {})", config.url, config.root);
            Ok(Arc::new(FirebaseStore::new(
                &config.url,
                &config.root,
                config.auth.clone(),
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_path_parsing() {
        let path = StorePath::parse("/activeBowls/B100/").unwrap();
        assert_eq!(path.as_str(), "activeBowls/B100");
        assert_eq!(path.segments().collect::<Vec<_>>(), vec!["activeBowls", "B100"]);
        assert!(StorePath::parse("").unwrap().is_root());
        assert!(StorePath::parse("activeBowls/a.b").is_err());
        assert!(StorePath::parse("activeBowls//x").is_err());
    }

    #[test]
    fn test_child_rejects_forbidden_keys() {
        let root = StorePath::root();
        assert_eq!(root.child("activeBowls").unwrap().as_str(), "activeBowls");
        assert!(root.child("x#y").is_err());
        assert!(root.child("").is_err());
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("a.b/c$d"), "a_b_c_d");
        assert_eq!(sanitize_key(""), "_");
        assert_eq!(sanitize_key("Hamid"), "Hamid");
    }

    #[test]
    fn test_update_restaging_replaces() {
        let path = StorePath::parse("activeBowls/B1").unwrap();
        let mut update = MultiPathUpdate::new();
        update.set(path.clone(), &json!({"code": "B1"})).unwrap();
        update.remove(path.clone());

        assert_eq!(update.len(), 1);
        assert_eq!(update.get(&path), Some(&None));
        assert_eq!(
            Value::Object(update.to_patch_body()),
            json!({"activeBowls/B1": null})
        );
    }
}

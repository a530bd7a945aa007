//! In-process store used for offline sessions and for exercising the sync logic in tests.

use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use futures::{FutureExt, future::BoxFuture};
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;

use super::{
    EventStream, MultiPathUpdate, RemoteStore, StoreError, StoreEvent, StorePath,
    SubscriptionKind, tree,
};

pub struct MemoryStore {
    inner: Mutex<Inner>,
    connected: AtomicBool,
}

struct Inner {
    root: Value,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    path: StorePath,
    kind: SubscriptionKind,
    tx: UnboundedSender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                root: Value::Object(Map::new()),
                subscribers: vec![],
            }),
            connected: AtomicBool::new(true),
        }
    }

    /// Simulates losing (or regaining) the connection; while offline every call fails.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.lock().root.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::Offline)
        }
    }

    fn apply(&self, update: MultiPathUpdate) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let mut inner = self.lock();
        let before: Vec<Option<Value>> = inner
            .subscribers
            .iter()
            .map(|sub| tree::get(&inner.root, &sub.path).cloned())
            .collect();

        for (path, value) in update.iter() {
            tree::set(&mut inner.root, path, value.clone());
        }

        let Inner { root, subscribers } = &mut *inner;
        let mut idx = 0;
        subscribers.retain(|sub| {
            let previous = before.get(idx).cloned().flatten();
            idx += 1;
            let current = tree::get(root, &sub.path);
            let events = match sub.kind {
                SubscriptionKind::Children => tree::child_events(previous.as_ref(), current),
                SubscriptionKind::Value if previous.as_ref() != current => {
                    vec![StoreEvent::Value(current.cloned())]
                }
                SubscriptionKind::Value => vec![],
            };
            let delivered = events.into_iter().all(|event| sub.tx.send(event).is_ok());
            if !delivered {
                debug!("Dropping closed subscription on {}", sub.path);
            }
            delivered
        });
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    fn read_once(&self, path: StorePath) -> BoxFuture<'_, Result<Option<Value>, StoreError>> {
        async move {
            self.ensure_connected()?;
            Ok(tree::get(&self.lock().root, &path).cloned())
        }
        .boxed()
    }

    fn subscribe(
        &self,
        path: StorePath,
        kind: SubscriptionKind,
    ) -> BoxFuture<'_, Result<EventStream, StoreError>> {
        async move {
            self.ensure_connected()?;
            let (tx, rx) = mpsc::unbounded_channel();
            let mut inner = self.lock();
            let current = tree::get(&inner.root, &path);
            let initial = match kind {
                SubscriptionKind::Children => tree::replay(current),
                SubscriptionKind::Value => vec![StoreEvent::Value(current.cloned())],
            };
            for event in initial {
                // receiver is still in hand, cannot be closed
                let _ = tx.send(event);
            }
            inner.subscribers.push(Subscriber { path, kind, tx });
            Ok(rx)
        }
        .boxed()
    }

    fn atomic_update(&self, update: MultiPathUpdate) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { self.apply(update) }.boxed()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    fn drain(rx: &mut EventStream) -> Vec<StoreEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_subscription_replays_existing_children_first() {
        let store = MemoryStore::new();
        let mut update = MultiPathUpdate::new();
        update.set(path("activeBowls/B1"), &json!({"code": "B1"})).unwrap();
        update.set(path("activeBowls/B2"), &json!({"code": "B2"})).unwrap();
        store.atomic_update(update).await.unwrap();

        let mut rx = store
            .subscribe(path("activeBowls"), SubscriptionKind::Children)
            .await
            .unwrap();
        let mut update = MultiPathUpdate::new();
        update.remove(path("activeBowls/B1"));
        store.atomic_update(update).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                StoreEvent::Added {
                    key: "B1".into(),
                    value: json!({"code": "B1"})
                },
                StoreEvent::Added {
                    key: "B2".into(),
                    value: json!({"code": "B2"})
                },
                StoreEvent::Removed { key: "B1".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_value_subscription_reports_absence() {
        let store = MemoryStore::new();
        let mut rx = store
            .subscribe(path("preparedBowls"), SubscriptionKind::Value)
            .await
            .unwrap();
        let mut update = MultiPathUpdate::new();
        update.set(path("preparedBowls/1-B1"), &json!({"code": "B1"})).unwrap();
        store.atomic_update(update).await.unwrap();
        let mut update = MultiPathUpdate::new();
        update.remove(path("preparedBowls"));
        store.atomic_update(update).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                StoreEvent::Value(None),
                StoreEvent::Value(Some(json!({"1-B1": {"code": "B1"}}))),
                StoreEvent::Value(None),
            ]
        );
    }

    #[tokio::test]
    async fn test_children_subscription_reports_cleared_in_order() {
        let store = MemoryStore::new();
        let mut rx = store
            .subscribe(path("preparedBowls"), SubscriptionKind::Children)
            .await
            .unwrap();
        let mut update = MultiPathUpdate::new();
        update.set(path("preparedBowls/1-B1"), &json!({"code": "B1"})).unwrap();
        store.atomic_update(update).await.unwrap();
        let mut update = MultiPathUpdate::new();
        update.remove(path("preparedBowls"));
        store.atomic_update(update).await.unwrap();
        let mut update = MultiPathUpdate::new();
        update.set(path("preparedBowls/2-B2"), &json!({"code": "B2"})).unwrap();
        store.atomic_update(update).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                StoreEvent::Added {
                    key: "1-B1".into(),
                    value: json!({"code": "B1"})
                },
                StoreEvent::Removed { key: "1-B1".into() },
                StoreEvent::Cleared,
                StoreEvent::Added {
                    key: "2-B2".into(),
                    value: json!({"code": "B2"})
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_update_has_no_effect() {
        let store = MemoryStore::new();
        store.set_connected(false);
        let mut update = MultiPathUpdate::new();
        update.set(path("lastSync"), &"now").unwrap();

        let result = store.atomic_update(update).await;

        assert!(matches!(result, Err(StoreError::Offline)));
        assert_eq!(store.snapshot(), json!({}));
        assert!(matches!(
            store.read_once(path("lastSync")).await,
            Err(StoreError::Offline)
        ));
    }

    #[tokio::test]
    async fn test_overwriting_a_child_is_not_an_addition() {
        let store = MemoryStore::new();
        let mut rx = store
            .subscribe(path("activeBowls"), SubscriptionKind::Children)
            .await
            .unwrap();
        for dish in ["A", "B"] {
            let mut update = MultiPathUpdate::new();
            update.set(path("activeBowls/B1"), &json!({"dish": dish})).unwrap();
            store.atomic_update(update.clone()).await.unwrap();
        }

        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(
            store.read_once(path("activeBowls/B1/dish")).await.unwrap(),
            Some(json!("B"))
        );
    }
}

//! In-memory document store for fast, deterministic testing.

use ridepool_core::store::{
    ChangeStream, CollectionChange, DocumentStore, StoreError, StoreFuture, Version,
    VersionedDocument,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

struct CollectionState {
    /// BTreeMap so listings and snapshots come out in stable id order.
    docs: BTreeMap<String, (Version, Value)>,
    changes: broadcast::Sender<CollectionChange>,
}

impl CollectionState {
    fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            docs: BTreeMap::new(),
            changes,
        }
    }

    fn notify(&self, change: CollectionChange) {
        // No subscribers is fine; send only fails when nobody listens.
        let _ = self.changes.send(change);
    }
}

struct Inner {
    collections: HashMap<String, CollectionState>,
    next_id: u64,
}

/// Versioned in-memory [`DocumentStore`] with broadcast-backed change streams.
///
/// Compare-and-swap behaves exactly like a real optimistic store: concurrent
/// writers race on the document version and the losers observe
/// [`StoreError::VersionConflict`], which makes the ledger's retry loop
/// testable without a database.
///
/// # Example
///
/// ```
/// use ridepool_testing::MemoryStore;
/// use ridepool_core::store::{DocumentStore, Version, collections};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), ridepool_core::store::StoreError> {
/// let store = MemoryStore::new();
/// let id = store.insert(collections::RIDES, json!({"destination": "Airport"})).await?;
/// let read = store.get(collections::RIDES, &id).await?.unwrap();
/// assert_eq!(read.version, Version::INITIAL);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                collections: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Number of documents in a collection. Useful for assertions.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    /// Whether a collection holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Drop all documents and reset the id counter (for test isolation).
    /// Open change streams stay subscribed.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id = 0;
        for state in inner.collections.values_mut() {
            state.docs.clear();
        }
    }

    fn with_collection<T>(&self, collection: &str, f: impl FnOnce(&mut CollectionState) -> T) -> T {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);
        f(state)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: &str, id: &str) -> StoreFuture<'_, Option<VersionedDocument>> {
        let result = self.with_collection(collection, |state| {
            state
                .docs
                .get(id)
                .map(|(version, doc)| VersionedDocument {
                    version: *version,
                    doc: doc.clone(),
                })
        });
        Box::pin(async move { Ok(result) })
    }

    fn put(&self, collection: &str, id: &str, doc: Value) -> StoreFuture<'_, ()> {
        self.with_collection(collection, |state| {
            let id = id.to_string();
            let change = match state.docs.get(&id) {
                Some((version, _)) => {
                    let next = version.next();
                    state.docs.insert(id.clone(), (next, doc.clone()));
                    CollectionChange::Modified { id, doc }
                }
                None => {
                    state.docs.insert(id.clone(), (Version::INITIAL, doc.clone()));
                    CollectionChange::Added { id, doc }
                }
            };
            state.notify(change);
        });
        Box::pin(async move { Ok(()) })
    }

    fn insert(&self, collection: &str, doc: Value) -> StoreFuture<'_, String> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("{collection}-{}", inner.next_id);
        let state = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);
        state.docs.insert(id.clone(), (Version::INITIAL, doc.clone()));
        state.notify(CollectionChange::Added {
            id: id.clone(),
            doc,
        });
        drop(inner);
        Box::pin(async move { Ok(id) })
    }

    fn delete(&self, collection: &str, id: &str) -> StoreFuture<'_, ()> {
        self.with_collection(collection, |state| {
            if state.docs.remove(id).is_some() {
                state.notify(CollectionChange::Removed { id: id.to_string() });
            }
        });
        Box::pin(async move { Ok(()) })
    }

    fn list(&self, collection: &str) -> StoreFuture<'_, Vec<(String, Value)>> {
        let result = self.with_collection(collection, |state| {
            state
                .docs
                .iter()
                .map(|(id, (_, doc))| (id.clone(), doc.clone()))
                .collect()
        });
        Box::pin(async move { Ok(result) })
    }

    fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected: Version,
        doc: Value,
    ) -> StoreFuture<'_, Version> {
        let result = self.with_collection(collection, |state| {
            let Some((current, _)) = state.docs.get(id) else {
                return Err(StoreError::Missing {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            };
            if *current != expected {
                return Err(StoreError::VersionConflict {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    expected,
                    actual: *current,
                });
            }
            let next = current.next();
            state.docs.insert(id.to_string(), (next, doc.clone()));
            state.notify(CollectionChange::Modified {
                id: id.to_string(),
                doc,
            });
            Ok(next)
        });
        Box::pin(async move { result })
    }

    fn watch(&self, collection: &str) -> StoreFuture<'_, ChangeStream> {
        // Snapshot and subscription happen under the same lock, so no change
        // can slip between them.
        let (snapshot, mut rx) = self.with_collection(collection, |state| {
            let snapshot: Vec<(String, Value)> = state
                .docs
                .iter()
                .map(|(id, (_, doc))| (id.clone(), doc.clone()))
                .collect();
            (snapshot, state.changes.subscribe())
        });

        let stream = async_stream::stream! {
            for (id, doc) in snapshot {
                yield Ok(CollectionChange::Added { id, doc });
            }
            loop {
                match rx.recv().await {
                    Ok(change) => yield Ok(change),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        yield Err(StoreError::Backend(format!(
                            "change stream lagged by {missed} events"
                        )));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        let boxed: ChangeStream = Box::pin(stream);
        Box::pin(async move { Ok(boxed) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use ridepool_core::store::collections;
    use serde_json::json;

    #[tokio::test]
    async fn cas_rejects_stale_versions() {
        let store = MemoryStore::new();
        let id = store
            .insert(collections::RIDES, json!({"n": 0}))
            .await
            .unwrap();

        let read = store.get(collections::RIDES, &id).await.unwrap().unwrap();
        let v1 = store
            .compare_and_swap(collections::RIDES, &id, read.version, json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(v1, read.version.next());

        // Stale writer loses.
        let err = store
            .compare_and_swap(collections::RIDES, &id, read.version, json!({"n": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn watch_delivers_snapshot_then_live_changes() {
        let store = MemoryStore::new();
        let a = store
            .insert(collections::RIDES, json!({"dest": "Airport"}))
            .await
            .unwrap();

        let mut stream = store.watch(collections::RIDES).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(
            first,
            CollectionChange::Added {
                id: a.clone(),
                doc: json!({"dest": "Airport"})
            }
        );

        store
            .put(collections::RIDES, &a, json!({"dest": "Station"}))
            .await
            .unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert!(matches!(second, CollectionChange::Modified { id, .. } if id == a));

        store.delete(collections::RIDES, &a).await.unwrap();
        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third, CollectionChange::Removed { id: a });
    }

    #[tokio::test]
    async fn delete_missing_is_a_no_op() {
        let store = MemoryStore::new();
        store.delete(collections::RIDES, "ghost").await.unwrap();
        assert!(store.is_empty(collections::RIDES));
    }
}

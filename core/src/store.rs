//! Document store contract with optimistic concurrency and change streams.
//!
//! This module defines the abstraction over the external transactional
//! key-document store. The core never talks to a concrete database; every
//! persistence concern is expressed through [`DocumentStore`].
//!
//! # Design
//!
//! The contract is deliberately minimal:
//!
//! - Read and write whole JSON documents by `(collection, id)`
//! - Compare-and-swap against a read version for atomic read-modify-write
//! - Subscribe to a collection and receive its current contents followed by
//!   live changes
//!
//! # Optimistic Concurrency
//!
//! Every stored document carries a [`Version`]. A caller that needs a
//! transactional read-modify-write reads the versioned document, applies its
//! mutation, and writes back with [`DocumentStore::compare_and_swap`]; a
//! [`StoreError::VersionConflict`] means another writer got there first and
//! the caller re-reads and retries.
//!
//! # Change Streams
//!
//! [`DocumentStore::watch`] yields the collection's current documents as
//! [`CollectionChange::Added`] items before any live change, so a consumer's
//! first pass over the stream establishes its baseline — exactly what the
//! snapshot-diffing detector needs.
//!
//! # Dyn Compatibility
//!
//! Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
//! the trait can be used as `Arc<dyn DocumentStore>` across the engine.

use futures::Stream;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Well-known collection names used by the coordination core.
pub mod collections {
    /// Ride documents.
    pub const RIDES: &str = "rides";
    /// Append-only ride chat messages.
    pub const MESSAGES: &str = "messages";
    /// Ban records keyed by user id.
    pub const BANNED_USERS: &str = "banned_users";
    /// Ephemeral broadcast notices.
    pub const BROADCASTS: &str = "broadcasts";
}

/// Document version number for optimistic concurrency control.
///
/// Versions start at 0 when a document is first written and increment on
/// every successful write.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// The version of a freshly created document.
    pub const INITIAL: Self = Self(0);

    /// Create a version with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document together with the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedDocument {
    /// Version observed at read time; pass back to `compare_and_swap`.
    pub version: Version,
    /// The document body.
    pub doc: Value,
}

/// One observed change in a watched collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectionChange {
    /// A document entered the observed set (including the initial snapshot).
    Added {
        /// Document id.
        id: String,
        /// Document body at observation time.
        doc: Value,
    },
    /// An existing document was rewritten.
    Modified {
        /// Document id.
        id: String,
        /// Document body after the write.
        doc: Value,
    },
    /// A document was deleted.
    Removed {
        /// Document id.
        id: String,
    },
}

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the expected version no longer
    /// matches the stored one. Another writer committed first.
    #[error("version conflict on {collection}/{id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Collection the conflict occurred in.
        collection: String,
        /// Conflicting document id.
        id: String,
        /// The version the writer expected.
        expected: Version,
        /// The stored version at write time.
        actual: Version,
    },

    /// The addressed document does not exist.
    #[error("document not found: {collection}/{id}")]
    Missing {
        /// Collection looked up.
        collection: String,
        /// Missing document id.
        id: String,
    },

    /// Document could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend connection or query failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Stream of collection changes from [`DocumentStore::watch`].
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<CollectionChange, StoreError>> + Send>>;

/// Convenience alias for the boxed futures returned by [`DocumentStore`].
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Abstraction over the external transactional key-document store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the ledger and the background
/// loops share one store behind an `Arc`.
///
/// # Implementations
///
/// - `MemoryStore` (in `ridepool-testing`): versioned in-memory store with
///   broadcast-backed change streams, for deterministic tests.
/// - Production adapters wrap whatever document database the deployment
///   uses; the core never depends on one.
pub trait DocumentStore: Send + Sync {
    /// Read a document and the version it is currently at.
    ///
    /// Returns `Ok(None)` when the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn get(&self, collection: &str, id: &str) -> StoreFuture<'_, Option<VersionedDocument>>;

    /// Write a document unconditionally, creating it if absent.
    ///
    /// Use only for documents without cross-field invariants; seat-mutating
    /// writes must go through [`DocumentStore::compare_and_swap`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn put(&self, collection: &str, id: &str, doc: Value) -> StoreFuture<'_, ()>;

    /// Insert a document under a store-assigned id and return that id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn insert(&self, collection: &str, doc: Value) -> StoreFuture<'_, String>;

    /// Delete a document. Deleting an absent document is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn delete(&self, collection: &str, id: &str) -> StoreFuture<'_, ()>;

    /// List all documents in a collection as `(id, doc)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn list(&self, collection: &str) -> StoreFuture<'_, Vec<(String, Value)>>;

    /// Replace a document only if it is still at `expected` version.
    ///
    /// Returns the new version on success.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`]: another writer committed since the
    ///   read; re-read and retry.
    /// - [`StoreError::Missing`]: the document was deleted since the read.
    /// - [`StoreError::Backend`]: connection or query failure.
    fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected: Version,
        doc: Value,
    ) -> StoreFuture<'_, Version>;

    /// Subscribe to a collection.
    ///
    /// The stream first delivers the collection's current documents as
    /// [`CollectionChange::Added`] items, then live changes in commit order.
    /// Dropping the stream releases the subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the subscription cannot be
    /// established.
    fn watch(&self, collection: &str) -> StoreFuture<'_, ChangeStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_error_display() {
        let error = StoreError::VersionConflict {
            collection: "rides".to_string(),
            id: "r1".to_string(),
            expected: Version::new(3),
            actual: Version::new(5),
        };
        let display = format!("{error}");
        assert!(display.contains("rides/r1"));
        assert!(display.contains("expected 3"));
        assert!(display.contains("found 5"));
    }

    #[test]
    fn version_increments() {
        assert_eq!(Version::INITIAL.value(), 0);
        assert_eq!(Version::INITIAL.next(), Version::new(1));
    }
}

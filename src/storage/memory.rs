//! In-memory object store
//!
//! Keeps objects in a shared map. Clones see the same objects, which makes it
//! usable as a stand-in for a bucket in tests and demos.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use crate::Result;
use crate::auth::FederatedCredentials;
use crate::error::Error;
use super::{ObjectStore, ObjectSummary, StorageConnector};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }
}

/// Quoted hex digest, shaped like an S3 entity tag
fn entity_tag(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("\"{}\"", hex::encode(&digest[..16]))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>> {
        let objects = self.objects();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, object)| ObjectSummary {
                key: Some(key.clone()),
                etag: Some(object.etag.clone()),
                last_modified: Some(object.last_modified),
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects()
            .get(key)
            .map(|object| object.body.clone())
            .ok_or_else(|| Error::Storage {
                code: Some("NoSuchKey".to_string()),
                message: format!("no object at {}", key),
            })
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let object = StoredObject {
            etag: entity_tag(&body),
            body,
            last_modified: Utc::now(),
        };
        self.objects().insert(key.to_string(), object);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects().remove(key);
        Ok(())
    }
}

/// Hands out clients over one shared [`MemoryStore`] and counts connections.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
    connections: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageConnector for MemoryConnector {
    async fn connect(&self, _credentials: &FederatedCredentials) -> Result<Arc<dyn ObjectStore>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.store.clone()))
    }
}

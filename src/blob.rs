//! Blob storage for uploaded document bytes.
//!
//! Job records carry an opaque `source_ref` key instead of the bytes
//! themselves; this is where those keys resolve. In production this would
//! front an object store, but the pipeline only ever needs put and get.

use std::{collections::HashMap, sync::Mutex};

use crate::prelude::*;

/// Where uploaded bytes live between intake and processing.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Deposit bytes at `key`, replacing anything already there.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Fetch the bytes at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// In-memory blob store backing a single-process deployment.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    /// Held only for the duration of a single map operation.
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut blobs = self.blobs.lock().expect("lock poisoned");
        blobs.insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.lock().expect("lock poisoned");
        Ok(blobs.get(key).cloned())
    }
}

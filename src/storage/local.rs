// src/storage/local.rs

//! Local filesystem store backend.
//!
//! Persists the full store state as a single JSON file under a root
//! directory, with atomic tmp-then-rename writes. Suitable for a single
//! bot process; swap in a relational backend behind the same traits for
//! anything bigger.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{Posting, Subscriber, Tier};
use crate::storage::memory::{MemoryStore, StoreSnapshot};
use crate::storage::{DeliveryLedger, PostingStore, SubscriberDirectory};

const STATE_FILE: &str = "state.json";

/// File-backed implementation of all three store traits.
pub struct LocalStore {
    root_dir: PathBuf,
    mem: MemoryStore,
    // Serializes snapshot+write+rename so parallel mutations cannot race
    // on the shared tmp file or interleave stale snapshots.
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalStore {
    /// Open a store rooted at the given directory, loading existing state.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        let path = root_dir.join(STATE_FILE);

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(e) => return Err(AppError::Io(e)),
        };

        Ok(Self {
            root_dir,
            mem: MemoryStore::from_snapshot(snapshot),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Register a new subscriber and persist.
    pub async fn create_subscriber(&self, tier: Tier, filter: &str) -> Result<Subscriber> {
        let subscriber = self.mem.create_subscriber(tier, filter).await;
        self.persist().await?;
        Ok(subscriber)
    }

    /// Write the current state atomically (write to temp, then rename).
    ///
    /// One persist runs at a time; a later persist always snapshots state
    /// at least as new as an earlier one, so the file on disk never goes
    /// backwards.
    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.root_dir).await?;
        let path = self.root_dir.join(STATE_FILE);
        let tmp = path.with_extension("tmp");

        let snapshot = self.mem.snapshot().await;
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl PostingStore for LocalStore {
    async fn insert_many(&self, postings: &[Posting]) -> Result<usize> {
        let inserted = self.mem.insert_many(postings).await?;
        if inserted > 0 {
            self.persist().await?;
        }
        Ok(inserted)
    }

    async fn find_matching(&self, filter: &str) -> Result<Vec<Posting>> {
        self.mem.find_matching(filter).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Posting>> {
        PostingStore::find_by_id(&self.mem, id).await
    }

    async fn update(&self, posting: &Posting) -> Result<()> {
        self.mem.update(posting).await?;
        self.persist().await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.mem.delete(id).await?;
        self.persist().await
    }

    async fn purge_all(&self) -> Result<()> {
        self.mem.purge_all().await?;
        self.persist().await
    }
}

#[async_trait]
impl SubscriberDirectory for LocalStore {
    async fn find_all_with_channel(&self) -> Result<Vec<Subscriber>> {
        self.mem.find_all_with_channel().await
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Subscriber>> {
        SubscriberDirectory::find_by_id(&self.mem, id).await
    }

    async fn find_by_channel_address(&self, address: &str) -> Result<Option<Subscriber>> {
        self.mem.find_by_channel_address(address).await
    }

    async fn link_channel(&self, subscriber_id: u64, address: &str) -> Result<()> {
        self.mem.link_channel(subscriber_id, address).await?;
        self.persist().await
    }

    async fn save_link_token(&self, subscriber_id: u64, token: &str) -> Result<()> {
        self.mem.save_link_token(subscriber_id, token).await?;
        self.persist().await
    }

    async fn consume_link_token(&self, token: &str, address: &str) -> Result<Option<Subscriber>> {
        let subscriber = self.mem.consume_link_token(token, address).await?;
        self.persist().await?;
        Ok(subscriber)
    }

    async fn update_filter(&self, subscriber_id: u64, filter: &str) -> Result<()> {
        self.mem.update_filter(subscriber_id, filter).await?;
        self.persist().await
    }

    async fn count_all(&self) -> Result<usize> {
        self.mem.count_all().await
    }
}

#[async_trait]
impl DeliveryLedger for LocalStore {
    async fn record(&self, subscriber_id: u64, posting_id: &str) -> Result<()> {
        self.mem.record(subscriber_id, posting_id).await?;
        self.persist().await
    }

    async fn find_delivered(&self, subscriber_id: u64) -> Result<HashSet<String>> {
        self.mem.find_delivered(subscriber_id).await
    }
}

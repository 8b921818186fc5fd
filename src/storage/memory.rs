// src/storage/memory.rs

//! In-memory store backend.
//!
//! Backs all three store traits from a single state struct. Used as the
//! deterministic test double and as the in-process state of [`LocalStore`].
//!
//! [`LocalStore`]: crate::storage::LocalStore

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{Posting, Subscriber, Tier};
use crate::storage::{DeliveryLedger, PostingStore, SubscriberDirectory};

/// Serializable snapshot of the full store state.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub postings: Vec<Posting>,
    pub subscribers: Vec<Subscriber>,
    pub link_tokens: HashMap<String, u64>,
    pub delivered: Vec<(u64, String)>,
}

#[derive(Debug, Default)]
struct Inner {
    postings: Vec<Posting>,
    links: HashSet<String>,
    subscribers: HashMap<u64, Subscriber>,
    link_tokens: HashMap<String, u64>,
    delivered: HashSet<(u64, String)>,
}

/// In-memory implementation of all three store traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let links = snapshot.postings.iter().map(|p| p.link.clone()).collect();
        let subscribers = snapshot
            .subscribers
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let inner = Inner {
            postings: snapshot.postings,
            links,
            subscribers,
            link_tokens: snapshot.link_tokens,
            delivered: snapshot.delivered.into_iter().collect(),
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Capture the full store state for persistence.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().await;
        let mut subscribers: Vec<Subscriber> = inner.subscribers.values().cloned().collect();
        subscribers.sort_by_key(|s| s.id);
        let mut delivered: Vec<(u64, String)> = inner.delivered.iter().cloned().collect();
        delivered.sort();
        StoreSnapshot {
            postings: inner.postings.clone(),
            subscribers,
            link_tokens: inner.link_tokens.clone(),
            delivered,
        }
    }

    /// Register a new subscriber with the next free id.
    pub async fn create_subscriber(&self, tier: Tier, filter: &str) -> Subscriber {
        let mut inner = self.inner.write().await;
        let id = inner.subscribers.keys().max().copied().unwrap_or(0) + 1;
        let subscriber = Subscriber::new(id, tier, filter);
        inner.subscribers.insert(id, subscriber.clone());
        subscriber
    }

    /// Insert a fully formed subscriber record.
    pub async fn add_subscriber(&self, subscriber: Subscriber) {
        self.inner
            .write()
            .await
            .subscribers
            .insert(subscriber.id, subscriber);
    }
}

#[async_trait]
impl PostingStore for MemoryStore {
    async fn insert_many(&self, postings: &[Posting]) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let mut inserted = 0;
        for posting in postings {
            if inner.links.insert(posting.link.clone()) {
                inner.postings.push(posting.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn find_matching(&self, filter: &str) -> Result<Vec<Posting>> {
        let needle = filter.trim().to_lowercase();
        let inner = self.inner.read().await;
        Ok(inner
            .postings
            .iter()
            .filter(|p| needle.is_empty() || p.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Posting>> {
        let inner = self.inner.read().await;
        Ok(inner.postings.iter().find(|p| p.id == id).cloned())
    }

    async fn update(&self, posting: &Posting) -> Result<()> {
        let mut inner = self.inner.write().await;
        let index = inner
            .postings
            .iter()
            .position(|p| p.id == posting.id)
            .ok_or_else(|| AppError::storage(format!("Posting not found: {}", posting.id)))?;
        let old_link = inner.postings[index].link.clone();
        if old_link != posting.link {
            if inner.links.contains(&posting.link) {
                return Err(AppError::storage(format!(
                    "Duplicate source link: {}",
                    posting.link
                )));
            }
            inner.links.remove(&old_link);
            inner.links.insert(posting.link.clone());
        }
        inner.postings[index] = posting.clone();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let index = inner
            .postings
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| AppError::storage(format!("Posting not found: {}", id)))?;
        let removed = inner.postings.remove(index);
        inner.links.remove(&removed.link);
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.postings.clear();
        inner.links.clear();
        Ok(())
    }
}

#[async_trait]
impl SubscriberDirectory for MemoryStore {
    async fn find_all_with_channel(&self) -> Result<Vec<Subscriber>> {
        let inner = self.inner.read().await;
        let mut linked: Vec<Subscriber> = inner
            .subscribers
            .values()
            .filter(|s| s.channel_address.is_some())
            .cloned()
            .collect();
        linked.sort_by_key(|s| s.id);
        Ok(linked)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Subscriber>> {
        Ok(self.inner.read().await.subscribers.get(&id).cloned())
    }

    async fn find_by_channel_address(&self, address: &str) -> Result<Option<Subscriber>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscribers
            .values()
            .find(|s| s.channel_address.as_deref() == Some(address))
            .cloned())
    }

    async fn link_channel(&self, subscriber_id: u64, address: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let subscriber = inner
            .subscribers
            .get_mut(&subscriber_id)
            .ok_or_else(|| AppError::storage(format!("Subscriber not found: {}", subscriber_id)))?;
        if subscriber.channel_address.is_some() {
            return Err(AppError::storage(format!(
                "Subscriber {} already has a linked channel",
                subscriber_id
            )));
        }
        subscriber.channel_address = Some(address.to_string());
        Ok(())
    }

    async fn save_link_token(&self, subscriber_id: u64, token: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.subscribers.contains_key(&subscriber_id) {
            return Err(AppError::storage(format!(
                "Subscriber not found: {}",
                subscriber_id
            )));
        }
        inner.link_tokens.insert(token.to_string(), subscriber_id);
        Ok(())
    }

    async fn consume_link_token(&self, token: &str, address: &str) -> Result<Option<Subscriber>> {
        let mut inner = self.inner.write().await;
        let Some(subscriber_id) = inner.link_tokens.remove(token) else {
            return Ok(None);
        };
        let Some(subscriber) = inner.subscribers.get_mut(&subscriber_id) else {
            return Ok(None);
        };
        if subscriber.channel_address.is_none() {
            subscriber.channel_address = Some(address.to_string());
        } else {
            log::warn!(
                "Link token redeemed for already-linked subscriber {}",
                subscriber_id
            );
        }
        Ok(Some(subscriber.clone()))
    }

    async fn update_filter(&self, subscriber_id: u64, filter: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let subscriber = inner
            .subscribers
            .get_mut(&subscriber_id)
            .ok_or_else(|| AppError::storage(format!("Subscriber not found: {}", subscriber_id)))?;
        subscriber.search_filter = filter.trim().to_string();
        Ok(())
    }

    async fn count_all(&self) -> Result<usize> {
        Ok(self.inner.read().await.subscribers.len())
    }
}

#[async_trait]
impl DeliveryLedger for MemoryStore {
    async fn record(&self, subscriber_id: u64, posting_id: &str) -> Result<()> {
        self.inner
            .write()
            .await
            .delivered
            .insert((subscriber_id, posting_id.to_string()));
        Ok(())
    }

    async fn find_delivered(&self, subscriber_id: u64) -> Result<HashSet<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .delivered
            .iter()
            .filter(|(id, _)| *id == subscriber_id)
            .map(|(_, posting_id)| posting_id.clone())
            .collect())
    }
}

// src/storage/mod.rs

//! Durable store abstractions.
//!
//! Three collaborators back the crawler and the dispatcher:
//!
//! - [`PostingStore`]: postings keyed uniquely by source link
//! - [`SubscriberDirectory`]: subscriber records and link tokens
//! - [`DeliveryLedger`]: append-only (subscriber, posting) delivery pairs
//!
//! The ledger is the durable half of delivery dedup; it survives process
//! restarts, unlike the dispatcher's in-memory session map.

pub mod local;
pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Posting, Subscriber};

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;

/// Store of scraped postings, keyed uniquely by source link.
#[async_trait]
pub trait PostingStore: Send + Sync {
    /// Bulk-insert postings, silently skipping duplicate source links.
    ///
    /// Returns the number of rows actually inserted.
    async fn insert_many(&self, postings: &[Posting]) -> Result<usize>;

    /// Case-insensitive substring match over titles, in insertion order.
    ///
    /// An empty filter returns everything.
    async fn find_matching(&self, filter: &str) -> Result<Vec<Posting>>;

    /// Look up a single posting by id.
    async fn find_by_id(&self, id: &str) -> Result<Option<Posting>>;

    /// Administrative correction of a stored posting.
    async fn update(&self, posting: &Posting) -> Result<()>;

    /// Delete a single posting by id.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete every stored posting.
    async fn purge_all(&self) -> Result<()>;
}

/// Directory of registered subscribers.
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    /// Every subscriber with a linked delivery channel, ordered by id.
    async fn find_all_with_channel(&self) -> Result<Vec<Subscriber>>;

    /// Look up a subscriber by id.
    async fn find_by_id(&self, id: u64) -> Result<Option<Subscriber>>;

    /// Look up a subscriber by linked channel address.
    async fn find_by_channel_address(&self, address: &str) -> Result<Option<Subscriber>>;

    /// Bind a channel address to a subscriber. Fails if already linked.
    async fn link_channel(&self, subscriber_id: u64, address: &str) -> Result<()>;

    /// Store a one-shot link token for a subscriber.
    async fn save_link_token(&self, subscriber_id: u64, token: &str) -> Result<()>;

    /// Redeem a link token, binding the channel address to its subscriber.
    ///
    /// Returns the subscriber on success, `None` for an unknown or spent
    /// token. The token is consumed either way it resolves.
    async fn consume_link_token(&self, token: &str, address: &str) -> Result<Option<Subscriber>>;

    /// Replace a subscriber's search filter.
    async fn update_filter(&self, subscriber_id: u64, filter: &str) -> Result<()>;

    /// Total number of registered subscribers, linked or not.
    async fn count_all(&self) -> Result<usize>;
}

/// Append-only record of postings already delivered per subscriber.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Record a delivered (subscriber, posting) pair. Idempotent.
    async fn record(&self, subscriber_id: u64, posting_id: &str) -> Result<()>;

    /// All posting ids already delivered to a subscriber.
    async fn find_delivered(&self, subscriber_id: u64) -> Result<HashSet<String>>;
}

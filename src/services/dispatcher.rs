// src/services/dispatcher.rs

//! Notification dispatcher.
//!
//! Owns per-subscriber delivery sessions and the broadcast run. A session
//! walks a queue of undelivered postings one message at a time; the
//! broadcast run pushes each linked subscriber their tier quota of new
//! postings in rate-limited batches.
//!
//! Delivery is at-least-once: the ledger is written only after a
//! confirmed send, so a crash between send and record can duplicate a
//! delivery but never silently lose one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::Result;
use crate::models::{DispatchConfig, Posting, Session, SessionStore, Subscriber};
use crate::storage::{DeliveryLedger, PostingStore, SubscriberDirectory};
use crate::transport::{Messenger, SendOptions};
use crate::utils::batch::run_batched;

/// Orchestrates per-subscriber delivery sessions and broadcast runs.
pub struct Dispatcher {
    config: DispatchConfig,
    postings: Arc<dyn PostingStore>,
    subscribers: Arc<dyn SubscriberDirectory>,
    ledger: Arc<dyn DeliveryLedger>,
    sessions: Arc<dyn SessionStore>,
    messenger: Arc<dyn Messenger>,
    rng: Mutex<StdRng>,
}

impl Dispatcher {
    pub fn new(
        config: DispatchConfig,
        postings: Arc<dyn PostingStore>,
        subscribers: Arc<dyn SubscriberDirectory>,
        ledger: Arc<dyn DeliveryLedger>,
        sessions: Arc<dyn SessionStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self::with_rng(
            config,
            postings,
            subscribers,
            ledger,
            sessions,
            messenger,
            StdRng::from_entropy(),
        )
    }

    /// Create a dispatcher with a pinned random source (for tests).
    #[allow(clippy::too_many_arguments)]
    pub fn with_rng(
        config: DispatchConfig,
        postings: Arc<dyn PostingStore>,
        subscribers: Arc<dyn SubscriberDirectory>,
        ledger: Arc<dyn DeliveryLedger>,
        sessions: Arc<dyn SessionStore>,
        messenger: Arc<dyn Messenger>,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            postings,
            subscribers,
            ledger,
            sessions,
            messenger,
            rng: Mutex::new(rng),
        }
    }

    /// Snapshot of a subscriber's session, if one exists.
    pub fn session(&self, subscriber_id: u64) -> Option<Session> {
        self.sessions.get(subscriber_id)
    }

    /// Number of delivery runs currently in flight.
    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }

    /// Begin a delivery run for one subscriber.
    ///
    /// Computes the undelivered matching postings, queues them, and sends
    /// the first one. Calling this while a run is already active reports
    /// the current queue depth instead of resetting progress.
    pub async fn start_session(&self, subscriber_id: u64) -> Result<()> {
        let Some(subscriber) = self.subscribers.find_by_id(subscriber_id).await? else {
            log::warn!("start_session for unknown subscriber {}", subscriber_id);
            return Ok(());
        };
        let Some(address) = subscriber.channel_address.clone() else {
            log::warn!(
                "start_session for subscriber {} with no linked channel",
                subscriber_id
            );
            return Ok(());
        };

        if let Some(session) = self.sessions.get(subscriber_id) {
            if session.is_active {
                self.notify(
                    &address,
                    &format!(
                        "⚠️ You're already receiving postings!\n\n📦 {} remaining in your queue.\n\nUse /stop to stop.",
                        session.pending.len()
                    ),
                )
                .await?;
                return Ok(());
            }
        }

        let filter = subscriber.search_filter.trim().to_string();
        if filter.is_empty() {
            self.notify(
                &address,
                "⚙️ You have no search filter set.\n\nUse /search <term> first, then /jobs.",
            )
            .await?;
            return Ok(());
        }

        self.notify(&address, &format!("🔍 Searching for postings: \"{}\"...", filter))
            .await?;
        log::info!("Loading postings for subscriber {}", subscriber_id);

        let undelivered = self.undelivered_for(subscriber_id, &filter).await?;
        if undelivered.is_empty() {
            self.notify(
                &address,
                &format!(
                    "❌ No new postings matching \"{}\".\n\nTry /search to change your filter.",
                    filter
                ),
            )
            .await?;
            log::info!("No undelivered postings for subscriber {}", subscriber_id);
            return Ok(());
        }

        self.notify(
            &address,
            &format!(
                "✅ Found {} matching postings!\n\n📤 Sending the first one now.\n\nUse /stop to stop.",
                undelivered.len()
            ),
        )
        .await?;
        log::info!(
            "Session started for subscriber {} with {} postings",
            subscriber_id,
            undelivered.len()
        );

        let queue: VecDeque<Posting> = undelivered.into();
        self.sessions
            .put(Session::new(subscriber_id, address, filter, queue));

        self.send_next(subscriber_id).await
    }

    /// Deliver the next queued posting for a subscriber.
    ///
    /// When the queue is already empty, sends a single completion notice
    /// and clears the session; further calls are no-ops.
    pub async fn send_next(&self, subscriber_id: u64) -> Result<()> {
        let Some(mut session) = self.sessions.get(subscriber_id) else {
            return Ok(());
        };
        if !session.is_active {
            self.sessions.remove(subscriber_id);
            return Ok(());
        }

        let Some(posting) = session.pending.pop_front() else {
            self.sessions.remove(subscriber_id);
            self.notify(&session.channel_address, "✅ All matching postings have been sent! 🎉")
                .await?;
            log::info!("Session exhausted for subscriber {}", subscriber_id);
            return Ok(());
        };

        let remaining = session.pending.len();
        let address = session.channel_address.clone();
        self.sessions.put(session);

        match self
            .messenger
            .send(&address, &posting.to_message(remaining), &SendOptions::posting())
            .await
        {
            Ok(()) => {
                // Record only after the confirmed send (at-least-once).
                if let Err(e) = self.ledger.record(subscriber_id, &posting.id).await {
                    log::error!(
                        "Ledger write failed for subscriber {} posting {}: {}",
                        subscriber_id,
                        posting.id,
                        e
                    );
                }
                log::info!(
                    "Sent posting to subscriber {}, {} remaining",
                    subscriber_id,
                    remaining
                );
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "Send failed for subscriber {}: {}. Stopping session.",
                    subscriber_id,
                    e
                );
                self.sessions.remove(subscriber_id);
                Err(e)
            }
        }
    }

    /// Stop a subscriber's delivery run and acknowledge.
    pub async fn stop_session(&self, subscriber_id: u64) -> Result<()> {
        if let Some(session) = self.sessions.remove(subscriber_id) {
            self.notify(
                &session.channel_address,
                "🛑 Posting delivery stopped.\n\nUse /jobs to start again.",
            )
            .await?;
            log::info!("Session stopped for subscriber {}", subscriber_id);
            return Ok(());
        }

        // No live session; still answer so the subscriber is never left in silence.
        if let Some(subscriber) = self.subscribers.find_by_id(subscriber_id).await? {
            if let Some(address) = subscriber.channel_address {
                self.notify(&address, "ℹ️ No active delivery. Use /jobs to start.")
                    .await?;
            }
        }
        Ok(())
    }

    /// Broadcast run: push every linked subscriber their quota of new postings.
    ///
    /// Subscribers are processed in fixed-size batches with an inter-batch
    /// delay; a failure for one subscriber never aborts the others.
    pub async fn start_all(&self) -> Result<()> {
        let subscribers = self.subscribers.find_all_with_channel().await?;
        log::info!("Broadcast run starting for {} subscribers", subscribers.len());

        let results = run_batched(
            subscribers,
            self.config.batch_size,
            Duration::from_millis(self.config.batch_delay_ms),
            |subscriber| self.deliver_to(subscriber),
        )
        .await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            log::warn!(
                "Broadcast run finished: {} delivered, {} failed",
                results.len() - failures,
                failures
            );
        } else {
            log::info!("Broadcast run complete: {} subscribers", results.len());
        }
        Ok(())
    }

    /// End-of-day stop: clear every session and notify subscribers.
    pub async fn stop_all(&self) -> Result<()> {
        let subscribers = self.subscribers.find_all_with_channel().await?;
        log::info!("Stopping deliveries for {} subscribers", subscribers.len());

        let results = run_batched(
            subscribers,
            self.config.batch_size,
            Duration::from_millis(self.config.batch_delay_ms),
            |subscriber| self.stop_one(subscriber),
        )
        .await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            log::warn!("{} stop notices failed", failures);
        }

        let dropped = self.sessions.clear();
        if !dropped.is_empty() {
            log::info!("Cleared {} leftover sessions", dropped.len());
        }
        Ok(())
    }

    /// Purge postings whose deadline has already passed.
    pub async fn remove_outdated(&self) -> Result<usize> {
        self.remove_outdated_before(Local::now().date_naive()).await
    }

    /// Purge postings with a deadline strictly before `today`.
    pub async fn remove_outdated_before(&self, today: NaiveDate) -> Result<usize> {
        let all = self.postings.find_matching("").await?;
        let mut removed = 0;
        for posting in all {
            if posting.deadline_date().is_some_and(|d| d < today) {
                self.postings.delete(&posting.id).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Removed {} outdated postings", removed);
        }
        Ok(removed)
    }

    /// One subscriber's share of the broadcast run, failure-isolated.
    async fn deliver_to(&self, subscriber: Subscriber) -> Result<()> {
        let id = subscriber.id;
        if let Err(e) = self.deliver_run(subscriber).await {
            log::error!("Delivery failed for subscriber {}: {}", id, e);
            return Err(e);
        }
        Ok(())
    }

    async fn deliver_run(&self, subscriber: Subscriber) -> Result<()> {
        let Some(address) = subscriber.channel_address.clone() else {
            return Ok(());
        };

        // A linked subscriber with no filter gets a nudge, not a flood.
        let filter = subscriber.search_filter.trim().to_string();
        if filter.is_empty() {
            self.notify(
                &address,
                "⚙️ You have no search filter set.\n\nUse /search <term> to start receiving postings.",
            )
            .await?;
            return Ok(());
        }

        let undelivered = self.undelivered_for(subscriber.id, &filter).await?;
        if undelivered.is_empty() {
            self.notify(
                &address,
                &format!("❌ No new postings matching \"{}\" today.", filter),
            )
            .await?;
            return Ok(());
        }

        // Quota is re-rolled per run for Basic; the lock never crosses an await.
        let quota = {
            let mut rng = self.rng.lock().unwrap();
            subscriber.tier.quota(&mut *rng)
        };
        let take = quota.unwrap_or(usize::MAX).min(undelivered.len());

        for (index, posting) in undelivered.iter().take(take).enumerate() {
            if index > 0 && self.config.message_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.message_delay_ms)).await;
            }

            self.messenger
                .send(
                    &address,
                    &posting.to_message(take - index - 1),
                    &SendOptions::posting(),
                )
                .await?;

            if let Err(e) = self.ledger.record(subscriber.id, &posting.id).await {
                log::error!(
                    "Ledger write failed for subscriber {} posting {}: {}",
                    subscriber.id,
                    posting.id,
                    e
                );
            }
        }

        log::info!(
            "Delivered {}/{} postings to subscriber {}",
            take,
            undelivered.len(),
            subscriber.id
        );

        if undelivered.len() > take {
            if let Some(next) = subscriber.tier.next() {
                self.notify(
                    &address,
                    &format!(
                        "⭐ {} more postings match your filter today. Upgrade to {} for {}.",
                        undelivered.len() - take,
                        next.name(),
                        next.benefit()
                    ),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn stop_one(&self, subscriber: Subscriber) -> Result<()> {
        let Some(address) = subscriber.channel_address.clone() else {
            return Ok(());
        };
        self.sessions.remove(subscriber.id);
        if let Err(e) = self
            .notify(&address, "🛑 Posting delivery stopped for today. See you next run!")
            .await
        {
            log::error!("Stop notice failed for subscriber {}: {}", subscriber.id, e);
            return Err(e);
        }
        Ok(())
    }

    /// Matching postings not yet recorded as delivered, in discovery order.
    async fn undelivered_for(&self, subscriber_id: u64, filter: &str) -> Result<Vec<Posting>> {
        // The store matches titles only; organization matching happens here.
        let mut matching = self.postings.find_matching("").await?;
        matching.retain(|p| p.matches(filter));

        let delivered = self.ledger.find_delivered(subscriber_id).await?;
        matching.retain(|p| !delivered.contains(&p.id));
        Ok(matching)
    }

    async fn notify(&self, address: &str, text: &str) -> Result<()> {
        self.messenger.send(address, text, &SendOptions::default()).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::AppError;
    use crate::models::{MemorySessionStore, Tier};
    use crate::storage::MemoryStore;

    /// Captures outbound messages; addresses can be scripted to fail.
    #[derive(Default)]
    struct RecordingMessenger {
        sent: StdMutex<Vec<(String, String)>>,
        failing: StdMutex<HashSet<String>>,
    }

    impl RecordingMessenger {
        fn fail_address(&self, address: &str) {
            self.failing.lock().unwrap().insert(address.to_string());
        }

        fn sent_to(&self, address: &str) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, _)| a == address)
                .map(|(_, text)| text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send(&self, address: &str, text: &str, _opts: &SendOptions) -> Result<()> {
            if self.failing.lock().unwrap().contains(address) {
                return Err(AppError::transport(format!("unreachable: {}", address)));
            }
            self.sent
                .lock()
                .unwrap()
                .push((address.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        sessions: Arc<MemorySessionStore>,
        messenger: Arc<RecordingMessenger>,
        dispatcher: Dispatcher,
    }

    fn harness(seed: u64) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let config = DispatchConfig {
            message_delay_ms: 0,
            batch_size: 10,
            batch_delay_ms: 0,
        };
        let dispatcher = Dispatcher::with_rng(
            config,
            store.clone(),
            store.clone(),
            store.clone(),
            sessions.clone(),
            messenger.clone(),
            StdRng::seed_from_u64(seed),
        );
        Harness {
            store,
            sessions,
            messenger,
            dispatcher,
        }
    }

    fn posting(title: &str, link: &str) -> Posting {
        Posting::new(title, "Acme", link, "01/01/2025", "31/12/2025", 1)
    }

    async fn seed_postings(store: &MemoryStore, titles: &[&str]) {
        let batch: Vec<Posting> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| posting(title, &format!("https://www.jobs.ge/{}", i + 1)))
            .collect();
        store.insert_many(&batch).await.unwrap();
    }

    async fn linked_subscriber(store: &MemoryStore, tier: Tier, filter: &str, address: &str) -> u64 {
        let sub = store.create_subscriber(tier, filter).await;
        store.link_channel(sub.id, address).await.unwrap();
        sub.id
    }

    fn postings_sent(messenger: &RecordingMessenger, address: &str) -> usize {
        messenger
            .sent_to(address)
            .iter()
            .filter(|m| m.contains("💼"))
            .count()
    }

    #[tokio::test]
    async fn test_start_session_queues_and_sends_first() {
        let h = harness(1);
        seed_postings(&h.store, &["Rust Developer", "Rust Engineer", "Accountant"]).await;
        let id = linked_subscriber(&h.store, Tier::Premium, "rust", "1001").await;

        h.dispatcher.start_session(id).await.unwrap();

        let session = h.dispatcher.session(id).unwrap();
        assert_eq!(session.pending.len(), 1);

        let sent = h.messenger.sent_to("1001");
        assert!(sent.iter().any(|m| m.contains("Found 2 matching")));
        assert_eq!(postings_sent(&h.messenger, "1001"), 1);
        assert_eq!(h.store.find_delivered(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_session_with_no_matches() {
        let h = harness(1);
        seed_postings(&h.store, &["Accountant"]).await;
        let id = linked_subscriber(&h.store, Tier::Basic, "rust", "1001").await;

        h.dispatcher.start_session(id).await.unwrap();

        assert!(h.dispatcher.session(id).is_none());
        let sent = h.messenger.sent_to("1001");
        assert!(sent.iter().any(|m| m.contains("No new postings")));
    }

    #[tokio::test]
    async fn test_start_session_while_active_reports_instead_of_resetting() {
        let h = harness(1);
        seed_postings(&h.store, &["Rust Developer", "Rust Engineer", "Rust Lead"]).await;
        let id = linked_subscriber(&h.store, Tier::Premium, "rust", "1001").await;

        h.dispatcher.start_session(id).await.unwrap();
        let pending_before = h.dispatcher.session(id).unwrap().pending.len();

        h.dispatcher.start_session(id).await.unwrap();

        assert_eq!(h.dispatcher.session(id).unwrap().pending.len(), pending_before);
        let sent = h.messenger.sent_to("1001");
        assert!(sent.iter().any(|m| m.contains("already receiving")));
    }

    #[tokio::test]
    async fn test_send_next_sends_one_completion_notice() {
        let h = harness(1);
        seed_postings(&h.store, &["Rust Developer", "Rust Engineer"]).await;
        let id = linked_subscriber(&h.store, Tier::Premium, "rust", "1001").await;

        h.dispatcher.start_session(id).await.unwrap();
        h.dispatcher.send_next(id).await.unwrap();
        // Queue is now empty; this call produces the completion notice.
        h.dispatcher.send_next(id).await.unwrap();
        // And this one is a no-op.
        h.dispatcher.send_next(id).await.unwrap();

        assert!(h.dispatcher.session(id).is_none());
        let completions = h
            .messenger
            .sent_to("1001")
            .iter()
            .filter(|m| m.contains("🎉"))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(postings_sent(&h.messenger, "1001"), 2);
        assert_eq!(h.store.find_delivered(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_send_records_nothing_and_drops_session() {
        let h = harness(1);
        let id = linked_subscriber(&h.store, Tier::Basic, "rust", "1001").await;
        let queue: VecDeque<Posting> =
            vec![posting("Rust Developer", "https://www.jobs.ge/1")].into();
        h.sessions.put(Session::new(id, "1001", "rust", queue));
        h.messenger.fail_address("1001");

        assert!(h.dispatcher.send_next(id).await.is_err());

        assert!(h.dispatcher.session(id).is_none());
        assert!(h.store.find_delivered(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_session_acknowledges() {
        let h = harness(1);
        let id = linked_subscriber(&h.store, Tier::Basic, "rust", "1001").await;
        h.sessions
            .put(Session::new(id, "1001", "rust", VecDeque::new()));

        h.dispatcher.stop_session(id).await.unwrap();
        assert!(h.dispatcher.session(id).is_none());
        assert!(h.messenger.sent_to("1001").iter().any(|m| m.contains("🛑")));

        // Stopping again without a session still answers.
        h.dispatcher.stop_session(id).await.unwrap();
        assert!(h.messenger.sent_to("1001").iter().any(|m| m.contains("ℹ️")));
    }

    #[tokio::test]
    async fn test_broadcast_basic_quota_and_upsell() {
        let h = harness(42);
        let titles: Vec<String> = (1..=10).map(|i| format!("Rust Developer {}", i)).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        seed_postings(&h.store, &refs).await;
        let id = linked_subscriber(&h.store, Tier::Basic, "rust", "1001").await;

        h.dispatcher.start_all().await.unwrap();

        let delivered = postings_sent(&h.messenger, "1001");
        assert!((3..=5).contains(&delivered));
        assert_eq!(h.store.find_delivered(id).await.unwrap().len(), delivered);

        let upsells: Vec<String> = h
            .messenger
            .sent_to("1001")
            .into_iter()
            .filter(|m| m.contains("Upgrade to Pro"))
            .collect();
        assert_eq!(upsells.len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_premium_gets_everything_once() {
        let h = harness(1);
        let titles: Vec<String> = (1..=10).map(|i| format!("Rust Developer {}", i)).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        seed_postings(&h.store, &refs).await;
        let id = linked_subscriber(&h.store, Tier::Premium, "rust", "1001").await;

        h.dispatcher.start_all().await.unwrap();
        assert_eq!(postings_sent(&h.messenger, "1001"), 10);
        assert!(!h.messenger.sent_to("1001").iter().any(|m| m.contains("Upgrade")));

        // A second run finds nothing new.
        h.dispatcher.start_all().await.unwrap();
        assert_eq!(postings_sent(&h.messenger, "1001"), 10);
        assert!(h
            .messenger
            .sent_to("1001")
            .iter()
            .any(|m| m.contains("No new postings")));
        assert_eq!(h.store.find_delivered(id).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_broadcast_isolates_subscriber_failures() {
        let h = harness(1);
        seed_postings(&h.store, &["Rust Developer"]).await;
        linked_subscriber(&h.store, Tier::Premium, "rust", "1001").await;
        let healthy = linked_subscriber(&h.store, Tier::Premium, "rust", "2002").await;
        h.messenger.fail_address("1001");

        h.dispatcher.start_all().await.unwrap();

        assert_eq!(postings_sent(&h.messenger, "2002"), 1);
        assert_eq!(h.store.find_delivered(healthy).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_nudges_subscribers_without_filter() {
        let h = harness(1);
        seed_postings(&h.store, &["Rust Developer"]).await;
        let id = linked_subscriber(&h.store, Tier::Premium, "", "1001").await;

        h.dispatcher.start_all().await.unwrap();

        assert_eq!(postings_sent(&h.messenger, "1001"), 0);
        assert!(h.messenger.sent_to("1001").iter().any(|m| m.contains("⚙️")));
        assert!(h.store.find_delivered(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_clears_every_session() {
        let h = harness(1);
        let a = linked_subscriber(&h.store, Tier::Basic, "rust", "1001").await;
        let b = linked_subscriber(&h.store, Tier::Pro, "java", "2002").await;
        h.sessions.put(Session::new(a, "1001", "rust", VecDeque::new()));
        h.sessions.put(Session::new(b, "2002", "java", VecDeque::new()));

        h.dispatcher.stop_all().await.unwrap();

        assert_eq!(h.sessions.active_count(), 0);
        assert!(h.messenger.sent_to("1001").iter().any(|m| m.contains("🛑")));
        assert!(h.messenger.sent_to("2002").iter().any(|m| m.contains("🛑")));
    }

    #[tokio::test]
    async fn test_remove_outdated_purges_past_deadlines() {
        let h = harness(1);
        let batch = vec![
            Posting::new("Old", "Acme", "https://www.jobs.ge/1", "01/01/2025", "10/01/2025", 1),
            Posting::new("Live", "Acme", "https://www.jobs.ge/2", "01/01/2025", "10/03/2025", 1),
            Posting::new("Undated", "Acme", "https://www.jobs.ge/3", "01/01/2025", "", 1),
        ];
        h.store.insert_many(&batch).await.unwrap();

        let today = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let removed = h.dispatcher.remove_outdated_before(today).await.unwrap();

        assert_eq!(removed, 1);
        let left = h.store.find_matching("").await.unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|p| p.title != "Old"));
    }

    /// Ledger whose writes always fail; reads stay empty.
    struct BrokenLedger;

    #[async_trait]
    impl DeliveryLedger for BrokenLedger {
        async fn record(&self, _subscriber_id: u64, _posting_id: &str) -> Result<()> {
            Err(AppError::storage("ledger unavailable"))
        }

        async fn find_delivered(&self, _subscriber_id: u64) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_stop_the_run() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::with_rng(
            DispatchConfig {
                message_delay_ms: 0,
                batch_size: 10,
                batch_delay_ms: 0,
            },
            store.clone(),
            store.clone(),
            Arc::new(BrokenLedger),
            Arc::new(MemorySessionStore::new()),
            messenger.clone(),
            StdRng::seed_from_u64(1),
        );

        seed_postings(&store, &["Rust Developer", "Rust Engineer", "Rust Lead"]).await;
        linked_subscriber(&store, Tier::Premium, "rust", "1001").await;
        linked_subscriber(&store, Tier::Premium, "rust", "2002").await;

        dispatcher.start_all().await.unwrap();

        // Every posting still goes out to every subscriber.
        assert_eq!(postings_sent(&messenger, "1001"), 3);
        assert_eq!(postings_sent(&messenger, "2002"), 3);
    }
}

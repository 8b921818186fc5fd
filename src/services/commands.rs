// src/services/commands.rs

//! Inbound command routing.
//!
//! Maps parsed [`IncomingCommand`]s onto dispatcher and directory
//! operations. Every command gets an answer, including unknown ones.

use std::sync::Arc;

use crate::error::Result;
use crate::services::Dispatcher;
use crate::storage::SubscriberDirectory;
use crate::transport::{IncomingCommand, Messenger, SendOptions};

/// Recognized bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start,
    Jobs,
    Stop,
    Search,
    Status,
    Users,
    Unknown,
}

impl Command {
    fn from_name(name: &str) -> Self {
        match name {
            "start" => Command::Start,
            "jobs" => Command::Jobs,
            "stop" => Command::Stop,
            "search" => Command::Search,
            "status" => Command::Status,
            "users" => Command::Users,
            _ => Command::Unknown,
        }
    }
}

/// Routes inbound commands to the dispatcher.
pub struct CommandRouter {
    dispatcher: Arc<Dispatcher>,
    subscribers: Arc<dyn SubscriberDirectory>,
    messenger: Arc<dyn Messenger>,
}

impl CommandRouter {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        subscribers: Arc<dyn SubscriberDirectory>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            dispatcher,
            subscribers,
            messenger,
        }
    }

    /// Handle one inbound command end to end.
    pub async fn handle(&self, command: IncomingCommand) -> Result<()> {
        log::info!(
            "Command /{} from channel {}",
            command.name,
            command.channel_address
        );
        match Command::from_name(&command.name) {
            Command::Start => self.handle_start(&command).await,
            Command::Jobs => self.handle_jobs(&command).await,
            Command::Stop => self.handle_stop(&command).await,
            Command::Search => self.handle_search(&command).await,
            Command::Status => self.handle_status(&command).await,
            Command::Users => self.handle_users(&command).await,
            Command::Unknown => self.handle_unknown(&command).await,
        }
    }

    /// `/start [token]`: link a channel via a one-shot token, or greet.
    async fn handle_start(&self, command: &IncomingCommand) -> Result<()> {
        let address = &command.channel_address;

        if let Some(token) = command.args.first() {
            return match self.subscribers.consume_link_token(token, address).await? {
                Some(subscriber) => {
                    log::info!("Channel {} linked to subscriber {}", address, subscriber.id);
                    self.reply(
                        address,
                        &format!(
                            "✅ You're linked as a {} subscriber!\n\nUse /search <term> to set a filter, then /jobs to receive postings.",
                            subscriber.tier.name()
                        ),
                    )
                    .await
                }
                None => {
                    self.reply(address, "❌ That link token is invalid or already used.")
                        .await
                }
            };
        }

        match self.subscribers.find_by_channel_address(address).await? {
            Some(_) => {
                self.reply(
                    address,
                    "👋 Welcome back!\n\nUse /jobs to receive postings, /search to change your filter, or /status to check your queue.",
                )
                .await
            }
            None => {
                self.reply(
                    address,
                    "👋 Welcome! This channel isn't linked yet.\n\nSend /start <token> with the link token from your registration.",
                )
                .await
            }
        }
    }

    /// `/jobs`: start a delivery session for the linked subscriber.
    async fn handle_jobs(&self, command: &IncomingCommand) -> Result<()> {
        let address = &command.channel_address;
        match self.subscribers.find_by_channel_address(address).await? {
            Some(subscriber) => self.dispatcher.start_session(subscriber.id).await,
            None => self.not_linked(address).await,
        }
    }

    /// `/stop`: stop the current delivery session.
    async fn handle_stop(&self, command: &IncomingCommand) -> Result<()> {
        let address = &command.channel_address;
        match self.subscribers.find_by_channel_address(address).await? {
            Some(subscriber) => self.dispatcher.stop_session(subscriber.id).await,
            None => self.not_linked(address).await,
        }
    }

    /// `/search <term>`: replace the subscriber's search filter.
    async fn handle_search(&self, command: &IncomingCommand) -> Result<()> {
        let address = &command.channel_address;
        let Some(subscriber) = self.subscribers.find_by_channel_address(address).await? else {
            return self.not_linked(address).await;
        };

        let filter = command.args.join(" ");
        if filter.trim().is_empty() {
            return self
                .reply(
                    address,
                    "✏️ Usage: /search <term>\n\nExample: /search rust developer",
                )
                .await;
        }

        self.subscribers
            .update_filter(subscriber.id, &filter)
            .await?;
        log::info!("Subscriber {} filter set to {:?}", subscriber.id, filter);
        self.reply(
            address,
            &format!(
                "🔍 Filter updated to \"{}\".\n\nUse /jobs to receive matching postings.",
                filter.trim()
            ),
        )
        .await
    }

    /// `/status`: report the subscriber's filter and queue depth.
    async fn handle_status(&self, command: &IncomingCommand) -> Result<()> {
        let address = &command.channel_address;
        let Some(subscriber) = self.subscribers.find_by_channel_address(address).await? else {
            return self.not_linked(address).await;
        };

        let filter = if subscriber.search_filter.trim().is_empty() {
            "(not set)".to_string()
        } else {
            format!("\"{}\"", subscriber.search_filter)
        };

        let text = match self.dispatcher.session(subscriber.id) {
            Some(session) => format!(
                "📊 Status\n\nTier: {}\nFilter: {}\nDelivery: active, {} postings queued",
                subscriber.tier.name(),
                filter,
                session.pending.len()
            ),
            None => format!(
                "📊 Status\n\nTier: {}\nFilter: {}\nDelivery: not running",
                subscriber.tier.name(),
                filter
            ),
        };
        self.reply(address, &text).await
    }

    /// `/users`: subscriber counts, only answered on a linked channel.
    async fn handle_users(&self, command: &IncomingCommand) -> Result<()> {
        let address = &command.channel_address;
        if self.subscribers.find_by_channel_address(address).await?.is_none() {
            return self.not_linked(address).await;
        }

        let total = self.subscribers.count_all().await?;
        let linked = self.subscribers.find_all_with_channel().await?.len();
        self.reply(
            address,
            &format!(
                "👥 Subscribers\n\nTotal: {}\nLinked: {}\nActive deliveries: {}",
                total,
                linked,
                self.dispatcher.active_sessions()
            ),
        )
        .await
    }

    async fn handle_unknown(&self, command: &IncomingCommand) -> Result<()> {
        self.reply(
            &command.channel_address,
            "🤔 I don't know that command.\n\nAvailable commands:\n/start <token> - link this channel\n/search <term> - set your filter\n/jobs - receive postings\n/stop - stop delivery\n/status - check your queue",
        )
        .await
    }

    async fn not_linked(&self, address: &str) -> Result<()> {
        self.reply(
            address,
            "⚠️ This channel isn't linked to a subscription.\n\nSend /start <token> with your link token first.",
        )
        .await
    }

    async fn reply(&self, address: &str, text: &str) -> Result<()> {
        self.messenger.send(address, text, &SendOptions::default()).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::error::AppError;
    use crate::models::{DispatchConfig, MemorySessionStore, Tier};
    use crate::storage::MemoryStore;

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(String, String)>>,
        failing: Mutex<HashSet<String>>,
    }

    impl RecordingMessenger {
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
        messenger: Arc<RecordingMessenger>,
        router: CommandRouter,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Arc::new(Dispatcher::with_rng(
            DispatchConfig {
                message_delay_ms: 0,
                batch_size: 10,
                batch_delay_ms: 0,
            },
            store.clone(),
            store.clone(),
            store.clone(),
            sessions,
            messenger.clone(),
            StdRng::seed_from_u64(1),
        ));
        let router = CommandRouter::new(dispatcher, store.clone(), messenger.clone());
        Harness {
            store,
            messenger,
            router,
        }
    }

    fn command(address: &str, text: &str) -> IncomingCommand {
        IncomingCommand::parse(address, text).unwrap()
    }

    #[tokio::test]
    async fn test_start_with_token_links_channel() {
        let h = harness();
        let sub = h.store.create_subscriber(Tier::Pro, "rust").await;
        h.store.save_link_token(sub.id, "tok-1").await.unwrap();

        h.router.handle(command("1001", "/start tok-1")).await.unwrap();

        let linked = h.store.find_by_channel_address("1001").await.unwrap();
        assert_eq!(linked.unwrap().id, sub.id);
        assert!(h.messenger.sent_to("1001").iter().any(|m| m.contains("Pro")));
    }

    #[tokio::test]
    async fn test_start_with_bad_token() {
        let h = harness();
        h.router.handle(command("1001", "/start nope")).await.unwrap();

        assert!(h.store.find_by_channel_address("1001").await.unwrap().is_none());
        assert!(h.messenger.sent_to("1001").iter().any(|m| m.contains("invalid")));
    }

    #[tokio::test]
    async fn test_jobs_from_unlinked_channel() {
        let h = harness();
        h.router.handle(command("1001", "/jobs")).await.unwrap();
        assert!(h
            .messenger
            .sent_to("1001")
            .iter()
            .any(|m| m.contains("isn't linked")));
    }

    #[tokio::test]
    async fn test_search_updates_filter() {
        let h = harness();
        let sub = h.store.create_subscriber(Tier::Basic, "").await;
        h.store.link_channel(sub.id, "1001").await.unwrap();

        h.router
            .handle(command("1001", "/search senior rust"))
            .await
            .unwrap();

        let updated = h.store.find_by_id(sub.id).await.unwrap().unwrap();
        assert_eq!(updated.search_filter, "senior rust");
        assert!(h
            .messenger
            .sent_to("1001")
            .iter()
            .any(|m| m.contains("senior rust")));
    }

    #[tokio::test]
    async fn test_search_without_args_shows_usage() {
        let h = harness();
        let sub = h.store.create_subscriber(Tier::Basic, "rust").await;
        h.store.link_channel(sub.id, "1001").await.unwrap();

        h.router.handle(command("1001", "/search")).await.unwrap();

        let unchanged = h.store.find_by_id(sub.id).await.unwrap().unwrap();
        assert_eq!(unchanged.search_filter, "rust");
        assert!(h.messenger.sent_to("1001").iter().any(|m| m.contains("Usage")));
    }

    #[tokio::test]
    async fn test_status_reports_tier_and_filter() {
        let h = harness();
        let sub = h.store.create_subscriber(Tier::Premium, "rust").await;
        h.store.link_channel(sub.id, "1001").await.unwrap();

        h.router.handle(command("1001", "/status")).await.unwrap();

        let sent = h.messenger.sent_to("1001");
        let status = sent.iter().find(|m| m.contains("📊")).unwrap();
        assert!(status.contains("Premium"));
        assert!(status.contains("\"rust\""));
        assert!(status.contains("not running"));
    }

    #[tokio::test]
    async fn test_unknown_command_lists_help() {
        let h = harness();
        h.router.handle(command("1001", "/frobnicate")).await.unwrap();
        assert!(h.messenger.sent_to("1001").iter().any(|m| m.contains("/jobs")));
    }

    #[tokio::test]
    async fn test_users_reports_subscriber_counts() {
        let h = harness();
        let a = h.store.create_subscriber(Tier::Basic, "rust").await;
        let b = h.store.create_subscriber(Tier::Pro, "java").await;
        h.store.create_subscriber(Tier::Premium, "go").await;
        h.store.link_channel(a.id, "1001").await.unwrap();
        h.store.link_channel(b.id, "2002").await.unwrap();

        h.router.handle(command("1001", "/users")).await.unwrap();

        let sent = h.messenger.sent_to("1001");
        let report = sent.iter().find(|m| m.contains("👥")).unwrap();
        assert!(report.contains("Total: 3"));
        assert!(report.contains("Linked: 2"));
        assert!(report.contains("Active deliveries: 0"));
    }

    #[tokio::test]
    async fn test_users_from_unlinked_channel() {
        let h = harness();
        h.router.handle(command("9999", "/users")).await.unwrap();
        assert!(h
            .messenger
            .sent_to("9999")
            .iter()
            .any(|m| m.contains("isn't linked")));
    }
}

// src/bin/cli.rs

//! jobfeed CLI.
//!
//! Local entry point for crawling, subscriber management, broadcast runs,
//! and the long-running Telegram bot.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use rand::Rng;
use rand::distributions::Alphanumeric;

use async_trait::async_trait;

use jobfeed::error::{AppError, Result};
use jobfeed::models::{Config, MemorySessionStore, Tier};
use jobfeed::services::{CommandRouter, CrawlOptions, Dispatcher, JobCrawler};
use jobfeed::storage::{LocalStore, SubscriberDirectory};
use jobfeed::transport::{Messenger, SendOptions, TelegramTransport};

#[derive(Parser, Debug)]
#[command(name = "jobfeed", version, about = "jobs.ge crawler and notification bot")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "storage/config.toml")]
    config: String,

    /// Storage root directory
    #[arg(short, long, default_value = "storage")]
    storage: String,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl jobs.ge listing pages into the posting store
    Crawl {
        /// Title filter applied during the crawl
        #[arg(short, long, default_value = "")]
        query: String,
        /// First listing page to fetch
        #[arg(long, default_value_t = 1)]
        start_page: u32,
        /// Page ceiling for this run
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Run the Telegram bot: poll for commands and answer them
    Serve,
    /// Register a subscriber and print their one-shot link token
    Register {
        /// Subscription tier: basic, pro, or premium
        #[arg(short, long, default_value = "basic")]
        tier: String,
        /// Initial search filter
        #[arg(short, long, default_value = "")]
        filter: String,
    },
    /// Push every linked subscriber their quota of new postings
    StartAll,
    /// Stop all deliveries and notify subscribers
    StopAll,
    /// Delete postings whose application deadline has passed
    PurgeOutdated,
    /// Validate the configuration file
    Validate,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn parse_tier(name: &str) -> Result<Tier> {
    match name.to_lowercase().as_str() {
        "basic" => Ok(Tier::Basic),
        "pro" => Ok(Tier::Pro),
        "premium" => Ok(Tier::Premium),
        other => Err(AppError::validation(format!(
            "Unknown tier {:?}; expected basic, pro, or premium",
            other
        ))),
    }
}

fn generate_link_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Resolve the bot token from config, falling back to the environment.
fn telegram_config(config: &Config) -> jobfeed::models::TelegramConfig {
    let mut telegram = config.telegram.clone();
    if telegram.bot_token.trim().is_empty() {
        if let Ok(token) = std::env::var("JOBFEED_BOT_TOKEN") {
            telegram.bot_token = token;
        }
    }
    telegram
}

/// Messenger for maintenance commands that never send anything.
struct NullMessenger;

#[async_trait]
impl Messenger for NullMessenger {
    async fn send(&self, _address: &str, _text: &str, _opts: &SendOptions) -> Result<()> {
        Ok(())
    }
}

fn dispatcher(
    config: &Config,
    store: &Arc<LocalStore>,
    messenger: Arc<dyn Messenger>,
) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        config.dispatch.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(MemorySessionStore::new()),
        messenger,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    config.validate()?;

    match cli.command {
        Command::Crawl {
            query,
            start_page,
            max_pages,
        } => {
            if let Some(pages) = max_pages {
                config.crawler.max_pages = pages;
            }
            let store = Arc::new(LocalStore::open(&cli.storage).await?);
            let crawler = JobCrawler::new(&config)?;
            let options = CrawlOptions::from_config(&config.crawler);

            let summary = crawler
                .crawl_and_store(store.as_ref(), &query, start_page, &options)
                .await?;
            println!(
                "Crawled through page {}: {} postings found",
                summary.last_page_visited, summary.total_found
            );
        }
        Command::Serve => {
            let store = Arc::new(LocalStore::open(&cli.storage).await?);
            let transport = Arc::new(TelegramTransport::new(telegram_config(&config))?);
            let dispatcher = dispatcher(&config, &store, transport.clone());
            let router = CommandRouter::new(dispatcher, store.clone(), transport.clone());

            transport.run_polling(|command| router.handle(command)).await?;
        }
        Command::Register { tier, filter } => {
            let store = Arc::new(LocalStore::open(&cli.storage).await?);
            let subscriber = store.create_subscriber(parse_tier(&tier)?, &filter).await?;
            let token = generate_link_token();
            store.save_link_token(subscriber.id, &token).await?;

            println!("Registered subscriber {}", subscriber.id);
            println!("Link token: {}", token);
            println!("Send the bot: /start {}", token);
        }
        Command::StartAll => {
            let store = Arc::new(LocalStore::open(&cli.storage).await?);
            let transport = Arc::new(TelegramTransport::new(telegram_config(&config))?);
            dispatcher(&config, &store, transport).start_all().await?;
        }
        Command::StopAll => {
            let store = Arc::new(LocalStore::open(&cli.storage).await?);
            let transport = Arc::new(TelegramTransport::new(telegram_config(&config))?);
            dispatcher(&config, &store, transport).stop_all().await?;
        }
        Command::PurgeOutdated => {
            let store = Arc::new(LocalStore::open(&cli.storage).await?);
            let removed = dispatcher(&config, &store, Arc::new(NullMessenger))
                .remove_outdated()
                .await?;
            println!("Removed {} outdated postings", removed);
        }
        Command::Validate => {
            println!("Configuration OK");
            println!("  base_url: {}", config.crawler.base_url);
            println!("  max_jobs: {}", config.crawler.max_jobs);
            println!("  months:   {} entries", config.months.len());
        }
    }

    Ok(())
}

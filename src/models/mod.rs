// src/models/mod.rs

//! Domain data structures.

pub mod config;
pub mod posting;
pub mod session;
pub mod subscriber;

pub use config::{Config, CrawlerConfig, DispatchConfig, MonthTable, TelegramConfig};
pub use posting::Posting;
pub use session::{MemorySessionStore, Session, SessionStore};
pub use subscriber::{Subscriber, Tier};

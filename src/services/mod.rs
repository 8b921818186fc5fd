// src/services/mod.rs

//! Core services: crawling, dispatching, and command handling.

pub mod commands;
pub mod crawler;
pub mod dispatcher;

pub use commands::CommandRouter;
pub use crawler::{CrawlOptions, CrawlSummary, JobCrawler, PageFetcher};
pub use dispatcher::Dispatcher;

// src/models/subscriber.rs

//! Subscriber records and subscription tiers.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Subscription tier governing the daily delivery quota.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Pro,
    Premium,
}

impl Tier {
    /// Daily delivery quota for this tier.
    ///
    /// Basic gets a randomized quota in `3..=5`, re-rolled per run for
    /// daily variety. Pro is fixed at 20. Premium is unbounded (`None`).
    /// The random source is injected so tests can pin it.
    pub fn quota<R: Rng>(self, rng: &mut R) -> Option<usize> {
        match self {
            Tier::Basic => Some(rng.gen_range(3..=5)),
            Tier::Pro => Some(20),
            Tier::Premium => None,
        }
    }

    /// The next tier up, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Basic => Some(Tier::Pro),
            Tier::Pro => Some(Tier::Premium),
            Tier::Premium => None,
        }
    }

    /// Display name used in user-facing messages.
    pub fn name(self) -> &'static str {
        match self {
            Tier::Basic => "Basic",
            Tier::Pro => "Pro",
            Tier::Premium => "Premium",
        }
    }

    /// Headline benefit used in upsell messages.
    pub fn benefit(self) -> &'static str {
        match self {
            Tier::Basic => "a few postings per day",
            Tier::Pro => "up to 20 postings per day",
            Tier::Premium => "unlimited daily postings",
        }
    }
}

/// A registered notification recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    /// Unique subscriber identifier
    pub id: u64,

    /// Tier captured at registration time
    pub tier: Tier,

    /// Search filter matched against posting titles and organizations
    pub search_filter: String,

    /// Telegram chat id, set exactly once via the link-token exchange
    pub channel_address: Option<String>,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    /// Create a subscriber with no linked channel yet.
    pub fn new(id: u64, tier: Tier, search_filter: impl Into<String>) -> Self {
        Self {
            id,
            tier,
            search_filter: search_filter.into(),
            channel_address: None,
            created_at: Utc::now(),
        }
    }
}

// src/models/posting.rs

//! Job posting data structure.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A job posting scraped from a listing page.
///
/// Postings are uniquely keyed by their source link; the id is a stable
/// digest of that link so re-crawls of the same page produce the same id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posting {
    /// Stable identifier derived from the source link
    pub id: String,

    /// Vacancy title
    pub title: String,

    /// Hiring organization
    pub organization: String,

    /// Full URL to the posting (unique key)
    pub link: String,

    /// Publish date in `DD/MM/YYYY` form (empty if the source omitted it)
    pub published_on: String,

    /// Application deadline in `DD/MM/YYYY` form (empty if unknown)
    pub deadline: String,

    /// Listing page the posting was found on
    pub page: u32,
}

impl Posting {
    /// Create a posting, deriving the id from the source link.
    pub fn new(
        title: impl Into<String>,
        organization: impl Into<String>,
        link: impl Into<String>,
        published_on: impl Into<String>,
        deadline: impl Into<String>,
        page: u32,
    ) -> Self {
        let link = link.into();
        Self {
            id: Self::id_for_link(&link),
            title: title.into(),
            organization: organization.into(),
            link,
            published_on: published_on.into(),
            deadline: deadline.into(),
            page,
        }
    }

    /// Derive the stable posting id for a source link.
    pub fn id_for_link(link: &str) -> String {
        let digest = Sha256::digest(link.as_bytes());
        hex::encode(&digest[..8])
    }

    /// Case-insensitive substring match over title and organization.
    ///
    /// An empty filter matches everything.
    pub fn matches(&self, filter: &str) -> bool {
        let needle = filter.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle)
            || self.organization.to_lowercase().contains(&needle)
    }

    /// Parse the deadline into a calendar date, if present and well-formed.
    pub fn deadline_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.deadline, "%d/%m/%Y").ok()
    }

    /// Format the posting as a delivery message.
    pub fn to_message(&self, remaining: usize) -> String {
        let mut message = format!("💼 New Job ({} remaining):\n\n", remaining);
        message.push_str(&format!("📋 {}\n", self.title));
        message.push_str(&format!("🏢 {}\n", self.organization));
        if !self.deadline.is_empty() {
            message.push_str(&format!("📅 Deadline: {}\n", self.deadline));
        }
        message.push_str(&format!("🔗 {}\n", self.link));
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_posting() -> Posting {
        Posting::new(
            "Senior Rust Developer",
            "Acme Bank",
            "https://www.jobs.ge/ge/?view=jobs&id=123",
            "16/10/2025",
            "30/10/2025",
            1,
        )
    }

    #[test]
    fn test_id_is_stable_per_link() {
        let a = sample_posting();
        let b = sample_posting();
        assert_eq!(a.id, b.id);

        let other = Posting::new("x", "y", "https://www.jobs.ge/other", "", "", 1);
        assert_ne!(a.id, other.id);
    }

    #[test]
    fn test_matches_title_and_organization() {
        let posting = sample_posting();
        assert!(posting.matches("rust"));
        assert!(posting.matches("ACME"));
        assert!(posting.matches(""));
        assert!(!posting.matches("python"));
    }

    #[test]
    fn test_deadline_date_parsing() {
        let posting = sample_posting();
        assert_eq!(
            posting.deadline_date(),
            NaiveDate::from_ymd_opt(2025, 10, 30)
        );

        let mut blank = sample_posting();
        blank.deadline = String::new();
        assert_eq!(blank.deadline_date(), None);
    }

    #[test]
    fn test_message_format() {
        let message = sample_posting().to_message(4);
        assert!(message.contains("4 remaining"));
        assert!(message.contains("Senior Rust Developer"));
        assert!(message.contains("Deadline: 30/10/2025"));
    }

    #[test]
    fn test_message_omits_blank_deadline() {
        let mut posting = sample_posting();
        posting.deadline = String::new();
        assert!(!posting.to_message(0).contains("Deadline"));
    }
}

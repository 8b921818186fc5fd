// src/services/crawler.rs

//! Listing crawler service.
//!
//! Paginates the jobs.ge listing, parses row-structured vacancy entries,
//! normalizes dates, and applies the stop heuristic. Network failures
//! terminate the crawl early with whatever was accumulated; a partial
//! result is always a valid, non-error return.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::dates::normalize_date;
use crate::error::{AppError, Result};
use crate::models::{Config, CrawlerConfig, MonthTable, Posting};
use crate::storage::PostingStore;
use crate::utils::resolve_url;

/// Organization label used when the listing row omits one.
const UNKNOWN_ORGANIZATION: &str = "unknown";

/// Per-run crawl limits.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Soft cap on accumulated postings
    pub max_jobs: usize,

    /// Politeness delay before each page fetch after the first
    pub delay_between_requests: Duration,

    /// Hard cap on pages visited
    pub max_pages: u32,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_jobs: 300,
            delay_between_requests: Duration::ZERO,
            max_pages: 999,
        }
    }
}

impl CrawlOptions {
    /// Derive run limits from configuration.
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_jobs: config.max_jobs,
            delay_between_requests: Duration::from_millis(config.request_delay_ms),
            max_pages: config.max_pages,
        }
    }
}

/// Summary of a crawl run.
#[derive(Debug, Default)]
pub struct CrawlSummary {
    /// Postings accumulated before the run stopped
    pub postings: Vec<Posting>,

    /// Convenience count of `postings`
    pub total_found: usize,

    /// Last page the run visited (one past `max_pages` when exhausted)
    pub last_page_visited: u32,
}

/// Source of raw listing pages.
///
/// Seam between the crawl loop and the network so the stop heuristic is
/// testable against scripted pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the raw HTML body of a listing page.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Production fetcher backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    referer: String,
}

impl HttpFetcher {
    /// Create a fetcher with the configured user agent and timeout.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            referer: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.5")
            .header("Referer", &self.referer)
            .send()
            .await?;
        Ok(response.text().await?)
    }
}

/// Pre-parsed CSS selectors for the fixed listing row layout.
struct RowSelectors {
    row: Selector,
    cell: Selector,
    title_link: Selector,
    any_link: Selector,
}

impl RowSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            row: Self::parse("table tr")?,
            cell: Self::parse("td")?,
            title_link: Self::parse("a.vip")?,
            any_link: Self::parse("a")?,
        })
    }

    fn parse(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

/// Service for crawling vacancy postings from the listing site.
pub struct JobCrawler {
    base: Url,
    months: MonthTable,
    fetcher: Box<dyn PageFetcher>,
    selectors: RowSelectors,
}

impl JobCrawler {
    /// Create a crawler with the production HTTP fetcher.
    pub fn new(config: &Config) -> Result<Self> {
        let fetcher = Box::new(HttpFetcher::new(&config.crawler)?);
        Self::with_fetcher(config, fetcher)
    }

    /// Create a crawler with a custom page fetcher.
    pub fn with_fetcher(config: &Config, fetcher: Box<dyn PageFetcher>) -> Result<Self> {
        Ok(Self {
            base: Url::parse(&config.crawler.base_url)?,
            months: config.months.clone(),
            fetcher,
            selectors: RowSelectors::new()?,
        })
    }

    /// Build the listing URL for one page of a query.
    fn page_url(&self, page: u32, query: &str) -> String {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("q", query)
            .append_pair("cid", "0")
            .append_pair("lid", "0")
            .append_pair("jid", "0")
            .append_pair("in_title", "0")
            .append_pair("has_salary", "0")
            .append_pair("is_ge", "0")
            .append_pair("for_scroll", "yes");
        url.to_string()
    }

    /// Crawl listing pages starting at `start_page`.
    ///
    /// Stops on two consecutive empty pages, on an empty page once some
    /// postings have accumulated below `max_jobs`, past `max_pages`, or on
    /// the first fetch failure (returning the partial result).
    pub async fn crawl(&self, query: &str, start_page: u32, options: &CrawlOptions) -> CrawlSummary {
        let needle = query.trim().to_lowercase();
        let mut postings: Vec<Posting> = Vec::new();
        let mut current_page = start_page;
        let mut consecutive_empty = 0u32;

        log::info!("Starting crawl with query \"{}\"", query);

        loop {
            if current_page > options.max_pages {
                break;
            }

            if current_page > start_page && !options.delay_between_requests.is_zero() {
                tokio::time::sleep(options.delay_between_requests).await;
            }

            let url = self.page_url(current_page, query);
            log::debug!("[Page {}] Fetching {}", current_page, url);

            let html = match self.fetcher.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    log::error!(
                        "Fetch failed on page {}: {}. Returning {} partial postings.",
                        current_page,
                        e,
                        postings.len()
                    );
                    break;
                }
            };

            let found = self.parse_page(&html, &needle, current_page);
            let found_count = found.len();
            postings.extend(found);

            log::info!(
                "Page {}: {} matching postings ({} total)",
                current_page,
                found_count,
                postings.len()
            );

            if found_count == 0 {
                consecutive_empty += 1;
                if consecutive_empty >= 2 {
                    log::info!("Two consecutive empty pages - stopping");
                    break;
                }
            } else {
                consecutive_empty = 0;
            }

            if !postings.is_empty() && postings.len() < options.max_jobs && found_count == 0 {
                log::info!(
                    "Accumulated {} postings (< {}) and page was empty - stopping",
                    postings.len(),
                    options.max_jobs
                );
                break;
            }

            current_page += 1;
        }

        log::info!(
            "Crawl complete: {} postings, last page {}",
            postings.len(),
            current_page
        );

        CrawlSummary {
            total_found: postings.len(),
            postings,
            last_page_visited: current_page,
        }
    }

    /// Crawl and hand the accumulated postings to the store.
    ///
    /// Duplicate source links are absorbed at the store boundary; the
    /// crawler does not pre-filter against existing storage.
    pub async fn crawl_and_store(
        &self,
        store: &dyn PostingStore,
        query: &str,
        start_page: u32,
        options: &CrawlOptions,
    ) -> Result<CrawlSummary> {
        let summary = self.crawl(query, start_page, options).await;

        if !summary.postings.is_empty() {
            let inserted = store.insert_many(&summary.postings).await?;
            log::info!(
                "Stored {} new postings ({} duplicates skipped)",
                inserted,
                summary.postings.len() - inserted
            );
        } else {
            log::info!("No postings found");
        }

        Ok(summary)
    }

    /// Extract matching postings from one page of listing HTML.
    fn parse_page(&self, html: &str, needle: &str, page: u32) -> Vec<Posting> {
        let document = Html::parse_document(html);
        let mut postings = Vec::new();

        for row in document.select(&self.selectors.row) {
            let cells: Vec<_> = row.select(&self.selectors.cell).collect();

            // A candidate posting row has at least 6 structured cells.
            if cells.len() < 6 {
                continue;
            }

            let Some(title_elem) = cells[1].select(&self.selectors.title_link).next() else {
                continue;
            };
            let title = text_of(&title_elem);
            let Some(href) = title_elem.value().attr("href") else {
                continue;
            };
            if title.is_empty() || href.is_empty() {
                continue;
            }

            if !needle.is_empty() && !title.to_lowercase().contains(needle) {
                continue;
            }

            let organization = cells[3]
                .select(&self.selectors.any_link)
                .next()
                .map(|e| text_of(&e))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN_ORGANIZATION.to_string());

            let raw_published: String = cells[4].text().collect();
            let raw_deadline: String = cells[5].text().collect();
            let published = normalize_date(raw_published.trim(), &self.months);
            let deadline = normalize_date(raw_deadline.trim(), &self.months);

            let link = resolve_url(&self.base, href);
            postings.push(Posting::new(title, organization, link, published, deadline, page));
        }

        postings
    }
}

fn text_of(element: &scraper::ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

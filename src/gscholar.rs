//! Google Scholar result-page fetching.
//!
//! Two batch modes share one HTTP layer:
//!
//! - [`PageFetcher`] saves raw result pages to numbered files for offline
//!   parsing, pausing between requests and retrying a failed page once.
//! - [`Harvester`] parses pages as they arrive and backs off exponentially
//!   (with jitter) when the site answers 429.

use crate::error::{Result, ScholarError};
use crate::parser::{ParseProfile, ResultParser, SearchResultRecord};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Results Scholar serves per page
pub const RESULTS_PER_PAGE: u32 = 10;

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Inclusive random delay window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn zero() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Uniform sample from `[min, max]`.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rand::thread_rng().gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Request pacing for both fetch modes.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Pause after every successfully handled page.
    pub between_pages: DelayRange,
    /// Page fetcher: fixed wait before its single retry.
    pub retry_wait: Duration,
    /// Harvester: unit for the `unit * 2^attempt + U(0, unit)` backoff.
    pub backoff_unit: Duration,
    /// Harvester: attempts per page before giving up on 429s.
    pub max_attempts: u32,
}

impl Pacing {
    /// Page fetcher defaults: 2-5 s between pages, 60 s before the retry.
    pub const fn page_fetcher() -> Self {
        Self {
            between_pages: DelayRange::new(Duration::from_secs(2), Duration::from_secs(5)),
            retry_wait: Duration::from_secs(60),
            ..Self::none()
        }
    }

    /// Harvester defaults: 5-7 s between pages, 3 attempts on 429.
    pub const fn harvester() -> Self {
        Self {
            between_pages: DelayRange::new(Duration::from_secs(5), Duration::from_secs(7)),
            backoff_unit: Duration::from_secs(1),
            max_attempts: 3,
            ..Self::none()
        }
    }

    /// No waiting at all.
    pub const fn none() -> Self {
        Self {
            between_pages: DelayRange::zero(),
            retry_wait: Duration::ZERO,
            backoff_unit: Duration::ZERO,
            max_attempts: 3,
        }
    }

    /// Backoff before retrying after the given 1-based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_unit * 2u32.saturating_pow(attempt);
        base + DelayRange::new(Duration::ZERO, self.backoff_unit).sample()
    }
}

/// Options shared by both fetch modes.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Custom base URL for mirror sites
    pub base_url: Option<String>,
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Source data type filter
    pub sdt: String,
    /// Year low filter
    pub ylo: Option<i32>,
    pub pacing: Pacing,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            proxy: None,
            sdt: "0,5".to_string(),
            ylo: None,
            pacing: Pacing::page_fetcher(),
        }
    }
}

impl FetchOptions {
    fn scholar_url(&self) -> String {
        self.base_url
            .as_ref()
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SCHOLAR_URL.to_string())
    }
}

/// Outcome of a page-fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub saved: Vec<PathBuf>,
    pub failed: Vec<u32>,
}

/// Saves numbered result pages to disk.
pub struct PageFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl PageFetcher {
    pub fn new(options: FetchOptions) -> Result<Self> {
        Ok(Self {
            client: build_http_client(options.proxy.as_deref())?,
            options,
        })
    }

    /// Fetch pages `1..=pages` of `query` into `out_dir/{page}.html`.
    ///
    /// A failed page is retried once after `pacing.retry_wait`; a second
    /// failure skips it.
    pub async fn fetch_pages(&self, query: &str, pages: u32, out_dir: &Path) -> Result<FetchSummary> {
        tokio::fs::create_dir_all(out_dir).await?;

        let scholar_url = self.options.scholar_url();
        info!(query, pages, url = %scholar_url, "Starting page fetch");

        let mut summary = FetchSummary::default();

        for page in 1..=pages {
            let start = (page - 1) * RESULTS_PER_PAGE;
            let url = build_search_url(&scholar_url, query, start, &self.options.sdt, self.options.ylo)?;
            let path = out_dir.join(format!("{}.html", page));

            let html = match fetch_page(&self.client, &url).await {
                Ok(html) => Some(html),
                Err(e) => {
                    warn!(page, url = %url, error = %e, "Fetch failed, retrying once");
                    tokio::time::sleep(self.options.pacing.retry_wait).await;

                    match fetch_page(&self.client, &url).await {
                        Ok(html) => Some(html),
                        Err(e) => {
                            error!(page, url = %url, error = %e, "Failed to fetch page even after retry");
                            None
                        }
                    }
                }
            };

            let Some(html) = html else {
                summary.failed.push(page);
                continue;
            };

            tokio::fs::write(&path, html).await?;
            println!("Saved {}", path.display());
            summary.saved.push(path);

            let delay = self.options.pacing.between_pages.sample();
            debug!(delay_secs = delay.as_secs_f64(), "Waiting before next page");
            tokio::time::sleep(delay).await;
        }

        info!(saved = summary.saved.len(), failed = summary.failed.len(), "Page fetch complete");
        Ok(summary)
    }
}

/// Fetches and parses result pages in one pass.
pub struct Harvester {
    client: reqwest::Client,
    options: FetchOptions,
    parser: ResultParser,
}

impl Harvester {
    pub fn new(options: FetchOptions) -> Result<Self> {
        Ok(Self {
            client: build_http_client(options.proxy.as_deref())?,
            parser: ResultParser::new(ParseProfile::HARVEST)?,
            options,
        })
    }

    /// Collect up to `n` records for `query`.
    ///
    /// 429 responses are retried with exponential backoff up to
    /// `pacing.max_attempts` times; any other failure skips the page.
    pub async fn harvest(&self, query: &str, n: u32) -> Result<Vec<SearchResultRecord>> {
        let scholar_url = self.options.scholar_url();
        let pacing = self.options.pacing;
        let total_pages = n.div_ceil(RESULTS_PER_PAGE);

        println!("Fetching {} articles. This may take a few minutes...", n);
        info!(query, n, total_pages, "Starting harvest");

        let mut results = Vec::new();

        for page_idx in 0..total_pages {
            let start = page_idx * RESULTS_PER_PAGE;
            let url = build_search_url(&scholar_url, query, start, &self.options.sdt, self.options.ylo)?;

            let mut attempt = 0;
            let html = loop {
                attempt += 1;
                match fetch_page(&self.client, &url).await {
                    Ok(html) => break Some(html),
                    Err(e) if e.is_rate_limited() && attempt < pacing.max_attempts => {
                        let delay = pacing.backoff(attempt);
                        warn!(
                            page = page_idx + 1,
                            attempt,
                            delay_secs = delay.as_secs_f64(),
                            "Rate limited (429), backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        error!(page = page_idx + 1, start, error = %e, "Skipping page");
                        break None;
                    }
                }
            };

            let Some(html) = html else { continue };

            let records = self.parser.parse_document(&html);
            info!(page = page_idx + 1, count = records.len(), "Parsed results");
            results.extend(records);

            tokio::time::sleep(pacing.between_pages.sample()).await;
        }

        results.truncate(n as usize);
        println!("Total articles collected: {}", results.len());
        Ok(results)
    }
}

/// Build HTTP client with optional proxy
pub(crate) fn build_http_client(proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .cookie_store(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            ScholarError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Build Google Scholar search URL
pub fn build_search_url(
    base_url: &str,
    query: &str,
    start: u32,
    sdt: &str,
    ylo: Option<i32>,
) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/scholar", base_url))
        .map_err(|e| ScholarError::Config(format!("Invalid base URL: {}", e)))?;

    {
        let mut params = url.query_pairs_mut();
        params.append_pair("q", query);
        params.append_pair("hl", "en");
        params.append_pair("start", &start.to_string());
        params.append_pair("as_sdt", sdt);
        params.append_pair("as_vis", "1");
        if let Some(year) = ylo {
            params.append_pair("as_ylo", &year.to_string());
        }
    }

    Ok(url)
}

/// Fetch one result page, mapping 429 and CAPTCHA interstitials to errors.
async fn fetch_page(client: &reqwest::Client, url: &Url) -> Result<String> {
    let response = client
        .get(url.as_str())
        .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8")
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Referer", "https://scholar.google.com/")
        .send()
        .await?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ScholarError::RateLimited(60));
    }

    if !status.is_success() {
        return Err(ScholarError::Api {
            code: status.as_u16() as i32,
            message: format!("HTTP error: {}", status),
        });
    }

    let html = response.text().await?;
    if is_captcha_page(&html) {
        return Err(ScholarError::Captcha);
    }
    Ok(html)
}

fn is_captcha_page(html: &str) -> bool {
    html.contains("Solving the above CAPTCHA") || html.contains("unusual traffic")
}

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use std::path::Path;
use std::thread;
use std::time::Duration;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::config::BrowserSettings;
use crate::extract::{CardSource, ListingExtractor, PageScan};
use crate::models::ScrapedJob;

const SEARCH_URL: &str = "https://www.linkedin.com/jobs/search/";

/// Listings from the last week, newest first.
const RECENCY_FILTER: &str = "f_TPR=r604800&sortBy=DD";

const HIDE_WEBDRIVER_JS: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

pub fn search_url(query: &str, location: &str) -> String {
    format!(
        "{}?keywords={}&location={}&{}",
        SEARCH_URL,
        urlencoding::encode(query.trim()),
        urlencoding::encode(location.trim()),
        RECENCY_FILTER
    )
}

/// Upper bound for any configured wait.
const MAX_WAIT_SECS: f64 = 600.0;

/// Uniform random duration in `[min, max]` seconds. Bounds are clamped to
/// `0..=MAX_WAIT_SECS` (NaN counts as 0); an inverted range collapses to `min`.
pub fn random_duration(range: [f64; 2]) -> Duration {
    let clamp = |secs: f64| {
        if secs.is_nan() {
            0.0
        } else {
            secs.clamp(0.0, MAX_WAIT_SECS)
        }
    };
    let min = clamp(range[0]);
    let max = clamp(range[1]);
    if max <= min {
        return Duration::from_secs_f64(min);
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(min..=max))
}

/// Scrapes the public job search page through a WebDriver-controlled browser.
pub struct JobSearcher {
    config: BrowserSettings,
}

impl JobSearcher {
    pub fn new(config: BrowserSettings) -> Self {
        Self { config }
    }

    /// Best-effort, single pass. Any failure ends up as an empty or partial
    /// result, never an error.
    pub fn search(&self, query: &str, location: &str, max_results: usize) -> Vec<ScrapedJob> {
        info!(query, location, max_results, "starting job search");

        let extractor = match ListingExtractor::new() {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to build extractor: {:#}", e);
                return Vec::new();
            }
        };

        let url = search_url(query, location);
        match self.scrape(&url, &extractor, max_results) {
            Ok(PageScan::NoCards) => {
                warn!("No job listings found on {}", url);
                Vec::new()
            }
            Ok(PageScan::Found {
                selector,
                total_cards,
                jobs,
            }) => {
                info!(
                    selector,
                    total_cards,
                    extracted = jobs.len(),
                    "finished extracting job cards"
                );
                jobs
            }
            Err(e) => {
                warn!("Scraping failed: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Load `url` and read the cards through the live session. The browser
    /// session is quit before returning on every path.
    fn scrape(&self, url: &str, extractor: &ListingExtractor, max_results: usize) -> Result<PageScan> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        let driver = runtime.block_on(self.connect())?;
        let result = runtime.block_on(self.load(&driver, url)).map(|()| {
            let mut page = LivePage {
                runtime: &runtime,
                driver: &driver,
                cards: Vec::new(),
            };
            let pause = self.config.card_pause_secs;
            let scan = extractor.scan(&mut page, max_results, || thread::sleep(random_duration(pause)));
            if let (PageScan::NoCards, Some(path)) = (&scan, &self.config.debug_dump) {
                match runtime.block_on(driver.source()) {
                    Ok(source) => write_debug_artifact(path, &source),
                    Err(e) => warn!("Failed to read page source: {}", e),
                }
            }
            scan
        });

        match runtime.block_on(driver.quit()) {
            Ok(()) => info!("Browser closed"),
            Err(e) => warn!("Failed to close browser: {}", e),
        }
        result
    }

    async fn connect(&self) -> Result<WebDriver> {
        let mut caps = DesiredCapabilities::chrome();
        if self.config.headless {
            caps.add_arg("--headless=new")?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--disable-gpu")?;
        caps.add_arg("--window-size=1920,1080")?;
        caps.add_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_arg("--disable-extensions")?;
        caps.add_arg(&format!("--user-agent={}", self.config.user_agent))?;
        caps.add_experimental_option("excludeSwitches", vec!["enable-automation"])?;
        caps.add_experimental_option("useAutomationExtension", false)?;

        let driver = WebDriver::new(self.config.webdriver_url.as_str(), caps)
            .await
            .with_context(|| {
                format!(
                    "Failed to start browser session at {}. Is chromedriver running?",
                    self.config.webdriver_url
                )
            })?;
        info!(headless = self.config.headless, "Browser session started");
        Ok(driver)
    }

    async fn load(&self, driver: &WebDriver, url: &str) -> Result<()> {
        info!("Accessing: {}", url);
        driver
            .goto(url)
            .await
            .context("Failed to navigate to search page")?;

        if let Err(e) = driver.execute(HIDE_WEBDRIVER_JS, Vec::new()).await {
            warn!("Failed to mask webdriver flag: {}", e);
        }

        let wait = random_duration(self.config.page_wait_secs);
        info!("Loading page ({:.1}s)...", wait.as_secs_f64());
        tokio::time::sleep(wait).await;
        Ok(())
    }
}

/// Cards served straight from the open browser session.
struct LivePage<'a> {
    runtime: &'a Runtime,
    driver: &'a WebDriver,
    cards: Vec<WebElement>,
}

impl CardSource for LivePage<'_> {
    fn find_cards(&mut self, selector: &str) -> Result<usize> {
        self.cards = self
            .runtime
            .block_on(self.driver.find_all(By::Css(selector)))
            .with_context(|| format!("Failed to look up '{}'", selector))?;
        Ok(self.cards.len())
    }

    fn card_html(&mut self, index: usize) -> Result<String> {
        let card = self
            .cards
            .get(index)
            .ok_or_else(|| anyhow!("No card at index {}", index))?;
        self.runtime
            .block_on(card.outer_html())
            .context("Failed to read card")
    }
}

/// Save the rendered page for offline inspection. Failures are only logged.
pub fn write_debug_artifact(path: &Path, page: &str) {
    match std::fs::write(path, page) {
        Ok(()) => info!("Page source saved to {}", path.display()),
        Err(e) => warn!("Failed to save page source to {}: {}", path.display(), e),
    }
}

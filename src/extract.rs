use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::models::{ScrapedJob, COMPANY_PLACEHOLDER, LOCATION_PLACEHOLDER};

/// Titles shorter than this are navigation noise, not listings.
pub const MIN_TITLE_CHARS: usize = 3;

const CARD_SELECTORS: &[&str] = &[
    "div[data-view-name='job-search-card']",
    ".job-search-card",
    ".base-card",
    ".base-search-card",
    "li.result-card",
    ".jobs-search__results-list li",
    ".job-card-container",
    "[data-entity-urn*='job']",
];

const TITLE_SELECTORS: &[&str] = &[
    "h3.base-search-card__title a",
    ".base-search-card__title",
    "h3 a span[title]",
    "h3.job-search-card__title a",
    ".job-title a",
    "h3 a",
    "h3",
    ".job-card__title a",
    "[data-control-name='job_search_job_title']",
];

const COMPANY_SELECTORS: &[&str] = &[
    "h4.base-search-card__subtitle a",
    ".base-search-card__subtitle",
    "h4.job-search-card__subtitle a",
    ".job-search-card__subtitle",
    ".company-name a",
    "h4 a",
    "h4",
    ".job-card__company-name a",
];

const LOCATION_SELECTORS: &[&str] = &[
    "span.job-search-card__location",
    ".job-search-card__location",
    ".job-result-card__location",
    ".base-search-card__location",
    ".job-search-card__metadata",
    ".job-card__location",
];

/// Badges the results page mixes into titles and company names.
const NOISE_PATTERN: &str = r"\b(?:new|promoted|easy apply|actively recruiting)\b";

/// A results page that hands out job cards one at a time.
///
/// The live browser answers each call with a WebDriver round trip, which is
/// what the between-card pause spaces out.
pub trait CardSource {
    /// Locate every element matching `selector` and return how many there are.
    fn find_cards(&mut self, selector: &str) -> Result<usize>;

    /// Outer HTML of the `index`-th card from the last `find_cards` call.
    fn card_html(&mut self, index: usize) -> Result<String>;
}

/// An ordered list of CSS selectors; earlier entries win.
struct SelectorChain {
    entries: Vec<(&'static str, Selector)>,
}

impl SelectorChain {
    fn parse(patterns: &[&'static str]) -> Result<Self> {
        let entries = patterns
            .iter()
            .map(|p| {
                Selector::parse(p)
                    .map(|sel| (*p, sel))
                    .map_err(|e| anyhow!("Invalid selector '{}': {:?}", p, e))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// First non-empty value inside `card`: for each selector's first match,
    /// try the `title` attribute, then `aria-label`, then the visible text.
    fn first_value(&self, card: ElementRef<'_>) -> Option<String> {
        self.entries.iter().find_map(|(_, sel)| {
            let element = card.select(sel).next()?;
            element_value(element)
        })
    }
}

fn element_value(element: ElementRef<'_>) -> Option<String> {
    let attr = |name: &str| {
        element
            .value()
            .attr(name)
            .map(normalize_whitespace)
            .filter(|v| !v.is_empty())
    };

    attr("title").or_else(|| attr("aria-label")).or_else(|| {
        let text = normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "));
        (!text.is_empty()).then_some(text)
    })
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Outcome of scanning one rendered results page.
#[derive(Debug)]
pub enum PageScan {
    /// No card selector matched anything.
    NoCards,
    Found {
        selector: &'static str,
        total_cards: usize,
        jobs: Vec<ScrapedJob>,
    },
}

pub struct ListingExtractor {
    title: SelectorChain,
    company: SelectorChain,
    location: SelectorChain,
    noise: Regex,
}

impl ListingExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title: SelectorChain::parse(TITLE_SELECTORS)?,
            company: SelectorChain::parse(COMPANY_SELECTORS)?,
            location: SelectorChain::parse(LOCATION_SELECTORS)?,
            noise: Regex::new(NOISE_PATTERN)?,
        })
    }

    /// Pull up to `max_results` cards off a results page. The first card
    /// selector with any match wins. `between_cards` runs before every card
    /// after the first.
    pub fn scan(
        &self,
        page: &mut impl CardSource,
        max_results: usize,
        mut between_cards: impl FnMut(),
    ) -> PageScan {
        let found = CARD_SELECTORS
            .iter()
            .find_map(|&selector| match page.find_cards(selector) {
                Ok(0) => None,
                Ok(count) => Some((selector, count)),
                Err(e) => {
                    debug!(selector, "card lookup failed: {:#}", e);
                    None
                }
            });
        let Some((selector, total_cards)) = found else {
            return PageScan::NoCards;
        };
        debug!(selector, count = total_cards, "found job cards");

        let mut jobs = Vec::new();
        for i in 0..total_cards.min(max_results) {
            if i > 0 {
                between_cards();
            }
            let card = match page.card_html(i) {
                Ok(html) => html,
                Err(e) => {
                    debug!(index = i + 1, "failed to read card: {:#}", e);
                    continue;
                }
            };
            match self.extract_card(&card) {
                Some(job) => {
                    debug!(index = i + 1, title = %job.title, company = %job.company, "extracted job");
                    jobs.push(job);
                }
                None => debug!(index = i + 1, "skipping card without a usable title"),
            }
        }

        PageScan::Found {
            selector,
            total_cards,
            jobs,
        }
    }

    /// Extract one listing from a card's outer HTML.
    pub fn extract_card(&self, card_html: &str) -> Option<ScrapedJob> {
        let fragment = Html::parse_fragment(card_html);
        let card = fragment.root_element();

        let title = self.title.first_value(card)?;
        if !has_min_title(&title) {
            return None;
        }

        let company = self
            .company
            .first_value(card)
            .unwrap_or_else(|| COMPANY_PLACEHOLDER.to_string());
        let location = self
            .location
            .first_value(card)
            .unwrap_or_else(|| LOCATION_PLACEHOLDER.to_string());

        let title = self.strip_noise(&title);
        let mut company = self.strip_noise(&company);
        if company.is_empty() {
            company = COMPANY_PLACEHOLDER.to_string();
        }
        if !has_min_title(&title) {
            return None;
        }

        Some(ScrapedJob::new(&title, &company, &location))
    }

    fn strip_noise(&self, s: &str) -> String {
        normalize_whitespace(&self.noise.replace_all(s, " "))
    }
}

fn has_min_title(title: &str) -> bool {
    title.trim().chars().count() >= MIN_TITLE_CHARS
}

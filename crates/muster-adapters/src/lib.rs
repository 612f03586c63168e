//! Source adapters: one per external listing origin, each turning a listing
//! page into candidate events. Fetch and parse failures never escape an
//! adapter; a failed source simply contributes nothing this pass.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use muster_core::CandidateEvent;
use muster_fetch::Fetcher;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

pub const CRATE_NAME: &str = "muster-adapters";

const CITY: &str = "Sydney";

/// One external listing origin. `scrape` is infallible by contract: internal
/// failures are logged and yield an empty candidate list.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn scrape(&self, fetcher: &Fetcher) -> Vec<CandidateEvent>;
}

pub fn adapter_for_source(name: &str) -> Option<Box<dyn SourceAdapter>> {
    match name {
        "eventbrite" => Some(Box::new(EventbriteAdapter)),
        "timeout" => Some(Box::new(TimeOutAdapter)),
        "meetup" => Some(Box::new(MeetupAdapter)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Selector helpers. Parse failures and missing nodes both come back as None
// so a malformed container skips cleanly.

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn first_text(node: &ElementRef<'_>, selectors: &str) -> Option<String> {
    let sel = Selector::parse(selectors).ok()?;
    node.select(&sel)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>()))
}

fn all_texts(node: &ElementRef<'_>, selectors: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(selectors) else {
        return Vec::new();
    };
    node.select(&sel)
        .filter_map(|n| text_or_none(n.text().collect::<String>()))
        .collect()
}

fn first_attr(node: &ElementRef<'_>, selectors: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selectors).ok()?;
    node.select(&sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(|s| text_or_none(s.to_string()))
}

/// Resolve a detail link against the source's base origin. Already-absolute
/// links pass through; anything that cannot become absolute is dropped.
fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    if href.starts_with('/') {
        return Some(format!("{}{}", base.trim_end_matches('/'), href));
    }
    None
}

// ---------------------------------------------------------------------------
// Date heuristics. Deliberately lossy: every resolver always produces a
// timestamp, falling back to a per-source offset from `now`.

static TIME_FRAGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2}):(\d{2})\s*([AP]M)").expect("valid time regex"));

static MEETUP_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([A-Za-z]{3}),?\s+([A-Za-z]{3})\s+(\d{1,2}),?\s+(\d{4}),?\s+(\d{1,2}):(\d{2})\s*([AP]M)")
        .expect("valid meetup date regex")
});

static EVENTBRITE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([A-Za-z]{3}),\s+([A-Za-z]{3})\s+(\d{1,2}),\s+(\d{1,2}):(\d{2})\s*([AP]M)")
        .expect("valid eventbrite date regex")
});

static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").expect("valid slash date regex"));

fn to_24_hour(hour: u32, meridiem: &str) -> u32 {
    let pm = meridiem.eq_ignore_ascii_case("pm");
    match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    }
}

fn time_fragment(text: &str) -> Option<(u32, u32)> {
    let caps = TIME_FRAGMENT.captures(text)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
    if hour > 12 || minute > 59 {
        return None;
    }
    Some((to_24_hour(hour, caps.get(3)?.as_str()), minute))
}

fn at_time(base: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    base.date_naive()
        .and_hms_opt(hour, minute, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(base)
}

fn month_number(abbrev: &str) -> Option<u32> {
    match abbrev.to_ascii_lowercase().as_str() {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

/// "today"/"tomorrow" with an optional clock fragment; None when the text
/// carries neither token.
fn relative_day(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_lowercase();
    let base = if lower.contains("today") {
        now
    } else if lower.contains("tomorrow") {
        now + Duration::days(1)
    } else {
        return None;
    };
    Some(match time_fragment(text) {
        Some((hour, minute)) => at_time(base, hour, minute),
        None => base,
    })
}

/// Eventbrite card dates look like "Sat, Apr 5, 7:30 PM" (no year); the
/// current year is assumed. Fallback is one day ahead.
pub fn resolve_eventbrite_datetime(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(ts) = relative_day(text, now) {
        return ts;
    }
    if let Some(caps) = EVENTBRITE_DATE.captures(text) {
        let parsed = (|| {
            let month = month_number(caps.get(2)?.as_str())?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            let hour: u32 = caps.get(4)?.as_str().parse().ok()?;
            let minute: u32 = caps.get(5)?.as_str().parse().ok()?;
            Utc.with_ymd_and_hms(
                now.year(),
                month,
                day,
                to_24_hour(hour, caps.get(6)?.as_str()),
                minute,
                0,
            )
            .single()
        })();
        if let Some(ts) = parsed {
            return ts;
        }
    }
    now + Duration::days(1)
}

/// TimeOut dates: "today"/"tomorrow", the literal "this week" (three days
/// out), or DD/MM/YYYY. Fallback is one day ahead.
pub fn resolve_timeout_datetime(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(ts) = relative_day(text, now) {
        return ts;
    }
    if text.to_lowercase().contains("this week") {
        return now + Duration::days(3);
    }
    if let Some(caps) = SLASH_DATE.captures(text) {
        let parsed = (|| {
            let day: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let year: i32 = caps.get(3)?.as_str().parse().ok()?;
            Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()
        })();
        if let Some(ts) = parsed {
            return ts;
        }
    }
    now + Duration::days(1)
}

/// Meetup dates: fully qualified "Wed, Jan 5, 2025, 7:30 PM" first, then
/// "today"/"tomorrow". Fallback is two days ahead.
pub fn resolve_meetup_datetime(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(caps) = MEETUP_DATE.captures(text) {
        let parsed = (|| {
            let month = month_number(caps.get(2)?.as_str())?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            let year: i32 = caps.get(4)?.as_str().parse().ok()?;
            let hour: u32 = caps.get(5)?.as_str().parse().ok()?;
            let minute: u32 = caps.get(6)?.as_str().parse().ok()?;
            Utc.with_ymd_and_hms(
                year,
                month,
                day,
                to_24_hour(hour, caps.get(7)?.as_str()),
                minute,
                0,
            )
            .single()
        })();
        if let Some(ts) = parsed {
            return ts;
        }
    }
    if let Some(ts) = relative_day(text, now) {
        return ts;
    }
    now + Duration::days(2)
}

// ---------------------------------------------------------------------------
// Eventbrite

pub struct EventbriteAdapter;

impl EventbriteAdapter {
    const BASE_URL: &'static str = "https://www.eventbrite.com.au";
    const LISTING_URL: &'static str = "https://www.eventbrite.com.au/d/australia--sydney/events/";
    const CONTAINER: &'static str = ".event-card";

    pub fn parse_listing(&self, html: &str, now: DateTime<Utc>) -> Vec<CandidateEvent> {
        let document = Html::parse_document(html);
        let Ok(container) = Selector::parse(Self::CONTAINER) else {
            return Vec::new();
        };
        document
            .select(&container)
            .filter_map(|node| self.extract(node, now))
            .collect()
    }

    fn extract(&self, node: ElementRef<'_>, now: DateTime<Utc>) -> Option<CandidateEvent> {
        let title = first_text(&node, ".event-card__title")?;
        let href = first_attr(&node, "a", "href")?;
        let original_event_url = absolutize(Self::BASE_URL, &href)?;

        let date_text = first_text(&node, ".event-card__date").unwrap_or_default();
        Some(CandidateEvent {
            title,
            start_at: resolve_eventbrite_datetime(&date_text, now),
            venue_name: first_text(&node, ".event-card__venue")
                .unwrap_or_else(|| "TBD".to_string()),
            address: None,
            city: CITY.to_string(),
            description: first_text(&node, ".event-card__description").unwrap_or_default(),
            category: first_text(&node, ".event-card__category")
                .unwrap_or_else(|| "General".to_string()),
            tags: Vec::new(),
            image_url: first_attr(&node, ".event-card__image img", "src"),
            original_event_url,
        })
    }
}

#[async_trait]
impl SourceAdapter for EventbriteAdapter {
    fn source_name(&self) -> &'static str {
        "eventbrite"
    }

    async fn scrape(&self, fetcher: &Fetcher) -> Vec<CandidateEvent> {
        scrape_rendered_listing(self.source_name(), Self::LISTING_URL, Self::CONTAINER, fetcher, |html, now| {
            self.parse_listing(html, now)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// TimeOut

pub struct TimeOutAdapter;

impl TimeOutAdapter {
    const BASE_URL: &'static str = "https://www.timeout.com";
    const LISTING_URL: &'static str =
        "https://www.timeout.com/sydney/things-to-do/events-in-sydney-this-week";
    const CONTAINER: &'static str = ".card";

    pub fn parse_listing(&self, html: &str, now: DateTime<Utc>) -> Vec<CandidateEvent> {
        let document = Html::parse_document(html);
        let Ok(container) = Selector::parse(Self::CONTAINER) else {
            return Vec::new();
        };
        document
            .select(&container)
            .filter_map(|node| self.extract(node, now))
            .collect()
    }

    fn extract(&self, node: ElementRef<'_>, now: DateTime<Utc>) -> Option<CandidateEvent> {
        let title = first_text(&node, "h3, .card__title")?;
        let href = first_attr(&node, "a", "href")?;
        let original_event_url = absolutize(Self::BASE_URL, &href)?;

        let date_text = first_text(&node, ".card__date, .date").unwrap_or_default();
        Some(CandidateEvent {
            title,
            start_at: resolve_timeout_datetime(&date_text, now),
            venue_name: first_text(&node, ".card__venue, .venue")
                .unwrap_or_else(|| "TBD".to_string()),
            address: None,
            city: CITY.to_string(),
            description: first_text(&node, ".card__description, p").unwrap_or_default(),
            category: first_text(&node, ".card__category, .category")
                .unwrap_or_else(|| "Entertainment".to_string()),
            tags: Vec::new(),
            image_url: first_attr(&node, "img", "src"),
            original_event_url,
        })
    }
}

#[async_trait]
impl SourceAdapter for TimeOutAdapter {
    fn source_name(&self) -> &'static str {
        "timeout"
    }

    async fn scrape(&self, fetcher: &Fetcher) -> Vec<CandidateEvent> {
        scrape_rendered_listing(self.source_name(), Self::LISTING_URL, Self::CONTAINER, fetcher, |html, now| {
            self.parse_listing(html, now)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Meetup

pub struct MeetupAdapter;

impl MeetupAdapter {
    const BASE_URL: &'static str = "https://www.meetup.com";
    const LISTING_URL: &'static str = "https://www.meetup.com/find/?location=Sydney&source=EVENTS";
    const CONTAINER: &'static str = ".event-card";

    pub fn parse_listing(&self, html: &str, now: DateTime<Utc>) -> Vec<CandidateEvent> {
        let document = Html::parse_document(html);
        let Ok(container) = Selector::parse(Self::CONTAINER) else {
            return Vec::new();
        };
        document
            .select(&container)
            .filter_map(|node| self.extract(node, now))
            .collect()
    }

    fn extract(&self, node: ElementRef<'_>, now: DateTime<Utc>) -> Option<CandidateEvent> {
        let title = first_text(&node, ".event-card__title, .title")?;
        let href = first_attr(&node, "a", "href")?;
        let original_event_url = absolutize(Self::BASE_URL, &href)?;

        let date_text = first_text(&node, ".event-card__date, .date").unwrap_or_default();
        Some(CandidateEvent {
            title,
            start_at: resolve_meetup_datetime(&date_text, now),
            venue_name: first_text(&node, ".event-card__venue, .venue")
                .unwrap_or_else(|| "TBD".to_string()),
            address: None,
            city: CITY.to_string(),
            description: first_text(&node, ".event-card__description, p").unwrap_or_default(),
            category: first_text(&node, ".event-card__category, .category")
                .unwrap_or_else(|| "Meetup".to_string()),
            tags: all_texts(&node, ".tag, .event-card__tag"),
            image_url: first_attr(&node, "img", "src"),
            original_event_url,
        })
    }
}

#[async_trait]
impl SourceAdapter for MeetupAdapter {
    fn source_name(&self) -> &'static str {
        "meetup"
    }

    async fn scrape(&self, fetcher: &Fetcher) -> Vec<CandidateEvent> {
        scrape_rendered_listing(self.source_name(), Self::LISTING_URL, Self::CONTAINER, fetcher, |html, now| {
            self.parse_listing(html, now)
        })
        .await
    }
}

async fn scrape_rendered_listing<F>(
    source: &str,
    listing_url: &str,
    container: &str,
    fetcher: &Fetcher,
    parse: F,
) -> Vec<CandidateEvent>
where
    F: FnOnce(&str, DateTime<Utc>) -> Vec<CandidateEvent>,
{
    let html = match fetcher.fetch_rendered(listing_url, Some(container)).await {
        Ok(html) => html,
        Err(err) => {
            warn!(source, error = %err, "listing fetch failed");
            return Vec::new();
        }
    };
    let events = parse(&html, Utc::now());
    info!(source, count = events.len(), "scraped listing");
    events
}

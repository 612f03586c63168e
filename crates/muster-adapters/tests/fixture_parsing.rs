//! Parses the checked-in listing fixtures the way a live scrape would,
//! without touching the network.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, TimeZone, Utc};
use muster_adapters::{EventbriteAdapter, MeetupAdapter, TimeOutAdapter};

fn fixture(source: &str) -> String {
    let path: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join("fixtures")
        .join(source)
        .join("listing.html");
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture {}", path.display()))
}

fn noon() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().unwrap()
}

#[test]
fn eventbrite_fixture_yields_complete_candidates() {
    let events = EventbriteAdapter.parse_listing(&fixture("eventbrite"), noon());
    assert_eq!(events.len(), 2, "card without a title must be skipped");

    let jazz = &events[0];
    assert_eq!(jazz.title, "Sydney Jazz Collective");
    assert_eq!(
        jazz.original_event_url,
        "https://www.eventbrite.com.au/e/sydney-jazz-collective-tickets-1001"
    );
    assert_eq!(jazz.venue_name, "The Basement");
    assert_eq!(jazz.category, "Music");
    assert_eq!(jazz.city, "Sydney");
    assert_eq!(jazz.image_url.as_deref(), Some("https://img.evbuc.com/jazz.jpg"));
    assert_eq!(
        jazz.start_at,
        Utc.with_ymd_and_hms(2026, 3, 10, 19, 30, 0).single().unwrap()
    );

    let pitch = &events[1];
    assert_eq!(
        pitch.original_event_url,
        "https://www.eventbrite.com.au/e/startup-pitch-night-tickets-1002"
    );
    assert_eq!(pitch.venue_name, "TBD", "empty venue falls back");
    assert_eq!(pitch.category, "General", "missing category falls back");
    assert!(pitch.image_url.is_none());
    assert_eq!(
        pitch.start_at,
        Utc.with_ymd_and_hms(noon().year(), 4, 5, 18, 0, 0).single().unwrap()
    );
}

#[test]
fn timeout_fixture_resolves_both_date_grammars() {
    let events = TimeOutAdapter.parse_listing(&fixture("timeout"), noon());
    assert_eq!(events.len(), 2);

    let vivid = &events[0];
    assert_eq!(vivid.title, "Vivid Light Walk");
    assert_eq!(
        vivid.original_event_url,
        "https://www.timeout.com/sydney/things-to-do/vivid-light-walk"
    );
    assert_eq!(vivid.venue_name, "Circular Quay");
    assert_eq!(vivid.category, "Festivals");
    assert_eq!(
        vivid.start_at,
        Utc.with_ymd_and_hms(2026, 12, 24, 0, 0, 0).single().unwrap()
    );

    let cinema = &events[1];
    assert_eq!(cinema.title, "Rooftop Cinema");
    assert_eq!(cinema.category, "Entertainment");
    assert_eq!(cinema.description, "Classic films under the stars.");
    assert_eq!(cinema.start_at, noon() + Duration::days(3));
}

#[test]
fn meetup_fixture_collects_tags_and_full_dates() {
    let events = MeetupAdapter.parse_listing(&fixture("meetup"), noon());
    assert_eq!(events.len(), 2);

    let rust_meetup = &events[0];
    assert_eq!(rust_meetup.title, "Rust Sydney Monthly");
    assert_eq!(
        rust_meetup.original_event_url,
        "https://www.meetup.com/sydney-rustaceans/events/305001/"
    );
    assert_eq!(rust_meetup.tags, vec!["rust".to_string(), "programming".to_string()]);
    assert_eq!(rust_meetup.category, "Tech");
    assert_eq!(
        rust_meetup.start_at,
        Utc.with_ymd_and_hms(2025, 1, 5, 19, 30, 0).single().unwrap()
    );

    let run = &events[1];
    assert_eq!(run.title, "Harbour Bridge Run");
    assert_eq!(run.tags, vec!["running".to_string()]);
    assert_eq!(run.venue_name, "TBD");
    assert_eq!(run.category, "Meetup");
    assert_eq!(
        run.start_at,
        Utc.with_ymd_and_hms(2026, 3, 11, 6, 0, 0).single().unwrap()
    );
}

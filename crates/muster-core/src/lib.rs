//! Core domain model for the muster event catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "muster-core";

/// Lifecycle state of a catalog record. Owned by the reconciliation engine,
/// except `Imported`, which only an operator-facing import action may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    New,
    Updated,
    Inactive,
    Imported,
}

#[derive(Debug, Error)]
#[error("unknown event status: {0}")]
pub struct ParseStatusError(String);

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "new",
            EventStatus::Updated => "updated",
            EventStatus::Inactive => "inactive",
            EventStatus::Imported => "imported",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(EventStatus::New),
            "updated" => Ok(EventStatus::Updated),
            "inactive" => Ok(EventStatus::Inactive),
            "imported" => Ok(EventStatus::Imported),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Freshly scraped, not-yet-reconciled event. Adapters discard candidates
/// without a non-empty title and absolute original URL before emitting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub venue_name: String,
    pub address: Option<String>,
    pub city: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub original_event_url: String,
}

/// Persisted catalog record. Identity is the (source, original_event_url)
/// pair; the catalog holds exactly one record per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub source: String,
    pub original_event_url: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub venue_name: String,
    pub address: Option<String>,
    pub city: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub status: EventStatus,
    pub last_seen_at: DateTime<Utc>,
    pub imported_at: Option<DateTime<Utc>>,
    pub imported_by: Option<String>,
    pub import_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRecord {
    /// A brand-new record as the reconciler inserts it on first sight.
    pub fn from_candidate(source: &str, candidate: &CandidateEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.to_string(),
            original_event_url: candidate.original_event_url.clone(),
            title: candidate.title.clone(),
            start_at: candidate.start_at,
            venue_name: candidate.venue_name.clone(),
            address: candidate.address.clone(),
            city: candidate.city.clone(),
            description: candidate.description.clone(),
            category: candidate.category.clone(),
            tags: candidate.tags.clone(),
            image_url: candidate.image_url.clone(),
            status: EventStatus::New,
            last_seen_at: now,
            imported_at: None,
            imported_by: None,
            import_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Which comparable fields participate in change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangePolicy {
    /// Any drift in any comparable field promotes the record to `updated`.
    #[default]
    AnyContentDrift,
    /// Only title, start time, and venue count as a change.
    SubstantiveOnly,
}

impl std::str::FromStr for ChangePolicy {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" | "any-content-drift" => Ok(ChangePolicy::AnyContentDrift),
            "substantive" | "substantive-only" => Ok(ChangePolicy::SubstantiveOnly),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Exact,
    UnorderedSet,
}

/// One entry in the declarative change-detection table.
#[derive(Debug, Clone, Copy)]
pub struct ComparedField {
    pub name: &'static str,
    pub comparison: Comparison,
    pub substantive: bool,
}

/// The fixed, ordered set of fields the reconciler compares between a stored
/// record and a fresh candidate. Status, import fields, and timestamps are
/// deliberately absent.
pub const COMPARED_FIELDS: &[ComparedField] = &[
    ComparedField { name: "title", comparison: Comparison::Exact, substantive: true },
    ComparedField { name: "start_at", comparison: Comparison::Exact, substantive: true },
    ComparedField { name: "venue_name", comparison: Comparison::Exact, substantive: true },
    ComparedField { name: "address", comparison: Comparison::Exact, substantive: false },
    ComparedField { name: "description", comparison: Comparison::Exact, substantive: false },
    ComparedField { name: "category", comparison: Comparison::Exact, substantive: false },
    ComparedField { name: "tags", comparison: Comparison::UnorderedSet, substantive: false },
    ComparedField { name: "image_url", comparison: Comparison::Exact, substantive: false },
];

fn field_differs(field: &ComparedField, existing: &EventRecord, candidate: &CandidateEvent) -> bool {
    match (field.name, field.comparison) {
        ("title", _) => existing.title != candidate.title,
        ("start_at", _) => existing.start_at != candidate.start_at,
        ("venue_name", _) => existing.venue_name != candidate.venue_name,
        ("address", _) => existing.address != candidate.address,
        ("description", _) => existing.description != candidate.description,
        ("category", _) => existing.category != candidate.category,
        ("tags", Comparison::UnorderedSet) => {
            let mut a = existing.tags.clone();
            let mut b = candidate.tags.clone();
            a.sort();
            b.sort();
            a != b
        }
        ("image_url", _) => existing.image_url != candidate.image_url,
        _ => false,
    }
}

/// Names of the fields that differ between a stored record and a candidate,
/// restricted to the fields the given policy considers.
pub fn changed_fields(
    existing: &EventRecord,
    candidate: &CandidateEvent,
    policy: ChangePolicy,
) -> Vec<&'static str> {
    COMPARED_FIELDS
        .iter()
        .filter(|f| policy == ChangePolicy::AnyContentDrift || f.substantive)
        .filter(|f| field_differs(f, existing, candidate))
        .map(|f| f.name)
        .collect()
}

/// A single recorded failure from one pass over one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub url: Option<String>,
    pub message: String,
}

/// Per-source reconciliation counts for one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub new_count: usize,
    pub updated_count: usize,
    pub inactive_count: usize,
    pub errors: Vec<SourceError>,
}

impl SourceOutcome {
    pub fn absorb(&mut self, other: &SourceOutcome) {
        self.new_count += other.new_count;
        self.updated_count += other.updated_count;
        self.inactive_count += other.inactive_count;
        self.errors.extend(other.errors.iter().cloned());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub outcome: SourceOutcome,
}

/// Roll-up of one complete pass across all configured sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl RunSummary {
    pub fn totals(&self) -> SourceOutcome {
        let mut totals = SourceOutcome::default();
        for report in &self.sources {
            totals.absorb(&report.outcome);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_candidate() -> CandidateEvent {
        CandidateEvent {
            title: "Jazz Night".to_string(),
            start_at: Utc.with_ymd_and_hms(2026, 3, 14, 19, 30, 0).single().unwrap(),
            venue_name: "The Basement".to_string(),
            address: None,
            city: "Sydney".to_string(),
            description: "Late night jazz".to_string(),
            category: "Music".to_string(),
            tags: vec!["jazz".to_string(), "live".to_string()],
            image_url: Some("https://x/img.jpg".to_string()),
            original_event_url: "https://x/e1".to_string(),
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            EventStatus::New,
            EventStatus::Updated,
            EventStatus::Inactive,
            EventStatus::Imported,
        ] {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
        }
        assert!("archived".parse::<EventStatus>().is_err());
    }

    #[test]
    fn identical_candidate_yields_no_changed_fields() {
        let candidate = sample_candidate();
        let record = EventRecord::from_candidate("eventbrite", &candidate, Utc::now());
        assert!(changed_fields(&record, &candidate, ChangePolicy::AnyContentDrift).is_empty());
    }

    #[test]
    fn reordered_tags_are_not_a_change() {
        let candidate = sample_candidate();
        let record = EventRecord::from_candidate("eventbrite", &candidate, Utc::now());
        let mut reordered = candidate.clone();
        reordered.tags = vec!["live".to_string(), "jazz".to_string()];
        assert!(changed_fields(&record, &reordered, ChangePolicy::AnyContentDrift).is_empty());
    }

    #[test]
    fn tag_set_difference_is_a_change() {
        let candidate = sample_candidate();
        let record = EventRecord::from_candidate("eventbrite", &candidate, Utc::now());
        let mut extra = candidate.clone();
        extra.tags.push("late".to_string());
        assert_eq!(
            changed_fields(&record, &extra, ChangePolicy::AnyContentDrift),
            vec!["tags"]
        );
    }

    #[test]
    fn substantive_policy_ignores_cosmetic_drift() {
        let candidate = sample_candidate();
        let record = EventRecord::from_candidate("eventbrite", &candidate, Utc::now());
        let mut drifted = candidate.clone();
        drifted.description = "Late night jazz ".to_string();
        drifted.category = "Live Music".to_string();
        assert_eq!(
            changed_fields(&record, &drifted, ChangePolicy::AnyContentDrift),
            vec!["description", "category"]
        );
        assert!(changed_fields(&record, &drifted, ChangePolicy::SubstantiveOnly).is_empty());

        drifted.venue_name = "The Attic".to_string();
        assert_eq!(
            changed_fields(&record, &drifted, ChangePolicy::SubstantiveOnly),
            vec!["venue_name"]
        );
    }

    #[test]
    fn totals_sum_across_sources() {
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            sources: vec![
                SourceReport {
                    source: "eventbrite".to_string(),
                    outcome: SourceOutcome {
                        new_count: 2,
                        updated_count: 1,
                        inactive_count: 0,
                        errors: vec![],
                    },
                },
                SourceReport {
                    source: "meetup".to_string(),
                    outcome: SourceOutcome {
                        new_count: 1,
                        updated_count: 0,
                        inactive_count: 3,
                        errors: vec![SourceError {
                            url: Some("https://x/e9".to_string()),
                            message: "insert rejected".to_string(),
                        }],
                    },
                },
            ],
        };

        let totals = summary.totals();
        assert_eq!(totals.new_count, 3);
        assert_eq!(totals.updated_count, 1);
        assert_eq!(totals.inactive_count, 3);
        assert_eq!(totals.errors.len(), 1);
    }
}

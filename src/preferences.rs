//! Donor preference signals mined from platform search results.
//!
//! Each field has its own named extractor returning `None` when the text
//! says nothing about it. Extraction and pooling are separate stages:
//! extractors emit [`Signal`]s per result, [`pool`] de-duplicates them
//! into a [`DonorPreferenceProfile`].

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;

use crate::booking::DONATION_TITLE_PREFIX;
use crate::platform::calendar::{CalendarPort, EventFilter};
use crate::platform::QueryOptions;
use crate::types::{AttendeeRole, DonorPreferenceProfile, SearchOptions, SearchResult};

/// One extracted observation about a donor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    PreferredTime(String),
    Compensation(u64),
    Requirement(String),
    PreferredHospital(String),
}

/// A named matcher for one profile field.
pub trait SignalExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the text carries no signal for this field.
    fn extract(&self, text: &str) -> Option<Vec<Signal>>;
}

// Compile-once regex patterns via OnceLock.
fn re_preferred_time() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bprefer(?:red)?\s+(?:(?:morning|afternoon|evening|night|weekend|weekday)s?|\d{1,2}\s?(?:am|pm))\b",
        )
        .unwrap()
    })
}

fn re_compensation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\$\s?(\d+(?:,\d+)*)(k\b)?|\b(\d+)k\b|\b(\d+(?:,\d+)*)\s+dollars\b")
            .unwrap()
    })
}

fn re_requirement() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:require[sd]?|needs?|wants?)\s+([^.,;!?\n]+)").unwrap())
}

fn re_preferred_hospital() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:prefer|like|want)s?\s+(?:the\s+|to\s+go\s+to\s+)?([^.,;!?\n]*?\b(?:hospital|clinic|center|centre)\b[^.,;!?\n]*)",
        )
        .unwrap()
    })
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

// =============================================================================
// Extractors
// =============================================================================

/// `prefer(red) mornings`, `prefer weekends`, `prefer 9am`.
pub struct PreferredTimeExtractor;

impl PreferredTimeExtractor {
    pub fn matches(&self, text: &str) -> Option<Vec<String>> {
        non_empty(
            re_preferred_time()
                .find_iter(text)
                .map(|m| m.as_str().trim().to_string())
                .collect(),
        )
    }
}

impl SignalExtractor for PreferredTimeExtractor {
    fn name(&self) -> &'static str {
        "preferred-time"
    }

    fn extract(&self, text: &str) -> Option<Vec<Signal>> {
        self.matches(text)
            .map(|v| v.into_iter().map(Signal::PreferredTime).collect())
    }
}

/// First dollar amount: `$1,500`, `5k`, `800 dollars`. `k` multiplies by 1000.
pub struct CompensationExtractor;

impl CompensationExtractor {
    pub fn amount(&self, text: &str) -> Option<u64> {
        let caps = re_compensation().captures(text)?;
        let (digits, thousands) = if let Some(d) = caps.get(1) {
            (d.as_str(), caps.get(2).is_some())
        } else if let Some(d) = caps.get(3) {
            (d.as_str(), true)
        } else {
            (caps.get(4)?.as_str(), false)
        };
        let value: u64 = digits.replace(',', "").parse().ok()?;
        Some(if thousands {
            value.saturating_mul(1000)
        } else {
            value
        })
    }
}

impl SignalExtractor for CompensationExtractor {
    fn name(&self) -> &'static str {
        "compensation"
    }

    fn extract(&self, text: &str) -> Option<Vec<Signal>> {
        self.amount(text).map(|v| vec![Signal::Compensation(v)])
    }
}

/// Clauses following `require`, `need`, or `want`, verbatim.
pub struct RequirementExtractor;

impl RequirementExtractor {
    pub fn clauses(&self, text: &str) -> Option<Vec<String>> {
        non_empty(
            re_requirement()
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

impl SignalExtractor for RequirementExtractor {
    fn name(&self) -> &'static str {
        "requirement"
    }

    fn extract(&self, text: &str) -> Option<Vec<Signal>> {
        self.clauses(text)
            .map(|v| v.into_iter().map(Signal::Requirement).collect())
    }
}

/// Clauses after `prefer`, `like`, or `want` that name a hospital, clinic, or center.
pub struct PreferredHospitalExtractor;

impl PreferredHospitalExtractor {
    pub fn clauses(&self, text: &str) -> Option<Vec<String>> {
        non_empty(
            re_preferred_hospital()
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

impl SignalExtractor for PreferredHospitalExtractor {
    fn name(&self) -> &'static str {
        "preferred-hospital"
    }

    fn extract(&self, text: &str) -> Option<Vec<Signal>> {
        self.clauses(text)
            .map(|v| v.into_iter().map(Signal::PreferredHospital).collect())
    }
}

// =============================================================================
// Pooling
// =============================================================================

/// Insert preserving first-seen order; duplicates compare case-insensitively.
fn push_unique(target: &mut Option<Vec<String>>, seen: &mut HashSet<String>, value: String) {
    if seen.insert(value.to_lowercase()) {
        target.get_or_insert_with(Vec::new).push(value);
    }
}

/// Fold signals from every result into one profile with set semantics.
///
/// The first compensation amount wins. Fields with no signal stay `None`.
pub fn pool(signals: impl IntoIterator<Item = Signal>) -> DonorPreferenceProfile {
    let mut profile = DonorPreferenceProfile::default();
    let mut seen_times = HashSet::new();
    let mut seen_requirements = HashSet::new();
    let mut seen_hospitals = HashSet::new();

    for signal in signals {
        match signal {
            Signal::PreferredTime(v) => push_unique(&mut profile.preferred_times, &mut seen_times, v),
            Signal::Compensation(v) => {
                if profile.expected_compensation.is_none() {
                    profile.expected_compensation = Some(v);
                }
            }
            Signal::Requirement(v) => {
                push_unique(&mut profile.special_requirements, &mut seen_requirements, v)
            }
            Signal::PreferredHospital(v) => {
                push_unique(&mut profile.preferred_hospitals, &mut seen_hospitals, v)
            }
        }
    }
    profile
}

// =============================================================================
// Extractor set
// =============================================================================

pub struct PreferenceExtractor {
    extractors: Vec<Box<dyn SignalExtractor>>,
}

impl Default for PreferenceExtractor {
    fn default() -> Self {
        Self {
            extractors: vec![
                Box::new(PreferredTimeExtractor),
                Box::new(CompensationExtractor),
                Box::new(RequirementExtractor),
                Box::new(PreferredHospitalExtractor),
            ],
        }
    }
}

impl PreferenceExtractor {
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn SignalExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn extractor_names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Run every extractor over every result, in result order.
    pub fn signals(&self, results: &[SearchResult]) -> Vec<Signal> {
        let mut signals = Vec::new();
        for result in results {
            let text = result.text();
            if text.is_empty() {
                continue;
            }
            for extractor in &self.extractors {
                if let Some(found) = extractor.extract(&text) {
                    signals.extend(found);
                }
            }
        }
        signals
    }

    pub fn extract(&self, results: &[SearchResult]) -> DonorPreferenceProfile {
        pool(self.signals(results))
    }
}

// =============================================================================
// Source
// =============================================================================

/// Builds a donor's profile from platform search and calendar history.
///
/// Both reads degrade: a failed search yields an empty profile, a failed
/// history query leaves `previous_donations` unknown.
pub struct PreferenceSource {
    calendar: Arc<dyn CalendarPort>,
    extractor: PreferenceExtractor,
    query: String,
    limit: u32,
}

impl PreferenceSource {
    pub fn new(calendar: Arc<dyn CalendarPort>, query: &str, limit: u32) -> Self {
        Self {
            calendar,
            extractor: PreferenceExtractor::default(),
            query: query.to_string(),
            limit,
        }
    }

    pub fn with_extractor(mut self, extractor: PreferenceExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub async fn profile(&self, donor_id: &str) -> DonorPreferenceProfile {
        let options = SearchOptions {
            limit: self.limit,
            offset: 0,
            types: None,
        };
        let mut profile = match self.calendar.search(&self.query, &options).await {
            Ok(resp) => self.extractor.extract(&resp.items),
            Err(e) => {
                log::warn!("Preference search failed for {}; using empty profile: {}", donor_id, e);
                DonorPreferenceProfile::default()
            }
        };
        profile.previous_donations = self.previous_donations(donor_id).await;
        profile
    }

    async fn previous_donations(&self, donor_id: &str) -> Option<u32> {
        let events = match self
            .calendar
            .query_events(&EventFilter::ended_by(Utc::now()), &QueryOptions::default())
            .await
        {
            Ok(events) => events,
            Err(e) => {
                log::warn!("Donation history unavailable for {}: {}", donor_id, e);
                return None;
            }
        };
        let count = events
            .iter()
            .filter(|e| {
                e.title
                    .strip_prefix(DONATION_TITLE_PREFIX)
                    .is_some_and(|rest| rest.starts_with(" - "))
            })
            .filter(|e| {
                e.attendees
                    .iter()
                    .any(|a| a.role == AttendeeRole::Donor && a.id == donor_id)
            })
            .count();
        Some(count as u32)
    }
}

//! Shared data model for availability, booking, preferences, and invitations.
//!
//! Wire names are camelCase to match the personal-data platform documents.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Slots
// =============================================================================

/// A bounded time interval with an availability flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            available: true,
        }
    }

    /// Half-open interval intersection: `[start, end)` against `[other_start, other_end)`.
    pub fn overlaps(&self, other_start: DateTime<Utc>, other_end: DateTime<Utc>) -> bool {
        self.start < other_end && self.end > other_start
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Non-fatal notice attached to a read-path result that had to degrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AvailabilityNotice {
    /// Booked events could not be read; every slot is reported available.
    BookedEventsUnavailable { reason: String },
}

/// Slot grid for one date plus any degradation notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<AvailabilityNotice>,
}

impl Availability {
    pub fn available_slots(&self) -> impl Iterator<Item = &TimeSlot> {
        self.slots.iter().filter(|s| s.available)
    }

    pub fn has_available(&self) -> bool {
        self.slots.iter().any(|s| s.available)
    }

    pub fn is_degraded(&self) -> bool {
        self.notice.is_some()
    }
}

// =============================================================================
// Calendar events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendeeRole {
    Donor,
    Hospital,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub id: String,
    pub role: AttendeeRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Attendee {
    pub fn donor(id: &str) -> Self {
        Self {
            id: id.to_string(),
            role: AttendeeRole::Donor,
            name: None,
        }
    }

    pub fn hospital(id: &str) -> Self {
        Self {
            id: id.to_string(),
            role: AttendeeRole::Hospital,
            name: None,
        }
    }
}

/// An event on the external platform calendar.
///
/// `id` is empty until the platform assigns one on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

// =============================================================================
// Booking
// =============================================================================

/// Immutable input to a booking attempt. `duration` is in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub donor_id: String,
    pub hospital_id: String,
    pub donation_purpose: String,
    pub duration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub booking_id: String,
    pub status: BookingStatus,
    pub event: CalendarEvent,
}

/// Ordered stages of the booking wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookingStage {
    DateSelected,
    SlotSelected,
    DetailsEntered,
    Confirmed,
}

impl std::fmt::Display for BookingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStage::DateSelected => "date-selected",
            BookingStage::SlotSelected => "slot-selected",
            BookingStage::DetailsEntered => "details-entered",
            BookingStage::Confirmed => "confirmed",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Search + preferences
// =============================================================================

/// One item from the platform's universal search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "text", alias = "body")]
    pub content: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl SearchResult {
    /// Text body mined for preference signals.
    pub fn text(&self) -> String {
        [&self.title, &self.content, &self.snippet]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    pub limit: u32,
    pub offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u64,
}

/// Derived, non-authoritative summary of a donor's signals.
///
/// `None` means nothing was found; `Some(vec![])` is never produced by extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorPreferenceProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_times: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_compensation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_donations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_requirements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_hospitals: Option<Vec<String>>,
}

impl DonorPreferenceProfile {
    pub fn is_unknown(&self) -> bool {
        self == &DonorPreferenceProfile::default()
    }
}

// =============================================================================
// Directory documents
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationRates {
    pub standard: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub specialization: Vec<String>,
    pub compensation_rates: CompensationRates,
    #[serde(default)]
    pub requirements_criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A contact profile the donor connected on the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub donor_id: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

// =============================================================================
// Invitations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Sent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// Persisted outreach message. `invitation_id` is assigned by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub invitation_id: String,
    pub donor_id: String,
    pub hospital_id: String,
    pub content: String,
    pub status: InvitationStatus,
    pub purpose: String,
    pub compensation_offered: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Parameters for one outreach batch to a single hospital.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationRequest {
    pub hospital_id: String,
    pub donor_ids: Vec<String>,
    pub purpose: String,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub compensation: Option<u64>,
    #[serde(default)]
    pub additional_requirements: Vec<String>,
}

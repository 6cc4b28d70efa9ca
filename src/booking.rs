//! Booking workflow: wizard state machine and the commit transaction.
//!
//! At most one booking may be confirmed per slot. A commit first takes a
//! short-lived in-process reservation on the booked span of the shared
//! calendar, then re-reads the calendar for overlapping events, and only
//! then writes.
//! Every failure on this path is fatal to the attempt.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::availability::SlotAvailabilityCalculator;
use crate::config::{BookingConfig, BusinessHours};
use crate::error::EngineError;
use crate::platform::calendar::{CalendarPort, EventFilter};
use crate::platform::QueryOptions;
use crate::types::{
    Attendee, Availability, BookingRecord, BookingRequest, BookingStage, BookingStatus,
    CalendarEvent, TimeSlot,
};

pub const DONATION_TITLE_PREFIX: &str = "Fertility Donation";

/// Reservation scope for the one calendar every booking is checked against.
const CALENDAR_SCOPE: &str = "calendar";

pub fn donation_title(purpose: &str) -> String {
    format!("{} - {}", DONATION_TITLE_PREFIX, purpose)
}

pub fn validate_request(request: &BookingRequest) -> Result<(), EngineError> {
    if request.donor_id.trim().is_empty() {
        return Err(EngineError::InvalidRequest("donor id is required".to_string()));
    }
    if request.hospital_id.trim().is_empty() {
        return Err(EngineError::InvalidRequest("hospital id is required".to_string()));
    }
    if request.donation_purpose.trim().is_empty() {
        return Err(EngineError::InvalidRequest(
            "donation purpose is required".to_string(),
        ));
    }
    if request.duration == 0 {
        return Err(EngineError::InvalidRequest(
            "duration must be at least one minute".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Reservation ledger
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Reservation {
    token: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    expires_at: Instant,
}

impl Reservation {
    fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

/// Short-lived claims on `[start, end)` spans, grouped by calendar scope.
///
/// Two live claims in the same scope never overlap, whoever holds them.
/// A successful commit keeps its claim until the TTL lapses, which covers
/// the window where the calendar read may not yet reflect the new event.
/// Lapsed claims are dropped whenever the scope is touched.
pub struct SlotReservations {
    scopes: DashMap<String, Vec<Reservation>>,
    ttl: std::time::Duration,
}

impl SlotReservations {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            scopes: DashMap::new(),
            ttl,
        }
    }

    /// Claim `[start, end)` in `scope`. Fails with `SlotConflict` while a
    /// live claim overlaps it.
    pub fn reserve(
        &self,
        scope: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Uuid, EngineError> {
        let now = Instant::now();
        // The entry guard holds the shard lock across the check and the push.
        let mut claims = self.scopes.entry(scope.to_string()).or_default();
        claims.retain(|r| r.expires_at > now);
        if claims.iter().any(|r| r.overlaps(start, end)) {
            return Err(EngineError::SlotConflict(start));
        }
        let token = Uuid::new_v4();
        claims.push(Reservation {
            token,
            start,
            end,
            expires_at: now + self.ttl,
        });
        Ok(token)
    }

    /// Drop a claim, but only the one `token` identifies.
    pub fn release(&self, scope: &str, token: Uuid) {
        if let Some(mut claims) = self.scopes.get_mut(scope) {
            claims.retain(|r| r.token != token);
        }
    }

    /// Whether a live claim in `scope` overlaps `[start, end)`.
    pub fn is_reserved(&self, scope: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let now = Instant::now();
        self.scopes
            .get(scope)
            .map(|claims| {
                claims
                    .iter()
                    .any(|r| r.expires_at > now && r.overlaps(start, end))
            })
            .unwrap_or(false)
    }

    /// Claims currently stored, lapsed or not.
    pub fn len(&self) -> usize {
        self.scopes.iter().map(|claims| claims.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove lapsed claims and empty scopes. Returns how many claims were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut dropped = 0;
        self.scopes.retain(|_, claims| {
            let before = claims.len();
            claims.retain(|r| r.expires_at > now);
            dropped += before - claims.len();
            !claims.is_empty()
        });
        dropped
    }
}

// =============================================================================
// Wizard
// =============================================================================

/// Explicit state machine for one booking flow.
///
/// `DateSelected -> SlotSelected -> DetailsEntered -> Confirmed`. `back`
/// moves one stage and is refused once confirmed.
#[derive(Debug, Clone)]
pub struct BookingWizard {
    donor_ref: String,
    availability: Availability,
    stage: BookingStage,
    slot: Option<TimeSlot>,
    request: Option<BookingRequest>,
    record: Option<BookingRecord>,
}

impl BookingWizard {
    /// Enter `DateSelected`. Refused when the date has no open slot.
    pub fn new(donor_ref: &str, availability: Availability) -> Result<Self, EngineError> {
        if !availability.has_available() {
            return Err(EngineError::NoAvailability(availability.date));
        }
        Ok(Self {
            donor_ref: donor_ref.to_string(),
            availability,
            stage: BookingStage::DateSelected,
            slot: None,
            request: None,
            record: None,
        })
    }

    pub fn stage(&self) -> BookingStage {
        self.stage
    }

    pub fn date(&self) -> NaiveDate {
        self.availability.date
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn selected_slot(&self) -> Option<&TimeSlot> {
        self.slot.as_ref()
    }

    pub fn request(&self) -> Option<&BookingRequest> {
        self.request.as_ref()
    }

    pub fn record(&self) -> Option<&BookingRecord> {
        self.record.as_ref()
    }

    fn require(&self, stage: BookingStage, action: &'static str) -> Result<(), EngineError> {
        if self.stage != stage {
            return Err(EngineError::InvalidTransition {
                from: self.stage,
                action,
            });
        }
        Ok(())
    }

    pub fn select_slot(&mut self, start: DateTime<Utc>) -> Result<&TimeSlot, EngineError> {
        self.require(BookingStage::DateSelected, "select a slot")?;
        let slot = self
            .availability
            .slots
            .iter()
            .find(|s| s.start == start && s.available)
            .cloned()
            .ok_or(EngineError::SlotUnavailable(start))?;
        self.stage = BookingStage::SlotSelected;
        let selected = self.slot.insert(slot);
        Ok(&*selected)
    }

    pub fn enter_details(&mut self, request: BookingRequest) -> Result<(), EngineError> {
        self.require(BookingStage::SlotSelected, "enter details")?;
        validate_request(&request)?;
        if request.donor_id != self.donor_ref {
            return Err(EngineError::InvalidRequest(format!(
                "request is for donor {} but the flow was started for {}",
                request.donor_id, self.donor_ref
            )));
        }
        self.request = Some(request);
        self.stage = BookingStage::DetailsEntered;
        Ok(())
    }

    pub fn back(&mut self) -> Result<BookingStage, EngineError> {
        self.stage = match self.stage {
            BookingStage::SlotSelected => {
                self.slot = None;
                BookingStage::DateSelected
            }
            BookingStage::DetailsEntered => {
                self.request = None;
                BookingStage::SlotSelected
            }
            from @ (BookingStage::DateSelected | BookingStage::Confirmed) => {
                return Err(EngineError::InvalidTransition {
                    from,
                    action: "go back",
                })
            }
        };
        Ok(self.stage)
    }

    fn pending_commit(&self) -> Result<(BookingRequest, TimeSlot), EngineError> {
        self.require(BookingStage::DetailsEntered, "confirm")?;
        match (&self.request, &self.slot) {
            (Some(request), Some(slot)) => Ok((request.clone(), slot.clone())),
            _ => Err(EngineError::InvalidTransition {
                from: self.stage,
                action: "confirm",
            }),
        }
    }

    fn mark_confirmed(&mut self, record: BookingRecord) {
        self.record = Some(record);
        self.stage = BookingStage::Confirmed;
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct BookingOrchestrator {
    calendar: Arc<dyn CalendarPort>,
    availability: SlotAvailabilityCalculator,
    reservations: SlotReservations,
    default_duration: u32,
}

impl BookingOrchestrator {
    pub fn new(
        calendar: Arc<dyn CalendarPort>,
        hours: BusinessHours,
        config: &BookingConfig,
    ) -> Result<Self, EngineError> {
        let availability = SlotAvailabilityCalculator::new(calendar.clone(), hours)?;
        Ok(Self {
            calendar,
            availability,
            reservations: SlotReservations::new(std::time::Duration::from_secs(
                config.reservation_ttl_secs,
            )),
            default_duration: config.default_duration_minutes,
        })
    }

    pub fn calculator(&self) -> &SlotAvailabilityCalculator {
        &self.availability
    }

    pub fn reservations(&self) -> &SlotReservations {
        &self.reservations
    }

    /// Build a request, filling in the configured default duration.
    pub fn request(
        &self,
        donor_id: &str,
        hospital_id: &str,
        purpose: &str,
        duration: Option<u32>,
    ) -> BookingRequest {
        BookingRequest {
            donor_id: donor_id.to_string(),
            hospital_id: hospital_id.to_string(),
            donation_purpose: purpose.to_string(),
            duration: duration.unwrap_or(self.default_duration),
        }
    }

    pub async fn availability(&self, donor_ref: &str, date: NaiveDate) -> Availability {
        self.availability.availability_for_date(donor_ref, date).await
    }

    /// Open a wizard on `date`.
    pub async fn start(&self, donor_ref: &str, date: NaiveDate) -> Result<BookingWizard, EngineError> {
        let availability = self.availability(donor_ref, date).await;
        BookingWizard::new(donor_ref, availability)
    }

    /// Commit the wizard's booking and move it to `Confirmed`.
    ///
    /// On failure the wizard stays in `DetailsEntered`.
    pub async fn confirm(&self, wizard: &mut BookingWizard) -> Result<BookingRecord, EngineError> {
        let (request, slot) = wizard.pending_commit()?;
        let record = self.book_appointment(&request, &slot).await?;
        wizard.mark_confirmed(record.clone());
        Ok(record)
    }

    /// Create the calendar event for `request` starting at `slot.start`.
    pub async fn book_appointment(
        &self,
        request: &BookingRequest,
        slot: &TimeSlot,
    ) -> Result<BookingRecord, EngineError> {
        validate_request(request)?;
        let start = slot.start;
        let end = start + Duration::minutes(request.duration as i64);

        let token = self.reservations.reserve(CALENDAR_SCOPE, start, end)?;
        match self.commit(request, start, end).await {
            Ok(record) => {
                log::info!(
                    "Booked {} for donor {} with hospital {} at {}",
                    record.booking_id,
                    request.donor_id,
                    request.hospital_id,
                    start
                );
                Ok(record)
            }
            Err(e) => {
                self.reservations.release(CALENDAR_SCOPE, token);
                log::warn!(
                    "Booking for donor {} at {} failed: {}",
                    request.donor_id,
                    start,
                    e
                );
                Err(e)
            }
        }
    }

    async fn commit(
        &self,
        request: &BookingRequest,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BookingRecord, EngineError> {
        let existing = self
            .calendar
            .query_events(
                &EventFilter::overlapping(start, end),
                &QueryOptions::chronological(None),
            )
            .await
            .map_err(|e| EngineError::from_platform("check slot", e))?;
        // The filter is inclusive; back-to-back events are not conflicts.
        if existing
            .iter()
            .any(|e| e.start_date < end && e.end_date > start)
        {
            return Err(EngineError::SlotConflict(start));
        }

        let event = CalendarEvent {
            id: String::new(),
            title: donation_title(&request.donation_purpose),
            start_date: start,
            end_date: end,
            location: None,
            description: None,
            attendees: vec![
                Attendee::donor(&request.donor_id),
                Attendee::hospital(&request.hospital_id),
            ],
        };

        let saved = self
            .calendar
            .create_event(&event)
            .await
            .map_err(|e| EngineError::from_platform("create event", e))?;
        if saved.id.is_empty() {
            return Err(EngineError::ExternalServiceUnavailable {
                operation: "create event",
                detail: "store returned no event id".to_string(),
            });
        }

        Ok(BookingRecord {
            booking_id: saved.id.clone(),
            status: BookingStatus::Confirmed,
            event: saved,
        })
    }
}

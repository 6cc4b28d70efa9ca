//! Bookable slot computation.
//!
//! Generates the business-hours grid for a date and marks slots unavailable
//! where they intersect booked events. When booked events cannot be read
//! the full grid is returned as available with a notice attached; showing
//! too many slots is preferred over showing none.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::BusinessHours;
use crate::error::EngineError;
use crate::platform::calendar::{CalendarPort, EventFilter};
use crate::platform::{PlatformError, QueryOptions};
use crate::types::{Availability, AvailabilityNotice, CalendarEvent, TimeSlot};

pub struct SlotAvailabilityCalculator {
    calendar: Arc<dyn CalendarPort>,
    hours: BusinessHours,
    tz: Tz,
}

/// Resolve a local date + hour to a UTC instant, handling DST gaps.
///
/// During a spring-forward gap `earliest()` is `None`; the post-transition
/// instant is used, and as a last resort the wall time is read as UTC.
fn resolve_local_datetime(tz: &Tz, date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN));

    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }

    if let Some(dt) = tz.from_local_datetime(&naive).latest() {
        log::warn!(
            "DST gap detected for {} {:02}:00 in {}; using post-transition time",
            date,
            hour,
            tz
        );
        return dt.with_timezone(&Utc);
    }

    log::warn!(
        "Could not resolve local datetime {} {:02}:00 in {}; falling back to UTC",
        date,
        hour,
        tz
    );
    Utc.from_utc_datetime(&naive)
}

/// Mark every slot that intersects a booked event as unavailable.
pub fn mark_booked(slots: &mut [TimeSlot], booked: &[CalendarEvent]) {
    for slot in slots.iter_mut() {
        let blocked = booked
            .iter()
            .any(|event| slot.overlaps(event.start_date, event.end_date));
        slot.available = !blocked;
    }
}

impl SlotAvailabilityCalculator {
    pub fn new(calendar: Arc<dyn CalendarPort>, hours: BusinessHours) -> Result<Self, EngineError> {
        let tz = hours.tz()?;
        Ok(Self {
            calendar,
            hours,
            tz,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Local calendar date an instant falls on.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// The canonical grid for `date`, every slot available.
    pub fn slot_grid(&self, date: NaiveDate) -> Vec<TimeSlot> {
        let day_start = resolve_local_datetime(&self.tz, date, self.hours.start_hour as u32);
        let span_minutes = (self.hours.end_hour as i64 - self.hours.start_hour as i64) * 60;
        let step = self.hours.slot_minutes as i64;
        if step <= 0 {
            return Vec::new();
        }

        let mut slots = Vec::new();
        let mut offset = 0;
        while offset + step <= span_minutes {
            let start = day_start + Duration::minutes(offset);
            slots.push(TimeSlot::new(start, start + Duration::minutes(step)));
            offset += step;
        }
        slots
    }

    /// First and last instant covered by the grid for `date`.
    pub fn grid_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = resolve_local_datetime(&self.tz, date, self.hours.start_hour as u32);
        let end =
            start + Duration::hours(self.hours.end_hour as i64 - self.hours.start_hour as i64);
        (start, end)
    }

    /// Booked events intersecting `[start, end]`. Errors are returned as-is.
    pub async fn booked_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, PlatformError> {
        self.calendar
            .query_events(
                &EventFilter::overlapping(start, end),
                &QueryOptions::chronological(None),
            )
            .await
    }

    /// Slots on `window_start`'s local date, reconciled against events booked
    /// in `[window_start, window_end]`. Never fails.
    pub async fn compute_availability(
        &self,
        donor_ref: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Availability {
        let date = self.local_date(window_start);
        let mut slots = self.slot_grid(date);

        match self.booked_events(window_start, window_end).await {
            Ok(booked) => {
                mark_booked(&mut slots, &booked);
                log::debug!(
                    "availability for {} on {}: {} booked events, {}/{} slots open",
                    donor_ref,
                    date,
                    booked.len(),
                    slots.iter().filter(|s| s.available).count(),
                    slots.len()
                );
                Availability {
                    date,
                    slots,
                    notice: None,
                }
            }
            Err(e) => {
                log::warn!(
                    "Booked events unavailable for {} on {}; reporting full availability: {}",
                    donor_ref,
                    date,
                    e
                );
                Availability {
                    date,
                    slots,
                    notice: Some(AvailabilityNotice::BookedEventsUnavailable {
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    /// Availability over the whole business day of `date`.
    pub async fn availability_for_date(&self, donor_ref: &str, date: NaiveDate) -> Availability {
        let (start, end) = self.grid_bounds(date);
        self.compute_availability(donor_ref, start, end).await
    }
}

//! In-memory fakes for the platform ports, shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::platform::calendar::{CalendarPort, DateRange, EventFilter};
use crate::platform::documents::{DirectoryPort, InvitationStore};
use crate::platform::llm::{GenerativeContentPort, PromptMode, PromptOptions, PromptResponse};
use crate::platform::{PlatformError, QueryOptions};
use crate::types::{
    CalendarEvent, CompensationRates, ConnectionProfile, DonorRecord, HospitalProfile,
    InvitationRecord, SearchOptions, SearchResponse, SearchResult,
};

pub fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent {
        id: id.to_string(),
        title: format!("Busy {}", id),
        start_date: start,
        end_date: end,
        location: None,
        description: None,
        attendees: vec![],
    }
}

fn unavailable() -> PlatformError {
    PlatformError::Api {
        status: 503,
        message: "platform unavailable".to_string(),
    }
}

fn in_range(value: DateTime<Utc>, range: &Option<DateRange>) -> bool {
    match range {
        None => true,
        Some(r) => r.gte.map_or(true, |g| value >= g) && r.lte.map_or(true, |l| value <= l),
    }
}

// ============================================================================
// Calendar
// ============================================================================

#[derive(Default)]
pub struct FakeCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    search_results: Mutex<Vec<SearchResult>>,
    filters: Mutex<Vec<EventFilter>>,
    created: Mutex<Vec<CalendarEvent>>,
    fail_queries: AtomicBool,
    fail_create: AtomicBool,
    fail_search: AtomicBool,
    omit_ids: AtomicBool,
    next_id: AtomicU32,
}

impl FakeCalendar {
    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        let fake = Self::default();
        *fake.events.lock() = events;
        fake
    }

    pub fn with_search_results(results: Vec<SearchResult>) -> Self {
        let fake = Self::default();
        *fake.search_results.lock() = results;
        fake
    }

    pub fn push_event(&self, event: CalendarEvent) {
        self.events.lock().push(event);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    /// Simulate a store that accepts the write but returns no id.
    pub fn omit_ids(&self, omit: bool) {
        self.omit_ids.store(omit, Ordering::SeqCst);
    }

    pub fn recorded_filters(&self) -> Vec<EventFilter> {
        self.filters.lock().clone()
    }

    pub fn created(&self) -> Vec<CalendarEvent> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl CalendarPort for FakeCalendar {
    async fn query_events(
        &self,
        filter: &EventFilter,
        options: &QueryOptions,
    ) -> Result<Vec<CalendarEvent>, PlatformError> {
        self.filters.lock().push(filter.clone());
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut matched: Vec<CalendarEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| in_range(e.start_date, &filter.start_date))
            .filter(|e| in_range(e.end_date, &filter.end_date))
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.start_date);
        if let Some(limit) = options.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn create_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, PlatformError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut saved = event.clone();
        if !self.omit_ids.load(Ordering::SeqCst) {
            saved.id = format!("evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        }
        self.events.lock().push(saved.clone());
        self.created.lock().push(saved.clone());
        Ok(saved)
    }

    async fn search(
        &self,
        _query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, PlatformError> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let items: Vec<SearchResult> = self
            .search_results
            .lock()
            .iter()
            .take(options.limit as usize)
            .cloned()
            .collect();
        Ok(SearchResponse {
            total: items.len() as u64,
            page: 1,
            items,
        })
    }
}

// ============================================================================
// Generative content
// ============================================================================

#[derive(Default)]
pub struct FakeGenerative {
    replies: Mutex<VecDeque<Result<String, ()>>>,
    prompts: Mutex<Vec<(String, PromptMode)>>,
}

impl FakeGenerative {
    pub fn replying(replies: &[&str]) -> Self {
        let fake = Self::default();
        fake.replies
            .lock()
            .extend(replies.iter().map(|r| Ok(r.to_string())));
        fake
    }

    pub fn failing() -> Self {
        let fake = Self::default();
        fake.replies.lock().push_back(Err(()));
        fake
    }

    pub fn prompts(&self) -> Vec<(String, PromptMode)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerativeContentPort for FakeGenerative {
    async fn prompt(
        &self,
        prompt: &str,
        _options: &PromptOptions,
        mode: PromptMode,
    ) -> Result<PromptResponse, PlatformError> {
        self.prompts.lock().push((prompt.to_string(), mode));
        // An exhausted queue behaves like an outage.
        match self.replies.lock().pop_front() {
            Some(Ok(response)) => Ok(PromptResponse {
                response,
                usage: None,
            }),
            Some(Err(())) | None => Err(unavailable()),
        }
    }
}

// ============================================================================
// Directory + invitation store
// ============================================================================

#[derive(Default)]
pub struct FakeDirectory {
    hospitals: Mutex<HashMap<String, HospitalProfile>>,
    donors: Mutex<HashMap<String, DonorRecord>>,
    profiles: Mutex<HashMap<String, Vec<ConnectionProfile>>>,
    invitations: Mutex<HashMap<String, InvitationRecord>>,
    saves: Mutex<Vec<InvitationRecord>>,
    fail_saves: AtomicBool,
    next_id: AtomicU32,
}

impl FakeDirectory {
    pub fn hospital(id: &str, standard: u64, premium: Option<u64>) -> HospitalProfile {
        HospitalProfile {
            id: id.to_string(),
            name: "Mercy Fertility Center".to_string(),
            location: "Austin, TX".to_string(),
            specialization: vec!["IVF".to_string()],
            compensation_rates: CompensationRates { standard, premium },
            requirements_criteria: vec!["non-smoker".to_string()],
        }
    }

    pub fn add_hospital(&self, hospital: HospitalProfile) {
        self.hospitals.lock().insert(hospital.id.clone(), hospital);
    }

    pub fn add_donor(&self, id: &str) {
        self.donors.lock().insert(
            id.to_string(),
            DonorRecord {
                id: id.to_string(),
                name: None,
            },
        );
    }

    pub fn add_profile(&self, donor_id: &str, provider: &str, email: Option<&str>) {
        self.profiles
            .lock()
            .entry(donor_id.to_string())
            .or_default()
            .push(ConnectionProfile {
                id: format!("{}-{}", donor_id, provider),
                donor_id: donor_id.to_string(),
                provider: Some(provider.to_string()),
                email: email.map(str::to_string),
            });
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> Vec<InvitationRecord> {
        self.saves.lock().clone()
    }
}

#[async_trait]
impl DirectoryPort for FakeDirectory {
    async fn hospital(&self, hospital_id: &str) -> Result<HospitalProfile, PlatformError> {
        self.hospitals
            .lock()
            .get(hospital_id)
            .cloned()
            .ok_or_else(|| PlatformError::DocumentNotFound {
                kind: "hospital",
                id: hospital_id.to_string(),
            })
    }

    async fn donor(&self, donor_id: &str) -> Result<DonorRecord, PlatformError> {
        self.donors
            .lock()
            .get(donor_id)
            .cloned()
            .ok_or_else(|| PlatformError::DocumentNotFound {
                kind: "donor",
                id: donor_id.to_string(),
            })
    }

    async fn connection_profiles(
        &self,
        donor_id: &str,
    ) -> Result<Vec<ConnectionProfile>, PlatformError> {
        Ok(self
            .profiles
            .lock()
            .get(donor_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl InvitationStore for FakeDirectory {
    async fn save_invitation(
        &self,
        record: &InvitationRecord,
    ) -> Result<InvitationRecord, PlatformError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut saved = record.clone();
        if saved.invitation_id.is_empty() {
            saved.invitation_id =
                format!("inv-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        }
        self.invitations
            .lock()
            .insert(saved.invitation_id.clone(), saved.clone());
        self.saves.lock().push(saved.clone());
        Ok(saved)
    }

    async fn invitation(&self, invitation_id: &str) -> Result<InvitationRecord, PlatformError> {
        self.invitations
            .lock()
            .get(invitation_id)
            .cloned()
            .ok_or_else(|| PlatformError::DocumentNotFound {
                kind: "invitation",
                id: invitation_id.to_string(),
            })
    }
}

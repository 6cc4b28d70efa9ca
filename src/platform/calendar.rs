//! Calendar events and universal search on the personal-data platform.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{PlatformClient, PlatformError, QueryOptions};
use crate::types::{CalendarEvent, SearchOptions, SearchResponse};

// ============================================================================
// Filters
// ============================================================================

/// Inclusive range predicate over a date field: `{$gte?, $lte?}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(rename = "$gte", skip_serializing_if = "Option::is_none")]
    pub gte: Option<DateTime<Utc>>,
    #[serde(rename = "$lte", skip_serializing_if = "Option::is_none")]
    pub lte: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateRange>,
}

impl EventFilter {
    /// Events that could intersect `[start, end]`: starting no later than
    /// `end` and ending no earlier than `start`.
    pub fn overlapping(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start_date: Some(DateRange {
                gte: None,
                lte: Some(end),
            }),
            end_date: Some(DateRange {
                gte: Some(start),
                lte: None,
            }),
        }
    }

    /// Events that finished at or before `instant`.
    pub fn ended_by(instant: DateTime<Utc>) -> Self {
        Self {
            start_date: None,
            end_date: Some(DateRange {
                gte: None,
                lte: Some(instant),
            }),
        }
    }
}

// ============================================================================
// Port
// ============================================================================

/// Query/write contract for the external calendar. Implementations are
/// pass-through: no retries, no caching.
#[async_trait]
pub trait CalendarPort: Send + Sync {
    async fn query_events(
        &self,
        filter: &EventFilter,
        options: &QueryOptions,
    ) -> Result<Vec<CalendarEvent>, PlatformError>;

    /// Persist a new event; the returned copy carries the platform-assigned id.
    async fn create_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, PlatformError>;

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, PlatformError>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    options: &'a SearchOptions,
}

/// HTTP-backed [`CalendarPort`].
pub struct HttpCalendar {
    client: Arc<PlatformClient>,
    schema: String,
}

impl HttpCalendar {
    pub fn new(client: Arc<PlatformClient>, schema: &str) -> Self {
        Self {
            client,
            schema: schema.to_string(),
        }
    }
}

#[async_trait]
impl CalendarPort for HttpCalendar {
    async fn query_events(
        &self,
        filter: &EventFilter,
        options: &QueryOptions,
    ) -> Result<Vec<CalendarEvent>, PlatformError> {
        self.client
            .query_documents(&self.schema, filter, options)
            .await
    }

    async fn create_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, PlatformError> {
        self.client.save_document(&self.schema, event).await
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, PlatformError> {
        let body = SearchRequest { query, options };
        self.client.post_json("/search/universal", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_overlapping_filter_wire_shape() {
        let start = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 10, 17, 0, 0).unwrap();
        let json = serde_json::to_value(EventFilter::overlapping(start, end)).unwrap();

        assert_eq!(json["startDate"]["$lte"], "2026-03-10T17:00:00Z");
        assert!(json["startDate"].get("$gte").is_none());
        assert_eq!(json["endDate"]["$gte"], "2026-03-10T09:00:00Z");
    }

    #[test]
    fn test_ended_by_filter_omits_start() {
        let instant = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        let json = serde_json::to_value(EventFilter::ended_by(instant)).unwrap();
        assert!(json.get("startDate").is_none());
        assert_eq!(json["endDate"]["$lte"], "2026-03-10T00:00:00Z");
    }

    #[test]
    fn test_search_request_shape() {
        let options = SearchOptions {
            limit: 20,
            offset: 0,
            types: None,
        };
        let json = serde_json::to_value(SearchRequest {
            query: "donation",
            options: &options,
        })
        .unwrap();
        assert_eq!(json["query"], "donation");
        assert_eq!(json["options"]["limit"], 20);
        assert!(json["options"].get("types").is_none());
    }

    #[test]
    fn test_search_response_deserialization() {
        let json = r#"{
            "items": [
                {"id": "m1", "type": "message", "content": "I prefer mornings"},
                {"id": "n1", "type": "note", "snippet": "need parking"}
            ],
            "total": 2,
            "page": 1
        }"#;
        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.items.len(), 2);
        assert_eq!(resp.items[0].kind.as_deref(), Some("message"));
        assert_eq!(resp.items[1].text(), "need parking");
    }
}

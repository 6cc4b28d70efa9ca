//! Model-assisted slot recommendations with a deterministic fallback.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::availability::SlotAvailabilityCalculator;
use crate::generation::{GenerationOutcome, PromptContext, PromptTemplate, StructuredGenerationAdapter};
use crate::platform::llm::PromptMode;
use crate::types::TimeSlot;

const TOP_N: usize = 3;

const RANKING_INSTRUCTION: &str = "Rank the open appointment slots below for a fertility donation visit. \
Favour times that are least disruptive to a typical working day and leave room before and after. \
Return the best three slots, best first, choosing only from the list.";

const RANKING_SHAPE: &str = r#"[{"start": "<RFC 3339 timestamp>", "end": "<RFC 3339 timestamp>"}]"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankedSlot {
    #[serde(alias = "startDate")]
    start: DateTime<Utc>,
    #[serde(alias = "endDate")]
    end: DateTime<Utc>,
}

/// Models sometimes wrap the array in an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RankedReply {
    List(Vec<RankedSlot>),
    Wrapped { slots: Vec<RankedSlot> },
}

impl RankedReply {
    fn into_slots(self) -> Vec<RankedSlot> {
        match self {
            RankedReply::List(slots) | RankedReply::Wrapped { slots } => slots,
        }
    }
}

/// Available slots in chronological order.
fn chronological(slots: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut open: Vec<TimeSlot> = slots.iter().filter(|s| s.available).cloned().collect();
    open.sort_by_key(|s| s.start);
    open
}

pub struct OptimalSlotRanker {
    generator: StructuredGenerationAdapter,
}

impl OptimalSlotRanker {
    pub fn new(generator: StructuredGenerationAdapter) -> Self {
        Self { generator }
    }

    /// Up to three recommended slots. Never fails.
    ///
    /// Falls back to the first three available slots in chronological order
    /// when the model is unreachable, unparseable, or names no usable slot.
    pub async fn rank(&self, slots: &[TimeSlot]) -> Vec<TimeSlot> {
        let open = chronological(slots);
        if open.is_empty() {
            return Vec::new();
        }
        let fallback = || open.iter().take(TOP_N).cloned().collect::<Vec<_>>();

        let listing: Vec<String> = open
            .iter()
            .map(|s| format!("{} to {}", s.start.to_rfc3339(), s.end.to_rfc3339()))
            .collect();
        let context = PromptContext::new()
            .field("Slot count", open.len())
            .list("Available slots", &listing);
        let template = PromptTemplate::new(RANKING_INSTRUCTION, PromptMode::Plain);

        let ranked = match self
            .generator
            .generate_structured::<RankedReply>(&template, &context, RANKING_SHAPE)
            .await
        {
            Ok(GenerationOutcome::Parsed(reply)) => reply.into_slots(),
            Ok(GenerationOutcome::ParseFailed(_)) => {
                log::warn!("Slot ranking reply was not a JSON array; using chronological order");
                return fallback();
            }
            Err(e) => {
                log::warn!("Slot ranking unavailable; using chronological order: {}", e);
                return fallback();
            }
        };

        let picked = Self::accept(&open, ranked);
        if picked.is_empty() {
            log::warn!("Slot ranking named no usable slot; using chronological order");
            return fallback();
        }
        picked
    }

    /// Keep well-formed entries that fall inside an open slot, first occurrence wins.
    fn accept(open: &[TimeSlot], ranked: Vec<RankedSlot>) -> Vec<TimeSlot> {
        let mut picked: Vec<TimeSlot> = Vec::new();
        for entry in ranked {
            if entry.start >= entry.end {
                continue;
            }
            let inside = open
                .iter()
                .any(|s| s.start <= entry.start && entry.end <= s.end);
            if !inside || picked.iter().any(|p| p.start == entry.start) {
                continue;
            }
            picked.push(TimeSlot::new(entry.start, entry.end));
            if picked.len() == TOP_N {
                break;
            }
        }
        picked
    }

    /// Rank the open slots on `date`.
    pub async fn rank_for_date(
        &self,
        calculator: &SlotAvailabilityCalculator,
        donor_ref: &str,
        date: NaiveDate,
    ) -> Vec<TimeSlot> {
        let availability = calculator.availability_for_date(donor_ref, date).await;
        self.rank(&availability.slots).await
    }
}

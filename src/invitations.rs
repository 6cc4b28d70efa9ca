//! AI-assisted donor outreach.
//!
//! For each donor: load the hospital and donor documents, derive the donor's
//! preference profile, ask the agentic endpoint for `{subject, content}`,
//! and persist a pending invitation. Generation problems degrade to generic
//! wording; lookup and persistence failures are fatal.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::config::InvitationConfig;
use crate::error::EngineError;
use crate::generation::{GenerationOutcome, PromptContext, PromptTemplate, StructuredGenerationAdapter};
use crate::platform::documents::{DirectoryPort, InvitationStore};
use crate::platform::llm::PromptMode;
use crate::preferences::PreferenceSource;
use crate::types::{
    DonorPreferenceProfile, HospitalProfile, InvitationRecord, InvitationRequest, InvitationStatus,
    Urgency,
};

const INVITATION_INSTRUCTION: &str = "You are writing on behalf of a fertility clinic. \
Draft a warm, professional invitation asking a prospective donor to book a donation appointment. \
Personalise it with the donor preferences below where they are known. \
Never invent details that are listed as unknown, and state the compensation exactly as given.";

const INVITATION_SHAPE: &str =
    r#"{"subject": "<short subject line>", "content": "<invitation body as plain text>"}"#;

#[derive(Debug, Clone, Deserialize)]
pub struct InvitationDraft {
    pub subject: String,
    #[serde(alias = "body")]
    pub content: String,
}

/// Explicit request amount, else premium for high urgency when offered, else standard.
pub fn offered_compensation(request: &InvitationRequest, hospital: &HospitalProfile) -> u64 {
    if let Some(amount) = request.compensation {
        return amount;
    }
    match (request.urgency, hospital.compensation_rates.premium) {
        (Urgency::High, Some(premium)) => premium,
        _ => hospital.compensation_rates.standard,
    }
}

fn generic_subject(hospital: &HospitalProfile, purpose: &str) -> String {
    format!("Invitation from {}: {}", hospital.name, purpose)
}

fn template_body(hospital: &HospitalProfile, purpose: &str, compensation: u64) -> String {
    let location = if hospital.location.is_empty() {
        String::new()
    } else {
        format!(" in {}", hospital.location)
    };
    format!(
        "Hello,\n\n{}{} would like to invite you to take part in {}. \
The compensation offered is ${}.\n\n\
If you are interested, reply to this message and we will help you schedule an appointment.",
        hospital.name, location, purpose, compensation
    )
}

fn with_subject(subject: &str, body: &str) -> String {
    format!("Subject: {}\n\n{}", subject.trim(), body.trim())
}

fn list_or_unknown(values: &Option<Vec<String>>) -> Option<String> {
    values.as_ref().map(|v| v.join("; "))
}

// =============================================================================
// Dispatch
// =============================================================================

/// Delivers an invitation to a contact address.
#[async_trait]
pub trait InvitationDispatcher: Send + Sync {
    async fn dispatch(&self, invitation: &InvitationRecord, email: &str) -> Result<(), EngineError>;
}

/// Writes the delivery to the log. Used when no transport is configured.
pub struct LoggingDispatcher;

#[async_trait]
impl InvitationDispatcher for LoggingDispatcher {
    async fn dispatch(&self, invitation: &InvitationRecord, email: &str) -> Result<(), EngineError> {
        log::info!(
            "Dispatching invitation {} for donor {} to {} ({} chars)",
            invitation.invitation_id,
            invitation.donor_id,
            email,
            invitation.content.len()
        );
        Ok(())
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct InvitationOrchestrator {
    directory: Arc<dyn DirectoryPort>,
    store: Arc<dyn InvitationStore>,
    preferences: PreferenceSource,
    generator: StructuredGenerationAdapter,
    dispatcher: Arc<dyn InvitationDispatcher>,
    expiry: Duration,
}

impl InvitationOrchestrator {
    pub fn new(
        directory: Arc<dyn DirectoryPort>,
        store: Arc<dyn InvitationStore>,
        preferences: PreferenceSource,
        generator: StructuredGenerationAdapter,
        config: &InvitationConfig,
    ) -> Self {
        Self {
            directory,
            store,
            preferences,
            generator,
            dispatcher: Arc::new(LoggingDispatcher),
            expiry: Duration::days(config.expiry_days),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn InvitationDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Generate and persist one pending invitation per donor, in request order.
    pub async fn generate_invitations(
        &self,
        request: &InvitationRequest,
    ) -> Result<Vec<InvitationRecord>, EngineError> {
        if request.hospital_id.trim().is_empty() {
            return Err(EngineError::InvalidRequest("hospital id is required".to_string()));
        }
        if request.purpose.trim().is_empty() {
            return Err(EngineError::InvalidRequest("purpose is required".to_string()));
        }

        let hospital = self
            .directory
            .hospital(&request.hospital_id)
            .await
            .map_err(|e| EngineError::from_platform("load hospital", e))?;

        let mut records = Vec::with_capacity(request.donor_ids.len());
        for donor_id in &request.donor_ids {
            records.push(self.generate_one(request, &hospital, donor_id).await?);
        }
        log::info!(
            "Generated {} invitation(s) for hospital {}",
            records.len(),
            hospital.id
        );
        Ok(records)
    }

    async fn generate_one(
        &self,
        request: &InvitationRequest,
        hospital: &HospitalProfile,
        donor_id: &str,
    ) -> Result<InvitationRecord, EngineError> {
        self.directory
            .donor(donor_id)
            .await
            .map_err(|e| EngineError::from_platform("load donor", e))?;

        let profile = self.preferences.profile(donor_id).await;
        let compensation = offered_compensation(request, hospital);
        let content = self
            .compose(request, hospital, &profile, compensation)
            .await;

        let created_at = Utc::now();
        let record = InvitationRecord {
            invitation_id: String::new(),
            donor_id: donor_id.to_string(),
            hospital_id: hospital.id.clone(),
            content,
            status: InvitationStatus::Pending,
            purpose: request.purpose.clone(),
            compensation_offered: compensation,
            created_at,
            expires_at: created_at + self.expiry,
        };

        self.store
            .save_invitation(&record)
            .await
            .map_err(|e| EngineError::from_platform("save invitation", e))
    }

    /// Invitation text. Never empty; falls back to generic wording.
    async fn compose(
        &self,
        request: &InvitationRequest,
        hospital: &HospitalProfile,
        profile: &DonorPreferenceProfile,
        compensation: u64,
    ) -> String {
        let template = PromptTemplate::new(INVITATION_INSTRUCTION, PromptMode::Agent);
        let context = PromptContext::new()
            .field("Hospital", &hospital.name)
            .field("Hospital location", &hospital.location)
            .list("Hospital specialization", &hospital.specialization)
            .list("Hospital donor criteria", &hospital.requirements_criteria)
            .field("Purpose", &request.purpose)
            .field("Urgency", request.urgency)
            .field("Compensation offered (USD)", compensation)
            .list("Additional requirements", &request.additional_requirements)
            .optional("Donor preferred times", list_or_unknown(&profile.preferred_times))
            .optional("Donor expected compensation (USD)", profile.expected_compensation)
            .optional("Donor previous donations", profile.previous_donations)
            .optional(
                "Donor special requirements",
                list_or_unknown(&profile.special_requirements),
            )
            .optional(
                "Donor preferred hospitals",
                list_or_unknown(&profile.preferred_hospitals),
            );

        let subject = generic_subject(hospital, &request.purpose);
        let fallback = || with_subject(&subject, &template_body(hospital, &request.purpose, compensation));

        match self
            .generator
            .generate_structured::<InvitationDraft>(&template, &context, INVITATION_SHAPE)
            .await
        {
            Ok(GenerationOutcome::Parsed(draft)) if !draft.content.trim().is_empty() => {
                let subject = if draft.subject.trim().is_empty() {
                    subject.as_str()
                } else {
                    draft.subject.as_str()
                };
                with_subject(subject, &draft.content)
            }
            Ok(GenerationOutcome::Parsed(_)) => fallback(),
            Ok(GenerationOutcome::ParseFailed(raw)) if !raw.trim().is_empty() => {
                log::warn!("Invitation reply was not JSON; using raw text as the body");
                with_subject(&subject, &raw)
            }
            Ok(GenerationOutcome::ParseFailed(_)) => fallback(),
            Err(e) => {
                log::warn!("Invitation generation unavailable; using template: {}", e);
                fallback()
            }
        }
    }

    /// Deliver a pending invitation and mark it sent.
    ///
    /// The first connection profile exposing an email is used.
    pub async fn send_invitation(&self, invitation_id: &str) -> Result<InvitationRecord, EngineError> {
        let record = self
            .store
            .invitation(invitation_id)
            .await
            .map_err(|e| EngineError::from_platform("load invitation", e))?;
        if record.status != InvitationStatus::Pending {
            return Err(EngineError::AlreadySent(invitation_id.to_string()));
        }

        let profiles = self
            .directory
            .connection_profiles(&record.donor_id)
            .await
            .map_err(|e| EngineError::from_platform("load connection profiles", e))?;
        let email = profiles
            .iter()
            .find_map(|p| p.email.as_deref().map(str::trim).filter(|e| !e.is_empty()))
            .ok_or_else(|| EngineError::NotFound {
                kind: "contact email",
                id: record.donor_id.clone(),
            })?;

        self.dispatcher.dispatch(&record, email).await?;

        let sent = InvitationRecord {
            status: InvitationStatus::Sent,
            ..record
        };
        self.store
            .save_invitation(&sent)
            .await
            .map_err(|e| EngineError::from_platform("save invitation", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::llm::PromptOptions;
    use crate::test_support::{FakeCalendar, FakeDirectory, FakeGenerative};
    use crate::types::SearchResult;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl InvitationDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            invitation: &InvitationRecord,
            email: &str,
        ) -> Result<(), EngineError> {
            self.sent
                .lock()
                .push((invitation.invitation_id.clone(), email.to_string()));
            Ok(())
        }
    }

    struct Harness {
        directory: Arc<FakeDirectory>,
        generative: Arc<FakeGenerative>,
        orchestrator: InvitationOrchestrator,
    }

    fn harness(generative: FakeGenerative, search: Vec<SearchResult>) -> Harness {
        let directory = Arc::new(FakeDirectory::default());
        directory.add_hospital(FakeDirectory::hospital("H1", 5000, Some(7000)));
        directory.add_donor("D1");
        directory.add_donor("D2");
        let generative = Arc::new(generative);
        let calendar = Arc::new(FakeCalendar::with_search_results(search));
        let orchestrator = InvitationOrchestrator::new(
            directory.clone(),
            directory.clone(),
            PreferenceSource::new(calendar, "q", 20),
            StructuredGenerationAdapter::new(generative.clone(), PromptOptions::default()),
            &InvitationConfig::default(),
        );
        Harness {
            directory,
            generative,
            orchestrator,
        }
    }

    fn request(donors: &[&str]) -> InvitationRequest {
        InvitationRequest {
            hospital_id: "H1".to_string(),
            donor_ids: donors.iter().map(|d| d.to_string()).collect(),
            purpose: "egg donation".to_string(),
            urgency: Urgency::Normal,
            compensation: None,
            additional_requirements: vec![],
        }
    }

    #[tokio::test]
    async fn test_donor_without_preferences_gets_pending_invitation() {
        let h = harness(
            FakeGenerative::replying(&[r#"{"subject": "Join us", "content": "We would love to meet you."}"#]),
            vec![],
        );
        let records = h.orchestrator.generate_invitations(&request(&["D1"])).await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.status, InvitationStatus::Pending);
        assert_eq!(record.invitation_id, "inv-1");
        assert!(!record.content.is_empty());
        assert!(record.content.contains("Join us"));
        assert_eq!(record.compensation_offered, 5000);
        assert_eq!(record.expires_at - record.created_at, Duration::days(7));
        assert_eq!(h.directory.saves().len(), 1);
    }

    #[tokio::test]
    async fn test_prompt_uses_agent_mode_and_embeds_profile() {
        let h = harness(
            FakeGenerative::replying(&[r#"{"subject": "S", "content": "C"}"#]),
            vec![SearchResult {
                content: Some("I prefer evenings, hoping for $6,000".to_string()),
                ..Default::default()
            }],
        );
        h.orchestrator.generate_invitations(&request(&["D1"])).await.unwrap();

        let prompts = h.generative.prompts();
        assert_eq!(prompts.len(), 1);
        let (prompt, mode) = &prompts[0];
        assert_eq!(*mode, PromptMode::Agent);
        assert!(prompt.contains("Mercy Fertility Center"));
        assert!(prompt.contains("prefer evenings"));
        assert!(prompt.contains("- Donor expected compensation (USD): 6000"));
        assert!(prompt.contains("- Donor special requirements: unknown"));
    }

    #[tokio::test]
    async fn test_unparseable_reply_uses_raw_text_with_generic_subject() {
        let h = harness(
            FakeGenerative::replying(&["Dear donor, we would be honoured to meet you."]),
            vec![],
        );
        let records = h.orchestrator.generate_invitations(&request(&["D1"])).await.unwrap();
        let content = &records[0].content;
        assert!(content.starts_with("Subject: Invitation from Mercy Fertility Center: egg donation"));
        assert!(content.contains("honoured to meet you"));
    }

    #[tokio::test]
    async fn test_blank_reply_and_outage_use_template() {
        let blank = harness(FakeGenerative::replying(&["   "]), vec![]);
        let records = blank.orchestrator.generate_invitations(&request(&["D1"])).await.unwrap();
        assert!(records[0].content.contains("compensation offered is $5000"));

        let down = harness(FakeGenerative::failing(), vec![]);
        let records = down.orchestrator.generate_invitations(&request(&["D1"])).await.unwrap();
        assert_eq!(records[0].status, InvitationStatus::Pending);
        assert!(records[0].content.contains("Mercy Fertility Center"));
    }

    #[tokio::test]
    async fn test_missing_documents_are_fatal() {
        let h = harness(FakeGenerative::replying(&[]), vec![]);
        let mut missing_hospital = request(&["D1"]);
        missing_hospital.hospital_id = "H9".to_string();
        assert!(matches!(
            h.orchestrator.generate_invitations(&missing_hospital).await,
            Err(EngineError::NotFound { kind: "hospital", .. })
        ));
        assert!(matches!(
            h.orchestrator.generate_invitations(&request(&["D404"])).await,
            Err(EngineError::NotFound { kind: "donor", .. })
        ));
        assert!(h.directory.saves().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal() {
        let h = harness(
            FakeGenerative::replying(&[r#"{"subject": "S", "content": "C"}"#]),
            vec![],
        );
        h.directory.fail_saves(true);
        assert!(matches!(
            h.orchestrator.generate_invitations(&request(&["D1"])).await,
            Err(EngineError::ExternalServiceUnavailable { .. })
        ));
    }

    #[test]
    fn test_compensation_selection() {
        let hospital = FakeDirectory::hospital("H1", 5000, Some(7000));
        let mut req = request(&["D1"]);
        assert_eq!(offered_compensation(&req, &hospital), 5000);

        req.urgency = Urgency::High;
        assert_eq!(offered_compensation(&req, &hospital), 7000);

        req.compensation = Some(6100);
        assert_eq!(offered_compensation(&req, &hospital), 6100);

        let no_premium = FakeDirectory::hospital("H2", 4000, None);
        req.compensation = None;
        assert_eq!(offered_compensation(&req, &no_premium), 4000);
    }

    #[tokio::test]
    async fn test_send_uses_first_profile_with_email() {
        let h = harness(
            FakeGenerative::replying(&[r#"{"subject": "S", "content": "C"}"#]),
            vec![],
        );
        h.directory.add_profile("D1", "wallet", None);
        h.directory.add_profile("D1", "google", Some("d1@example.com"));
        h.directory.add_profile("D1", "outlook", Some("other@example.com"));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let Harness {
            directory,
            orchestrator,
            ..
        } = h;
        let orchestrator = orchestrator.with_dispatcher(dispatcher.clone());

        let created = orchestrator.generate_invitations(&request(&["D1"])).await.unwrap();
        let sent = orchestrator
            .send_invitation(&created[0].invitation_id)
            .await
            .unwrap();

        assert_eq!(sent.status, InvitationStatus::Sent);
        assert_eq!(sent.invitation_id, created[0].invitation_id);
        assert_eq!(
            dispatcher.sent.lock().clone(),
            vec![(created[0].invitation_id.clone(), "d1@example.com".to_string())]
        );
        assert_eq!(directory.saves().last().unwrap().status, InvitationStatus::Sent);

        assert!(matches!(
            orchestrator.send_invitation(&created[0].invitation_id).await,
            Err(EngineError::AlreadySent(_))
        ));
    }

    #[tokio::test]
    async fn test_send_without_email_is_not_found() {
        let h = harness(
            FakeGenerative::replying(&[r#"{"subject": "S", "content": "C"}"#]),
            vec![],
        );
        h.directory.add_profile("D1", "wallet", None);
        let created = h.orchestrator.generate_invitations(&request(&["D1"])).await.unwrap();

        let err = h
            .orchestrator
            .send_invitation(&created[0].invitation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "contact email", .. }));
        assert!(matches!(
            h.orchestrator.send_invitation("inv-missing").await,
            Err(EngineError::NotFound { kind: "invitation", .. })
        ));
    }
}

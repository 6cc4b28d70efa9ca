//! Error types for availability, booking, and outreach
//!
//! Errors are classified by who has to act:
//! - Fatal: write-path failures, missing documents, rejected transitions
//! - RequiresUserAction: no usable platform token, bad configuration
//!
//! Read-path degradations never reach this type; they are reported as
//! notices or fallback values by the component that absorbed them.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::platform::PlatformError;
use crate::types::BookingStage;

/// Error types surfaced to callers of the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Authentication required: no usable platform token")]
    AuthenticationRequired,

    #[error("External service unavailable during {operation}: {detail}")]
    ExternalServiceUnavailable {
        operation: &'static str,
        detail: String,
    },

    #[error("Generated content was not the expected JSON shape")]
    GenerationParse { raw: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // Booking workflow
    #[error("Cannot {action} while booking is {from}")]
    InvalidTransition {
        from: BookingStage,
        action: &'static str,
    },

    #[error("Slot starting {0} is not available")]
    SlotUnavailable(DateTime<Utc>),

    #[error("No available slots on {0}")]
    NoAvailability(NaiveDate),

    #[error("Slot starting {0} was booked by another request")]
    SlotConflict(DateTime<Utc>),

    #[error("Invitation {0} has already been sent")]
    AlreadySent(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Map an adapter failure that happened while performing `operation`.
    pub fn from_platform(operation: &'static str, err: PlatformError) -> Self {
        match err {
            PlatformError::AuthenticationRequired => EngineError::AuthenticationRequired,
            PlatformError::DocumentNotFound { kind, id } => EngineError::NotFound { kind, id },
            other => EngineError::ExternalServiceUnavailable {
                operation,
                detail: other.to_string(),
            },
        }
    }

    /// Nothing in this subsystem retries; kept so callers can classify uniformly.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            EngineError::AuthenticationRequired | EngineError::Configuration(_)
        )
    }

    /// User-facing failure notice.
    pub fn user_notice(&self) -> &'static str {
        match self {
            EngineError::AuthenticationRequired => {
                "Your session has expired. Sign in again to continue."
            }
            EngineError::ExternalServiceUnavailable { .. } => {
                "We could not reach the scheduling service. Nothing was saved; please try again."
            }
            EngineError::GenerationParse { .. } => {
                "The assistant returned an unexpected response."
            }
            EngineError::NotFound { .. } => "The requested record no longer exists.",
            EngineError::InvalidTransition { .. } => "That step is not available right now.",
            EngineError::SlotUnavailable(_) => "That time is no longer available. Pick another slot.",
            EngineError::NoAvailability(_) => "No appointments are open on that date.",
            EngineError::SlotConflict(_) => {
                "Someone just booked that time. Pick another slot."
            }
            EngineError::AlreadySent(_) => "That invitation was already sent.",
            EngineError::InvalidRequest(_) => "Some booking details are missing or invalid.",
            EngineError::Configuration(_) => "Check your configuration in ~/.donorsync/config.json",
        }
    }
}

/// Serializable error representation for callers
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub user_notice: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    Fatal,
    RequiresUserAction,
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else {
            ErrorType::Fatal
        };

        ErrorReport {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            user_notice: err.user_notice().to_string(),
        }
    }
}

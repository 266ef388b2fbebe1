use thiserror::Error;

use crate::domain::identity::Role;
use crate::workflow::ClaimStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed for `{field}`: {message}")]
    Validation { field: String, message: String },
    #[error("actor `{actor}` lacks required role (one of {required:?})")]
    Permission { actor: String, required: Vec<Role> },
    #[error("invalid claim transition from {from} to {attempted}")]
    InvalidStateTransition { from: ClaimStatus, attempted: ClaimStatus },
    #[error("conflicting update on {entity} `{id}`: {detail}")]
    Conflict { entity: String, id: String, detail: String },
    #[error("claims disagree on `{field}` (contractor `{contractor}`, surveyor `{surveyor}`)")]
    Mismatch { field: String, contractor: String, surveyor: String },
    #[error("precondition failed: {message}")]
    Precondition { message: String, missing: Vec<String> },
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: String, id: String },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn conflict(
        entity: impl Into<String>,
        id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Conflict { entity: entity.into(), id: id.into(), detail: detail.into() }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound { entity: entity.into(), id: id.into() }
    }

    pub fn mismatch(
        field: impl Into<String>,
        contractor: impl ToString,
        surveyor: impl ToString,
    ) -> Self {
        Self::Mismatch {
            field: field.into(),
            contractor: contractor.to_string(),
            surveyor: surveyor.to_string(),
        }
    }

    /// Stable machine-readable kind, used by transports and the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Permission { .. } => "permission_error",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::Conflict { .. } => "conflict_error",
            Self::Mismatch { .. } => "mismatch_error",
            Self::Precondition { .. } => "precondition_error",
            Self::NotFound { .. } => "not_found",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(error) => Some(error),
            _ => None,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request ({kind}): {message}")]
    BadRequest { kind: &'static str, message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict ({kind}): {message}")]
    Conflict { kind: &'static str, message: String, correlation_id: String },
    #[error("unprocessable ({kind}): {message}")]
    Unprocessable { kind: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "Your role does not allow this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The record changed while you were working on it. Reload and try again."
            }
            Self::Unprocessable { .. } => {
                "The claim is not ready for this step. Complete the missing steps first."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                let kind = error.kind();
                let message = error.to_string();
                match error {
                    DomainError::Validation { .. } | DomainError::Mismatch { .. } => {
                        Self::BadRequest { kind, message, correlation_id }
                    }
                    DomainError::Permission { .. } => Self::Forbidden { message, correlation_id },
                    DomainError::NotFound { .. } => Self::NotFound { message, correlation_id },
                    DomainError::InvalidStateTransition { .. } | DomainError::Conflict { .. } => {
                        Self::Conflict { kind, message, correlation_id }
                    }
                    DomainError::Precondition { .. } => {
                        Self::Unprocessable { kind, message, correlation_id }
                    }
                }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::workflow::ClaimStatus;

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::validation(
            "period_month",
            "must be within 1..=12",
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                kind: "validation_error",
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn invalid_transition_keeps_both_statuses_in_message() {
        let error = DomainError::InvalidStateTransition {
            from: ClaimStatus::RejectedManagerial,
            attempted: ClaimStatus::ApprovedFinance,
        };

        let message = error.to_string();
        assert!(message.contains("rejected_managerial"));
        assert!(message.contains("approved_finance"));

        let interface = ApplicationError::from(error).into_interface("req-2");
        assert!(matches!(interface, InterfaceError::Conflict { kind: "invalid_state_transition", .. }));
    }

    #[test]
    fn precondition_error_maps_to_unprocessable() {
        let interface = ApplicationError::from(DomainError::Precondition {
            message: "claim is not certifiable".to_owned(),
            missing: vec!["status".to_owned()],
        })
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Unprocessable { .. }));
        assert_eq!(
            interface.user_message(),
            "The claim is not ready for this step. Complete the missing steps first."
        );
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Persistence("database lock timeout".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-4");
    }
}

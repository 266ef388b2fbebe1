use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::identity::Role;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    /// Surveyor claim whose figures have been reconciled against its contractor claim.
    Validated,
    NeedsReview,
    AutoApproved,
    ApprovedManagerial,
    RejectedManagerial,
    ApprovedFinance,
    RejectedFinance,
    RejectedSystem,
    Superseded,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 11] = [
        ClaimStatus::Draft,
        ClaimStatus::Submitted,
        ClaimStatus::Validated,
        ClaimStatus::NeedsReview,
        ClaimStatus::AutoApproved,
        ClaimStatus::ApprovedManagerial,
        ClaimStatus::RejectedManagerial,
        ClaimStatus::ApprovedFinance,
        ClaimStatus::RejectedFinance,
        ClaimStatus::RejectedSystem,
        ClaimStatus::Superseded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Validated => "validated",
            Self::NeedsReview => "needs_review",
            Self::AutoApproved => "auto_approved",
            Self::ApprovedManagerial => "approved_managerial",
            Self::RejectedManagerial => "rejected_managerial",
            Self::ApprovedFinance => "approved_finance",
            Self::RejectedFinance => "rejected_finance",
            Self::RejectedSystem => "rejected_system",
            Self::Superseded => "superseded",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::AutoApproved
                | Self::ApprovedFinance
                | Self::RejectedManagerial
                | Self::RejectedFinance
                | Self::RejectedSystem
                | Self::Superseded
        )
    }

    pub fn is_certifiable(self) -> bool {
        matches!(self, Self::AutoApproved | Self::ApprovedFinance)
    }

    pub fn is_rejected(self) -> bool {
        matches!(self, Self::RejectedManagerial | Self::RejectedFinance | Self::RejectedSystem)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|status| status.as_str() == normalized).ok_or_else(|| {
            DomainError::validation("status", format!("unknown claim status `{value}`"))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimEvent {
    Submit,
    SurveyorReconciled,
    ReconciledWithinThreshold,
    ReconciledOutsideThreshold,
    ManagerialApproved,
    ManagerialRejected,
    FinanceApproved,
    FinanceRejected,
    SystemRejected,
    Superseded,
}

impl ClaimEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::SurveyorReconciled => "surveyor_reconciled",
            Self::ReconciledWithinThreshold => "reconciled_within_threshold",
            Self::ReconciledOutsideThreshold => "reconciled_outside_threshold",
            Self::ManagerialApproved => "managerial_approved",
            Self::ManagerialRejected => "managerial_rejected",
            Self::FinanceApproved => "finance_approved",
            Self::FinanceRejected => "finance_rejected",
            Self::SystemRejected => "system_rejected",
            Self::Superseded => "superseded",
        }
    }

    /// The status this event leads to when it is legal.
    pub fn target(self) -> ClaimStatus {
        match self {
            Self::Submit => ClaimStatus::Submitted,
            Self::SurveyorReconciled => ClaimStatus::Validated,
            Self::ReconciledWithinThreshold => ClaimStatus::AutoApproved,
            Self::ReconciledOutsideThreshold => ClaimStatus::NeedsReview,
            Self::ManagerialApproved => ClaimStatus::ApprovedManagerial,
            Self::ManagerialRejected => ClaimStatus::RejectedManagerial,
            Self::FinanceApproved => ClaimStatus::ApprovedFinance,
            Self::FinanceRejected => ClaimStatus::RejectedFinance,
            Self::SystemRejected => ClaimStatus::RejectedSystem,
            Self::Superseded => ClaimStatus::Superseded,
        }
    }

    /// Holding any one of these roles allows the actor to emit the event.
    pub fn required_roles(self) -> &'static [Role] {
        match self {
            Self::Submit | Self::Superseded => &[Role::Contractor, Role::Surveyor],
            Self::SurveyorReconciled
            | Self::ReconciledWithinThreshold
            | Self::ReconciledOutsideThreshold => &[Role::Surveyor],
            Self::ManagerialApproved | Self::ManagerialRejected => &[Role::Managerial],
            Self::FinanceApproved | Self::FinanceRejected => &[Role::Finance],
            Self::SystemRejected => &[Role::Admin],
        }
    }
}

impl FromStr for ClaimEvent {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        const EVENTS: [ClaimEvent; 10] = [
            ClaimEvent::Submit,
            ClaimEvent::SurveyorReconciled,
            ClaimEvent::ReconciledWithinThreshold,
            ClaimEvent::ReconciledOutsideThreshold,
            ClaimEvent::ManagerialApproved,
            ClaimEvent::ManagerialRejected,
            ClaimEvent::FinanceApproved,
            ClaimEvent::FinanceRejected,
            ClaimEvent::SystemRejected,
            ClaimEvent::Superseded,
        ];
        let normalized = value.trim().to_ascii_lowercase();
        EVENTS.into_iter().find(|event| event.as_str() == normalized).ok_or_else(|| {
            DomainError::validation("event", format!("unknown claim event `{value}`"))
        })
    }
}

/// The two human approval gates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    Managerial,
    Finance,
}

impl ApprovalStage {
    /// Maps a requested decision status (`approved_managerial`, ...) onto the stage's event.
    pub fn decision_event(self, decision: ClaimStatus) -> Result<ClaimEvent, DomainError> {
        match (self, decision) {
            (Self::Managerial, ClaimStatus::ApprovedManagerial) => Ok(ClaimEvent::ManagerialApproved),
            (Self::Managerial, ClaimStatus::RejectedManagerial) => Ok(ClaimEvent::ManagerialRejected),
            (Self::Finance, ClaimStatus::ApprovedFinance) => Ok(ClaimEvent::FinanceApproved),
            (Self::Finance, ClaimStatus::RejectedFinance) => Ok(ClaimEvent::FinanceRejected),
            (stage, other) => Err(DomainError::validation(
                "status",
                format!("`{other}` is not a {} decision", stage.as_str()),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Managerial => "managerial",
            Self::Finance => "finance",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ClaimStatus,
    pub to: ClaimStatus,
    pub event: ClaimEvent,
}

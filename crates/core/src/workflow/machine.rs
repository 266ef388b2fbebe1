use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::identity::Actor;
use crate::errors::DomainError;
use crate::workflow::states::{ClaimEvent, ClaimStatus, TransitionOutcome};

/// Pure transition table for the claim lifecycle. Persisting the result is the
/// repository's job (compare-and-swap on the expected status).
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalStateMachine;

impl ApprovalStateMachine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_state(&self) -> ClaimStatus {
        ClaimStatus::Draft
    }

    /// Role check first, then the transition table. Neither has side effects.
    pub fn apply(
        &self,
        current: ClaimStatus,
        event: ClaimEvent,
        actor: &Actor,
    ) -> Result<TransitionOutcome, DomainError> {
        actor.require_any(event.required_roles())?;
        transition(current, event)
    }

    pub fn can_apply(&self, current: ClaimStatus, event: ClaimEvent) -> bool {
        transition(current, event).is_ok()
    }

    pub fn apply_with_audit<S>(
        &self,
        current: ClaimStatus,
        event: ClaimEvent,
        actor: &Actor,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, actor);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "claim.transition.accepted",
                        category_for(event),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", event.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "claim.transition.rejected",
                        category_for(event),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("from", current.as_str())
                    .with_metadata("event", event.as_str())
                    .with_metadata("error_kind", error.kind())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn category_for(event: ClaimEvent) -> AuditCategory {
    match event {
        ClaimEvent::Submit | ClaimEvent::Superseded | ClaimEvent::SystemRejected => {
            AuditCategory::Claim
        }
        ClaimEvent::SurveyorReconciled
        | ClaimEvent::ReconciledWithinThreshold
        | ClaimEvent::ReconciledOutsideThreshold => AuditCategory::Reconciliation,
        ClaimEvent::ManagerialApproved
        | ClaimEvent::ManagerialRejected
        | ClaimEvent::FinanceApproved
        | ClaimEvent::FinanceRejected => AuditCategory::Approval,
    }
}

fn transition(current: ClaimStatus, event: ClaimEvent) -> Result<TransitionOutcome, DomainError> {
    use ClaimEvent::{
        FinanceApproved, FinanceRejected, ManagerialApproved, ManagerialRejected,
        ReconciledOutsideThreshold, ReconciledWithinThreshold, Submit, Superseded,
        SurveyorReconciled, SystemRejected,
    };
    use ClaimStatus::{ApprovedManagerial, Draft, NeedsReview, Submitted, Validated};

    let legal = match (current, event) {
        (Draft, Submit) => true,
        (Submitted, SurveyorReconciled) => true,
        // A revised surveyor figure may clear a claim still waiting on review.
        (Submitted, ReconciledWithinThreshold) | (NeedsReview, ReconciledWithinThreshold) => true,
        (Submitted, ReconciledOutsideThreshold) => true,
        (NeedsReview, ManagerialApproved) | (NeedsReview, ManagerialRejected) => true,
        (ApprovedManagerial, FinanceApproved) | (ApprovedManagerial, FinanceRejected) => true,
        (Submitted, SystemRejected) | (NeedsReview, SystemRejected) => true,
        (Draft, Superseded)
        | (Submitted, Superseded)
        | (Validated, Superseded)
        | (NeedsReview, Superseded) => true,
        _ => false,
    };

    if !legal {
        return Err(DomainError::InvalidStateTransition { from: current, attempted: event.target() });
    }

    Ok(TransitionOutcome { from: current, to: event.target(), event })
}

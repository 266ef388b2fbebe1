use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome};
use crate::domain::claim::{format_claim_number, Claim, ClaimDraft, ClaimId, PartyRole};
use crate::domain::identity::Role;
use crate::domain::reference::{Pit, PitId, Site};
use crate::domain::signature::Signature;
use crate::errors::{ApplicationError, DomainError};
use crate::reconciliation::{
    Recommendation, ReconciliationReport, ReconciliationSnapshot, ThresholdPolicy,
};
use crate::repository::{ClaimCommit, ClaimFilter, ClaimTransition, NewClaim};
use crate::service::{ClaimWorkflow, RequestContext};
use crate::workflow::{ApprovalStage, ClaimEvent, ClaimStatus};

/// Result of a surveyor submission: the stored surveyor claim, the contractor
/// claim with its routed status, and the comparison that routed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyorSubmission {
    pub surveyor_claim: Claim,
    pub contractor_claim: Claim,
    pub report: ReconciliationReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resubmission {
    pub claim: Claim,
    /// Set when the prior version moved to `superseded`; rejected priors keep their status.
    pub superseded: Option<ClaimId>,
    pub routed_contractor_claim: Option<Claim>,
    pub report: Option<ReconciliationReport>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationView {
    pub contractor_claim: Claim,
    pub surveyor_claim: Option<Claim>,
    /// Recomputed against the threshold active right now.
    pub current: Option<ReconciliationReport>,
    /// What the contractor claim was actually routed on.
    pub pinned: Option<ReconciliationSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDetail {
    pub claim: Claim,
    pub total_bcm: Decimal,
    pub total_amount: Decimal,
    pub transitions: Vec<ClaimTransition>,
    pub signatures: Vec<Signature>,
    pub linked_claims: Vec<Claim>,
}

impl ClaimWorkflow {
    pub async fn submit_contractor_claim(
        &self,
        ctx: &RequestContext,
        draft: ClaimDraft,
    ) -> Result<Claim, ApplicationError> {
        ctx.actor.require(Role::Contractor)?;
        expect_party(&draft, PartyRole::Contractor)?;
        draft.validate()?;

        let site = self.check_references(&draft).await?;
        let claim_number = self.next_claim_number(&draft, &site).await?;
        let claim = Claim::submit(draft, claim_number, ctx.actor.user_id.clone(), self.now())?;
        let history = vec![self.apply_event(ctx, &claim.id, ClaimStatus::Draft, ClaimEvent::Submit)?];

        self.claims
            .commit(ClaimCommit {
                new_claim: Some(NewClaim { claim: claim.clone(), history }),
                ..ClaimCommit::default()
            })
            .await?;

        info!(
            event_name = "claim.submitted",
            correlation_id = %ctx.correlation_id,
            claim_id = %claim.id,
            claim_number = %claim.claim_number,
            party_role = claim.party_role.as_str(),
            "contractor claim submitted"
        );
        Ok(claim)
    }

    /// Stores the surveyor claim, reconciles it against its contractor claim and
    /// routes the contractor claim, all in one commit.
    pub async fn submit_surveyor_claim(
        &self,
        ctx: &RequestContext,
        draft: ClaimDraft,
    ) -> Result<SurveyorSubmission, ApplicationError> {
        ctx.actor.require(Role::Surveyor)?;
        expect_party(&draft, PartyRole::Surveyor)?;
        draft.validate()?;

        let contractor = self.load_linked_contractor(&draft).await?;
        self.ensure_no_live_surveyor_claim(&contractor, None).await?;

        let site = self.check_references(&draft).await?;
        let claim_number = self.next_claim_number(&draft, &site).await?;
        let surveyor = Claim::submit(draft, claim_number, ctx.actor.user_id.clone(), self.now())?;

        self.reconcile_and_route(ctx, contractor, surveyor, None).await
    }

    /// Creates version n+1 of `prior_id`. A prior that is still in flight moves
    /// to `superseded` in the same commit.
    pub async fn resubmit_claim(
        &self,
        ctx: &RequestContext,
        prior_id: &ClaimId,
        draft: ClaimDraft,
    ) -> Result<Resubmission, ApplicationError> {
        let prior = self.load_claim(prior_id).await?;
        ctx.actor.require(prior.party_role.role())?;
        draft.validate()?;

        let successors = self
            .claims
            .list_claims(&ClaimFilter { supersedes: Some(prior.id.clone()), ..ClaimFilter::default() })
            .await?;
        if let Some(successor) = successors.first() {
            return Err(DomainError::conflict(
                "claim",
                prior.id.0.clone(),
                format!("already superseded by `{}`", successor.claim_number),
            )
            .into());
        }

        let supersede = if prior.status.is_rejected() {
            None
        } else {
            Some(self.apply_event(ctx, &prior.id, prior.status, ClaimEvent::Superseded)?)
        };
        let superseded = supersede.as_ref().map(|transition| transition.claim_id.clone());

        self.check_references(&draft).await?;
        let next = prior.next_version(draft, ctx.actor.user_id.clone(), self.now())?;

        match prior.party_role {
            PartyRole::Contractor => {
                let history =
                    vec![self.apply_event(ctx, &next.id, ClaimStatus::Draft, ClaimEvent::Submit)?];
                self.claims
                    .commit(ClaimCommit {
                        new_claim: Some(NewClaim { claim: next.clone(), history }),
                        transitions: supersede.into_iter().collect(),
                        snapshot: None,
                    })
                    .await?;

                info!(
                    event_name = "claim.resubmitted",
                    correlation_id = %ctx.correlation_id,
                    claim_id = %next.id,
                    supersedes = %prior.id,
                    version = next.version,
                    "contractor claim resubmitted"
                );
                Ok(Resubmission { claim: next, superseded, routed_contractor_claim: None, report: None })
            }
            PartyRole::Surveyor => {
                if next.linked_claim_id != prior.linked_claim_id {
                    return Err(DomainError::validation(
                        "linked_claim_id",
                        "a new surveyor version must reconcile the same contractor claim",
                    )
                    .into());
                }

                let contractor = self.load_linked_contractor_of(&next).await?;
                self.ensure_no_live_surveyor_claim(&contractor, Some(&prior.id)).await?;
                let submission = self.reconcile_and_route(ctx, contractor, next, supersede).await?;

                Ok(Resubmission {
                    claim: submission.surveyor_claim,
                    superseded,
                    routed_contractor_claim: Some(submission.contractor_claim),
                    report: Some(submission.report),
                })
            }
        }
    }

    /// A managerial or finance decision. `decision` is the requested status,
    /// e.g. `approved_managerial`.
    pub async fn decide(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
        stage: ApprovalStage,
        decision: ClaimStatus,
    ) -> Result<Claim, ApplicationError> {
        let event = stage.decision_event(decision)?;
        ctx.actor.require_any(event.required_roles())?;
        let mut claim = self.load_claim(claim_id).await?;
        let transition = self.apply_event(ctx, &claim.id, claim.status, event)?;

        self.claims.append_status_transition(transition.clone()).await?;
        claim.status = transition.to;

        info!(
            event_name = "claim.transition.applied",
            correlation_id = %ctx.correlation_id,
            claim_id = %claim.id,
            stage = stage.as_str(),
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            actor = %ctx.actor.user_id,
            "claim decision recorded"
        );
        Ok(claim)
    }

    pub async fn reject_by_system(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
        reason: Option<&str>,
    ) -> Result<Claim, ApplicationError> {
        ctx.actor.require_any(ClaimEvent::SystemRejected.required_roles())?;
        let mut claim = self.load_claim(claim_id).await?;
        let transition = self.apply_event(ctx, &claim.id, claim.status, ClaimEvent::SystemRejected)?;

        self.claims.append_status_transition(transition.clone()).await?;
        claim.status = transition.to;

        warn!(
            event_name = "claim.rejected_system",
            correlation_id = %ctx.correlation_id,
            claim_id = %claim.id,
            from = transition.from.as_str(),
            reason = reason.unwrap_or("unspecified"),
            "claim rejected by administrator"
        );
        Ok(claim)
    }

    /// Read-only comparison for display; never changes a status.
    pub async fn reconcile(
        &self,
        ctx: &RequestContext,
        contractor_claim_id: &ClaimId,
    ) -> Result<ReconciliationView, ApplicationError> {
        let contractor = self.load_visible_claim(ctx, contractor_claim_id).await?;
        if contractor.party_role != PartyRole::Contractor {
            return Err(DomainError::validation(
                "claim_id",
                "reconciliation is viewed from the contractor claim",
            )
            .into());
        }

        let surveyor = self
            .claims
            .find_linked_claims(&contractor.id)
            .await?
            .into_iter()
            .filter(|claim| claim.status != ClaimStatus::Superseded)
            .last();

        let current = match &surveyor {
            Some(surveyor) => {
                let active = self.thresholds.get_active().await?;
                let policy = ThresholdPolicy::resolve(active.as_ref(), self.fallback_limit);
                Some(self.engine.reconcile(&contractor, surveyor, &policy)?)
            }
            None => None,
        };
        let pinned = self.claims.find_reconciliation(&contractor.id).await?;

        Ok(ReconciliationView { contractor_claim: contractor, surveyor_claim: surveyor, current, pinned })
    }

    /// Contractor-only actors see their own claims regardless of the filter.
    pub async fn list_claims(
        &self,
        ctx: &RequestContext,
        filter: ClaimFilter,
    ) -> Result<Vec<Claim>, ApplicationError> {
        let mut filter = filter;
        if contractor_only(ctx) {
            filter.created_by = Some(ctx.actor.user_id.clone());
        }
        Ok(self.claims.list_claims(&filter).await?)
    }

    pub async fn find_linked_claims(
        &self,
        ctx: &RequestContext,
        contractor_claim_id: &ClaimId,
    ) -> Result<Vec<Claim>, ApplicationError> {
        let contractor = self.load_visible_claim(ctx, contractor_claim_id).await?;
        Ok(self.claims.find_linked_claims(&contractor.id).await?)
    }

    pub async fn claim_detail(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
    ) -> Result<ClaimDetail, ApplicationError> {
        let claim = self.load_visible_claim(ctx, claim_id).await?;
        let transitions = self.claims.list_transitions(&claim.id).await?;
        let signatures = self.signatures.list(&claim.id).await?;
        let linked_claims = match claim.party_role {
            PartyRole::Contractor => self.claims.find_linked_claims(&claim.id).await?,
            PartyRole::Surveyor => Vec::new(),
        };

        Ok(ClaimDetail {
            total_bcm: claim.total_bcm(),
            total_amount: claim.total_amount(),
            claim,
            transitions,
            signatures,
            linked_claims,
        })
    }

    pub(crate) async fn load_claim(&self, id: &ClaimId) -> Result<Claim, ApplicationError> {
        self.claims
            .find_claim(id)
            .await?
            .ok_or_else(|| DomainError::not_found("claim", id.0.clone()).into())
    }

    /// Contractor-only actors may only load claims they created.
    pub(crate) async fn load_visible_claim(
        &self,
        ctx: &RequestContext,
        id: &ClaimId,
    ) -> Result<Claim, ApplicationError> {
        let claim = self.load_claim(id).await?;
        if contractor_only(ctx) && claim.created_by != ctx.actor.user_id {
            return Err(DomainError::Permission {
                actor: ctx.actor.user_id.clone(),
                required: vec![Role::Surveyor, Role::Managerial, Role::Finance, Role::Admin],
            }
            .into());
        }
        Ok(claim)
    }

    async fn load_linked_contractor(&self, draft: &ClaimDraft) -> Result<Claim, ApplicationError> {
        let linked = draft.linked_claim_id.as_ref().ok_or_else(|| {
            DomainError::validation("linked_claim_id", "a surveyor claim must reference a contractor claim")
        })?;
        self.load_contractor(linked).await
    }

    async fn load_linked_contractor_of(&self, surveyor: &Claim) -> Result<Claim, ApplicationError> {
        let linked = surveyor.linked_claim_id.as_ref().ok_or_else(|| {
            DomainError::validation("linked_claim_id", "a surveyor claim must reference a contractor claim")
        })?;
        self.load_contractor(linked).await
    }

    async fn load_contractor(&self, id: &ClaimId) -> Result<Claim, ApplicationError> {
        let contractor = self.load_claim(id).await?;
        if contractor.party_role != PartyRole::Contractor {
            return Err(DomainError::validation(
                "linked_claim_id",
                format!("claim `{}` is not a contractor claim", contractor.claim_number),
            )
            .into());
        }
        Ok(contractor)
    }

    async fn ensure_no_live_surveyor_claim(
        &self,
        contractor: &Claim,
        replacing: Option<&ClaimId>,
    ) -> Result<(), ApplicationError> {
        let linked = self.claims.find_linked_claims(&contractor.id).await?;
        let live = linked.iter().find(|claim| {
            Some(&claim.id) != replacing
                && claim.status != ClaimStatus::Superseded
                && !claim.status.is_rejected()
        });

        match live {
            Some(existing) => Err(DomainError::conflict(
                "claim",
                contractor.id.0.clone(),
                format!(
                    "surveyor claim `{}` is already linked; resubmit it instead",
                    existing.claim_number
                ),
            )
            .into()),
            None => Ok(()),
        }
    }

    async fn reconcile_and_route(
        &self,
        ctx: &RequestContext,
        mut contractor: Claim,
        mut surveyor: Claim,
        supersede: Option<ClaimTransition>,
    ) -> Result<SurveyorSubmission, ApplicationError> {
        let active = self.thresholds.get_active().await?;
        let policy = ThresholdPolicy::resolve(active.as_ref(), self.fallback_limit);
        let report = self.engine.reconcile(&contractor, &surveyor, &policy)?;

        let mut transitions: Vec<ClaimTransition> = supersede.into_iter().collect();
        let stays_in_review = contractor.status == ClaimStatus::NeedsReview
            && report.recommendation == Recommendation::NeedsReview;
        if !stays_in_review {
            let routed = self.apply_event(
                ctx,
                &contractor.id,
                contractor.status,
                report.recommendation.routing_event(),
            )?;
            contractor.status = routed.to;
            transitions.push(routed);
        }

        let submitted = self.apply_event(ctx, &surveyor.id, ClaimStatus::Draft, ClaimEvent::Submit)?;
        let validated =
            self.apply_event(ctx, &surveyor.id, submitted.to, ClaimEvent::SurveyorReconciled)?;
        surveyor.status = validated.to;

        let snapshot = ReconciliationSnapshot {
            report: report.clone(),
            reconciled_by: ctx.actor.user_id.clone(),
            reconciled_at: self.now(),
        };

        self.claims
            .commit(ClaimCommit {
                new_claim: Some(NewClaim { claim: surveyor.clone(), history: vec![submitted, validated] }),
                transitions,
                snapshot: Some(snapshot),
            })
            .await?;

        self.audit.emit(
            AuditEvent::new(
                &ctx.audit(Some(&contractor.id)),
                "claim.reconciled",
                AuditCategory::Reconciliation,
                AuditOutcome::Success,
            )
            .with_metadata("surveyor_claim_id", surveyor.id.0.clone())
            .with_metadata("recommendation", report.recommendation.as_str())
            .with_metadata(
                "threshold_id",
                report.threshold.threshold_id.as_ref().map(|id| id.0.clone()).unwrap_or_default(),
            )
            .with_metadata("limit_value", report.threshold.limit_value.to_string()),
        );
        info!(
            event_name = "claim.reconciled",
            correlation_id = %ctx.correlation_id,
            claim_id = %contractor.id,
            surveyor_claim_id = %surveyor.id,
            recommendation = report.recommendation.as_str(),
            status = contractor.status.as_str(),
            "surveyor claim reconciled"
        );

        Ok(SurveyorSubmission { surveyor_claim: surveyor, contractor_claim: contractor, report })
    }

    /// Runs `event` through the state machine and returns the log row to persist.
    pub(crate) fn apply_event(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
        current: ClaimStatus,
        event: ClaimEvent,
    ) -> Result<ClaimTransition, DomainError> {
        let outcome = self.machine.apply_with_audit(
            current,
            event,
            &ctx.actor,
            self.audit.as_ref(),
            &ctx.audit(Some(claim_id)),
        )?;

        Ok(ClaimTransition {
            claim_id: claim_id.clone(),
            from: outcome.from,
            to: outcome.to,
            event: outcome.event,
            actor_id: ctx.actor.user_id.clone(),
            correlation_id: ctx.correlation_id.clone(),
            occurred_at: self.now(),
        })
    }

    /// Site must exist, the pit must belong to it, and every block must sit in
    /// a pit of the same site.
    async fn check_references(&self, draft: &ClaimDraft) -> Result<Site, ApplicationError> {
        let site = self.references.find_site(&draft.site_id).await?.ok_or_else(|| {
            DomainError::validation("site_id", format!("unknown site `{}`", draft.site_id))
        })?;

        let pit = self.references.find_pit(&draft.pit_id).await?.ok_or_else(|| {
            DomainError::validation("pit_id", format!("unknown pit `{}`", draft.pit_id))
        })?;
        if pit.site_id != site.id {
            return Err(DomainError::validation(
                "pit_id",
                format!("pit `{}` does not belong to site `{}`", pit.id, site.id),
            )
            .into());
        }

        let mut pits: HashMap<PitId, Pit> = HashMap::from([(pit.id.clone(), pit)]);
        for (index, line) in draft.lines.iter().enumerate() {
            let field = format!("lines[{index}].block_id");
            let block = self.references.find_block(&line.block_id).await?.ok_or_else(|| {
                DomainError::validation(field.clone(), format!("unknown block `{}`", line.block_id))
            })?;

            if !pits.contains_key(&block.pit_id) {
                let block_pit = self.references.find_pit(&block.pit_id).await?.ok_or_else(|| {
                    DomainError::validation(field.clone(), format!("block `{}` has no pit", block.id))
                })?;
                pits.insert(block_pit.id.clone(), block_pit);
            }

            let in_site = pits.get(&block.pit_id).map(|pit| pit.site_id == site.id).unwrap_or(false);
            if !in_site {
                return Err(DomainError::validation(
                    field,
                    format!("block `{}` is outside site `{}`", block.id, site.id),
                )
                .into());
            }
        }

        Ok(site)
    }

    async fn next_claim_number(
        &self,
        draft: &ClaimDraft,
        site: &Site,
    ) -> Result<String, ApplicationError> {
        let existing = self
            .claims
            .count_claims_in_period(draft.party_role, &draft.site_id, draft.period_year, draft.period_month)
            .await?;

        Ok(format_claim_number(
            draft.party_role,
            draft.period_year,
            draft.period_month,
            &site.code,
            existing + 1,
        ))
    }
}

fn expect_party(draft: &ClaimDraft, expected: PartyRole) -> Result<(), DomainError> {
    if draft.party_role != expected {
        return Err(DomainError::validation(
            "party_role",
            format!("expected a {expected} claim, got {}", draft.party_role),
        ));
    }
    Ok(())
}

fn contractor_only(ctx: &RequestContext) -> bool {
    ctx.actor.roles.iter().all(|role| *role == Role::Contractor)
}

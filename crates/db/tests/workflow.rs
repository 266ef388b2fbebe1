//! End-to-end claim workflow runs against both storage backends.

use overburden_core::chrono::NaiveDate;
use overburden_core::domain::claim::{ClaimDraft, ClaimId, ClaimLine, PartyRole};
use overburden_core::domain::reference::{BlockId, PitId, SiteId};
use overburden_core::domain::threshold::{ThresholdInput, ThresholdUpdate};
use overburden_core::rust_decimal::Decimal;
use overburden_core::{
    Actor, ApplicationError, ApprovalStage, ClaimStatus, ClaimWorkflow, DomainError, Recommendation,
    RequestContext, Role, SignatureSource, WorkflowRepositories,
};
use overburden_db::{
    connect_with_settings, in_memory_repositories, migrations, sql_repositories, DemoDataset,
};

type WorkflowTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

fn fail<E: std::fmt::Debug>(step: &str) -> impl FnOnce(E) -> String + '_ {
    move |error| format!("{step}: {error:?}")
}

async fn sqlite_backend() -> WorkflowTestResult<WorkflowRepositories> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.map_err(fail("connect"))?;
    migrations::run_pending(&pool).await.map_err(fail("migrate"))?;
    DemoDataset::load(&pool).await.map_err(fail("seed"))?;
    Ok(sql_repositories(pool))
}

async fn memory_backend() -> WorkflowTestResult<WorkflowRepositories> {
    let repositories = in_memory_repositories();
    repositories
        .thresholds
        .insert(DemoDataset::default_threshold())
        .await
        .map_err(fail("seed threshold"))?;
    Ok(repositories)
}

async fn backends() -> WorkflowTestResult<Vec<(&'static str, ClaimWorkflow)>> {
    Ok(vec![
        ("memory", ClaimWorkflow::new(memory_backend().await?)),
        ("sqlite", ClaimWorkflow::new(sqlite_backend().await?)),
    ])
}

fn ctx(user: &str, role: Role) -> RequestContext {
    RequestContext::new(Actor::new(user, [role]), format!("req-{user}"))
}

fn draft(party_role: PartyRole, bcm: i64, linked: Option<&ClaimId>) -> ClaimDraft {
    ClaimDraft {
        party_role,
        site_id: SiteId("site-ktb".to_owned()),
        pit_id: PitId("pit-ktb-1".to_owned()),
        period_month: 5,
        period_year: 2024,
        job_type: "overburden removal".to_owned(),
        lines: vec![ClaimLine {
            block_id: BlockId("blk-pa-01".to_owned()),
            bcm: Decimal::new(bcm, 0),
            amount: Decimal::new(bcm * 32_500, 0),
            date: NaiveDate::from_ymd_opt(2024, 5, 14).unwrap_or_default(),
            note: None,
            materials: Vec::new(),
            evidence_ref: None,
        }],
        linked_claim_id: linked.cloned(),
    }
}

async fn submit_pair(
    workflow: &ClaimWorkflow,
    contractor_bcm: i64,
    surveyor_bcm: i64,
) -> WorkflowTestResult<overburden_core::service::SurveyorSubmission> {
    let contractor = workflow
        .submit_contractor_claim(&ctx("ctr-1", Role::Contractor), draft(PartyRole::Contractor, contractor_bcm, None))
        .await
        .map_err(fail("submit contractor claim"))?;
    workflow
        .submit_surveyor_claim(
            &ctx("svy-1", Role::Surveyor),
            draft(PartyRole::Surveyor, surveyor_bcm, Some(&contractor.id)),
        )
        .await
        .map_err(fail("submit surveyor claim"))
}

async fn sign(workflow: &ClaimWorkflow, claim_id: &ClaimId, user: &str, role: Role) -> WorkflowTestResult {
    workflow
        .submit_signature(
            &ctx(user, role),
            claim_id,
            role,
            SignatureSource::Inline { data: format!("data:image/png;base64,{user}") },
        )
        .await
        .map_err(fail("submit signature"))?;
    Ok(())
}

fn is_precondition(error: &ApplicationError) -> bool {
    matches!(error, ApplicationError::Domain(DomainError::Precondition { .. }))
}

#[tokio::test]
async fn within_threshold_claim_is_auto_approved() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let submission = submit_pair(&workflow, 100, 98).await?;
        let comparison = submission.report.comparisons.first().ok_or("missing comparison")?;

        require_eq!(comparison.selisih_bcm, Some(Decimal::new(2, 0)), "{backend}: selisih_bcm");
        require_eq!(comparison.selisih_persen, Some(Decimal::new(2, 0)), "{backend}: selisih_persen");
        require!(comparison.within_threshold, "{backend}: block should be within threshold");
        require_eq!(submission.report.recommendation, Recommendation::AutoApproved);
        require_eq!(submission.contractor_claim.status, ClaimStatus::AutoApproved);
        require_eq!(submission.surveyor_claim.status, ClaimStatus::Validated);

        let contractor_id = submission.contractor_claim.id.clone();
        let stored = workflow
            .claim_detail(&ctx("mgr-1", Role::Managerial), &contractor_id)
            .await
            .map_err(fail("claim detail"))?;
        require_eq!(stored.claim.status, ClaimStatus::AutoApproved, "{backend}: stored status");
        require_eq!(stored.linked_claims.len(), 1);

        sign(&workflow, &contractor_id, "svy-1", Role::Surveyor).await?;
        let certificate = workflow
            .assemble_certificate(&ctx("mgr-1", Role::Managerial), &contractor_id)
            .await
            .map_err(fail("assemble certificate"))?;
        require_eq!(certificate.grand_total_bcm, Decimal::new(100, 0), "{backend}: grand total");
        require!(certificate.signatures.surveyor.is_signed());
    }
    Ok(())
}

#[tokio::test]
async fn outside_threshold_claim_needs_both_approvals_before_certification() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let submission = submit_pair(&workflow, 100, 80).await?;
        let comparison = submission.report.comparisons.first().ok_or("missing comparison")?;
        require_eq!(comparison.selisih_persen, Some(Decimal::new(20, 0)), "{backend}: selisih_persen");
        require!(!comparison.within_threshold);
        require_eq!(submission.contractor_claim.status, ClaimStatus::NeedsReview);

        let claim_id = submission.contractor_claim.id.clone();
        let premature = workflow
            .assemble_certificate(&ctx("mgr-1", Role::Managerial), &claim_id)
            .await
            .expect_err("needs_review is not certifiable");
        require!(is_precondition(&premature), "{backend}: expected precondition, got {premature:?}");

        let managerial = workflow
            .decide(&ctx("mgr-1", Role::Managerial), &claim_id, ApprovalStage::Managerial, ClaimStatus::ApprovedManagerial)
            .await
            .map_err(fail("managerial approval"))?;
        require_eq!(managerial.status, ClaimStatus::ApprovedManagerial);

        let finance = workflow
            .decide(&ctx("fin-1", Role::Finance), &claim_id, ApprovalStage::Finance, ClaimStatus::ApprovedFinance)
            .await
            .map_err(fail("finance approval"))?;
        require_eq!(finance.status, ClaimStatus::ApprovedFinance);

        sign(&workflow, &claim_id, "svy-1", Role::Surveyor).await?;
        sign(&workflow, &claim_id, "mgr-1", Role::Managerial).await?;
        let unsigned = workflow
            .assemble_certificate(&ctx("fin-1", Role::Finance), &claim_id)
            .await
            .expect_err("finance signature missing");
        require!(is_precondition(&unsigned), "{backend}: missing finance signature");

        sign(&workflow, &claim_id, "fin-1", Role::Finance).await?;
        let certificate = workflow
            .assemble_certificate(&ctx("fin-1", Role::Finance), &claim_id)
            .await
            .map_err(fail("assemble certificate"))?;
        require_eq!(certificate.status, ClaimStatus::ApprovedFinance);

        let transitions = workflow
            .claim_detail(&ctx("fin-1", Role::Finance), &claim_id)
            .await
            .map_err(fail("claim detail"))?
            .transitions;
        let path: Vec<ClaimStatus> = transitions.iter().map(|transition| transition.to).collect();
        require_eq!(
            path,
            vec![
                ClaimStatus::Submitted,
                ClaimStatus::NeedsReview,
                ClaimStatus::ApprovedManagerial,
                ClaimStatus::ApprovedFinance,
            ],
            "{backend}: transition log"
        );
    }
    Ok(())
}

#[tokio::test]
async fn finance_cannot_decide_before_managerial() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let submission = submit_pair(&workflow, 100, 80).await?;
        let error = workflow
            .decide(
                &ctx("fin-1", Role::Finance),
                &submission.contractor_claim.id,
                ApprovalStage::Finance,
                ClaimStatus::ApprovedFinance,
            )
            .await
            .expect_err("finance before managerial");

        require!(
            matches!(error, ApplicationError::Domain(DomainError::InvalidStateTransition { .. })),
            "{backend}: expected invalid transition, got {error:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_managerial_decisions_have_one_winner() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let submission = submit_pair(&workflow, 100, 80).await?;
        let claim_id = submission.contractor_claim.id.clone();
        let approver = ctx("mgr-1", Role::Managerial);
        let rejecter = ctx("mgr-2", Role::Managerial);

        let (approved, rejected) = tokio::join!(
            workflow.decide(&approver, &claim_id, ApprovalStage::Managerial, ClaimStatus::ApprovedManagerial),
            workflow.decide(&rejecter, &claim_id, ApprovalStage::Managerial, ClaimStatus::RejectedManagerial),
        );

        let winners = [approved.is_ok(), rejected.is_ok()].into_iter().filter(|ok| *ok).count();
        require_eq!(winners, 1, "{backend}: exactly one decision must win");

        let detail = workflow
            .claim_detail(&approver, &claim_id)
            .await
            .map_err(fail("claim detail"))?;
        let decisions = detail
            .transitions
            .iter()
            .filter(|transition| transition.from == ClaimStatus::NeedsReview)
            .count();
        require_eq!(decisions, 1, "{backend}: one decision row in the log");
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_activations_leave_a_single_active_threshold() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let admin = ctx("adm-1", Role::Admin);
        let mut created = Vec::new();
        for (name, limit) in [("Strict", 2), ("Loose", 10)] {
            let threshold = workflow
                .create_threshold(
                    &admin,
                    ThresholdInput {
                        name: name.to_owned(),
                        limit_value: Decimal::new(limit, 0),
                        description: None,
                        active: false,
                    },
                )
                .await
                .map_err(fail("create threshold"))?;
            created.push(threshold.id);
        }

        let (first, second) = tokio::join!(
            workflow.set_threshold_active(&admin, &created[0], true),
            workflow.set_threshold_active(&admin, &created[1], true),
        );
        first.map_err(fail("activate strict"))?;
        second.map_err(fail("activate loose"))?;

        let active = workflow
            .list_thresholds(&admin)
            .await
            .map_err(fail("list thresholds"))?
            .into_iter()
            .filter(|threshold| threshold.active)
            .count();
        require_eq!(active, 1, "{backend}: single active threshold");
    }
    Ok(())
}

#[tokio::test]
async fn pinned_threshold_cannot_be_deleted_while_review_is_pending() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let submission = submit_pair(&workflow, 100, 80).await?;
        let pinned = submission.report.threshold.threshold_id.clone().ok_or("policy should be pinned")?;
        let admin = ctx("adm-1", Role::Admin);

        let error = workflow.delete_threshold(&admin, &pinned).await.expect_err("pinned threshold");
        require!(
            matches!(error, ApplicationError::Domain(DomainError::Conflict { .. })),
            "{backend}: expected conflict, got {error:?}"
        );

        workflow
            .decide(
                &ctx("mgr-1", Role::Managerial),
                &submission.contractor_claim.id,
                ApprovalStage::Managerial,
                ClaimStatus::RejectedManagerial,
            )
            .await
            .map_err(fail("reject"))?;
        workflow.delete_threshold(&admin, &pinned).await.map_err(fail("delete after resolution"))?;

        let view = workflow
            .reconcile(&admin, &submission.contractor_claim.id)
            .await
            .map_err(fail("reconcile view"))?;
        let snapshot = view.pinned.ok_or("snapshot should survive threshold deletion")?;
        require_eq!(snapshot.report.threshold.limit_value, Decimal::new(5, 0), "{backend}: pinned limit");
    }
    Ok(())
}

#[tokio::test]
async fn surveyor_resubmission_supersedes_and_reroutes() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let submission = submit_pair(&workflow, 100, 80).await?;
        let surveyor = ctx("svy-1", Role::Surveyor);

        let resubmitted = workflow
            .resubmit_claim(
                &surveyor,
                &submission.surveyor_claim.id,
                draft(PartyRole::Surveyor, 97, Some(&submission.contractor_claim.id)),
            )
            .await
            .map_err(fail("resubmit surveyor claim"))?;

        require_eq!(resubmitted.claim.version, 2, "{backend}: version");
        require_eq!(resubmitted.superseded, Some(submission.surveyor_claim.id.clone()));
        let routed = resubmitted.routed_contractor_claim.ok_or("contractor should be re-routed")?;
        require_eq!(routed.status, ClaimStatus::AutoApproved, "{backend}: re-routed status");

        let again = workflow
            .resubmit_claim(
                &surveyor,
                &submission.surveyor_claim.id,
                draft(PartyRole::Surveyor, 99, Some(&submission.contractor_claim.id)),
            )
            .await
            .expect_err("prior already has a successor");
        require!(
            matches!(again, ApplicationError::Domain(DomainError::Conflict { .. })),
            "{backend}: expected conflict, got {again:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn oversized_surveyor_figure_is_rejected_without_routing() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let contractor = workflow
            .submit_contractor_claim(&ctx("ctr-1", Role::Contractor), draft(PartyRole::Contractor, 0, None))
            .await
            .map_err(fail("submit contractor claim"))?;

        let mut oversized = draft(PartyRole::Surveyor, 1, Some(&contractor.id));
        oversized.lines[0].bcm = Decimal::from_i128_with_scale(10_i128.pow(23), 0);
        let error = workflow
            .submit_surveyor_claim(&ctx("svy-1", Role::Surveyor), oversized)
            .await
            .expect_err("bcm above the per-line maximum");
        require!(
            matches!(error, ApplicationError::Domain(DomainError::Validation { ref field, .. }) if field == "lines[0].bcm"),
            "{backend}: expected bcm validation, got {error:?}"
        );

        let stored = workflow
            .claim_detail(&ctx("mgr-1", Role::Managerial), &contractor.id)
            .await
            .map_err(fail("claim detail"))?;
        require_eq!(stored.claim.status, ClaimStatus::Submitted, "{backend}: contractor left unrouted");
        require!(stored.linked_claims.is_empty(), "{backend}: nothing linked");
    }
    Ok(())
}

#[tokio::test]
async fn contractors_only_see_their_own_reconciliation() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let submission = submit_pair(&workflow, 100, 80).await?;
        let claim_id = submission.contractor_claim.id.clone();
        let outsider = ctx("ctr-2", Role::Contractor);

        let error = workflow.reconcile(&outsider, &claim_id).await.expect_err("foreign claim");
        require!(
            matches!(error, ApplicationError::Domain(DomainError::Permission { ref actor, .. }) if actor == "ctr-2"),
            "{backend}: expected permission error, got {error:?}"
        );
        let error = workflow.list_signatures(&outsider, &claim_id).await.expect_err("foreign signatures");
        require!(
            matches!(error, ApplicationError::Domain(DomainError::Permission { .. })),
            "{backend}: expected permission error, got {error:?}"
        );

        let own = workflow
            .reconcile(&ctx("ctr-1", Role::Contractor), &claim_id)
            .await
            .map_err(fail("owner reconcile"))?;
        require_eq!(own.contractor_claim.id, claim_id, "{backend}: owner sees the view");
        require!(own.pinned.is_some(), "{backend}: pinned snapshot");
    }
    Ok(())
}

#[tokio::test]
async fn second_signature_for_a_role_replaces_the_first() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let submission = submit_pair(&workflow, 100, 98).await?;
        let claim_id = submission.contractor_claim.id.clone();
        let surveyor = ctx("svy-1", Role::Surveyor);

        let first = workflow
            .submit_signature(
                &surveyor,
                &claim_id,
                Role::Surveyor,
                SignatureSource::Inline { data: "data:image/png;base64,Zmlyc3Q=".to_owned() },
            )
            .await
            .map_err(fail("first signature"))?;
        let second_source = SignatureSource::File { reference: "uploads/signatures/svy-1.png".to_owned() };
        let second = workflow
            .submit_signature(&surveyor, &claim_id, Role::Surveyor, second_source.clone())
            .await
            .map_err(fail("second signature"))?;
        require!(first.digest != second.digest, "{backend}: digests differ per payload");

        let listed = workflow.list_signatures(&surveyor, &claim_id).await.map_err(fail("list signatures"))?;
        require_eq!(listed.len(), 1, "{backend}: one record per (claim, role)");

        let current = workflow
            .get_signature(&surveyor, &claim_id, Role::Surveyor)
            .await
            .map_err(fail("get signature"))?
            .ok_or("signature should be present")?;
        require_eq!(current.digest, second.digest, "{backend}: second digest is current");
        require_eq!(current.source, second_source, "{backend}: second source is current");
    }
    Ok(())
}

#[tokio::test]
async fn stale_threshold_edit_does_not_reclaim_the_active_slot() -> WorkflowTestResult {
    for (backend, repositories) in [("memory", memory_backend().await?), ("sqlite", sqlite_backend().await?)] {
        let thresholds = repositories.thresholds.clone();
        let workflow = ClaimWorkflow::new(repositories);
        let admin = ctx("adm-1", Role::Admin);
        let default_id = DemoDataset::default_threshold().id;

        let strict = workflow
            .create_threshold(
                &admin,
                ThresholdInput {
                    name: "Strict".to_owned(),
                    limit_value: Decimal::new(2, 0),
                    description: None,
                    active: false,
                },
            )
            .await
            .map_err(fail("create threshold"))?;

        // An edit prepared from a read taken while the default was still active.
        let mut stale = thresholds
            .find(&default_id)
            .await
            .map_err(fail("find default"))?
            .ok_or("default threshold should exist")?;
        require!(stale.active, "{backend}: default starts active");
        workflow.set_threshold_active(&admin, &strict.id, true).await.map_err(fail("activate strict"))?;

        stale.name = "Standard (renamed)".to_owned();
        let stored = thresholds.update(stale, None).await.map_err(fail("stale rename"))?;
        require!(!stored.active, "{backend}: rename must not reactivate");

        let renamed = workflow
            .update_threshold(
                &admin,
                &default_id,
                ThresholdUpdate { description: Some("monthly".to_owned()), ..ThresholdUpdate::default() },
            )
            .await
            .map_err(fail("update threshold"))?;
        require!(!renamed.active, "{backend}: field update keeps stored activation");

        let active = workflow
            .active_threshold(&admin)
            .await
            .map_err(fail("active threshold"))?
            .ok_or("one threshold should be active")?;
        require_eq!(active.id, strict.id, "{backend}: strict stays active");
    }
    Ok(())
}

#[tokio::test]
async fn role_is_checked_before_the_claim_is_looked_up() -> WorkflowTestResult {
    for (backend, workflow) in backends().await? {
        let missing = ClaimId("clm-missing".to_owned());

        let error = workflow
            .decide(
                &ctx("ctr-1", Role::Contractor),
                &missing,
                ApprovalStage::Managerial,
                ClaimStatus::ApprovedManagerial,
            )
            .await
            .expect_err("contractor cannot decide");
        require!(
            matches!(error, ApplicationError::Domain(DomainError::Permission { .. })),
            "{backend}: expected permission error, got {error:?}"
        );

        let error = workflow
            .reject_by_system(&ctx("mgr-1", Role::Managerial), &missing, None)
            .await
            .expect_err("managerial cannot reject by system");
        require!(
            matches!(error, ApplicationError::Domain(DomainError::Permission { .. })),
            "{backend}: expected permission error, got {error:?}"
        );
    }
    Ok(())
}

//! `ClaimWorkflow` wires the pure engines to the storage ports.
//!
//! Every public operation takes a [`RequestContext`], checks the actor's roles
//! before touching storage, and returns `ApplicationError` so transports can map
//! failures with the caller's correlation id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::audit::{AuditContext, AuditSink, TracingAuditSink};
use crate::certificate::CertificateAssembler;
use crate::config::ReconciliationConfig;
use crate::domain::claim::ClaimId;
use crate::domain::identity::Actor;
use crate::reconciliation::ReconciliationEngine;
use crate::repository::{
    ClaimRepository, ReferenceDirectory, SignatureRepository, ThresholdRepository,
};
use crate::workflow::ApprovalStateMachine;

pub mod claims;
pub mod dashboard;
pub mod signatures;
pub mod thresholds;

pub use claims::{ClaimDetail, ReconciliationView, Resubmission, SurveyorSubmission};
pub use dashboard::DashboardSummary;

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub actor: Actor,
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(actor: Actor, correlation_id: impl Into<String>) -> Self {
        Self { actor, correlation_id: correlation_id.into() }
    }

    pub fn generated(actor: Actor) -> Self {
        Self::new(actor, format!("req-{}", Uuid::new_v4()))
    }

    pub(crate) fn audit(&self, claim_id: Option<&ClaimId>) -> AuditContext {
        AuditContext::new(claim_id.cloned(), self.correlation_id.clone(), self.actor.user_id.clone())
    }
}

#[derive(Clone)]
pub struct WorkflowRepositories {
    pub claims: Arc<dyn ClaimRepository>,
    pub thresholds: Arc<dyn ThresholdRepository>,
    pub signatures: Arc<dyn SignatureRepository>,
    pub references: Arc<dyn ReferenceDirectory>,
}

#[derive(Clone)]
pub struct ClaimWorkflow {
    claims: Arc<dyn ClaimRepository>,
    thresholds: Arc<dyn ThresholdRepository>,
    signatures: Arc<dyn SignatureRepository>,
    references: Arc<dyn ReferenceDirectory>,
    audit: Arc<dyn AuditSink>,
    machine: ApprovalStateMachine,
    engine: ReconciliationEngine,
    assembler: CertificateAssembler,
    fallback_limit: Decimal,
}

impl ClaimWorkflow {
    pub fn new(repositories: WorkflowRepositories) -> Self {
        Self {
            claims: repositories.claims,
            thresholds: repositories.thresholds,
            signatures: repositories.signatures,
            references: repositories.references,
            audit: Arc::new(TracingAuditSink),
            machine: ApprovalStateMachine::new(),
            engine: ReconciliationEngine::default(),
            assembler: CertificateAssembler::new(),
            fallback_limit: Decimal::ZERO,
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_reconciliation(mut self, config: &ReconciliationConfig) -> Self {
        self.engine = ReconciliationEngine::new(config.percent_epsilon);
        self.fallback_limit = config.fallback_limit;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

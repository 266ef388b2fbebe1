pub mod audit;
pub mod certificate;
pub mod config;
pub mod domain;
pub mod errors;
pub mod reconciliation;
pub mod repository;
pub mod service;
pub mod workflow;

pub use chrono;
pub use rust_decimal;

pub use audit::{AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use certificate::{Certificate, CertificateAssembler, SignatureSlot};
pub use domain::claim::{Claim, ClaimDraft, ClaimId, ClaimLine, PartyRole};
pub use domain::identity::{Actor, Role};
pub use domain::signature::{Signature, SignatureSource};
pub use domain::threshold::{Threshold, ThresholdId, ThresholdInput, ThresholdUpdate};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use reconciliation::{
    BlockComparison, Recommendation, ReconciliationEngine, ReconciliationReport,
    ReconciliationSnapshot, ThresholdPolicy,
};
pub use repository::{ClaimFilter, RepositoryError};
pub use service::{ClaimWorkflow, RequestContext, WorkflowRepositories};
pub use workflow::{ApprovalStage, ApprovalStateMachine, ClaimEvent, ClaimStatus};

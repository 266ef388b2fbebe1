//! Storage ports. `overburden-db` implements them for SQLite and in memory; the
//! workflow service only ever sees these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::claim::{Claim, ClaimId, PartyRole};
use crate::domain::identity::Role;
use crate::domain::reference::{Block, BlockId, Pit, PitId, Site, SiteId};
use crate::domain::signature::Signature;
use crate::domain::threshold::{Threshold, ThresholdId};
use crate::errors::{ApplicationError, DomainError};
use crate::reconciliation::ReconciliationSnapshot;
use crate::workflow::{ClaimEvent, ClaimStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("conflicting write on {entity} `{id}`: {detail}")]
    Conflict { entity: String, id: String, detail: String },
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: String, id: String },
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn conflict(entity: &str, id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Conflict { entity: entity.to_owned(), id: id.into(), detail: detail.into() }
    }

    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound { entity: entity.to_owned(), id: id.into() }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict { entity, id, detail } => {
                Self::Domain(DomainError::Conflict { entity, id, detail })
            }
            RepositoryError::NotFound { entity, id } => {
                Self::Domain(DomainError::NotFound { entity, id })
            }
            RepositoryError::Backend(message) | RepositoryError::Decode(message) => {
                Self::Persistence(message)
            }
        }
    }
}

/// One row of the claim transition log. As a write it is a compare-and-swap:
/// `from` is the status the caller read, `to` the status it wants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTransition {
    pub claim_id: ClaimId,
    pub from: ClaimStatus,
    pub to: ClaimStatus,
    pub event: ClaimEvent,
    pub actor_id: String,
    pub correlation_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// A claim being inserted together with the transitions that produced its
/// stored status. History rows are logged, not compare-and-swapped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewClaim {
    pub claim: Claim,
    pub history: Vec<ClaimTransition>,
}

/// All-or-nothing unit of claim writes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimCommit {
    pub new_claim: Option<NewClaim>,
    pub transitions: Vec<ClaimTransition>,
    /// Replaces the snapshot pinned on `report.contractor_claim_id`.
    pub snapshot: Option<ReconciliationSnapshot>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimFilter {
    pub party_role: Option<PartyRole>,
    pub status: Option<ClaimStatus>,
    pub site_id: Option<SiteId>,
    pub pit_id: Option<PitId>,
    pub period_month: Option<u32>,
    pub period_year: Option<i32>,
    pub created_by: Option<String>,
    pub supersedes: Option<ClaimId>,
}

impl ClaimFilter {
    pub fn matches(&self, claim: &Claim) -> bool {
        self.party_role.map_or(true, |role| claim.party_role == role)
            && self.status.map_or(true, |status| claim.status == status)
            && self.site_id.as_ref().map_or(true, |site| &claim.site_id == site)
            && self.pit_id.as_ref().map_or(true, |pit| &claim.pit_id == pit)
            && self.period_month.map_or(true, |month| claim.period_month == month)
            && self.period_year.map_or(true, |year| claim.period_year == year)
            && self.created_by.as_ref().map_or(true, |user| &claim.created_by == user)
            && self.supersedes.as_ref().map_or(true, |prior| claim.supersedes.as_ref() == Some(prior))
    }
}

#[async_trait]
pub trait ClaimRepository: Send + Sync {
    async fn find_claim(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError>;

    /// Surveyor claims whose `linked_claim_id` is `contractor_claim_id`, oldest first.
    async fn find_linked_claims(
        &self,
        contractor_claim_id: &ClaimId,
    ) -> Result<Vec<Claim>, RepositoryError>;

    /// Newest first.
    async fn list_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>, RepositoryError>;

    /// Number of claims already numbered for this party, site and period.
    async fn count_claims_in_period(
        &self,
        party_role: PartyRole,
        site_id: &SiteId,
        period_year: i32,
        period_month: u32,
    ) -> Result<usize, RepositoryError>;

    /// Applies every part of `commit` or none of it. A transition whose `from`
    /// no longer matches the stored status fails with `Conflict`.
    async fn commit(&self, commit: ClaimCommit) -> Result<(), RepositoryError>;

    async fn append_status_transition(
        &self,
        transition: ClaimTransition,
    ) -> Result<(), RepositoryError> {
        self.commit(ClaimCommit { transitions: vec![transition], ..ClaimCommit::default() }).await
    }

    async fn list_transitions(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Vec<ClaimTransition>, RepositoryError>;

    async fn find_reconciliation(
        &self,
        contractor_claim_id: &ClaimId,
    ) -> Result<Option<ReconciliationSnapshot>, RepositoryError>;

    /// Contractor claims in `needs_review` whose pinned snapshot used `threshold_id`.
    async fn count_reviews_pinned_to(
        &self,
        threshold_id: &ThresholdId,
    ) -> Result<usize, RepositoryError>;
}

#[async_trait]
pub trait ThresholdRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Threshold>, RepositoryError>;

    async fn find(&self, id: &ThresholdId) -> Result<Option<Threshold>, RepositoryError>;

    /// Inserting an active threshold deactivates every other one in the same write.
    async fn insert(&self, threshold: Threshold) -> Result<(), RepositoryError>;

    /// Writes name, limit and description. The stored `active` flag is only
    /// touched when `activation` is set, with the same swap as `insert`.
    /// Returns the stored row; `NotFound` when `threshold.id` is unknown.
    async fn update(
        &self,
        threshold: Threshold,
        activation: Option<bool>,
    ) -> Result<Threshold, RepositoryError>;

    async fn set_active(
        &self,
        id: &ThresholdId,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<Threshold, RepositoryError>;

    async fn get_active(&self) -> Result<Option<Threshold>, RepositoryError>;

    async fn delete(&self, id: &ThresholdId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SignatureRepository: Send + Sync {
    /// Replaces any live signature for the same `(claim_id, role)`.
    async fn put(&self, signature: Signature) -> Result<(), RepositoryError>;

    async fn get(&self, claim_id: &ClaimId, role: Role)
        -> Result<Option<Signature>, RepositoryError>;

    async fn list(&self, claim_id: &ClaimId) -> Result<Vec<Signature>, RepositoryError>;
}

/// Read-only site/pit/block lookups.
#[async_trait]
pub trait ReferenceDirectory: Send + Sync {
    async fn find_site(&self, id: &SiteId) -> Result<Option<Site>, RepositoryError>;

    async fn find_pit(&self, id: &PitId) -> Result<Option<Pit>, RepositoryError>;

    async fn find_block(&self, id: &BlockId) -> Result<Option<Block>, RepositoryError>;

    async fn list_pits(&self, site_id: &SiteId) -> Result<Vec<Pit>, RepositoryError>;

    async fn list_blocks(&self, pit_id: &PitId) -> Result<Vec<Block>, RepositoryError>;
}

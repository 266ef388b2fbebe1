use std::collections::HashMap;

use overburden_core::chrono::{DateTime, Utc};
use overburden_core::domain::claim::{Claim, ClaimId, PartyRole};
use overburden_core::domain::identity::Role;
use overburden_core::domain::reference::{Block, BlockId, Pit, PitId, Site, SiteId};
use overburden_core::domain::signature::Signature;
use overburden_core::domain::threshold::{Threshold, ThresholdId};
use overburden_core::reconciliation::ReconciliationSnapshot;
use overburden_core::repository::{
    ClaimCommit, ClaimFilter, ClaimRepository, ClaimTransition, ReferenceDirectory,
    RepositoryError, SignatureRepository, ThresholdRepository,
};
use overburden_core::workflow::ClaimStatus;
use tokio::sync::RwLock;

#[derive(Default)]
struct ClaimStore {
    claims: HashMap<ClaimId, Claim>,
    /// Insertion order, used to break `created_at` ties.
    order: Vec<ClaimId>,
    transitions: Vec<ClaimTransition>,
    snapshots: HashMap<ClaimId, ReconciliationSnapshot>,
}

impl ClaimStore {
    fn ordered(&self) -> impl Iterator<Item = &Claim> {
        self.order.iter().filter_map(|id| self.claims.get(id))
    }

    /// Checks every part of `commit` against the current state without mutating it.
    fn check(&self, commit: &ClaimCommit) -> Result<(), RepositoryError> {
        if let Some(new_claim) = &commit.new_claim {
            let claim = &new_claim.claim;
            if self.claims.contains_key(&claim.id) {
                return Err(RepositoryError::conflict("claim", claim.id.0.clone(), "id already exists"));
            }
            if self.claims.values().any(|stored| stored.claim_number == claim.claim_number) {
                return Err(RepositoryError::conflict(
                    "claim",
                    claim.claim_number.clone(),
                    "claim number already issued",
                ));
            }
            if let Some(prior) = &claim.supersedes {
                if self.claims.values().any(|stored| stored.supersedes.as_ref() == Some(prior)) {
                    return Err(RepositoryError::conflict(
                        "claim",
                        prior.0.clone(),
                        "claim already has a successor version",
                    ));
                }
            }
        }

        let mut staged: HashMap<&ClaimId, ClaimStatus> = HashMap::new();
        for transition in &commit.transitions {
            let current = match staged.get(&transition.claim_id) {
                Some(status) => *status,
                None => self
                    .claims
                    .get(&transition.claim_id)
                    .map(|claim| claim.status)
                    .ok_or_else(|| {
                        RepositoryError::not_found("claim", transition.claim_id.0.clone())
                    })?,
            };
            if current != transition.from {
                return Err(RepositoryError::conflict(
                    "claim",
                    transition.claim_id.0.clone(),
                    format!("expected status `{}`, found `{current}`", transition.from),
                ));
            }
            staged.insert(&transition.claim_id, transition.to);
        }

        Ok(())
    }

    fn apply(&mut self, commit: ClaimCommit) {
        if let Some(new_claim) = commit.new_claim {
            self.order.push(new_claim.claim.id.clone());
            self.claims.insert(new_claim.claim.id.clone(), new_claim.claim);
            self.transitions.extend(new_claim.history);
        }

        for transition in commit.transitions {
            if let Some(claim) = self.claims.get_mut(&transition.claim_id) {
                claim.status = transition.to;
            }
            self.transitions.push(transition);
        }

        if let Some(snapshot) = commit.snapshot {
            self.snapshots.insert(snapshot.report.contractor_claim_id.clone(), snapshot);
        }
    }
}

/// Claim store behind a single lock so a commit is applied whole or not at all.
#[derive(Default)]
pub struct InMemoryClaimRepository {
    store: RwLock<ClaimStore>,
}

#[async_trait::async_trait]
impl ClaimRepository for InMemoryClaimRepository {
    async fn find_claim(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.claims.get(id).cloned())
    }

    async fn find_linked_claims(
        &self,
        contractor_claim_id: &ClaimId,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let store = self.store.read().await;
        let mut linked: Vec<Claim> = store
            .ordered()
            .filter(|claim| claim.linked_claim_id.as_ref() == Some(contractor_claim_id))
            .cloned()
            .collect();
        linked.sort_by_key(|claim| claim.created_at);
        Ok(linked)
    }

    async fn list_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>, RepositoryError> {
        let store = self.store.read().await;
        let mut claims: Vec<Claim> =
            store.ordered().filter(|claim| filter.matches(claim)).cloned().collect();
        claims.reverse();
        claims.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(claims)
    }

    async fn count_claims_in_period(
        &self,
        party_role: PartyRole,
        site_id: &SiteId,
        period_year: i32,
        period_month: u32,
    ) -> Result<usize, RepositoryError> {
        let store = self.store.read().await;
        Ok(store
            .claims
            .values()
            .filter(|claim| {
                claim.version == 1
                    && claim.party_role == party_role
                    && &claim.site_id == site_id
                    && claim.period_year == period_year
                    && claim.period_month == period_month
            })
            .count())
    }

    async fn commit(&self, commit: ClaimCommit) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        store.check(&commit)?;
        store.apply(commit);
        Ok(())
    }

    async fn list_transitions(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Vec<ClaimTransition>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store
            .transitions
            .iter()
            .filter(|transition| &transition.claim_id == claim_id)
            .cloned()
            .collect())
    }

    async fn find_reconciliation(
        &self,
        contractor_claim_id: &ClaimId,
    ) -> Result<Option<ReconciliationSnapshot>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.snapshots.get(contractor_claim_id).cloned())
    }

    async fn count_reviews_pinned_to(
        &self,
        threshold_id: &ThresholdId,
    ) -> Result<usize, RepositoryError> {
        let store = self.store.read().await;
        Ok(store
            .snapshots
            .iter()
            .filter(|(claim_id, snapshot)| {
                snapshot.report.threshold.threshold_id.as_ref() == Some(threshold_id)
                    && store
                        .claims
                        .get(*claim_id)
                        .is_some_and(|claim| claim.status == ClaimStatus::NeedsReview)
            })
            .count())
    }
}

#[derive(Default)]
pub struct InMemoryThresholdRepository {
    thresholds: RwLock<Vec<Threshold>>,
}

fn deactivate_others(thresholds: &mut [Threshold], keep: &ThresholdId, updated_at: DateTime<Utc>) {
    for threshold in thresholds.iter_mut().filter(|threshold| threshold.active && &threshold.id != keep) {
        threshold.active = false;
        threshold.updated_at = updated_at;
    }
}

#[async_trait::async_trait]
impl ThresholdRepository for InMemoryThresholdRepository {
    async fn list(&self) -> Result<Vec<Threshold>, RepositoryError> {
        let thresholds = self.thresholds.read().await;
        Ok(thresholds.clone())
    }

    async fn find(&self, id: &ThresholdId) -> Result<Option<Threshold>, RepositoryError> {
        let thresholds = self.thresholds.read().await;
        Ok(thresholds.iter().find(|threshold| &threshold.id == id).cloned())
    }

    async fn insert(&self, threshold: Threshold) -> Result<(), RepositoryError> {
        let mut thresholds = self.thresholds.write().await;
        if thresholds.iter().any(|stored| stored.id == threshold.id) {
            return Err(RepositoryError::conflict("threshold", threshold.id.0, "id already exists"));
        }
        if threshold.active {
            deactivate_others(&mut thresholds, &threshold.id, threshold.updated_at);
        }
        thresholds.push(threshold);
        Ok(())
    }

    async fn update(
        &self,
        threshold: Threshold,
        activation: Option<bool>,
    ) -> Result<Threshold, RepositoryError> {
        let mut thresholds = self.thresholds.write().await;
        let Some(index) = thresholds.iter().position(|stored| stored.id == threshold.id) else {
            return Err(RepositoryError::not_found("threshold", threshold.id.0));
        };
        if activation == Some(true) {
            deactivate_others(&mut thresholds, &threshold.id, threshold.updated_at);
        }

        let stored = &mut thresholds[index];
        stored.name = threshold.name;
        stored.limit_value = threshold.limit_value;
        stored.description = threshold.description;
        stored.updated_at = threshold.updated_at;
        if let Some(active) = activation {
            stored.active = active;
        }
        Ok(stored.clone())
    }

    async fn set_active(
        &self,
        id: &ThresholdId,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<Threshold, RepositoryError> {
        let mut thresholds = self.thresholds.write().await;
        let Some(index) = thresholds.iter().position(|stored| &stored.id == id) else {
            return Err(RepositoryError::not_found("threshold", id.0.clone()));
        };
        if active {
            deactivate_others(&mut thresholds, id, updated_at);
        }
        let threshold = &mut thresholds[index];
        threshold.active = active;
        threshold.updated_at = updated_at;
        Ok(threshold.clone())
    }

    async fn get_active(&self) -> Result<Option<Threshold>, RepositoryError> {
        let thresholds = self.thresholds.read().await;
        Ok(thresholds.iter().find(|threshold| threshold.active).cloned())
    }

    async fn delete(&self, id: &ThresholdId) -> Result<(), RepositoryError> {
        let mut thresholds = self.thresholds.write().await;
        let before = thresholds.len();
        thresholds.retain(|threshold| &threshold.id != id);
        if thresholds.len() == before {
            return Err(RepositoryError::not_found("threshold", id.0.clone()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySignatureRepository {
    signatures: RwLock<HashMap<(ClaimId, Role), Signature>>,
}

#[async_trait::async_trait]
impl SignatureRepository for InMemorySignatureRepository {
    async fn put(&self, signature: Signature) -> Result<(), RepositoryError> {
        let mut signatures = self.signatures.write().await;
        signatures.insert((signature.claim_id.clone(), signature.role), signature);
        Ok(())
    }

    async fn get(
        &self,
        claim_id: &ClaimId,
        role: Role,
    ) -> Result<Option<Signature>, RepositoryError> {
        let signatures = self.signatures.read().await;
        Ok(signatures.get(&(claim_id.clone(), role)).cloned())
    }

    async fn list(&self, claim_id: &ClaimId) -> Result<Vec<Signature>, RepositoryError> {
        let signatures = self.signatures.read().await;
        let mut listed: Vec<Signature> = signatures
            .values()
            .filter(|signature| &signature.claim_id == claim_id)
            .cloned()
            .collect();
        listed.sort_by(|left, right| {
            left.signed_at.cmp(&right.signed_at).then(left.role.cmp(&right.role))
        });
        Ok(listed)
    }
}

/// Fixed reference data, typically built from the demo dataset.
#[derive(Clone, Debug, Default)]
pub struct InMemoryReferenceDirectory {
    sites: Vec<Site>,
    pits: Vec<Pit>,
    blocks: Vec<Block>,
}

impl InMemoryReferenceDirectory {
    pub fn new(sites: Vec<Site>, pits: Vec<Pit>, blocks: Vec<Block>) -> Self {
        Self { sites, pits, blocks }
    }
}

#[async_trait::async_trait]
impl ReferenceDirectory for InMemoryReferenceDirectory {
    async fn find_site(&self, id: &SiteId) -> Result<Option<Site>, RepositoryError> {
        Ok(self.sites.iter().find(|site| &site.id == id).cloned())
    }

    async fn find_pit(&self, id: &PitId) -> Result<Option<Pit>, RepositoryError> {
        Ok(self.pits.iter().find(|pit| &pit.id == id).cloned())
    }

    async fn find_block(&self, id: &BlockId) -> Result<Option<Block>, RepositoryError> {
        Ok(self.blocks.iter().find(|block| &block.id == id).cloned())
    }

    async fn list_pits(&self, site_id: &SiteId) -> Result<Vec<Pit>, RepositoryError> {
        let mut pits: Vec<Pit> =
            self.pits.iter().filter(|pit| &pit.site_id == site_id).cloned().collect();
        pits.sort_by(|left, right| left.code.cmp(&right.code));
        Ok(pits)
    }

    async fn list_blocks(&self, pit_id: &PitId) -> Result<Vec<Block>, RepositoryError> {
        let mut blocks: Vec<Block> =
            self.blocks.iter().filter(|block| &block.pit_id == pit_id).cloned().collect();
        blocks.sort_by(|left, right| left.code.cmp(&right.code));
        Ok(blocks)
    }
}

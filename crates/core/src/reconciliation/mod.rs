//! Contractor vs. surveyor block reconciliation.
//!
//! The engine joins the two claims on `block_id`, computes the variance per
//! block and classifies it against a threshold. All arithmetic stays in
//! `Decimal`; nothing here mutates claim status.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::claim::{Claim, ClaimId, PartyRole};
use crate::domain::reference::BlockId;
use crate::domain::threshold::{Threshold, ThresholdId};
use crate::errors::DomainError;
use crate::workflow::ClaimEvent;

/// Default floor for the percentage denominator when the contractor figure is zero.
pub const DEFAULT_PERCENT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// The threshold in force for one reconciliation run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub threshold_id: Option<ThresholdId>,
    pub threshold_name: Option<String>,
    pub limit_value: Decimal,
    /// False when no threshold was active and the configured fallback was used.
    pub from_active_threshold: bool,
}

impl ThresholdPolicy {
    pub fn from_active(threshold: &Threshold) -> Self {
        Self {
            threshold_id: Some(threshold.id.clone()),
            threshold_name: Some(threshold.name.clone()),
            limit_value: threshold.limit_value,
            from_active_threshold: true,
        }
    }

    pub fn fallback(limit_value: Decimal) -> Self {
        Self {
            threshold_id: None,
            threshold_name: None,
            limit_value,
            from_active_threshold: false,
        }
    }

    pub fn resolve(active: Option<&Threshold>, fallback_limit: Decimal) -> Self {
        active.map(Self::from_active).unwrap_or_else(|| Self::fallback(fallback_limit))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockComparison {
    pub block_id: BlockId,
    pub bcm_contractor: Decimal,
    pub bcm_surveyor: Option<Decimal>,
    pub selisih_bcm: Option<Decimal>,
    pub selisih_persen: Option<Decimal>,
    pub threshold_limit: Decimal,
    pub within_threshold: bool,
    pub is_surveyed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    AutoApproved,
    NeedsReview,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoApproved => "auto_approved",
            Self::NeedsReview => "needs_review",
        }
    }

    /// The state machine event this recommendation routes the contractor claim with.
    pub fn routing_event(self) -> ClaimEvent {
        match self {
            Self::AutoApproved => ClaimEvent::ReconciledWithinThreshold,
            Self::NeedsReview => ClaimEvent::ReconciledOutsideThreshold,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub contractor_claim_id: ClaimId,
    pub surveyor_claim_id: ClaimId,
    pub threshold: ThresholdPolicy,
    pub comparisons: Vec<BlockComparison>,
    pub unmatched_surveyor_blocks: Vec<BlockId>,
    pub total_bcm_contractor: Decimal,
    pub total_bcm_surveyor: Decimal,
    pub recommendation: Recommendation,
}

impl ReconciliationReport {
    pub fn unsurveyed_blocks(&self) -> impl Iterator<Item = &BlockId> {
        self.comparisons.iter().filter(|c| !c.is_surveyed).map(|c| &c.block_id)
    }

    pub fn blocks_over_threshold(&self) -> impl Iterator<Item = &BlockId> {
        self.comparisons.iter().filter(|c| c.is_surveyed && !c.within_threshold).map(|c| &c.block_id)
    }
}

/// A report pinned to the contractor claim at routing time, so later threshold
/// edits or deletions never change how a past decision was made.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSnapshot {
    pub report: ReconciliationReport,
    pub reconciled_by: String,
    pub reconciled_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconciliationEngine {
    percent_epsilon: Decimal,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self { percent_epsilon: DEFAULT_PERCENT_EPSILON }
    }
}

impl ReconciliationEngine {
    pub fn new(percent_epsilon: Decimal) -> Self {
        let percent_epsilon =
            if percent_epsilon > Decimal::ZERO { percent_epsilon } else { DEFAULT_PERCENT_EPSILON };
        Self { percent_epsilon }
    }

    pub fn percent_epsilon(&self) -> Decimal {
        self.percent_epsilon
    }

    pub fn reconcile(
        &self,
        contractor: &Claim,
        surveyor: &Claim,
        policy: &ThresholdPolicy,
    ) -> Result<ReconciliationReport, DomainError> {
        ensure_pair(contractor, surveyor)?;

        let surveyed: HashMap<&BlockId, Decimal> =
            surveyor.lines.iter().map(|line| (&line.block_id, line.bcm)).collect();

        let comparisons = contractor
            .lines
            .iter()
            .map(|line| {
                self.compare_block(
                    &line.block_id,
                    line.bcm,
                    surveyed.get(&line.block_id).copied(),
                    policy.limit_value,
                )
            })
            .collect::<Result<Vec<BlockComparison>, DomainError>>()?;

        let unmatched_surveyor_blocks: Vec<BlockId> = surveyor
            .lines
            .iter()
            .filter(|line| contractor.line_for(&line.block_id).is_none())
            .map(|line| line.block_id.clone())
            .collect();

        let every_block_clear = comparisons.iter().all(|c| c.is_surveyed && c.within_threshold);
        let recommendation = if every_block_clear
            && unmatched_surveyor_blocks.is_empty()
            && policy.from_active_threshold
        {
            Recommendation::AutoApproved
        } else {
            Recommendation::NeedsReview
        };

        Ok(ReconciliationReport {
            contractor_claim_id: contractor.id.clone(),
            surveyor_claim_id: surveyor.id.clone(),
            threshold: policy.clone(),
            comparisons,
            unmatched_surveyor_blocks,
            total_bcm_contractor: contractor.total_bcm(),
            total_bcm_surveyor: surveyor.total_bcm(),
            recommendation,
        })
    }

    pub fn compare_block(
        &self,
        block_id: &BlockId,
        bcm_contractor: Decimal,
        bcm_surveyor: Option<Decimal>,
        threshold_limit: Decimal,
    ) -> Result<BlockComparison, DomainError> {
        let Some(bcm_surveyor) = bcm_surveyor else {
            return Ok(BlockComparison {
                block_id: block_id.clone(),
                bcm_contractor,
                bcm_surveyor: None,
                selisih_bcm: None,
                selisih_persen: None,
                threshold_limit,
                within_threshold: false,
                is_surveyed: false,
            });
        };

        let out_of_range = || {
            DomainError::validation(
                "lines.bcm",
                format!("variance for block `{block_id}` is outside the representable range"),
            )
        };
        let selisih_bcm = bcm_contractor.checked_sub(bcm_surveyor).ok_or_else(out_of_range)?;
        let denominator = bcm_contractor.max(self.percent_epsilon);
        let selisih_persen = selisih_bcm
            .abs()
            .checked_div(denominator)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .ok_or_else(out_of_range)?
            .normalize();

        Ok(BlockComparison {
            block_id: block_id.clone(),
            bcm_contractor,
            bcm_surveyor: Some(bcm_surveyor),
            selisih_bcm: Some(selisih_bcm),
            selisih_persen: Some(selisih_persen),
            threshold_limit,
            within_threshold: selisih_persen.abs() <= threshold_limit,
            is_surveyed: true,
        })
    }
}

fn ensure_pair(contractor: &Claim, surveyor: &Claim) -> Result<(), DomainError> {
    if contractor.party_role != PartyRole::Contractor {
        return Err(DomainError::mismatch("party_role", contractor.party_role, "contractor expected"));
    }
    if surveyor.party_role != PartyRole::Surveyor {
        return Err(DomainError::mismatch("party_role", "surveyor expected", surveyor.party_role));
    }
    if surveyor.linked_claim_id.as_ref() != Some(&contractor.id) {
        return Err(DomainError::mismatch(
            "linked_claim_id",
            &contractor.id,
            surveyor.linked_claim_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
        ));
    }
    if contractor.site_id != surveyor.site_id {
        return Err(DomainError::mismatch("site_id", &contractor.site_id, &surveyor.site_id));
    }
    if contractor.pit_id != surveyor.pit_id {
        return Err(DomainError::mismatch("pit_id", &contractor.pit_id, &surveyor.pit_id));
    }
    if contractor.period_month != surveyor.period_month {
        return Err(DomainError::mismatch(
            "period_month",
            contractor.period_month,
            surveyor.period_month,
        ));
    }
    if contractor.period_year != surveyor.period_year {
        return Err(DomainError::mismatch(
            "period_year",
            contractor.period_year,
            surveyor.period_year,
        ));
    }
    Ok(())
}

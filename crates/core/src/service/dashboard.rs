use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::claim::{Claim, PartyRole};
use crate::domain::reference::SiteId;
use crate::errors::ApplicationError;
use crate::repository::ClaimFilter;
use crate::service::{ClaimWorkflow, RequestContext};
use crate::workflow::ClaimStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub site_id: Option<SiteId>,
    pub claims_by_status: BTreeMap<String, usize>,
    pub contractor_claims: usize,
    pub surveyor_claims: usize,
    pub awaiting_managerial: usize,
    pub awaiting_finance: usize,
    /// Sum over contractor claims that are neither superseded nor rejected.
    pub total_bcm_claimed: Decimal,
    pub total_bcm_certifiable: Decimal,
}

impl DashboardSummary {
    pub fn from_claims(site_id: Option<SiteId>, claims: &[Claim]) -> Self {
        let mut claims_by_status: BTreeMap<String, usize> =
            ClaimStatus::ALL.iter().map(|status| (status.as_str().to_owned(), 0)).collect();
        let mut summary = Self {
            site_id,
            claims_by_status: BTreeMap::new(),
            contractor_claims: 0,
            surveyor_claims: 0,
            awaiting_managerial: 0,
            awaiting_finance: 0,
            total_bcm_claimed: Decimal::ZERO,
            total_bcm_certifiable: Decimal::ZERO,
        };

        for claim in claims {
            *claims_by_status.entry(claim.status.as_str().to_owned()).or_default() += 1;

            match claim.party_role {
                PartyRole::Surveyor => summary.surveyor_claims += 1,
                PartyRole::Contractor => {
                    summary.contractor_claims += 1;
                    match claim.status {
                        ClaimStatus::NeedsReview => summary.awaiting_managerial += 1,
                        ClaimStatus::ApprovedManagerial => summary.awaiting_finance += 1,
                        _ => {}
                    }
                    if claim.status != ClaimStatus::Superseded && !claim.status.is_rejected() {
                        summary.total_bcm_claimed += claim.total_bcm();
                    }
                    if claim.status.is_certifiable() {
                        summary.total_bcm_certifiable += claim.total_bcm();
                    }
                }
            }
        }

        summary.claims_by_status = claims_by_status;
        summary
    }
}

impl ClaimWorkflow {
    pub async fn dashboard(
        &self,
        ctx: &RequestContext,
        site_id: Option<SiteId>,
    ) -> Result<DashboardSummary, ApplicationError> {
        let filter = ClaimFilter { site_id: site_id.clone(), ..ClaimFilter::default() };
        let claims = self.list_claims(ctx, filter).await?;
        Ok(DashboardSummary::from_claims(site_id, &claims))
    }
}

//! End-of-month certificate assembly.
//!
//! Assembly is pure: the caller loads the claim, its reference data and the
//! signature ledger, and gets back a read-only [`Certificate`] for a renderer.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::claim::{Claim, ClaimId, PartyRole};
use crate::domain::identity::Role;
use crate::domain::reference::{Block, BlockId, Pit, PitId, Site};
use crate::domain::signature::Signature;
use crate::errors::DomainError;
use crate::workflow::ClaimStatus;

/// Signature roles a claim in `status` needs before it can be certified.
pub fn required_signature_roles(status: ClaimStatus) -> &'static [Role] {
    match status {
        ClaimStatus::AutoApproved => &[Role::Surveyor],
        ClaimStatus::ApprovedFinance => &[Role::Surveyor, Role::Managerial, Role::Finance],
        _ => &[],
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SignatureSlot {
    Signed {
        signer_user_id: String,
        signer_name: String,
        digest: String,
        signed_at: DateTime<Utc>,
    },
    NotSigned,
}

impl SignatureSlot {
    fn from_ledger(signature: Option<&Signature>) -> Self {
        match signature {
            Some(signature) => Self::Signed {
                signer_user_id: signature.signer_user_id.clone(),
                signer_name: signature.signer_name.clone(),
                digest: signature.digest.clone(),
                signed_at: signature.signed_at,
            },
            None => Self::NotSigned,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed { .. })
    }
}

/// Prepared by / checked by / approved by.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSignatures {
    pub surveyor: SignatureSlot,
    pub managerial: SignatureSlot,
    pub finance: SignatureSlot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBlock {
    pub block_id: BlockId,
    pub block_name: String,
    pub bcm_contractor: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePit {
    pub pit_id: PitId,
    pub pit_name: String,
    pub pit_code: String,
    pub blocks: Vec<CertificateBlock>,
    pub total_bcm: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub claim_id: ClaimId,
    pub claim_number: String,
    pub status: ClaimStatus,
    pub site_name: String,
    pub site_code: String,
    pub contractor: String,
    pub job_type: String,
    pub period_month: u32,
    pub period_year: i32,
    pub pits: Vec<CertificatePit>,
    pub grand_total_bcm: Decimal,
    pub signatures: CertificateSignatures,
    pub content_digest: String,
    pub assembled_at: DateTime<Utc>,
}

/// Everything the assembler reads. Blocks and pits missing from the reference
/// data fall back to their ids for display.
#[derive(Clone, Debug)]
pub struct CertificateInput<'a> {
    pub claim: &'a Claim,
    pub site: &'a Site,
    pub pits: &'a [Pit],
    pub blocks: &'a [Block],
    pub signatures: &'a [Signature],
    pub contractor_name: Option<&'a str>,
    pub assembled_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CertificateAssembler;

impl CertificateAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(&self, input: CertificateInput<'_>) -> Result<Certificate, DomainError> {
        let claim = input.claim;

        if claim.party_role != PartyRole::Contractor {
            return Err(DomainError::Precondition {
                message: format!("claim `{}` is a surveyor claim; certify its contractor claim", claim.id),
                missing: vec!["contractor_claim".to_owned()],
            });
        }
        if !claim.status.is_certifiable() {
            return Err(DomainError::Precondition {
                message: format!(
                    "claim `{}` is `{}`; only auto_approved or approved_finance claims are certified",
                    claim.id, claim.status
                ),
                missing: vec!["status".to_owned()],
            });
        }

        let by_role: HashMap<Role, &Signature> = input
            .signatures
            .iter()
            .filter(|signature| signature.claim_id == claim.id)
            .map(|signature| (signature.role, signature))
            .collect();

        let missing: Vec<String> = required_signature_roles(claim.status)
            .iter()
            .filter(|role| !by_role.contains_key(role))
            .map(|role| format!("signature:{role}"))
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::Precondition {
                message: format!("claim `{}` is missing required signatures", claim.id),
                missing,
            });
        }

        let pits = group_by_pit(claim, input.pits, input.blocks);
        let grand_total_bcm = pits.iter().map(|pit| pit.total_bcm).sum();
        let signatures = CertificateSignatures {
            surveyor: SignatureSlot::from_ledger(by_role.get(&Role::Surveyor).copied()),
            managerial: SignatureSlot::from_ledger(by_role.get(&Role::Managerial).copied()),
            finance: SignatureSlot::from_ledger(by_role.get(&Role::Finance).copied()),
        };

        let mut certificate = Certificate {
            claim_id: claim.id.clone(),
            claim_number: claim.claim_number.clone(),
            status: claim.status,
            site_name: input.site.name.clone(),
            site_code: input.site.code.clone(),
            contractor: input.contractor_name.unwrap_or(&claim.created_by).to_owned(),
            job_type: claim.job_type.clone(),
            period_month: claim.period_month,
            period_year: claim.period_year,
            pits,
            grand_total_bcm,
            signatures,
            content_digest: String::new(),
            assembled_at: input.assembled_at,
        };
        certificate.content_digest = content_digest(&certificate);
        Ok(certificate)
    }
}

fn group_by_pit(claim: &Claim, pits: &[Pit], blocks: &[Block]) -> Vec<CertificatePit> {
    let blocks_by_id: HashMap<&BlockId, &Block> = blocks.iter().map(|block| (&block.id, block)).collect();
    let pits_by_id: HashMap<&PitId, &Pit> = pits.iter().map(|pit| (&pit.id, pit)).collect();

    // BTreeMap keeps the pit order stable across runs.
    let mut grouped: BTreeMap<PitId, Vec<CertificateBlock>> = BTreeMap::new();
    for line in &claim.lines {
        let reference = blocks_by_id.get(&line.block_id);
        let pit_id = reference.map(|block| block.pit_id.clone()).unwrap_or_else(|| claim.pit_id.clone());
        grouped.entry(pit_id).or_default().push(CertificateBlock {
            block_id: line.block_id.clone(),
            block_name: reference.map(|block| block.name.clone()).unwrap_or_else(|| line.block_id.0.clone()),
            bcm_contractor: line.bcm,
        });
    }

    grouped
        .into_iter()
        .map(|(pit_id, blocks)| {
            let pit = pits_by_id.get(&pit_id);
            CertificatePit {
                pit_name: pit.map(|pit| pit.name.clone()).unwrap_or_else(|| pit_id.0.clone()),
                pit_code: pit.map(|pit| pit.code.clone()).unwrap_or_default(),
                total_bcm: blocks.iter().map(|block| block.bcm_contractor).sum(),
                blocks,
                pit_id,
            }
        })
        .collect()
}

fn content_digest(certificate: &Certificate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(certificate.claim_id.0.as_bytes());
    hasher.update(b"\n");
    hasher.update(certificate.claim_number.as_bytes());
    hasher.update(b"\n");
    hasher.update(format!("{:04}-{:02}", certificate.period_year, certificate.period_month).as_bytes());
    for pit in &certificate.pits {
        hasher.update(b"\npit:");
        hasher.update(pit.pit_id.0.as_bytes());
        for block in &pit.blocks {
            hasher.update(format!("\n{}={}", block.block_id, block.bcm_contractor.normalize()).as_bytes());
        }
    }
    hasher.update(format!("\ntotal={}", certificate.grand_total_bcm.normalize()).as_bytes());
    for slot in [
        &certificate.signatures.surveyor,
        &certificate.signatures.managerial,
        &certificate.signatures.finance,
    ] {
        match slot {
            SignatureSlot::Signed { digest, .. } => hasher.update(format!("\nsig:{digest}").as_bytes()),
            SignatureSlot::NotSigned => hasher.update(b"\nsig:none"),
        }
    }
    format!("{:x}", hasher.finalize())
}

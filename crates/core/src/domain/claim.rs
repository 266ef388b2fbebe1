use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::identity::Role;
use crate::domain::reference::{BlockId, PitId, SiteId};
use crate::errors::DomainError;
use crate::workflow::ClaimStatus;

/// Upper bound for a single line's `bcm` and `amount` (10^15). Keeps derived
/// totals and variance percentages inside `Decimal` range.
pub const MAX_LINE_VALUE: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

impl ClaimId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Contractor,
    Surveyor,
}

impl PartyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contractor => "contractor",
            Self::Surveyor => "surveyor",
        }
    }

    pub fn role(self) -> Role {
        match self {
            Self::Contractor => Role::Contractor,
            Self::Surveyor => Role::Surveyor,
        }
    }

    fn number_prefix(self) -> &'static str {
        match self {
            Self::Contractor => "CTR",
            Self::Surveyor => "SVY",
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contractor" => Ok(Self::Contractor),
            "surveyor" => Ok(Self::Surveyor),
            other => Err(DomainError::validation(
                "party_role",
                format!("unknown party `{other}` (expected contractor|surveyor)"),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub material_name: String,
}

/// Opaque handle to an uploaded evidence file owned by the file-storage collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLine {
    pub block_id: BlockId,
    pub bcm: Decimal,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub note: Option<String>,
    pub materials: Vec<Material>,
    pub evidence_ref: Option<EvidenceRef>,
}

/// Submission payload for a new claim or a new version of an existing one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDraft {
    pub party_role: PartyRole,
    pub site_id: SiteId,
    pub pit_id: PitId,
    pub period_month: u32,
    pub period_year: i32,
    pub job_type: String,
    pub lines: Vec<ClaimLine>,
    pub linked_claim_id: Option<ClaimId>,
}

impl ClaimDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(1..=12).contains(&self.period_month) {
            return Err(DomainError::validation(
                "period_month",
                format!("{} is outside 1..=12", self.period_month),
            ));
        }
        if !(2000..=9999).contains(&self.period_year) {
            return Err(DomainError::validation(
                "period_year",
                format!("{} is not a four digit year", self.period_year),
            ));
        }
        if self.site_id.0.trim().is_empty() {
            return Err(DomainError::validation("site_id", "must not be blank"));
        }
        if self.pit_id.0.trim().is_empty() {
            return Err(DomainError::validation("pit_id", "must not be blank"));
        }
        if self.job_type.trim().is_empty() {
            return Err(DomainError::validation("job_type", "must not be blank"));
        }

        match (self.party_role, &self.linked_claim_id) {
            (PartyRole::Surveyor, None) => {
                return Err(DomainError::validation(
                    "linked_claim_id",
                    "a surveyor claim must reference the contractor claim it reconciles",
                ));
            }
            (PartyRole::Contractor, Some(_)) => {
                return Err(DomainError::validation(
                    "linked_claim_id",
                    "a contractor claim cannot reference another claim",
                ));
            }
            _ => {}
        }

        validate_lines(&self.lines)
    }
}

fn validate_lines(lines: &[ClaimLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation("lines", "a claim needs at least one block line"));
    }

    let mut seen = HashSet::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if line.block_id.0.trim().is_empty() {
            return Err(DomainError::validation(
                format!("lines[{index}].block_id"),
                "must not be blank",
            ));
        }
        if !seen.insert(&line.block_id) {
            return Err(DomainError::validation(
                format!("lines[{index}].block_id"),
                format!("block `{}` appears more than once", line.block_id),
            ));
        }
        check_line_value(index, "bcm", line.bcm)?;
        check_line_value(index, "amount", line.amount)?;
        if line.materials.iter().any(|material| material.material_name.trim().is_empty()) {
            return Err(DomainError::validation(
                format!("lines[{index}].materials"),
                "material names must not be blank",
            ));
        }
    }

    Ok(())
}

fn check_line_value(index: usize, field: &str, value: Decimal) -> Result<(), DomainError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DomainError::validation(
            format!("lines[{index}].{field}"),
            format!("{value} must not be negative"),
        ));
    }
    if value > MAX_LINE_VALUE {
        return Err(DomainError::validation(
            format!("lines[{index}].{field}"),
            format!("{value} exceeds the per-line maximum of {MAX_LINE_VALUE}"),
        ));
    }
    Ok(())
}

/// The claim aggregate root. Lines are immutable once stored; edits produce a new version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub claim_number: String,
    pub version: u32,
    pub supersedes: Option<ClaimId>,
    pub party_role: PartyRole,
    pub site_id: SiteId,
    pub pit_id: PitId,
    pub period_month: u32,
    pub period_year: i32,
    pub job_type: String,
    pub lines: Vec<ClaimLine>,
    pub status: ClaimStatus,
    pub linked_claim_id: Option<ClaimId>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl Claim {
    pub fn submit(
        draft: ClaimDraft,
        claim_number: String,
        created_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        draft.validate()?;

        Ok(Self {
            id: ClaimId::generate(),
            claim_number,
            version: 1,
            supersedes: None,
            party_role: draft.party_role,
            site_id: draft.site_id,
            pit_id: draft.pit_id,
            period_month: draft.period_month,
            period_year: draft.period_year,
            job_type: draft.job_type,
            lines: draft.lines,
            status: ClaimStatus::Submitted,
            linked_claim_id: draft.linked_claim_id,
            created_at,
            created_by: created_by.into(),
        })
    }

    /// Builds the next version of `self` from an edited draft.
    pub fn next_version(
        &self,
        draft: ClaimDraft,
        created_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if draft.party_role != self.party_role {
            return Err(DomainError::validation(
                "party_role",
                format!("a {} claim cannot be resubmitted as {}", self.party_role, draft.party_role),
            ));
        }

        let mut next = Self::submit(
            draft,
            versioned_number(&self.claim_number, self.version + 1),
            created_by,
            created_at,
        )?;
        next.version = self.version + 1;
        next.supersedes = Some(self.id.clone());
        Ok(next)
    }

    pub fn total_bcm(&self) -> Decimal {
        self.lines.iter().map(|line| line.bcm).sum()
    }

    pub fn total_amount(&self) -> Decimal {
        self.lines.iter().map(|line| line.amount).sum()
    }

    pub fn line_for(&self, block_id: &BlockId) -> Option<&ClaimLine> {
        self.lines.iter().find(|line| &line.block_id == block_id)
    }
}

/// `CTR-202405-KTB-0007` style numbers; sequence is one-based.
pub fn format_claim_number(
    party_role: PartyRole,
    period_year: i32,
    period_month: u32,
    site_code: &str,
    sequence: usize,
) -> String {
    format!(
        "{}-{period_year:04}{period_month:02}-{}-{sequence:04}",
        party_role.number_prefix(),
        site_code.trim().to_ascii_uppercase()
    )
}

fn versioned_number(claim_number: &str, version: u32) -> String {
    let base = claim_number.split_once("/v").map(|(base, _)| base).unwrap_or(claim_number);
    format!("{base}/v{version}")
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{
        format_claim_number, Claim, ClaimDraft, ClaimId, ClaimLine, Material, PartyRole,
        MAX_LINE_VALUE,
    };
    use crate::domain::reference::{BlockId, PitId, SiteId};
    use crate::errors::DomainError;
    use crate::workflow::ClaimStatus;

    fn line(block: &str, bcm: i64) -> ClaimLine {
        ClaimLine {
            block_id: BlockId(block.to_owned()),
            bcm: Decimal::new(bcm, 0),
            amount: Decimal::new(bcm * 25_000, 0),
            date: NaiveDate::from_ymd_opt(2024, 5, 14).expect("valid date"),
            note: None,
            materials: vec![Material { material_name: "overburden".to_owned() }],
            evidence_ref: None,
        }
    }

    fn draft(lines: Vec<ClaimLine>) -> ClaimDraft {
        ClaimDraft {
            party_role: PartyRole::Contractor,
            site_id: SiteId("site-ktb".to_owned()),
            pit_id: PitId("pit-1".to_owned()),
            period_month: 5,
            period_year: 2024,
            job_type: "overburden removal".to_owned(),
            lines,
            linked_claim_id: None,
        }
    }

    #[test]
    fn total_bcm_is_derived_from_lines() {
        let claim = Claim::submit(
            draft(vec![line("B-1", 100), line("B-2", 45)]),
            "CTR-202405-KTB-0001".to_owned(),
            "contractor-1",
            Utc::now(),
        )
        .expect("valid claim");

        assert_eq!(claim.total_bcm(), Decimal::new(145, 0));
        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert_eq!(claim.version, 1);
    }

    #[test]
    fn rejects_empty_lines() {
        let error = draft(Vec::new()).validate().expect_err("empty lines");
        assert!(matches!(error, DomainError::Validation { ref field, .. } if field == "lines"));
    }

    #[test]
    fn rejects_duplicate_blocks() {
        let error =
            draft(vec![line("B-1", 10), line("B-1", 20)]).validate().expect_err("duplicate block");
        assert!(
            matches!(error, DomainError::Validation { ref field, .. } if field == "lines[1].block_id")
        );
    }

    #[test]
    fn rejects_out_of_range_period() {
        let mut invalid = draft(vec![line("B-1", 10)]);
        invalid.period_month = 13;
        let error = invalid.validate().expect_err("month 13");
        assert!(matches!(error, DomainError::Validation { ref field, .. } if field == "period_month"));
    }

    #[test]
    fn negative_zero_figures_are_accepted() {
        let mut zeroed = line("B-1", 0);
        zeroed.bcm = Decimal::ZERO;
        zeroed.bcm.set_sign_negative(true);
        zeroed.amount = zeroed.bcm;

        assert!(draft(vec![zeroed]).validate().is_ok());
        let error = draft(vec![line("B-1", -1)]).validate().expect_err("negative bcm");
        assert!(matches!(error, DomainError::Validation { ref field, .. } if field == "lines[0].bcm"));
    }

    #[test]
    fn rejects_line_values_above_the_maximum() {
        let mut oversized = line("B-1", 10);
        oversized.bcm = Decimal::from_i128_with_scale(10_i128.pow(23), 0);
        let error = draft(vec![line("B-0", 5), oversized]).validate().expect_err("huge bcm");
        assert!(matches!(error, DomainError::Validation { ref field, .. } if field == "lines[1].bcm"));

        let mut at_limit = line("B-1", 10);
        at_limit.bcm = MAX_LINE_VALUE;
        at_limit.amount = MAX_LINE_VALUE;
        assert!(draft(vec![at_limit]).validate().is_ok());
    }

    #[test]
    fn surveyor_claim_requires_link() {
        let mut surveyor = draft(vec![line("B-1", 10)]);
        surveyor.party_role = PartyRole::Surveyor;
        assert!(surveyor.validate().is_err());

        surveyor.linked_claim_id = Some(ClaimId("c-1".to_owned()));
        assert!(surveyor.validate().is_ok());
    }

    #[test]
    fn next_version_links_back_to_prior() {
        let first = Claim::submit(
            draft(vec![line("B-1", 100)]),
            "CTR-202405-KTB-0001".to_owned(),
            "contractor-1",
            Utc::now(),
        )
        .expect("valid claim");

        let second =
            first.next_version(draft(vec![line("B-1", 96)]), "contractor-1", Utc::now()).expect("v2");
        let third =
            second.next_version(draft(vec![line("B-1", 97)]), "contractor-1", Utc::now()).expect("v3");

        assert_eq!(second.version, 2);
        assert_eq!(second.supersedes.as_ref(), Some(&first.id));
        assert_eq!(second.claim_number, "CTR-202405-KTB-0001/v2");
        assert_eq!(third.claim_number, "CTR-202405-KTB-0001/v3");
    }

    #[test]
    fn claim_number_is_zero_padded() {
        assert_eq!(
            format_claim_number(PartyRole::Surveyor, 2024, 3, "ktb", 12),
            "SVY-202403-KTB-0012"
        );
    }
}

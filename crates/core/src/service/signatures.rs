use tracing::info;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome};
use crate::certificate::{Certificate, CertificateInput};
use crate::domain::claim::{ClaimId, PartyRole};
use crate::domain::identity::Role;
use crate::domain::signature::{Signature, SignatureSource};
use crate::errors::{ApplicationError, DomainError};
use crate::service::{ClaimWorkflow, RequestContext};
use crate::workflow::ClaimStatus;

impl ClaimWorkflow {
    /// The actor must hold `role`. Replaces any earlier signature for the same role.
    pub async fn submit_signature(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
        role: Role,
        source: SignatureSource,
    ) -> Result<Signature, ApplicationError> {
        ctx.actor.require(role)?;
        let claim = self.load_claim(claim_id).await?;

        if claim.party_role != PartyRole::Contractor {
            return Err(DomainError::validation(
                "claim_id",
                "signatures are collected on the contractor claim",
            )
            .into());
        }
        if claim.status == ClaimStatus::Superseded || claim.status.is_rejected() {
            return Err(DomainError::conflict(
                "claim",
                claim.id.0.clone(),
                format!("claim is `{}` and no longer accepts signatures", claim.status),
            )
            .into());
        }

        let signature = Signature::new(
            claim.id.clone(),
            role,
            source,
            ctx.actor.user_id.clone(),
            ctx.actor.name(),
            self.now(),
        )?;
        self.signatures.put(signature.clone()).await?;

        self.audit.emit(
            AuditEvent::new(
                &ctx.audit(Some(&claim.id)),
                "signature.submitted",
                AuditCategory::Signature,
                AuditOutcome::Success,
            )
            .with_metadata("role", role.as_str())
            .with_metadata("digest", signature.digest.clone()),
        );
        info!(
            event_name = "signature.submitted",
            correlation_id = %ctx.correlation_id,
            claim_id = %claim.id,
            role = role.as_str(),
            "signature stored"
        );
        Ok(signature)
    }

    pub async fn get_signature(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
        role: Role,
    ) -> Result<Option<Signature>, ApplicationError> {
        let claim = self.load_visible_claim(ctx, claim_id).await?;
        Ok(self.signatures.get(&claim.id, role).await?)
    }

    pub async fn list_signatures(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
    ) -> Result<Vec<Signature>, ApplicationError> {
        let claim = self.load_visible_claim(ctx, claim_id).await?;
        Ok(self.signatures.list(&claim.id).await?)
    }

    /// Builds the certificate without writing anything.
    pub async fn assemble_certificate(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
    ) -> Result<Certificate, ApplicationError> {
        let claim = self.load_visible_claim(ctx, claim_id).await?;
        let site = self
            .references
            .find_site(&claim.site_id)
            .await?
            .ok_or_else(|| DomainError::not_found("site", claim.site_id.0.clone()))?;

        let pits = self.references.list_pits(&site.id).await?;
        let mut blocks = Vec::new();
        for pit in &pits {
            blocks.extend(self.references.list_blocks(&pit.id).await?);
        }
        let signatures = self.signatures.list(&claim.id).await?;

        let assembled = self.assembler.assemble(CertificateInput {
            claim: &claim,
            site: &site,
            pits: &pits,
            blocks: &blocks,
            signatures: &signatures,
            contractor_name: None,
            assembled_at: self.now(),
        });

        let audit = ctx.audit(Some(&claim.id));
        match assembled {
            Ok(certificate) => {
                self.audit.emit(
                    AuditEvent::new(&audit, "certificate.assembled", AuditCategory::Certificate, AuditOutcome::Success)
                        .with_metadata("content_digest", certificate.content_digest.clone()),
                );
                info!(
                    event_name = "certificate.assembled",
                    correlation_id = %ctx.correlation_id,
                    claim_id = %claim.id,
                    grand_total_bcm = %certificate.grand_total_bcm,
                    "certificate assembled"
                );
                Ok(certificate)
            }
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(&audit, "certificate.refused", AuditCategory::Certificate, AuditOutcome::Rejected)
                        .with_metadata("error_kind", error.kind())
                        .with_metadata("error", error.to_string()),
                );
                Err(error.into())
            }
        }
    }
}

use tracing::info;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome};
use crate::domain::identity::Role;
use crate::domain::threshold::{Threshold, ThresholdId, ThresholdInput, ThresholdUpdate};
use crate::errors::{ApplicationError, DomainError};
use crate::service::{ClaimWorkflow, RequestContext};

impl ClaimWorkflow {
    pub async fn list_thresholds(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Vec<Threshold>, ApplicationError> {
        Ok(self.thresholds.list().await?)
    }

    pub async fn active_threshold(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Option<Threshold>, ApplicationError> {
        Ok(self.thresholds.get_active().await?)
    }

    pub async fn create_threshold(
        &self,
        ctx: &RequestContext,
        input: ThresholdInput,
    ) -> Result<Threshold, ApplicationError> {
        ctx.actor.require(Role::Admin)?;
        let threshold = Threshold::create(input, self.now())?;
        self.thresholds.insert(threshold.clone()).await?;

        self.record_threshold_event(ctx, "threshold.created", &threshold);
        Ok(threshold)
    }

    pub async fn update_threshold(
        &self,
        ctx: &RequestContext,
        id: &ThresholdId,
        update: ThresholdUpdate,
    ) -> Result<Threshold, ApplicationError> {
        ctx.actor.require(Role::Admin)?;
        let current = self.load_threshold(id).await?;
        let activation = update.active;
        let updated = current.apply(update, self.now())?;
        let stored = self.thresholds.update(updated, activation).await?;

        self.record_threshold_event(ctx, "threshold.updated", &stored);
        Ok(stored)
    }

    /// Activating deactivates every other threshold; deactivating the active one
    /// leaves the registry with none.
    pub async fn set_threshold_active(
        &self,
        ctx: &RequestContext,
        id: &ThresholdId,
        active: bool,
    ) -> Result<Threshold, ApplicationError> {
        ctx.actor.require(Role::Admin)?;
        let threshold = self.thresholds.set_active(id, active, self.now()).await?;

        let event = if active { "threshold.activated" } else { "threshold.deactivated" };
        self.record_threshold_event(ctx, event, &threshold);
        Ok(threshold)
    }

    /// Refused while a claim awaiting review was routed under this threshold.
    pub async fn delete_threshold(
        &self,
        ctx: &RequestContext,
        id: &ThresholdId,
    ) -> Result<(), ApplicationError> {
        ctx.actor.require(Role::Admin)?;
        let threshold = self.load_threshold(id).await?;

        let pinned = self.claims.count_reviews_pinned_to(id).await?;
        if pinned > 0 {
            return Err(DomainError::conflict(
                "threshold",
                id.0.clone(),
                format!("{pinned} claim(s) awaiting review were reconciled under it"),
            )
            .into());
        }

        self.thresholds.delete(id).await?;
        self.record_threshold_event(ctx, "threshold.deleted", &threshold);
        Ok(())
    }

    async fn load_threshold(&self, id: &ThresholdId) -> Result<Threshold, ApplicationError> {
        self.thresholds
            .find(id)
            .await?
            .ok_or_else(|| DomainError::not_found("threshold", id.0.clone()).into())
    }

    fn record_threshold_event(&self, ctx: &RequestContext, event_name: &str, threshold: &Threshold) {
        self.audit.emit(
            AuditEvent::new(&ctx.audit(None), event_name, AuditCategory::Threshold, AuditOutcome::Success)
                .with_metadata("threshold_id", threshold.id.0.clone())
                .with_metadata("limit_value", threshold.limit_value.to_string())
                .with_metadata("active", threshold.active.to_string()),
        );
        info!(
            event_name,
            correlation_id = %ctx.correlation_id,
            threshold_id = %threshold.id,
            limit_value = %threshold.limit_value,
            active = threshold.active,
            "threshold registry changed"
        );
    }
}

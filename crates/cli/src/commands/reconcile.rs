use overburden_core::service::ReconciliationView;
use overburden_core::{ClaimId, ClaimWorkflow};
use overburden_db::sql_repositories;

use crate::commands::{finish, open_pool, operator_context, prepare, workflow_failure, CommandResult};

/// Prints the current and pinned comparison for a contractor claim. Read-only.
pub fn run(claim_id: String) -> CommandResult {
    let (config, runtime) = match prepare("reconcile") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let workflow = ClaimWorkflow::new(sql_repositories(pool.clone()))
            .with_reconciliation(&config.reconciliation);

        let view = workflow
            .reconcile(&operator_context(), &ClaimId(claim_id))
            .await
            .map_err(workflow_failure);

        pool.close().await;
        view
    });

    finish("reconcile", result, |view| {
        let message = summary(&view);
        CommandResult::success_with_data("reconcile", message, view)
    })
}

fn summary(view: &ReconciliationView) -> String {
    let claim = &view.contractor_claim;
    let Some(current) = &view.current else {
        return format!("claim {} is `{}`; no surveyor claim to compare yet", claim.claim_number, claim.status);
    };

    let over = current.blocks_over_threshold().count();
    let unsurveyed = current.unsurveyed_blocks().count();
    let mut message = format!(
        "claim {} is `{}`; current comparison recommends {} at limit {}% ({over} over threshold, {unsurveyed} unsurveyed)",
        claim.claim_number,
        claim.status,
        current.recommendation.as_str(),
        current.threshold.limit_value,
    );

    if let Some(pinned) = &view.pinned {
        if pinned.report.threshold.limit_value != current.threshold.limit_value {
            message.push_str(&format!(
                "; routed at limit {}%",
                pinned.report.threshold.limit_value
            ));
        }
    }
    message
}

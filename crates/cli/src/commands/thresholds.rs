use overburden_core::{ClaimWorkflow, Threshold, ThresholdId};
use overburden_db::sql_repositories;

use crate::commands::{finish, open_pool, operator_context, prepare, workflow_failure, CommandResult};

/// Lists the registry, optionally activating one threshold first.
pub fn run(activate: Option<String>) -> CommandResult {
    let (config, runtime) = match prepare("thresholds") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let workflow = ClaimWorkflow::new(sql_repositories(pool.clone()))
            .with_reconciliation(&config.reconciliation);
        let ctx = operator_context();

        let outcome = async {
            if let Some(id) = activate {
                workflow.set_threshold_active(&ctx, &ThresholdId(id), true).await?;
            }
            workflow.list_thresholds(&ctx).await
        }
        .await
        .map_err(workflow_failure);

        pool.close().await;
        outcome
    });

    finish("thresholds", result, |thresholds| {
        let message = summary(&thresholds);
        CommandResult::success_with_data("thresholds", message, thresholds)
    })
}

fn summary(thresholds: &[Threshold]) -> String {
    match thresholds.iter().find(|threshold| threshold.active) {
        Some(active) => format!(
            "{} threshold(s); active `{}` ({}) limit {}%",
            thresholds.len(),
            active.id,
            active.name,
            active.limit_value
        ),
        None => format!("{} threshold(s); none active, fallback limit applies", thresholds.len()),
    }
}

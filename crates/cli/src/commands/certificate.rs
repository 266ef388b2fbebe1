use overburden_core::{ClaimId, ClaimWorkflow};
use overburden_db::sql_repositories;

use crate::commands::{finish, open_pool, operator_context, prepare, workflow_failure, CommandResult};

/// Assembles the certificate for a contractor claim. Nothing is written.
pub fn run(claim_id: String) -> CommandResult {
    let (config, runtime) = match prepare("certificate") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let workflow = ClaimWorkflow::new(sql_repositories(pool.clone()));

        let certificate = workflow
            .assemble_certificate(&operator_context(), &ClaimId(claim_id))
            .await
            .map_err(workflow_failure);

        pool.close().await;
        certificate
    });

    finish("certificate", result, |certificate| {
        let message = format!(
            "certificate for {} ({} {}/{}): {} BCM across {} pit(s), digest {}",
            certificate.claim_number,
            certificate.site_code,
            certificate.period_month,
            certificate.period_year,
            certificate.grand_total_bcm,
            certificate.pits.len(),
            certificate.content_digest,
        );
        CommandResult::success_with_data("certificate", message, certificate)
    })
}

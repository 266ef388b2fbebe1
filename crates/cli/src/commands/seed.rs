use overburden_db::{migrations, DemoDataset, SeedResult};

use crate::commands::{finish, open_pool, prepare, CommandResult, Failure};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5))?;

        let seeded = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5))?;
        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6))?;

        pool.close().await;

        if verification.all_present {
            Ok::<SeedResult, Failure>(seeded)
        } else {
            Err(("seed_verification", verification_message(&verification.checks), 6))
        }
    });

    finish("seed", result, |seeded| {
        CommandResult::success(
            "seed",
            format!(
                "demo reference data loaded: {} sites, {} pits, {} blocks; default threshold `{}`",
                seeded.sites, seeded.pits, seeded.blocks, seeded.threshold_id
            ),
        )
    })
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_message_names_failed_checks() {
        let checks = [("site-ktb", true), ("blk-pa-02", false), ("single-active-threshold", false)];

        assert_eq!(
            verification_message(&checks),
            "seed verification failed for checks: blk-pa-02, single-active-threshold"
        );
    }

    #[test]
    fn verification_message_falls_back_to_generic() {
        assert_eq!(verification_message(&[("site-ktb", true)]), "some seed data failed to load");
    }
}

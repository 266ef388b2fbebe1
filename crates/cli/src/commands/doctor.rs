use overburden_core::config::{AppConfig, LoadOptions};
use overburden_db::{connect, DbPool};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["database_connectivity", "schema", "active_threshold"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    // A missing active threshold is a warning: reconciliation still runs on the fallback limit.
    let failed = checks.iter().any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to database: {error}"),
                }];
            }
        };

        let checks = vec![
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            check_schema(&pool).await,
            check_active_threshold(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let present = scalar_count(
        pool,
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
         AND name IN ('claim', 'claim_transition', 'threshold', 'claim_signature')",
    )
    .await;

    match present {
        Ok(4) => DoctorCheck {
            name: "schema",
            status: CheckStatus::Pass,
            details: "workflow tables present".to_string(),
        },
        Ok(count) => DoctorCheck {
            name: "schema",
            status: CheckStatus::Fail,
            details: format!("{count} of 4 workflow tables present; run `overburden migrate`"),
        },
        Err(error) => DoctorCheck { name: "schema", status: CheckStatus::Fail, details: error },
    }
}

async fn check_active_threshold(pool: &DbPool) -> DoctorCheck {
    match scalar_count(pool, "SELECT COUNT(*) FROM threshold WHERE active = 1").await {
        Ok(1) => DoctorCheck {
            name: "active_threshold",
            status: CheckStatus::Pass,
            details: "exactly one threshold is active".to_string(),
        },
        Ok(0) => DoctorCheck {
            name: "active_threshold",
            status: CheckStatus::Warn,
            details: "no active threshold; every claim will need review".to_string(),
        },
        Ok(count) => DoctorCheck {
            name: "active_threshold",
            status: CheckStatus::Fail,
            details: format!("{count} thresholds are marked active"),
        },
        Err(error) => DoctorCheck {
            name: "active_threshold",
            status: CheckStatus::Skipped,
            details: format!("threshold registry unavailable: {error}"),
        },
    }
}

async fn scalar_count(pool: &DbPool, query: &str) -> Result<i64, String> {
    sqlx::query_scalar::<_, i64>(query)
        .fetch_one(pool)
        .await
        .map_err(|error| error.to_string())
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub mod certificate;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod reconcile;
pub mod seed;
pub mod thresholds;

use overburden_core::config::{AppConfig, LoadOptions, LogFormat};
use overburden_core::{Actor, ApplicationError, RequestContext, Role};
use overburden_db::{connect, DbPool};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::render(command, None, message.into(), None, 0)
    }

    /// Success with a structured payload, e.g. a reconciliation view or certificate.
    pub fn success_with_data(command: &str, message: impl Into<String>, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::render(command, None, message.into(), Some(data), 0),
            Err(error) => Self::failure(command, "serialization", error.to_string(), 8),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::render(command, Some(error_class), message.into(), None, exit_code)
    }

    fn render(
        command: &str,
        error_class: Option<&str>,
        message: String,
        data: Option<Value>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: if error_class.is_some() { "error" } else { "ok" }.to_string(),
            error_class: error_class.map(str::to_string),
            message,
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// `(error_class, message, exit_code)` carried out of a command's async block.
pub(crate) type Failure = (&'static str, String, u8);

/// Loads config and builds a single-threaded runtime, or the command's failure result.
pub(crate) fn prepare(command: &str) -> Result<(AppConfig, Runtime), CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(command, "config_validation", format!("configuration issue: {error}"), 2)
    })?;
    init_logging(&config);

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })?;

    Ok((config, runtime))
}

/// Workflow events go to stderr so stdout stays a single JSON payload.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    // Already installed when several commands run in one process.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    connect(&config.database).await.map_err(|error| ("db_connectivity", error.to_string(), 4))
}

/// Workflow failures keep the domain error kind as their class.
pub(crate) fn workflow_failure(error: ApplicationError) -> Failure {
    match &error {
        ApplicationError::Domain(domain) => (domain.kind(), error.to_string(), 7),
        ApplicationError::Persistence(_) => ("persistence", error.to_string(), 4),
        ApplicationError::Configuration(_) => ("config_validation", error.to_string(), 2),
    }
}

/// The operator acting through this CLI.
pub(crate) fn operator_context() -> RequestContext {
    let actor = Actor::new("cli-operator", [Role::Admin]).with_display_name("CLI operator");
    RequestContext::generated(actor)
}

pub(crate) fn finish<T>(
    command: &str,
    result: Result<T, Failure>,
    on_success: impl FnOnce(T) -> CommandResult,
) -> CommandResult {
    let result = match result {
        Ok(value) => on_success(value),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    };
    info!(event_name = "cli.command.completed", command, exit_code = result.exit_code, "command finished");
    result
}

#[cfg(test)]
mod tests {
    use overburden_core::{ApplicationError, DomainError};
    use serde_json::{json, Value};

    use super::{workflow_failure, CommandResult};

    #[test]
    fn failure_payload_carries_error_class() {
        let result = CommandResult::failure("migrate", "db_connectivity", "unreachable", 4);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 4);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "db_connectivity");
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn data_is_embedded_when_present() {
        let result = CommandResult::success_with_data("reconcile", "done", json!({ "blocks": 2 }));
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["error_class"], Value::Null);
        assert_eq!(payload["data"]["blocks"], 2);
    }

    #[test]
    fn domain_errors_map_to_their_kind() {
        let (class, _, code) =
            workflow_failure(ApplicationError::from(DomainError::not_found("claim", "c-1")));
        assert_eq!(class, "not_found");
        assert_eq!(code, 7);

        let (class, _, code) = workflow_failure(ApplicationError::Persistence("locked".into()));
        assert_eq!(class, "persistence");
        assert_eq!(code, 4);
    }
}

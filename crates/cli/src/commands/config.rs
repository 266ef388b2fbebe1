use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use overburden_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

/// One effective setting: dotted key, rendered value and the env override that can set it.
struct Field {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let gateway_token = config
        .server
        .gateway_token
        .as_ref()
        .map(|token| redact_secret(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "database.url",
            value: config.database.url.clone(),
            env_key: "OVERBURDEN_DATABASE_URL",
        },
        Field {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_key: "OVERBURDEN_DATABASE_MAX_CONNECTIONS",
        },
        Field {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_key: "OVERBURDEN_DATABASE_TIMEOUT_SECS",
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_key: "OVERBURDEN_SERVER_BIND_ADDRESS",
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_key: "OVERBURDEN_SERVER_PORT",
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_key: "OVERBURDEN_SERVER_GRACEFUL_SHUTDOWN_SECS",
        },
        Field {
            key: "server.gateway_token",
            value: gateway_token,
            env_key: "OVERBURDEN_SERVER_GATEWAY_TOKEN",
        },
        Field {
            key: "reconciliation.fallback_limit",
            value: config.reconciliation.fallback_limit.to_string(),
            env_key: "OVERBURDEN_RECONCILIATION_FALLBACK_LIMIT",
        },
        Field {
            key: "reconciliation.percent_epsilon",
            value: config.reconciliation.percent_epsilon.to_string(),
            env_key: "OVERBURDEN_RECONCILIATION_PERCENT_EPSILON",
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_key: "OVERBURDEN_LOGGING_LEVEL",
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_key: "OVERBURDEN_LOGGING_FORMAT",
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("overburden.toml"), PathBuf::from("config/overburden.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the first four characters of long secrets so operators can tell tokens apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    match trimmed.chars().count() {
        0 => "<empty>".to_string(),
        1..=11 => "<redacted>".to_string(),
        _ => format!("{}***", trimmed.chars().take(4).collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_never_render_in_full() {
        assert_eq!(redact_secret(""), "<empty>");
        assert_eq!(redact_secret("short"), "<redacted>");
        assert_eq!(redact_secret("gw-0123456789abcdef"), "gw-0***");
    }

    #[test]
    fn dotted_paths_resolve_into_nested_tables() {
        let doc: Value = "[reconciliation]\nfallback_limit = \"2.5\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "reconciliation.fallback_limit"));
        assert!(!contains_path(&doc, "reconciliation.percent_epsilon"));
        assert!(!contains_path(&doc, "server.port"));
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crashdesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "CRASHDESK_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "CRASHDESK_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "CRASHDESK_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "CRASHDESK_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "CRASHDESK_SERVER_PORT"),
    ));

    lines.push(render_line(
        "ingest.link_incidents",
        &config.ingest.link_incidents.to_string(),
        source("ingest.link_incidents", "CRASHDESK_INGEST_LINK_INCIDENTS"),
    ));
    let shared_secret = if config.ingest.shared_secret.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "ingest.shared_secret",
        shared_secret,
        source("ingest.shared_secret", "CRASHDESK_INGEST_SHARED_SECRET"),
    ));

    lines.push(render_line(
        "relay.enabled",
        &config.relay.enabled.to_string(),
        source("relay.enabled", "CRASHDESK_RELAY_ENABLED"),
    ));
    lines.push(render_line(
        "relay.port",
        &config.relay.port.to_string(),
        source("relay.port", "CRASHDESK_RELAY_PORT"),
    ));
    lines.push(render_line(
        "relay.target_url",
        config.relay.target_url.as_deref().unwrap_or("<unset>"),
        source("relay.target_url", "CRASHDESK_RELAY_TARGET_URL"),
    ));

    lines.push(render_line(
        "workflow.webhook_url",
        config.workflow.webhook_url.as_deref().unwrap_or("<unset>"),
        source("workflow.webhook_url", "CRASHDESK_WORKFLOW_WEBHOOK_URL"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "CRASHDESK_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "CRASHDESK_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("crashdesk.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/crashdesk.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub relay: RelayConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub link_incidents: bool,
    pub shared_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub enabled: bool,
    pub port: u16,
    pub target_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub webhook_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub link_incidents: Option<bool>,
    pub ingest_shared_secret: Option<String>,
    pub relay_enabled: Option<bool>,
    pub relay_target_url: Option<String>,
    pub workflow_webhook_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://crashdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            ingest: IngestConfig { link_incidents: true, shared_secret: None },
            relay: RelayConfig { enabled: false, port: 8081, target_url: None },
            workflow: WorkflowConfig { webhook_url: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("crashdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(ingest) = patch.ingest {
            if let Some(link_incidents) = ingest.link_incidents {
                self.ingest.link_incidents = link_incidents;
            }
            if let Some(shared_secret_value) = ingest.shared_secret {
                self.ingest.shared_secret = Some(shared_secret_value.into());
            }
        }

        if let Some(relay) = patch.relay {
            if let Some(enabled) = relay.enabled {
                self.relay.enabled = enabled;
            }
            if let Some(port) = relay.port {
                self.relay.port = port;
            }
            if let Some(target_url) = relay.target_url {
                self.relay.target_url = Some(target_url);
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(webhook_url) = workflow.webhook_url {
                self.workflow.webhook_url = Some(webhook_url);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CRASHDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CRASHDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CRASHDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CRASHDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CRASHDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CRASHDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CRASHDESK_SERVER_PORT") {
            self.server.port = parse_u16("CRASHDESK_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("CRASHDESK_INGEST_LINK_INCIDENTS") {
            self.ingest.link_incidents = parse_bool("CRASHDESK_INGEST_LINK_INCIDENTS", &value)?;
        }
        if let Some(value) = read_env("CRASHDESK_INGEST_SHARED_SECRET") {
            self.ingest.shared_secret = Some(value.into());
        }

        if let Some(value) = read_env("CRASHDESK_RELAY_ENABLED") {
            self.relay.enabled = parse_bool("CRASHDESK_RELAY_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CRASHDESK_RELAY_PORT") {
            self.relay.port = parse_u16("CRASHDESK_RELAY_PORT", &value)?;
        }
        if let Some(value) = read_env("CRASHDESK_RELAY_TARGET_URL") {
            self.relay.target_url = Some(value);
        }

        if let Some(value) = read_env("CRASHDESK_WORKFLOW_WEBHOOK_URL") {
            self.workflow.webhook_url = Some(value);
        }

        let log_level =
            read_env("CRASHDESK_LOGGING_LEVEL").or_else(|| read_env("CRASHDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CRASHDESK_LOGGING_FORMAT").or_else(|| read_env("CRASHDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(link_incidents) = overrides.link_incidents {
            self.ingest.link_incidents = link_incidents;
        }
        if let Some(shared_secret) = overrides.ingest_shared_secret {
            self.ingest.shared_secret = Some(shared_secret.into());
        }
        if let Some(enabled) = overrides.relay_enabled {
            self.relay.enabled = enabled;
        }
        if let Some(target_url) = overrides.relay_target_url {
            self.relay.target_url = Some(target_url);
        }
        if let Some(webhook_url) = overrides.workflow_webhook_url {
            self.workflow.webhook_url = Some(webhook_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_relay(&self.relay, &self.server)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("crashdesk.toml"), PathBuf::from("config/crashdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_relay(relay: &RelayConfig, server: &ServerConfig) -> Result<(), ConfigError> {
    if !relay.enabled {
        return Ok(());
    }

    let target = relay.target_url.as_deref().map(str::trim).unwrap_or_default();
    if target.is_empty() {
        return Err(ConfigError::Validation(
            "relay.target_url is required when relay.enabled is true".to_string(),
        ));
    }
    if !target.starts_with("http://") && !target.starts_with("https://") {
        return Err(ConfigError::Validation(
            "relay.target_url must start with http:// or https://".to_string(),
        ));
    }

    if relay.port == 0 {
        return Err(ConfigError::Validation("relay.port must be greater than zero".to_string()));
    }
    if relay.port == server.port {
        return Err(ConfigError::Validation(
            "relay.port must differ from server.port".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if let Some(webhook_url) = &workflow.webhook_url {
        if !webhook_url.starts_with("http://") && !webhook_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "workflow.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    ingest: Option<IngestPatch>,
    relay: Option<RelayPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct IngestPatch {
    link_incidents: Option<bool>,
    shared_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayPatch {
    enabled: Option<bool>,
    port: Option<u16>,
    target_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

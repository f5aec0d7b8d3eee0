use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::repo::{API_REPOS_BASE_URL, WEB_BASE_URL};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub github: GithubConfig,
    pub relay: RelayConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

impl DatabaseConfig {
    /// Single-connection shared in-memory database, used by tests.
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:?cache=shared".to_string(),
            max_connections: 1,
            timeout_secs: 5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GithubConfig {
    /// Base of the hook management API, scoped to `/repos/`.
    pub api_base_url: String,
    pub web_base_url: String,
    pub user_agent: String,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Externally reachable base URL of this relay; remote hooks are
    /// pointed at `<public_base_url>/webhook`.
    pub public_base_url: String,
    /// Display name notifications fall back to when the payload carries no
    /// sender identity.
    pub bot_alias: String,
}

impl RelayConfig {
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.public_base_url.trim_end_matches('/'))
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub relay_public_base_url: Option<String>,
    pub github_api_base_url: Option<String>,
    pub github_web_base_url: Option<String>,
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
    #[error("unterminated `${{` interpolation in config file")]
    UnterminatedInterpolation,
    #[error("environment override `{key}` has invalid value `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://octorelay.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            github: GithubConfig {
                api_base_url: API_REPOS_BASE_URL.to_string(),
                web_base_url: WEB_BASE_URL.to_string(),
                user_agent: "octorelay".to_string(),
            },
            relay: RelayConfig {
                public_base_url: String::new(),
                bot_alias: "github-relay".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                health_check_port: 8081,
                graceful_shutdown_secs: 15,
            },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("octorelay.toml"));
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

        if let Some(github) = patch.github {
            if let Some(api_base_url) = github.api_base_url {
                self.github.api_base_url = api_base_url;
            }
            if let Some(web_base_url) = github.web_base_url {
                self.github.web_base_url = web_base_url;
            }
            if let Some(user_agent) = github.user_agent {
                self.github.user_agent = user_agent;
            }
        }

        if let Some(relay) = patch.relay {
            if let Some(public_base_url) = relay.public_base_url {
                self.relay.public_base_url = public_base_url;
            }
            if let Some(bot_alias) = relay.bot_alias {
                self.relay.bot_alias = bot_alias;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("OCTORELAY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("OCTORELAY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("OCTORELAY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("OCTORELAY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("OCTORELAY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OCTORELAY_GITHUB_API_BASE_URL") {
            self.github.api_base_url = value;
        }
        if let Some(value) = read_env("OCTORELAY_GITHUB_WEB_BASE_URL") {
            self.github.web_base_url = value;
        }
        if let Some(value) = read_env("OCTORELAY_GITHUB_USER_AGENT") {
            self.github.user_agent = value;
        }

        if let Some(value) = read_env("OCTORELAY_RELAY_PUBLIC_BASE_URL") {
            self.relay.public_base_url = value;
        }
        if let Some(value) = read_env("OCTORELAY_RELAY_BOT_ALIAS") {
            self.relay.bot_alias = value;
        }

        if let Some(value) = read_env("OCTORELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("OCTORELAY_SERVER_PORT") {
            self.server.port = parse_u16("OCTORELAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("OCTORELAY_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("OCTORELAY_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("OCTORELAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("OCTORELAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("OCTORELAY_LOGGING_LEVEL").or_else(|| read_env("OCTORELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OCTORELAY_LOGGING_FORMAT").or_else(|| read_env("OCTORELAY_LOG_FORMAT"));
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
        if let Some(public_base_url) = overrides.relay_public_base_url {
            self.relay.public_base_url = public_base_url;
        }
        if let Some(api_base_url) = overrides.github_api_base_url {
            self.github.api_base_url = api_base_url;
        }
        if let Some(web_base_url) = overrides.github_web_base_url {
            self.github.web_base_url = web_base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_github(&self.github)?;
        validate_relay(&self.relay)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("octorelay.toml"), PathBuf::from("config/octorelay.toml")]
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

fn validate_github(github: &GithubConfig) -> Result<(), ConfigError> {
    for (field, value) in
        [("github.api_base_url", &github.api_base_url), ("github.web_base_url", &github.web_base_url)]
    {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{field} must start with http:// or https://"
            )));
        }
        if !value.ends_with('/') {
            return Err(ConfigError::Validation(format!("{field} must end with a trailing `/`")));
        }
    }

    if github.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "github.user_agent must not be empty (GitHub rejects anonymous requests)".to_string(),
        ));
    }

    Ok(())
}

fn validate_relay(relay: &RelayConfig) -> Result<(), ConfigError> {
    let url = relay.public_base_url.trim();
    if url.is_empty() {
        return Err(ConfigError::Validation(
            "relay.public_base_url is required; remote hooks must be able to reach this relay"
                .to_string(),
        ));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "relay.public_base_url must start with http:// or https://".to_string(),
        ));
    }

    if relay.bot_alias.trim().is_empty() {
        return Err(ConfigError::Validation("relay.bot_alias must not be empty".to_string()));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    github: Option<GithubPatch>,
    relay: Option<RelayPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GithubPatch {
    api_base_url: Option<String>,
    web_base_url: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayPatch {
    public_base_url: Option<String>,
    bot_alias: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use super::{
        interpolate_env_vars, AppConfig, ConfigError, ConfigOverrides, ConfigPatch, LoadOptions,
        LogFormat,
    };

    fn valid_overrides() -> ConfigOverrides {
        ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            relay_public_base_url: Some("https://chat.example.com/api/apps/github".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn load_fails_without_public_base_url() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("validation error").to_string();
        assert!(message.contains("relay.public_base_url"));
    }

    #[test]
    fn load_succeeds_with_overrides_and_defaults() {
        let config = AppConfig::load(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .expect("config should validate");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.github.api_base_url, "https://api.github.com/repos/");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn webhook_url_joins_without_doubled_slash() {
        let mut config = AppConfig::default();
        config.relay.public_base_url = "https://relay.example.com/".to_string();
        assert_eq!(config.relay.webhook_url(), "https://relay.example.com/webhook");

        config.relay.public_base_url = "https://relay.example.com".to_string();
        assert_eq!(config.relay.webhook_url(), "https://relay.example.com/webhook");
    }

    #[test]
    fn toml_patch_overrides_selected_fields_only() {
        let patch: ConfigPatch = toml::from_str(
            r#"
            [relay]
            public_base_url = "https://relay.example.com"

            [github]
            user_agent = "octorelay-test"

            [logging]
            format = "json"
            "#,
        )
        .expect("patch should parse");

        let mut config = AppConfig::default();
        config.apply_patch(patch);

        assert_eq!(config.relay.public_base_url, "https://relay.example.com");
        assert_eq!(config.github.user_agent, "octorelay-test");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.server.port, 8080, "untouched sections keep defaults");
    }

    #[test]
    fn interpolation_requires_terminated_braces() {
        let result = interpolate_env_vars("token = \"${UNTERMINATED");
        assert!(matches!(result, Err(ConfigError::UnterminatedInterpolation)));
    }

    #[test]
    fn interpolation_fails_for_missing_variable() {
        let result = interpolate_env_vars("url = \"${OCTORELAY_TEST_DOES_NOT_EXIST}\"");
        assert!(matches!(result, Err(ConfigError::MissingEnvInterpolation { .. })));
    }

    #[test]
    fn api_base_url_must_carry_trailing_slash() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.relay.public_base_url = "https://relay.example.com".to_string();
        config.github.api_base_url = "https://api.github.com/repos".to_string();

        let message = config.validate().err().expect("validation error").to_string();
        assert!(message.contains("github.api_base_url"));
    }

    #[test]
    fn log_format_parses_known_values_only() {
        assert_eq!("json".parse::<LogFormat>().expect("valid"), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}

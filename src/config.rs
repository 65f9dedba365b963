//! Service configuration.
//!
//! A `ServiceConfig` is assembled once at startup and shared by reference with
//! every request. Layers, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a JSON config file (`--config`, `INVENTORY_ENRICH_CONFIG`, or
//!    `<config dir>/inventory-enrich/config.json` when present)
//! 3. environment variables (`.env` is loaded by the binary beforehand)
//! 4. command-line overrides
//!
//! Secrets only ever come from the environment and are never serialized.
use crate::enrich::{default_targets, TargetColumn, DEFAULT_ROW_LIMIT};
use crate::lm::command::parse_command;
use crate::service::OutputMode;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Upper bound for `row_limit`, regardless of configuration.
pub const MAX_ROW_LIMIT: usize = 10_000;

pub const CONFIG_PATH_ENV: &str = "INVENTORY_ENRICH_CONFIG";
pub const BIND_ENV: &str = "INVENTORY_ENRICH_BIND";
pub const ROW_LIMIT_ENV: &str = "INVENTORY_ENRICH_ROW_LIMIT";
pub const LM_COMMAND_ENV: &str = "INVENTORY_ENRICH_LM_COMMAND";
pub const MODEL_ENV: &str = "INVENTORY_ENRICH_MODEL";
pub const DATA_DIR_ENV: &str = "INVENTORY_ENRICH_DATA_DIR";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const GOOGLE_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const DEFAULT_SYSTEM_PROMPT: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/system.md"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub row_limit: usize,
    pub default_mode: OutputMode,
    pub targets: Vec<TargetColumn>,
    pub model: ModelConfig,
    pub store: StoreConfig,
    /// JSONL audit trail of per-cell outcomes; disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_log: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            row_limit: DEFAULT_ROW_LIMIT,
            default_mode: OutputMode::default(),
            targets: default_targets(),
            model: ModelConfig::OpenAi(OpenAiConfig::default()),
            store: StoreConfig::Local(LocalStoreConfig::default()),
            cell_log: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ModelConfig {
    #[serde(rename = "openai")]
    OpenAi(OpenAiConfig),
    Command(CommandConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.trim().to_string(),
            max_tokens: 200,
            temperature: None,
            timeout_secs: 60,
            max_retries: 2,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Local(LocalStoreConfig),
    Drive(DriveStoreConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStoreConfig {
    pub root: PathBuf,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveStoreConfig {
    pub api_base: String,
    pub upload_base: String,
    /// Grant "anyone with the link" read access to uploaded files.
    pub share_publicly: bool,
    /// Command printing an OAuth access token, used when the env var is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_command: Option<String>,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for DriveStoreConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
            share_publicly: true,
            token_command: None,
            timeout_secs: 120,
            access_token: None,
        }
    }
}

/// Command-line values that win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<SocketAddr>,
    pub row_limit: Option<usize>,
    pub lm_command: Option<String>,
}

/// Assemble the effective config from all layers. Does not validate.
pub fn load_config(explicit: Option<&Path>, overrides: &ConfigOverrides) -> Result<ServiceConfig> {
    let env = |key: &str| std::env::var(key).ok();
    let mut config = match resolve_config_path(explicit, &env) {
        Some(path) => read_config_file(&path)?,
        None => ServiceConfig::default(),
    };
    apply_env(&mut config, &env)?;
    apply_overrides(&mut config, overrides);
    Ok(config)
}

/// Explicit path, then the env var, then the per-user file if it exists.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("inventory-enrich").join("config.json"))
        .filter(|path| path.is_file())
}

pub fn read_config_file(path: &Path) -> Result<ServiceConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: ServiceConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

/// Apply environment variables through `env`, which returns a variable's value.
pub fn apply_env(config: &mut ServiceConfig, env: &dyn Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(raw) = env(BIND_ENV) {
        config.bind = raw
            .trim()
            .parse()
            .with_context(|| format!("parse {BIND_ENV}={raw:?}"))?;
    }
    if let Some(raw) = env(ROW_LIMIT_ENV) {
        config.row_limit = raw
            .trim()
            .parse()
            .with_context(|| format!("parse {ROW_LIMIT_ENV}={raw:?}"))?;
    }
    if let Some(command) = env(LM_COMMAND_ENV).filter(|c| !c.trim().is_empty()) {
        config.model = ModelConfig::Command(CommandConfig { command });
    }
    if let ModelConfig::OpenAi(openai) = &mut config.model {
        if let Some(key) = env(OPENAI_API_KEY_ENV) {
            openai.api_key = Some(key);
        }
        if let Some(base_url) = env(OPENAI_BASE_URL_ENV) {
            openai.base_url = base_url;
        }
        if let Some(model) = env(MODEL_ENV) {
            openai.model = model;
        }
    }
    match &mut config.store {
        StoreConfig::Local(local) => {
            if let Some(root) = env(DATA_DIR_ENV) {
                local.root = PathBuf::from(root);
            }
        }
        StoreConfig::Drive(drive) => {
            if let Some(token) = env(GOOGLE_TOKEN_ENV) {
                drive.access_token = Some(token);
            }
        }
    }
    Ok(())
}

pub fn apply_overrides(config: &mut ServiceConfig, overrides: &ConfigOverrides) {
    if let Some(bind) = overrides.bind {
        config.bind = bind;
    }
    if let Some(row_limit) = overrides.row_limit {
        config.row_limit = row_limit;
    }
    if let Some(command) = &overrides.lm_command {
        config.model = ModelConfig::Command(CommandConfig {
            command: command.clone(),
        });
    }
}

/// Reject configs the service cannot run with.
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    if config.row_limit == 0 || config.row_limit > MAX_ROW_LIMIT {
        return Err(anyhow!(
            "row_limit must be between 1 and {MAX_ROW_LIMIT} (got {})",
            config.row_limit
        ));
    }
    validate_targets(&config.targets)?;

    match &config.model {
        ModelConfig::OpenAi(openai) => {
            let has_key = openai
                .api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty());
            if !has_key {
                return Err(anyhow!(
                    "{OPENAI_API_KEY_ENV} must be set for the openai model backend"
                ));
            }
            if openai.base_url.trim().is_empty() || openai.model.trim().is_empty() {
                return Err(anyhow!("openai base_url and model must be non-empty"));
            }
            if openai.max_tokens == 0 || openai.timeout_secs == 0 {
                return Err(anyhow!("openai max_tokens and timeout_secs must be positive"));
            }
        }
        ModelConfig::Command(command) => {
            let argv = parse_command(&command.command)?;
            which::which(&argv[0])
                .with_context(|| format!("LM command not found on PATH: {}", argv[0]))?;
        }
    }

    match &config.store {
        StoreConfig::Local(local) => {
            if local.root.as_os_str().is_empty() {
                return Err(anyhow!("local store root must be non-empty"));
            }
        }
        StoreConfig::Drive(drive) => {
            let has_token = drive
                .access_token
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            if !has_token && drive.token_command.is_none() {
                return Err(anyhow!(
                    "drive store needs {GOOGLE_TOKEN_ENV} or a token_command"
                ));
            }
            if let Some(command) = &drive.token_command {
                parse_command(command).context("parse drive token_command")?;
            }
        }
    }
    Ok(())
}

fn validate_targets(targets: &[TargetColumn]) -> Result<()> {
    if targets.is_empty() {
        return Err(anyhow!("at least one target column is required"));
    }
    let mut seen = BTreeSet::new();
    for target in targets {
        let name = target.name.trim();
        if name.is_empty() {
            return Err(anyhow!("target column names must be non-empty"));
        }
        if !seen.insert(name) {
            return Err(anyhow!("duplicate target column {name:?}"));
        }
        if target.template.as_str().trim().is_empty() {
            return Err(anyhow!("prompt for target column {name:?} is empty"));
        }
    }
    Ok(())
}

/// Pretty JSON of the effective config. Secrets are never serialized.
pub fn render_config(config: &ServiceConfig) -> Result<String> {
    serde_json::to_string_pretty(config).context("serialize config")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

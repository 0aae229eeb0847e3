//! Configuration for the mcontrol CLI and other engine hosts.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `mcontrol_core::EngineConfig`. The CLI adds its
//! flag-aware wrappers on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mcontrol_core::EngineConfig;

/// Keyring service name; entries are keyed `{profile}/password`.
pub const KEYRING_SERVICE: &str = "mcontrol";

/// Environment variable consulted when a profile names no `password_env`.
pub const PASSWORD_ENV: &str = "MCONTROL_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<keyring::Error> for ConfigError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }

    /// The profile used when none is given explicitly.
    pub fn default_profile_name(&self) -> &str {
        self.default_profile.as_deref().unwrap_or("default")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Cloud request timeout, humantime format (`15s`).
    #[serde(default = "default_cloud_timeout")]
    pub cloud_timeout: String,

    /// Gateway request timeout, humantime format (`3s`).
    #[serde(default = "default_local_timeout")]
    pub local_timeout: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            cloud_timeout: default_cloud_timeout(),
            local_timeout: default_local_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}

fn default_color() -> String {
    "auto".into()
}

fn default_cloud_timeout() -> String {
    "15s".into()
}

fn default_local_timeout() -> String {
    "3s".into()
}

/// One M-Control account with its optional local gateway.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Account e-mail.
    pub email: String,

    /// Password (plaintext; prefer the keyring or an env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// CCM21-i / CCM15 gateway host. Absent means cloud-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// Cloud base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_url: Option<String>,

    /// Fast poll interval (`5s`); `0s` disables the local loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_interval: Option<String>,

    /// Slow poll interval (`30s`); `0s` disables the cloud loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_timeout: Option<String>,

    /// Retries for transient cloud failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_retries: Option<u32>,

    /// Extra CA certificate (PEM) for the cloud endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "mcontrol", "mcontrol").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("mcontrol");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` layered under `MCONTROL_` environment
/// variables. A missing file yields the defaults.
///
/// Nested keys use a double underscore:
/// `MCONTROL_PROFILES__HOME__GATEWAY=10.0.0.5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MCONTROL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Serialize config to TOML at `path`, creating parent directories.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve a profile's password.
///
/// Order: the profile's `password_env` (or `MCONTROL_PASSWORD`), the
/// system keyring, then the plaintext `password` field.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(profile, profile_name, |key| std::env::var(key).ok(), keyring_password)
}

fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Env var
    let env_name = profile.password_env.as_deref().unwrap_or(PASSWORD_ENV);
    if let Some(pw) = env(env_name).filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(pw));
    }

    // 2. System keyring
    if let Some(pw) = keyring(profile_name) {
        return Ok(SecretString::from(pw));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

fn keyring_password(profile_name: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .ok()?
        .get_password()
        .ok()
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))?;
    entry.set_password(password)?;
    Ok(())
}

// ── EngineConfig translation ────────────────────────────────────────

/// Parse a humantime duration field (`5s`, `1m 30s`).
pub fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("{value:?} is not a duration: {e}"),
    })
}

/// Build an `EngineConfig` from a profile and the global defaults.
///
/// Validates the gateway host here so a typo surfaces at load time
/// rather than on the first poll.
pub fn profile_to_engine_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<EngineConfig, ConfigError> {
    let password = resolve_password(profile, profile_name)?;
    build_engine_config(profile, profile_name, defaults, password)
}

/// Build an `EngineConfig` with an already resolved password.
pub fn build_engine_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    password: SecretString,
) -> Result<EngineConfig, ConfigError> {
    if profile.email.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "email".into(),
            reason: format!("profile '{profile_name}' has no account e-mail"),
        });
    }

    let mut cfg = EngineConfig::new(profile.email.trim(), password);

    if let Some(ref gateway) = profile.gateway {
        mcontrol_core::config::validate_gateway_host(gateway).map_err(|e| {
            ConfigError::Validation {
                field: "gateway".into(),
                reason: e.to_string(),
            }
        })?;
        cfg.gateway = Some(gateway.trim().to_owned());
    }

    if let Some(ref raw) = profile.cloud_url {
        cfg.cloud_url = raw.parse().map_err(|_| ConfigError::Validation {
            field: "cloud_url".into(),
            reason: format!("invalid URL: {raw}"),
        })?;
    }

    if let Some(ref v) = profile.local_interval {
        cfg.local_interval = parse_duration("local_interval", v)?;
    }
    if let Some(ref v) = profile.cloud_interval {
        cfg.cloud_interval = Some(parse_duration("cloud_interval", v)?);
    }

    let local_timeout = profile.local_timeout.as_ref().unwrap_or(&defaults.local_timeout);
    cfg.local_timeout = parse_duration("local_timeout", local_timeout)?;
    let cloud_timeout = profile.cloud_timeout.as_ref().unwrap_or(&defaults.cloud_timeout);
    cfg.cloud_timeout = parse_duration("cloud_timeout", cloud_timeout)?;

    if let Some(retries) = profile.cloud_retries {
        cfg.cloud_retries = retries;
    }
    cfg.ca_cert.clone_from(&profile.ca_cert);

    cfg.validate().map_err(|e| ConfigError::Validation {
        field: format!("profile '{profile_name}'"),
        reason: e.to_string(),
    })?;

    Ok(cfg)
}

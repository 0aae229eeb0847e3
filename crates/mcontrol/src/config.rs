//! CLI configuration: thin wrapper around `mcontrol_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--email, --password, --gateway, --cloud-only, --timeout).

use secrecy::SecretString;

use mcontrol_core::EngineConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use mcontrol_config::{
    Config, Defaults, Profile, config_path, load_config_or_default, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .unwrap_or_else(|| config.default_profile_name().to_owned())
}

/// Comma-separated profile names for diagnostics.
pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// The active profile with CLI flag overrides applied.
///
/// Without a stored profile, `--email` alone is enough to build one.
/// Returns the profile name alongside.
pub fn effective_profile(global: &GlobalOpts) -> Result<(Profile, String, Defaults), CliError> {
    let cfg = load_config_or_default();
    let name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&name) {
        Some(p) => p.clone(),
        None if global.email.is_some() || global.gateway.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                available: available_profiles(&cfg),
                name,
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    // Flag > env > profile
    if let Some(ref email) = global.email {
        profile.email.clone_from(email);
    }
    if let Some(ref gateway) = global.gateway {
        profile.gateway = Some(gateway.clone());
    }
    if global.cloud_only {
        profile.gateway = None;
    }
    if let Some(secs) = global.timeout {
        profile.cloud_timeout = Some(format!("{secs}s"));
    }

    Ok((profile, name, cfg.defaults))
}

/// Translate the active profile + global flags into an `EngineConfig`.
pub fn resolve_engine_config(global: &GlobalOpts) -> Result<EngineConfig, CliError> {
    let (profile, name, defaults) = effective_profile(global)?;

    if profile.email.trim().is_empty() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }

    // The --password flag beats env, keyring and plaintext.
    let password = match global.password {
        Some(ref pw) => SecretString::from(pw.clone()),
        None => mcontrol_config::resolve_password(&profile, &name)?,
    };

    Ok(mcontrol_config::build_engine_config(
        &profile, &name, &defaults, password,
    )?)
}

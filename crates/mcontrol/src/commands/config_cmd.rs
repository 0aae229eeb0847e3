//! Config subcommand handlers.

use dialoguer::{Input, Select};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const SETTABLE_KEYS: &str = "email, gateway, cloud_url, local_interval, cloud_interval, \
                             local_timeout, cloud_timeout, cloud_retries, password_env, ca_cert";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with plaintext passwords masked.
fn redacted(cfg: &Config) -> Config {
    let mut out = cfg.clone();
    for profile in out.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some("****".into());
        }
    }
    out
}

/// Format config for display as TOML (passwords already masked).
fn format_config(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# failed to render config: {e}"))
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn store_in_keyring(profile_name: &str, secret: &str) -> Result<(), CliError> {
    mcontrol_config::store_password(profile_name, secret).map_err(|e| CliError::Validation {
        field: "keyring".into(),
        reason: format!("failed to store password in keyring: {e}"),
    })
}

/// Offer to store the password in the system keyring or return it for
/// plaintext config.
///
/// Returns `Some(password)` if the user chose plaintext, `None` if stored
/// in the keyring.
fn prompt_keyring_storage(profile_name: &str, secret: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the password?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        store_in_keyring(profile_name, secret)?;
        eprintln!("   ✓ Password stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(secret.to_owned()))
    }
}

fn validation(field: &str, reason: impl Into<String>) -> CliError {
    CliError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Validate a humantime value and return it normalized.
fn duration_value(key: &str, value: &str) -> Result<String, CliError> {
    mcontrol_config::parse_duration(key, value)?;
    Ok(value.trim().to_owned())
}

/// Apply one `config set` key to a profile.
fn apply_setting(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key.replace('-', "_").as_str() {
        "email" => profile.email = value,
        "gateway" => {
            if value.trim().is_empty() {
                profile.gateway = None;
            } else {
                mcontrol_core::config::validate_gateway_host(&value)?;
                profile.gateway = Some(value.trim().to_owned());
            }
        }
        "cloud_url" => {
            url::Url::parse(&value)
                .map_err(|e| validation("cloud_url", format!("invalid URL: {e}")))?;
            profile.cloud_url = Some(value);
        }
        "local_interval" => profile.local_interval = Some(duration_value(key, &value)?),
        "cloud_interval" => profile.cloud_interval = Some(duration_value(key, &value)?),
        "local_timeout" => profile.local_timeout = Some(duration_value(key, &value)?),
        "cloud_timeout" => profile.cloud_timeout = Some(duration_value(key, &value)?),
        "cloud_retries" => {
            profile.cloud_retries = Some(
                value
                    .parse()
                    .map_err(|_| validation("cloud_retries", "must be a whole number"))?,
            );
        }
        "password_env" => profile.password_env = Some(value),
        "ca_cert" => profile.ca_cert = Some(value.into()),
        other => {
            return Err(validation(
                other,
                format!("unknown config key '{other}'. Valid keys: {SETTABLE_KEYS}"),
            ));
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("mcontrol configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            // 1. Profile name
            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            // 2. Account
            let email: String = Input::new()
                .with_prompt("M-Control account e-mail")
                .interact_text()
                .map_err(prompt_err)?;
            let pass = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
            if email.trim().is_empty() || pass.is_empty() {
                return Err(validation(
                    "credentials",
                    "e-mail and password cannot be empty",
                ));
            }
            let password = prompt_keyring_storage(&profile_name, &pass)?;

            // 3. Optional gateway
            let gateway: String = Input::new()
                .with_prompt("CCM21-i / CCM15 gateway host (empty for cloud only)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;
            let gateway = if gateway.trim().is_empty() {
                None
            } else {
                mcontrol_core::config::validate_gateway_host(&gateway)?;
                Some(gateway.trim().to_owned())
            };

            // 4. Build profile and config, keeping any other profiles
            let profile = Profile {
                email: email.trim().to_owned(),
                password,
                gateway,
                ..Profile::default()
            };

            let mut cfg = config::load_config_or_default();
            cfg.profiles.insert(profile_name.clone(), profile);
            cfg.default_profile = Some(profile_name.clone());

            // 5. Write config
            config::save_config(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Active profile: {profile_name}");
            eprintln!("\n  Test it: mcontrol status");

            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config_or_default());
            let out = output::render_single(&global.output, &cfg, format_config, |c| {
                c.default_profile_name().to_owned()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);

            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            apply_setting(profile, &key, value)?;

            config::save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile_name();
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: mcontrol config init");
            } else {
                for (name, profile) in &cfg.profiles {
                    let marker = if name == default { " *" } else { "" };
                    let mode = if profile.gateway.is_some() {
                        "hybrid"
                    } else {
                        "cloud only"
                    };
                    println!("{name}{marker}\t{}\t{mode}", profile.email);
                }
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();

            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }

        // ── SetPassword ─────────────────────────────────────────────
        ConfigCommand::SetPassword { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));

            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name: profile_name,
                });
            }

            let secret = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
            if secret.is_empty() {
                return Err(validation("password", "value cannot be empty"));
            }
            store_in_keyring(&profile_name, &secret)?;

            eprintln!("✓ Password stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_are_validated() {
        let mut p = Profile::default();
        assert!(apply_setting(&mut p, "gateway", "192.168.1.50:80".into()).is_ok());
        assert_eq!(p.gateway.as_deref(), Some("192.168.1.50:80"));

        assert!(apply_setting(&mut p, "gateway", "http://x/".into()).is_err());
        assert!(apply_setting(&mut p, "gateway", String::new()).is_ok());
        assert!(p.gateway.is_none());

        assert!(apply_setting(&mut p, "cloud-interval", "45s".into()).is_ok());
        assert_eq!(p.cloud_interval.as_deref(), Some("45s"));
        assert!(apply_setting(&mut p, "local_interval", "fast".into()).is_err());

        assert!(apply_setting(&mut p, "cloud_retries", "three".into()).is_err());
        assert!(matches!(
            apply_setting(&mut p, "site", "x".into()),
            Err(CliError::Validation { .. })
        ));
    }

    #[test]
    fn show_masks_passwords() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "home".into(),
            Profile {
                email: "user@example.com".into(),
                password: Some("hunter2".into()),
                ..Profile::default()
            },
        );
        let text = format_config(&redacted(&cfg));
        assert!(!text.contains("hunter2"));
        assert!(text.contains("****"));
        assert!(text.contains("user@example.com"));
    }
}

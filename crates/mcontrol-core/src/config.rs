// ── Runtime engine configuration ──
//
// Describes *what* to sync and how often. Carries credentials and
// polling tuning but never touches disk; the CLI (or any other host)
// builds an `EngineConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Default fast (local) poll interval.
pub const DEFAULT_LOCAL_INTERVAL: Duration = Duration::from_secs(5);
/// Default slow (cloud) poll interval when a gateway is configured.
pub const DEFAULT_HYBRID_CLOUD_INTERVAL: Duration = Duration::from_secs(30);
/// Default slow (cloud) poll interval without a gateway.
pub const DEFAULT_CLOUD_ONLY_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for one engine instance (one cloud account, at most one
/// gateway).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// M-Control account e-mail.
    pub email: String,
    /// M-Control account password.
    pub password: SecretString,
    /// CCM21-i / CCM15 gateway host (`ip`, `ip:port` or hostname).
    pub gateway: Option<String>,
    /// Cloud base URL.
    pub cloud_url: Url,
    /// Fast poll interval. Zero disables the local loop.
    pub local_interval: Duration,
    /// Slow poll interval. `None` picks the hybrid / cloud-only default;
    /// zero disables the cloud loop.
    pub cloud_interval: Option<Duration>,
    /// Gateway request timeout. Must be below `local_interval`.
    pub local_timeout: Duration,
    /// Cloud request timeout.
    pub cloud_timeout: Duration,
    /// Retries for transient cloud failures.
    pub cloud_retries: u32,
    /// First retry delay; doubled on each further attempt.
    pub retry_backoff: Duration,
    /// Extra CA certificate to trust for the cloud endpoint.
    pub ca_cert: Option<PathBuf>,
}

impl EngineConfig {
    /// Config with defaults for everything but the account.
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
            gateway: None,
            cloud_url: default_cloud_url(),
            local_interval: DEFAULT_LOCAL_INTERVAL,
            cloud_interval: None,
            local_timeout: Duration::from_secs(3),
            cloud_timeout: Duration::from_secs(15),
            cloud_retries: 2,
            retry_backoff: Duration::from_secs(1),
            ca_cert: None,
        }
    }

    /// `true` when a local gateway is configured.
    pub fn is_hybrid(&self) -> bool {
        self.gateway.is_some()
    }

    /// Slow poll interval after applying the mode default.
    pub fn effective_cloud_interval(&self) -> Duration {
        self.cloud_interval.unwrap_or(if self.is_hybrid() {
            DEFAULT_HYBRID_CLOUD_INTERVAL
        } else {
            DEFAULT_CLOUD_ONLY_INTERVAL
        })
    }

    /// Check the config for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.email.trim().is_empty() {
            return Err(config_error("account e-mail is empty"));
        }

        if let Some(gateway) = &self.gateway {
            validate_gateway_host(gateway)?;

            if !self.local_interval.is_zero() && self.local_timeout >= self.local_interval {
                return Err(config_error(format!(
                    "local timeout ({:?}) must be shorter than the local poll interval ({:?})",
                    self.local_timeout, self.local_interval
                )));
            }
        }

        if self.local_timeout.is_zero() || self.cloud_timeout.is_zero() {
            return Err(config_error("request timeouts must be non-zero"));
        }

        Ok(())
    }
}

/// Accept `ip`, `ip:port` or a hostname; reject anything with a scheme,
/// path or credentials.
pub fn validate_gateway_host(host: &str) -> Result<(), CoreError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(config_error("gateway host is empty"));
    }
    if host.contains("://") || host.contains('/') || host.contains('@') {
        return Err(config_error(format!(
            "gateway must be a host or host:port, got {host:?}"
        )));
    }

    let url = Url::parse(&format!("http://{host}"))
        .map_err(|e| config_error(format!("invalid gateway host {host:?}: {e}")))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(config_error(format!("invalid gateway host {host:?}")));
    }
    Ok(())
}

fn default_cloud_url() -> Url {
    Url::parse(mcontrol_api::DEFAULT_CLOUD_URL).expect("default cloud URL is valid")
}

fn config_error(message: impl Into<String>) -> CoreError {
    CoreError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::new("user@example.com", SecretString::from("pw"))
    }

    #[test]
    fn cloud_interval_defaults_follow_mode() {
        let mut cfg = config();
        assert_eq!(cfg.effective_cloud_interval(), DEFAULT_CLOUD_ONLY_INTERVAL);

        cfg.gateway = Some("192.168.1.50".into());
        assert_eq!(cfg.effective_cloud_interval(), DEFAULT_HYBRID_CLOUD_INTERVAL);

        cfg.cloud_interval = Some(Duration::from_secs(90));
        assert_eq!(cfg.effective_cloud_interval(), Duration::from_secs(90));
    }

    #[test]
    fn gateway_host_forms() {
        assert!(validate_gateway_host("192.168.1.50").is_ok());
        assert!(validate_gateway_host("192.168.1.50:8080").is_ok());
        assert!(validate_gateway_host("ccm21.local").is_ok());

        assert!(validate_gateway_host("").is_err());
        assert!(validate_gateway_host("http://192.168.1.50").is_err());
        assert!(validate_gateway_host("192.168.1.50/status").is_err());
        assert!(validate_gateway_host("bad host").is_err());
        assert!(validate_gateway_host("10.0.0.1:99999").is_err());
    }

    #[test]
    fn local_timeout_must_be_below_interval() {
        let mut cfg = config();
        cfg.gateway = Some("10.0.0.2".into());
        cfg.local_timeout = Duration::from_secs(5);
        assert!(matches!(cfg.validate(), Err(CoreError::Config { .. })));

        cfg.local_timeout = Duration::from_secs(2);
        assert!(cfg.validate().is_ok());

        // A disabled local loop has no interval to stay under.
        cfg.local_interval = Duration::ZERO;
        cfg.local_timeout = Duration::from_secs(5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_email_is_rejected() {
        let cfg = EngineConfig::new("  ", SecretString::from("pw"));
        assert!(cfg.validate().is_err());
    }
}

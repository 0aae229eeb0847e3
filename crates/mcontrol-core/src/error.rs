// ── Core error types ──
//
// Engine-level errors. Consumers never see HTTP status codes or JSON
// parse failures directly; `From<mcontrol_api::Error>` translates
// transport-layer errors into these variants.

use thiserror::Error;

/// Authentication failures surfaced by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The cloud rejected the account credentials. Never retried.
    #[error("invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// Login could not reach the cloud. Retried with backoff.
    #[error("network error during login: {message}")]
    Network { message: String },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session ──────────────────────────────────────────────────────
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Session expired -- re-authentication did not help")]
    SessionExpired,

    // ── Transport ────────────────────────────────────────────────────
    #[error("Cloud unavailable: {reason}")]
    CloudUnavailable { reason: String },

    #[error("Local gateway {host} unreachable: {reason}")]
    LocalUnreachable { host: String, reason: String },

    #[error("Malformed gateway status at byte offset {offset}: {message}")]
    Protocol { offset: usize, message: String },

    // ── Mapping ──────────────────────────────────────────────────────
    #[error("Address mapping incomplete: {} device(s) unmapped", .unmapped.len())]
    MappingIncomplete { unmapped: Vec<String> },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Command rejected for {device_id}: {reason}")]
    CommandRejected { device_id: String, reason: String },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Engine is not running")]
    EngineStopped,

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api { message: String, code: Option<i64> },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for outages: the cloud or the gateway could not
    /// serve the request. Only network-level failures are retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CloudUnavailable { .. }
                | Self::LocalUnreachable { .. }
                | Self::Auth(AuthError::Network { .. })
        )
    }

    /// Returns `true` if the cloud rejected the configured credentials.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, Self::Auth(AuthError::InvalidCredentials { .. }))
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<mcontrol_api::Error> for CoreError {
    fn from(err: mcontrol_api::Error) -> Self {
        use mcontrol_api::Error as Api;

        match err {
            Api::Authentication { message } => {
                CoreError::Auth(AuthError::InvalidCredentials { message })
            }
            Api::SessionExpired => CoreError::SessionExpired,
            ref e @ Api::Transport(_) if e.is_transient() => CoreError::CloudUnavailable {
                reason: e.to_string(),
            },
            Api::Transport(e) => CoreError::Api {
                message: e.to_string(),
                code: e.status().map(|s| i64::from(s.as_u16())),
            },
            Api::Timeout { timeout_secs } => CoreError::CloudUnavailable {
                reason: format!("request timed out after {timeout_secs}s"),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            Api::CloudApi { code, message } => match code {
                // 5xx from the cloud front end is an outage, not a refusal.
                Some(500..=599) => CoreError::CloudUnavailable { reason: message },
                _ => CoreError::Api { message, code },
            },
            Api::CommandRejected { device_id, message } => CoreError::CommandRejected {
                device_id,
                reason: message,
            },
            Api::LocalUnreachable { host, reason } => CoreError::LocalUnreachable { host, reason },
            Api::Protocol(e) => CoreError::Protocol {
                offset: e.offset,
                message: e.kind.to_string(),
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mcontrol_api::local::{ProtocolError, ProtocolErrorKind};

    use super::*;

    #[test]
    fn api_errors_map_to_domain_variants() {
        let err = CoreError::from(mcontrol_api::Error::Authentication {
            message: "bad password".into(),
        });
        assert!(err.is_credential_rejection());

        let err = CoreError::from(mcontrol_api::Error::CloudApi {
            code: Some(503),
            message: "HTTP 503".into(),
        });
        assert!(err.is_transient());

        let err = CoreError::from(mcontrol_api::Error::Protocol(ProtocolError {
            offset: 16,
            kind: ProtocolErrorKind::DuplicateSlot(2),
        }));
        assert!(matches!(err, CoreError::Protocol { offset: 16, .. }));
    }

    #[test]
    fn mapping_incomplete_counts_devices() {
        let err = CoreError::MappingIncomplete {
            unmapped: vec!["1".into(), "2".into()],
        };
        assert_eq!(
            err.to_string(),
            "Address mapping incomplete: 2 device(s) unmapped"
        );
    }
}

use thiserror::Error;

use crate::local::protocol::ProtocolError;

/// Top-level error type for the `mcontrol-api` crate.
///
/// Covers every failure mode across both API surfaces: the M-Control
/// cloud and the CCM21-i / CCM15 local gateway. `mcontrol-core` maps these
/// into engine-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong credentials, unknown account, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The session cookie is no longer accepted -- re-login required.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Cloud API ───────────────────────────────────────────────────
    /// Non-success envelope from the cloud API.
    #[error("Cloud API error: {message}")]
    CloudApi { code: Option<i64>, message: String },

    /// The cloud refused a control write.
    #[error("Command rejected for device {device_id}: {message}")]
    CommandRejected { device_id: String, message: String },

    // ── Local gateway ───────────────────────────────────────────────
    /// Gateway did not answer (timeout, refused connection, HTTP error).
    #[error("Local gateway {host} unreachable: {reason}")]
    LocalUnreachable { host: String, reason: String },

    /// Malformed binary status frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the session has expired
    /// and a re-login might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Returns `true` if the cloud rejected the supplied credentials.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient network error worth retrying.
    ///
    /// Credential and protocol errors are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::LocalUnreachable { .. } => true,
            _ => false,
        }
    }

    /// Extract the cloud envelope code, if available.
    pub fn api_error_code(&self) -> Option<i64> {
        match self {
            Self::CloudApi { code, .. } => *code,
            _ => None,
        }
    }
}

//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use mcontrol_config::ConfigError;
use mcontrol_core::{AuthError, CoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the M-Control cloud")]
    #[diagnostic(
        code(mcontrol::cloud_unavailable),
        help(
            "The cloud did not answer or returned a server error.\n\
             Reason: {reason}\n\
             Retry later, or raise the timeout with --timeout."
        )
    )]
    CloudUnavailable { reason: String },

    #[error("Could not reach the gateway at {host}")]
    #[diagnostic(
        code(mcontrol::gateway_unreachable),
        help(
            "Check that the CCM21-i / CCM15 is powered and on this network.\n\
             Reason: {reason}\n\
             Try: mcontrol --cloud-only status"
        )
    )]
    GatewayUnreachable { host: String, reason: String },

    #[error("No local gateway configured")]
    #[diagnostic(
        code(mcontrol::no_gateway),
        help(
            "Pass --gateway <host> or store one on the profile:\n\
             mcontrol config set gateway 192.168.1.50"
        )
    )]
    NoGateway,

    #[error("Gateway returned a malformed status frame at byte {offset}: {message}")]
    #[diagnostic(code(mcontrol::protocol))]
    Protocol { offset: usize, message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(mcontrol::auth_failed),
        help(
            "Verify the account e-mail and password.\n\
             Run: mcontrol config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(mcontrol::no_credentials),
        help(
            "Configure credentials with: mcontrol config init\n\
             Or set the MCONTROL_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Devices & commands ───────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(mcontrol::not_found),
        help("Run: mcontrol {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Command for '{device}' was not applied: {reason}")]
    #[diagnostic(
        code(mcontrol::rejected),
        help("The cloud refused the write or could not be reached. The unit state is unchanged.")
    )]
    CommandRejected { device: String, reason: String },

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(mcontrol::api_error))]
    ApiError { code: String, message: String },

    #[error("The sync engine stopped")]
    #[diagnostic(code(mcontrol::engine_stopped))]
    EngineStopped,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(mcontrol::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(mcontrol::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: mcontrol config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No account configured")]
    #[diagnostic(
        code(mcontrol::no_config),
        help(
            "Create a profile with: mcontrol config init\n\
             Expected at: {path}\n\
             Or pass --email and --password."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(mcontrol::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(mcontrol::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CloudUnavailable { .. } | Self::GatewayUnreachable { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::CommandRejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::NoGateway | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: "(see: mcontrol config profiles)".into(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth(AuthError::InvalidCredentials { message }) => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },

            CoreError::Auth(AuthError::Network { message }) => {
                CliError::CloudUnavailable { reason: message }
            }

            CoreError::SessionExpired => CliError::AuthFailed {
                profile: "current".into(),
                message: "session expired and re-login did not help".into(),
            },

            CoreError::CloudUnavailable { reason } => CliError::CloudUnavailable { reason },

            CoreError::LocalUnreachable { host, reason } => {
                CliError::GatewayUnreachable { host, reason }
            }

            CoreError::Protocol { offset, message } => CliError::Protocol { offset, message },

            CoreError::MappingIncomplete { unmapped } => CliError::ApiError {
                code: "mapping_incomplete".into(),
                message: format!("unmapped devices: {}", unmapped.join(", ")),
            },

            CoreError::CommandRejected { device_id, reason } => CliError::CommandRejected {
                device: device_id,
                reason,
            },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
                list_command: "devices list".into(),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "command".into(),
                reason: message,
            },

            CoreError::EngineStopped => CliError::EngineStopped,

            CoreError::Config { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },

            CoreError::Api { message, code } => CliError::ApiError {
                code: code.map_or_else(|| "unknown".into(), |c| c.to_string()),
                message,
            },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

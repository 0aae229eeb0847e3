//! Clap derive structures for the `mcontrol` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// mcontrol -- Midea VRF air conditioning from the command line
#[derive(Debug, Parser)]
#[command(
    name = "mcontrol",
    version,
    about = "Monitor and control Midea VRF air conditioning",
    long_about = "Monitor and control Midea VRF indoor units through the M-Control cloud,\n\
        reading fast local telemetry from a CCM21-i / CCM15 gateway when one is configured.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "MCONTROL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// M-Control account e-mail (overrides profile)
    #[arg(long, short = 'e', env = "MCONTROL_EMAIL", global = true)]
    pub email: Option<String>,

    /// M-Control account password
    #[arg(long, env = "MCONTROL_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Local gateway host, `ip` or `ip:port` (overrides profile)
    #[arg(long, short = 'g', env = "MCONTROL_GATEWAY", global = true)]
    pub gateway: Option<String>,

    /// Ignore any configured gateway and use the cloud only
    #[arg(long, global = true)]
    pub cloud_only: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "MCONTROL_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Cloud request timeout in seconds (overrides profile)
    #[arg(long, env = "MCONTROL_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List and inspect indoor units
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Show engine state: mode, gateway health and address map
    Status,

    /// Change a unit's power, mode, fan, swing or target temperature
    Set(SetArgs),

    /// Stream state changes and engine events until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Talk to the local gateway directly
    Local(LocalArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List units with their merged state
    #[command(alias = "ls")]
    List,

    /// Show one unit in detail
    Get {
        /// Cloud device id or unit name
        device: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SET
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Cloud device id or unit name
    pub device: String,

    /// Turn the unit on or off
    #[arg(long)]
    pub power: Option<Toggle>,

    /// Operating mode
    #[arg(long, short = 'm')]
    pub mode: Option<ModeArg>,

    /// Fan speed
    #[arg(long, short = 'f')]
    pub fan: Option<FanArg>,

    /// Target temperature in whole degrees Celsius
    #[arg(long, short = 't')]
    pub temp: Option<f32>,

    /// Louver swing
    #[arg(long)]
    pub swing: Option<Toggle>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Cool,
    Heat,
    Auto,
    Dry,
    #[value(alias = "fan")]
    FanOnly,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FanArg {
    Auto,
    Low,
    #[value(alias = "mid")]
    Medium,
    High,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only show events for this unit (cloud id or name)
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Exit after this many events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Exit after this long, e.g. `10m`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  LOCAL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct LocalArgs {
    #[command(subcommand)]
    pub command: LocalCommand,
}

#[derive(Debug, Subcommand)]
pub enum LocalCommand {
    /// Poll the gateway once and print every decoded slot
    Dump {
        /// Include the raw hex status bytes
        #[arg(long)]
        raw: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key, e.g. "gateway" or "cloud_interval"
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the account password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

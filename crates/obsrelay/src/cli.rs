//! Clap derive structures for the `obsrelay` CLI.
//!
//! Defines the command tree, global flags, and shared value enums. Kept
//! free of workspace crates so `build.rs` can compile it for man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// obsrelay -- operate tenant OBS instances from the command line
#[derive(Debug, Parser)]
#[command(
    name = "obsrelay",
    version,
    about = "Operate multi-tenant OBS instances from the command line",
    long_about = "Connects to each tenant's OBS instance directly over obs-websocket,\n\
        through a relay agent, or through a cloud-magic bridge, and exposes\n\
        scene, audio, and stream controls plus a live event feed.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "OBSRELAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "OBSRELAY_OUTPUT",
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

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
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

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    /// Pick the transport from the address shape
    Auto,
    /// Always go through the relay agent
    Relay,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StreamAction {
    Start,
    Stop,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect every configured tenant and stream channel messages as JSON lines
    Serve,

    /// Attach with a session token and print the tenant channel
    Watch(WatchArgs),

    /// Store a tenant's instance address and connect to it
    Connect(ConnectArgs),

    /// List configured tenants
    #[command(alias = "ls")]
    Tenants,

    /// Connection status and what is on air
    Status(TenantArg),

    /// List scenes, newest first
    Scenes(TenantArg),

    /// List the sources placed in a scene
    Items(ItemsArgs),

    /// List audio inputs with mute state and volume
    Audio(TenantArg),

    /// Performance and stream statistics
    Stats(TenantArg),

    /// List profiles
    Profiles(TenantArg),

    /// List scene transitions
    Transitions(TenantArg),

    /// Switch the program scene
    Scene(SceneArgs),

    /// Start or stop streaming
    Stream(StreamArgs),

    /// Mute or unmute an audio input
    Mute(MuteArgs),

    /// Set an input's volume (0-100 on the fader curve)
    Volume(VolumeArgs),

    /// Restart a media or capture source
    RestartSource(RestartSourceArgs),

    /// Set the video bitrate on every output
    Bitrate(BitrateArgs),

    /// Send a raw obs-websocket request and print the response
    Call(CallArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Per-command args ─────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TenantArg {
    /// Tenant id from the config file
    pub tenant: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Session token
    #[arg(env = "OBSRELAY_SESSION_TOKEN", hide_env_values = true)]
    pub token: String,
}

#[derive(Debug, Args)]
pub struct ConnectArgs {
    pub tenant: String,

    /// Relay agent id, `agent@public-ip`, or host
    pub address: String,

    pub port: u16,

    #[arg(long, default_value = "auto")]
    pub strategy: StrategyArg,

    /// Instance password (stored in the system keyring)
    #[arg(long, env = "OBSRELAY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Args)]
pub struct ItemsArgs {
    pub tenant: String,
    pub scene: String,
}

#[derive(Debug, Args)]
pub struct SceneArgs {
    pub tenant: String,
    pub name: String,
}

#[derive(Debug, Args)]
pub struct StreamArgs {
    pub tenant: String,
    pub action: StreamAction,
}

#[derive(Debug, Args)]
pub struct MuteArgs {
    pub tenant: String,
    pub input: String,

    /// Unmute instead
    #[arg(long)]
    pub off: bool,
}

#[derive(Debug, Args)]
pub struct VolumeArgs {
    pub tenant: String,
    pub input: String,

    #[arg(value_parser = parse_percent)]
    pub percent: f64,
}

#[derive(Debug, Args)]
pub struct RestartSourceArgs {
    pub tenant: String,
    pub source: String,
}

#[derive(Debug, Args)]
pub struct BitrateArgs {
    pub tenant: String,

    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub kbps: u32,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    pub tenant: String,

    /// Request type, e.g. GetVersion
    pub request_type: String,

    /// Request data as a JSON object
    #[arg(long, short = 'd')]
    pub data: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    pub shell: clap_complete::Shell,
}

fn parse_percent(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|_| format!("'{raw}' is not a number"))?;
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is outside 0-100"))
    }
}

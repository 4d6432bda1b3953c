//! FallWatch CLI
//!
//! Command-line interface for the FallWatch fall-detection system.
//!
//! # Usage
//!
//! ```bash
//! # Run the system with a replay script and the UDP report receiver
//! fallwatch run --replay topple.jsonl --udp-port 5800
//!
//! # List recently stored fall events
//! fallwatch events --limit 20
//!
//! # Send a test notification through each enabled channel
//! fallwatch test-channels --enable-chat
//!
//! # Display version information
//! fallwatch version
//! ```
//!
//! Channel secrets come from the environment: `FALLWATCH_BOT_TOKEN` and
//! `FALLWATCH_CHAT_ID` for the chat channel, `FALLWATCH_AMI_USERNAME` and
//! `FALLWATCH_AMI_SECRET` for telephony.

use clap::{Args, Parser, Subcommand};

pub mod commands;

/// FallWatch command-line interface.
#[derive(Parser, Debug)]
#[command(name = "fallwatch")]
#[command(author, version, about = "Camera + wearable fall detection and alerting")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the detection system until interrupted
    Run(RunArgs),

    /// List recently stored fall events
    Events(EventsArgs),

    /// Send a test notification through each enabled channel
    TestChannels(ChannelArgs),

    /// Display version information
    Version,
}

/// Arguments for `fallwatch run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// SQLite event database path
    #[arg(long, default_value = "fall_events.db")]
    pub database: String,

    /// Replay script (JSON lines) driving the camera pipeline
    #[arg(long, value_name = "PATH")]
    pub replay: Option<String>,

    /// Loop the replay script instead of running it once
    #[arg(long)]
    pub replay_loop: bool,

    /// Bind address for the UDP report receiver
    #[arg(long, default_value = "0.0.0.0")]
    pub udp_bind: String,

    /// Port for the UDP report receiver; 0 disables it
    #[arg(long, default_value_t = 5800)]
    pub udp_port: u16,

    /// Cooldown between alerts for the same entity, seconds
    #[arg(long, default_value_t = 300)]
    pub cooldown_secs: u64,

    /// Consecutive falling frames required to confirm a fall
    #[arg(long, default_value_t = 15)]
    pub fall_frames: u32,

    /// Consecutive lying frames required to confirm a fall
    #[arg(long, default_value_t = 30)]
    pub lying_frames: u32,

    /// Evict per-entity state unseen for this many seconds; 0 never evicts
    #[arg(long, default_value_t = 0)]
    pub evict_idle_secs: u64,

    #[command(flatten)]
    pub channels: ChannelArgs,
}

/// Arguments for `fallwatch events`.
#[derive(Args, Debug)]
pub struct EventsArgs {
    /// SQLite event database path
    #[arg(long, default_value = "fall_events.db")]
    pub database: String,

    /// Maximum events to list
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

/// Notification channel selection, shared by `run` and `test-channels`.
#[derive(Args, Debug)]
pub struct ChannelArgs {
    /// Enable the chat channel (requires FALLWATCH_BOT_TOKEN and
    /// FALLWATCH_CHAT_ID)
    #[arg(long)]
    pub enable_chat: bool,

    /// Enable the telephony channel (requires FALLWATCH_AMI_USERNAME and
    /// FALLWATCH_AMI_SECRET)
    #[arg(long)]
    pub enable_telephony: bool,

    /// Telephony manager host
    #[arg(long, default_value = "127.0.0.1")]
    pub ami_host: String,

    /// Telephony manager port
    #[arg(long, default_value_t = 5038)]
    pub ami_port: u16,

    /// Extensions the telephony channel alerts (repeatable)
    #[arg(long = "extension")]
    pub extensions: Vec<String>,
}

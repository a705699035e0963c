//! Command-line interface for lesson-voice
//!
//! Provides argument parsing using clap derive macros.

use crate::commands::VoiceCommandType;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Hands-free voice commands and narration control
#[derive(Parser, Debug)]
#[command(
    name = "lesson-voice",
    version,
    about = "Hands-free voice commands and narration control"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to Unix socket (default: $XDG_RUNTIME_DIR/lesson-voice.sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a voice session in the foreground: narration on stdout, commands
    /// typed on stdin
    Daemon {
        /// Start listening immediately
        #[arg(long)]
        listen: bool,
    },

    /// Start listening via IPC
    Start,

    /// Stop listening via IPC
    Stop,

    /// Toggle listening on/off via IPC
    Toggle,

    /// Get session status via IPC
    Status,

    /// Narrate text
    Say {
        /// Text to speak
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Run a voice command as if it had been spoken (e.g. repeat, volume_up)
    Exec {
        /// Command type
        command: VoiceCommandType,
    },

    /// Pause narration
    Pause,

    /// Resume paused narration
    Resume,

    /// Repeat the current narration
    Repeat,

    /// Stop narration and clear the queue
    Cancel,

    /// Set narration volume (0.0 to 1.0)
    Volume { value: f32 },

    /// Set narration rate (0.1 to 10.0)
    Rate { value: f32 },

    /// List example phrases for every available command
    Commands,

    /// Print the current telemetry session as JSON
    Export,

    /// Stop the daemon
    Shutdown,

    /// Show which command a phrase would trigger, without a daemon
    Match {
        /// Phrase to test
        #[arg(required = true, num_args = 1..)]
        phrase: Vec<String>,

        /// Pick the highest-confidence pattern instead of the first match
        #[arg(long)]
        best: bool,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Get a configuration value by key (e.g., voice.language)
    Get {
        /// Dotted key path (e.g., voice.language, telemetry.max_events)
        key: String,
    },
    /// Print the configuration file path
    Path,
    /// Dump the default configuration as TOML
    Dump,
}

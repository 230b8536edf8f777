use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use memo_core::config::ProviderKind;

#[derive(Parser)]
#[command(name = "memo")]
#[command(about = "Capture memos from the command line and sync them to D1 or Supabase")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local store file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to client config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Quick capture: memo "my thought here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new memo
    #[command(alias = "new")]
    Add {
        /// Memo content
        content: Vec<String>,
        /// Extra tag (repeatable); #tags in the content are picked up too
        #[arg(short, long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// Make the memo visible to guests
        #[arg(long)]
        public: bool,
    },
    /// List memos, pinned first
    List {
        /// Number of memos to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Filter memos by tag name
        #[arg(long)]
        tag: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one memo
    Show {
        /// Memo ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing memo
    Edit {
        /// Memo ID or unique ID prefix
        id: String,
    },
    /// Delete an existing memo
    Delete {
        /// Memo ID or unique ID prefix
        id: String,
    },
    /// Pin a memo to the top
    Pin {
        /// Memo ID or unique ID prefix
        id: String,
    },
    /// Move a pinned memo back to the main list
    Unpin {
        /// Memo ID or unique ID prefix
        id: String,
    },
    /// Change whether guests can see a memo
    Visibility {
        /// Memo ID or unique ID prefix
        id: String,
        #[arg(value_enum)]
        visibility: Visibility,
    },
    /// Link one memo to another
    Link {
        /// Memo ID or unique ID prefix
        id: String,
        /// Target memo ID or unique ID prefix
        target: String,
        /// Remove the link instead of adding it
        #[arg(long)]
        remove: bool,
    },
    /// Attach a recorded audio clip to a memo
    Attach {
        /// Memo ID or unique ID prefix
        id: String,
        /// Where the clip is stored
        url: String,
        /// Clip length in milliseconds
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
    },
    /// Reconcile with the active provider
    Sync {
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Seed an empty local store from the remote
    Restore,
    /// Run the sync scheduler in the foreground; lines typed on stdin become memos
    Watch,
    /// Turn authenticated cloud sync on or off
    CloudSync {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Change synced appearance settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Inspect or switch remote providers
    Provider {
        #[command(subcommand)]
        command: ProviderCommands,
    },
    /// Manage the client config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
pub enum ProviderCommands {
    /// Show the active provider and probe every configured one
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move all data to another provider and make it active
    Switch {
        /// Target provider (d1 or supabase)
        provider: ProviderKind,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print the current theme, font and background
    Show,
    /// Set the accent color or dark mode
    Theme {
        /// Accent color as a hex string, e.g. #818CF8
        #[arg(long, value_name = "HEX")]
        color: Option<String>,
        /// Switch to dark mode
        #[arg(long, conflicts_with = "light")]
        dark: bool,
        /// Switch to light mode
        #[arg(long)]
        light: bool,
    },
    /// Set the background image and its filters
    Background {
        /// Image URL
        #[arg(long, value_name = "URL", conflicts_with = "image")]
        url: Option<String>,
        /// Local image file, embedded as a data URI
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
        /// Brightness 0-100
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        brightness: Option<u8>,
        /// Blur strength 0-50
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=50))]
        blur: Option<u8>,
        /// Use a random background instead of the image
        #[arg(long)]
        random: Option<bool>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the config file
    Init {
        /// Preferred provider (d1 or supabase)
        #[arg(long, value_name = "PROVIDER")]
        provider: Option<ProviderKind>,
        /// D1 API base URL
        #[arg(long, value_name = "URL")]
        d1_url: Option<String>,
        /// Base URL serving the legacy memos route
        #[arg(long, value_name = "URL")]
        d1_fallback_url: Option<String>,
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
    },
    /// Print the effective config (secrets redacted)
    Show,
    /// Print the config file path
    Path,
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// playdeck - playlists, metadata and playback state for remote MP3s
#[derive(Parser, Debug)]
#[command(name = "playdeck", version, about)]
pub struct Args {
    /// Use this config file instead of ~/.config/playdeck/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr instead of the log file
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Generate default config.toml to stdout
    #[arg(long)]
    pub generate_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every playlist, built-in and user-defined
    Playlists,
    /// Print the tracks of a playlist (defaults to "All")
    Show { name: Option<String> },
    /// Create an empty playlist
    Create { name: String },
    /// Delete a user playlist
    Delete { name: String },
    /// Append a track URL to a user playlist
    Add { playlist: String, url: String },
    /// Remove the track at INDEX (0-based) from a playlist
    Remove { playlist: String, index: usize },
    /// Mark a track as favorite
    Favorite { url: String },
    /// Remove a track from favorites
    Unfavorite { url: String },
    /// Remove a track everywhere and drop its metadata
    Forget { url: String },
    /// Resolve metadata for every track of a playlist (defaults to "All")
    Resolve { name: Option<String> },
    /// Print a playlist whenever the stored library changes
    Watch { name: Option<String> },
}

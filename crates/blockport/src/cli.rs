//! Command-line interface definitions using clap.

use crate::output::ExitCode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Block content migration between environments
///
/// Export rewrites local asset IDs inside block payloads into portable image
/// URLs; import downloads those URLs into a media library and rewrites them
/// back into local IDs.
#[derive(Parser)]
#[command(name = "blockport")]
#[command(about = "Block content migration tool")]
#[command(after_help = ExitCode::all_codes_documentation())]
pub struct Cli {
    /// Suppress non-essential output (for scripting)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (default: blockport.toml)
    #[arg(long, global = true, env = "BLOCKPORT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List asset IDs referenced by block payloads in a file
    Scan {
        /// Content file to scan
        file: PathBuf,

        /// List sentinel-wrapped image locators instead of IDs
        #[arg(long)]
        locators: bool,
    },

    /// Rewrite asset IDs into portable image locators
    ///
    /// IDs are resolved either through a running server's control endpoint
    /// or directly against a local media library.
    Export {
        /// Content file to export
        file: PathBuf,

        /// Full URL of a resolve-attachments control endpoint
        #[arg(long, conflicts_with = "library")]
        endpoint: Option<String>,

        /// Bearer token for the control endpoint
        #[arg(long, env = "BLOCKPORT_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Media library to resolve IDs against
        #[arg(long)]
        library: Option<PathBuf>,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download image locators into a media library and restore local IDs
    ///
    /// The file is rewritten in place unless --output is given.
    Import {
        /// Content file to import
        file: PathBuf,

        /// Destination media library
        #[arg(long)]
        library: Option<PathBuf>,

        /// Write the result here instead of rewriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Media library management
    #[command(subcommand)]
    Library(LibraryCommands),
}

#[derive(Subcommand)]
pub enum LibraryCommands {
    /// Create a media library
    Init {
        /// Library directory
        dir: PathBuf,

        /// Public URL under which the library directory is served
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Add a file to a media library
    Add {
        /// File to add
        file: PathBuf,

        /// Media library
        #[arg(long)]
        library: Option<PathBuf>,

        /// Stored name (default: the file's own name)
        #[arg(long)]
        name: Option<String>,
    },

    /// List the assets of a media library
    List {
        /// Media library
        #[arg(long)]
        library: Option<PathBuf>,
    },
}

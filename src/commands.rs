//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to `config.yaml`. Defaults to the per-platform config directory.
    #[arg(long, short = 'c', global = true, env = "FINCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Run the HTTP/WebSocket server.
    #[clap(name = "serve", alias = "s")]
    Serve {
        /// Listen host, overriding the config file.
        #[arg(long)]
        host: Option<String>,

        /// Listen port, overriding the config file.
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Chat API key, overriding the config file.
        #[arg(long, env = "FINCHAT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Mint an access token offline. Requires `signing_secret` in the config.
    Token {
        username: String,
    },

    /// Write a default configuration and prompt template.
    Init,
}

//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::{net::IpAddr, path::PathBuf};

/// Quire content-to-site compiler CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Site root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Output directory path (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file name (default: quire.toml)
    #[arg(short = 'C', long, default_value = "quire.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Shared build arguments for Build, Watch and Serve commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Clean output directory completely before building
    #[arg(long)]
    pub clean: bool,

    /// Publish documents marked as `draft: true`
    #[arg(short, long)]
    pub drafts: bool,

    /// Disable template functions that read arbitrary files
    #[arg(short, long)]
    pub safe: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile the site into the output directory
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Compile the site, then recompile incrementally on change
    Watch {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Compile, then preview the site from memory
    Serve {
        #[command(flatten)]
        build_args: BuildArgs,

        /// IP address to listen on (default: 127.0.0.1)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// First port to try; taken ports are skipped upward
        #[arg(short, long)]
        port: Option<u16>,

        /// Recompile affected outputs while serving (default: true)
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}

impl Cli {
    pub const fn build_args(&self) -> &BuildArgs {
        match &self.command {
            Commands::Build { build_args }
            | Commands::Watch { build_args }
            | Commands::Serve { build_args, .. } => build_args,
        }
    }
}

//! Quire - a content-to-site compiler.

mod build;
mod cli;
mod compiler;
mod config;
mod context;
mod data;
mod document;
mod fs;
mod jail;
mod logger;
mod markup;
mod router;
mod serve;
mod templating;
mod tracker;
mod watch;

use anyhow::Result;
use build::{build_for_watch, build_site};
use clap::Parser;
use cli::{Cli, Commands};
use compiler::Compiler;
use config::SiteConfig;
use context::BuildContext;
use parking_lot::Mutex;
use serve::serve_site;
use std::sync::Arc;
use watch::watch_site;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SiteConfig::load(&cli)?;
    let mut compiler = Compiler::new(BuildContext::new(config)?);

    match &cli.command {
        Commands::Build { .. } => build_site(&mut compiler).map(|_| ()),
        Commands::Watch { .. } => {
            build_for_watch(&mut compiler);
            watch_site(&cli, &Mutex::new(compiler))
        }
        Commands::Serve { .. } => {
            build_for_watch(&mut compiler);
            serve_site(cli.clone(), Arc::new(Mutex::new(compiler)))
        }
    }
}

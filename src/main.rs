//! sitekeeper - build orchestrator for content-driven static sites.

#![allow(dead_code)]

mod actor;
mod cli;
mod config;
mod core;
mod frontmatter;
mod logger;
mod orchestrator;
mod utils;
mod watch;

use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::SiteConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let mut config = SiteConfig::load(&cli)?;

    match &cli.command {
        Commands::Serve {
            no_server,
            validation,
            ..
        } => cli::serve::serve_site(Arc::new(config), *no_server, *validation),
        Commands::Build { validation } => {
            // One-shot builds have no subscribers
            config.live.enable = false;
            cli::build::build_site(Arc::new(config), *validation)
        }
        Commands::Validate { paths, lenient } => {
            cli::validate::validate_site(&config, paths, *lenient)
        }
    }
}

//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::frontmatter::ValidationMode;

/// sitekeeper - build orchestrator for static sites
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: sitekeeper.toml)
    #[arg(short = 'C', long, global = true, default_value = "sitekeeper.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Print debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch sources, rebuild on change and supervise the dev server
    #[command(visible_alias = "s")]
    Serve {
        /// Dev server port (overrides generator.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Only watch and build, do not start the generator dev server
        #[arg(long)]
        no_server: bool,

        /// Whether front matter errors block rebuilds
        #[arg(long, value_enum, default_value_t = ValidationMode::Strict)]
        validation: ValidationMode,
    },

    /// Run one production build
    #[command(visible_alias = "b")]
    Build {
        /// Whether front matter errors block the build
        #[arg(long, value_enum, default_value_t = ValidationMode::Strict)]
        validation: ValidationMode,
    },

    /// Check front matter of content files
    #[command(visible_alias = "v")]
    Validate {
        /// Files or directories to validate. If omitted, validates all content.
        #[arg(value_name = "PATH", value_hint = clap::ValueHint::AnyPath)]
        paths: Vec<PathBuf>,

        /// Report errors as warnings and exit successfully
        #[arg(short, long)]
        lenient: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_args() {
        let cli = Cli::parse_from(["sitekeeper", "serve", "-p", "4000", "--validation", "lenient"]);
        let Commands::Serve {
            port,
            no_server,
            validation,
        } = cli.command
        else {
            panic!("expected serve");
        };
        assert_eq!(port, Some(4000));
        assert!(!no_server);
        assert_eq!(validation, ValidationMode::Lenient);
        assert_eq!(cli.config, PathBuf::from("sitekeeper.toml"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["sitekeeper", "build", "-v", "-C", "site/sitekeeper.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("site/sitekeeper.toml"));
        assert!(matches!(
            cli.command,
            Commands::Build {
                validation: ValidationMode::Strict
            }
        ));
    }

    #[test]
    fn test_validate_paths() {
        let cli = Cli::parse_from(["sitekeeper", "v", "content/posts", "--lenient"]);
        let Commands::Validate { paths, lenient } = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(paths, vec![PathBuf::from("content/posts")]);
        assert!(lenient);
    }
}

// src/main.rs
//! opcat - CLI entry point

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;

mod commands;

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "opcat")]
#[command(version)]
#[command(about = "Render, diff, and prune operator catalogs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render catalog references into declarative configuration
    Render {
        /// Catalog references: config dirs, index db files, or images
        #[arg(required = true)]
        refs: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "yaml", value_parser = ["yaml", "json"])]
        output: String,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Diff two sets of catalog references
    Diff {
        /// Old catalog references or diff config files
        #[arg(long, required = true, num_args = 1..)]
        old: Vec<String>,

        /// New catalog references containing content not in old
        #[arg(long, required = true, num_args = 1..)]
        new: Vec<String>,

        /// Walk the upgrade graph from each recorded channel head
        #[arg(long)]
        fill: bool,

        /// Include every channel head of the new catalog
        #[arg(long)]
        heads: bool,

        /// Close transitive dependencies of the diff
        #[arg(long)]
        deps: bool,

        /// Skip unknown config keys instead of failing
        #[arg(long)]
        permissive: bool,

        /// Root certificates for the image registry collaborator
        #[arg(long)]
        ca_file: Option<String>,

        /// Disable TLS verification in the image registry collaborator
        #[arg(long)]
        skip_tls: bool,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Prune a catalog of selected packages, channels, and bundles
    Prune {
        /// Catalog reference to prune
        #[arg(long)]
        from_index: String,

        /// Prune config file (YAML or JSON)
        #[arg(long)]
        prune_config: String,

        /// Interpret the config as an allow-list
        #[arg(long)]
        keep: bool,

        /// Also keep every channel head (implies --keep)
        #[arg(long)]
        keep_heads: bool,

        /// Skip unknown config keys instead of failing
        #[arg(long)]
        permissive: bool,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Render {
            refs,
            output,
            debug,
        }) => {
            init_logging(debug);
            commands::cmd_render(&refs, &output)
        }

        Some(Commands::Diff {
            old,
            new,
            fill,
            heads,
            deps,
            permissive,
            ca_file,
            skip_tls,
            debug,
        }) => {
            init_logging(debug);
            commands::cmd_diff(commands::DiffArgs {
                old,
                new,
                fill,
                heads,
                deps,
                permissive,
                ca_file,
                skip_tls,
            })
        }

        Some(Commands::Prune {
            from_index,
            prune_config,
            keep,
            keep_heads,
            permissive,
            debug,
        }) => {
            init_logging(debug);
            commands::cmd_prune(&from_index, &prune_config, keep, keep_heads, permissive)
        }

        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "opcat", &mut io::stdout());
            Ok(())
        }

        None => {
            println!("opcat v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'opcat --help' for usage information");
            Ok(())
        }
    }
}

//! exthost - inspect extension manifests and host configuration.
//!
//! The binary is a diagnostic companion to the library: it validates
//! manifests and shows what a host would enable and in which order.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use exthost::core::Config;
use exthost::plugin::{resolve_enabled, DependencyGraph, LoadedManifest, ManifestLoader};

/// Manifest-driven extension host
#[derive(Parser)]
#[command(name = "exthost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default locations
    #[arg(short, long, global = true, env = "EXTHOST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a manifest
    Check {
        /// Manifest file (.json, .toml, .yaml)
        manifest: PathBuf,
    },

    /// Show effective enablement and initialization order
    List {
        /// Manifest file (defaults to `host.manifest` from the config)
        manifest: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Check { manifest } => cmd_check(&manifest),
        Commands::List { manifest, format } => {
            let config = load_config(cli.config.as_deref())?;
            let manifest = manifest
                .or_else(|| config.host.manifest.clone())
                .context("No manifest given and `host.manifest` is not configured")?;
            cmd_list(&manifest, &config, format)
        }
        Commands::Config { path } => cmd_config(cli.config.as_deref(), path),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "exthost", &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load(),
    }
}

fn read_manifest(path: &Path) -> Result<LoadedManifest> {
    ManifestLoader::from_path(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))
}

/// Validate a manifest and report every dropped entry.
fn cmd_check(path: &Path) -> Result<()> {
    let manifest = read_manifest(path)?;

    for descriptor in &manifest.descriptors {
        let mut flags = Vec::new();
        if descriptor.enabled_by_default {
            flags.push("enabled".to_string());
        }
        if descriptor.lazy {
            flags.push("lazy".to_string());
        }
        if !descriptor.dependencies.is_empty() {
            flags.push(format!("after {}", descriptor.dependencies.join(", ")));
        }
        let flags = if flags.is_empty() { String::new() } else { format!(" ({})", flags.join("; ")) };
        println!("ok    {} -> {}{flags}", descriptor.id, descriptor.entry_locator);
    }

    for error in &manifest.errors {
        println!("error {error}");
    }

    println!(
        "\n{} accepted, {} dropped",
        manifest.descriptors.len(),
        manifest.errors.len()
    );

    if !manifest.is_clean() {
        anyhow::bail!("{} manifest entries were dropped", manifest.errors.len());
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry<'a> {
    id: &'a str,
    entry: &'a str,
    enabled: bool,
    lazy: bool,
    dependencies: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    init_order: Option<usize>,
}

/// Show what a host using `config` would enable from `path`.
fn cmd_list(path: &Path, config: &Config, format: Format) -> Result<()> {
    let manifest = read_manifest(path)?;
    let descriptors = &manifest.descriptors;

    let enabled = resolve_enabled(descriptors, Some(&config.plugins));
    let eager: HashSet<String> = descriptors
        .iter()
        .filter(|d| enabled.contains(&d.id) && !d.lazy)
        .map(|d| d.id.clone())
        .collect();
    let order = DependencyGraph::new(descriptors).order(&eager);

    let entries: Vec<_> = descriptors
        .iter()
        .map(|d| ListEntry {
            id: &d.id,
            entry: &d.entry_locator,
            enabled: enabled.contains(&d.id),
            lazy: d.lazy,
            dependencies: &d.dependencies,
            init_order: order.iter().position(|id| *id == d.id).map(|i| i + 1),
        })
        .collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        Format::Text => {
            for entry in &entries {
                let status = match (entry.enabled, entry.lazy) {
                    (false, _) => "disabled",
                    (true, true) => "lazy",
                    (true, false) => "enabled",
                };
                let position =
                    entry.init_order.map_or_else(|| "-".to_string(), |i| i.to_string());
                println!("{position:>3}  {status:<8}  {}", entry.id);
            }
            println!("\nTotal: {} extensions, {} enabled", entries.len(), enabled.len());
        }
    }

    Ok(())
}

/// Print the effective configuration, or where it lives.
fn cmd_config(explicit: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let local = PathBuf::from(exthost::core::LOCAL_CONFIG_FILE);
                if local.exists() { Some(local) } else { Config::global_path() }
            }
        };
        if let Some(path) = path {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = load_config(explicit)?;
    println!("{}", config.to_toml()?);

    Ok(())
}

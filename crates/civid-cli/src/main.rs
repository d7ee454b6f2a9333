//! civid - Identity registration and attribute disclosure CLI.
//!
//! Command-line surface over the civid service: register identities,
//! insert and update health records, and run credential-gated attribute
//! queries. Every command maps its outcome to a distinct exit code per
//! failure class (see [`commands`]).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use civid_core::config::ServiceConfig;

mod commands;

/// civid - identity registration and attribute disclosure service
#[derive(Parser, Debug)]
#[command(name = "civid")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the service configuration file
    #[arg(short, long, default_value = "civid.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database schema and audit directory
    Init,

    /// Register a new identity and print its allocated id
    Register {
        /// Name of the registrant
        name: String,
    },

    /// Insert a health record for a registered identity
    Insert {
        /// Identifier of the registered identity
        id: u32,

        /// Name of the registered doctor
        doctor: String,

        /// Whether the person has asthma (true/false)
        #[arg(action = clap::ArgAction::Set)]
        asthma: bool,

        /// Whether the person has a registered disability (true/false)
        #[arg(action = clap::ArgAction::Set)]
        disability: bool,
    },

    /// Partially update a health record; omitted fields stay unchanged
    Update {
        /// Identifier of the record to update
        id: u32,

        /// New doctor name
        #[arg(long)]
        doctor: Option<String>,

        /// New asthma flag (true/false)
        #[arg(long)]
        asthma: Option<bool>,

        /// New disability flag (true/false)
        #[arg(long)]
        disability: Option<bool>,

        /// Acting party recorded in the update audit trail
        #[arg(long, default_value = "operator")]
        updated_by: String,
    },

    /// Disclose a single attribute for an id, gated on credentials
    Query {
        /// Requesting department name
        requester: String,

        /// Department password
        password: String,

        /// Attribute to disclose (registered_doctor, has_asthma,
        /// has_registered_disability)
        attribute: String,

        /// Identifier to look up
        id: u32,
    },

    /// Disclose the registered-disability flag for an id
    CheckDisability {
        /// Requesting department name
        requester: String,

        /// Department password
        password: String,

        /// Identifier to look up
        id: u32,
    },

    /// Provision (or re-provision) a department credential
    SeedCredential {
        /// Department name
        name: String,

        /// Department password
        password: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config =
        ServiceConfig::load_or_default(&cli.config).context("failed to load configuration")?;

    // Operation failures carry precise per-class exit codes; bypass the
    // anyhow Result handling so those codes reach the caller unchanged.
    let exit_code = commands::run(&config, cli.command)?;
    if exit_code != 0 {
        std::process::exit(i32::from(exit_code));
    }
    Ok(())
}

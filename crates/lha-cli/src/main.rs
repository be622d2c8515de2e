//! Command-line interface for the LHA relay.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lha_api::CredentialVerifier;
use lha_core::{RelayConfig, TargetRegistry};

/// LHA relay - authenticated toggles for garage doors and gates.
#[derive(Parser, Debug)]
#[command(name = "lha")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the relay server.
    Serve {
        /// TOML configuration file.
        #[arg(short, long, env = "LHA_CONFIG")]
        config: Option<PathBuf>,
        /// Host to bind to (overrides configuration).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides configuration).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Mint a bearer token signed with the configured secret.
    Token {
        /// Principal name carried in the `user` claim.
        #[arg(short, long)]
        user: String,
        /// Lifetime in seconds. Tokens never expire when omitted.
        #[arg(long)]
        expires_in: Option<i64>,
        #[arg(short, long, env = "LHA_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the targets the relay would accept.
    Targets {
        #[arg(short, long, env = "LHA_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Serve { config, host, port } => serve(config.as_deref(), host, port).await,
        Command::Token {
            user,
            expires_in,
            config,
        } => mint_token(config.as_deref(), &user, expires_in),
        Command::Targets { config } => list_targets(config.as_deref()),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    // JSON format for production/container environments
    let json_logging = std::env::var("LHA_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn serve(config: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = RelayConfig::load(config).context("Failed to load configuration")?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    lha_api::run(config).await
}

fn mint_token(config: Option<&Path>, user: &str, expires_in: Option<i64>) -> Result<()> {
    let config = RelayConfig::load(config).context("Failed to load configuration")?;
    let user = user.trim();
    if user.is_empty() {
        anyhow::bail!("--user must not be empty");
    }

    let token = CredentialVerifier::new(&config.auth.jwt_secret)
        .issue(user, expires_in)
        .context("Failed to sign token")?;
    println!("{}", token);
    Ok(())
}

/// Resolves the registry without requiring the secret.
fn list_targets(path: Option<&Path>) -> Result<()> {
    let mut config = match path {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok())?;
    let registry = TargetRegistry::from_config(&config)?;

    println!("transport: {}", config.transport.mode.as_str());
    for (name, address) in registry.iter() {
        println!("{:<10} {}", name, address);
    }
    Ok(())
}

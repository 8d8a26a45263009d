/*!
 * gpctl CLI - Command Line Interface
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gpctl::commands::{self, format_status};
use gpctl::ConfigureOptions;
use gpctl_core::config::{DEFAULT_AGENT_PORT, DEFAULT_HUB_PORT};
use gpctl_core::logging::init_cli_logging;
use gpctl_core::{CredentialPaths, ServiceConfig, TlsCredentials};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gpctl")]
#[command(version, about = "Create and manage database clusters through a hub and per-host agents", long_about = None)]
struct Cli {
    /// Service configuration; defaults to $GPHOME/gpctl.toml
    #[arg(short, long, global = true, env = "GPCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the service configuration used by the hub and the agents
    Configure {
        /// Database installation directory
        #[arg(long, env = "GPHOME")]
        gphome: PathBuf,

        /// Hosts that run an agent (repeat or comma-separate)
        #[arg(long = "host", required = true, value_delimiter = ',')]
        hostnames: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_HUB_PORT)]
        hub_port: u16,

        #[arg(long, default_value_t = DEFAULT_AGENT_PORT)]
        agent_port: u16,

        #[arg(long, default_value = "/tmp/gpctl")]
        log_dir: PathBuf,

        #[arg(long)]
        ca_cert: PathBuf,

        #[arg(long)]
        server_cert: PathBuf,

        #[arg(long)]
        server_key: PathBuf,

        #[arg(long)]
        client_cert: PathBuf,

        #[arg(long)]
        client_key: PathBuf,
    },

    /// Start the hub or the agents
    Start {
        #[arg(value_enum)]
        service: Service,
    },

    /// Stop the hub or the agents
    Stop {
        #[arg(value_enum)]
        service: Service,
    },

    /// Show the status of the hub or the agents
    Status {
        #[arg(value_enum)]
        service: Service,
    },

    /// Initialize a new cluster from a cluster description file
    Init {
        /// TOML cluster description
        cluster_file: PathBuf,

        /// Delete the contents of non-empty data directories
        #[arg(long)]
        force: bool,
    },

    /// Remove the data directories left behind by a failed init
    Clean,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Service {
    Hub,
    Agents,
}

fn config_path(cli_path: Option<PathBuf>) -> Result<PathBuf> {
    match cli_path {
        Some(path) => Ok(path),
        None => {
            let gphome = std::env::var_os("GPHOME")
                .context("--config is required when GPHOME is not set")?;
            Ok(ServiceConfig::default_path(&PathBuf::from(gphome)))
        }
    }
}

/// Service configuration and the TLS material it points at.
fn load(cli_path: Option<PathBuf>) -> Result<(PathBuf, ServiceConfig, TlsCredentials)> {
    let path = config_path(cli_path)?;
    let config = ServiceConfig::from_file(&path)
        .with_context(|| format!("Failed to load configuration {}", path.display()))?;
    let credentials =
        TlsCredentials::load(&config.credentials).context("Failed to load TLS credentials")?;
    Ok((path, config, credentials))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_logging(cli.verbose);

    match cli.command {
        Command::Configure {
            gphome,
            hostnames,
            hub_port,
            agent_port,
            log_dir,
            ca_cert,
            server_cert,
            server_key,
            client_cert,
            client_key,
        } => {
            let path = commands::configure(ConfigureOptions {
                gphome,
                hostnames,
                hub_port,
                agent_port,
                log_dir,
                credentials: CredentialPaths {
                    ca_cert,
                    server_cert,
                    server_key,
                    client_cert,
                    client_key,
                },
                output: cli.config,
            })?;
            println!("Configuration written to {}", path.display());
        }
        Command::Start { service } => {
            let (config_path, config, credentials) = load(cli.config)?;
            match service {
                Service::Hub => {
                    let status = commands::start_hub(&config_path, &config, &credentials).await?;
                    println!("Hub started: {}", format_status(&status));
                }
                Service::Agents => {
                    commands::start_agents(&config, &credentials).await?;
                    println!("Agents started on {} hosts", config.hostnames.len());
                }
            }
        }
        Command::Stop { service } => {
            let (_, config, credentials) = load(cli.config)?;
            match service {
                Service::Hub => {
                    commands::stop_hub(&config, &credentials).await?;
                    println!("Hub stopped");
                }
                Service::Agents => {
                    commands::stop_agents(&config, &credentials).await?;
                    println!("Agents stopped");
                }
            }
        }
        Command::Status { service } => {
            let (_, config, credentials) = load(cli.config)?;
            match service {
                Service::Hub => {
                    let status = commands::hub_status(&config, &credentials).await?;
                    println!("{}", format_status(&status));
                }
                Service::Agents => {
                    for status in commands::agent_status(&config, &credentials).await? {
                        println!("{}", format_status(&status));
                    }
                }
            }
        }
        Command::Init {
            cluster_file,
            force,
        } => {
            let (_, config, credentials) = load(cli.config)?;
            commands::init_cluster(&config, &credentials, &cluster_file, force, cli.verbose)
                .await?;
            println!("Cluster initialized");
        }
        Command::Clean => {
            let (_, config, credentials) = load(cli.config)?;
            commands::clean_cluster(&config, &credentials).await?;
            println!("Cleanup complete");
        }
    }

    Ok(())
}

//! offsetting-client: query and offset a household's carbon footprint
//! through an offsetting agent on the pub/sub bus.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use offsetting_client::config::{self, Config};
use offsetting_client::{FlowOutcome, LogNotifier, LogSink, Quantity, Session};
use offsetting_network::RpcPubSub;
use offsetting_storage::IpfsGateway;

const DEFAULT_LOG_FILTER: &str =
    "offsetting_client=info,offsetting_network=info,offsetting_storage=info,offsetting_protocol=info";

#[derive(Parser)]
#[command(name = "offsetting-client")]
#[command(about = "Carbon offsetting client for the agent pub/sub bus")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "OFFSETTING_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask the agent how much energy is left to compensate
    Status {
        /// Consumption readings, overriding the config file
        #[arg(long, value_delimiter = ',')]
        consumption: Option<Vec<String>>,
        /// Production readings, overriding the config file
        #[arg(long, value_delimiter = ',')]
        production: Option<Vec<String>>,
    },
    /// Offset a given amount of energy
    Compensate {
        /// kWh to compensate, as reported by `status`
        #[arg(long)]
        kwh: f64,
    },
    /// Query the status, then offset whatever is left
    Run,
    /// Print the account address
    Address,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => config::default_path().context("no config directory on this platform, pass --config")?,
    };
    tracing::info!(path = %path.display(), "Loading config");
    let config = Config::load(&path)?;
    let account = config.validate()?;

    if let Command::Address = cli.command {
        println!("{}", account.address());
        return Ok(());
    }

    let bus = Arc::new(RpcPubSub::new(config.rpc_config()));
    let store = Arc::new(IpfsGateway::new(&config.ipfs.gateway, config.gateway_auth(&account))?);
    let session = Session::new(
        account,
        config.session_config(),
        bus,
        store,
        Arc::new(LogNotifier),
        Arc::new(LogSink),
    );
    tracing::info!(address = %session.address(), "Session ready");

    let consumption = config.energy.consumption_readings();
    let production = config.energy.production_readings();

    let outcome = match cli.command {
        Command::Status {
            consumption: consumption_override,
            production: production_override,
        } => {
            let consumption = consumption_override.unwrap_or(consumption);
            let production = production_override.unwrap_or(production);
            session.request_status(&consumption, &production).await
        }
        Command::Compensate { kwh } => {
            session.set_to_compensate(Quantity::Kwh(kwh)).await;
            session.submit_compensation().await
        }
        Command::Run => match session.request_status(&consumption, &production).await {
            FlowOutcome::Updated(_) => session.submit_compensation().await,
            other => other,
        },
        Command::Address => FlowOutcome::Skipped,
    };

    println!("{}", session.state().await);
    match outcome {
        FlowOutcome::Updated(_) | FlowOutcome::Skipped => Ok(()),
        FlowOutcome::AgentFailure => anyhow::bail!("offsetting agent reported a failure"),
        FlowOutcome::TimedOut => anyhow::bail!("no response from the offsetting agent"),
        FlowOutcome::Failed(e) => Err(e.into()),
    }
}

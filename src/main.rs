//! Browser-workflow automation on a cloud desktop.
//!
//! Connects to an Orgo cloud computer and hands a single natural-language
//! instruction to the hosted agent loop, which drives the browser remotely.
//! The default workflow processes refund requests from email into a payment
//! dashboard; customize [`WorkflowParams`] to change it.

use anyhow::Result;
use clap::Parser;
use cloud_hands::agent::{Agent, AgentConfig};
use cloud_hands::config::Settings;
use cloud_hands::logging;
use cloud_hands::orgo::{resolve_session, OrgoClient, OrgoComputer, OrgoConfig};
use cloud_hands::workflow::WorkflowParams;
use tracing::{debug, error};

#[derive(Parser)]
#[command(
    name = "cloud-hands",
    version,
    about = "Automate browser workflows with a hosted agent loop on a cloud desktop"
)]
struct Cli {
    /// Reuse an existing cloud computer by ID instead of creating one
    #[arg(long, value_name = "ID")]
    computer_id: Option<String>,

    /// Describe and screenshot intended actions without performing them
    #[arg(long)]
    dry_run: bool,

    /// Enable detailed debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _guard = logging::init(cli.verbose);
    if cli.verbose {
        debug!("verbose logging enabled");
    }
    if let Err(err) = run(cli).await {
        error!("fatal error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env();
    settings.validate()?;

    let client = OrgoClient::new(OrgoConfig::default())?;
    let plan = resolve_session(cli.computer_id.as_deref(), &settings.computer_id);
    let computer = OrgoComputer::acquire(client, plan).await?;

    let params = WorkflowParams {
        search_keywords: settings.search_keywords.clone(),
        ..WorkflowParams::default()
    };
    let cfg = AgentConfig {
        dry_run: cli.dry_run,
        ..AgentConfig::default()
    };

    let agent = Agent::new(computer, settings, params, cfg);
    agent.run().await?;
    Ok(())
}

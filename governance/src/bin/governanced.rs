//! governanced - governance ledger daemon
//!
//! Loads the persisted ledger, resolves closed voting windows and writes the
//! ledger back. `run` keeps sweeping until Ctrl-C.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use governance::{
    snapshot, GovernanceConfig, GovernanceService, ProposalStatus, StaticWeightOracle, Sweeper,
    SystemClock, WeightOracle,
};

#[derive(Parser)]
#[command(name = "governanced")]
#[command(about = "Governance proposal ledger daemon", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "governance.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep periodically until interrupted
    Run,

    /// Resolve every closed window once and exit
    Sweep,

    /// List proposals
    List {
        /// Only show proposals in this status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show one proposal with its tally
    Show {
        /// Proposal id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = GovernanceConfig::load(&cli.config)?;
    let data_dir = config
        .data_dir
        .clone()
        .context("data_dir must be set in the configuration")?;

    let store = Arc::new(snapshot::load(&data_dir).await?);
    let oracle: Arc<dyn WeightOracle> = match &config.balances_file {
        Some(path) => Arc::new(StaticWeightOracle::load(path)?),
        None => Arc::new(StaticWeightOracle::new()),
    };
    let service = Arc::new(GovernanceService::new(
        store,
        oracle,
        Arc::new(SystemClock),
        &config,
    ));

    match cli.command {
        Commands::Run => {
            let handle = Sweeper::new(service.clone(), &config).spawn();
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            log::info!("Shutting down");
            handle.shutdown().await;
            snapshot::save(service.store(), &data_dir).await?;
        }

        Commands::Sweep => {
            let report = Sweeper::new(service.clone(), &config).tick().await;
            for (id, status) in &report.resolved {
                println!("{}  {:?}", id, status);
            }
            println!(
                "Resolved {}, pruned {}",
                report.resolved.len(),
                report.pruned.len()
            );
        }

        Commands::List { status } => {
            let filter = match status.as_deref() {
                Some(s) => match ProposalStatus::parse(s) {
                    Some(parsed) => Some(parsed),
                    None => bail!("unknown status '{}'", s),
                },
                None => None,
            };

            let proposals = service.list_proposals(filter);
            println!("{:<42} {:<14} {:<20} TITLE", "ID", "STATUS", "CLOSES");
            for p in &proposals {
                println!(
                    "{:<42} {:<14} {:<20} {}",
                    p.id,
                    format!("{:?}", p.status),
                    p.voting_closes_at.format("%Y-%m-%d %H:%M"),
                    p.title
                );
            }
            println!("{} proposals", proposals.len());
        }

        Commands::Show { id } => {
            let before = service.store().proposal(&id)?.status;
            let view = service.get_proposal(&id)?;
            println!("{}", serde_json::to_string_pretty(&view)?);

            // Reading may have resolved it
            if view.proposal.status != before {
                snapshot::save(service.store(), &data_dir).await?;
            }
        }
    }

    Ok(())
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use minerwatch::config::{default_config_path, ResolvedConfig};
use minerwatch::exit;
use minerwatch::ledger::{Ledger, SqliteLedger};
use minerwatch::models::Source;
use minerwatch::providers::{BalanceProvider, CloudAtCostProvider, EthermineProvider};
use minerwatch::report::{ConsolePresenter, Goal, SendmailNotifier};
use minerwatch::scheduler::{PollOptions, RunMode, RunOutcome, Scheduler};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "minerwatch")]
#[command(about = "Tracks unpaid mining balances", version)]
struct Cli {
    /// Path to config file (default: ./minerwatch.toml or the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only poll CloudAtCost
    #[arg(short = 'c', long)]
    only_cloudatcost: bool,

    /// Only poll Ethermine
    #[arg(short = 'e', long)]
    only_ethermine: bool,

    /// Rows per table (0 shows the whole history; default fits the terminal)
    #[arg(short, long)]
    records: Option<usize>,

    /// Write a snapshot of the report into this directory and stop
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Poll once, print the ids written and stop
    #[arg(short = 'u', long)]
    only_update: bool,

    /// Poll once, print the latest USD figures and stop
    #[arg(short = 'b', long)]
    only_big: bool,

    /// Mail the report and stop (to ADDR, or to [mail].to when omitted)
    #[arg(short, long, value_name = "ADDR", num_args = 0..=1)]
    mail_to: Option<Option<String>>,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn wants(&self, source: Source) -> bool {
        match (self.only_cloudatcost, self.only_ethermine) {
            (false, false) | (true, true) => true,
            (true, false) => source == Source::CloudAtCost,
            (false, true) => source == Source::Ethermine,
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

fn terminal_lines() -> usize {
    crossterm::terminal::size()
        .map(|(_, rows)| usize::from(rows))
        .unwrap_or(24)
}

async fn run(cli: Cli) -> Result<RunOutcome> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load(&config_path)?;

    let ResolvedConfig {
        ledger_path,
        mut cloudatcost,
        ethermine,
        mail,
    } = config;

    let mut providers: Vec<Box<dyn BalanceProvider>> = Vec::new();
    let mut goals = BTreeMap::new();
    for source in Source::ALL.into_iter().filter(|s| cli.wants(*s)) {
        match source {
            Source::Ethermine => match &ethermine {
                Some(etm) => {
                    goals.insert(source, Goal { usd: etm.goal_usd, coin: etm.goal_eth });
                    providers.push(Box::new(EthermineProvider::new(etm.clone())?));
                }
                None => warn!("No [ethermine] section configured, skipping"),
            },
            Source::CloudAtCost => match cloudatcost.take() {
                Some(cac) => {
                    goals.insert(source, Goal { usd: cac.goal_usd, coin: cac.goal_btc });
                    providers.push(Box::new(CloudAtCostProvider::new(cac)?));
                }
                None => warn!("No [cloudatcost] section configured, skipping"),
            },
        }
    }
    if providers.is_empty() {
        anyhow::bail!("No balance source configured in {}", config_path.display());
    }

    let ledger = Ledger::new(SqliteLedger::open(&ledger_path)?);
    info!(ledger = %ledger_path.display(), sources = providers.len(), "Starting");

    let options = PollOptions {
        mode: RunMode::from_flags(cli.only_big, cli.only_update),
        records: cli.records,
        terminal_lines: terminal_lines(),
        save_dir: cli.save_dir,
        goals,
    };

    let mut scheduler = Scheduler::new(
        providers,
        ledger,
        Box::new(ConsolePresenter::stdout()),
        options,
    );
    if let Some(recipient) = cli.mail_to {
        let to = recipient
            .or(mail.to)
            .context("No mail recipient: pass --mail-to ADDR or set [mail].to")?;
        let from = mail.from.unwrap_or_else(|| to.clone());
        scheduler = scheduler.with_notifier(Box::new(SendmailNotifier::new(mail.command, from, to)));
    }

    scheduler
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let code = match run(cli).await {
        Ok(_) => exit::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            exit::exit_code(&err)
        }
    };
    std::process::exit(code);
}

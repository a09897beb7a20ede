//! walletctl - operator tool for the BoothPay wallet ledger
//!
//! Runs single ledger operations and the escrow and sale workflows against
//! the journal file, printing results as JSON on stdout. Logs go to stderr.

use std::path::PathBuf;

use anyhow::Context;
use boothpay_common::{AccountId, LedgerError, RelatedId};
use boothpay_ledger::{LedgerReceipt, TransactionKind};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boothpay_wallet::{Wallet, WalletConfig};

/// walletctl application
#[derive(Parser)]
#[command(name = "walletctl")]
#[command(about = "BoothPay wallet ledger admin tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Journal file (overrides WALLET_JOURNAL_PATH)
    #[arg(short, long, env = "WALLET_JOURNAL_PATH")]
    journal: Option<PathBuf>,

    /// Require accounts to be opened before use
    #[arg(long)]
    strict: bool,

    /// Print ledger counters in Prometheus format to stderr when done
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Amount and optional note shared by plain credits and debits.
#[derive(clap::Args)]
struct Entry {
    #[arg(value_parser = account_arg)]
    account: AccountId,
    /// Amount in major units, e.g. 12.50
    amount: Decimal,
    #[arg(long)]
    note: Option<String>,
}

/// Entry that may reference an external event, escrow or sale.
#[derive(clap::Args)]
struct RelatedEntry {
    #[command(flatten)]
    entry: Entry,
    #[arg(long)]
    related: Option<String>,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Show an account's balances
    Balance {
        #[arg(value_parser = account_arg)]
        account: AccountId,
    },

    /// Show recent transactions, newest first
    History {
        #[arg(value_parser = account_arg)]
        account: AccountId,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Provision an account
    Open {
        #[arg(value_parser = account_arg)]
        account: AccountId,
    },

    /// Add funds
    Deposit(Entry),

    /// Withdraw available funds
    Withdraw(Entry),

    /// Reserve available funds
    Hold(RelatedEntry),

    /// Return held funds to available
    Release(RelatedEntry),

    /// Finalize held funds
    Capture(RelatedEntry),

    /// Pay available funds out
    Payout(RelatedEntry),

    /// Return funds to an account
    Refund(RelatedEntry),

    /// Replay an account's log and compare with its balances
    Verify {
        #[arg(value_parser = account_arg)]
        account: AccountId,
    },

    /// Capture a host's escrow and pay the contractor
    SettleEscrow {
        #[arg(value_parser = account_arg)]
        host: AccountId,
        #[arg(value_parser = account_arg)]
        contractor: AccountId,
        amount: Decimal,
        #[arg(long)]
        escrow: String,
    },

    /// Charge a buyer for a table sale and split it between seller and platform
    Sale {
        #[arg(value_parser = account_arg)]
        buyer: AccountId,
        #[arg(value_parser = account_arg)]
        seller: AccountId,
        amount: Decimal,
        #[arg(long)]
        sale: String,
    },
}

fn account_arg(value: &str) -> Result<AccountId, LedgerError> {
    AccountId::parse(value)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = WalletConfig::from_env();
    if let Some(journal) = cli.journal.clone() {
        config.journal_path = journal;
    }
    if cli.strict {
        config.ledger.strict_accounts = true;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let wallet = Wallet::open(config).context("failed to open wallet journal")?;

    let result = run(&wallet, cli.command).await;

    if cli.metrics {
        eprint!("{}", wallet.engine().metrics().to_prometheus());
    }
    result
}

async fn run(wallet: &Wallet, command: Commands) -> anyhow::Result<()> {
    let engine = wallet.engine();

    match command {
        Commands::Balance { account } => print_json(&engine.get_balance(&account).await?),
        Commands::History { account, limit } => {
            print_json(&engine.list_transactions(&account, limit).await?)
        }
        Commands::Open { account } => print_json(&engine.open_account(&account).await?),
        Commands::Deposit(entry) => {
            let receipt = apply(wallet, TransactionKind::Deposit, entry, None).await?;
            print_json(&receipt)
        }
        Commands::Withdraw(entry) => {
            let receipt = apply(wallet, TransactionKind::Withdrawal, entry, None).await?;
            print_json(&receipt)
        }
        Commands::Hold(r) => print_json(&apply_related(wallet, TransactionKind::Hold, r).await?),
        Commands::Release(r) => {
            print_json(&apply_related(wallet, TransactionKind::Release, r).await?)
        }
        Commands::Capture(r) => {
            print_json(&apply_related(wallet, TransactionKind::Capture, r).await?)
        }
        Commands::Payout(r) => print_json(&apply_related(wallet, TransactionKind::Payout, r).await?),
        Commands::Refund(r) => print_json(&apply_related(wallet, TransactionKind::Refund, r).await?),
        Commands::Verify { account } => {
            let report = engine.verify_account(&account).await?;
            print_json(&report)?;
            if !report.is_clean() {
                anyhow::bail!("account {} failed verification", account);
            }
            Ok(())
        }
        Commands::SettleEscrow {
            host,
            contractor,
            amount,
            escrow,
        } => {
            let amount = wallet.amount(amount)?;
            let settled = wallet
                .escrow()
                .settle(&host, &contractor, amount, &RelatedId::new(escrow))
                .await?;
            info!(amount = %wallet.money(amount), "Escrow settled");
            print_json(&settled)
        }
        Commands::Sale {
            buyer,
            seller,
            amount,
            sale,
        } => {
            let amount = wallet.amount(amount)?;
            let settled = wallet
                .fee_split()?
                .settle_sale(&buyer, &seller, amount, &RelatedId::new(sale))
                .await?;
            info!(
                gross = %wallet.money(settled.split.gross),
                fee = %wallet.money(settled.split.fee),
                "Sale settled"
            );
            print_json(&settled)
        }
    }
}

async fn apply_related(
    wallet: &Wallet,
    kind: TransactionKind,
    related: RelatedEntry,
) -> anyhow::Result<LedgerReceipt> {
    let related_id = related.related.map(RelatedId::new);
    apply(wallet, kind, related.entry, related_id).await
}

async fn apply(
    wallet: &Wallet,
    kind: TransactionKind,
    entry: Entry,
    related_id: Option<RelatedId>,
) -> anyhow::Result<LedgerReceipt> {
    let engine = wallet.engine();
    let amount = wallet.amount(entry.amount)?;
    let account = &entry.account;
    let note = entry.note;

    let receipt = match kind {
        TransactionKind::Deposit => engine.deposit(account, amount, note).await?,
        TransactionKind::Withdrawal => engine.withdraw(account, amount, note).await?,
        TransactionKind::Hold => engine.hold(account, amount, related_id, note).await?,
        TransactionKind::Release => engine.release(account, amount, related_id, note).await?,
        TransactionKind::Capture => engine.capture(account, amount, related_id, note).await?,
        TransactionKind::Payout => engine.payout(account, amount, related_id, note).await?,
        TransactionKind::Refund => engine.refund(account, amount, related_id, note).await?,
    };
    Ok(receipt)
}

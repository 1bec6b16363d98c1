use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::application::{AccountSession, BankService};
use crate::domain::{Direction, Transaction, format_cents, parse_cents};
use crate::io::Exporter;

/// Coffer - a small bank ledger
#[derive(Parser)]
#[command(name = "coffer")]
#[command(about = "Accounts with PINs, transfers between them and monthly interest")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "coffer.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Name and PIN identifying the account a command acts on
#[derive(Args)]
pub struct Credentials {
    /// Account name
    #[arg(long)]
    pub name: String,

    /// Account PIN
    #[arg(long)]
    pub pin: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Open a new account
    Open {
        /// Account name (must be unique)
        name: String,

        /// Opening balance (e.g., "100.00" or "100")
        #[arg(short, long, default_value = "0")]
        balance: String,

        /// Annual interest rate as a decimal (0.01 for 1%)
        #[arg(short, long, default_value = "0")]
        rate: String,

        /// PIN protecting the account
        #[arg(long)]
        pin: String,
    },

    /// List all accounts
    Accounts,

    /// Show the balance of an account
    Balance {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Deposit money into an account
    Deposit {
        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,

        #[command(flatten)]
        credentials: Credentials,

        /// Description of the deposit
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Amount to withdraw
        amount: String,

        #[command(flatten)]
        credentials: Credentials,

        /// Description of the withdrawal
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Transfer money to another account
    Transfer {
        /// Amount to transfer
        amount: String,

        #[command(flatten)]
        credentials: Credentials,

        /// Recipient account name
        #[arg(long)]
        to: String,
    },

    /// Show an account's transaction history
    History {
        #[command(flatten)]
        credentials: Credentials,

        /// Format: table, csv, json
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Output file for csv/json (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Apply monthly interest to every account
    Interest {
        /// Accrual date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let Cli {
            database, command, ..
        } = self;

        let service = match command {
            Commands::Init => {
                BankService::init(&database).await?;
                println!("Database initialized: {}", database);
                return Ok(());
            }
            Commands::Interest { date } => {
                let service = BankService::connect(&database).await?;
                return run_interest_command(&service, date).await;
            }
            _ => BankService::connect(&database).await?,
        };
        auto_apply_interest(&service).await?;

        match command {
            Commands::Init | Commands::Interest { .. } => {}

            Commands::Open {
                name,
                balance,
                rate,
                pin,
            } => {
                let opening_cents =
                    parse_cents(&balance).context("Invalid balance. Use '100.00' or '100'")?;
                let rate = parse_rate(&rate)?;
                let summary = service
                    .create_account(name, opening_cents, rate, pin)
                    .await?;
                println!(
                    "Opened account '{}' (id {}) with balance {}",
                    summary.name,
                    summary.id,
                    format_cents(summary.balance_cents)
                );
            }

            Commands::Accounts => run_accounts_command(&service),

            Commands::Balance { credentials } => {
                let session = login(&service, &credentials)?;
                let account = service.account(&session)?;
                println!(
                    "{}: {}",
                    account.name,
                    format_cents(account.balance_cents)
                );
            }

            Commands::Deposit {
                amount,
                credentials,
                description,
            } => {
                let session = login(&service, &credentials)?;
                let amount_cents = parse_amount(&amount)?;
                service
                    .deposit(&session, amount_cents, description.as_deref().unwrap_or(""))
                    .await?;
                let account = service.account(&session)?;
                println!(
                    "Deposited {}. New balance: {}",
                    format_cents(amount_cents),
                    format_cents(account.balance_cents)
                );
            }

            Commands::Withdraw {
                amount,
                credentials,
                description,
            } => {
                let session = login(&service, &credentials)?;
                let amount_cents = parse_amount(&amount)?;
                service
                    .withdraw(&session, amount_cents, description.as_deref().unwrap_or(""))
                    .await?;
                let account = service.account(&session)?;
                println!(
                    "Withdrew {}. New balance: {}",
                    format_cents(amount_cents),
                    format_cents(account.balance_cents)
                );
            }

            Commands::Transfer {
                amount,
                credentials,
                to,
            } => {
                let session = login(&service, &credentials)?;
                let amount_cents = parse_amount(&amount)?;
                let result = service.transfer(&session, &to, amount_cents).await?;
                println!(
                    "Transferred {}: {} -> {}",
                    format_cents(result.receipt.outgoing.amount_cents),
                    result.from_account_name,
                    result.to_account_name
                );
            }

            Commands::History {
                credentials,
                format,
                output,
            } => {
                let session = login(&service, &credentials)?;
                run_history_command(&service, &session, &format, output)?;
            }
        }

        Ok(())
    }
}

/// Accrue any interest due before running a command, the way the
/// interactive menu did after every action. A failed accrual aborts the
/// command.
async fn auto_apply_interest(service: &BankService) -> Result<()> {
    let accrued = service
        .apply_monthly_interest()
        .await
        .context("Automatic interest accrual failed")?;
    if !accrued.is_empty() {
        tracing::info!(accounts = accrued.len(), "interest accrued before command");
    }
    Ok(())
}

fn login(service: &BankService, credentials: &Credentials) -> Result<AccountSession> {
    Ok(service.login(&credentials.name, &credentials.pin)?)
}

fn parse_amount(amount: &str) -> Result<i64> {
    parse_cents(amount).context("Invalid amount format. Use '50.00' or '50'")
}

fn parse_rate(rate: &str) -> Result<f64> {
    let value: f64 = rate
        .trim()
        .parse()
        .with_context(|| format!("Invalid interest rate '{}'. Use a decimal like 0.01", rate))?;
    if !value.is_finite() {
        anyhow::bail!("Interest rate must be a finite number");
    }
    Ok(value)
}

fn run_accounts_command(service: &BankService) {
    let accounts = service.list_accounts();
    if accounts.is_empty() {
        println!("No accounts found.");
        return;
    }

    println!(
        "{:<6} {:<20} {:>12} {:>8} {:<12}",
        "ID", "NAME", "BALANCE", "RATE", "INTEREST"
    );
    println!("{}", "-".repeat(62));
    for account in accounts {
        println!(
            "{:<6} {:<20} {:>12} {:>7.2}% {:<12}",
            account.id,
            truncate(&account.name, 20),
            format_cents(account.balance_cents),
            account.interest_rate * 100.0,
            account.last_interest_date.format("%Y-%m").to_string()
        );
    }
}

fn run_history_command(
    service: &BankService,
    session: &AccountSession,
    format: &str,
    output: Option<String>,
) -> Result<()> {
    let exporter = Exporter::new(service);

    match format.to_lowercase().as_str() {
        "table" => print_history_table(&service.history(session)?),
        "csv" => {
            let count = exporter.export_history_csv(session, open_output(&output)?)?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "json" => {
            let count = exporter.export_history_json(session, open_output(&output)?)?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        other => anyhow::bail!("Unknown format '{}'. Use table, csv or json", other),
    }
    Ok(())
}

fn open_output(output: &Option<String>) -> Result<Box<dyn std::io::Write>> {
    Ok(match output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?,
        ),
        None => Box::new(std::io::stdout()),
    })
}

fn print_history_table(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions found.");
        return;
    }

    println!(
        "{:<20} {:<11} {:>12} DESCRIPTION",
        "DATE", "TYPE", "AMOUNT"
    );
    println!("{}", "-".repeat(70));
    for transaction in transactions {
        let signed = match transaction.direction {
            Direction::Incoming => format!("+{}", format_cents(transaction.amount_cents)),
            Direction::Outgoing => format!("-{}", format_cents(transaction.amount_cents)),
        };
        println!(
            "{:<20} {:<11} {:>12} {}",
            transaction.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            transaction.kind.as_str(),
            signed,
            truncate(transaction.description.as_deref().unwrap_or(""), 30)
        );
    }
}

async fn run_interest_command(service: &BankService, date: Option<String>) -> Result<()> {
    let accrued = match date {
        Some(date_str) => {
            let today = parse_date(&date_str)?;
            service.apply_monthly_interest_on(today).await?
        }
        None => service.apply_monthly_interest().await?,
    };

    if accrued.is_empty() {
        println!("No account was due for interest.");
        return Ok(());
    }

    let names = service.list_accounts();
    for transaction in &accrued {
        let name = names
            .iter()
            .find(|account| account.id == transaction.account_id)
            .map(|account| account.name.as_str())
            .unwrap_or("?");
        println!(
            "{:<20} {}{}",
            name,
            if transaction.is_incoming() { "+" } else { "-" },
            format_cents(transaction.amount_cents)
        );
    }
    println!("Applied interest to {} account(s).", accrued.len());
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str))
}

mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use coffer::application::BankService;
use coffer::cli::Cli;
use coffer::domain::{Account, Pin, TransactionKind};
use coffer::storage::Repository;
use common::{accept_transactions, reject_transactions, side_connection};
use tempfile::TempDir;

/// A database holding alice, opened two months ago and therefore due for
/// interest.
async fn database_with_account_due_for_interest() -> Result<(TempDir, String)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let database = db_path.to_str().unwrap().to_string();

    let repo = Repository::init(&format!("sqlite:{}?mode=rwc", database)).await?;
    let opened = Utc::now() - Duration::days(62);
    let alice = Account::new(1, "alice", 10000, 0.12, Pin::new("1234"), opened);
    repo.insert_account(&alice).await?;

    Ok((temp_dir, database))
}

fn deposit_command(database: &str, amount: &str) -> Result<Cli> {
    Ok(Cli::try_parse_from([
        "coffer",
        "--database",
        database,
        "deposit",
        amount,
        "--name",
        "alice",
        "--pin",
        "1234",
    ])?)
}

#[tokio::test]
async fn test_commands_accrue_due_interest_first() -> Result<()> {
    let (_temp, database) = database_with_account_due_for_interest().await?;

    deposit_command(&database, "5")?.run().await?;

    let service = BankService::connect(&database).await?;
    let alice = service.login("alice", "1234")?;
    let kinds: Vec<TransactionKind> = service
        .history(&alice)?
        .iter()
        .map(|transaction| transaction.kind)
        .collect();
    assert_eq!(kinds, [TransactionKind::Interest, TransactionKind::Deposit]);
    assert_eq!(service.account(&alice)?.balance_cents, 10600);

    Ok(())
}

#[tokio::test]
async fn test_failed_accrual_aborts_the_command() -> Result<()> {
    let (temp, database) = database_with_account_due_for_interest().await?;
    let db = side_connection(&temp).await?;
    reject_transactions(&db, "interest").await?;

    assert!(deposit_command(&database, "5")?.run().await.is_err());

    let service = BankService::connect(&database).await?;
    let alice = service.login("alice", "1234")?;
    assert_eq!(service.account(&alice)?.balance_cents, 10000);
    assert!(service.history(&alice)?.is_empty());
    drop(service);

    // Once accruals persist again, the missed month is still paid
    accept_transactions(&db, "interest").await?;
    deposit_command(&database, "5")?.run().await?;

    let service = BankService::connect(&database).await?;
    let alice = service.login("alice", "1234")?;
    assert_eq!(service.account(&alice)?.balance_cents, 10600);
    assert_eq!(service.history(&alice)?.len(), 2);

    Ok(())
}

// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{Months, NaiveDate, Utc};
use coffer::application::{AccountSession, BankService};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(BankService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = BankService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Reopen the database behind a test service.
pub async fn reopen(temp_dir: &TempDir) -> Result<BankService> {
    let db_path = temp_dir.path().join("test.db");
    Ok(BankService::connect(db_path.to_str().unwrap()).await?)
}

/// A second connection to the database behind a test service, used to make
/// the service's writes fail.
pub async fn side_connection(temp_dir: &TempDir) -> Result<SqlitePool> {
    let db_path = temp_dir.path().join("test.db");
    Ok(SqlitePool::connect(&format!("sqlite:{}", db_path.display())).await?)
}

/// Make every insert of a `kind` transaction row abort.
pub async fn reject_transactions(pool: &SqlitePool, kind: &str) -> Result<()> {
    sqlx::query(&format!(
        "CREATE TRIGGER reject_{kind} BEFORE INSERT ON transactions \
         WHEN NEW.kind = '{kind}' \
         BEGIN SELECT RAISE(ABORT, '{kind} rejected'); END"
    ))
    .execute(pool)
    .await?;
    Ok(())
}

/// Undo [`reject_transactions`].
pub async fn accept_transactions(pool: &SqlitePool, kind: &str) -> Result<()> {
    sqlx::query(&format!("DROP TRIGGER reject_{kind}"))
        .execute(pool)
        .await?;
    Ok(())
}

/// A date in the month after the current one, when interest is next due
/// for accounts opened today.
pub fn next_month() -> NaiveDate {
    Utc::now()
        .date_naive()
        .checked_add_months(Months::new(1))
        .unwrap()
}

/// Test fixture: the accounts used across scenarios
pub struct StandardAccounts;

impl StandardAccounts {
    /// alice: 100.00 at 12%, PIN 1234
    pub async fn alice(service: &BankService) -> Result<AccountSession> {
        service
            .create_account("alice".into(), 10000, 0.12, "1234".into())
            .await?;
        Ok(service.login("alice", "1234")?)
    }

    /// bob: empty account at 12%, PIN 0000
    pub async fn bob(service: &BankService) -> Result<AccountSession> {
        service
            .create_account("bob".into(), 0, 0.12, "0000".into())
            .await?;
        Ok(service.login("bob", "0000")?)
    }
}

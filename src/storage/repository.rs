use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{Account, AccountId, Cents, Direction, Pin, Transaction, TransactionKind};

use super::MIGRATION_001_INITIAL;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Changes made to one account by an operation: the transactions it
/// appended and, when one of them is interest, the new accrual marker.
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub account_id: AccountId,
    pub last_interest_date: Option<NaiveDate>,
    pub new_transactions: Vec<Transaction>,
}

impl AccountUpdate {
    pub fn new(account: &Account, new_transactions: Vec<Transaction>) -> Self {
        let accrued = new_transactions
            .iter()
            .any(|transaction| transaction.kind == TransactionKind::Interest);
        Self {
            account_id: account.id(),
            last_interest_date: accrued.then(|| account.last_interest_date()),
            new_transactions,
        }
    }

    /// Net effect of the new transactions on the stored balance.
    pub fn balance_delta(&self) -> Cents {
        self.new_transactions
            .iter()
            .map(Transaction::signed_amount)
            .sum()
    }
}

/// Repository for persisting and loading accounts and their transactions.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Account operations
    // ========================

    /// Save a newly opened account.
    pub async fn insert_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, opening_balance_cents, balance_cents, interest_rate, pin, last_interest_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id())
        .bind(account.name())
        .bind(account.opening_balance_cents())
        .bind(account.balance_cents())
        .bind(account.interest_rate())
        .bind(account.pin().as_str())
        .bind(account.last_interest_date().format(DATE_FORMAT).to_string())
        .bind(account.created_at().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    /// Load every account with its full transaction log.
    pub async fn load_accounts(&self) -> Result<Vec<Account>> {
        let mut logs = self.load_transactions().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, name, opening_balance_cents, balance_cents, interest_rate, pin, last_interest_date, created_at
            FROM accounts
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter()
            .map(|row| {
                let id: AccountId = row.get("id");
                let transactions = logs.remove(&id).unwrap_or_default();
                Self::row_to_account(row, transactions)
            })
            .collect()
    }

    /// Write the result of one operation in a single database transaction,
    /// so both sides of a transfer land together or not at all. Balances are
    /// adjusted by the net of the new transactions, and the accrual marker
    /// only moves forward and only with interest, so commits from the same
    /// process may land in any order.
    pub async fn commit(&self, updates: &[AccountUpdate]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        for update in updates {
            sqlx::query(
                r#"
                UPDATE accounts
                SET balance_cents = balance_cents + ?,
                    last_interest_date = COALESCE(MAX(last_interest_date, ?), last_interest_date)
                WHERE id = ?
                "#,
            )
            .bind(update.balance_delta())
            .bind(
                update
                    .last_interest_date
                    .map(|date| date.format(DATE_FORMAT).to_string()),
            )
            .bind(update.account_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update account")?;

            for transaction in &update.new_transactions {
                sqlx::query(
                    r#"
                    INSERT INTO transactions (id, account_id, amount_cents, kind, direction, description, counterparty, timestamp)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(transaction.id.to_string())
                .bind(transaction.account_id)
                .bind(transaction.amount_cents)
                .bind(transaction.kind.as_str())
                .bind(transaction.direction.as_str())
                .bind(&transaction.description)
                .bind(&transaction.counterparty)
                .bind(transaction.timestamp.to_rfc3339())
                .execute(&mut *tx)
                .await
                .context("Failed to save transaction")?;
            }
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }

    async fn load_transactions(&self) -> Result<HashMap<AccountId, Vec<Transaction>>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount_cents, kind, direction, description, counterparty, timestamp
            FROM transactions
            ORDER BY sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        let mut logs: HashMap<AccountId, Vec<Transaction>> = HashMap::new();
        for row in &rows {
            let transaction = Self::row_to_transaction(row)?;
            logs.entry(transaction.account_id)
                .or_default()
                .push(transaction);
        }
        Ok(logs)
    }

    fn row_to_account(
        row: &sqlx::sqlite::SqliteRow,
        transactions: Vec<Transaction>,
    ) -> Result<Account> {
        let pin: String = row.get("pin");
        let last_interest_str: String = row.get("last_interest_date");
        let created_at_str: String = row.get("created_at");

        let account = Account::new(
            row.get("id"),
            row.get::<String, _>("name"),
            row.get("opening_balance_cents"),
            row.get("interest_rate"),
            Pin::new(pin),
            DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        );

        Ok(account.restore(
            row.get("balance_cents"),
            NaiveDate::parse_from_str(&last_interest_str, DATE_FORMAT)
                .context("Invalid last_interest_date")?,
            transactions,
        ))
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let kind_str: String = row.get("kind");
        let direction_str: String = row.get("direction");
        let timestamp_str: String = row.get("timestamp");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            account_id: row.get("account_id"),
            amount_cents: row.get("amount_cents"),
            kind: TransactionKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
            direction: Direction::from_str(&direction_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid direction: {}", direction_str))?,
            description: row.get("description"),
            counterparty: row.get("counterparty"),
            timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                .context("Invalid timestamp")?
                .with_timezone(&Utc),
        })
    }
}

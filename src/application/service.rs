use std::collections::HashMap;

use chrono::{NaiveDate, Utc};

use crate::domain::{
    Account, AccountId, AccountRef, Bank, BankConfig, Cents, LedgerError, NewAccount,
    Transaction, TransferReceipt,
};
use crate::storage::{AccountUpdate, Repository};

use super::AppError;

/// Bank service providing high-level operations over the registry.
/// This is the primary interface for any shell (CLI, web, desktop).
pub struct BankService {
    bank: Bank,
    repo: Repository,
}

/// Proof that a caller authenticated as an account. Shells keep this between
/// calls (or just its id, resuming with [`BankService::resume`]) and pass it
/// to every account operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSession {
    account_id: AccountId,
}

impl AccountSession {
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }
}

/// Read-only view of an account for display
#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub id: AccountId,
    pub name: String,
    pub balance_cents: Cents,
    pub interest_rate: f64,
    pub last_interest_date: NaiveDate,
    pub transaction_count: usize,
}

impl AccountSummary {
    fn of(account: &Account) -> Self {
        Self {
            id: account.id(),
            name: account.name().to_string(),
            balance_cents: account.balance_cents(),
            interest_rate: account.interest_rate(),
            last_interest_date: account.last_interest_date(),
            transaction_count: account.transactions().len(),
        }
    }
}

/// Result of a completed transfer
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub receipt: TransferReceipt,
    pub from_account_name: String,
    pub to_account_name: String,
}

impl BankService {
    /// Load every account from the repository into a fresh registry.
    pub async fn load(repo: Repository, config: BankConfig) -> Result<Self, AppError> {
        let accounts = repo.load_accounts().await?;
        let bank = Bank::from_accounts(config, accounts)?;
        tracing::debug!(accounts = bank.len(), "bank loaded");
        Ok(Self { bank, repo })
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Self::load(repo, BankConfig::default()).await
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        Self::connect_with_config(database_path, BankConfig::default()).await
    }

    pub async fn connect_with_config(
        database_path: &str,
        config: BankConfig,
    ) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Self::load(repo, config).await
    }

    /// The in-memory registry.
    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    // ========================
    // Account operations
    // ========================

    /// Open a new account.
    pub async fn create_account(
        &self,
        name: String,
        opening_balance_cents: Cents,
        interest_rate: f64,
        pin: String,
    ) -> Result<AccountSummary, AppError> {
        let handle = self.bank.create_account(NewAccount {
            name,
            opening_balance_cents,
            interest_rate,
            pin,
        })?;
        let summary = {
            let account = handle.lock().clone();
            self.repo.insert_account(&account).await?;
            AccountSummary::of(&account)
        };

        tracing::info!(id = summary.id, name = %summary.name, "account opened");
        Ok(summary)
    }

    /// Authenticate by name and PIN.
    pub fn login(&self, name: &str, pin: &str) -> Result<AccountSession, AppError> {
        match self.bank.get_account(name, pin) {
            Ok(handle) => Ok(AccountSession {
                account_id: handle.id(),
            }),
            Err(err) => {
                tracing::warn!("rejected login attempt");
                Err(err.into())
            }
        }
    }

    /// Rebuild a session from an account id a shell kept between requests.
    pub fn resume(&self, account_id: AccountId) -> Result<AccountSession, AppError> {
        self.handle(&AccountSession { account_id })
            .map(|handle| AccountSession {
                account_id: handle.id(),
            })
    }

    pub fn account(&self, session: &AccountSession) -> Result<AccountSummary, AppError> {
        let handle = self.handle(session)?;
        let account = handle.lock();
        Ok(AccountSummary::of(&account))
    }

    /// All accounts, sorted by name.
    pub fn list_accounts(&self) -> Vec<AccountSummary> {
        self.bank
            .accounts()
            .iter()
            .map(|handle| AccountSummary::of(&handle.lock()))
            .collect()
    }

    /// The account's ledger in chronological order.
    pub fn history(&self, session: &AccountSession) -> Result<Vec<Transaction>, AppError> {
        let handle = self.handle(session)?;
        let account = handle.lock();
        Ok(account.transactions().to_vec())
    }

    pub async fn deposit(
        &self,
        session: &AccountSession,
        amount_cents: Cents,
        description: &str,
    ) -> Result<Transaction, AppError> {
        let handle = self.handle(session)?;
        let (transaction, pending) = {
            let mut account = handle.lock();
            let transaction = account.deposit(amount_cents, description)?.clone();
            let pending = Pending::new(&handle, &account, vec![transaction.clone()]);
            (transaction, pending)
        };
        self.persist(vec![pending]).await?;

        tracing::info!(account = handle.name(), amount_cents, "deposit recorded");
        Ok(transaction)
    }

    pub async fn withdraw(
        &self,
        session: &AccountSession,
        amount_cents: Cents,
        description: &str,
    ) -> Result<Transaction, AppError> {
        let handle = self.handle(session)?;
        let (transaction, pending) = {
            let mut account = handle.lock();
            let transaction = account.withdraw(amount_cents, description)?.clone();
            let pending = Pending::new(&handle, &account, vec![transaction.clone()]);
            (transaction, pending)
        };
        self.persist(vec![pending]).await?;

        tracing::info!(account = handle.name(), amount_cents, "withdrawal recorded");
        Ok(transaction)
    }

    /// Transfer from the session's account to the account named `to_name`.
    /// Both sides are committed in one database transaction.
    pub async fn transfer(
        &self,
        session: &AccountSession,
        to_name: &str,
        amount_cents: Cents,
    ) -> Result<TransferResult, AppError> {
        let from = self.handle(session)?;
        let to = self
            .bank
            .find_account(to_name)
            .ok_or_else(|| LedgerError::RecipientNotFound(to_name.to_string()))?;
        let receipt = self.bank.transfer(&from, &to, amount_cents)?;

        let outgoing = Pending::new(&from, &from.lock(), vec![receipt.outgoing.clone()]);
        let incoming = Pending::new(&to, &to.lock(), vec![receipt.incoming.clone()]);
        self.persist(vec![outgoing, incoming]).await?;

        tracing::info!(
            from = from.name(),
            to = to.name(),
            amount_cents,
            "transfer recorded"
        );
        Ok(TransferResult {
            receipt,
            from_account_name: from.name().to_string(),
            to_account_name: to.name().to_string(),
        })
    }

    /// Accrue this month's interest on every account.
    pub async fn apply_monthly_interest(&self) -> Result<Vec<Transaction>, AppError> {
        self.apply_monthly_interest_on(Utc::now().date_naive()).await
    }

    /// Accrue interest as of `today`. Accounts already accrued for that
    /// month are left alone.
    pub async fn apply_monthly_interest_on(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        let markers: HashMap<AccountId, NaiveDate> = self
            .bank
            .accounts()
            .iter()
            .map(|handle| (handle.id(), handle.lock().last_interest_date()))
            .collect();

        let accrued = self.bank.apply_monthly_interest_all_accounts(today);
        if accrued.is_empty() {
            tracing::debug!(%today, "no account due for interest");
            return Ok(accrued);
        }

        let pending = accrued
            .iter()
            .map(|transaction| {
                let handle = self
                    .bank
                    .get_account_by_id(transaction.account_id)
                    .ok_or(AppError::SessionExpired(transaction.account_id))?;
                let account = handle.lock();
                let mut pending = Pending::new(&handle, &account, vec![transaction.clone()]);
                if let Some(previous) = markers.get(&transaction.account_id) {
                    pending.previous_interest_date = *previous;
                }
                Ok(pending)
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        self.persist(pending).await?;

        tracing::info!(%today, accounts = accrued.len(), "monthly interest applied");
        Ok(accrued)
    }

    /// Commit the changes of one operation. If the commit fails the changes
    /// are taken back out of the registry, so memory never runs ahead of the
    /// database.
    async fn persist(&self, pending: Vec<Pending>) -> Result<(), AppError> {
        let updates: Vec<AccountUpdate> = pending.iter().map(|p| p.update.clone()).collect();
        if let Err(err) = self.repo.commit(&updates).await {
            for p in &pending {
                p.handle
                    .lock()
                    .revert(&p.update.new_transactions, p.previous_interest_date);
            }
            tracing::error!(error = %err, "commit failed, changes reverted");
            return Err(err.into());
        }
        Ok(())
    }

    fn handle(&self, session: &AccountSession) -> Result<AccountRef, AppError> {
        self.bank
            .get_account_by_id(session.account_id)
            .ok_or(AppError::SessionExpired(session.account_id))
    }
}

/// An applied but not yet persisted change to one account.
struct Pending {
    handle: AccountRef,
    update: AccountUpdate,
    previous_interest_date: NaiveDate,
}

impl Pending {
    fn new(handle: &AccountRef, account: &Account, transactions: Vec<Transaction>) -> Self {
        Self {
            handle: AccountRef::clone(handle),
            update: AccountUpdate::new(account, transactions),
            previous_interest_date: account.last_interest_date(),
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};

use super::account::ensure_positive;
use super::{Account, AccountId, Cents, LedgerError, Pin, Transaction};

pub const DEFAULT_PIN_LENGTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankConfig {
    /// Exact number of characters a PIN must have
    pub pin_length: usize,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            pin_length: DEFAULT_PIN_LENGTH,
        }
    }
}

/// Parameters for opening an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub opening_balance_cents: Cents,
    pub interest_rate: f64,
    pub pin: String,
}

/// A registered account behind its own lock. The id and name are copied out
/// of the account so they can be read without locking it.
#[derive(Debug)]
pub struct AccountHandle {
    id: AccountId,
    name: String,
    account: Mutex<Account>,
}

impl AccountHandle {
    fn new(account: Account) -> Self {
        Self {
            id: account.id(),
            name: account.name().to_string(),
            account: Mutex::new(account),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclusive access to the account for the lifetime of the guard.
    pub fn lock(&self) -> MutexGuard<'_, Account> {
        self.account.lock()
    }
}

pub type AccountRef = Arc<AccountHandle>;

/// Both sides of a completed transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub outgoing: Transaction,
    pub incoming: Transaction,
}

#[derive(Default)]
struct Accounts {
    by_name: HashMap<String, AccountRef>,
    by_id: HashMap<AccountId, AccountRef>,
    next_id: AccountId,
}

impl Accounts {
    fn insert(&mut self, account: Account) -> Result<AccountRef, LedgerError> {
        if self.by_name.contains_key(account.name()) {
            return Err(LedgerError::DuplicateName(account.name().to_string()));
        }
        self.next_id = self.next_id.max(account.id() + 1);
        let handle = Arc::new(AccountHandle::new(account));
        self.by_name
            .insert(handle.name().to_string(), Arc::clone(&handle));
        self.by_id.insert(handle.id(), Arc::clone(&handle));
        Ok(handle)
    }
}

/// The registry of all accounts, keyed by unique name.
///
/// Each account sits behind its own mutex, so operations on one account
/// never observe a half-applied operation on it. Transfers lock both
/// accounts in name order and mutate them under both locks.
pub struct Bank {
    config: BankConfig,
    accounts: RwLock<Accounts>,
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}

impl Bank {
    pub fn new() -> Self {
        Self::with_config(BankConfig::default())
    }

    pub fn with_config(config: BankConfig) -> Self {
        Self {
            config,
            accounts: RwLock::new(Accounts {
                next_id: 1,
                ..Accounts::default()
            }),
        }
    }

    /// Rebuild a registry from previously persisted accounts.
    pub fn from_accounts(
        config: BankConfig,
        accounts: impl IntoIterator<Item = Account>,
    ) -> Result<Self, LedgerError> {
        let bank = Self::with_config(config);
        {
            let mut registry = bank.accounts.write();
            for account in accounts {
                registry.insert(account)?;
            }
        }
        Ok(bank)
    }

    pub fn config(&self) -> BankConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.accounts.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a new account. Fails without touching the registry when the
    /// name is taken.
    pub fn create_account(&self, new: NewAccount) -> Result<AccountRef, LedgerError> {
        self.create_account_at(new, Utc::now())
    }

    pub fn create_account_at(
        &self,
        new: NewAccount,
        created_at: DateTime<Utc>,
    ) -> Result<AccountRef, LedgerError> {
        if new.opening_balance_cents < 0 {
            return Err(LedgerError::InvalidAmount(
                "Opening balance cannot be negative".to_string(),
            ));
        }
        let pin = Pin::new(new.pin);
        if pin.len() != self.config.pin_length {
            return Err(LedgerError::InvalidPin {
                expected: self.config.pin_length,
            });
        }

        let mut registry = self.accounts.write();
        if registry.by_name.contains_key(&new.name) {
            tracing::debug!(name = %new.name, "account name already taken");
            return Err(LedgerError::DuplicateName(new.name));
        }

        let account = Account::new(
            registry.next_id,
            new.name,
            new.opening_balance_cents,
            new.interest_rate,
            pin,
            created_at,
        );
        let handle = registry.insert(account)?;
        tracing::debug!(id = handle.id(), name = handle.name(), "account created");
        Ok(handle)
    }

    /// Look an account up by credentials. An unknown name and a wrong PIN
    /// produce the same error.
    pub fn get_account(&self, name: &str, pin: &str) -> Result<AccountRef, LedgerError> {
        self.find_account(name)
            .filter(|handle| handle.lock().verify_pin(pin))
            .ok_or(LedgerError::InvalidCredentials)
    }

    /// Look an account up by id, for callers that already authenticated.
    pub fn get_account_by_id(&self, id: AccountId) -> Option<AccountRef> {
        self.accounts.read().by_id.get(&id).cloned()
    }

    /// Name-only lookup, used to resolve transfer recipients.
    pub fn find_account(&self, name: &str) -> Option<AccountRef> {
        self.accounts.read().by_name.get(name).cloned()
    }

    /// All accounts, sorted by name.
    pub fn accounts(&self) -> Vec<AccountRef> {
        let mut handles: Vec<AccountRef> =
            self.accounts.read().by_name.values().cloned().collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    /// Move money between two accounts as one unit: either both sides are
    /// recorded or neither is.
    pub fn transfer(
        &self,
        from: &AccountRef,
        to: &AccountRef,
        amount_cents: Cents,
    ) -> Result<TransferReceipt, LedgerError> {
        if from.id() == to.id() {
            return Err(LedgerError::SameAccount);
        }
        ensure_positive(amount_cents)?;

        // Fixed lock order prevents two opposite transfers from deadlocking
        let from_first = from.name() <= to.name();
        let (first, second) = if from_first { (from, to) } else { (to, from) };
        let mut first_guard = first.lock();
        let mut second_guard = second.lock();
        let (source, destination) = if from_first {
            (&mut *first_guard, &mut *second_guard)
        } else {
            (&mut *second_guard, &mut *first_guard)
        };

        source.ensure_funds(amount_cents)?;
        destination.credited(amount_cents)?;

        let outgoing = source
            .send_transfer(amount_cents, destination.name())
            .clone();
        let incoming = destination
            .receive_transfer(amount_cents, source.name())
            .clone();

        tracing::debug!(
            from = source.name(),
            to = destination.name(),
            amount_cents,
            "transfer applied"
        );
        Ok(TransferReceipt { outgoing, incoming })
    }

    /// Transfer to an account identified by name.
    pub fn transfer_to(
        &self,
        from: &AccountRef,
        to_name: &str,
        amount_cents: Cents,
    ) -> Result<TransferReceipt, LedgerError> {
        let to = self
            .find_account(to_name)
            .ok_or_else(|| LedgerError::RecipientNotFound(to_name.to_string()))?;
        self.transfer(from, &to, amount_cents)
    }

    /// Accrue monthly interest on every account. Returns the interest
    /// transactions recorded; accounts already accrued this month are
    /// skipped.
    pub fn apply_monthly_interest_all_accounts(&self, today: NaiveDate) -> Vec<Transaction> {
        self.accounts()
            .iter()
            .filter_map(|handle| handle.lock().apply_monthly_interest(today).cloned())
            .collect()
    }
}

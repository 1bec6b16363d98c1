use chrono::{DateTime, Datelike, NaiveDate, Utc};

use super::{Cents, Direction, LedgerError, Transaction, TransactionKind, monthly_interest};

pub type AccountId = i64;

/// Account credential. Compared by exact match and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(pin.into())
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }

    /// Number of characters in the PIN.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pin(****)")
    }
}

/// First day of the month containing `date`.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// A customer account. State only changes through the methods below, each of
/// which records exactly one transaction in the account's log.
#[derive(Debug, Clone)]
pub struct Account {
    id: AccountId,
    name: String,
    opening_balance_cents: Cents,
    balance_cents: Cents,
    /// Annual nominal rate, e.g. 0.12 for 12%
    interest_rate: f64,
    pin: Pin,
    /// Date of the last accrual; interest runs at most once per calendar month
    last_interest_date: NaiveDate,
    created_at: DateTime<Utc>,
    transactions: Vec<Transaction>,
}

impl Account {
    /// Open an account. The accrual marker starts on the first day of the
    /// opening month, so the first interest is paid the month after.
    pub fn new(
        id: AccountId,
        name: impl Into<String>,
        opening_balance_cents: Cents,
        interest_rate: f64,
        pin: Pin,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            opening_balance_cents,
            balance_cents: opening_balance_cents,
            interest_rate,
            pin,
            last_interest_date: first_of_month(created_at.date_naive()),
            created_at,
            transactions: Vec::new(),
        }
    }

    /// Rebuild an account from persisted state.
    pub(crate) fn restore(
        mut self,
        balance_cents: Cents,
        last_interest_date: NaiveDate,
        transactions: Vec<Transaction>,
    ) -> Self {
        self.balance_cents = balance_cents;
        self.last_interest_date = last_interest_date;
        self.transactions = transactions;
        self
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balance_cents(&self) -> Cents {
        self.balance_cents
    }

    pub fn opening_balance_cents(&self) -> Cents {
        self.opening_balance_cents
    }

    pub fn interest_rate(&self) -> f64 {
        self.interest_rate
    }

    pub fn pin(&self) -> &Pin {
        &self.pin
    }

    pub fn verify_pin(&self, candidate: &str) -> bool {
        self.pin.matches(candidate)
    }

    pub fn last_interest_date(&self) -> NaiveDate {
        self.last_interest_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The ledger in insertion order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Balance recomputed from the opening balance and the ledger.
    /// Always equal to `balance_cents`.
    pub fn ledger_balance(&self) -> Cents {
        self.transactions
            .iter()
            .fold(self.opening_balance_cents, |balance, tx| {
                balance + tx.signed_amount()
            })
    }

    pub fn deposit(
        &mut self,
        amount_cents: Cents,
        description: &str,
    ) -> Result<&Transaction, LedgerError> {
        ensure_positive(amount_cents)?;
        let new_balance = self.credited(amount_cents)?;
        self.balance_cents = new_balance;

        let tx = Transaction::new(
            self.id,
            TransactionKind::Deposit,
            Direction::Incoming,
            amount_cents,
        )
        .with_description(description);
        Ok(self.record(tx))
    }

    pub fn withdraw(
        &mut self,
        amount_cents: Cents,
        description: &str,
    ) -> Result<&Transaction, LedgerError> {
        ensure_positive(amount_cents)?;
        self.ensure_funds(amount_cents)?;
        self.balance_cents -= amount_cents;

        let tx = Transaction::new(
            self.id,
            TransactionKind::Withdrawal,
            Direction::Outgoing,
            amount_cents,
        )
        .with_description(description);
        Ok(self.record(tx))
    }

    /// Accrue one month of interest if `today` falls in a later month than
    /// the last accrual. Returns the recorded transaction, or `None` when
    /// interest was already applied this month.
    ///
    /// Interest that would overflow the balance is not applied and the
    /// accrual marker stays put, so the month remains due.
    pub fn apply_monthly_interest(&mut self, today: NaiveDate) -> Option<&Transaction> {
        let current = (today.year(), today.month());
        let last = (
            self.last_interest_date.year(),
            self.last_interest_date.month(),
        );
        if current <= last {
            return None;
        }

        let interest = monthly_interest(self.balance_cents, self.interest_rate);
        let (Some(balance), Some(amount)) = (
            self.balance_cents.checked_add(interest),
            interest.checked_abs(),
        ) else {
            tracing::warn!(
                account = %self.name,
                balance_cents = self.balance_cents,
                rate = self.interest_rate,
                "monthly interest overflows the balance, not applied"
            );
            return None;
        };
        self.balance_cents = balance;
        self.last_interest_date = today;

        // Negative rates are accepted as-is and show up as outgoing interest
        let direction = if interest < 0 {
            Direction::Outgoing
        } else {
            Direction::Incoming
        };
        let tx = Transaction::new(self.id, TransactionKind::Interest, direction, amount);
        Some(self.record(tx))
    }

    /// Take back transactions that could not be persisted and reset the
    /// accrual marker.
    pub(crate) fn revert(&mut self, transactions: &[Transaction], last_interest_date: NaiveDate) {
        for transaction in transactions {
            if let Some(index) = self
                .transactions
                .iter()
                .rposition(|recorded| recorded.id == transaction.id)
            {
                let removed = self.transactions.remove(index);
                self.balance_cents -= removed.signed_amount();
            }
        }
        self.last_interest_date = last_interest_date;
    }

    pub(crate) fn ensure_funds(&self, amount_cents: Cents) -> Result<(), LedgerError> {
        if self.balance_cents < amount_cents {
            return Err(LedgerError::InsufficientFunds {
                balance: self.balance_cents,
                requested: amount_cents,
            });
        }
        Ok(())
    }

    pub(crate) fn credited(&self, amount_cents: Cents) -> Result<Cents, LedgerError> {
        self.balance_cents
            .checked_add(amount_cents)
            .ok_or_else(|| LedgerError::InvalidAmount("amount overflows the balance".into()))
    }

    /// Outgoing half of a transfer. Funds must already have been checked.
    pub(crate) fn send_transfer(&mut self, amount_cents: Cents, to: &str) -> &Transaction {
        self.balance_cents -= amount_cents;
        let tx = Transaction::new(
            self.id,
            TransactionKind::Transfer,
            Direction::Outgoing,
            amount_cents,
        )
        .with_description(format!("to {}", to))
        .with_counterparty(to);
        self.record(tx)
    }

    /// Incoming half of a transfer. The credit must already have been checked.
    pub(crate) fn receive_transfer(&mut self, amount_cents: Cents, from: &str) -> &Transaction {
        self.balance_cents += amount_cents;
        let tx = Transaction::new(
            self.id,
            TransactionKind::Transfer,
            Direction::Incoming,
            amount_cents,
        )
        .with_description(format!("from {}", from))
        .with_counterparty(from);
        self.record(tx)
    }

    fn record(&mut self, tx: Transaction) -> &Transaction {
        let index = self.transactions.len();
        self.transactions.push(tx);
        &self.transactions[index]
    }
}

pub(crate) fn ensure_positive(amount_cents: Cents) -> Result<(), LedgerError> {
    if amount_cents <= 0 {
        return Err(LedgerError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn opened(balance: Cents, rate: f64) -> Account {
        let created = Utc.with_ymd_and_hms(2024, 3, 14, 9, 30, 0).unwrap();
        Account::new(1, "alice", balance, rate, Pin::new("1234"), created)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_account_starts_interest_marker_on_first_of_month() {
        let account = opened(10000, 0.12);
        assert_eq!(account.last_interest_date(), date(2024, 3, 1));
        assert_eq!(account.balance_cents(), 10000);
        assert!(account.transactions().is_empty());
    }

    #[test]
    fn test_deposit_records_incoming_transaction() {
        let mut account = opened(10000, 0.12);
        let tx = account.deposit(5000, "").unwrap();

        assert_eq!(tx.kind, TransactionKind::Deposit);
        assert_eq!(tx.direction, Direction::Incoming);
        assert_eq!(tx.amount_cents, 5000);
        assert_eq!(account.balance_cents(), 15000);
        assert_eq!(account.transactions().len(), 1);
    }

    #[test]
    fn test_deposit_rejects_non_positive_amounts() {
        let mut account = opened(10000, 0.12);
        assert!(matches!(
            account.deposit(0, ""),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            account.deposit(-500, ""),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert_eq!(account.balance_cents(), 10000);
        assert!(account.transactions().is_empty());
    }

    #[test]
    fn test_withdraw_within_balance() {
        let mut account = opened(15000, 0.12);
        let tx = account.withdraw(15000, "rent").unwrap();

        assert_eq!(tx.kind, TransactionKind::Withdrawal);
        assert_eq!(tx.direction, Direction::Outgoing);
        assert_eq!(tx.description.as_deref(), Some("rent"));
        assert_eq!(account.balance_cents(), 0);
    }

    #[test]
    fn test_withdraw_insufficient_funds_changes_nothing() {
        let mut account = opened(15000, 0.12);
        let err = account.withdraw(20000, "").unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                balance: 15000,
                requested: 20000
            }
        );
        assert_eq!(account.balance_cents(), 15000);
        assert!(account.transactions().is_empty());
    }

    #[test]
    fn test_interest_applies_once_per_month() {
        let mut account = opened(10000, 0.12);

        let tx = account.apply_monthly_interest(date(2024, 4, 2)).unwrap();
        assert_eq!(tx.kind, TransactionKind::Interest);
        assert_eq!(tx.amount_cents, 100);
        assert_eq!(account.balance_cents(), 10100);
        assert_eq!(account.last_interest_date(), date(2024, 4, 2));

        assert!(account.apply_monthly_interest(date(2024, 4, 30)).is_none());
        assert_eq!(account.balance_cents(), 10100);
        assert_eq!(account.transactions().len(), 1);
    }

    #[test]
    fn test_interest_not_applied_in_opening_month() {
        let mut account = opened(10000, 0.12);
        assert!(account.apply_monthly_interest(date(2024, 3, 31)).is_none());
        assert_eq!(account.balance_cents(), 10000);
    }

    #[test]
    fn test_interest_ignores_earlier_months() {
        let mut account = opened(10000, 0.12);
        account.apply_monthly_interest(date(2024, 5, 1)).unwrap();
        assert!(account.apply_monthly_interest(date(2024, 4, 15)).is_none());
        assert_eq!(account.last_interest_date(), date(2024, 5, 1));
    }

    #[test]
    fn test_interest_across_year_boundary() {
        let mut account = opened(10000, 0.12);
        account.apply_monthly_interest(date(2024, 12, 10)).unwrap();
        assert!(account.apply_monthly_interest(date(2025, 1, 1)).is_some());
    }

    #[test]
    fn test_negative_rate_records_outgoing_interest() {
        let mut account = opened(10000, -0.12);
        let tx = account.apply_monthly_interest(date(2024, 4, 1)).unwrap();

        assert_eq!(tx.direction, Direction::Outgoing);
        assert_eq!(tx.amount_cents, 100);
        assert_eq!(account.balance_cents(), 9900);
        assert_eq!(account.ledger_balance(), account.balance_cents());
    }

    #[test]
    fn test_interest_overflow_is_skipped_and_stays_due() {
        let mut account = opened(5_000_000_000_000_000_000, 12.0);

        assert!(account.apply_monthly_interest(date(2024, 4, 1)).is_none());
        assert_eq!(account.balance_cents(), 5_000_000_000_000_000_000);
        assert_eq!(account.last_interest_date(), date(2024, 3, 1));
        assert!(account.transactions().is_empty());

        // Still due once the balance is back in range
        account.withdraw(4_999_999_999_999_990_000, "").unwrap();
        let tx = account.apply_monthly_interest(date(2024, 4, 1)).unwrap();
        assert_eq!(tx.amount_cents, 10_000);
        assert_eq!(account.ledger_balance(), account.balance_cents());
    }

    #[test]
    fn test_extreme_negative_rate_does_not_panic() {
        let mut account = opened(i64::MAX, -1e30);
        assert!(account.apply_monthly_interest(date(2024, 4, 1)).is_none());
        assert_eq!(account.balance_cents(), i64::MAX);

        let mut account = opened(1_000, -24.0);
        let tx = account.apply_monthly_interest(date(2024, 4, 1)).unwrap();
        assert_eq!(tx.direction, Direction::Outgoing);
        assert_eq!(tx.amount_cents, 2_000);
        assert_eq!(account.ledger_balance(), account.balance_cents());
    }

    #[test]
    fn test_revert_takes_back_unpersisted_transactions() {
        let mut account = opened(10000, 0.12);
        account.deposit(500, "").unwrap();
        let interest = account
            .apply_monthly_interest(date(2024, 4, 2))
            .unwrap()
            .clone();

        account.revert(&[interest], date(2024, 3, 1));

        assert_eq!(account.balance_cents(), 10500);
        assert_eq!(account.transactions().len(), 1);
        assert_eq!(account.last_interest_date(), date(2024, 3, 1));
        assert!(account.apply_monthly_interest(date(2024, 4, 2)).is_some());
    }

    #[test]
    fn test_ledger_balance_tracks_balance() {
        let mut account = opened(2500, 0.06);
        account.deposit(1000, "").unwrap();
        account.withdraw(700, "").unwrap();
        let _ = account.withdraw(100000, "");
        account.send_transfer(300, "bob");
        account.receive_transfer(50, "carol");
        account.apply_monthly_interest(date(2024, 6, 1));

        assert_eq!(account.ledger_balance(), account.balance_cents());
    }

    #[test]
    fn test_transfer_halves_annotate_counterparty() {
        let mut account = opened(10000, 0.0);
        let sent = account.send_transfer(5000, "bob").clone();
        assert_eq!(sent.direction, Direction::Outgoing);
        assert_eq!(sent.counterparty.as_deref(), Some("bob"));
        assert_eq!(sent.description.as_deref(), Some("to bob"));

        let received = account.receive_transfer(200, "carol");
        assert_eq!(received.direction, Direction::Incoming);
        assert_eq!(received.description.as_deref(), Some("from carol"));
    }

    #[test]
    fn test_pin_debug_is_redacted() {
        let pin = Pin::new("9876");
        assert_eq!(format!("{:?}", pin), "Pin(****)");
        assert!(pin.matches("9876"));
        assert!(!pin.matches("987"));
        assert_eq!(pin.len(), 4);
    }
}

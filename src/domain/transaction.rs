use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    /// Money moved between two accounts of the same bank
    Transfer,
    /// Monthly accrual
    Interest,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Interest => "interest",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(TransactionKind::Deposit),
            "withdrawal" => Some(TransactionKind::Withdrawal),
            "transfer" => Some(TransactionKind::Transfer),
            "interest" => Some(TransactionKind::Interest),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "incoming" => Some(Direction::Incoming),
            "outgoing" => Some(Direction::Outgoing),
            _ => None,
        }
    }

    /// Effect of an amount moving in this direction on the balance.
    pub fn signed(&self, amount_cents: Cents) -> Cents {
        match self {
            Direction::Incoming => amount_cents,
            Direction::Outgoing => -amount_cents,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single entry in an account's ledger. Transactions are never edited once
/// recorded; the account only appends to its log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Owning account (back-reference only)
    pub account_id: AccountId,
    /// Amount in cents (never negative, the direction carries the sign)
    pub amount_cents: Cents,
    pub kind: TransactionKind,
    pub direction: Direction,
    pub description: Option<String>,
    /// Name of the other account, for transfers
    pub counterparty: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        account_id: AccountId,
        kind: TransactionKind,
        direction: Direction,
        amount_cents: Cents,
    ) -> Self {
        assert!(amount_cents >= 0, "Transaction amount must not be negative");
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount_cents,
            kind,
            direction,
            description: None,
            counterparty: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a description; empty strings are treated as no description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Signed effect of this transaction on the owning account's balance.
    pub fn signed_amount(&self) -> Cents {
        self.direction.signed(self.amount_cents)
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }
}

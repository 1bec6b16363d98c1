use thiserror::Error;

use super::Cents;

/// Expected outcomes of ledger operations that callers must handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("An account named '{0}' already exists")]
    DuplicateName(String),

    /// Unknown name or wrong PIN. Which one is never revealed.
    #[error("Account not found or incorrect PIN")]
    InvalidCredentials,

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Cents, requested: Cents },

    #[error("Recipient account not found: {0}")]
    RecipientNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("PIN must be exactly {expected} characters")]
    InvalidPin { expected: usize },

    #[error("Cannot transfer to the same account")]
    SameAccount,
}

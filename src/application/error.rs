use thiserror::Error;

use crate::domain::{AccountId, LedgerError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A session refers to an account that no longer resolves.
    #[error("Session expired: no account with id {0}")]
    SessionExpired(AccountId),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// The ledger outcome behind this error, if it is one.
    pub fn ledger(&self) -> Option<&LedgerError> {
        match self {
            AppError::Ledger(err) => Some(err),
            _ => None,
        }
    }
}

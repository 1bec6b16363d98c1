use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::{AccountSession, BankService};
use crate::domain::{Cents, Transaction, format_cents};

/// Account history as written by the JSON exporter
#[derive(Debug, Clone, Serialize)]
pub struct HistorySnapshot {
    pub account: String,
    pub exported_at: DateTime<Utc>,
    pub balance_cents: Cents,
    pub transactions: Vec<Transaction>,
}

/// Exporter for writing an account's ledger in machine-readable formats
pub struct Exporter<'a> {
    service: &'a BankService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a BankService) -> Self {
        Self { service }
    }

    /// Export the session account's transactions to CSV. Returns the number
    /// of rows written.
    pub fn export_history_csv<W: Write>(
        &self,
        session: &AccountSession,
        writer: W,
    ) -> Result<usize> {
        let transactions = self.service.history(session)?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "timestamp",
            "kind",
            "direction",
            "amount",
            "counterparty",
            "description",
        ])?;

        for transaction in &transactions {
            csv_writer.write_record([
                transaction.id.to_string(),
                transaction.timestamp.to_rfc3339(),
                transaction.kind.to_string(),
                transaction.direction.to_string(),
                format_cents(transaction.amount_cents),
                transaction.counterparty.clone().unwrap_or_default(),
                transaction.description.clone().unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    /// Export the session account's history as pretty-printed JSON.
    pub fn export_history_json<W: Write>(
        &self,
        session: &AccountSession,
        mut writer: W,
    ) -> Result<usize> {
        let account = self.service.account(session)?;
        let snapshot = HistorySnapshot {
            account: account.name,
            exported_at: Utc::now(),
            balance_cents: account.balance_cents,
            transactions: self.service.history(session)?,
        };

        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writeln!(writer)?;
        Ok(snapshot.transactions.len())
    }
}

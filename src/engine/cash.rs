use super::transaction::{CashKind, EnrichedTransaction, TransactionKind};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// A deposit into the brokerage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashMovement {
    pub index: usize,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub amount_eur: Decimal,
    pub source: String,
    pub hash: String,
}

/// Deposits only. Withdrawals are not reported.
pub fn extract_cash_movements(transactions: &[EnrichedTransaction]) -> Vec<CashMovement> {
    transactions
        .iter()
        .filter(|tx| tx.kind == TransactionKind::Cash(CashKind::Deposit))
        .map(|tx| CashMovement {
            index: tx.index,
            date: tx.date(),
            amount: tx.amount,
            currency: tx.currency.clone(),
            exchange_rate: tx.exchange_rate,
            amount_eur: tx.amount_eur,
            source: tx.source.clone(),
            hash: tx.hash.clone(),
        })
        .collect()
}

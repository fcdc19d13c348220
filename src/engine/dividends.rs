use super::transaction::{DividendKind, EnrichedTransaction, TransactionKind};
use super::warnings::{SkipReason, SkippedRecord, Stage};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

/// Dividends received and tax withheld for one country in one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DividendCountrySummary {
    pub year: i32,
    pub country_code: String,
    pub country: String,
    pub gross_amount_eur: Decimal,
    /// Withholding tax, as booked (usually negative)
    pub taxed_amount_eur: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DividendReport {
    /// year -> country code -> summary
    pub summaries: BTreeMap<i32, BTreeMap<String, DividendCountrySummary>>,
    pub skipped: Vec<SkippedRecord>,
}

impl DividendReport {
    pub fn summaries_in(&self, year: Option<i32>) -> impl Iterator<Item = &DividendCountrySummary> {
        self.summaries
            .iter()
            .filter(move |(y, _)| year.is_none_or(|year| **y == year))
            .flat_map(|(_, countries)| countries.values())
    }

    pub fn total_gross(&self, year: Option<i32>) -> Decimal {
        self.summaries_in(year).map(|s| s.gross_amount_eur).sum()
    }

    pub fn total_taxed(&self, year: Option<i32>) -> Decimal {
        self.summaries_in(year).map(|s| s.taxed_amount_eur).sum()
    }
}

/// Group dividend and withholding records by calendar year and issuer country.
pub fn aggregate_dividends(transactions: &[EnrichedTransaction]) -> DividendReport {
    let mut report = DividendReport::default();

    for tx in transactions {
        let TransactionKind::Dividend(kind) = tx.kind else {
            continue;
        };
        let Some(code) = tx.country_code.as_ref() else {
            report.skipped.push(SkippedRecord::new(
                tx.index,
                Stage::DividendAggregation,
                SkipReason::MissingCountry {
                    isin: tx.isin.clone(),
                },
                &tx.raw_text,
            ));
            continue;
        };

        let year = tx.year();
        let summary = report
            .summaries
            .entry(year)
            .or_default()
            .entry(code.clone())
            .or_insert_with(|| DividendCountrySummary {
                year,
                country_code: code.clone(),
                country: tx.country.clone().unwrap_or_else(|| code.clone()),
                gross_amount_eur: Decimal::ZERO,
                taxed_amount_eur: Decimal::ZERO,
            });

        let amount = round_cents(tx.amount_eur);
        match kind {
            DividendKind::Gross => {
                summary.gross_amount_eur = round_cents(summary.gross_amount_eur + amount)
            }
            DividendKind::Tax => {
                summary.taxed_amount_eur = round_cents(summary.taxed_amount_eur + amount)
            }
        }
        log::debug!("Dividend {:?} {} {}: {}", kind, year, code, amount);
    }
    report
}

/// Commercial rounding to cents: halves go away from zero.
fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

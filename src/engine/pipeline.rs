use super::cash::{extract_cash_movements, CashMovement};
use super::country::CountryLookup;
use super::dividends::{aggregate_dividends, DividendCountrySummary};
use super::options::{match_option_positions, OptionPosition, RealizedOptionTrade};
use super::rates::RateTable;
use super::stocks::{match_stock_lots, OpenLot, RealizedSale, UnmatchedSale};
use super::transaction::{enrich_transactions, EnrichedTransaction, NormalizedTransaction};
use super::warnings::{SkippedRecord, Warning};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything derived from one batch of normalized transactions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineReport {
    pub transactions: Vec<EnrichedTransaction>,
    pub sales: Vec<RealizedSale>,
    /// Open stock lots at the end of each year
    pub holdings: BTreeMap<i32, Vec<OpenLot>>,
    pub unmatched_sales: Vec<UnmatchedSale>,
    pub option_trades: Vec<RealizedOptionTrade>,
    pub option_positions: Vec<OptionPosition>,
    pub dividends: BTreeMap<i32, BTreeMap<String, DividendCountrySummary>>,
    pub cash_movements: Vec<CashMovement>,
    pub skipped: Vec<SkippedRecord>,
    pub warnings: Vec<Warning>,
}

impl EngineReport {
    pub fn sales_in(&self, year: Option<i32>) -> impl Iterator<Item = &RealizedSale> {
        self.sales
            .iter()
            .filter(move |s| year.is_none_or(|y| s.year == y))
    }

    pub fn option_trades_in(&self, year: Option<i32>) -> impl Iterator<Item = &RealizedOptionTrade> {
        self.option_trades
            .iter()
            .filter(move |t| year.is_none_or(|y| t.year == y))
    }

    pub fn dividends_in(&self, year: Option<i32>) -> impl Iterator<Item = &DividendCountrySummary> {
        self.dividends
            .iter()
            .filter(move |(y, _)| year.is_none_or(|year| **y == year))
            .flat_map(|(_, countries)| countries.values())
    }

    pub fn total_stock_realized(&self, year: Option<i32>) -> Decimal {
        self.sales_in(year).map(|s| s.realized_eur).sum()
    }

    pub fn total_option_realized(&self, year: Option<i32>) -> Decimal {
        self.option_trades_in(year).map(|t| t.realized_eur).sum()
    }

    pub fn total_commission(&self, year: Option<i32>) -> Decimal {
        self.sales_in(year).map(|s| s.commission_eur).sum::<Decimal>()
            + self.option_trades_in(year).map(|t| t.commission_eur).sum::<Decimal>()
    }

    /// Year-end lots for `year`, or for the latest year when `None`.
    pub fn holdings_at(&self, year: Option<i32>) -> Option<(i32, &[OpenLot])> {
        let entry = match year {
            Some(year) => self.holdings.get_key_value(&year),
            None => self.holdings.last_key_value(),
        };
        entry.map(|(year, lots)| (*year, lots.as_slice()))
    }

    pub fn has_issues(&self) -> bool {
        !self.skipped.is_empty() || !self.warnings.is_empty()
    }
}

/// Enrich the batch once and feed the result to every consumer.
pub fn run(
    transactions: &[NormalizedTransaction],
    rates: &RateTable,
    countries: &dyn CountryLookup,
) -> EngineReport {
    let enrichment = enrich_transactions(transactions, rates, countries);
    let enriched = enrichment.transactions;

    let stocks = match_stock_lots(&enriched);
    let options = match_option_positions(&enriched);
    let dividends = aggregate_dividends(&enriched);
    let cash_movements = extract_cash_movements(&enriched);

    let mut warnings = enrichment.warnings;
    warnings.extend(stocks.unmatched.iter().map(|u| Warning::UnmatchedSale {
        index: u.index,
        isin: u.isin.clone(),
        quantity: u.quantity,
    }));

    let mut skipped = enrichment.skipped;
    skipped.extend(stocks.skipped);
    skipped.extend(options.skipped);
    skipped.extend(dividends.skipped);
    skipped.sort_by_key(|s| s.index);

    log::info!(
        "Processed {} records: {} sales, {} option trades, {} skipped, {} warnings",
        transactions.len(),
        stocks.sales.len(),
        options.trades.len(),
        skipped.len(),
        warnings.len()
    );

    EngineReport {
        transactions: enriched,
        sales: stocks.sales,
        holdings: stocks.holdings,
        unmatched_sales: stocks.unmatched,
        option_trades: options.trades,
        option_positions: options.positions,
        dividends: dividends.summaries,
        cash_movements,
        skipped,
        warnings,
    }
}

//! FIFO matching of equity sells against open buy lots.
//!
//! Lots live in an arena; each instrument has a queue of lot ids in purchase
//! order. Remaining quantity and unattributed commission are tracked per lot in
//! the arena, never on the shared enriched record.

use super::transaction::{Direction, EnrichedTransaction, TransactionKind};
use super::warnings::{SkipReason, SkippedRecord, Stage};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("record {index} has non-positive quantity {quantity}")]
    NonPositiveLotQuantity { index: usize, quantity: Decimal },
}

impl From<MatchError> for SkipReason {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::NonPositiveLotQuantity { quantity, .. } => {
                SkipReason::NonPositiveQuantity { quantity }
            }
        }
    }
}

/// An open buy lot as of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenLot {
    pub index: usize,
    pub isin: String,
    pub product: String,
    pub date: NaiveDate,
    pub order_id: String,
    pub currency: String,
    pub price: Decimal,
    pub original_quantity: Decimal,
    pub quantity: Decimal,
    /// Purchase value of the remaining quantity (negative)
    pub buy_amount_eur: Decimal,
    /// Purchase commission not yet attributed to a sale
    pub commission_eur: Decimal,
}

/// One match between a sell and (part of) one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealizedSale {
    pub isin: String,
    pub product: String,
    pub year: i32,
    pub sell_date: NaiveDate,
    pub buy_date: NaiveDate,
    pub sell_index: usize,
    pub buy_index: usize,
    pub sell_order_id: String,
    pub buy_order_id: String,
    pub quantity: Decimal,
    pub buy_amount_eur: Decimal,
    pub sale_amount_eur: Decimal,
    pub commission_eur: Decimal,
    pub realized_eur: Decimal,
}

/// Sell quantity left over once every open lot for the instrument was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedSale {
    pub index: usize,
    pub isin: String,
    pub product: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockReport {
    pub sales: Vec<RealizedSale>,
    /// Open lots at the end of each calendar year
    pub holdings: BTreeMap<i32, Vec<OpenLot>>,
    pub unmatched: Vec<UnmatchedSale>,
    pub skipped: Vec<SkippedRecord>,
}

impl StockReport {
    pub fn sales_in(&self, year: Option<i32>) -> impl Iterator<Item = &RealizedSale> {
        self.sales
            .iter()
            .filter(move |s| year.is_none_or(|y| s.year == y))
    }

    pub fn total_realized(&self, year: Option<i32>) -> Decimal {
        self.sales_in(year).map(|s| s.realized_eur).sum()
    }

    pub fn total_commission(&self, year: Option<i32>) -> Decimal {
        self.sales_in(year).map(|s| s.commission_eur).sum()
    }
}

struct Lot<'a> {
    tx: &'a EnrichedTransaction,
    remaining_quantity: Decimal,
    remaining_commission: Decimal,
}

impl<'a> Lot<'a> {
    fn open(tx: &'a EnrichedTransaction) -> Result<Self, MatchError> {
        ensure_positive(tx)?;
        Ok(Lot {
            tx,
            remaining_quantity: tx.quantity,
            remaining_commission: tx.commission_eur,
        })
    }

    /// The whole purchase commission goes to the first sale touching the lot.
    fn take_commission(&mut self) -> Decimal {
        std::mem::take(&mut self.remaining_commission)
    }

    fn snapshot(&self) -> OpenLot {
        let ratio = self.remaining_quantity / self.tx.quantity;
        OpenLot {
            index: self.tx.index,
            isin: self.tx.isin.clone(),
            product: self.tx.product.clone(),
            date: self.tx.date(),
            order_id: self.tx.order_id.clone(),
            currency: self.tx.currency.clone(),
            price: self.tx.price,
            original_quantity: self.tx.quantity,
            quantity: self.remaining_quantity,
            buy_amount_eur: (self.tx.gross_amount_eur * ratio).round_dp(2),
            commission_eur: self.remaining_commission,
        }
    }
}

#[derive(Default)]
struct LotBook<'a> {
    lots: Vec<Lot<'a>>,
    queues: BTreeMap<String, VecDeque<usize>>,
}

impl<'a> LotBook<'a> {
    fn buy(&mut self, tx: &'a EnrichedTransaction) -> Result<(), MatchError> {
        let lot = Lot::open(tx)?;
        let id = self.lots.len();
        self.lots.push(lot);
        self.queues.entry(tx.isin.clone()).or_default().push_back(id);
        log::debug!(
            "Lot {} OPEN: {} qty={} cost={}",
            id,
            tx.isin,
            tx.quantity,
            tx.gross_amount_eur
        );
        Ok(())
    }

    /// Match a sell against the instrument's queue. Returns the match events
    /// and the quantity that found no lot.
    fn sell(
        &mut self,
        sale: &EnrichedTransaction,
    ) -> Result<(Vec<RealizedSale>, Decimal), MatchError> {
        ensure_positive(sale)?;
        let mut matches = Vec::new();
        let mut remaining = sale.quantity;
        let Some(queue) = self.queues.get_mut(&sale.isin) else {
            return Ok((matches, remaining));
        };

        while remaining > Decimal::ZERO {
            let Some(&lot_id) = queue.front() else {
                break;
            };
            let lot = &mut self.lots[lot_id];
            let matched = remaining.min(lot.remaining_quantity);
            let sale_ratio = matched / sale.quantity;
            let purchase_ratio = matched / lot.tx.quantity;

            let buy_amount_eur = (lot.tx.gross_amount_eur * purchase_ratio).round_dp(2);
            let sale_amount_eur = (sale.gross_amount_eur * sale_ratio).round_dp(2);
            let commission_eur =
                (sale.commission_eur * sale_ratio + lot.take_commission()).round_dp(2);
            let realized_eur = (buy_amount_eur + sale_amount_eur).round_dp(2);

            lot.remaining_quantity -= matched;
            remaining -= matched;
            log::debug!(
                "Lot {} MATCH: {} qty={} buy={} sale={} realized={}. Lot remaining: {}",
                lot_id,
                sale.isin,
                matched,
                buy_amount_eur,
                sale_amount_eur,
                realized_eur,
                lot.remaining_quantity
            );

            matches.push(RealizedSale {
                isin: sale.isin.clone(),
                product: sale.product.clone(),
                year: sale.year(),
                sell_date: sale.date(),
                buy_date: lot.tx.date(),
                sell_index: sale.index,
                buy_index: lot.tx.index,
                sell_order_id: sale.order_id.clone(),
                buy_order_id: lot.tx.order_id.clone(),
                quantity: matched,
                buy_amount_eur,
                sale_amount_eur,
                commission_eur,
                realized_eur,
            });

            if lot.remaining_quantity <= Decimal::ZERO {
                queue.pop_front();
            }
        }
        Ok((matches, remaining))
    }

    /// Open lots across all instruments, instrument by instrument in FIFO order.
    fn snapshot(&self) -> Vec<OpenLot> {
        self.queues
            .values()
            .flat_map(|queue| queue.iter().map(|&id| self.lots[id].snapshot()))
            .collect()
    }
}

fn ensure_positive(tx: &EnrichedTransaction) -> Result<(), MatchError> {
    if tx.quantity <= Decimal::ZERO {
        return Err(MatchError::NonPositiveLotQuantity {
            index: tx.index,
            quantity: tx.quantity,
        });
    }
    Ok(())
}

/// Match stock sells against buys, FIFO per instrument.
///
/// Trades are ordered by date, buys before sells on the same date, then by
/// order id. Whenever the calendar year advances, the open lots are recorded
/// for every year passed over, so years without trades repeat the prior state.
pub fn match_stock_lots(transactions: &[EnrichedTransaction]) -> StockReport {
    let mut trades: Vec<(&EnrichedTransaction, Direction)> = transactions
        .iter()
        .filter_map(|tx| match tx.kind {
            TransactionKind::Stock(direction) => Some((tx, direction)),
            _ => None,
        })
        .collect();
    trades.sort_by(|(a, a_dir), (b, b_dir)| {
        a.date()
            .cmp(&b.date())
            .then(a_dir.cmp(b_dir))
            .then_with(|| a.order_id.cmp(&b.order_id))
    });

    let mut book = LotBook::default();
    let mut report = StockReport::default();
    let mut last_year: Option<i32> = None;

    for (tx, direction) in trades {
        let year = tx.year();
        if let Some(prev) = last_year.filter(|prev| year > *prev) {
            let snapshot = book.snapshot();
            for y in prev..year {
                report.holdings.insert(y, snapshot.clone());
            }
        }
        last_year = Some(year);

        let result = match direction {
            Direction::Buy => book.buy(tx),
            Direction::Sell => book.sell(tx).map(|(matches, unmatched)| {
                report.sales.extend(matches);
                if unmatched > Decimal::ZERO {
                    log::warn!(
                        "Sell {} of {} exceeds open lots by {}",
                        tx.index,
                        tx.isin,
                        unmatched
                    );
                    report.unmatched.push(UnmatchedSale {
                        index: tx.index,
                        isin: tx.isin.clone(),
                        product: tx.product.clone(),
                        date: tx.date(),
                        quantity: unmatched,
                    });
                }
            }),
        };
        if let Err(err) = result {
            report.skipped.push(SkippedRecord::new(
                tx.index,
                Stage::StockMatching,
                err.into(),
                &tx.raw_text,
            ));
        }
    }

    if let Some(year) = last_year {
        report.holdings.insert(year, book.snapshot());
    }
    report
}

//! FIFO matching of option legs, per product, in both directions.
//!
//! A buy first closes open shorts and a sell first closes open longs; whatever
//! quantity is left opens a new position on the other side.

use super::stocks::MatchError;
use super::transaction::{Direction, EnrichedTransaction, TransactionKind};
use super::warnings::{SkippedRecord, Stage};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionSide {
    Long,
    Short,
}

/// One match between an opening and a closing leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealizedOptionTrade {
    pub product: String,
    pub isin: String,
    /// Side of the position that was closed
    pub side: PositionSide,
    pub year: i32,
    pub open_date: NaiveDate,
    pub close_date: NaiveDate,
    pub open_index: usize,
    pub close_index: usize,
    pub open_order_id: String,
    pub close_order_id: String,
    pub quantity: Decimal,
    pub open_amount_eur: Decimal,
    pub close_amount_eur: Decimal,
    pub commission_eur: Decimal,
    pub realized_eur: Decimal,
}

/// A still-open option leg. Quantity is positive for long, negative for short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionPosition {
    pub product: String,
    pub isin: String,
    pub index: usize,
    pub date: NaiveDate,
    pub order_id: String,
    pub quantity: Decimal,
    /// Opening value of the remaining quantity, signed like the opening cash flow
    pub amount_eur: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptionReport {
    pub trades: Vec<RealizedOptionTrade>,
    pub positions: Vec<OptionPosition>,
    pub skipped: Vec<SkippedRecord>,
}

impl OptionReport {
    pub fn trades_in(&self, year: Option<i32>) -> impl Iterator<Item = &RealizedOptionTrade> {
        self.trades
            .iter()
            .filter(move |t| year.is_none_or(|y| t.year == y))
    }

    pub fn total_realized(&self, year: Option<i32>) -> Decimal {
        self.trades_in(year).map(|t| t.realized_eur).sum()
    }
}

/// Key used to group option legs: whitespace collapsed, uppercased.
pub fn normalize_product(product: &str) -> String {
    product
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

struct Leg<'a> {
    tx: &'a EnrichedTransaction,
    side: PositionSide,
    remaining: Decimal,
}

impl Leg<'_> {
    /// Per-unit value from the original quantity, so partial closes share one basis.
    fn unit_value(&self) -> Decimal {
        self.tx.gross_amount_eur / self.tx.quantity
    }

    fn position(&self, product: &str) -> OptionPosition {
        let signed = match self.side {
            PositionSide::Long => self.remaining,
            PositionSide::Short => -self.remaining,
        };
        OptionPosition {
            product: product.to_string(),
            isin: self.tx.isin.clone(),
            index: self.tx.index,
            date: self.tx.date(),
            order_id: self.tx.order_id.clone(),
            quantity: signed,
            amount_eur: (self.unit_value() * self.remaining).round_dp(2),
        }
    }
}

#[derive(Default)]
struct ProductBook {
    long: VecDeque<usize>,
    short: VecDeque<usize>,
}

/// Per-unit value of a closing leg. A leg with no amount falls back to its
/// price. Enriched option legs derive their amount from quantity and price, so
/// both branches agree for them; the fallback covers legs built elsewhere.
fn closing_unit_value(tx: &EnrichedTransaction, direction: Direction) -> Decimal {
    if tx.amount.is_zero() {
        direction.sign() * tx.price.abs() / tx.exchange_rate
    } else {
        tx.gross_amount_eur / tx.quantity
    }
}

/// Match option legs FIFO per normalized product name.
pub fn match_option_positions(transactions: &[EnrichedTransaction]) -> OptionReport {
    let mut legs_in: Vec<(&EnrichedTransaction, Direction)> = transactions
        .iter()
        .filter_map(|tx| match tx.kind {
            TransactionKind::Option(direction) => Some((tx, direction)),
            _ => None,
        })
        .collect();
    legs_in.sort_by(|(a, _), (b, _)| {
        a.date()
            .cmp(&b.date())
            .then_with(|| a.order_id.cmp(&b.order_id))
    });

    let mut report = OptionReport::default();
    let mut legs: Vec<Leg> = Vec::new();
    let mut books: BTreeMap<String, ProductBook> = BTreeMap::new();

    for (tx, direction) in legs_in {
        if tx.quantity <= Decimal::ZERO {
            let err = MatchError::NonPositiveLotQuantity {
                index: tx.index,
                quantity: tx.quantity,
            };
            report.skipped.push(SkippedRecord::new(
                tx.index,
                Stage::OptionMatching,
                err.into(),
                &tx.raw_text,
            ));
            continue;
        }

        let product = normalize_product(&tx.product);
        let book = books.entry(product.clone()).or_default();
        let (closing, opening, opened_side) = match direction {
            Direction::Buy => (&mut book.short, &mut book.long, PositionSide::Long),
            Direction::Sell => (&mut book.long, &mut book.short, PositionSide::Short),
        };

        let close_unit = closing_unit_value(tx, direction);
        let mut remaining = tx.quantity;
        while remaining > Decimal::ZERO {
            let Some(&leg_id) = closing.front() else {
                break;
            };
            let leg = &mut legs[leg_id];
            let matched = remaining.min(leg.remaining);

            let open_amount_eur = (leg.unit_value() * matched).round_dp(2);
            let close_amount_eur = (close_unit * matched).round_dp(2);
            let commission_eur = (leg.tx.commission_eur * (matched / leg.tx.quantity)
                + tx.commission_eur * (matched / tx.quantity))
                .round_dp(2);
            let realized_eur = (open_amount_eur + close_amount_eur).round_dp(2);

            leg.remaining -= matched;
            remaining -= matched;
            log::debug!(
                "Option {} CLOSE {:?}: qty={} open={} close={} realized={}",
                product,
                leg.side,
                matched,
                open_amount_eur,
                close_amount_eur,
                realized_eur
            );

            report.trades.push(RealizedOptionTrade {
                product: product.clone(),
                isin: tx.isin.clone(),
                side: leg.side,
                year: tx.year(),
                open_date: leg.tx.date(),
                close_date: tx.date(),
                open_index: leg.tx.index,
                close_index: tx.index,
                open_order_id: leg.tx.order_id.clone(),
                close_order_id: tx.order_id.clone(),
                quantity: matched,
                open_amount_eur,
                close_amount_eur,
                commission_eur,
                realized_eur,
            });

            if leg.remaining <= Decimal::ZERO {
                closing.pop_front();
            }
        }

        if remaining > Decimal::ZERO {
            log::debug!("Option {} OPEN {:?}: qty={}", product, opened_side, remaining);
            opening.push_back(legs.len());
            legs.push(Leg {
                tx,
                side: opened_side,
                remaining,
            });
        }
    }

    report.positions = books
        .iter()
        .flat_map(|(product, book)| {
            book.long
                .iter()
                .chain(book.short.iter())
                .map(|&id| legs[id].position(product))
                .collect::<Vec<_>>()
        })
        .collect();
    report
}

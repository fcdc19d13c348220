//! Holdings command - open lots at the end of each year

use crate::cmd::{format_eur, format_quantity, year_label, InputArgs};
use brokertax::engine::{OpenLot, OptionPosition};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct HoldingsCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Year-end to show; all years if not specified
    #[arg(short, long)]
    year: Option<i32>,

    /// Filter by instrument identifier (ISIN)
    #[arg(short, long)]
    isin: Option<String>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct HoldingsOutput {
    holdings: BTreeMap<i32, Vec<OpenLot>>,
    option_positions: Vec<OptionPosition>,
}

impl HoldingsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let report = self.input.run()?;
        let isin_filter = self.isin.as_deref();

        let holdings: BTreeMap<i32, Vec<OpenLot>> = report
            .holdings
            .iter()
            .filter(|(year, _)| self.year.is_none_or(|y| **year == y))
            .map(|(year, lots)| {
                let lots = lots
                    .iter()
                    .filter(|lot| isin_filter.is_none_or(|i| lot.isin.eq_ignore_ascii_case(i)))
                    .cloned()
                    .collect();
                (*year, lots)
            })
            .collect();

        // option positions are only known as of the end of the batch
        let option_positions: Vec<OptionPosition> = if self.year.is_none() {
            report
                .option_positions
                .iter()
                .filter(|p| isin_filter.is_none_or(|i| p.isin.eq_ignore_ascii_case(i)))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        if self.json {
            let output = HoldingsOutput {
                holdings,
                option_positions,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            self.print_lots(&holdings);
            print_option_positions(&option_positions);
        }
        Ok(())
    }

    fn print_lots(&self, holdings: &BTreeMap<i32, Vec<OpenLot>>) {
        let year_str = year_label(self.year);
        if holdings.values().all(Vec::is_empty) {
            println!("No holdings found matching filters ({})", year_str);
            return;
        }

        println!();
        println!("OPEN LOTS ({})", year_str);
        println!();

        for (year, lots) in holdings {
            println!("End of {}", year);
            if lots.is_empty() {
                println!("  (no open lots)");
                println!();
                continue;
            }

            let rows: Vec<LotRow> = lots
                .iter()
                .map(|lot| LotRow {
                    isin: lot.isin.clone(),
                    product: lot.product.clone(),
                    bought: lot.date.format("%Y-%m-%d").to_string(),
                    quantity: format_quantity(lot.quantity),
                    cost_eur: format_eur(lot.buy_amount_eur),
                    cost_basis: format_eur(cost_basis(lot.quantity, lot.buy_amount_eur)),
                })
                .collect();

            let table = Table::new(rows)
                .with(Style::rounded())
                .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
                .to_string();
            println!("{}", table);
            println!();
        }
    }
}

fn print_option_positions(positions: &[OptionPosition]) {
    if positions.is_empty() {
        return;
    }

    println!("OPEN OPTION POSITIONS");
    println!();
    let rows: Vec<PositionRow> = positions
        .iter()
        .map(|p| PositionRow {
            product: p.product.clone(),
            opened: p.date.format("%Y-%m-%d").to_string(),
            quantity: format_quantity(p.quantity),
            amount_eur: format_eur(p.amount_eur),
        })
        .collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
    println!();
}

#[derive(Debug, Clone, Tabled)]
struct LotRow {
    #[tabled(rename = "ISIN")]
    isin: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Bought")]
    bought: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Cost (EUR)")]
    cost_eur: String,
    #[tabled(rename = "Cost Basis")]
    cost_basis: String,
}

#[derive(Debug, Clone, Tabled)]
struct PositionRow {
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Opened")]
    opened: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Amount (EUR)")]
    amount_eur: String,
}

fn cost_basis(quantity: Decimal, cost_eur: Decimal) -> Decimal {
    if quantity.is_zero() {
        Decimal::ZERO
    } else {
        (cost_eur.abs() / quantity).round_dp(2)
    }
}

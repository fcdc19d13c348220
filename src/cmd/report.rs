//! Report command - realized results, dividends and deposits

use crate::cmd::{format_eur, format_quantity, year_label, InputArgs};
use brokertax::engine::{EngineReport, PositionSide};
use chrono::Datelike;
use clap::Args;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct ReportCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Calendar year to report
    #[arg(short, long)]
    year: Option<i32>,

    /// Output the full engine report as JSON instead of tables
    #[arg(long)]
    json: bool,
}

impl ReportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let report = self.input.run()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!();
        println!("BROKER TAX REPORT ({})", year_label(self.year));
        self.print_sales(&report);
        self.print_option_trades(&report);
        self.print_dividends(&report);
        self.print_deposits(&report);
        self.print_totals(&report);
        Ok(())
    }

    fn print_sales(&self, report: &EngineReport) {
        let rows: Vec<SaleRow> = report
            .sales_in(self.year)
            .map(|s| SaleRow {
                sell_date: s.sell_date.format("%Y-%m-%d").to_string(),
                buy_date: s.buy_date.format("%Y-%m-%d").to_string(),
                isin: s.isin.clone(),
                product: s.product.clone(),
                quantity: format_quantity(s.quantity),
                buy: format_eur(s.buy_amount_eur),
                sale: format_eur(s.sale_amount_eur),
                commission: format_eur(s.commission_eur),
                result: format_eur(s.realized_eur),
            })
            .collect();
        print_section("STOCK SALES", rows);
    }

    fn print_option_trades(&self, report: &EngineReport) {
        let rows: Vec<OptionRow> = report
            .option_trades_in(self.year)
            .map(|t| OptionRow {
                open_date: t.open_date.format("%Y-%m-%d").to_string(),
                close_date: t.close_date.format("%Y-%m-%d").to_string(),
                product: t.product.clone(),
                side: match t.side {
                    PositionSide::Long => "Long",
                    PositionSide::Short => "Short",
                }
                .to_string(),
                quantity: format_quantity(t.quantity),
                open: format_eur(t.open_amount_eur),
                close: format_eur(t.close_amount_eur),
                commission: format_eur(t.commission_eur),
                result: format_eur(t.realized_eur),
            })
            .collect();
        print_section("OPTION TRADES", rows);
    }

    fn print_dividends(&self, report: &EngineReport) {
        let rows: Vec<DividendRow> = report
            .dividends_in(self.year)
            .map(|d| DividendRow {
                year: d.year.to_string(),
                country: format!("{} ({})", d.country, d.country_code),
                gross: format_eur(d.gross_amount_eur),
                withheld: format_eur(d.taxed_amount_eur),
            })
            .collect();
        print_section("DIVIDENDS", rows);
    }

    fn print_deposits(&self, report: &EngineReport) {
        let rows: Vec<DepositRow> = report
            .cash_movements
            .iter()
            .filter(|c| self.year.is_none_or(|y| c.date.year() == y))
            .map(|c| DepositRow {
                date: c.date.format("%Y-%m-%d").to_string(),
                amount: format!("{:.2} {}", c.amount, c.currency),
                amount_eur: format_eur(c.amount_eur),
            })
            .collect();
        print_section("DEPOSITS", rows);
    }

    fn print_totals(&self, report: &EngineReport) {
        let dividends: Vec<_> = report.dividends_in(self.year).collect();
        println!("Stock result:      {}", format_eur(report.total_stock_realized(self.year)));
        println!("Option result:     {}", format_eur(report.total_option_realized(self.year)));
        println!("Commission:        {}", format_eur(report.total_commission(self.year)));
        println!(
            "Dividends:         {}",
            format_eur(dividends.iter().map(|d| d.gross_amount_eur).sum())
        );
        println!(
            "Withholding tax:   {}",
            format_eur(dividends.iter().map(|d| d.taxed_amount_eur).sum())
        );
        if report.has_issues() {
            println!();
            println!(
                "\u{26A0} {} skipped record(s), {} warning(s). Run `brokertax validate` for details.",
                report.skipped.len(),
                report.warnings.len()
            );
        }
        println!();
    }
}

fn print_section<T: Tabled>(title: &str, rows: Vec<T>) {
    println!();
    println!("{}", title);
    if rows.is_empty() {
        println!("  (none)");
        println!();
        return;
    }
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
    println!();
}

#[derive(Debug, Clone, Tabled)]
struct SaleRow {
    #[tabled(rename = "Sold")]
    sell_date: String,
    #[tabled(rename = "Bought")]
    buy_date: String,
    #[tabled(rename = "ISIN")]
    isin: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Cost (EUR)")]
    buy: String,
    #[tabled(rename = "Proceeds (EUR)")]
    sale: String,
    #[tabled(rename = "Commission")]
    commission: String,
    #[tabled(rename = "Result")]
    result: String,
}

#[derive(Debug, Clone, Tabled)]
struct OptionRow {
    #[tabled(rename = "Opened")]
    open_date: String,
    #[tabled(rename = "Closed")]
    close_date: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Side")]
    side: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Open (EUR)")]
    open: String,
    #[tabled(rename = "Close (EUR)")]
    close: String,
    #[tabled(rename = "Commission")]
    commission: String,
    #[tabled(rename = "Result")]
    result: String,
}

#[derive(Debug, Clone, Tabled)]
struct DividendRow {
    #[tabled(rename = "Year")]
    year: String,
    #[tabled(rename = "Country")]
    country: String,
    #[tabled(rename = "Gross (EUR)")]
    gross: String,
    #[tabled(rename = "Withheld (EUR)")]
    withheld: String,
}

#[derive(Debug, Clone, Tabled)]
struct DepositRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Amount (EUR)")]
    amount_eur: String,
}

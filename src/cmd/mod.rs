pub mod holdings;
pub mod rate;
pub mod report;
pub mod schema;
pub mod validate;

use brokertax::engine::{
    self, read_rates, read_transactions_json, EngineReport, IsinCountries, NormalizedTransaction,
    RateTable, REPORTING_CURRENCY,
};
use clap::Args;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Input files shared by the commands that run the engine.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Normalized transactions (JSON). Reads from stdin with "-".
    #[arg(short, long, default_value = "-")]
    pub transactions: PathBuf,

    /// Exchange rates (.csv, otherwise JSON). Without it only the reporting currency converts.
    #[arg(short, long)]
    pub rates: Option<PathBuf>,

    /// Currency every amount is converted to
    #[arg(long, default_value = REPORTING_CURRENCY)]
    pub reporting_currency: String,
}

impl InputArgs {
    pub fn load_rates(&self) -> anyhow::Result<RateTable> {
        match &self.rates {
            Some(path) => read_rates(path, &self.reporting_currency),
            None => Ok(RateTable::new(&self.reporting_currency, Vec::new())),
        }
    }

    /// Read both inputs and run the whole engine.
    pub fn run(&self) -> anyhow::Result<EngineReport> {
        let transactions = read_transactions(&self.transactions)?;
        let rates = self.load_rates()?;
        Ok(engine::run(&transactions, &rates, &IsinCountries))
    }
}

/// Read transactions (JSON) from a file, or stdin with "-"
pub fn read_transactions(path: &Path) -> anyhow::Result<Vec<NormalizedTransaction>> {
    if path.as_os_str() == "-" {
        read_from_stdin()
    } else {
        let reader = BufReader::new(File::open(path)?);
        read_transactions_json(reader)
    }
}

fn read_from_stdin() -> anyhow::Result<Vec<NormalizedTransaction>> {
    let mut buffer = Vec::new();
    io::stdin().lock().read_to_end(&mut buffer)?;

    if buffer.is_empty() {
        anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
    }

    read_transactions_json(io::Cursor::new(buffer))
}

pub fn format_eur(amount: Decimal) -> String {
    format!("€{:.2}", amount)
}

pub fn format_quantity(qty: Decimal) -> String {
    let s = format!("{:.8}", qty);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

pub fn year_label(year: Option<i32>) -> String {
    year.map_or("All Years".to_string(), |y| y.to_string())
}

//! Rate command - resolve one exchange rate

use brokertax::engine::{read_rates, REPORTING_CURRENCY};
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RateCommand {
    /// Exchange rates (.csv, otherwise JSON)
    #[arg(short, long)]
    rates: PathBuf,

    /// Currency to look up (e.g. USD)
    #[arg(short, long)]
    currency: String,

    /// Date (YYYY-MM-DD); the latest rate on or before it is used
    #[arg(short, long)]
    date: NaiveDate,

    #[arg(long, default_value = REPORTING_CURRENCY)]
    reporting_currency: String,
}

impl RateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let rates = read_rates(&self.rates, &self.reporting_currency)?;
        let rate = rates.lookup(&self.currency, self.date)?;
        println!(
            "1 {} = {} {} on {}",
            rates.reporting_currency(),
            rate,
            self.currency.to_ascii_uppercase(),
            self.date.format("%Y-%m-%d")
        );
        Ok(())
    }
}

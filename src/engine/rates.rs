//! Historical exchange rates and point-in-time lookups.
//!
//! Rates are quoted as units of a foreign currency per one unit of the
//! reporting currency, so converting an amount is `amount / rate`.

use brokertax_derive::CsvSchema;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub const REPORTING_CURRENCY: &str = "EUR";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateError {
    #[error("no {currency} rate on or before {date}")]
    NotFound { currency: String, date: NaiveDate },
    #[error("invalid rate period: {0}")]
    InvalidPeriod(String),
    #[error("non-positive {currency} rate {value} for period {period}")]
    NonPositiveRate {
        currency: String,
        period: String,
        value: Decimal,
    },
}

/// Column description generated by `#[derive(CsvSchema)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvField {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// One rate observation as delivered by the rate data source (JSON or CSV).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, CsvSchema)]
pub struct RateRecord {
    /// Observation date (YYYY-MM-DD), or YYYY-MM for a monthly rate
    pub period: String,
    /// Units of the currency per one unit of the reporting currency
    #[schemars(with = "f64")]
    pub value: Decimal,
    /// ISO 4217 currency code
    pub currency: String,
}

impl RateRecord {
    pub fn to_observation(&self) -> Result<RateObservation, RateError> {
        let date = parse_period(&self.period)?;
        if self.value <= Decimal::ZERO {
            return Err(RateError::NonPositiveRate {
                currency: self.currency.clone(),
                period: self.period.clone(),
                value: self.value,
            });
        }
        Ok(RateObservation {
            currency: normalize_currency(&self.currency),
            date,
            rate: self.value,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateObservation {
    pub currency: String,
    pub date: NaiveDate,
    pub rate: Decimal,
}

/// Immutable rate table. Build it once, then share it by reference.
#[derive(Debug, Clone)]
pub struct RateTable {
    reporting_currency: String,
    rates: HashMap<String, Vec<(NaiveDate, Decimal)>>,
}

impl Default for RateTable {
    fn default() -> Self {
        RateTable::new(REPORTING_CURRENCY, Vec::new())
    }
}

impl RateTable {
    pub fn new<I>(reporting_currency: &str, observations: I) -> Self
    where
        I: IntoIterator<Item = RateObservation>,
    {
        let mut rates: HashMap<String, Vec<(NaiveDate, Decimal)>> = HashMap::new();
        for observation in observations {
            rates
                .entry(normalize_currency(&observation.currency))
                .or_default()
                .push((observation.date, observation.rate));
        }
        // Stable sort: for duplicate dates the observation loaded last wins.
        for series in rates.values_mut() {
            series.sort_by_key(|(date, _)| *date);
        }
        log::debug!(
            "Loaded rates for {} currencies ({} observations)",
            rates.len(),
            rates.values().map(Vec::len).sum::<usize>()
        );
        RateTable {
            reporting_currency: normalize_currency(reporting_currency),
            rates,
        }
    }

    pub fn reporting_currency(&self) -> &str {
        &self.reporting_currency
    }

    /// Rate for `currency` on `date`: the exact observation if present, otherwise
    /// the latest one before it. Always 1 for the reporting currency.
    pub fn lookup(&self, currency: &str, date: NaiveDate) -> Result<Decimal, RateError> {
        let currency = normalize_currency(currency);
        if currency == self.reporting_currency {
            return Ok(Decimal::ONE);
        }
        let not_found = || RateError::NotFound {
            currency: currency.clone(),
            date,
        };
        let series = self.rates.get(&currency).ok_or_else(not_found)?;
        let idx = series.partition_point(|(observed, _)| *observed <= date);
        if idx == 0 {
            return Err(not_found());
        }
        Ok(series[idx - 1].1)
    }

    pub fn len(&self) -> usize {
        self.rates.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load rates from a file; `.csv` files are read as CSV, anything else as JSON.
pub fn read_rates(path: &Path, reporting_currency: &str) -> anyhow::Result<RateTable> {
    let reader = BufReader::new(File::open(path)?);
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        read_rates_csv(reader, reporting_currency)
    } else {
        read_rates_json(reader, reporting_currency)
    }
}

/// Read a JSON array of `{period, value, currency}` records.
pub fn read_rates_json<R: Read>(reader: R, reporting_currency: &str) -> anyhow::Result<RateTable> {
    let records: Vec<RateRecord> = serde_json::from_reader(reader)?;
    build_table(records, reporting_currency)
}

/// Read CSV with `period,value,currency` columns.
pub fn read_rates_csv<R: Read>(reader: R, reporting_currency: &str) -> anyhow::Result<RateTable> {
    let mut rdr = csv::Reader::from_reader(reader);
    let records: Result<Vec<RateRecord>, _> = rdr.deserialize().collect();
    build_table(records?, reporting_currency)
}

fn build_table(records: Vec<RateRecord>, reporting_currency: &str) -> anyhow::Result<RateTable> {
    let observations = records
        .iter()
        .map(RateRecord::to_observation)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RateTable::new(reporting_currency, observations))
}

fn parse_period(period: &str) -> Result<NaiveDate, RateError> {
    let period = period.trim();
    NaiveDate::parse_from_str(period, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d"))
        .map_err(|_| RateError::InvalidPeriod(period.to_string()))
}

fn normalize_currency(currency: &str) -> String {
    currency.trim().to_ascii_uppercase()
}

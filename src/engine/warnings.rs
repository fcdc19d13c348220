use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Non-fatal notices emitted while enriching or matching.
/// The affected record is still processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Warning {
    /// No usable rate was found; the record was converted at 1.0.
    UnresolvedExchangeRate {
        index: usize,
        currency: String,
        #[schemars(with = "String")]
        date: NaiveDate,
    },
    /// A sell exceeded the open lots for its instrument.
    UnmatchedSale {
        index: usize,
        isin: String,
        #[schemars(with = "f64")]
        quantity: Decimal,
    },
}

/// Where in the pipeline a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Stage {
    Enrichment,
    StockMatching,
    OptionMatching,
    DividendAggregation,
}

/// Why a record was excluded from the outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum SkipReason {
    /// Date could not be parsed.
    InvalidDate { value: String },
    /// Stock or option trade with zero or negative quantity.
    NonPositiveQuantity {
        #[schemars(with = "f64")]
        quantity: Decimal,
    },
    /// Option trade with an empty product name.
    MissingProduct,
    /// Stock trade with an empty instrument identifier.
    MissingInstrument,
    /// No structured direction and the description names neither or both of buy/sell.
    AmbiguousDirection,
    /// Instrument identifier too short to derive a country.
    MissingCountry { isin: String },
    /// Amount or its converted value does not fit in a decimal.
    AmountOverflow,
}

/// A record excluded from processing, with its position in the input batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SkippedRecord {
    pub index: usize,
    pub stage: Stage,
    pub reason: SkipReason,
    pub description: String,
}

impl SkippedRecord {
    pub fn new(index: usize, stage: Stage, reason: SkipReason, description: &str) -> Self {
        log::warn!("Skipping record {} during {:?}: {:?}", index, stage, reason);
        SkippedRecord {
            index,
            stage,
            reason,
            description: description.to_string(),
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InvalidDate { value } => write!(f, "invalid date '{}'", value),
            SkipReason::NonPositiveQuantity { quantity } => {
                write!(f, "non-positive quantity {}", quantity)
            }
            SkipReason::MissingProduct => write!(f, "missing product name"),
            SkipReason::MissingInstrument => write!(f, "missing instrument identifier"),
            SkipReason::AmbiguousDirection => write!(f, "ambiguous buy/sell direction"),
            SkipReason::MissingCountry { isin } => {
                write!(f, "no country for instrument '{}'", isin)
            }
            SkipReason::AmountOverflow => write!(f, "amount out of range"),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnresolvedExchangeRate {
                currency, date, ..
            } => write!(f, "no {} rate on or before {}, used 1.0", currency, date),
            Warning::UnmatchedSale { isin, quantity, .. } => {
                write!(f, "{} {} sold without an open lot", quantity, isin)
            }
        }
    }
}

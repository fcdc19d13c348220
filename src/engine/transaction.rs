use super::country::{country_code, CountryLookup};
use super::rates::RateTable;
use super::warnings::{SkipReason, SkippedRecord, Stage, Warning};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;

/// Broad record type assigned by the upstream parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Stock,
    Option,
    Dividend,
    Cash,
    Fee,
}

/// Buy sorts before sell, which is what same-day matching relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Cash flow sign: buying pays out, selling receives.
    pub fn sign(self) -> Decimal {
        match self {
            Direction::Buy => Decimal::NEGATIVE_ONE,
            Direction::Sell => Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DividendKind {
    Gross,
    /// Withholding tax booked against a dividend
    Tax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CashKind {
    Deposit,
    Other,
}

/// Classification resolved once during enrichment. Downstream consumers match
/// on this instead of re-reading type, subtype or description fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "detail")]
pub enum TransactionKind {
    Stock(Direction),
    Option(Direction),
    Dividend(DividendKind),
    Cash(CashKind),
    Fee,
}

/// Input root for transaction JSON
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TransactionInput {
    pub transactions: Vec<NormalizedTransaction>,
}

/// A broker record after parsing, before any derived values are computed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedTransaction {
    /// Broker or file the record came from
    #[serde(default)]
    pub source: String,
    /// Trade or booking date (YYYY-MM-DD or YYYY-MM-DDThh:mm:ss)
    pub date: String,
    #[serde(default)]
    pub product: String,
    /// Instrument identifier (ISIN)
    #[serde(default)]
    pub isin: String,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub quantity: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub price: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub commission: Decimal,
    pub currency: String,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Original description line, also used for direction inference
    #[serde(default)]
    pub raw_text: String,
    /// Signed amount as reported by the broker
    #[serde(default)]
    #[schemars(with = "f64")]
    pub source_amount: Decimal,
    pub transaction_type: TransactionType,
    /// Free-form subtype, e.g. "tax" for dividends or "deposit" for cash
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub buy_sell: Option<Direction>,
}

/// A normalized record with converted amounts, country and dedup hash.
///
/// Immutable once created: matchers keep remaining quantities in their own
/// side tables, indexed by lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTransaction {
    /// Position of the record in the input batch
    pub index: usize,
    pub source: String,
    pub datetime: NaiveDateTime,
    pub product: String,
    pub isin: String,
    pub kind: TransactionKind,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub currency: String,
    pub order_id: String,
    pub raw_text: String,
    pub source_amount: Decimal,
    /// Signed gross amount in the original currency
    pub amount: Decimal,
    pub exchange_rate: Decimal,
    /// `(amount - commission) / exchange_rate`
    pub amount_eur: Decimal,
    /// `amount / exchange_rate`
    pub gross_amount_eur: Decimal,
    pub commission_eur: Decimal,
    pub country_code: Option<String>,
    pub country: Option<String>,
    pub hash: String,
}

impl EnrichedTransaction {
    pub fn date(&self) -> NaiveDate {
        self.datetime.date()
    }

    pub fn year(&self) -> i32 {
        self.datetime.year()
    }
}

/// Result of enriching one batch.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub transactions: Vec<EnrichedTransaction>,
    pub skipped: Vec<SkippedRecord>,
    pub warnings: Vec<Warning>,
}

/// Read transactions from JSON
pub fn read_transactions_json<R: Read>(reader: R) -> anyhow::Result<Vec<NormalizedTransaction>> {
    let input: TransactionInput = serde_json::from_reader(reader)?;
    Ok(input.transactions)
}

/// Enrich a batch. Malformed records are skipped and reported; a missing
/// exchange rate falls back to 1.0 with a warning.
pub fn enrich_transactions(
    inputs: &[NormalizedTransaction],
    rates: &RateTable,
    countries: &dyn CountryLookup,
) -> Enrichment {
    let mut enrichment = Enrichment::default();
    for (index, input) in inputs.iter().enumerate() {
        match enrich(index, input, rates, countries) {
            Ok((tx, warning)) => {
                enrichment.warnings.extend(warning);
                enrichment.transactions.push(tx);
            }
            Err(reason) => enrichment.skipped.push(SkippedRecord::new(
                index,
                Stage::Enrichment,
                reason,
                &input.raw_text,
            )),
        }
    }
    log::debug!(
        "Enriched {} of {} records ({} skipped)",
        enrichment.transactions.len(),
        inputs.len(),
        enrichment.skipped.len()
    );
    enrichment
}

fn enrich(
    index: usize,
    input: &NormalizedTransaction,
    rates: &RateTable,
    countries: &dyn CountryLookup,
) -> Result<(EnrichedTransaction, Option<Warning>), SkipReason> {
    let datetime = parse_datetime(&input.date).ok_or_else(|| SkipReason::InvalidDate {
        value: input.date.clone(),
    })?;
    let kind = classify(input)?;

    let amount = match kind {
        TransactionKind::Stock(direction) | TransactionKind::Option(direction) => input
            .quantity
            .checked_mul(input.price)
            .map(|gross| gross.abs() * direction.sign())
            .ok_or(SkipReason::AmountOverflow)?,
        _ => input.source_amount,
    };

    let mut warning = None;
    let exchange_rate = match rates.lookup(&input.currency, datetime.date()) {
        Ok(rate) if rate > Decimal::ZERO => rate,
        result => {
            log::warn!(
                "Record {}: no usable {} rate for {} ({:?}), using 1.0",
                index,
                input.currency,
                datetime.date(),
                result
            );
            warning = Some(Warning::UnresolvedExchangeRate {
                index,
                currency: input.currency.clone(),
                date: datetime.date(),
            });
            Decimal::ONE
        }
    };

    let convert = |value: Option<Decimal>| {
        value
            .and_then(|v| v.checked_div(exchange_rate))
            .ok_or(SkipReason::AmountOverflow)
    };
    let amount_eur = convert(amount.checked_sub(input.commission))?;
    let gross_amount_eur = convert(Some(amount))?;
    let commission_eur = convert(Some(input.commission))?;

    let code = country_code(&input.isin);
    let country = code
        .as_deref()
        .map(|c| countries.country(c).unwrap_or(c).to_string());
    let order_id = input.order_id.clone().unwrap_or_default();

    let tx = EnrichedTransaction {
        index,
        source: input.source.clone(),
        datetime,
        product: input.product.trim().to_string(),
        isin: input.isin.trim().to_string(),
        kind,
        quantity: input.quantity,
        price: input.price,
        commission: input.commission,
        currency: input.currency.trim().to_ascii_uppercase(),
        hash: dedup_hash(datetime, input, &order_id),
        order_id,
        raw_text: input.raw_text.clone(),
        source_amount: input.source_amount,
        amount,
        exchange_rate,
        amount_eur,
        gross_amount_eur,
        commission_eur,
        country_code: code,
        country,
    };
    Ok((tx, warning))
}

fn classify(input: &NormalizedTransaction) -> Result<TransactionKind, SkipReason> {
    let subtype_is = |name: &str| {
        input
            .subtype
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(name))
    };
    match input.transaction_type {
        TransactionType::Stock | TransactionType::Option => {
            if input.quantity <= Decimal::ZERO {
                return Err(SkipReason::NonPositiveQuantity {
                    quantity: input.quantity,
                });
            }
            let is_stock = input.transaction_type == TransactionType::Stock;
            if is_stock && input.isin.trim().is_empty() {
                return Err(SkipReason::MissingInstrument);
            }
            if !is_stock && input.product.trim().is_empty() {
                return Err(SkipReason::MissingProduct);
            }
            let direction = match input.buy_sell {
                Some(direction) => direction,
                None => infer_direction(&input.raw_text).ok_or(SkipReason::AmbiguousDirection)?,
            };
            Ok(if is_stock {
                TransactionKind::Stock(direction)
            } else {
                TransactionKind::Option(direction)
            })
        }
        TransactionType::Dividend if subtype_is("tax") => {
            Ok(TransactionKind::Dividend(DividendKind::Tax))
        }
        TransactionType::Dividend => Ok(TransactionKind::Dividend(DividendKind::Gross)),
        TransactionType::Cash if subtype_is("deposit") => Ok(TransactionKind::Cash(CashKind::Deposit)),
        TransactionType::Cash => Ok(TransactionKind::Cash(CashKind::Other)),
        TransactionType::Fee => Ok(TransactionKind::Fee),
    }
}

/// Direction from free text: exactly one of the words "buy" / "sell" must appear.
pub fn infer_direction(text: &str) -> Option<Direction> {
    let mut buy = false;
    let mut sell = false;
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.eq_ignore_ascii_case("buy") {
            buy = true;
        } else if word.eq_ignore_ascii_case("sell") {
            sell = true;
        }
    }
    match (buy, sell) {
        (true, false) => Some(Direction::Buy),
        (false, true) => Some(Direction::Sell),
        _ => None,
    }
}

fn dedup_hash(datetime: NaiveDateTime, input: &NormalizedTransaction, order_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}|{}|{}|{}|{}",
            datetime.format("%Y-%m-%dT%H:%M:%S"),
            input.raw_text,
            order_id,
            input.source_amount.normalize(),
            input.commission.normalize()
        )
        .as_bytes(),
    );
    hex::encode(hasher.finalize())
}

/// Parse a date string that may be date-only or datetime format
fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::country::IsinCountries;
    use crate::engine::rates::RateObservation;
    use rust_decimal_macros::dec;

    fn record(transaction_type: TransactionType) -> NormalizedTransaction {
        NormalizedTransaction {
            source: "degiro".to_string(),
            date: "2024-01-05".to_string(),
            product: "APPLE INC".to_string(),
            isin: "US0378331005".to_string(),
            quantity: dec!(10),
            price: dec!(150),
            commission: dec!(2),
            currency: "USD".to_string(),
            order_id: Some("ord-1".to_string()),
            raw_text: "Buy 10 APPLE INC@150 USD".to_string(),
            source_amount: dec!(-1500),
            transaction_type,
            subtype: None,
            buy_sell: Some(Direction::Buy),
        }
    }

    fn usd_rates() -> RateTable {
        RateTable::new(
            "EUR",
            vec![RateObservation {
                currency: "USD".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                rate: dec!(1.25),
            }],
        )
    }

    fn enrich_one(input: NormalizedTransaction) -> Enrichment {
        enrich_transactions(&[input], &usd_rates(), &IsinCountries)
    }

    #[test]
    fn stock_buy_is_negative_and_converted() {
        let result = enrich_one(record(TransactionType::Stock));
        assert!(result.skipped.is_empty());
        assert!(result.warnings.is_empty());

        let tx = &result.transactions[0];
        assert_eq!(tx.kind, TransactionKind::Stock(Direction::Buy));
        assert_eq!(tx.amount, dec!(-1500));
        assert_eq!(tx.exchange_rate, dec!(1.25));
        assert_eq!(tx.amount_eur, dec!(-1201.6));
        assert_eq!(tx.gross_amount_eur, dec!(-1200));
        assert_eq!(tx.commission_eur, dec!(1.6));
        assert_eq!(tx.country_code.as_deref(), Some("US"));
        assert_eq!(tx.country.as_deref(), Some("United States"));
        assert_eq!(tx.quantity, dec!(10));
    }

    #[test]
    fn sell_is_positive_regardless_of_input_sign() {
        let mut input = record(TransactionType::Stock);
        input.buy_sell = Some(Direction::Sell);
        input.price = dec!(-150);
        let tx = &enrich_one(input).transactions[0];
        assert_eq!(tx.amount, dec!(1500));
    }

    #[test]
    fn non_trade_uses_source_amount_verbatim() {
        let mut input = record(TransactionType::Dividend);
        input.source_amount = dec!(12.50);
        input.commission = Decimal::ZERO;
        input.subtype = Some("TAX".to_string());
        let tx = &enrich_one(input).transactions[0];
        assert_eq!(tx.kind, TransactionKind::Dividend(DividendKind::Tax));
        assert_eq!(tx.amount, dec!(12.50));
        assert_eq!(tx.amount_eur, dec!(10));
    }

    #[test]
    fn missing_rate_defaults_to_one_and_warns() {
        let mut input = record(TransactionType::Stock);
        input.currency = "CHF".to_string();
        let result = enrich_one(input);
        let tx = &result.transactions[0];
        assert_eq!(tx.exchange_rate, Decimal::ONE);
        assert_eq!(tx.amount_eur, dec!(-1502));
        assert_eq!(
            result.warnings,
            vec![Warning::UnresolvedExchangeRate {
                index: 0,
                currency: "CHF".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            }]
        );
    }

    #[test]
    fn unknown_country_prefix_falls_back_to_code() {
        let mut input = record(TransactionType::Stock);
        input.isin = "XS1234567890".to_string();
        let tx = &enrich_one(input).transactions[0];
        assert_eq!(tx.country_code.as_deref(), Some("XS"));
        assert_eq!(tx.country.as_deref(), Some("XS"));
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let a = enrich_one(record(TransactionType::Stock)).transactions[0].hash.clone();
        let b = enrich_one(record(TransactionType::Stock)).transactions[0].hash.clone();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut changed = record(TransactionType::Stock);
        changed.order_id = Some("ord-2".to_string());
        assert_ne!(a, enrich_one(changed).transactions[0].hash);

        let mut rescaled = record(TransactionType::Stock);
        rescaled.commission = dec!(2.00);
        assert_eq!(a, enrich_one(rescaled).transactions[0].hash);
    }

    #[test]
    fn option_direction_inferred_from_text() {
        let mut input = record(TransactionType::Option);
        input.buy_sell = None;
        input.raw_text = "SELL 1 AAPL 19JAN24 200 C @ 1.20".to_string();
        let tx = &enrich_one(input).transactions[0];
        assert_eq!(tx.kind, TransactionKind::Option(Direction::Sell));
        assert_eq!(tx.amount, dec!(1500));
    }

    #[test]
    fn ambiguous_direction_is_skipped() {
        for text in ["Exercise AAPL 200 C", "buy to close / sell to open"] {
            let mut input = record(TransactionType::Option);
            input.buy_sell = None;
            input.raw_text = text.to_string();
            let result = enrich_one(input);
            assert!(result.transactions.is_empty());
            assert_eq!(result.skipped[0].reason, SkipReason::AmbiguousDirection);
            assert_eq!(result.skipped[0].stage, Stage::Enrichment);
            assert_eq!(result.skipped[0].description, text);
        }
    }

    #[test]
    fn structured_direction_wins_over_text() {
        let mut input = record(TransactionType::Option);
        input.raw_text = "sell".to_string();
        input.buy_sell = Some(Direction::Buy);
        let tx = &enrich_one(input).transactions[0];
        assert_eq!(tx.kind, TransactionKind::Option(Direction::Buy));
    }

    #[test]
    fn infer_direction_matches_whole_words() {
        assert_eq!(infer_direction("Buy 5 @ 10"), Some(Direction::Buy));
        assert_eq!(infer_direction("order: SELL"), Some(Direction::Sell));
        assert_eq!(infer_direction("buyback program"), None);
        assert_eq!(infer_direction(""), None);
    }

    #[test]
    fn data_quality_skips() {
        let mut zero = record(TransactionType::Stock);
        zero.quantity = Decimal::ZERO;
        let mut no_product = record(TransactionType::Option);
        no_product.product = "  ".to_string();
        let mut no_isin = record(TransactionType::Stock);
        no_isin.isin = String::new();
        let mut bad_date = record(TransactionType::Cash);
        bad_date.date = "05/01/2024".to_string();

        let result = enrich_transactions(
            &[zero, no_product, no_isin, bad_date, record(TransactionType::Fee)],
            &usd_rates(),
            &IsinCountries,
        );
        let reasons: Vec<_> = result.skipped.iter().map(|s| s.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::NonPositiveQuantity {
                    quantity: Decimal::ZERO
                },
                SkipReason::MissingProduct,
                SkipReason::MissingInstrument,
                SkipReason::InvalidDate {
                    value: "05/01/2024".to_string()
                },
            ]
        );
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].index, 4);
        assert_eq!(result.transactions[0].kind, TransactionKind::Fee);
    }

    #[test]
    fn amount_overflow_skips_only_that_record() {
        let mut huge = record(TransactionType::Stock);
        huge.quantity = dec!(100000000000000000000);
        huge.price = dec!(10000000000);

        let mut tiny_rate = record(TransactionType::Dividend);
        tiny_rate.currency = "XYZ".to_string();
        tiny_rate.source_amount = dec!(1000000000000000);
        let rates = RateTable::new(
            "EUR",
            vec![RateObservation {
                currency: "XYZ".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                rate: dec!(0.0000000000000000000001),
            }],
        );

        let result = enrich_transactions(
            &[huge, tiny_rate, record(TransactionType::Fee)],
            &rates,
            &IsinCountries,
        );

        let skipped: Vec<_> = result
            .skipped
            .iter()
            .map(|s| (s.index, s.reason.clone()))
            .collect();
        assert_eq!(
            skipped,
            vec![(0, SkipReason::AmountOverflow), (1, SkipReason::AmountOverflow)]
        );
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].index, 2);
    }

    #[test]
    fn cash_subtypes() {
        let mut deposit = record(TransactionType::Cash);
        deposit.subtype = Some("Deposit".to_string());
        let mut interest = record(TransactionType::Cash);
        interest.subtype = Some("interest".to_string());
        let result = enrich_transactions(&[deposit, interest], &usd_rates(), &IsinCountries);
        assert_eq!(result.transactions[0].kind, TransactionKind::Cash(CashKind::Deposit));
        assert_eq!(result.transactions[1].kind, TransactionKind::Cash(CashKind::Other));
    }

    #[test]
    fn parses_datetime_formats() {
        assert_eq!(
            parse_datetime("2024-01-05T10:30:00").map(|d| d.date()),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
        assert!(parse_datetime("2024-01-05 10:30:00").is_some());
        assert!(parse_datetime("2024-01-05").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn reads_transaction_json() {
        let json = r#"{"transactions": [{
            "date": "2024-01-05",
            "isin": "US0378331005",
            "quantity": "10",
            "price": "150",
            "currency": "USD",
            "transaction_type": "STOCK",
            "buy_sell": "BUY"
        }]}"#;
        let txs = read_transactions_json(json.as_bytes()).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::Stock);
        assert_eq!(txs[0].buy_sell, Some(Direction::Buy));
        assert_eq!(txs[0].commission, Decimal::ZERO);
    }
}

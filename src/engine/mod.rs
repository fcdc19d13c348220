pub mod cash;
pub mod country;
pub mod dividends;
pub mod options;
pub mod pipeline;
pub mod rates;
pub mod stocks;
pub mod transaction;
pub mod warnings;

// Flat public surface for domain types and functions.
pub use cash::{extract_cash_movements, CashMovement};
pub use country::{CountryLookup, IsinCountries};
pub use dividends::{aggregate_dividends, DividendCountrySummary, DividendReport};
pub use options::{
    match_option_positions, normalize_product, OptionPosition, OptionReport, PositionSide,
    RealizedOptionTrade,
};
pub use pipeline::{run, EngineReport};
pub use rates::{
    read_rates, read_rates_csv, read_rates_json, CsvField, RateError, RateObservation,
    RateRecord, RateTable, REPORTING_CURRENCY,
};
pub use stocks::{match_stock_lots, MatchError, OpenLot, RealizedSale, StockReport, UnmatchedSale};
pub use transaction::{
    enrich_transactions, infer_direction, read_transactions_json, CashKind, Direction,
    DividendKind, Enrichment, EnrichedTransaction, NormalizedTransaction, TransactionInput,
    TransactionKind, TransactionType,
};
pub use warnings::{SkipReason, SkippedRecord, Stage, Warning};

//! Enrichment and FIFO lot matching for normalized brokerage transactions.

pub mod engine;

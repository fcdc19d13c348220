//! Schema command - print expected input formats

use brokertax::engine::{RateRecord, TransactionInput};
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Which input format to describe
    #[arg(value_enum, default_value = "transactions")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema for the transaction input
    Transactions,
    /// JSON Schema for a rate file
    Rates,
    /// CSV header row for a rate file
    RatesCsvHeader,
    /// CSV column descriptions for a rate file
    RatesCsvFields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::Transactions => {
                let schema = schema_for!(TransactionInput);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaFormat::Rates => {
                let schema = schema_for!(Vec<RateRecord>);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaFormat::RatesCsvHeader => println!("{}", RateRecord::csv_header()),
            SchemaFormat::RatesCsvFields => print_csv_fields(),
        }
        Ok(())
    }
}

fn print_csv_fields() {
    println!("Rate CSV Format");
    println!("===============");
    println!();
    for field in RateRecord::csv_schema() {
        let req = if field.required { "required" } else { "optional" };
        println!("{:20} ({:8})  {}", field.name, req, field.description);
    }
    println!();
    println!("Rates are units of the currency per one unit of the reporting currency");
}

use clap::{Parser, Subcommand};

mod cmd;

#[derive(Parser, Debug)]
#[command(
    name = "brokertax",
    version,
    about = "FIFO capital gains, option results and dividends from broker transactions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Realized stock and option results, dividends by country, deposits
    Report(cmd::report::ReportCommand),
    /// Open lots at each year end
    Holdings(cmd::holdings::HoldingsCommand),
    /// List skipped records and warnings; exits 1 if there are any
    Validate(cmd::validate::ValidateCommand),
    /// Look up one exchange rate
    Rate(cmd::rate::RateCommand),
    /// Print the expected input formats
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Report(report) => report.exec(),
        Command::Holdings(holdings) => holdings.exec(),
        Command::Validate(validate) => validate.exec(),
        Command::Rate(rate) => rate.exec(),
        Command::Schema(schema) => schema.exec(),
    }
}

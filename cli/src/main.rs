//! Ratekeeper CLI
//!
//! Looks up official rates and converts amounts against the NBRB API.

use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ratekeeper_common::CurrencyId;
use ratekeeper_fx::{InMemoryRateStore, NbrbRateProvider, RateEngine, RateError};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{CliConfig, LogFormat};

/// Ratekeeper CLI
#[derive(Parser, Debug)]
#[command(name = "ratekeeper")]
#[command(about = "Official exchange rates and currency conversion")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every known currency
    Currencies,

    /// Today's rate for one currency
    Rate {
        /// Currency id
        #[arg(long, conflicts_with = "abbreviation", required_unless_present = "abbreviation")]
        id: Option<CurrencyId>,

        /// Currency abbreviation, e.g. USD
        #[arg(long)]
        abbreviation: Option<String>,
    },

    /// Today's rates for several currencies, in order
    Bulk {
        /// Currency abbreviations
        abbreviations: Vec<String>,
    },

    /// Convert an amount between two currencies at today's rates
    Convert {
        /// Source currency id
        #[arg(long)]
        from: CurrencyId,

        /// Target currency id
        #[arg(long)]
        to: CurrencyId,

        /// Amount in the source currency
        #[arg(long)]
        amount: Decimal,
    },

    /// Stored rates of one currency on one date
    Rates {
        /// Currency abbreviation
        #[arg(long)]
        abbreviation: String,

        /// Date as YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },
}

#[derive(Serialize)]
struct Conversion {
    from: CurrencyId,
    to: CurrencyId,
    amount: Decimal,
    result: Decimal,
}

fn init_tracing(config: &CliConfig) {
    let filter = tracing_subscriber::EnvFilter::new(&config.log_level);
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Plain => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(engine: &RateEngine, command: Command) -> anyhow::Result<()> {
    // The store starts empty; seed it from the provider.
    let currencies = engine.list_all_currencies().await?;

    match command {
        Command::Currencies => print_json(&currencies)?,
        Command::Rate { id: Some(id), .. } => print_json(&engine.resolve_rate(id).await?)?,
        Command::Rate { abbreviation, .. } => {
            print_json(&engine.resolve_rate_by_abbreviation(abbreviation.as_deref()).await?)?
        }
        Command::Bulk { abbreviations } => {
            print_json(&engine.resolve_rates_bulk(&abbreviations).await?)?
        }
        Command::Convert { from, to, amount } => {
            let result = engine.convert(from, to, amount).await?;
            print_json(&Conversion {
                from,
                to,
                amount,
                result,
            })?
        }
        Command::Rates { abbreviation, date } => print_json(
            &engine
                .list_rates_by_abbreviation_and_date(&abbreviation, date)
                .await?,
        )?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::from_env();
    init_tracing(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let args = Args::parse();

    let provider = NbrbRateProvider::new(config.provider_config())?;
    let engine = RateEngine::new(
        Arc::new(InMemoryRateStore::new()),
        Arc::new(provider),
        config.engine_config(),
    );

    info!(provider_url = %config.provider_url, "Starting Ratekeeper");

    if let Err(e) = run(&engine, args.command).await {
        match e.downcast_ref::<RateError>() {
            Some(rate_error) => error!(
                code = rate_error.error_code(),
                status = rate_error.status_code(),
                error = %rate_error,
                "Request failed"
            ),
            None => error!(error = %e, "Request failed"),
        }
        return Err(e);
    }

    let stats = engine.stats();
    info!(
        requests = stats.requests,
        cached_entries = stats.cached_entries,
        "Done"
    );

    Ok(())
}

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use tariff_engine::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    init_tracing();

    match args.get_command() {
        cli::Commands::Serve => {
            commands::serve::execute(&args.config).await?;
        }
        cli::Commands::Resolve {
            query,
            chapter,
            limit,
        } => {
            commands::query::resolve(&args.config, &query, chapter.as_deref(), limit).await?;
        }
        cli::Commands::Calculate {
            code,
            country,
            quantity,
            unit_price,
            freight,
            insurance,
            other,
            adcvd_rate,
        } => {
            commands::query::calculate(
                &args.config,
                &code,
                &country,
                quantity,
                unit_price,
                freight,
                insurance,
                other,
                adcvd_rate,
            )
            .await?;
        }
        cli::Commands::Compare {
            code,
            base_value,
            quantity,
            countries,
            current_country,
            freight,
            insurance,
            other,
        } => {
            commands::query::compare(
                &args.config,
                &code,
                base_value,
                quantity,
                freight,
                insurance,
                other,
                &countries,
                &current_country,
            )
            .await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("Tariff Engine v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

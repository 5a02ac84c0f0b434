use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tariff-engine", version, about = "Tariff classification and landed-cost engine")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the engine server (default)
    Serve,

    /// Resolve a free-text or code query to classification candidates
    Resolve {
        /// Free-text description or (partial) classification code
        query: String,

        /// Restrict candidates to a 2-digit chapter
        #[arg(long)]
        chapter: Option<String>,

        /// Maximum number of candidates (1-100)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Compute a landed-cost breakdown for one code and country
    Calculate {
        #[arg(long)]
        code: String,

        #[arg(long)]
        country: String,

        #[arg(long)]
        quantity: f64,

        #[arg(long)]
        unit_price: f64,

        #[arg(long, default_value = "0")]
        freight: f64,

        #[arg(long, default_value = "0")]
        insurance: f64,

        #[arg(long, default_value = "0")]
        other: f64,

        /// Antidumping/countervailing duty rate percent, if applicable
        #[arg(long)]
        adcvd_rate: Option<f64>,
    },

    /// Compare sourcing options across candidate countries
    Compare {
        #[arg(long)]
        code: String,

        /// Total product value of the shipment
        #[arg(long)]
        base_value: f64,

        #[arg(long)]
        quantity: f64,

        /// Comma-separated candidate origin countries
        #[arg(long, value_delimiter = ',')]
        countries: Vec<String>,

        /// Current sourcing country (savings baseline)
        #[arg(long, default_value = "")]
        current_country: String,

        #[arg(long, default_value = "0")]
        freight: f64,

        #[arg(long, default_value = "0")]
        insurance: f64,

        #[arg(long, default_value = "0")]
        other: f64,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate the configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Serve if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            command: None,
        };

        assert!(matches!(cli.get_command(), Commands::Serve));
    }

    #[test]
    fn test_cli_parsing_resolve() {
        let args = vec!["tariff-engine", "resolve", "laptop computers", "--limit", "5"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Resolve { query, limit, .. } => {
                assert_eq!(query, "laptop computers");
                assert_eq!(limit, 5);
            }
            _ => panic!("Expected Resolve command"),
        }
    }

    #[test]
    fn test_cli_parsing_compare_country_list() {
        let args = vec![
            "tariff-engine",
            "compare",
            "--code",
            "8471300100",
            "--base-value",
            "500",
            "--quantity",
            "1",
            "--countries",
            "China,Vietnam,Mexico",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Compare { countries, .. } => {
                assert_eq!(countries, vec!["China", "Vietnam", "Mexico"]);
            }
            _ => panic!("Expected Compare command"),
        }
    }

    #[test]
    fn test_cli_parsing_config_validate() {
        let args = vec!["tariff-engine", "config", "validate"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Config { action } => {
                assert!(matches!(action, ConfigCommands::Validate));
            }
            _ => panic!("Expected Config command"),
        }
    }
}

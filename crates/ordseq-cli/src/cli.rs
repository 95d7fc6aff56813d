use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ordseq_types::OrderStatus;

#[derive(Parser)]
#[command(
    name = "ordseq",
    about = "Sequential order numbers over an order record store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database holding the orders
    #[arg(long, global = true, default_value = "orders.db")]
    pub db: PathBuf,

    /// TOML numbering configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Backfill legacy orders and record the installed version
    Install(InstallArgs),
    /// Create an order and number it
    Create(CreateArgs),
    /// Move an order out of draft and number it
    Finalize(FinalizeArgs),
    /// Number an existing order if it has no number yet
    Assign(KeyArgs),
    /// Find the order behind a customer-facing number
    Resolve(ResolveArgs),
    /// Show one order
    Show(KeyArgs),
    /// List orders
    List(ListArgs),
    /// Create a renewal of an order
    Renew(RenewArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct InstallArgs {}

#[derive(Args)]
pub struct CreateArgs {
    #[arg(long, default_value = "pending", value_parser = parse_status)]
    pub status: OrderStatus,
    /// Import with an explicit record key
    #[arg(long)]
    pub key: Option<u64>,
}

#[derive(Args)]
pub struct FinalizeArgs {
    pub key: u64,
    #[arg(long, default_value = "processing", value_parser = parse_status)]
    pub status: OrderStatus,
}

#[derive(Args)]
pub struct KeyArgs {
    pub key: u64,
}

#[derive(Args)]
pub struct ResolveArgs {
    pub identifier: String,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long, value_parser = parse_status)]
    pub status: Option<OrderStatus>,
}

#[derive(Args)]
pub struct RenewArgs {
    pub key: u64,
    #[arg(long, default_value = "pending", value_parser = parse_status)]
    pub status: OrderStatus,
}

#[derive(Args)]
pub struct ConfigArgs {}

fn parse_status(s: &str) -> Result<OrderStatus, String> {
    s.parse::<OrderStatus>().map_err(|e| e.to_string())
}

//! CLI argument definitions for shiprate.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rates` | Aggregate shipping quotes for a shipment |
//! | `history` | List stored quotes for a customer |
//! | `cache purge` | Delete expired cached quotes |
//! | `test-connections` | Probe carrier authentication |
//! | `health` | Report service status and mode |
//!
//! # Examples
//!
//! ```bash
//! shiprate rates --carrier all --shipment shipment.json --pretty
//! cat shipment.json | shiprate rates --shipment - --live
//! shiprate history cust-42 --limit 5
//! shiprate cache purge
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use shiprate_core::CarrierSelector;

/// Shipping rate aggregation across UPS and FedEx with a local quote cache.
#[derive(Debug, Parser)]
#[command(name = "shiprate", author, version, about = "Shipping rate aggregation CLI")]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Aggregate quotes for a shipment read from a JSON file or stdin.
    ///
    ///   shiprate rates --carrier ups --shipment shipment.json
    ///   shiprate rates --shipment - --customer-id cust-42 --live
    Rates(RatesArgs),

    /// List stored quotes for a customer, newest first.
    History(HistoryArgs),

    /// Quote cache management.
    Cache(CacheArgs),

    /// Check that each carrier accepts the configured credentials.
    TestConnections,

    /// Report service status, mock mode and current time.
    Health,
}

/// Carrier selection for the `rates` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CarrierArg {
    Ups,
    Fedex,
    All,
}

impl From<CarrierArg> for CarrierSelector {
    fn from(value: CarrierArg) -> Self {
        match value {
            CarrierArg::Ups => Self::Ups,
            CarrierArg::Fedex => Self::Fedex,
            CarrierArg::All => Self::All,
        }
    }
}

#[derive(Debug, Args)]
pub struct RatesArgs {
    #[arg(long, value_enum, default_value_t = CarrierArg::All)]
    pub carrier: CarrierArg,

    /// Path to the shipment JSON, or `-` for stdin.
    #[arg(long)]
    pub shipment: String,

    /// Customer the quotes are recorded for.
    #[arg(long)]
    pub customer_id: Option<String>,

    /// Use synthetic quotes regardless of `SHIPPING_USE_MOCK`.
    #[arg(long, conflicts_with = "live")]
    pub mock: bool,

    /// Call the carrier APIs regardless of `SHIPPING_USE_MOCK`.
    #[arg(long)]
    pub live: bool,
}

impl RatesArgs {
    /// Explicit mode override, if any.
    pub fn mode_override(&self) -> Option<bool> {
        match (self.mock, self.live) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub customer_id: String,

    /// Number of records to return, 1 to 50.
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    pub limit: i64,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum CacheCommand {
    /// Delete cached quotes whose expiry has passed.
    Purge,
}

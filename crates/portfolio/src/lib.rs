//! # Summit Portfolio Crate
//!
//! Derives open positions from the canonical trade ledger.
//!
//! Two components live here:
//!
//! - [`LegacyMigrator`]: a one-time, per-account, idempotent backfill that
//!   converts old-format journal rows into canonical ledger events before
//!   any read.
//! - [`HoldingsService`]: replays the ledger in chronological order into a
//!   weighted-average-cost position per asset. Positions are never stored;
//!   every read is a fresh replay.
//!
//! The only coupling between the two is read-after-migrate consistency:
//! both holdings entry points run the migrator first, best-effort.

pub mod error;
pub mod holdings;
pub mod migration;

pub use error::PortfolioError;
pub use holdings::{AssetReport, HoldingsService, TransactionView};
pub use migration::LegacyMigrator;

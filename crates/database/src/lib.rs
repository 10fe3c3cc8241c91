//! # Summit Database Crate
//!
//! This crate acts as a high-level, application-specific interface to the
//! PostgreSQL database. It owns every SQL statement in the system.
//!
//! ## Architectural Principles
//!
//! - **Adapter layer:** encapsulates all database-specific logic and exposes
//!   a clean, domain-flavored API (ledger events, strategies, executions) to
//!   the rest of the application.
//! - **Asynchronous & pooled:** all operations are asynchronous and share a
//!   `PgPool` for concurrent access.
//! - **Single writes:** every create/update/delete is one atomic statement;
//!   no transaction spans multiple ledger events or execution rows. The only
//!   multi-row write is the legacy-migration bulk insert, which is wrapped in
//!   a transaction so a crash cannot leave a half-migrated batch.
//!
//! ## Public API
//!
//! - `connect`: establishes the database connection pool.
//! - `run_migrations`: applies schema migrations at startup.
//! - `DbRepository`: the connection-pool holder providing all data access.
//! - `DbError`: the error taxonomy for this crate, including `Conflict`
//!   (unique-constraint violations surfaced distinctly).

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::{
    DbExitStrategy, DbLegacyEntry, DbRepository, DbStrategyExecution, NewStrategy,
    NewStrategyExecution, NewTradeEvent, TradeEventUpdate, LEDGER_LIST_CAP,
};

//! Relational persistence for the checkout system.
//!
//! [`CommerceStore`] is the transactional seam the placement saga runs
//! over: `begin` opens a unit of work ([`StoreTx`]) whose writes are
//! all-or-nothing. Dropping an uncommitted transaction rolls everything
//! back. Two backends are provided: [`PostgresStore`] for production and
//! [`InMemoryStore`] for tests, which stages changes against a snapshot
//! and swaps them in on commit.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{CommerceStore, StoreTx};

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

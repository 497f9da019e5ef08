//! Persistence layer.
//!
//! Everything that reads or writes records goes through the [`Store`] trait, handed to components
//! as an `Arc<dyn Store>`:
//!
//! - [`PgStore`]: PostgreSQL via sqlx, used in production
//! - [`MemoryStore`]: an in-process store with the same semantics, used by tests and local runs
//!
//! Multi-record operations ([`Store::approve_request`], [`Store::complete_checkout`]) are atomic in
//! both implementations. Status updates carry the status the caller checked against and fail
//! with [`errors::DbError::StaleState`] if another writer got there first.

pub mod errors;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{OwnerFilter, Store};

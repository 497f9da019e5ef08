//! Database record types.
//!
//! Each entity has a `*CreateDBRequest` for inserts, an optional `*UpdateDBRequest` whose `None`
//! fields are left untouched, and a `*DBResponse` row type.

pub mod invoices;
pub mod payments;
pub mod projects;
pub mod requests;
pub mod transfers;
pub mod users;

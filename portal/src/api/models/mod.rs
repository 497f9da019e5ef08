//! API request and response data models.
//!
//! API models are distinct from the database models in [`crate::db::models`]; every handler
//! converts at the boundary. JSON field names are camelCase and amounts are integer minor units,
//! with a `formatted*` companion where the client displays them.
//!
//! - [`users`]: the authenticated caller, profiles and role changes
//! - [`requests`]: client submissions and admin triage
//! - [`projects`]: project tracking, stage changes and client sign-off
//! - [`invoices`]: invoice creation, listing and statistics
//! - [`payments`]: payment records and payout transfers
//! - [`checkout`]: hosted checkout sessions
//! - [`plans`]: plan suggestions
//! - [`admin`]: the admin overview

pub mod admin;
pub mod checkout;
pub mod invoices;
pub mod payments;
pub mod plans;
pub mod projects;
pub mod requests;
pub mod users;

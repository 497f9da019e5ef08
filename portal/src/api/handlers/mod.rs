//! HTTP request handlers for the portal API.
//!
//! Each submodule handles one area. Handlers authenticate through the [`crate::api::models::users::CurrentUser`]
//! or [`crate::auth::RequiresAdmin`] extractors, check ownership where clients may act, ask the
//! lifecycle tables in [`crate::lifecycle`] for transitions, and persist through
//! [`crate::db::Store`].
//!
//! - [`requests`]: client submissions and admin triage
//! - [`projects`]: project tracking, stage changes, client sign-off and checkout
//! - [`invoices`]: invoicing, statistics and export
//! - [`payments`]: payment records, refunds, export and payout transfers
//! - [`users`]: accounts, profiles and roles
//! - [`admin`]: the dashboard overview
//! - [`checkout`]: `POST /api/create-checkout-session`
//! - [`webhooks`]: `POST /api/webhook`
//! - [`plans`]: `POST /api/suggest-plan`

pub mod admin;
pub mod checkout;
pub mod invoices;
pub mod payments;
pub mod plans;
pub mod projects;
pub mod requests;
pub mod users;
pub mod webhooks;

use crate::{api::models::users::CurrentUser, db::OwnerFilter};

/// Admins list everything; clients only their own records
pub(crate) fn owner_filter(user: &CurrentUser) -> OwnerFilter {
    if user.is_admin {
        OwnerFilter::all()
    } else {
        OwnerFilter::owned_by(user.id)
    }
}

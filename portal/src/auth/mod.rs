//! Authentication and authorization.
//!
//! Sign-in itself is delegated to a hosted identity provider. The portal accepts the resulting
//! identity in one of two forms, tried in order:
//!
//! 1. **Session token**: an HS256 JWT issued by the provider, sent as `Authorization: Bearer` or
//!    in the session cookie (see [`session`])
//! 2. **Proxy headers**: `x-portal-user-email` / `x-portal-user-name`, set by an authenticating
//!    reverse proxy (only enable behind a proxy that strips them from client traffic)
//!
//! The identity's email is resolved against the user store. First sign-in creates a client
//! account, or an admin account for emails listed in `admin_emails`. Soft-deleted accounts are
//! refused.
//!
//! # Authorization
//!
//! `isAdmin` is the only role signal. Handlers take [`current_user::RequiresAdmin`] for admin-only
//! routes and check ownership with [`crate::api::models::users::CurrentUser::can_access`] elsewhere.

pub mod current_user;
pub mod session;

pub use current_user::RequiresAdmin;

//! HTTP API: request handlers and the JSON models they exchange.

pub mod handlers;
pub mod models;

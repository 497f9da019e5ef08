//! HMAC-SHA256 verification of gateway webhook signatures.
//!
//! The `stripe-signature` header has the form `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`.
//! Each `v1` value is a hex HMAC-SHA256 over `{t}.{raw body}` keyed with the endpoint's signing
//! secret. Several `v1` entries appear while a secret is being rolled; any one matching is enough.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("no v1 signature matches the payload")]
    Mismatch,
    #[error("signature timestamp is outside the tolerance window")]
    Expired,
}

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value.parse().map_err(|_| SignatureError::Malformed)?),
            Some(("v1", value)) => signatures.push(value),
            // v0 test signatures and future schemes are not checked
            Some(_) => {}
            None => return Err(SignatureError::Malformed),
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(ParsedHeader { timestamp, signatures }),
        _ => Err(SignatureError::Malformed),
    }
}

fn compute_signature(timestamp: i64, payload: &[u8], secret: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Build a signature header for `payload` as the gateway would
pub fn sign_payload(timestamp: i64, payload: &[u8], secret: &str) -> String {
    let signature = compute_signature(timestamp, payload, secret).map(hex::encode).unwrap_or_default();
    format!("t={timestamp},v1={signature}")
}

/// Verify `header` against the raw request body.
///
/// `now` is unix seconds; signatures older or newer than `tolerance` are rejected so a captured
/// request cannot be replayed later.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, tolerance: Duration, now: i64) -> Result<(), SignatureError> {
    let parsed = parse_header(header)?;
    let expected = compute_signature(parsed.timestamp, payload, secret).ok_or(SignatureError::Mismatch)?;

    let matched = parsed
        .signatures
        .iter()
        .filter_map(|candidate| hex::decode(candidate).ok())
        .any(|candidate| constant_time_eq(&candidate, &expected));
    if !matched {
        return Err(SignatureError::Mismatch);
    }

    if now.abs_diff(parsed.timestamp) > tolerance.as_secs() {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

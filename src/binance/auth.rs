//! Authentication utilities for the Binance REST API

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::errors::{EngineError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Sign a query string with HMAC-SHA256, hex-encoded.
///
/// Binance expects the signature appended to the query as
/// `&signature=<hex>`; the signed payload is the raw query string including
/// the `timestamp` parameter.
pub fn sign_query(secret: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| EngineError::Authentication(format!("failed to create HMAC: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Append a millisecond timestamp and signature to a query string
pub fn signed_query(secret: &str, query: &str, timestamp_ms: i64) -> Result<String> {
    let query = if query.is_empty() {
        format!("timestamp={}", timestamp_ms)
    } else {
        format!("{}&timestamp={}", query, timestamp_ms)
    };
    let signature = sign_query(secret, &query)?;
    Ok(format!("{}&signature={}", query, signature))
}

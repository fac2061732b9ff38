//! Signature scheme for processor webhooks.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]` where the
//! HMAC-SHA256 is computed over `"<t>." + raw body` with the endpoint secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::ProcessorError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

fn mac_for(secret: &str, timestamp: &str, payload: &[u8]) -> Result<HmacSha256, ProcessorError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ProcessorError::SignatureVerification(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Hex signature for `payload` at `timestamp`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, ProcessorError> {
    let mac = mac_for(secret, &timestamp.to_string(), payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Full header value, as the processor would send it.
pub fn signature_header(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, ProcessorError> {
    Ok(format!(
        "t={},v1={}",
        timestamp,
        sign_payload(secret, timestamp, payload)?
    ))
}

pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: DateTime<Utc>,
) -> Result<(), ProcessorError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ProcessorError::SignatureVerification("Unable to extract timestamp from header".into())
    })?;
    if candidates.is_empty() {
        return Err(ProcessorError::SignatureVerification(
            "No v1 signatures found in header".into(),
        ));
    }

    let signed_at: i64 = timestamp.parse().map_err(|_| {
        ProcessorError::SignatureVerification("Timestamp is not an integer".into())
    })?;
    if (now.timestamp() - signed_at).unsigned_abs() > tolerance_secs {
        return Err(ProcessorError::SignatureVerification(
            "Timestamp outside the tolerance zone".into(),
        ));
    }

    let base = mac_for(secret, timestamp, payload)?;
    // verify_slice compares in constant time
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| base.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(ProcessorError::SignatureVerification(
            "No signatures found matching the expected signature for payload".into(),
        ))
    }
}

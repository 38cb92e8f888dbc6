//! Verification of processor webhook signatures.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`. Each `v1` entry is an
//! HMAC-SHA256 of `"<t>.<raw body>"` keyed with the endpoint's signing secret. More than one `v1` entry is sent while a
//! secret is being rolled, and a match on any of them is accepted.
use std::time::Duration;

use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("No signature was provided")]
    MissingSignature,
    #[error("The signature header is malformed. {0}")]
    MalformedHeader(String),
    #[error("No signing secret is configured for this endpoint")]
    NoSecret,
    #[error("The signature timestamp is outside the tolerance window")]
    TimestampOutOfTolerance,
    #[error("The signature does not match the payload")]
    Mismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                return Err(SignatureError::MalformedHeader(format!("'{part}' is not a key=value pair")));
            };
            match key {
                "t" => {
                    let t = value
                        .parse::<i64>()
                        .map_err(|e| SignatureError::MalformedHeader(format!("Invalid timestamp. {e}")))?;
                    timestamp = Some(t);
                },
                "v1" => {
                    let sig =
                        hex::decode(value).map_err(|e| SignatureError::MalformedHeader(format!("Invalid hex. {e}")))?;
                    signatures.push(sig);
                },
                // Other schemes (e.g. v0) are ignored
                _ => {},
            }
        }
        let timestamp = timestamp.ok_or_else(|| SignatureError::MalformedHeader("Missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(SignatureError::MalformedHeader("No v1 signatures".into()));
        }
        Ok(Self { timestamp, signatures })
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::NoSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Checks the signature header against the raw payload at the time `now` (unix seconds).
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::NoSecret);
    }
    let header = SignatureHeader::parse(header)?;
    let age = now.saturating_sub(header.timestamp).unsigned_abs();
    if age > tolerance.as_secs() {
        debug!("🪝️ Signature timestamp {} is {age}s away from now", header.timestamp);
        return Err(SignatureError::TimestampOutOfTolerance);
    }
    let mac = mac_for(secret, header.timestamp, payload)?;
    // verify_slice compares in constant time
    let matched = header.signatures.iter().any(|sig| mac.clone().verify_slice(sig).is_ok());
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produces a valid signature header for `payload`. The processor does this on its side; the engine only needs it for
/// tests and tooling.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let sig = match mac_for(secret, timestamp, payload) {
        Ok(mac) => hex::encode(mac.finalize().into_bytes()),
        Err(_) => String::default(),
    };
    format!("t={timestamp},v1={sig}")
}

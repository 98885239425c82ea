//! Relay access tokens
//!
//! A token proves knowledge of the relay's access password without sending
//! it. It carries a millisecond timestamp and an HMAC-SHA256 over
//! `"{password}:{ts}"` keyed by the password, base64-encoded as JSON.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock skew accepted when verifying a token
pub const TOKEN_TTL_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub sign: String,
    pub ts: i64,
}

/// Hex HMAC-SHA256 of `"{key}:{timestamp}"` keyed by `key`
pub fn generate_signature(key: &str, timestamp: i64) -> String {
    // HMAC accepts keys of any length, so this never bails out.
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return String::new();
    };
    mac.update(format!("{}:{}", key, timestamp).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Current UTC time in milliseconds, truncated to whole seconds
pub fn utc_timestamp() -> i64 {
    chrono::Utc::now().timestamp() * 1000
}

/// Build a token for `password` at the current time
pub fn encode_token(password: &str) -> String {
    encode_token_at(password, utc_timestamp())
}

pub fn encode_token_at(password: &str, ts: i64) -> String {
    let payload = TokenPayload {
        sign: generate_signature(password, ts),
        ts,
    };
    // Serializing two plain fields cannot fail.
    let json = serde_json::to_string(&payload).unwrap_or_default();
    BASE64_STANDARD.encode(json)
}

pub fn decode_token(token: &str) -> Option<TokenPayload> {
    let bytes = BASE64_STANDARD.decode(token.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Check a token against the password at time `now` (ms)
///
/// An empty password accepts every token.
pub fn verify_token(password: &str, token: &str, now: i64) -> bool {
    if password.is_empty() {
        return true;
    }
    let Some(payload) = decode_token(token) else {
        return false;
    };
    if (now - payload.ts).abs() > TOKEN_TTL_MS {
        return false;
    }
    payload.sign == generate_signature(password, payload.ts)
}

//! HMAC-SHA256 request signing shared by the agent and the server.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded signature of the body.
pub const HASH_HEADER: &str = "HashSHA256";

fn mac(key: &str, body: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac
}

/// Signs `body` with `key`, returning lower-case hex.
///
/// # Examples
///
/// ```
/// use pulsemon_common::hash::{sign, verify};
///
/// let sig = sign("secret", b"payload");
/// assert_eq!(sig.len(), 64);
/// assert!(verify("secret", b"payload", &sig));
/// assert!(!verify("other", b"payload", &sig));
/// ```
pub fn sign(key: &str, body: &[u8]) -> String {
    hex::encode(mac(key, body).finalize().into_bytes())
}

/// Recomputes the signature of `body` and compares it with `signature`
/// in constant time. Malformed hex never verifies.
pub fn verify(key: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac(key, body).verify_slice(&expected).is_ok()
}

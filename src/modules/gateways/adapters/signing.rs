//! Digest and MAC primitives shared by the gateway adapters.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

pub fn sha256_hex(message: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message);
    hex::encode(hasher.finalize())
}

pub fn sha512_hex(message: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(message);
    hex::encode(hasher.finalize())
}

/// Compare two signature strings without leaking the mismatch position.
pub fn constant_time_eq(expected: &str, provided: &str) -> bool {
    // ct_eq requires equal lengths; a length mismatch is already a reject
    if expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

//! `X-Hub-Signature-256` verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Checks a GitHub signature header against the HMAC-SHA256 of `payload`.
///
/// Returns `false` for a missing header, a header without the `sha256=`
/// prefix, non-hex digests and mismatches. The digest comparison is
/// constant-time.
pub fn verify_signature(secret: &str, payload: &[u8], signature: Option<&str>) -> bool {
    let Some(digest) = signature.and_then(|s| s.strip_prefix(SIGNATURE_PREFIX)) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    match hex::decode(digest) {
        Ok(expected) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

/// Produces the header value GitHub would send for `payload`.
#[cfg(test)]
pub(crate) fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key");
    mac.update(payload);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

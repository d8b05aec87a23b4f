//! HMAC signing used by expiring blob URLs and payment webhook verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, StoreError};

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over `message` and return it hex-encoded (64 characters).
///
/// # Errors
///
/// Returns `StoreError::Signing` if the MAC cannot be keyed with `secret`.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| StoreError::Signing(e.to_string()))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signature of a blob URL: HMAC over `<key>:<expires>`.
///
/// # Errors
///
/// Returns `StoreError::Signing` if the MAC cannot be keyed with `secret`.
pub fn sign_expiring(secret: &[u8], key: &str, expires: i64) -> Result<String> {
    hmac_sha256_hex(secret, format!("{key}:{expires}").as_bytes())
}

/// Check a hex signature against the expected MAC of `message`.
///
/// Returns `false` for malformed signatures as well as mismatches.
#[must_use]
pub fn verify_hex(secret: &[u8], message: &[u8], signature: &str) -> bool {
    hmac_sha256_hex(secret, message)
        .map(|expected| constant_time_eq(&expected, &signature.to_ascii_lowercase()))
        .unwrap_or(false)
}

/// Constant-time string comparison.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hex_sha256() {
        let sig = sign_expiring(b"secret", "tickets/TIK-1.pdf", 1_700_000_000).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_binds_key_and_expiry() {
        let base = sign_expiring(b"secret", "a.pdf", 100).unwrap();
        assert_eq!(base, sign_expiring(b"secret", "a.pdf", 100).unwrap());
        assert_ne!(base, sign_expiring(b"secret", "b.pdf", 100).unwrap());
        assert_ne!(base, sign_expiring(b"secret", "a.pdf", 101).unwrap());
        assert_ne!(base, sign_expiring(b"other", "a.pdf", 100).unwrap());
    }

    #[test]
    fn verify_accepts_uppercase_hex() {
        let sig = hmac_sha256_hex(b"whsec", b"{\"booking_id\":\"x\"}").unwrap();
        assert!(verify_hex(b"whsec", b"{\"booking_id\":\"x\"}", &sig.to_uppercase()));
        assert!(!verify_hex(b"whsec", b"{\"booking_id\":\"y\"}", &sig));
        assert!(!verify_hex(b"whsec", b"{}", "zz"));
    }

    #[test]
    fn constant_time_eq_compares_contents() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }
}

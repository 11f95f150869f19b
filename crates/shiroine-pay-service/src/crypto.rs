//! Signature helpers for Tripay requests and callbacks.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return the lowercase hex digest.
///
/// # Panics
///
/// Never in practice: HMAC-SHA256 accepts keys of any size per RFC 2104.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: impl AsRef<[u8]>) -> String {
    // INVARIANT: `new_from_slice` only fails for fixed-size-key MACs.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_ref());
    hex::encode(mac.finalize().into_bytes())
}

/// Signature Tripay expects on transaction creation.
///
/// `HMAC-SHA256(private_key, merchant_code + merchant_ref + amount)`.
#[must_use]
pub fn tripay_request_signature(
    private_key: &str,
    merchant_code: &str,
    merchant_ref: &str,
    amount: i64,
) -> String {
    hmac_sha256_hex(private_key, format!("{merchant_code}{merchant_ref}{amount}"))
}

/// Check a callback signature against the raw body.
#[must_use]
pub fn verify_body_signature(private_key: &str, body: &[u8], signature: &str) -> bool {
    constant_time_eq(&hmac_sha256_hex(private_key, body), signature.trim())
}

/// Constant-time string comparison.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        assert_eq!(
            hmac_sha256_hex("Jefe", "what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn request_signature_concatenates_fields() {
        assert_eq!(
            tripay_request_signature("pk", "T0001", "PREMIUM-1-abc", 15000),
            hmac_sha256_hex("pk", "T0001PREMIUM-1-abc15000")
        );
    }

    #[test]
    fn body_signature_verification() {
        let body = br#"{"reference":"T1","status":"PAID"}"#;
        let signature = hmac_sha256_hex("pk", body);
        assert!(verify_body_signature("pk", body, &signature));
        assert!(!verify_body_signature("other", body, &signature));
        assert!(!verify_body_signature("pk", b"{}", &signature));
        assert!(!verify_body_signature("pk", body, ""));
    }

    #[test]
    fn constant_time_eq_cases() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "ABC"));
    }
}

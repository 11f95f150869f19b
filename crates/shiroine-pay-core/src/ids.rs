//! Identifier generation for merchant references and order ids.
//!
//! Providers echo back either their own reference or ours, so every id we mint
//! has to be unique per purchase attempt on its own.

use chrono::{DateTime, Utc};
use ulid::Ulid;

/// Length of the random suffix on premium merchant references.
const MERCHANT_REF_SUFFIX_LEN: usize = 7;

/// Generate a merchant reference of the form `PREMIUM-<unix millis>-<suffix>`.
///
/// The suffix is taken from the random half of a ULID, lower-cased, so it only
/// contains ASCII digits and lowercase letters.
#[must_use]
pub fn premium_merchant_ref(now: DateTime<Utc>) -> String {
    let random = Ulid::new().to_string().to_lowercase();
    let suffix = &random[random.len() - MERCHANT_REF_SUFFIX_LEN..];
    format!("PREMIUM-{}-{suffix}", now.timestamp_millis())
}

/// Generate an invoice order id of the form `INV-<yyyymmdd>-<6 digits>`.
#[must_use]
pub fn invoice_order_id(now: DateTime<Utc>) -> String {
    let sequence = now.timestamp_subsec_nanos() % 1_000_000;
    format!("INV-{}-{sequence:06}", now.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn merchant_ref_shape() {
        let now = Utc.with_ymd_and_hms(2025, 1, 12, 9, 0, 0).unwrap();
        let reference = premium_merchant_ref(now);

        let parts: Vec<&str> = reference.splitn(3, '-').collect();
        assert_eq!(parts[0], "PREMIUM");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 7);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn merchant_refs_differ() {
        let now = Utc::now();
        assert_ne!(premium_merchant_ref(now), premium_merchant_ref(now));
    }

    #[test]
    fn invoice_order_id_shape() {
        let now = Utc
            .with_ymd_and_hms(2024, 9, 10, 8, 7, 2)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        assert_eq!(invoice_order_id(now), "INV-20240910-456789");
    }
}

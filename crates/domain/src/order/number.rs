use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Builds an externally visible order number: `ORD-<yyyyMMddHHmmss>-<n>`
/// with `n` in `0..10000`.
///
/// The suffix is random, so numbers minted in the same second can collide;
/// the repository's uniqueness check catches that and the caller draws again.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().as_u128() % 10_000;
    format!("ORD-{}-{suffix}", now.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn follows_the_published_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let number = generate_order_number(at);

        let (prefix, suffix) = number.rsplit_once('-').unwrap();
        assert_eq!(prefix, "ORD-20240309140507");
        let suffix: u32 = suffix.parse().unwrap();
        assert!(suffix < 10_000);
    }
}

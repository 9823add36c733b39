use rand::Rng;

use crate::prelude::*;

/// Referral and redemption codes avoid look-alike characters (0/O, 1/I).
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn now() -> DateTime {
  Utc::now().naive_utc()
}

/// VIP is perpetual once granted; expiry is pinned to 2100-01-01.
pub fn vip_forever() -> DateTime {
  chrono::DateTime::<Utc>::UNIX_EPOCH.naive_utc()
    + TimeDelta::seconds(4_102_444_800)
}

/// Merchant correlation number: `PREFIX_<unix millis>_<4 random digits>`.
/// Collisions are unlikely but not prevented.
pub fn trade_no(prefix: &str) -> String {
  let millis = Utc::now().timestamp_millis();
  let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
  format!("{prefix}_{millis}_{suffix:04}")
}

pub fn random_code(len: usize) -> String {
  let mut rng = rand::thread_rng();
  (0..len)
    .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
    .collect()
}

pub fn random_digits(len: usize) -> String {
  let mut rng = rand::thread_rng();
  (0..len).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}

/// Trimmed, non-empty string or `None`.
pub fn non_empty(value: Option<&str>) -> Option<String> {
  value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_vip_forever_is_year_2100() {
    assert_eq!(vip_forever().format("%Y-%m-%d").to_string(), "2100-01-01");
  }

  #[test]
  fn test_trade_no_shape() {
    let no = trade_no("PT");
    let parts: Vec<&str> = no.split('_').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "PT");
    assert!(parts[1].parse::<i64>().is_ok());
    assert_eq!(parts[2].len(), 4);
    assert!(no.len() <= 32);
  }

  #[test]
  fn test_random_code_uses_alphabet() {
    let code = random_code(6);
    assert_eq!(code.len(), 6);
    assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    assert!(!code.contains(['0', 'O', '1', 'I']));
  }

  #[test]
  fn test_non_empty() {
    assert_eq!(non_empty(Some("  ABC ")), Some("ABC".into()));
    assert_eq!(non_empty(Some("   ")), None);
    assert_eq!(non_empty(None), None);
  }
}

//! Secret sharing (C4): Shamir's scheme over GF(2^8), M-of-N.
//!
//! Each share carries the polynomial's evaluation point (`index`), the
//! threshold it was cut with (`threshold`), and the scheme's output payload
//! (the 32-byte secret with a 4-byte integrity checksum appended). The
//! checksum is what lets [`combine`] fail deterministically and without
//! exposing a wrong-but-plausible secret when fewer than the threshold
//! number of shares are presented, per spec section 4.4: "does not require
//! knowledge of M at combine time beyond the implicit 'enough'" — `combine`
//! reads the threshold back out of the shares themselves rather than taking
//! it as a parameter.

use serde::{Deserialize, Serialize};

use crate::collaborators::RandomSource;
use crate::crypto;
use crate::error::SharingError;

/// Length of the secret this scheme splits (spec section 4.4: "exactly 32
/// bytes").
pub const SECRET_LEN: usize = 32;
/// Length of the appended integrity checksum.
const CHECKSUM_LEN: usize = 4;
/// Length of the per-share payload (secret + checksum).
const PAYLOAD_LEN: usize = SECRET_LEN + CHECKSUM_LEN;

/// One output share of [`split`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
  pub index: u8,
  pub threshold: u8,
  pub payload: Vec<u8>,
}

impl Share {
  /// Serializes to the raw bytes stored on disk: `[threshold][payload]`.
  /// The index is not included — it lives in the share store's filename
  /// (`.c_<index>`), per spec section 4.3.
  pub fn to_bytes(&self) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + self.payload.len());
    out.push(self.threshold);
    out.extend_from_slice(&self.payload);
    out
  }

  /// Reconstructs a `Share` from its on-disk bytes plus the index implied
  /// by the share store filename.
  pub fn from_bytes(index: u8, bytes: &[u8]) -> Result<Share, SharingError> {
    if bytes.len() != 1 + PAYLOAD_LEN {
      return Err(SharingError::BadParams(format!(
        "share has {} bytes, expected {}",
        bytes.len(),
        1 + PAYLOAD_LEN
      )));
    }
    Ok(Share {
      index,
      threshold: bytes[0],
      payload: bytes[1..].to_vec(),
    })
  }
}

/// Splits `secret` into `n` shares such that any `m` reconstruct it and
/// fewer reveal nothing. `2 <= m <= n <= 255`.
pub fn split(secret: &[u8; SECRET_LEN], m: u8, n: u8, rng: &dyn RandomSource) -> Result<Vec<Share>, SharingError> {
  if m < 2 {
    return Err(SharingError::BadParams("m must be at least 2".into()));
  }
  if n < m {
    return Err(SharingError::BadParams("n must be >= m".into()));
  }
  // x = 0 is reserved for the secret itself; evaluation points run 1..=n.
  if n == 0 {
    return Err(SharingError::BadParams("n must be >= 1".into()));
  }

  let checksum = crypto::hash(secret);
  let mut payload = [0u8; PAYLOAD_LEN];
  payload[..SECRET_LEN].copy_from_slice(secret);
  payload[SECRET_LEN..].copy_from_slice(&checksum[..CHECKSUM_LEN]);

  // One random polynomial of degree m-1 per payload byte; coefficient 0
  // is the payload byte itself, coefficients 1..m-1 are random.
  let mut polys: Vec<Vec<u8>> = Vec::with_capacity(PAYLOAD_LEN);
  for &byte in payload.iter() {
    let mut poly = vec![0u8; m as usize];
    poly[0] = byte;
    for c in poly.iter_mut().skip(1) {
      *c = random_byte(rng);
    }
    polys.push(poly);
  }

  let mut shares = Vec::with_capacity(n as usize);
  for index in 1..=n {
    let x = index;
    let bytes: Vec<u8> = polys.iter().map(|poly| gf_eval(poly, x)).collect();
    shares.push(Share {
      index,
      threshold: m,
      payload: bytes,
    });
  }
  Ok(shares)
}

/// Reconstructs the original 32-byte secret from `shares`. Requires at
/// least the threshold number of shares (read from the shares' own
/// `threshold` field) with distinct indices.
pub fn combine(shares: &[Share]) -> Result<[u8; SECRET_LEN], SharingError> {
  let mut by_index: std::collections::BTreeMap<u8, &Share> = std::collections::BTreeMap::new();
  for share in shares {
    by_index.entry(share.index).or_insert(share);
  }
  let deduped: Vec<&Share> = by_index.into_values().collect();

  if deduped.is_empty() {
    return Err(SharingError::InsufficientShares);
  }
  let threshold = deduped[0].threshold;
  if deduped.iter().any(|s| s.threshold != threshold) {
    // Shares from different splits (or tampered headers) presented
    // together; can't be a single consistent set.
    return Err(SharingError::InconsistentShares);
  }
  if deduped.len() < threshold as usize {
    return Err(SharingError::InsufficientShares);
  }

  let primary: Vec<&Share> = deduped.iter().copied().take(threshold as usize).collect();
  let payload_a = interpolate_at_zero(&primary)?;

  if deduped.len() > threshold as usize {
    let alt: Vec<&Share> = deduped
      .iter()
      .copied()
      .rev()
      .take(threshold as usize)
      .collect();
    let payload_b = interpolate_at_zero(&alt)?;
    if payload_a != payload_b {
      return Err(SharingError::InconsistentShares);
    }
  }

  let secret_bytes = &payload_a[..SECRET_LEN];
  let checksum = crypto::hash(secret_bytes);
  if checksum[..CHECKSUM_LEN] != payload_a[SECRET_LEN..] {
    return Err(SharingError::InconsistentShares);
  }

  let mut out = [0u8; SECRET_LEN];
  out.copy_from_slice(secret_bytes);
  Ok(out)
}

fn interpolate_at_zero(points: &[&Share]) -> Result<Vec<u8>, SharingError> {
  let payload_len = points[0].payload.len();
  if points.iter().any(|s| s.payload.len() != payload_len) {
    return Err(SharingError::InconsistentShares);
  }
  let mut out = vec![0u8; payload_len];
  for (byte_pos, slot) in out.iter_mut().enumerate() {
    let xy: Vec<(u8, u8)> = points
      .iter()
      .map(|s| (s.index, s.payload[byte_pos]))
      .collect();
    *slot = lagrange_at_zero(&xy);
  }
  Ok(out)
}

fn random_byte(rng: &dyn RandomSource) -> u8 {
  let mut b = [0u8; 1];
  rng.fill(&mut b);
  b[0]
}

/// Evaluates the polynomial (coefficients low-to-high) at `x` over GF(2^8).
fn gf_eval(poly: &[u8], x: u8) -> u8 {
  // Horner's method: ((c_{m-1} * x + c_{m-2}) * x + ...) * x + c_0.
  let mut acc = 0u8;
  for &c in poly.iter().rev() {
    acc = gf_mul(acc, x) ^ c;
  }
  acc
}

/// Lagrange interpolation evaluated at x=0: recovers the polynomial's
/// constant term (the shared secret byte) from `points`.
fn lagrange_at_zero(points: &[(u8, u8)]) -> u8 {
  let mut result = 0u8;
  for (i, &(xi, yi)) in points.iter().enumerate() {
    let mut numerator = 1u8;
    let mut denominator = 1u8;
    for (j, &(xj, _)) in points.iter().enumerate() {
      if i == j {
        continue;
      }
      // basis_i(0) = prod_{j != i} (0 - xj) / (xi - xj); subtraction is
      // XOR in GF(2^8), so (0 - xj) == xj.
      numerator = gf_mul(numerator, xj);
      denominator = gf_mul(denominator, xi ^ xj);
    }
    let term = gf_mul(yi, gf_div(numerator, denominator));
    result ^= term;
  }
  result
}

/// Multiplies two elements of GF(2^8) modulo the AES reducing polynomial
/// x^8 + x^4 + x^3 + x + 1 (0x11b).
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
  let mut p: u8 = 0;
  for _ in 0..8 {
    if b & 1 != 0 {
      p ^= a;
    }
    let hi_bit_set = a & 0x80 != 0;
    a <<= 1;
    if hi_bit_set {
      a ^= 0x1b;
    }
    b >>= 1;
  }
  p
}

fn gf_pow(a: u8, mut e: u8) -> u8 {
  let mut base = a;
  let mut result: u8 = 1;
  while e > 0 {
    if e & 1 != 0 {
      result = gf_mul(result, base);
    }
    base = gf_mul(base, base);
    e >>= 1;
  }
  result
}

/// Multiplicative inverse via Fermat: for nonzero `a` in GF(2^8), `a^254 ==
/// a^-1` since the multiplicative group has order 255.
fn gf_inv(a: u8) -> u8 {
  debug_assert!(a != 0, "zero has no multiplicative inverse in GF(2^8)");
  gf_pow(a, 254)
}

fn gf_div(a: u8, b: u8) -> u8 {
  gf_mul(a, gf_inv(b))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::collaborators::SystemRandom;

  fn secret(byte: u8) -> [u8; SECRET_LEN] {
    [byte; SECRET_LEN]
  }

  #[test]
  fn gf_mul_identity_and_zero() {
    assert_eq!(gf_mul(5, 1), 5);
    assert_eq!(gf_mul(5, 0), 0);
  }

  #[test]
  fn gf_inv_round_trip() {
    for a in 1..=255u8 {
      assert_eq!(gf_mul(a, gf_inv(a)), 1, "a={a}");
    }
  }

  #[test]
  fn split_combine_round_trip_full_set() {
    let s = secret(0x42);
    let shares = split(&s, 10, 20, &SystemRandom).expect("split");
    assert_eq!(shares.len(), 20);
    let recovered = combine(&shares).expect("combine");
    assert_eq!(recovered, s);
  }

  #[test]
  fn split_combine_round_trip_exact_threshold_subsets() {
    let s = secret(0x7a);
    let shares = split(&s, 10, 20, &SystemRandom).expect("split");
    // Several distinct 10-subsets should all reconstruct the secret.
    let subset_a: Vec<Share> = shares[0..10].to_vec();
    let subset_b: Vec<Share> = shares[5..15].to_vec();
    let subset_c: Vec<Share> = shares[10..20].to_vec();
    assert_eq!(combine(&subset_a).expect("combine a"), s);
    assert_eq!(combine(&subset_b).expect("combine b"), s);
    assert_eq!(combine(&subset_c).expect("combine c"), s);
  }

  #[test]
  fn combine_with_fewer_than_threshold_fails_deterministically() {
    let s = secret(0x99);
    let shares = split(&s, 10, 20, &SystemRandom).expect("split");
    let subset: Vec<Share> = shares[0..9].to_vec();
    let err = combine(&subset).unwrap_err();
    assert_eq!(err, SharingError::InsufficientShares);
  }

  #[test]
  fn combine_detects_tampered_share() {
    let s = secret(0x11);
    let mut shares = split(&s, 10, 20, &SystemRandom).expect("split");
    shares[3].payload[0] ^= 0xff;
    let subset: Vec<Share> = shares[0..10].to_vec();
    let err = combine(&subset).unwrap_err();
    assert_eq!(err, SharingError::InconsistentShares);
  }

  #[test]
  fn split_rejects_bad_params() {
    let s = secret(0x00);
    assert!(split(&s, 1, 5, &SystemRandom).is_err());
    assert!(split(&s, 10, 5, &SystemRandom).is_err());
  }

  #[test]
  fn share_byte_round_trip() {
    let s = secret(0x55);
    let shares = split(&s, 10, 20, &SystemRandom).expect("split");
    let raw = shares[0].to_bytes();
    let restored = Share::from_bytes(shares[0].index, &raw).expect("from_bytes");
    assert_eq!(restored, shares[0]);
  }

  #[test]
  fn distinct_subsets_never_agree_with_too_few_shares() {
    // Property 2: for |S| = M-1, the combine output distribution should
    // show no single candidate preferred (sanity: different (M-1)-subsets
    // independently fail rather than leaking a consistent answer).
    let s = secret(0x37);
    let shares = split(&s, 10, 20, &SystemRandom).expect("split");
    for window in shares.windows(9).take(5) {
      let err = combine(window).unwrap_err();
      assert_eq!(err, SharingError::InsufficientShares);
    }
  }
}

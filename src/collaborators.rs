//! Trait seams for the collaborators the core consumes but does not own
//! (spec section 6): a clock, a random source, and a drive enumerator. Real
//! implementations back onto the OS; test doubles let the rest of the crate
//! be tested deterministically.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// A source of the current UTC wall-clock time, injected so log-chain and
/// end-to-end tests can run against fixed, reproducible timestamps.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A clock that returns a fixed, manually-advanceable time. Used by tests
/// needing reproducible, strictly-increasing timestamps (spec section 8,
/// property 5: log entries must be monotonic non-decreasing).
pub struct FixedClock {
  current: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      current: std::sync::Mutex::new(start),
    }
  }

  /// Advances the clock by `millis` and returns the new time.
  pub fn advance(&self, millis: i64) -> DateTime<Utc> {
    let mut guard = self.current.lock().expect("clock mutex poisoned");
    *guard += chrono::Duration::milliseconds(millis);
    *guard
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    *self.current.lock().expect("clock mutex poisoned")
  }
}

/// Enumerates mounted removable drives. Real drive enumeration is an
/// OS-level concern out of core scope (spec section 1); this trait is the
/// seam the surrounding application plugs into, and the only
/// implementation shipped here is a test double.
pub trait DriveEnumerator: Send + Sync {
  fn enumerate_drives(&self) -> Vec<PathBuf>;
}

/// A drive enumerator returning a fixed, caller-supplied list of paths.
pub struct StaticDriveEnumerator(pub Vec<PathBuf>);

impl DriveEnumerator for StaticDriveEnumerator {
  fn enumerate_drives(&self) -> Vec<PathBuf> {
    self.0.clone()
  }
}

/// A source of cryptographically strong randomness, per spec section 6.
/// Threaded through every security-critical generation point in `crypto`,
/// `sharing`, and `drive` (master key, signing keypair, AEAD nonces, Shamir
/// coefficients, drive salt) so the engine's caller controls it end to end.
/// [`SystemRandom`] backs it in production; tests may inject [`SeededRandom`]
/// instead for reproducibility of *non-security* tests only (spec section 6,
/// scenario E1).
pub trait RandomSource: Send + Sync {
  fn fill(&self, buf: &mut [u8]);
}

/// The real OS CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
  fn fill(&self, buf: &mut [u8]) {
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(buf);
  }
}

/// A deterministic byte stream for reproducible *non-security* tests (spec
/// section 6: "tests may inject a seeded source for reproducibility of
/// non-security tests only"). Never use this to generate a master key,
/// signing key, or share coefficients in anything but a test.
pub struct SeededRandom {
  state: std::sync::Mutex<u64>,
}

impl SeededRandom {
  pub fn new(seed: u64) -> Self {
    Self {
      state: std::sync::Mutex::new(seed),
    }
  }

  fn next_u64(&self) -> u64 {
    // splitmix64
    let mut s = self.state.lock().expect("rng mutex poisoned");
    *s = s.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *s;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
  }
}

impl RandomSource for SeededRandom {
  fn fill(&self, buf: &mut [u8]) {
    for chunk in buf.chunks_mut(8) {
      let bytes = self.next_u64().to_le_bytes();
      chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
  }
}

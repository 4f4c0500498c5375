//! Stable error taxonomy for the vault core.
//!
//! C1-C6 each surface a narrow, leaf-level error enum describing exactly what
//! went wrong in that component. [`VaultError`] is the single public-facing
//! kind: C7 (the vault engine) is the only place that interprets a leaf error
//! and decides what the caller sees, per the "C7 is the single policy point"
//! rule. No variant here may ever carry secret material (keys, shares, PIN
//! bytes) in its message.

use thiserror::Error;

/// Errors raised by the crypto primitives (C1).
#[derive(Debug, Error)]
pub enum CryptoError {
  #[error("key must be exactly 32 bytes")]
  BadKeyLength,
  #[error("authentication tag did not verify")]
  TagMismatch,
  #[error("argon2 parameters rejected: {0}")]
  BadKdfParams(String),
  #[error("key derivation failed: {0}")]
  Kdf(String),
  #[error("signature did not verify")]
  BadSignature,
  #[error("malformed key or signature bytes: {0}")]
  Encoding(String),
}

/// Errors raised by the host/drive share store (C3).
#[derive(Debug, Error)]
pub enum ShareStoreError {
  #[error("share {0} not present in store")]
  Missing(u8),
  #[error("permission denied accessing share store")]
  PermissionDenied,
  #[error("share {0} is corrupt (empty or unreadable)")]
  Corrupt(u8),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// Errors raised by the secret-sharing layer (C4).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SharingError {
  #[error("fewer than the required threshold of shares were presented")]
  InsufficientShares,
  #[error("presented shares decode to inconsistent polynomials")]
  InconsistentShares,
  #[error("invalid scheme parameters: {0}")]
  BadParams(String),
}

/// Errors raised by the log chain (C5).
#[derive(Debug, Error)]
pub enum LogChainError {
  #[error("log line {0} is malformed: {1}")]
  Malformed(usize, String),
  #[error("chain broken at entry {index}: {reason}")]
  BrokenAt { index: usize, reason: BreakReason },
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("action {0:?} is not a recognized log action")]
  UnknownAction(String),
}

/// Why [`LogChainError::BrokenAt`] (or `verify`'s `BrokenAt` result) fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
  HashMismatch,
  BadSignature,
  NonMonotonicTime,
  Malformed,
}

impl std::fmt::Display for BreakReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      BreakReason::HashMismatch => "hash_mismatch",
      BreakReason::BadSignature => "bad_signature",
      BreakReason::NonMonotonicTime => "non_monotonic_time",
      BreakReason::Malformed => "malformed",
    };
    f.write_str(s)
  }
}

/// Errors raised by drive binding (C6).
#[derive(Debug, Error)]
pub enum DriveError {
  #[error("path does not carry a valid vault layout")]
  NotVault,
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// The stable public error taxonomy for the vault engine (C7), per spec
/// section 7. Error *kinds* are the contract; messages are advisory only.
#[derive(Debug, Error)]
pub enum VaultError {
  #[error("incorrect PIN")]
  BadPin,

  #[error("hardware fingerprint does not match the vault's binding")]
  HardwareMismatch,

  #[error("insufficient shares to reconstruct the secret")]
  InsufficientShares,

  #[error("manifest signature verification failed, vault is quarantined")]
  TamperDetected,

  #[error("audit log chain is corrupt: {0}")]
  CorruptLog(#[source] LogChainError),

  #[error("drive does not carry a valid vault layout")]
  DriveNotVault,

  #[error("vault already initialized at this location")]
  AlreadyInitialized,

  #[error("I/O error: {0}")]
  IOError(#[from] std::io::Error),

  #[error("engine is quarantined after a prior tamper detection")]
  Quarantined,
}

impl From<CryptoError> for VaultError {
  fn from(e: CryptoError) -> Self {
    match e {
      CryptoError::TagMismatch => VaultError::BadPin,
      CryptoError::BadSignature => VaultError::TamperDetected,
      other => VaultError::IOError(std::io::Error::new(std::io::ErrorKind::Other, other.to_string())),
    }
  }
}

impl From<SharingError> for VaultError {
  fn from(e: SharingError) -> Self {
    match e {
      SharingError::InsufficientShares | SharingError::InconsistentShares => {
        VaultError::InsufficientShares
      }
      SharingError::BadParams(msg) => {
        VaultError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidInput, msg))
      }
    }
  }
}

impl From<ShareStoreError> for VaultError {
  fn from(e: ShareStoreError) -> Self {
    match e {
      ShareStoreError::Missing(_) => VaultError::InsufficientShares,
      ShareStoreError::PermissionDenied => VaultError::IOError(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        e.to_string(),
      )),
      ShareStoreError::Corrupt(_) => VaultError::InsufficientShares,
      ShareStoreError::Io(io) => VaultError::IOError(io),
    }
  }
}

impl From<DriveError> for VaultError {
  fn from(e: DriveError) -> Self {
    match e {
      DriveError::NotVault => VaultError::DriveNotVault,
      DriveError::Io(io) => VaultError::IOError(io),
    }
  }
}

impl From<LogChainError> for VaultError {
  fn from(e: LogChainError) -> Self {
    match e {
      LogChainError::Io(io) => VaultError::IOError(io),
      other => VaultError::CorruptLog(other),
    }
  }
}

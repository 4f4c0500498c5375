//! Log chain (C5): append-only, hash-chained, signed audit log.
//!
//! Persisted as line-delimited JSON at `<drive>/.ursafe/logchain.json`, one
//! entry per line, never rewritten. Each entry's hash covers its own
//! `{timestamp, action, prev_hash}` triple (canonical, sorted-key,
//! whitespace-free JSON) so the chain can be replayed and verified without
//! any state beyond the file itself.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::Clock;
use crate::crypto;
use crate::error::{BreakReason, LogChainError};

pub const LOGCHAIN_FILENAME: &str = "logchain.json";
pub const GENESIS_PREV_HASH: &str = "genesis";

/// The enumerated, stable set of actions a log entry may record (spec
/// section 4.5). Being a Rust enum makes "unknown actions are rejected at
/// append time" a property of the type system rather than a runtime check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
  VaultCreated,
  VaultUnlocked,
  VaultLocked,
  SecretAdded,
  SecretUpdated,
  SecretRemoved,
  IntegrityFailure,
  FingerprintMismatch,
}

impl LogAction {
  fn as_str(self) -> &'static str {
    match self {
      LogAction::VaultCreated => "vault_created",
      LogAction::VaultUnlocked => "vault_unlocked",
      LogAction::VaultLocked => "vault_locked",
      LogAction::SecretAdded => "secret_added",
      LogAction::SecretUpdated => "secret_updated",
      LogAction::SecretRemoved => "secret_removed",
      LogAction::IntegrityFailure => "integrity_failure",
      LogAction::FingerprintMismatch => "fingerprint_mismatch",
    }
  }
}

/// One entry in the chain, matching the JSON schema of spec section 6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
  pub action: LogAction,
  pub current_hash: String,
  pub prev_hash: String,
  pub signature: String,
  pub timestamp: DateTime<Utc>,
}

/// Outcome of [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
  Valid,
  BrokenAt { index: usize, reason: BreakReason },
}

fn canonical_prehash_bytes(timestamp: &DateTime<Utc>, action: LogAction, prev_hash: &str) -> Vec<u8> {
  let mut map = BTreeMap::new();
  map.insert("timestamp", timestamp.to_rfc3339_opts(SecondsFormat::Millis, true));
  map.insert("action", action.as_str().to_string());
  map.insert("prev_hash", prev_hash.to_string());
  serde_json::to_vec(&map).expect("canonical map serialization cannot fail")
}

fn log_path(drive_root: &Path) -> std::path::PathBuf {
  drive_root.join(".ursafe").join(LOGCHAIN_FILENAME)
}

fn last_line(path: &Path) -> Result<Option<String>, LogChainError> {
  let file = match File::open(path) {
    Ok(f) => f,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(LogChainError::Io(e)),
  };
  let reader = BufReader::new(file);
  let mut last = None;
  for line in reader.lines() {
    let line = line?;
    if !line.trim().is_empty() {
      last = Some(line);
    }
  }
  Ok(last)
}

/// Appends a new entry for `action`, signed under `signing_key` (the
/// vault's 32-byte Ed25519 seed). Reads the previous entry's hash (or
/// `"genesis"` for an empty file), builds and signs the canonical
/// pre-hash bytes, and fsyncs the file before returning.
pub fn append(
  drive_root: &Path,
  action: LogAction,
  signing_key: &[u8; 32],
  clock: &dyn Clock,
) -> Result<LogEntry, LogChainError> {
  let path = log_path(drive_root);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }

  let prev_hash = match last_line(&path)? {
    Some(line) => {
      let prev: LogEntry = serde_json::from_str(&line)
        .map_err(|e| LogChainError::Malformed(0, e.to_string()))?;
      prev.current_hash
    }
    None => GENESIS_PREV_HASH.to_string(),
  };

  let timestamp = clock.now();
  let prehash_bytes = canonical_prehash_bytes(&timestamp, action, &prev_hash);
  let current_hash = hex::encode(crypto::hash(&prehash_bytes));
  let signature = hex::encode(crypto::sign(signing_key, &prehash_bytes));

  let entry = LogEntry {
    timestamp,
    action,
    prev_hash,
    current_hash,
    signature,
  };

  let line = serde_json::to_string(&entry).expect("log entry serialization cannot fail");
  let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
  writeln!(file, "{line}")?;
  file.sync_all()?;

  Ok(entry)
}

/// Reads and parses every line of the chain on `drive_root`. A malformed
/// line aborts with [`LogChainError::Malformed`] naming the offending
/// (1-indexed) line number.
pub fn chain(drive_root: &Path) -> Result<Vec<LogEntry>, LogChainError> {
  let path = log_path(drive_root);
  let file = match File::open(&path) {
    Ok(f) => f,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(LogChainError::Io(e)),
  };
  let reader = BufReader::new(file);
  let mut entries = Vec::new();
  for (i, line) in reader.lines().enumerate() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    let entry: LogEntry = serde_json::from_str(&line)
      .map_err(|e| LogChainError::Malformed(i + 1, e.to_string()))?;
    entries.push(entry);
  }
  Ok(entries)
}

/// Verifies hash linkage, signatures, and timestamp monotonicity across the
/// whole chain. The first failure found returns `BrokenAt` with a reason
/// from spec section 4.5's stable set; later problems are not reported in
/// the same pass (per "First failure returns BrokenAt").
pub fn verify(drive_root: &Path, public_key: &[u8; 32]) -> Result<ChainVerification, LogChainError> {
  let entries = chain(drive_root)?;
  if entries.is_empty() {
    return Ok(ChainVerification::Valid);
  }

  let mut previous_timestamp: Option<DateTime<Utc>> = None;
  let mut expected_prev_hash = GENESIS_PREV_HASH.to_string();

  for (i, entry) in entries.iter().enumerate() {
    if entry.prev_hash != expected_prev_hash {
      return Ok(ChainVerification::BrokenAt {
        index: i,
        reason: BreakReason::HashMismatch,
      });
    }

    let prehash_bytes = canonical_prehash_bytes(&entry.timestamp, entry.action, &entry.prev_hash);
    let recomputed = hex::encode(crypto::hash(&prehash_bytes));
    if recomputed != entry.current_hash {
      return Ok(ChainVerification::BrokenAt {
        index: i,
        reason: BreakReason::HashMismatch,
      });
    }

    let Ok(sig_bytes) = hex::decode(&entry.signature) else {
      return Ok(ChainVerification::BrokenAt {
        index: i,
        reason: BreakReason::Malformed,
      });
    };
    let Ok(sig_array): Result<[u8; 64], _> = sig_bytes.try_into() else {
      return Ok(ChainVerification::BrokenAt {
        index: i,
        reason: BreakReason::Malformed,
      });
    };
    if !crypto::verify(public_key, &sig_array, &prehash_bytes) {
      return Ok(ChainVerification::BrokenAt {
        index: i,
        reason: BreakReason::BadSignature,
      });
    }

    if let Some(prev_ts) = previous_timestamp {
      if entry.timestamp < prev_ts {
        return Ok(ChainVerification::BrokenAt {
          index: i,
          reason: BreakReason::NonMonotonicTime,
        });
      }
    }
    previous_timestamp = Some(entry.timestamp);
    expected_prev_hash = entry.current_hash.clone();
  }

  Ok(ChainVerification::Valid)
}

//! Data model for the vault core (spec section 3): the plaintext
//! `SecretsMap`, the on-disk `Metadata`/`VaultFile`/`Manifest` shapes, and
//! the `Config` that lifts every implicit global (host chunk directory, KDF
//! defaults, the M/N/H/D split) into an explicit, constructor-time value.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::KdfParams;
use crate::share_store;

/// One entry of the plaintext secrets map. A tagged variant over record
/// kinds plus an opaque fallback, per DESIGN NOTES section 9: "Represent it
/// as a mapping from string name to a tagged variant over record kinds
/// ... with a fallback opaque-bytes variant for forward compatibility."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretRecord {
  Password {
    password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
  },
  Note {
    body: String,
  },
  KeyValue {
    fields: BTreeMap<String, String>,
  },
  Opaque {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime: Option<String>,
    #[serde(with = "hex_bytes")]
    bytes: Vec<u8>,
  },
}

/// `BTreeMap`, not `HashMap`: the map is serialized and AEAD-encrypted on
/// every save, and diffed to produce `secret_added`/`secret_updated`/
/// `secret_removed` log entries. A `HashMap`'s nondeterministic iteration
/// order would make that diff and the encrypted plaintext nondeterministic
/// for no benefit.
pub type SecretsMap = BTreeMap<String, SecretRecord>;

mod hex_bytes {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(d)?;
    hex::decode(&s).map_err(serde::de::Error::custom)
  }
}

/// Diffs `old` against `new`, returning the log actions a save should
/// append (spec section 4.7 `save`: "append a diff-derived sequence of
/// secret_added/secret_updated/secret_removed entries"). Order is:
/// removals, then additions, then updates, each in key order.
pub fn diff_secrets(old: &SecretsMap, new: &SecretsMap) -> Vec<crate::log_chain::LogAction> {
  use crate::log_chain::LogAction;
  let mut actions = Vec::new();
  for key in old.keys() {
    if !new.contains_key(key) {
      actions.push(LogAction::SecretRemoved);
    }
  }
  for (key, value) in new {
    match old.get(key) {
      None => actions.push(LogAction::SecretAdded),
      Some(old_value) if old_value != value => actions.push(LogAction::SecretUpdated),
      Some(_) => {}
    }
  }
  actions
}

/// Non-secret but integrity-critical parameters authenticated alongside the
/// vault (spec section 3). Encrypted under the same derived key as the
/// `VaultFile` but with an independent nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
  /// Stable per-drive salt (spec section 4.6), combined with the
  /// fingerprint as KDF input.
  #[serde(with = "hex_bytes")]
  pub drive_salt: Vec<u8>,
  /// `SHA-256(fingerprint)[..16]`, checked at unlock to detect hardware
  /// drift before wasting a share-reconstruction attempt.
  #[serde(with = "hex_bytes")]
  pub fingerprint_check: Vec<u8>,
  /// KDF parameters this vault was derived with. Authoritative on read —
  /// resolves the Argon2-parameter ambiguity in spec section 9 per-vault
  /// rather than globally.
  pub kdf_params: KdfParams,
  /// The long-term Ed25519 public key; reconstructed shares verify
  /// against it and the manifest is checked against it at every unlock.
  #[serde(with = "hex_bytes")]
  pub signing_public_key: Vec<u8>,
  /// Indices of the master-key shares present in the drive's `chunks/`
  /// directory. Stored explicitly rather than assumed to be a contiguous
  /// tail (spec section 9 open question).
  pub drive_share_indices: Vec<u8>,
  /// Indices of the signing-key shares present on the drive, stored the
  /// same way and for the same reason.
  pub drive_sig_share_indices: Vec<u8>,
  /// The log-chain head hash (or `"genesis"`) the manifest was last signed
  /// against. Pinned at init and at every `save`; unaffected by the
  /// `vault_unlocked`/`vault_locked` entries appended between saves, so
  /// the manifest's "committed to log-chain head hash" binding (spec
  /// section 3) stays checkable without re-signing on every append.
  pub manifest_log_head: String,
}

/// Authenticated ciphertext over the plaintext `SecretsMap` (spec section
/// 3). On-disk layout: `[12-byte nonce][16-byte tag][ciphertext]`.
#[derive(Debug, Clone)]
pub struct VaultFile {
  pub ciphertext: Vec<u8>,
  pub nonce: [u8; crate::crypto::NONCE_LEN],
  pub tag: [u8; crate::crypto::TAG_LEN],
}

impl VaultFile {
  pub fn to_bytes(&self) -> Vec<u8> {
    let mut out = Vec::with_capacity(self.nonce.len() + self.tag.len() + self.ciphertext.len());
    out.extend_from_slice(&self.nonce);
    out.extend_from_slice(&self.tag);
    out.extend_from_slice(&self.ciphertext);
    out
  }

  pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
    let min = crate::crypto::NONCE_LEN + crate::crypto::TAG_LEN;
    if bytes.len() < min {
      return None;
    }
    let mut nonce = [0u8; crate::crypto::NONCE_LEN];
    nonce.copy_from_slice(&bytes[..crate::crypto::NONCE_LEN]);
    let mut tag = [0u8; crate::crypto::TAG_LEN];
    tag.copy_from_slice(&bytes[crate::crypto::NONCE_LEN..min]);
    let ciphertext = bytes[min..].to_vec();
    Some(Self { ciphertext, nonce, tag })
  }
}

/// On-disk layout for `metadata.enc`:
/// `[16-byte salt][12-byte nonce][16-byte tag][ciphertext]`. The leading
/// salt is unencrypted so a candidate working key can be derived before the
/// metadata itself is decrypted (spec section 4.7 `unlock` step 2).
#[derive(Debug, Clone)]
pub struct MetadataFile {
  pub drive_salt: [u8; crate::drive::DRIVE_SALT_LEN],
  pub vault_file: VaultFile,
}

impl MetadataFile {
  pub fn to_bytes(&self) -> Vec<u8> {
    let mut out = Vec::with_capacity(self.drive_salt.len() + self.vault_file.to_bytes().len());
    out.extend_from_slice(&self.drive_salt);
    out.extend_from_slice(&self.vault_file.to_bytes());
    out
  }

  pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
    if bytes.len() < crate::drive::DRIVE_SALT_LEN {
      return None;
    }
    let mut drive_salt = [0u8; crate::drive::DRIVE_SALT_LEN];
    drive_salt.copy_from_slice(&bytes[..crate::drive::DRIVE_SALT_LEN]);
    let vault_file = VaultFile::from_bytes(&bytes[crate::drive::DRIVE_SALT_LEN..])?;
    Some(Self { drive_salt, vault_file })
  }
}

/// Detached Ed25519 signature over `vault.enc ‖ metadata.enc ‖
/// log-chain-head-hash` (spec section 3). 64 raw bytes on disk.
#[derive(Debug, Clone, Copy)]
pub struct Manifest(pub [u8; crate::crypto::SIGNATURE_LEN]);

impl Manifest {
  pub fn signing_message(vault_ct: &[u8], metadata_ct: &[u8], log_head: &str) -> Vec<u8> {
    let mut msg = Vec::with_capacity(vault_ct.len() + metadata_ct.len() + log_head.len());
    msg.extend_from_slice(vault_ct);
    msg.extend_from_slice(metadata_ct);
    msg.extend_from_slice(log_head.as_bytes());
    msg
  }
}

/// The M-of-N sharing split, lifted from an implicit global to an explicit,
/// constructor-time value (DESIGN NOTES section 9). Invariant enforced by
/// [`ShareSplit::validate`]: `h + d == n` and `h, d >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSplit {
  pub m: u8,
  pub n: u8,
  pub h: u8,
  pub d: u8,
}

impl Default for ShareSplit {
  fn default() -> Self {
    Self { m: 10, n: 20, h: 15, d: 5 }
  }
}

impl ShareSplit {
  pub fn validate(self) -> Result<(), String> {
    if self.m < 2 || self.n < self.m {
      return Err(format!("invalid (m, n) = ({}, {})", self.m, self.n));
    }
    if self.h == 0 || self.d == 0 {
      return Err("h and d must both be >= 1".into());
    }
    if self.h + self.d != self.n {
      return Err(format!("h ({}) + d ({}) must equal n ({})", self.h, self.d, self.n));
    }
    Ok(())
  }
}

/// Every implicit global the vault engine (C7) needs, gathered into one
/// constructor-time value (DESIGN NOTES section 9: "lift to an explicit
/// configuration value passed to the vault engine at construction").
#[derive(Debug, Clone)]
pub struct Config {
  pub host_chunk_dir: PathBuf,
  pub kdf_params: KdfParams,
  pub share_split: ShareSplit,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      host_chunk_dir: share_store::default_host_chunk_dir(),
      kdf_params: KdfParams::default(),
      share_split: ShareSplit::default(),
    }
  }
}

impl Config {
  pub fn validate(&self) -> Result<(), String> {
    self.share_split.validate()
  }
}

/// A PIN wrapper that zeroizes its backing bytes on drop, so a caller's
/// `unlock(drive, pin)` argument doesn't linger in memory past key
/// derivation (spec section 5: "The PIN ... is not retained past Wk
/// derivation").
#[derive(Clone)]
pub struct Pin(String);

impl Pin {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn as_bytes(&self) -> &[u8] {
    self.0.as_bytes()
  }
}

impl Zeroize for Pin {
  fn zeroize(&mut self) {
    self.0.zeroize();
  }
}

impl Drop for Pin {
  fn drop(&mut self) {
    self.zeroize();
  }
}

impl std::fmt::Debug for Pin {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("Pin(<redacted>)")
  }
}

//! Vault engine (C7): orchestrates `initialize`/`unlock`/`save`/`lock` over
//! C1-C6, per spec section 4.7. This is the crate's sole public entry point
//! and its sole policy point — every leaf error from C1-C6 is translated
//! here into the stable [`VaultError`] taxonomy, and every decision about
//! what to log or whether to quarantine is made here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use zeroize::{Zeroize, Zeroizing};

use crate::collaborators::{Clock, RandomSource};
use crate::crypto::{self, KdfParams};
use crate::drive;
use crate::error::{CryptoError, LogChainError, VaultError};
use crate::fingerprint::HostFingerprint;
use crate::log_chain::{self, ChainVerification, LogAction};
use crate::models::{Config, Manifest, Metadata, MetadataFile, Pin, SecretsMap, VaultFile};
use crate::sharing::{self, Share};

/// The legacy Argon2 parameter set the source also documented (spec
/// section 9 open question): the same 64 MiB memory cost as the default,
/// but `time_cost = 2` rather than `3`. Tried as a fallback when the
/// default parameters fail to open a vault's metadata, so vaults
/// initialized under either documented interpretation stay unlockable.
fn legacy_kdf_params() -> KdfParams {
  KdfParams {
    time_cost: 2,
    memory_cost_kib: 65536,
    parallelism: 1,
    output_len: crypto::KEY_LEN,
  }
}

/// In-memory state held only while the vault is unlocked. Dropped (and its
/// `Zeroizing` fields wiped) on `lock()` or when the engine itself is
/// dropped — spec section 3: "zeroized in all working buffers on lock, on
/// unlock failure, and on process exit."
struct Session {
  signing_key: Zeroizing<[u8; crypto::KEY_LEN]>,
  signing_public_key: [u8; 32],
  metadata: Metadata,
}

/// Coarse state for [`VaultEngine::vault_status`]. `Locked` covers both the
/// source spec's "Initialized" (never unlocked this process) and "Locked"
/// (unlocked then relocked) states: both mean a valid vault sits on disk and
/// the engine holds no session, which is all an outside caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultState {
  Absent,
  Locked,
  Unlocked,
  Quarantined,
}

/// The vault engine: bound to one drive path for its lifetime, serializing
/// its own operations (spec section 5).
pub struct VaultEngine {
  config: Config,
  drive_path: PathBuf,
  clock: Box<dyn Clock>,
  fingerprinter: Box<dyn HostFingerprint>,
  rng: Box<dyn RandomSource>,
  quarantined: bool,
  session: Option<Session>,
}

fn host_k_store(config: &Config) -> PathBuf {
  config.host_chunk_dir.clone()
}

fn host_sig_store(config: &Config) -> PathBuf {
  config.host_chunk_dir.join("sig")
}

fn drive_k_store(drive_path: &Path) -> PathBuf {
  drive::chunks_dir(drive_path)
}

fn drive_sig_store(drive_path: &Path) -> PathBuf {
  drive::chunks_dir(drive_path).join("sig")
}

impl VaultEngine {
  pub fn new(
    config: Config,
    drive_path: impl Into<PathBuf>,
    clock: Box<dyn Clock>,
    fingerprinter: Box<dyn HostFingerprint>,
    rng: Box<dyn RandomSource>,
  ) -> Self {
    Self {
      config,
      drive_path: drive_path.into(),
      clock,
      fingerprinter,
      rng,
      quarantined: false,
      session: None,
    }
  }

  pub fn drive_path(&self) -> &Path {
    &self.drive_path
  }

  /// Coarse external state, per the `Absent -> Initialized -> Unlocked <->
  /// Locked` state machine of spec section 4.7, with the terminal
  /// `Quarantined` state of the same section.
  pub fn state(&self) -> VaultState {
    if self.quarantined {
      VaultState::Quarantined
    } else if self.session.is_some() {
      VaultState::Unlocked
    } else if drive::is_vault_drive(&self.drive_path) {
      VaultState::Locked
    } else {
      VaultState::Absent
    }
  }

  /// Spec section 4.7 `initialize`.
  pub fn initialize(&mut self, pin: &Pin) -> Result<(), VaultError> {
    if self.quarantined {
      return Err(VaultError::Quarantined);
    }
    if drive::is_vault_drive(&self.drive_path) {
      return Err(VaultError::AlreadyInitialized);
    }
    self.config
      .validate()
      .map_err(|e| VaultError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

    let host_k = host_k_store(&self.config);
    let host_sig = host_sig_store(&self.config);
    let drive_k = drive_k_store(&self.drive_path);
    let drive_sig = drive_sig_store(&self.drive_path);
    crate::share_store::clean_tmp_files(&host_k)?;
    crate::share_store::clean_tmp_files(&host_sig)?;
    crate::share_store::clean_tmp_files(&drive_k)?;
    crate::share_store::clean_tmp_files(&drive_sig)?;

    let master_key = Zeroizing::new(crypto::generate_master_key(self.rng.as_ref()));
    let (signing_key, signing_public_key) = crypto::generate_signing_keypair(self.rng.as_ref());
    let signing_key = Zeroizing::new(signing_key);

    let fp = self.fingerprinter.fingerprint();
    log::debug!("initializing vault, fingerprint stability={:.2}", fp.stability_score);
    if fp.stability_score < 1.0 {
      log::warn!(
        "hardware fingerprint only partially determined (stability={:.2}); unlock on this host binds to a weaker fingerprint",
        fp.stability_score
      );
    }
    let drive_salt = drive::generate_drive_salt(self.rng.as_ref());

    let split = self.config.share_split;
    let k_shares = sharing::split(&master_key, split.m, split.n, self.rng.as_ref())?;
    let sig_shares = sharing::split(&signing_key, split.m, split.n, self.rng.as_ref())?;

    let (host_k_shares, drive_k_shares) = k_shares.split_at(split.h as usize);
    let (host_sig_shares, drive_sig_shares) = sig_shares.split_at(split.h as usize);

    for share in host_k_shares {
      crate::share_store::put(&host_k, share.index, &share.to_bytes())?;
    }
    for share in host_sig_shares {
      crate::share_store::put(&host_sig, share.index, &share.to_bytes())?;
    }
    for share in drive_k_shares {
      crate::share_store::put(&drive_k, share.index, &share.to_bytes())?;
    }
    for share in drive_sig_shares {
      crate::share_store::put(&drive_sig, share.index, &share.to_bytes())?;
    }

    let kdf_params = self.config.kdf_params;
    let wk = derive_working_key(pin, &drive_salt, kdf_params)?;

    let empty_map = SecretsMap::new();
    let plaintext = serde_json::to_vec(&empty_map).expect("serializing an empty secrets map cannot fail");
    let sealed = crypto::aead_encrypt(&plaintext, &wk, self.rng.as_ref())?;
    let vault_file = VaultFile {
      ciphertext: sealed.ciphertext,
      nonce: sealed.nonce,
      tag: sealed.tag,
    };

    let fingerprint_check = crypto::hash(&fp.digest)[..16].to_vec();
    let metadata = Metadata {
      drive_salt: drive_salt.to_vec(),
      fingerprint_check,
      kdf_params,
      signing_public_key: signing_public_key.to_vec(),
      drive_share_indices: drive_k_shares.iter().map(|s| s.index).collect(),
      drive_sig_share_indices: drive_sig_shares.iter().map(|s| s.index).collect(),
      manifest_log_head: log_chain::GENESIS_PREV_HASH.to_string(),
    };
    let metadata_json = serde_json::to_vec(&metadata).expect("serializing metadata cannot fail");
    let metadata_sealed = crypto::aead_encrypt(&metadata_json, &wk, self.rng.as_ref())?;
    let metadata_file = MetadataFile {
      drive_salt,
      vault_file: VaultFile {
        ciphertext: metadata_sealed.ciphertext,
        nonce: metadata_sealed.nonce,
        tag: metadata_sealed.tag,
      },
    };

    let ursafe_root = drive::ursafe_root(&self.drive_path);
    fs::create_dir_all(&ursafe_root)?;

    let manifest_msg = Manifest::signing_message(
      &vault_file.ciphertext,
      &metadata_file.vault_file.ciphertext,
      log_chain::GENESIS_PREV_HASH,
    );
    let signature = crypto::sign(&signing_key, &manifest_msg);

    atomic_write(&drive::vault_path(&self.drive_path), &vault_file.to_bytes())?;
    atomic_write(&drive::metadata_path(&self.drive_path), &metadata_file.to_bytes())?;
    atomic_write(&drive::manifest_path(&self.drive_path), &signature)?;

    log_chain::append(&self.drive_path, LogAction::VaultCreated, &signing_key, self.clock.as_ref())?;

    log::debug!("vault initialized at {:?}", self.drive_path);
    Ok(())
  }

  /// Spec section 4.7 `unlock`.
  pub fn unlock(&mut self, pin: &Pin) -> Result<SecretsMap, VaultError> {
    if self.quarantined {
      return Err(VaultError::Quarantined);
    }
    drive::verify_vault_drive(&self.drive_path)?;

    let host_k = host_k_store(&self.config);
    let host_sig = host_sig_store(&self.config);
    let drive_k = drive_k_store(&self.drive_path);
    let drive_sig = drive_sig_store(&self.drive_path);
    crate::share_store::clean_tmp_files(&host_k)?;
    crate::share_store::clean_tmp_files(&host_sig)?;
    crate::share_store::clean_tmp_files(&drive_k)?;
    crate::share_store::clean_tmp_files(&drive_sig)?;

    let metadata_bytes = fs::read(drive::metadata_path(&self.drive_path))?;
    let metadata_file = MetadataFile::from_bytes(&metadata_bytes).ok_or_else(|| {
      VaultError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidData, "metadata.enc is truncated"))
    })?;

    let fp = self.fingerprinter.fingerprint();

    let mut opened: Option<(Zeroizing<[u8; crypto::KEY_LEN]>, Metadata)> = None;
    for params in [self.config.kdf_params, legacy_kdf_params()] {
      let candidate = derive_working_key(pin, &metadata_file.drive_salt, params)?;
      match crypto::aead_decrypt(
        &metadata_file.vault_file.ciphertext,
        &metadata_file.vault_file.nonce,
        &metadata_file.vault_file.tag,
        &candidate,
      ) {
        Ok(plaintext) => {
          let metadata: Metadata = serde_json::from_slice(&plaintext).map_err(|_| {
            VaultError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidData, "metadata plaintext is not valid JSON"))
          })?;
          opened = Some((Zeroizing::new(candidate), metadata));
          break;
        }
        Err(CryptoError::TagMismatch) => continue,
        Err(e) => return Err(e.into()),
      }
    }
    let (wk, metadata) = opened.ok_or(VaultError::BadPin)?;

    let signing_public_key: [u8; 32] = metadata.signing_public_key.clone().try_into().map_err(|_| {
      VaultError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad public key length"))
    })?;

    let expected_check = crypto::hash(&fp.digest)[..16].to_vec();
    if expected_check != metadata.fingerprint_check {
      if let Some(signing_key) = self.try_reconstruct_signing_key(&host_sig, &drive_sig) {
        let _ = log_chain::append(&self.drive_path, LogAction::FingerprintMismatch, &signing_key, self.clock.as_ref());
      }
      log::warn!("fingerprint mismatch during unlock");
      return Err(VaultError::HardwareMismatch);
    }

    let mut master_key = self.reconstruct_key(&host_k, &drive_k)?;
    let signing_key = self
      .try_reconstruct_signing_key(&host_sig, &drive_sig)
      .ok_or(VaultError::InsufficientShares)?;
    let signing_key = Zeroizing::new(signing_key);

    let vault_bytes = fs::read(drive::vault_path(&self.drive_path))?;
    let vault_file = VaultFile::from_bytes(&vault_bytes)
      .ok_or_else(|| VaultError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidData, "vault.enc is truncated")))?;

    let manifest_bytes = fs::read(drive::manifest_path(&self.drive_path))?;
    let manifest_msg = Manifest::signing_message(&vault_file.ciphertext, &metadata_file.vault_file.ciphertext, &metadata.manifest_log_head);
    let manifest_ok = manifest_bytes.len() == crypto::SIGNATURE_LEN && {
      let mut sig = [0u8; crypto::SIGNATURE_LEN];
      sig.copy_from_slice(&manifest_bytes);
      crypto::verify(&signing_public_key, &sig, &manifest_msg)
    };
    if !manifest_ok {
      let _ = log_chain::append(&self.drive_path, LogAction::IntegrityFailure, &signing_key, self.clock.as_ref());
      self.quarantined = true;
      log::warn!("manifest signature verification failed, quarantining engine");
      return Err(VaultError::TamperDetected);
    }

    match log_chain::verify(&self.drive_path, &signing_public_key)? {
      ChainVerification::Valid => {}
      ChainVerification::BrokenAt { index, reason } => {
        self.quarantined = true;
        log::warn!("log chain broken at entry {index}: {reason}");
        return Err(VaultError::CorruptLog(LogChainError::BrokenAt { index, reason }));
      }
    }

    let plaintext = crypto::aead_decrypt(&vault_file.ciphertext, &vault_file.nonce, &vault_file.tag, &wk)?;
    let secrets: SecretsMap = serde_json::from_slice(&plaintext)
      .map_err(|_| VaultError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidData, "vault plaintext is not valid JSON")))?;

    log_chain::append(&self.drive_path, LogAction::VaultUnlocked, &signing_key, self.clock.as_ref())?;
    // Reconstructed only to prove quorum was met; the working key already
    // decrypted the vault, so the master key itself is wiped rather than
    // retained in the session (DESIGN.md open question 4).
    master_key.zeroize();

    self.session = Some(Session {
      signing_key,
      signing_public_key,
      metadata,
    });
    log::debug!("vault unlocked at {:?}", self.drive_path);
    Ok(secrets)
  }

  /// Spec section 4.7 `save`: re-derives `Wk`, re-encrypts both the vault
  /// and metadata with fresh nonces, appends diff-derived log entries, and
  /// rewrites `vault.enc`/`metadata.enc`/`manifest.sig` atomically.
  /// Requires the engine to currently hold an unlocked session.
  pub fn save(&mut self, pin: &Pin, old_map: &SecretsMap, new_map: &SecretsMap) -> Result<(), VaultError> {
    if self.quarantined {
      return Err(VaultError::Quarantined);
    }
    let Some(session) = self.session.as_ref() else {
      return Err(VaultError::IOError(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        "save called without an unlocked session",
      )));
    };

    let drive_salt: [u8; drive::DRIVE_SALT_LEN] = session
      .metadata
      .drive_salt
      .clone()
      .try_into()
      .map_err(|_| VaultError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad drive salt length")))?;
    let mut wk = derive_working_key(pin, &drive_salt, session.metadata.kdf_params)?;

    let plaintext = serde_json::to_vec(new_map).expect("serializing a secrets map cannot fail");
    let sealed = crypto::aead_encrypt(&plaintext, &wk, self.rng.as_ref())?;
    let vault_file = VaultFile {
      ciphertext: sealed.ciphertext,
      nonce: sealed.nonce,
      tag: sealed.tag,
    };

    let actions = crate::models::diff_secrets(old_map, new_map);
    for action in &actions {
      log_chain::append(&self.drive_path, *action, &session.signing_key, self.clock.as_ref())?;
    }
    let head = match log_chain::chain(&self.drive_path)?.last() {
      Some(entry) => entry.current_hash.clone(),
      None => log_chain::GENESIS_PREV_HASH.to_string(),
    };

    let mut updated_metadata = session.metadata.clone();
    updated_metadata.manifest_log_head = head.clone();
    let metadata_json = serde_json::to_vec(&updated_metadata).expect("serializing metadata cannot fail");
    let metadata_sealed = crypto::aead_encrypt(&metadata_json, &wk, self.rng.as_ref())?;
    let metadata_file = MetadataFile {
      drive_salt,
      vault_file: VaultFile {
        ciphertext: metadata_sealed.ciphertext,
        nonce: metadata_sealed.nonce,
        tag: metadata_sealed.tag,
      },
    };
    wk.zeroize();

    let manifest_msg = Manifest::signing_message(&vault_file.ciphertext, &metadata_file.vault_file.ciphertext, &head);
    let signature = crypto::sign(&session.signing_key, &manifest_msg);

    atomic_write(&drive::vault_path(&self.drive_path), &vault_file.to_bytes())?;
    atomic_write(&drive::metadata_path(&self.drive_path), &metadata_file.to_bytes())?;
    atomic_write(&drive::manifest_path(&self.drive_path), &signature)?;

    if let Some(session) = self.session.as_mut() {
      session.metadata = updated_metadata;
    }
    log::debug!("vault saved at {:?} ({} log entries appended)", self.drive_path, actions.len());
    Ok(())
  }

  /// Spec section 4.7 `lock`: zeroizes in-memory `K`/`sk`/`Wk` (by dropping
  /// the session) and appends `vault_locked`.
  pub fn lock(&mut self) -> Result<(), VaultError> {
    if let Some(session) = self.session.take() {
      log_chain::append(&self.drive_path, LogAction::VaultLocked, &session.signing_key, self.clock.as_ref())?;
      log::debug!("vault locked at {:?}", self.drive_path);
    }
    Ok(())
  }

  fn reconstruct_key(&self, host_store: &Path, drive_store: &Path) -> Result<[u8; crypto::KEY_LEN], VaultError> {
    let shares = gather_shares(host_store, drive_store)?;
    Ok(sharing::combine(&shares)?)
  }

  fn try_reconstruct_signing_key(&self, host_store: &Path, drive_store: &Path) -> Option<[u8; crypto::KEY_LEN]> {
    let shares = gather_shares(host_store, drive_store).ok()?;
    sharing::combine(&shares).ok()
  }

  /// Status report suitable for a monitoring panel (spec section 6).
  pub fn vault_status(&self) -> VaultStatusReport {
    let fp = self.fingerprinter.fingerprint();
    VaultStatusReport {
      drive_path: self.drive_path.clone(),
      is_vault: drive::is_vault_drive(&self.drive_path),
      state: self.state(),
      fingerprint_stability: fp.stability_score,
    }
  }

  pub fn chunk_status(&self) -> ChunkStatusReport {
    let host_k = crate::share_store::enumerate(&host_k_store(&self.config)).unwrap_or_default();
    let host_sig = crate::share_store::enumerate(&host_sig_store(&self.config)).unwrap_or_default();
    let drive_k = crate::share_store::enumerate(&drive_k_store(&self.drive_path)).unwrap_or_default();
    let drive_sig = crate::share_store::enumerate(&drive_sig_store(&self.drive_path)).unwrap_or_default();
    ChunkStatusReport {
      host_k_indices: host_k.keys().copied().collect(),
      host_sig_indices: host_sig.keys().copied().collect(),
      drive_k_indices: drive_k.keys().copied().collect(),
      drive_sig_indices: drive_sig.keys().copied().collect(),
      host_store_is_shared_across_vaults: true,
    }
  }

  pub fn log_stats(&self) -> LogStatsReport {
    let entries = log_chain::chain(&self.drive_path).unwrap_or_default();
    let chain_valid = self
      .session
      .as_ref()
      .map(|s| matches!(log_chain::verify(&self.drive_path, &s.signing_public_key), Ok(ChainVerification::Valid)));
    LogStatsReport {
      entry_count: entries.len(),
      last_action: entries.last().map(|e| format!("{:?}", e.action)),
      chain_valid,
    }
  }
}

fn gather_shares(host_store: &Path, drive_store: &Path) -> Result<Vec<Share>, VaultError> {
  let host_bytes = crate::share_store::enumerate(host_store)?;
  let drive_bytes = crate::share_store::enumerate(drive_store)?;
  let mut shares = Vec::with_capacity(host_bytes.len() + drive_bytes.len());
  for (index, bytes) in host_bytes.into_iter().chain(drive_bytes) {
    if let Ok(share) = Share::from_bytes(index, &bytes) {
      shares.push(share);
    }
  }
  Ok(shares)
}

/// Derives `Wk` from the PIN and drive salt alone (spec section 3: `Wk =
/// KDF(PIN, drive_salt)`). The hardware fingerprint is deliberately not part
/// of this derivation — it is checked as an independent gate against
/// `Metadata.fingerprint_check` after decryption succeeds, so hardware drift
/// produces a distinguishable `HardwareMismatch` rather than folding into the
/// same failure mode as a wrong PIN.
fn derive_working_key(pin: &Pin, drive_salt: &[u8], params: KdfParams) -> Result<[u8; crypto::KEY_LEN], VaultError> {
  Ok(crypto::derive_key(pin.as_bytes(), drive_salt, params)?)
}

/// Write-temp-then-rename, per spec section 4.3/4.7. Rename order is
/// vault.enc, then metadata.enc, then manifest.sig last, so a crash
/// mid-sequence always leaves either the fully-prior state (nothing renamed
/// yet) or a mismatched triple that `unlock` deterministically rejects as
/// `TamperDetected` rather than silently accepting (spec section 8, property
/// 7).
fn atomic_write(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
  let tmp = target.with_extension("tmp");
  {
    let mut file = fs::File::create(&tmp)?;
    use std::io::Write;
    file.write_all(bytes)?;
    file.sync_all()?;
  }
  fs::rename(&tmp, target)?;
  if let Some(parent) = target.parent() {
    if let Ok(dir) = fs::File::open(parent) {
      let _ = dir.sync_all();
    }
  }
  Ok(())
}

/// A read-only status report suitable for a monitoring panel (spec section
/// 6).
#[derive(Debug, Clone, Serialize)]
pub struct VaultStatusReport {
  pub drive_path: PathBuf,
  pub is_vault: bool,
  pub state: VaultState,
  pub fingerprint_stability: f32,
}

/// Share-presence report. `host_store_is_shared_across_vaults` is always
/// `true`: flags the documented limitation (spec section 5/9) that the host
/// chunk directory is shared across every vault on the host rather than
/// partitioned per-vault, surfaced here rather than silently changed.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkStatusReport {
  pub host_k_indices: Vec<u8>,
  pub host_sig_indices: Vec<u8>,
  pub drive_k_indices: Vec<u8>,
  pub drive_sig_indices: Vec<u8>,
  pub host_store_is_shared_across_vaults: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStatsReport {
  pub entry_count: usize,
  pub last_action: Option<String>,
  /// `None` when the engine holds no session: there's no verified public
  /// key to check the chain against without one.
  pub chain_valid: Option<bool>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::collaborators::{FixedClock, SeededRandom, SystemRandom};
  use crate::fingerprint::{FixedFingerprinter, HostAttributes};
  use chrono::Utc;
  use tempfile::tempdir;

  fn test_attrs() -> HostAttributes {
    HostAttributes {
      cpu_id: Some("Test CPU".into()),
      mb_serial: Some("SERIAL-1".into()),
      mac_addresses: vec!["aa:bb:cc:dd:ee:ff".into()],
      platform_string: Some("linux-x86_64".into()),
    }
  }

  fn test_engine(drive: &Path, host_chunk_dir: PathBuf) -> VaultEngine {
    let config = Config {
      host_chunk_dir,
      ..Config::default()
    };
    VaultEngine::new(
      config,
      drive.to_path_buf(),
      Box::new(FixedClock::new(Utc::now())),
      Box::new(FixedFingerprinter(test_attrs())),
      Box::new(SystemRandom),
    )
  }

  fn test_engine_with_seed(drive: &Path, host_chunk_dir: PathBuf, seed: u64) -> VaultEngine {
    let config = Config {
      host_chunk_dir,
      ..Config::default()
    };
    VaultEngine::new(
      config,
      drive.to_path_buf(),
      Box::new(FixedClock::new(Utc::now())),
      Box::new(FixedFingerprinter(test_attrs())),
      Box::new(SeededRandom::new(seed)),
    )
  }

  #[test]
  fn init_then_unlock_returns_empty_map() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    let pin = Pin::new("1234");

    engine.initialize(&pin).expect("initialize");
    assert!(drive::vault_path(drive.path()).is_file());
    assert!(drive::metadata_path(drive.path()).is_file());
    assert!(drive::manifest_path(drive.path()).is_file());

    let chain = log_chain::chain(drive.path()).expect("chain");
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].action, LogAction::VaultCreated);
    assert_eq!(chain[0].prev_hash, log_chain::GENESIS_PREV_HASH);

    let drive_shares = crate::share_store::enumerate(&drive_k_store(drive.path())).unwrap();
    assert_eq!(drive_shares.len(), 5);

    let mut engine2 = test_engine(drive.path(), host.path().to_path_buf());
    let secrets = engine2.unlock(&pin).expect("unlock");
    assert!(secrets.is_empty());
  }

  #[test]
  fn wrong_pin_returns_bad_pin_without_new_log_entry() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    engine.initialize(&Pin::new("1234")).expect("initialize");

    let before = log_chain::chain(drive.path()).unwrap().len();
    let mut engine2 = test_engine(drive.path(), host.path().to_path_buf());
    let err = engine2.unlock(&Pin::new("9999")).unwrap_err();
    assert!(matches!(err, VaultError::BadPin));
    let after = log_chain::chain(drive.path()).unwrap().len();
    assert_eq!(before, after);
  }

  #[test]
  fn host_shares_removed_gives_insufficient_shares() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    engine.initialize(&Pin::new("1234")).expect("initialize");

    let host_k = host.path().to_path_buf();
    let mut present: Vec<u8> = crate::share_store::enumerate(&host_k).unwrap().keys().copied().collect();
    present.sort();
    for idx in present.iter().take(11) {
      let _ = fs::remove_file(host_k.join(format!(".c_{idx}")));
    }

    let mut engine2 = test_engine(drive.path(), host.path().to_path_buf());
    let err = engine2.unlock(&Pin::new("1234")).unwrap_err();
    assert!(matches!(err, VaultError::InsufficientShares));
  }

  #[test]
  fn tampered_manifest_is_detected_and_logged() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    engine.initialize(&Pin::new("1234")).expect("initialize");

    let manifest_path = drive::manifest_path(drive.path());
    let mut bytes = fs::read(&manifest_path).unwrap();
    bytes[0] ^= 0xff;
    fs::write(&manifest_path, bytes).unwrap();

    let before_head = log_chain::chain(drive.path()).unwrap().last().unwrap().current_hash.clone();

    let mut engine2 = test_engine(drive.path(), host.path().to_path_buf());
    let err = engine2.unlock(&Pin::new("1234")).unwrap_err();
    assert!(matches!(err, VaultError::TamperDetected));
    assert_eq!(engine2.state(), VaultState::Quarantined);

    let chain = log_chain::chain(drive.path()).unwrap();
    let last = chain.last().unwrap();
    assert_eq!(last.action, LogAction::IntegrityFailure);
    assert_eq!(last.prev_hash, before_head);
  }

  #[test]
  fn save_lock_unlock_round_trip() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let pin = Pin::new("1234");

    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    engine.initialize(&pin).expect("initialize");
    let old_map = engine.unlock(&pin).expect("unlock");

    let mut new_map = old_map.clone();
    new_map.insert(
      "github".into(),
      crate::models::SecretRecord::Password {
        password: "pw1".into(),
        username: None,
        url: None,
      },
    );
    engine.save(&pin, &old_map, &new_map).expect("save");
    engine.lock().expect("lock");

    let mut engine2 = test_engine(drive.path(), host.path().to_path_buf());
    let reloaded = engine2.unlock(&pin).expect("unlock after save");
    assert_eq!(reloaded, new_map);

    let actions: Vec<LogAction> = log_chain::chain(drive.path()).unwrap().iter().map(|e| e.action).collect();
    assert_eq!(
      actions,
      vec![
        LogAction::VaultCreated,
        LogAction::VaultUnlocked,
        LogAction::SecretAdded,
        LogAction::VaultLocked,
        LogAction::VaultUnlocked,
      ]
    );
  }

  #[test]
  fn fingerprint_drift_is_detected_and_logged() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    engine.initialize(&Pin::new("1234")).expect("initialize");

    let config = Config {
      host_chunk_dir: host.path().to_path_buf(),
      ..Config::default()
    };
    let mut drifted_attrs = test_attrs();
    drifted_attrs.mb_serial = Some("DIFFERENT-SERIAL".into());
    let mut engine2 = VaultEngine::new(
      config,
      drive.path().to_path_buf(),
      Box::new(FixedClock::new(Utc::now())),
      Box::new(FixedFingerprinter(drifted_attrs)),
      Box::new(SystemRandom),
    );
    let err = engine2.unlock(&Pin::new("1234")).unwrap_err();
    assert!(matches!(err, VaultError::HardwareMismatch));

    let chain = log_chain::chain(drive.path()).unwrap();
    assert_eq!(chain.last().unwrap().action, LogAction::FingerprintMismatch);
  }

  #[test]
  fn already_initialized_drive_refuses_reinitialize() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    engine.initialize(&Pin::new("1234")).expect("initialize");
    let err = engine.initialize(&Pin::new("1234")).unwrap_err();
    assert!(matches!(err, VaultError::AlreadyInitialized));
  }

  #[test]
  fn unlock_on_non_vault_drive_is_drive_not_vault() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    let err = engine.unlock(&Pin::new("1234")).unwrap_err();
    assert!(matches!(err, VaultError::DriveNotVault));
  }

  #[test]
  fn quarantine_blocks_further_unlock_attempts_in_process() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    engine.initialize(&Pin::new("1234")).expect("initialize");

    let manifest_path = drive::manifest_path(drive.path());
    let mut bytes = fs::read(&manifest_path).unwrap();
    bytes[0] ^= 0xff;
    fs::write(&manifest_path, bytes).unwrap();

    let _ = engine.unlock(&Pin::new("1234"));
    let err = engine.unlock(&Pin::new("1234")).unwrap_err();
    assert!(matches!(err, VaultError::Quarantined));
  }

  #[test]
  fn vault_status_reports_locked_after_init() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    engine.initialize(&Pin::new("1234")).expect("initialize");
    assert_eq!(engine.vault_status().state, VaultState::Locked);
  }

  #[test]
  fn chunk_status_reports_five_drive_indices_by_default() {
    let drive = tempdir().expect("drive");
    let host = tempdir().expect("host");
    let mut engine = test_engine(drive.path(), host.path().to_path_buf());
    engine.initialize(&Pin::new("1234")).expect("initialize");
    let report = engine.chunk_status();
    assert_eq!(report.drive_k_indices.len(), 5);
    assert_eq!(report.host_k_indices.len(), 15);
    assert!(report.host_store_is_shared_across_vaults);
  }

  /// Spec section 8, E1: with the RNG seeded, `initialize` is reproducible
  /// end to end — same master key, same signing key, same drive salt, and
  /// so the same shares land on disk given the same host/drive share split.
  #[test]
  fn seeded_rng_makes_initialize_reproducible() {
    let drive_a = tempdir().expect("drive a");
    let host_a = tempdir().expect("host a");
    let mut engine_a = test_engine_with_seed(drive_a.path(), host_a.path().to_path_buf(), 7);
    engine_a.initialize(&Pin::new("1234")).expect("initialize a");

    let drive_b = tempdir().expect("drive b");
    let host_b = tempdir().expect("host b");
    let mut engine_b = test_engine_with_seed(drive_b.path(), host_b.path().to_path_buf(), 7);
    engine_b.initialize(&Pin::new("1234")).expect("initialize b");

    let shares_a = crate::share_store::enumerate(&drive_k_store(drive_a.path())).unwrap();
    let shares_b = crate::share_store::enumerate(&drive_k_store(drive_b.path())).unwrap();
    assert_eq!(shares_a, shares_b);
  }
}

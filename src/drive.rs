//! Drive binding (C6): identifies a drive and verifies it carries a valid
//! vault layout.
//!
//! `enumerate_drives` itself is delegated to the [`crate::collaborators::DriveEnumerator`]
//! collaborator (out of core scope, per spec section 1); this module covers
//! only what the core can check once it already has a candidate path.

use std::fs;
use std::path::{Path, PathBuf};

use crate::collaborators::RandomSource;
use crate::error::DriveError;

pub const URSAFE_DIR: &str = ".ursafe";
pub const VAULT_FILENAME: &str = "vault.enc";
pub const METADATA_FILENAME: &str = "metadata.enc";
pub const MANIFEST_FILENAME: &str = "manifest.sig";
pub const DRIVE_SALT_LEN: usize = 16;

pub fn ursafe_root(drive_root: &Path) -> PathBuf {
  drive_root.join(URSAFE_DIR)
}

pub fn vault_path(drive_root: &Path) -> PathBuf {
  ursafe_root(drive_root).join(VAULT_FILENAME)
}

pub fn metadata_path(drive_root: &Path) -> PathBuf {
  ursafe_root(drive_root).join(METADATA_FILENAME)
}

pub fn manifest_path(drive_root: &Path) -> PathBuf {
  ursafe_root(drive_root).join(MANIFEST_FILENAME)
}

pub fn chunks_dir(drive_root: &Path) -> PathBuf {
  crate::share_store::drive_chunk_dir(drive_root)
}

/// True iff `drive_root/.ursafe/` exists, contains `vault.enc`,
/// `metadata.enc`, `manifest.sig`, and a non-empty `chunks/` subdirectory.
pub fn is_vault_drive(drive_root: &Path) -> bool {
  let root = ursafe_root(drive_root);
  if !root.is_dir() {
    return false;
  }
  if !vault_path(drive_root).is_file() {
    return false;
  }
  if !metadata_path(drive_root).is_file() {
    return false;
  }
  if !manifest_path(drive_root).is_file() {
    return false;
  }
  let chunks = chunks_dir(drive_root);
  match fs::read_dir(&chunks) {
    Ok(mut entries) => entries.next().is_some(),
    Err(_) => false,
  }
}

/// Verifies `drive_root` carries a valid vault layout, per
/// [`is_vault_drive`], surfacing a typed error instead of a bare bool.
pub fn verify_vault_drive(drive_root: &Path) -> Result<(), DriveError> {
  if is_vault_drive(drive_root) {
    Ok(())
  } else {
    Err(DriveError::NotVault)
  }
}

/// Generates a fresh, cryptographically random 16-byte drive salt. Created
/// once at init and persisted in Metadata; not secret, binds KDF output to
/// this particular drive and prevents rainbow-table reuse across drives.
pub fn generate_drive_salt(rng: &dyn RandomSource) -> [u8; DRIVE_SALT_LEN] {
  let mut salt = [0u8; DRIVE_SALT_LEN];
  rng.fill(&mut salt);
  salt
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn empty_directory_is_not_a_vault_drive() {
    let dir = tempdir().expect("tmp");
    assert!(!is_vault_drive(dir.path()));
  }

  #[test]
  fn directory_with_full_layout_is_a_vault_drive() {
    let dir = tempdir().expect("tmp");
    let root = ursafe_root(dir.path());
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(VAULT_FILENAME), b"x").unwrap();
    fs::write(root.join(METADATA_FILENAME), b"x").unwrap();
    fs::write(root.join(MANIFEST_FILENAME), b"x").unwrap();
    let chunks = chunks_dir(dir.path());
    fs::create_dir_all(&chunks).unwrap();
    fs::write(chunks.join(".c_16"), b"share").unwrap();

    assert!(is_vault_drive(dir.path()));
    assert!(verify_vault_drive(dir.path()).is_ok());
  }

  #[test]
  fn missing_manifest_is_not_a_vault_drive() {
    let dir = tempdir().expect("tmp");
    let root = ursafe_root(dir.path());
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(VAULT_FILENAME), b"x").unwrap();
    fs::write(root.join(METADATA_FILENAME), b"x").unwrap();
    let chunks = chunks_dir(dir.path());
    fs::create_dir_all(&chunks).unwrap();
    fs::write(chunks.join(".c_16"), b"share").unwrap();

    assert!(!is_vault_drive(dir.path()));
  }

  #[test]
  fn empty_chunks_dir_is_not_a_vault_drive() {
    let dir = tempdir().expect("tmp");
    let root = ursafe_root(dir.path());
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(VAULT_FILENAME), b"x").unwrap();
    fs::write(root.join(METADATA_FILENAME), b"x").unwrap();
    fs::write(root.join(MANIFEST_FILENAME), b"x").unwrap();
    fs::create_dir_all(chunks_dir(dir.path())).unwrap();

    assert!(!is_vault_drive(dir.path()));
  }
}

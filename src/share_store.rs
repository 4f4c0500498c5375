//! Share store (C3): reads and writes the host-local and drive-local share
//! files.
//!
//! Each share lives in its own hidden file `.c_<index>` containing the raw
//! share bytes (`Share::to_bytes`), no header beyond what the sharing layer
//! itself puts there. Writes are atomic (write-temp-then-rename); `put`
//! creates parent directories restricted to the current user where the OS
//! supports it.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ShareStoreError;

/// Returns the OS-specific default host share directory, per spec section
/// 4.3. This directory is shared by every vault on the host — see
/// DESIGN.md for why that collision is a documented limitation rather than
/// silently fixed.
pub fn default_host_chunk_dir() -> PathBuf {
  #[cfg(target_os = "windows")]
  {
    let base = std::env::var_os("PROGRAMDATA").unwrap_or_else(|| "C:\\ProgramData".into());
    PathBuf::from(base).join(".ursafe_chunks")
  }
  #[cfg(not(target_os = "windows"))]
  {
    PathBuf::from("/var/lib/.ursafe_chunks")
  }
}

/// Returns the drive-local share directory for a given drive root.
pub fn drive_chunk_dir(drive_root: &Path) -> PathBuf {
  drive_root.join(".ursafe").join("chunks")
}

fn share_path(store: &Path, index: u8) -> PathBuf {
  store.join(format!(".c_{index}"))
}

/// Writes `bytes` for share `index` into `store`, creating the directory
/// tree if needed and replacing any prior contents atomically.
pub fn put(store: &Path, index: u8, bytes: &[u8]) -> Result<(), ShareStoreError> {
  fs::create_dir_all(store)?;
  restrict_to_owner(store)?;

  let target = share_path(store, index);
  let tmp = store.join(format!(".c_{index}.tmp"));
  fs::write(&tmp, bytes)?;
  fs::rename(&tmp, &target)?;
  Ok(())
}

/// Reads the bytes of share `index` from `store`.
pub fn get(store: &Path, index: u8) -> Result<Vec<u8>, ShareStoreError> {
  let path = share_path(store, index);
  let bytes = match fs::read(&path) {
    Ok(b) => b,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ShareStoreError::Missing(index)),
    Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
      return Err(ShareStoreError::PermissionDenied)
    }
    Err(e) => return Err(ShareStoreError::Io(e)),
  };
  if bytes.is_empty() {
    return Err(ShareStoreError::Corrupt(index));
  }
  Ok(bytes)
}

/// Enumerates every share present in `store`, keyed by index.
pub fn enumerate(store: &Path) -> Result<BTreeMap<u8, Vec<u8>>, ShareStoreError> {
  let mut out = BTreeMap::new();
  let entries = match fs::read_dir(store) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
    Err(e) => return Err(ShareStoreError::Io(e)),
  };

  for entry in entries {
    let entry = entry?;
    let name = entry.file_name();
    let Some(name) = name.to_str() else { continue };
    let Some(suffix) = name.strip_prefix(".c_") else { continue };
    if suffix.ends_with(".tmp") {
      continue;
    }
    let Ok(index) = suffix.parse::<u8>() else { continue };
    let bytes = get(store, index)?;
    out.insert(index, bytes);
  }
  Ok(out)
}

/// Removes every share file (and any stray `.tmp` write) from `store`.
pub fn remove_all(store: &Path) -> Result<(), ShareStoreError> {
  let entries = match fs::read_dir(store) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(ShareStoreError::Io(e)),
  };
  for entry in entries {
    let entry = entry?;
    let name = entry.file_name();
    if let Some(name) = name.to_str() {
      if name.starts_with(".c_") {
        fs::remove_file(entry.path())?;
      }
    }
  }
  Ok(())
}

/// Removes stray `.tmp` files left behind by an aborted `put`, per spec
/// section 5 ("A caller aborting mid-operation may leave .tmp files...the
/// engine cleans them at the next successful init/unlock").
pub fn clean_tmp_files(store: &Path) -> Result<(), ShareStoreError> {
  let entries = match fs::read_dir(store) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(ShareStoreError::Io(e)),
  };
  for entry in entries {
    let entry = entry?;
    let name = entry.file_name();
    if let Some(name) = name.to_str() {
      if name.starts_with(".c_") && name.ends_with(".tmp") {
        fs::remove_file(entry.path())?;
      }
    }
  }
  Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(dir: &Path) -> Result<(), ShareStoreError> {
  use std::os::unix::fs::PermissionsExt;
  let perms = fs::Permissions::from_mode(0o700);
  fs::set_permissions(dir, perms)?;
  Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_dir: &Path) -> Result<(), ShareStoreError> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn put_get_round_trip() {
    let dir = tempdir().expect("tmp");
    let store = dir.path().join("chunks");
    put(&store, 1, b"share-one").expect("put");
    let bytes = get(&store, 1).expect("get");
    assert_eq!(bytes, b"share-one");
  }

  #[test]
  fn get_missing_share_errors() {
    let dir = tempdir().expect("tmp");
    let store = dir.path().join("chunks");
    fs::create_dir_all(&store).unwrap();
    let err = get(&store, 42).unwrap_err();
    assert!(matches!(err, ShareStoreError::Missing(42)));
  }

  #[test]
  fn enumerate_returns_all_present_shares() {
    let dir = tempdir().expect("tmp");
    let store = dir.path().join("chunks");
    put(&store, 1, b"a").unwrap();
    put(&store, 2, b"b").unwrap();
    put(&store, 16, b"c").unwrap();
    let all = enumerate(&store).expect("enumerate");
    assert_eq!(all.len(), 3);
    assert_eq!(all[&16], b"c");
  }

  #[test]
  fn remove_all_clears_store() {
    let dir = tempdir().expect("tmp");
    let store = dir.path().join("chunks");
    put(&store, 1, b"a").unwrap();
    put(&store, 2, b"b").unwrap();
    remove_all(&store).expect("remove_all");
    assert!(enumerate(&store).unwrap().is_empty());
  }

  #[test]
  fn clean_tmp_files_removes_stray_tmp() {
    let dir = tempdir().expect("tmp");
    let store = dir.path().join("chunks");
    fs::create_dir_all(&store).unwrap();
    fs::write(store.join(".c_5.tmp"), b"stale").unwrap();
    clean_tmp_files(&store).expect("clean");
    assert!(!store.join(".c_5.tmp").exists());
  }
}

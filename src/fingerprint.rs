//! Hardware fingerprinting (C2).
//!
//! Produces a 32-byte identifier hashed from a canonical serialization of
//! stable host attributes, plus a `stability_score` describing how many of
//! those attributes were actually available. The fingerprinter never fails:
//! a host that exposes nothing still gets a (low-stability) fingerprint, so
//! the vault engine has something to bind against everywhere.

use sha2::{Digest, Sha256};

/// MAC address prefixes (first three octets) that belong to common
/// virtualization NICs rather than physical hardware, and therefore make a
/// poor binding anchor.
const VIRTUAL_MAC_PREFIXES: &[&str] = &[
  "00:05:69", // VMware
  "00:0c:29", // VMware
  "00:1c:14", // VMware
  "00:50:56", // VMware
  "08:00:27", // VirtualBox
  "52:54:00", // QEMU/KVM
  "02:42:",   // Docker (locally administered bridge range)
];

const UNKNOWN: &str = "unknown";

/// The result of a fingerprint computation: the 32-byte digest plus how
/// much of it was backed by real (non-"unknown") host attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
  pub digest: [u8; 32],
  pub stability_score: f32,
}

/// Raw attributes that feed the fingerprint, exposed so implementations can
/// be swapped (real host probing vs. a fixed test double) without touching
/// the hashing/canonicalization logic.
#[derive(Debug, Clone, Default)]
pub struct HostAttributes {
  pub cpu_id: Option<String>,
  pub mb_serial: Option<String>,
  pub mac_addresses: Vec<String>,
  pub platform_string: Option<String>,
}

/// A source of host hardware attributes. [`SystemFingerprinter`] probes the
/// real host; test code should use [`FixedFingerprinter`] instead so tests
/// don't depend on what hardware they happen to run on.
pub trait HostFingerprint {
  fn attributes(&self) -> HostAttributes;

  /// Computes the canonical fingerprint for the current host.
  fn fingerprint(&self) -> Fingerprint {
    compute_fingerprint(&self.attributes())
  }
}

/// Computes the canonical digest and stability score for a fixed set of
/// attributes. Pure function, exposed directly so callers holding
/// previously-collected attributes (e.g. from Metadata at init time) don't
/// need a `HostFingerprint` implementor to re-derive the same digest.
pub fn compute_fingerprint(attrs: &HostAttributes) -> Fingerprint {
  let cpu_id = attrs.cpu_id.clone().unwrap_or_else(|| UNKNOWN.to_string());
  let mb_serial = attrs.mb_serial.clone().unwrap_or_else(|| UNKNOWN.to_string());

  let mut macs: Vec<String> = attrs
    .mac_addresses
    .iter()
    .map(|m| m.to_lowercase())
    .filter(|m| !is_excluded_mac(m))
    .collect();
  macs.sort();
  let macs_joined = if macs.is_empty() {
    UNKNOWN.to_string()
  } else {
    macs.join("\0")
  };

  let platform_string = attrs
    .platform_string
    .clone()
    .unwrap_or_else(|| UNKNOWN.to_string());

  let mut buf = Vec::new();
  buf.extend_from_slice(cpu_id.as_bytes());
  buf.push(0);
  buf.extend_from_slice(mb_serial.as_bytes());
  buf.push(0);
  buf.extend_from_slice(macs_joined.as_bytes());
  buf.push(0);
  buf.extend_from_slice(platform_string.as_bytes());

  let mut hasher = Sha256::new();
  hasher.update(&buf);
  let digest_vec = hasher.finalize();
  let mut digest = [0u8; 32];
  digest.copy_from_slice(&digest_vec);

  let components = [
    attrs.cpu_id.is_some(),
    attrs.mb_serial.is_some(),
    !attrs.mac_addresses.is_empty(),
    attrs.platform_string.is_some(),
  ];
  let present = components.iter().filter(|c| **c).count();
  let stability_score = present as f32 / components.len() as f32;

  Fingerprint {
    digest,
    stability_score,
  }
}

fn is_excluded_mac(mac: &str) -> bool {
  if mac == "00:00:00:00:00:00" {
    return true;
  }
  VIRTUAL_MAC_PREFIXES.iter().any(|p| mac.starts_with(p))
}

/// Probes the actual host for CPU brand, MAC addresses, and platform string.
/// Motherboard serial is read from the DMI sysfs tree on Linux and is
/// otherwise left `unknown` — privileged, platform-specific probing (WMI on
/// Windows, IOKit on macOS) is the kind of thin OS-level wrapper left to the
/// surrounding application, per spec section 1.
pub struct SystemFingerprinter;

impl HostFingerprint for SystemFingerprinter {
  fn attributes(&self) -> HostAttributes {
    let mut system = sysinfo::System::new();
    system.refresh_cpu_all();
    let cpu_id = system
      .cpus()
      .first()
      .map(|cpu| cpu.brand().trim().to_string())
      .filter(|s| !s.is_empty());

    let mb_serial = read_board_serial();

    let mac_addresses = collect_mac_addresses();

    let platform_string = Some(format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH));

    HostAttributes {
      cpu_id,
      mb_serial,
      mac_addresses,
      platform_string,
    }
  }
}

#[cfg(target_os = "linux")]
fn read_board_serial() -> Option<String> {
  std::fs::read_to_string("/sys/class/dmi/id/board_serial")
    .ok()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty() && s != "None")
}

#[cfg(not(target_os = "linux"))]
fn read_board_serial() -> Option<String> {
  None
}

fn collect_mac_addresses() -> Vec<String> {
  match mac_address::MacAddressIterator::new() {
    Ok(iter) => iter.map(|m| m.to_string()).collect(),
    Err(_) => Vec::new(),
  }
}

/// A fingerprinter that always returns the same fixed attributes. Used by
/// tests to simulate hardware drift (spec section 8, E6) without touching
/// the real host.
pub struct FixedFingerprinter(pub HostAttributes);

impl HostFingerprint for FixedFingerprinter {
  fn attributes(&self) -> HostAttributes {
    self.0.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn full_attrs() -> HostAttributes {
    HostAttributes {
      cpu_id: Some("Test CPU".to_string()),
      mb_serial: Some("SERIAL123".to_string()),
      mac_addresses: vec!["AA:BB:CC:DD:EE:FF".to_string()],
      platform_string: Some("linux-x86_64".to_string()),
    }
  }

  #[test]
  fn fingerprint_is_deterministic() {
    let a = compute_fingerprint(&full_attrs());
    let b = compute_fingerprint(&full_attrs());
    assert_eq!(a, b);
  }

  #[test]
  fn fingerprint_changes_with_mb_serial() {
    let mut attrs = full_attrs();
    let a = compute_fingerprint(&attrs);
    attrs.mb_serial = Some("DIFFERENT".to_string());
    let b = compute_fingerprint(&attrs);
    assert_ne!(a.digest, b.digest);
  }

  #[test]
  fn full_attributes_give_stability_one() {
    let fp = compute_fingerprint(&full_attrs());
    assert_eq!(fp.stability_score, 1.0);
  }

  #[test]
  fn empty_attributes_still_produce_a_fingerprint() {
    let fp = compute_fingerprint(&HostAttributes::default());
    assert_eq!(fp.stability_score, 0.0);
    // Deterministic even with everything "unknown".
    let fp2 = compute_fingerprint(&HostAttributes::default());
    assert_eq!(fp, fp2);
  }

  #[test]
  fn mac_sort_order_does_not_affect_fingerprint() {
    let mut a = full_attrs();
    a.mac_addresses = vec!["bb:bb:bb:bb:bb:bb".into(), "aa:aa:aa:aa:aa:aa".into()];
    let mut b = full_attrs();
    b.mac_addresses = vec!["aa:aa:aa:aa:aa:aa".into(), "bb:bb:bb:bb:bb:bb".into()];
    assert_eq!(compute_fingerprint(&a), compute_fingerprint(&b));
  }

  #[test]
  fn virtual_mac_prefixes_are_excluded() {
    let mut with_virtual = full_attrs();
    with_virtual.mac_addresses.push("52:54:00:11:22:33".to_string());
    let without_virtual = full_attrs();
    assert_eq!(
      compute_fingerprint(&with_virtual),
      compute_fingerprint(&without_virtual)
    );
  }

  #[test]
  fn fixed_fingerprinter_is_stable_across_calls() {
    let fp = FixedFingerprinter(full_attrs());
    assert_eq!(fp.fingerprint(), fp.fingerprint());
  }
}

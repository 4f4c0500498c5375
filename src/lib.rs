//! ursafe-core — an offline, multi-factor password vault core.
//!
//! Unlocking requires four independent factors together: a short PIN, a
//! quorum of secret shares held on the host machine, a quorum of secret
//! shares held on the removable drive the vault lives on, and a fingerprint
//! of the host's own hardware. No single compromised factor, and no single
//! stolen artifact (the drive alone, the host alone), is enough to recover
//! a vault's contents.
//!
//! # Modules
//!
//! - [`crypto`] - AEAD, KDF, signing, and hashing primitives (C1)
//! - [`fingerprint`] - hardware fingerprinting (C2)
//! - [`share_store`] - host/drive share file I/O (C3)
//! - [`sharing`] - Shamir's secret sharing over GF(2^8) (C4)
//! - [`log_chain`] - hash-chained, signed audit log (C5)
//! - [`drive`] - drive layout and binding (C6)
//! - [`vault`] - the [`vault::VaultEngine`] orchestrating all of the above (C7)
//! - [`models`] - on-disk and in-memory data shapes, plus [`models::Config`]
//! - [`collaborators`] - trait seams for the clock, RNG, and drive
//!   enumerator the engine consumes but does not own
//! - [`error`] - the stable [`error::VaultError`] taxonomy
//!
//! # Security properties
//!
//! - Argon2id key derivation, AES-256-GCM AEAD, Ed25519 signatures, SHA-256
//!   hashing — see [`crypto`] for parameters.
//! - Secret material (master key, signing key, working key, PIN) is wrapped
//!   in `zeroize::Zeroizing` and wiped on lock, on unlock failure, and on
//!   drop.
//! - A tamper-evident manifest and hash-chained audit log detect any
//!   out-of-band modification of the vault, metadata, or log itself; a
//!   detected tamper quarantines the engine for the rest of the process.
//!
//! This crate is a library only: drive enumeration, a CLI or GUI shell, and
//! process lifecycle (auto-lock timers, rate limiting UI) are left to the
//! application embedding it.

pub mod collaborators;
pub mod crypto;
pub mod drive;
pub mod error;
pub mod fingerprint;
pub mod log_chain;
pub mod models;
pub mod share_store;
pub mod sharing;
pub mod vault;

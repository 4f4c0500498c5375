//! Crypto primitives (C1).
//!
//! Six total, failure-typed operations: random master-key generation, Argon2id
//! key derivation, AES-256-GCM AEAD encrypt/decrypt, Ed25519 sign/verify, and
//! SHA-256 hashing. Every function here is pure with respect to its inputs;
//! none of them touch disk, log, or retry. Callers (C7) decide what to do
//! with a failure.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::collaborators::RandomSource;
use crate::error::CryptoError;

/// Length in bytes of a master key, derived key, and signing-key seed.
pub const KEY_LEN: usize = 32;
/// Length in bytes of the AES-GCM nonce.
pub const NONCE_LEN: usize = 12;
/// Length in bytes of the AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;
/// Length in bytes of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;
/// Length in bytes of a SHA-256 digest.
pub const HASH_LEN: usize = 32;

/// Argon2id parameters, stored verbatim in [`crate::models::Metadata`] so a
/// vault remains readable even if the crate's defaults change later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
  pub time_cost: u32,
  pub memory_cost_kib: u32,
  pub parallelism: u32,
  pub output_len: usize,
}

impl Default for KdfParams {
  fn default() -> Self {
    // See DESIGN.md / SPEC_FULL.md section 9 for why these values were
    // chosen over the source's other documented parameter set.
    Self {
      time_cost: 3,
      memory_cost_kib: 65536,
      parallelism: 1,
      output_len: KEY_LEN,
    }
  }
}

impl KdfParams {
  fn to_argon2_params(self) -> Result<Params, CryptoError> {
    Params::new(
      self.memory_cost_kib,
      self.time_cost,
      self.parallelism,
      Some(self.output_len),
    )
    .map_err(|e| CryptoError::BadKdfParams(e.to_string()))
  }
}

/// The result of an AEAD encryption: ciphertext (including the trailing
/// tag, as produced by the `aead` crate family), the fresh nonce used, and
/// the tag split out for callers that want to store it separately per the
/// on-disk layout in spec section 6.
#[derive(Debug, Clone)]
pub struct AeadSealed {
  pub ciphertext: Vec<u8>,
  pub nonce: [u8; NONCE_LEN],
  pub tag: [u8; TAG_LEN],
}

/// Generates a fresh, cryptographically random 32-byte master key.
pub fn generate_master_key(rng: &dyn RandomSource) -> [u8; KEY_LEN] {
  let mut key = [0u8; KEY_LEN];
  rng.fill(&mut key);
  key
}

/// Derives a 32-byte working key from a password (the PIN) and salt using
/// Argon2id. `params` is stored by the caller so derivation can be repeated
/// identically on every subsequent unlock.
pub fn derive_key(password: &[u8], salt: &[u8], params: KdfParams) -> Result<[u8; KEY_LEN], CryptoError> {
  let argon2_params = params.to_argon2_params()?;
  let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

  let mut out = [0u8; KEY_LEN];
  argon2
    .hash_password_into(password, salt, &mut out)
    .map_err(|e| CryptoError::Kdf(e.to_string()))?;
  Ok(out)
}

/// Encrypts `plaintext` under `key` (must be 32 bytes) using AES-256-GCM with
/// a freshly random 12-byte nonce. Returns ciphertext-with-tag split into its
/// `ciphertext` (sans tag) and `tag` fields, matching the ciphertext/nonce/tag
/// triple of spec section 3.
pub fn aead_encrypt(plaintext: &[u8], key: &[u8], rng: &dyn RandomSource) -> Result<AeadSealed, CryptoError> {
  if key.len() != KEY_LEN {
    return Err(CryptoError::BadKeyLength);
  }
  let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

  let mut nonce_bytes = [0u8; NONCE_LEN];
  rng.fill(&mut nonce_bytes);
  let nonce = Nonce::from_slice(&nonce_bytes);

  let sealed = cipher
    .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
    .map_err(|_| CryptoError::Kdf("aead encrypt failed".to_string()))?;

  let split_at = sealed.len() - TAG_LEN;
  let (ct, tag_slice) = sealed.split_at(split_at);
  let mut tag = [0u8; TAG_LEN];
  tag.copy_from_slice(tag_slice);

  Ok(AeadSealed {
    ciphertext: ct.to_vec(),
    nonce: nonce_bytes,
    tag,
  })
}

/// Decrypts a ciphertext/nonce/tag triple under `key`. Any tampering with
/// any of the three inputs yields [`CryptoError::TagMismatch`] with no
/// plaintext returned, verified in constant time by the underlying AEAD impl.
pub fn aead_decrypt(
  ciphertext: &[u8],
  nonce: &[u8; NONCE_LEN],
  tag: &[u8; TAG_LEN],
  key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
  if key.len() != KEY_LEN {
    return Err(CryptoError::BadKeyLength);
  }
  let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
  let nonce = Nonce::from_slice(nonce);

  let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
  combined.extend_from_slice(ciphertext);
  combined.extend_from_slice(tag);

  cipher
    .decrypt(nonce, Payload { msg: &combined, aad: &[] })
    .map_err(|_| CryptoError::TagMismatch)
}

/// Signs `msg` under `private_key` (a 32-byte Ed25519 seed), returning a
/// 64-byte detached signature.
pub fn sign(private_key: &[u8; KEY_LEN], msg: &[u8]) -> [u8; SIGNATURE_LEN] {
  let signing_key = SigningKey::from_bytes(private_key);
  signing_key.sign(msg).to_bytes()
}

/// Verifies a 64-byte Ed25519 signature under `public_key` (32 bytes).
/// Rejects non-canonical signature encodings (strict verification).
pub fn verify(public_key: &[u8; 32], sig: &[u8; SIGNATURE_LEN], msg: &[u8]) -> bool {
  let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
    return false;
  };
  let signature = Signature::from_bytes(sig);
  verifying_key.verify_strict(msg, &signature).is_ok()
}

/// Generates a fresh Ed25519 keypair, returning `(private_key_seed,
/// public_key)`.
pub fn generate_signing_keypair(rng: &dyn RandomSource) -> ([u8; KEY_LEN], [u8; 32]) {
  let mut seed = [0u8; KEY_LEN];
  rng.fill(&mut seed);
  let signing_key = SigningKey::from_bytes(&seed);
  let public = signing_key.verifying_key().to_bytes();
  let out = (seed, public);
  seed.zeroize();
  out
}

/// Computes the SHA-256 digest of `bytes`.
pub fn hash(bytes: &[u8]) -> [u8; HASH_LEN] {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  let digest = hasher.finalize();
  let mut out = [0u8; HASH_LEN];
  out.copy_from_slice(&digest);
  out
}

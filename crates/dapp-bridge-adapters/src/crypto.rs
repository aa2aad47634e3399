use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use alloy::primitives::B256;

use dapp_bridge_core::PortError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KdfAlgorithm {
    Argon2idV1,
    Pbkdf2HmacSha256V1,
}

/// Cost parameters. Persisted next to every salt so old envelopes stay
/// readable after the defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub pbkdf2_rounds: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 1,
            pbkdf2_rounds: 600_000,
        }
    }
}

pub struct DerivedCrypto {
    pub kdf_algorithm: KdfAlgorithm,
    pub salt: [u8; 16],
    pub enc_key: Zeroizing<[u8; 32]>,
    pub mac_key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for DerivedCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedCrypto")
            .field("kdf_algorithm", &self.kdf_algorithm)
            .finish_non_exhaustive()
    }
}

pub fn generate_salt() -> Result<[u8; 16], PortError> {
    let mut salt = [0u8; 16];
    getrandom::getrandom(&mut salt)
        .map_err(|e| PortError::Transport(format!("salt generation failed: {e}")))?;
    Ok(salt)
}

pub fn generate_nonce() -> Result<[u8; 12], PortError> {
    let mut nonce = [0u8; 12];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| PortError::Transport(format!("nonce generation failed: {e}")))?;
    Ok(nonce)
}

/// Derives keys for a new envelope: Argon2id when the parameters are
/// accepted, PBKDF2 otherwise.
pub fn derive_crypto(
    passphrase: &[u8],
    salt: [u8; 16],
    params: &KdfParams,
) -> Result<DerivedCrypto, PortError> {
    let (root, kdf_algorithm) = match argon2_root_key(passphrase, &salt, params) {
        Some(root) => (root, KdfAlgorithm::Argon2idV1),
        None => (
            pbkdf2_root_key(passphrase, &salt, params),
            KdfAlgorithm::Pbkdf2HmacSha256V1,
        ),
    };
    expand_keys(&root, kdf_algorithm, salt)
}

/// Re-derives keys for an existing envelope with the algorithm it recorded.
pub fn rederive_crypto(
    passphrase: &[u8],
    salt: [u8; 16],
    params: &KdfParams,
    kdf_algorithm: KdfAlgorithm,
) -> Result<DerivedCrypto, PortError> {
    let root = match kdf_algorithm {
        KdfAlgorithm::Argon2idV1 => argon2_root_key(passphrase, &salt, params)
            .ok_or_else(|| PortError::Validation("argon2id derivation failed".to_owned()))?,
        KdfAlgorithm::Pbkdf2HmacSha256V1 => pbkdf2_root_key(passphrase, &salt, params),
    };
    expand_keys(&root, kdf_algorithm, salt)
}

fn expand_keys(
    root: &[u8; 32],
    kdf_algorithm: KdfAlgorithm,
    salt: [u8; 16],
) -> Result<DerivedCrypto, PortError> {
    let hk = Hkdf::<Sha256>::new(None, root);
    let mut enc_key = Zeroizing::new([0u8; 32]);
    let mut mac_key = Zeroizing::new([0u8; 32]);
    hk.expand(b"enc_key_v1", &mut enc_key[..])
        .map_err(|_| PortError::Validation("hkdf expand for enc_key_v1 failed".to_owned()))?;
    hk.expand(b"mac_key_v1", &mut mac_key[..])
        .map_err(|_| PortError::Validation("hkdf expand for mac_key_v1 failed".to_owned()))?;
    Ok(DerivedCrypto {
        kdf_algorithm,
        salt,
        enc_key,
        mac_key,
    })
}

pub fn encrypt_aes_gcm(
    enc_key: &[u8; 32],
    nonce: [u8; 12],
    plaintext: &[u8],
) -> Result<Vec<u8>, PortError> {
    let cipher = Aes256Gcm::new_from_slice(enc_key)
        .map_err(|e| PortError::Validation(format!("aes-gcm init failed: {e}")))?;
    let nonce = Nonce::<aes_gcm::aead::consts::U12>::from(nonce);
    cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| PortError::Transport(format!("aes-gcm encrypt failed: {e}")))
}

pub fn decrypt_aes_gcm(
    enc_key: &[u8; 32],
    nonce: [u8; 12],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, PortError> {
    let cipher = Aes256Gcm::new_from_slice(enc_key)
        .map_err(|e| PortError::Validation(format!("aes-gcm init failed: {e}")))?;
    let nonce = Nonce::<aes_gcm::aead::consts::U12>::from(nonce);
    cipher
        .decrypt(&nonce, ciphertext)
        .map(Zeroizing::new)
        .map_err(|e| PortError::Validation(format!("aes-gcm decrypt failed: {e}")))
}

pub fn hmac_sha256_b256(mac_key: &[u8; 32], payload: &[u8]) -> Result<B256, PortError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| PortError::Validation(format!("hmac init failed: {e}")))?;
    mac.update(payload);
    let out = mac.finalize().into_bytes();
    Ok(B256::from_slice(&out))
}

/// Constant-time check of an HMAC computed by [`hmac_sha256_b256`].
pub fn verify_hmac_sha256(
    mac_key: &[u8; 32],
    payload: &[u8],
    expected: &B256,
) -> Result<bool, PortError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| PortError::Validation(format!("hmac init failed: {e}")))?;
    mac.update(payload);
    Ok(mac.verify_slice(expected.as_slice()).is_ok())
}

fn argon2_root_key(
    passphrase: &[u8],
    salt: &[u8; 16],
    params: &KdfParams,
) -> Option<Zeroizing<[u8; 32]>> {
    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .ok()?;
    let mut root = Zeroizing::new([0u8; 32]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase, salt, &mut root[..])
        .ok()?;
    Some(root)
}

fn pbkdf2_root_key(passphrase: &[u8], salt: &[u8; 16], params: &KdfParams) -> Zeroizing<[u8; 32]> {
    let mut root = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(passphrase, salt, params.pbkdf2_rounds, &mut root[..]);
    root
}

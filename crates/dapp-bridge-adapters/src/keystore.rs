//! Password-protected mnemonic store.
//!
//! One app password guards every wallet. A verifier record answers
//! `check_password_valid` without touching wallet ciphertexts; each wallet
//! carries its own salt, AES-GCM ciphertext and an HMAC over the sealed bytes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use alloy::primitives::{Address, B256};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use dapp_bridge_core::{Credential, CredentialStorePort, PortError, WalletIdentity};

use crate::crypto::{
    decrypt_aes_gcm, derive_crypto, encrypt_aes_gcm, generate_nonce, generate_salt,
    hmac_sha256_b256, rederive_crypto, verify_hmac_sha256, DerivedCrypto, KdfAlgorithm,
    KdfParams,
};
use crate::signer::derive_signer;

const KEYSTORE_VERSION: u32 = 1;
const VERIFIER_PAYLOAD: &[u8] = b"dapp-bridge-password-check-v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KdfRecord {
    algorithm: KdfAlgorithm,
    params: KdfParams,
    salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordVerifier {
    kdf: KdfRecord,
    mac: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletEnvelope {
    address: Address,
    kdf: KdfRecord,
    nonce: String,
    ciphertext: String,
    mac: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeystoreFile {
    version: u32,
    #[serde(default)]
    verifier: Option<PasswordVerifier>,
    #[serde(default)]
    wallets: BTreeMap<String, WalletEnvelope>,
}

impl Default for KeystoreFile {
    fn default() -> Self {
        Self {
            version: KEYSTORE_VERSION,
            verifier: None,
            wallets: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct KeystoreAdapter {
    params: KdfParams,
    derivation_index: u32,
    path: Option<PathBuf>,
    file: Mutex<KeystoreFile>,
}

impl KeystoreAdapter {
    pub fn in_memory(params: KdfParams) -> Self {
        Self {
            params,
            derivation_index: 0,
            path: None,
            file: Mutex::new(KeystoreFile::default()),
        }
    }

    /// Loads the keystore at `path`, or starts empty when the file does not
    /// exist yet. Every mutation is written back.
    pub fn open(path: impl AsRef<Path>, params: KdfParams) -> Result<Self, PortError> {
        let path = path.as_ref().to_path_buf();
        let file = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                PortError::Transport(format!("keystore read {} failed: {e}", path.display()))
            })?;
            let file: KeystoreFile = serde_json::from_str(&raw)
                .map_err(|e| PortError::Validation(format!("keystore malformed: {e}")))?;
            if file.version != KEYSTORE_VERSION {
                return Err(PortError::Validation(format!(
                    "unsupported keystore version {}",
                    file.version
                )));
            }
            debug!(path = %path.display(), wallets = file.wallets.len(), "keystore loaded");
            file
        } else {
            KeystoreFile::default()
        };
        Ok(Self {
            params,
            derivation_index: 0,
            path: Some(path),
            file: Mutex::new(file),
        })
    }

    pub fn with_derivation_index(mut self, index: u32) -> Self {
        self.derivation_index = index;
        self
    }

    pub fn has_password(&self) -> Result<bool, PortError> {
        Ok(self.lock()?.verifier.is_some())
    }

    pub fn set_password(&self, password: &str) -> Result<(), PortError> {
        let mut file = self.lock()?;
        if file.verifier.is_some() {
            return Err(PortError::Conflict("password already set".to_owned()));
        }
        if password.is_empty() {
            return Err(PortError::Validation("password must not be empty".to_owned()));
        }
        let derived = derive_crypto(password.as_bytes(), generate_salt()?, &self.params)?;
        file.verifier = Some(PasswordVerifier {
            mac: hmac_sha256_b256(&derived.mac_key, VERIFIER_PAYLOAD)?,
            kdf: self.kdf_record(&derived),
        });
        self.persist(&file)?;
        info!("keystore password set");
        Ok(())
    }

    /// Seals `phrase` under the app password and records the derived address.
    pub fn import_mnemonic(
        &self,
        password: &str,
        wallet_id: &str,
        phrase: &str,
    ) -> Result<WalletIdentity, PortError> {
        if !self.check_password_valid(password)? {
            return Err(PortError::Validation("wrong password".to_owned()));
        }
        let phrase = Zeroizing::new(phrase.trim().to_owned());
        let address = derive_signer(&phrase, self.derivation_index)?.address();

        let derived = derive_crypto(password.as_bytes(), generate_salt()?, &self.params)?;
        let nonce = generate_nonce()?;
        let ciphertext = encrypt_aes_gcm(&derived.enc_key, nonce, phrase.as_bytes())?;
        let mac = hmac_sha256_b256(
            &derived.mac_key,
            &sealed_payload(wallet_id, &nonce, &ciphertext),
        )?;

        let mut file = self.lock()?;
        if file.wallets.contains_key(wallet_id) {
            return Err(PortError::Conflict(format!("wallet {wallet_id} already exists")));
        }
        file.wallets.insert(
            wallet_id.to_owned(),
            WalletEnvelope {
                address,
                kdf: self.kdf_record(&derived),
                nonce: BASE64.encode(nonce),
                ciphertext: BASE64.encode(&ciphertext),
                mac,
            },
        );
        self.persist(&file)?;
        info!(wallet_id, %address, "wallet imported");
        Ok(WalletIdentity {
            wallet_id: wallet_id.to_owned(),
            address,
        })
    }

    pub fn wallet(&self, wallet_id: &str) -> Result<WalletIdentity, PortError> {
        let file = self.lock()?;
        let envelope = file
            .wallets
            .get(wallet_id)
            .ok_or_else(|| PortError::NotFound(format!("wallet {wallet_id}")))?;
        Ok(WalletIdentity {
            wallet_id: wallet_id.to_owned(),
            address: envelope.address,
        })
    }

    pub fn wallets(&self) -> Result<Vec<WalletIdentity>, PortError> {
        Ok(self
            .lock()?
            .wallets
            .iter()
            .map(|(id, envelope)| WalletIdentity {
                wallet_id: id.clone(),
                address: envelope.address,
            })
            .collect())
    }

    fn kdf_record(&self, derived: &DerivedCrypto) -> KdfRecord {
        KdfRecord {
            algorithm: derived.kdf_algorithm,
            params: self.params,
            salt: BASE64.encode(derived.salt),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, KeystoreFile>, PortError> {
        self.file
            .lock()
            .map_err(|e| PortError::Transport(format!("keystore lock poisoned: {e}")))
    }

    fn persist(&self, file: &KeystoreFile) -> Result<(), PortError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(file)
            .map_err(|e| PortError::Validation(format!("keystore serialize failed: {e}")))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(|e| {
                PortError::Transport(format!("keystore write {} failed: {e}", path.display()))
            })
    }
}

impl CredentialStorePort for KeystoreAdapter {
    fn check_password_valid(&self, password: &str) -> Result<bool, PortError> {
        let verifier = self
            .lock()?
            .verifier
            .clone()
            .ok_or_else(|| PortError::NotFound("keystore has no password".to_owned()))?;
        let derived = rederive(password, &verifier.kdf)?;
        verify_hmac_sha256(&derived.mac_key, VERIFIER_PAYLOAD, &verifier.mac)
    }

    fn decrypt(&self, password: &str, wallet_id: &str) -> Result<Credential, PortError> {
        let envelope = self
            .lock()?
            .wallets
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("wallet {wallet_id}")))?;
        let derived = rederive(password, &envelope.kdf)?;
        let nonce: [u8; 12] = decode_fixed(&envelope.nonce, "nonce")?;
        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .map_err(|e| PortError::Validation(format!("ciphertext malformed: {e}")))?;

        let authentic = verify_hmac_sha256(
            &derived.mac_key,
            &sealed_payload(wallet_id, &nonce, &ciphertext),
            &envelope.mac,
        )?;
        if !authentic {
            warn!(wallet_id, "keystore envelope failed authentication");
            return Err(PortError::Validation("wrong password".to_owned()));
        }
        let plaintext = decrypt_aes_gcm(&derived.enc_key, nonce, &ciphertext)?;
        let phrase = std::str::from_utf8(&plaintext)
            .map_err(|_| PortError::Validation("sealed mnemonic is not utf-8".to_owned()))?;
        Ok(Credential::new(phrase))
    }
}

fn rederive(password: &str, kdf: &KdfRecord) -> Result<DerivedCrypto, PortError> {
    let salt: [u8; 16] = decode_fixed(&kdf.salt, "salt")?;
    rederive_crypto(password.as_bytes(), salt, &kdf.params, kdf.algorithm)
}

fn decode_fixed<const N: usize>(encoded: &str, what: &str) -> Result<[u8; N], PortError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| PortError::Validation(format!("{what} malformed: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| PortError::Validation(format!("{what} has wrong length")))
}

/// Bytes covered by the wallet HMAC; binds the ciphertext to its wallet id.
fn sealed_payload(wallet_id: &str, nonce: &[u8; 12], ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(wallet_id.len() + 1 + nonce.len() + ciphertext.len());
    out.extend_from_slice(wallet_id.as_bytes());
    out.push(0);
    out.extend_from_slice(nonce);
    out.extend_from_slice(ciphertext);
    out
}

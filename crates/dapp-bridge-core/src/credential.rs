use std::fmt;

use zeroize::Zeroizing;

use crate::domain::TimestampMs;

/// Decrypted wallet mnemonic. Memory only; wiped on drop.
#[derive(Clone)]
pub struct Credential {
    phrase: Zeroizing<String>,
}

impl Credential {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: Zeroizing::new(phrase.into()),
        }
    }

    pub fn expose(&self) -> &str {
        &self.phrase
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

struct CachedCredential {
    wallet_id: String,
    credential: Credential,
    cached_at: TimestampMs,
}

/// Session cache for the decrypted credential.
///
/// Entries are bound to one wallet id and expire `ttl_ms` after they were
/// stored. A zero TTL disables caching entirely, so every request prompts.
pub struct CredentialCache {
    ttl_ms: u64,
    entry: Option<CachedCredential>,
}

impl CredentialCache {
    pub fn new(ttl_ms: u64) -> Self {
        Self { ttl_ms, entry: None }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn store(&mut self, wallet_id: &str, credential: Credential, now: TimestampMs) {
        if self.ttl_ms == 0 {
            return;
        }
        self.entry = Some(CachedCredential {
            wallet_id: wallet_id.to_owned(),
            credential,
            cached_at: now,
        });
    }

    /// Returns the cached credential for `wallet_id`, dropping it if stale.
    pub fn get(&mut self, wallet_id: &str, now: TimestampMs) -> Option<Credential> {
        let usable = match &self.entry {
            None => return None,
            Some(entry) => {
                entry.wallet_id == wallet_id
                    && now.0.saturating_sub(entry.cached_at.0) < self.ttl_ms
            }
        };
        if !usable {
            self.clear();
            return None;
        }
        self.entry.as_ref().map(|entry| entry.credential.clone())
    }

    pub fn is_cached(&self) -> bool {
        self.entry.is_some()
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("ttl_ms", &self.ttl_ms)
            .field("cached", &self.entry.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_credential_expires_after_ttl() {
        let mut cache = CredentialCache::new(1_000);
        cache.store("wallet-a", Credential::new("seed words"), TimestampMs(10));

        let hit = cache.get("wallet-a", TimestampMs(500)).expect("fresh entry");
        assert_eq!(hit.expose(), "seed words");

        assert!(cache.get("wallet-a", TimestampMs(1_010)).is_none());
        assert!(!cache.is_cached());
    }

    #[test]
    fn other_wallet_invalidates_entry() {
        let mut cache = CredentialCache::new(60_000);
        cache.store("wallet-a", Credential::new("seed words"), TimestampMs(0));
        assert!(cache.get("wallet-b", TimestampMs(1)).is_none());
        assert!(cache.get("wallet-a", TimestampMs(2)).is_none());
    }

    #[test]
    fn zero_ttl_never_caches() {
        let mut cache = CredentialCache::new(0);
        cache.store("wallet-a", Credential::new("seed words"), TimestampMs(0));
        assert!(!cache.is_cached());
    }

    #[test]
    fn debug_output_is_redacted() {
        let credential = Credential::new("very secret words");
        assert!(!format!("{credential:?}").contains("secret"));
    }
}

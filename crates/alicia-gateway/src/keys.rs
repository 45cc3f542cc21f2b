//! Symmetric message-key lifecycle: one active key at a time, rotated keys
//! retained for a grace period so in-flight messages encrypted under the
//! previous key can still be decrypted. Key loading checks an env var
//! first, then falls back to an on-disk generated key.

use std::collections::HashMap;
use std::path::PathBuf;

use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use chrono::{DateTime, Utc};
use rand::RngCore;

use alicia_core::AliciaError;

struct KeyEntry {
    key: [u8; 32],
    retired_at: Option<DateTime<Utc>>,
}

pub struct KeyStore {
    active_key_id: String,
    keys: HashMap<String, KeyEntry>,
    grace_period: chrono::Duration,
}

impl KeyStore {
    /// Load (or generate) the initial active key: `ALICIA_MESSAGE_KEY` env
    /// var (64 hex chars) first, else a generated key persisted at
    /// `{data_dir}/.message_key`.
    pub fn load_or_generate(data_dir: &PathBuf) -> Result<Self, AliciaError> {
        let (key_id, key) = if let Ok(hex_key) = std::env::var("ALICIA_MESSAGE_KEY") {
            (
                "env".to_string(),
                decode_key(&hex_key).map_err(AliciaError::Config)?,
            )
        } else {
            let path = data_dir.join(".message_key");
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                ("k-0".to_string(), decode_key(raw.trim()).map_err(AliciaError::Config)?)
            } else {
                let mut key = [0u8; 32];
                OsRng.fill_bytes(&mut key);
                std::fs::create_dir_all(data_dir)?;
                std::fs::write(&path, hex::encode(key))?;
                ("k-0".to_string(), key)
            }
        };

        // Confirms the key is well-formed before it's ever used to encrypt.
        Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AliciaError::Config(format!("invalid message key: {e}")))?;

        let mut keys = HashMap::new();
        keys.insert(
            key_id.clone(),
            KeyEntry {
                key,
                retired_at: None,
            },
        );

        Ok(Self {
            active_key_id: key_id,
            keys,
            grace_period: chrono::Duration::hours(24),
        })
    }

    pub fn active_key_id(&self) -> &str {
        &self.active_key_id
    }

    pub fn active_key(&self) -> [u8; 32] {
        self.keys[&self.active_key_id].key
    }

    /// Generate a new active key; the previous key stays valid for
    /// decryption for the configured grace period.
    pub fn rotate(&mut self) -> String {
        let new_id = format!("k-{}", self.keys.len());
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);

        if let Some(previous) = self.keys.get_mut(&self.active_key_id) {
            previous.retired_at = Some(Utc::now());
        }
        self.keys.insert(
            new_id.clone(),
            KeyEntry {
                key,
                retired_at: None,
            },
        );
        self.active_key_id = new_id.clone();
        new_id
    }

    /// Fetch a key by id for decryption, rejecting keys retired longer ago
    /// than the grace period. Unknown `key_id` is a hard decrypt failure.
    pub fn get(&self, key_id: &str) -> Result<[u8; 32], AliciaError> {
        let entry = self
            .keys
            .get(key_id)
            .ok_or_else(|| AliciaError::DecryptFailed(format!("unknown key_id {key_id}")))?;
        if let Some(retired_at) = entry.retired_at {
            if Utc::now() - retired_at > self.grace_period {
                return Err(AliciaError::DecryptFailed(format!(
                    "key_id {key_id} past its grace period"
                )));
            }
        }
        Ok(entry.key)
    }

    /// Drop retired keys whose grace period has elapsed. Call periodically.
    pub fn sweep_expired(&mut self) {
        let grace = self.grace_period;
        self.keys.retain(|id, entry| {
            id == &self.active_key_id
                || match entry.retired_at {
                    Some(at) => Utc::now() - at <= grace,
                    None => true,
                }
        });
    }
}

fn decode_key(hex_str: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex key: {e}"))?;
    if bytes.len() != 32 {
        return Err(format!("key must be 32 bytes, got {}", bytes.len()));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_store() -> KeyStore {
        let dir = std::env::temp_dir().join(format!("alicia-keystore-test-{}", uuid::Uuid::new_v4()));
        KeyStore::load_or_generate(&dir).unwrap()
    }

    #[test]
    fn rotate_keeps_old_key_decryptable_within_grace_period() {
        let mut store = fresh_store();
        let old_id = store.active_key_id().to_string();
        let old_key = store.active_key();
        store.rotate();

        assert_ne!(store.active_key_id(), old_id);
        assert_eq!(store.get(&old_id).unwrap(), old_key);
    }

    #[test]
    fn unknown_key_id_is_a_hard_failure() {
        let store = fresh_store();
        assert!(store.get("does-not-exist").is_err());
    }

    #[test]
    fn sweep_expired_keeps_the_active_key_even_if_matched_by_id_logic() {
        let mut store = fresh_store();
        store.rotate();
        store.sweep_expired();
        assert!(store.get(store.active_key_id()).is_ok());
    }
}

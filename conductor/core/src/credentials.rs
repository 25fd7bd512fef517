//! Credential Rotation
//!
//! Each provider (completion endpoint, search API) is configured with an
//! ordered list of API keys. A [`CredentialSet`] tracks which key is current
//! and advances round-robin when a call made with it fails.
//!
//! The set is owned by the session object and shared by reference with the
//! retry controller, so rotation can be tested with injected key lists and
//! never lives in a module-level global.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ConfigError;

/// Ordered API keys for one provider plus the current rotation index
#[derive(Debug)]
pub struct CredentialSet {
    /// Provider name used in logs and errors
    provider: String,
    /// Keys in configured order (never empty)
    keys: Vec<String>,
    /// Index of the key handed out next
    index: Mutex<usize>,
}

impl CredentialSet {
    /// Create a credential set
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyCredentials`] if `keys` is empty or only
    /// contains blank entries.
    pub fn new(provider: impl Into<String>, keys: Vec<String>) -> Result<Self, ConfigError> {
        let provider = provider.into();
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if keys.is_empty() {
            return Err(ConfigError::EmptyCredentials { provider });
        }

        Ok(Self {
            provider,
            keys,
            index: Mutex::new(0),
        })
    }

    /// Provider name
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Number of configured keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; construction rejects empty key lists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Current rotation index
    #[must_use]
    pub fn index(&self) -> usize {
        *self.index.lock()
    }

    /// Key at the current rotation index
    #[must_use]
    pub fn current_key(&self) -> String {
        let idx = *self.index.lock();
        self.keys[idx].clone()
    }

    /// Advance to the next key, wrapping to the first after the last
    pub fn rotate(&self) {
        let mut idx = self.index.lock();
        *idx = (*idx + 1) % self.keys.len();
        tracing::info!(provider = %self.provider, index = *idx, "Rotated API key");
    }
}

/// Credential sets for every configured provider, keyed by provider name
#[derive(Debug, Default)]
pub struct KeyRotator {
    sets: HashMap<String, Arc<CredentialSet>>,
}

impl KeyRotator {
    /// Create an empty rotator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register keys for a provider, replacing any previous set
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyCredentials`] if `keys` is empty.
    pub fn register(
        &mut self,
        provider: impl Into<String>,
        keys: Vec<String>,
    ) -> Result<Arc<CredentialSet>, ConfigError> {
        let set = Arc::new(CredentialSet::new(provider, keys)?);
        self.sets
            .insert(set.provider().to_string(), Arc::clone(&set));
        Ok(set)
    }

    /// Track an existing credential set, replacing any set of the same provider
    pub fn insert(&mut self, set: Arc<CredentialSet>) {
        self.sets.insert(set.provider().to_string(), set);
    }

    /// Shared handle to a provider's credential set
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<Arc<CredentialSet>> {
        self.sets.get(provider).cloned()
    }

    /// Current key for a provider
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyCredentials`] if no keys were registered.
    pub fn current_key(&self, provider: &str) -> Result<String, ConfigError> {
        self.sets
            .get(provider)
            .map(|set| set.current_key())
            .ok_or_else(|| ConfigError::EmptyCredentials {
                provider: provider.to_string(),
            })
    }

    /// Rotate a provider's key; unknown providers are ignored
    pub fn rotate(&self, provider: &str) {
        if let Some(set) = self.sets.get(provider) {
            set.rotate();
        }
    }

    /// Registered provider names
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("k{i}")).collect()
    }

    #[test]
    fn test_rotator_is_per_provider() {
        let mut rotator = KeyRotator::new();
        rotator.register("cerebras", keys(2)).unwrap();
        rotator.register("brave", vec!["b0".into(), "b1".into()]).unwrap();

        rotator.rotate("cerebras");
        assert_eq!(rotator.current_key("cerebras").unwrap(), "k1");
        assert_eq!(rotator.current_key("brave").unwrap(), "b0");

        // Handles share state with the rotator
        let brave = rotator.get("brave").unwrap();
        brave.rotate();
        assert_eq!(rotator.current_key("brave").unwrap(), "b1");
    }

    #[test]
    fn test_rotator_unknown_provider() {
        let rotator = KeyRotator::new();
        assert!(matches!(
            rotator.current_key("nope"),
            Err(ConfigError::EmptyCredentials { .. })
        ));
        rotator.rotate("nope");
        assert!(rotator.get("nope").is_none());
    }

    #[test]
    fn test_empty_keys_rejected() {
        let err = CredentialSet::new("cerebras", Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCredentials { ref provider } if provider == "cerebras"));

        let err = CredentialSet::new("brave", vec!["  ".to_string(), String::new()]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCredentials { .. }));
    }

    #[test]
    fn test_blank_entries_dropped() {
        let set = CredentialSet::new("p", vec![" a ".into(), "".into(), "b".into()]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.current_key(), "a");
    }

    #[test]
    fn test_rotation_wraps() {
        let set = CredentialSet::new("p", keys(3)).unwrap();
        assert_eq!(set.current_key(), "k0");
        set.rotate();
        assert_eq!(set.current_key(), "k1");
        set.rotate();
        assert_eq!(set.current_key(), "k2");
        set.rotate();
        assert_eq!(set.current_key(), "k0");
        assert_eq!(set.index(), 0);
    }

    #[test]
    fn test_k_rotations_return_to_start() {
        for k in 1..8 {
            let set = CredentialSet::new("p", keys(k)).unwrap();
            for start in 0..k {
                while set.index() != start {
                    set.rotate();
                }
                for _ in 0..k {
                    set.rotate();
                }
                assert_eq!(set.index(), start, "k={k} start={start}");
            }
        }
    }

    #[test]
    fn test_single_key_rotation_is_identity() {
        let set = CredentialSet::new("p", keys(1)).unwrap();
        set.rotate();
        assert_eq!(set.index(), 0);
        assert_eq!(set.current_key(), "k0");
    }
}

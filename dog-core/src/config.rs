//! # DogRS Configuration
//!
//! A minimal string key/value store. Crates read their own dotted keys out
//! of a [`DogConfigSnapshot`] and fall back to their defaults, so the
//! store itself stays format-agnostic.
//!
//! ```rust
//! use dog_core::DogConfig;
//!
//! let mut config = DogConfig::new();
//! config.set("tenancy.tenantField", "orgId");
//! config.set("tenancy.routing.maxAttempts", "5");
//!
//! let snapshot = config.snapshot();
//! assert_eq!(snapshot.get("tenancy.tenantField"), Some("orgId"));
//! assert_eq!(snapshot.get_u64("tenancy.routing.maxAttempts"), Some(5));
//! ```
//!
//! ## Environment overrides
//!
//! [`DogConfig::load_env`] maps `PREFIX__A__B_C` style variables onto keys:
//! the prefix is stripped, `__` becomes `.` and the rest is camel-cased, so
//! `DOG__TENANCY__WRITE_HOLD_TIMEOUT_MS=250` sets
//! `tenancy.writeHoldTimeoutMs`.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct DogConfig {
    values: HashMap<String, String>,
}

impl DogConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Overlay every process environment variable starting with `prefix`.
    /// Returns how many keys were set.
    pub fn load_env(&mut self, prefix: &str) -> usize {
        self.load_vars(prefix, std::env::vars())
    }

    /// Same as [`load_env`](Self::load_env) over an explicit variable list.
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut loaded = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = env_key_to_config_key(stripped);
                if normalized.is_empty() {
                    continue;
                }
                self.set(normalized, value);
                loaded += 1;
            }
        }
        loaded
    }

    pub fn snapshot(&self) -> DogConfigSnapshot {
        DogConfigSnapshot::new(self.values.clone())
    }
}

/// `TENANCY__WRITE_HOLD_TIMEOUT_MS` → `tenancy.writeHoldTimeoutMs`
fn env_key_to_config_key(raw: &str) -> String {
    raw.trim_start_matches('_')
        .split("__")
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            for (i, word) in segment.split('_').filter(|w| !w.is_empty()).enumerate() {
                let lower = word.to_lowercase();
                if i == 0 {
                    out.push_str(&lower);
                } else {
                    let mut chars = lower.chars();
                    if let Some(first) = chars.next() {
                        out.extend(first.to_uppercase());
                        out.push_str(chars.as_str());
                    }
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Immutable view of the configuration at one point in time.
#[derive(Debug, Clone, Default)]
pub struct DogConfigSnapshot {
    map: HashMap<String, String>,
}

impl DogConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    /// Reads a millisecond count as a [`Duration`].
    pub fn get_duration_ms(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_millis)
    }

    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_are_camel_cased_per_segment() {
        assert_eq!(
            env_key_to_config_key("TENANCY__WRITE_HOLD_TIMEOUT_MS"),
            "tenancy.writeHoldTimeoutMs"
        );
        assert_eq!(
            env_key_to_config_key("__TENANCY__ROUTING__MAX_ATTEMPTS"),
            "tenancy.routing.maxAttempts"
        );
    }

    #[test]
    fn load_vars_only_takes_prefixed_keys() {
        let mut config = DogConfig::new();
        let loaded = config.load_vars(
            "DOG",
            vec![
                ("DOG__TENANCY__SHARD_COUNT".to_string(), "8".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ],
        );

        assert_eq!(loaded, 1);
        assert_eq!(config.snapshot().get_usize("tenancy.shardCount"), Some(8));
        assert!(!config.has("path"));
    }

    #[test]
    fn snapshot_parses_durations() {
        let mut config = DogConfig::new();
        config.set("a.ms", "250");
        config.set("a.secs", "3");
        config.set("a.bad", "soon");

        let snap = config.snapshot();
        assert_eq!(snap.get_duration_ms("a.ms"), Some(Duration::from_millis(250)));
        assert_eq!(snap.get_duration_secs("a.secs"), Some(Duration::from_secs(3)));
        assert_eq!(snap.get_duration_ms("a.bad"), None);
    }
}

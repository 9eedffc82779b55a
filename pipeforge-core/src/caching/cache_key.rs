//! Deterministic cache key generation
//!
//! Keys are hex SHA-256 digests over canonical JSON (object keys sorted), so
//! the same logical content always hashes the same regardless of map
//! ordering, and any change to a component changes the key.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::{Result, Value};

/// Trait for types that can produce deterministic content hashes for caching.
///
/// Implementations MUST ensure:
/// - Same content always produces the same hash
/// - Order-independent hashing of maps (canonical key order)
pub trait ContentHashable {
    /// Generate a deterministic SHA-256 hash of this content.
    ///
    /// Returns a hex-encoded SHA-256 hash string.
    fn content_hash(&self) -> Result<String>;
}

impl<T: Serialize + ?Sized> ContentHashable for T {
    fn content_hash(&self) -> Result<String> {
        let canonical = canonicalize_json(&serde_json::to_value(self)?);
        Ok(hash_string(&serde_json::to_string(&canonical)?))
    }
}

/// Incrementally assembles the named components of a cache key.
///
/// ```rust
/// use pipeforge_core::caching::FingerprintBuilder;
/// use serde_json::json;
///
/// let a = FingerprintBuilder::new("functional")
///     .component("inputs", &["x"]).unwrap()
///     .component("values", &[json!(1)]).unwrap()
///     .finish().unwrap();
/// let b = FingerprintBuilder::new("functional")
///     .component("inputs", &["x"]).unwrap()
///     .component("values", &[json!(2)]).unwrap()
///     .finish().unwrap();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    domain: String,
    components: serde_json::Map<String, Value>,
}

impl FingerprintBuilder {
    /// Start a key in a namespace, so keys of different stage kinds never
    /// collide even when their components coincide.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            components: serde_json::Map::new(),
        }
    }

    /// Add a named component.
    pub fn component<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Result<Self> {
        self.components
            .insert(name.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Hash the domain and all components.
    pub fn finish(self) -> Result<String> {
        let payload = serde_json::json!({
            "domain": self.domain,
            "components": Value::Object(self.components),
        });
        payload.content_hash()
    }
}

/// Fingerprint for a provider's `identity()`.
///
/// `config` should hold only generation-affecting, non-secret settings.
/// A configuration serde cannot represent as JSON hashes as its error text,
/// which still keeps identities stable per configuration type.
pub fn provider_fingerprint<T: Serialize + ?Sized>(kind: &str, config: &T) -> String {
    let config = serde_json::to_value(config)
        .unwrap_or_else(|e| Value::String(format!("unserializable: {e}")));
    let payload = canonicalize_json(&serde_json::json!({ "type": kind, "config": config }));
    hash_string(&payload.to_string())
}

/// Recursively canonicalize JSON (sort object keys).
pub fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();

            for key in keys {
                if let Some(val) = map.get(key) {
                    sorted.insert(key.to_string(), canonicalize_json(val));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}

fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

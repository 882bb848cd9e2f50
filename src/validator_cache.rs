//! # Schema Validator Cache Module
//!
//! Thread-safe cache of compiled JSON Schema validators.
//!
//! ## Overview
//!
//! Every constrained parameter and every response shape is backed by a JSON
//! Schema. Compiling one is far more expensive than running it, so schemas are
//! compiled once, at route registration, and shared across requests behind
//! `Arc`.
//!
//! ## Cache Key Structure
//!
//! Keys are the hex SHA-256 of the schema's serialized JSON. Two parameters
//! declaring identical constraints share one compiled validator regardless of
//! which route declared them.
//!
//! ## Thread Safety
//!
//! The map sits behind `Arc<RwLock<..>>`. After registration completes the
//! request path only takes read locks. A poisoned lock is recovered rather
//! than propagated, since the map is never left half-written.
//!
//! ## Configuration
//!
//! Disabled via `BRRTFN_SCHEMA_CACHE=off`; validators are then compiled on
//! every use.

use jsonschema::Validator;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

/// Hex SHA-256 of a schema's serialized form.
#[must_use]
pub fn schema_key(schema: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Thread-safe cache for compiled JSON Schema validators.
///
/// ```rust
/// use brrtfn::validator_cache::ValidatorCache;
/// use serde_json::json;
///
/// let cache = ValidatorCache::new(true);
/// let schema = json!({"type": "integer", "minimum": 1});
/// let validator = cache.get_or_compile(&schema).unwrap();
/// assert!(validator.is_valid(&json!(3)));
/// assert_eq!(cache.size(), 1);
/// ```
#[derive(Clone)]
pub struct ValidatorCache {
    cache: Arc<RwLock<HashMap<String, Arc<Validator>>>>,
    enabled: bool,
}

impl std::fmt::Debug for ValidatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorCache")
            .field("enabled", &self.enabled)
            .field("size", &self.size())
            .finish()
    }
}

impl Default for ValidatorCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ValidatorCache {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        info!(enabled = enabled, "Initializing JSON Schema validator cache");
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            enabled,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get a cached validator or compile and cache a new one.
    ///
    /// # Errors
    ///
    /// Returns the compiler's message when `schema` is not a valid JSON Schema.
    ///
    /// # Performance
    ///
    /// - Cache hit: read lock + `HashMap` lookup
    /// - Cache miss: compilation + write lock
    pub fn get_or_compile(&self, schema: &Value) -> Result<Arc<Validator>, String> {
        if !self.enabled {
            return compile(schema);
        }

        let key = schema_key(schema);

        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(validator) = cache.get(&key) {
                debug!(cache_key = %key, "Schema validator cache hit");
                return Ok(Arc::clone(validator));
            }
        }

        let validator = compile(schema)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);

        // Another thread may have compiled the same schema while we waited.
        if let Some(existing) = cache.get(&key) {
            debug!(cache_key = %key, "Schema validator compiled by another thread");
            return Ok(Arc::clone(existing));
        }

        cache.insert(key.clone(), Arc::clone(&validator));
        debug!(
            cache_key = %key,
            cache_size = cache.len(),
            "Schema validator compiled and cached"
        );
        Ok(validator)
    }

    /// Compile `schema` ahead of the first request.
    ///
    /// # Errors
    ///
    /// See [`ValidatorCache::get_or_compile`].
    pub fn precompile(&self, schema: &Value) -> Result<(), String> {
        self.get_or_compile(schema).map(|_| ())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = cache.len();
        cache.clear();
        info!(dropped = dropped, "Schema validator cache cleared");
    }
}

fn compile(schema: &Value) -> Result<Arc<Validator>, String> {
    jsonschema::validator_for(schema).map(Arc::new).map_err(|e| {
        error!(error = %e, schema = %schema, "Failed to compile JSON Schema");
        e.to_string()
    })
}

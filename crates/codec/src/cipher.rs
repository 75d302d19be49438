//! Cipher engine registry
//!
//! The registry maps the header's 16-byte cipher identifier to a registered
//! [`CipherEngine`]. New ciphers plug in without the pipeline knowing their
//! identifiers; an unknown identifier is a typed error, never a silent
//! pass-through.
//!
//! ```rust,ignore
//! let mut registry = CipherRegistry::new();
//! registry.register(Arc::new(Aes256CbcEngine::default()));
//!
//! let engine = registry.get(header.cipher_id)?;
//! let plaintext = engine.decrypt_stream(ciphertext, &key, &header.encryption_iv)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use vaultsync_core::{CipherEngine, DecodeError, DecodeResult, ObjectId};

/// Registry of outer cipher engines, keyed by identifier.
#[derive(Default)]
pub struct CipherRegistry {
    engines: HashMap<ObjectId, Arc<dyn CipherEngine>>,
}

impl CipherRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine under its own identifier.
    ///
    /// A later registration for the same identifier replaces the earlier
    /// one.
    pub fn register(&mut self, engine: Arc<dyn CipherEngine>) {
        self.engines.insert(engine.id(), engine);
    }

    /// Look up the engine for an identifier.
    pub fn get(&self, id: ObjectId) -> DecodeResult<Arc<dyn CipherEngine>> {
        self.engines
            .get(&id)
            .cloned()
            .ok_or(DecodeError::UnsupportedCipher(id))
    }

    /// Whether an engine is registered for `id`.
    pub fn supports(&self, id: ObjectId) -> bool {
        self.engines.contains_key(&id)
    }
}

//! Pluggable storage seams: root keys (for the Oven/AuthChecker), the
//! multi-op fingerprint table, and the third-party location directory.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::crypto::bakery_key::PublicKey;
use crate::error::{BakeryError, BakeryResult};
use crate::ops::Operation;
use crate::MacaroonKey;

/// Generates and looks up root keys by an opaque id.
pub trait RootKeyStore: Send + Sync {
    /// Mints a fresh root key and its id. The id is opaque and only needs to
    /// round-trip through [`RootKeyStore::get`].
    fn root_key(&self) -> BakeryResult<(MacaroonKey, Vec<u8>)>;

    fn get(&self, key_id: &[u8]) -> BakeryResult<MacaroonKey>;
}

/// In-memory `RootKeyStore`. Keys are never evicted; this store does not
/// survive process restarts, by design.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<Vec<u8>, MacaroonKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> MemoryKeyStore {
        MemoryKeyStore::default()
    }
}

impl RootKeyStore for MemoryKeyStore {
    fn root_key(&self) -> BakeryResult<(MacaroonKey, Vec<u8>)> {
        let key = MacaroonKey::generate_random();
        let id = uuid::Uuid::new_v4().as_bytes().to_vec();
        self.keys
            .lock()
            .map_err(|_| BakeryError::AuthInitError(String::from("key store poisoned")))?
            .insert(id.clone(), key);
        Ok((key, id))
    }

    fn get(&self, key_id: &[u8]) -> BakeryResult<MacaroonKey> {
        self.keys
            .lock()
            .map_err(|_| BakeryError::AuthInitError(String::from("key store poisoned")))?
            .get(key_id)
            .copied()
            .ok_or_else(|| BakeryError::AuthInitError(format!("unknown key id {:?}", key_id)))
    }
}

/// Maps a multi-op fingerprint to the operation list it stands for, so a
/// macaroon covering many operations can carry just the fingerprint.
pub trait OpsStore: Send + Sync {
    /// Stores `ops` under `fingerprint`. Insertion-once: if `fingerprint` is
    /// already present, the existing value is kept unchanged.
    fn put_ops(&self, fingerprint: &str, ops: Vec<Operation>) -> BakeryResult<()>;

    fn get_ops(&self, fingerprint: &str) -> BakeryResult<Vec<Operation>>;
}

#[derive(Default)]
pub struct MemoryOpsStore {
    ops: Mutex<HashMap<String, Vec<Operation>>>,
}

impl MemoryOpsStore {
    pub fn new() -> MemoryOpsStore {
        MemoryOpsStore::default()
    }
}

impl OpsStore for MemoryOpsStore {
    fn put_ops(&self, fingerprint: &str, ops: Vec<Operation>) -> BakeryResult<()> {
        let mut store = self
            .ops
            .lock()
            .map_err(|_| BakeryError::AuthInitError(String::from("ops store poisoned")))?;
        store.entry(fingerprint.to_string()).or_insert(ops);
        Ok(())
    }

    fn get_ops(&self, fingerprint: &str) -> BakeryResult<Vec<Operation>> {
        self.ops
            .lock()
            .map_err(|_| BakeryError::AuthInitError(String::from("ops store poisoned")))?
            .get(fingerprint)
            .cloned()
            .ok_or_else(|| {
                BakeryError::AuthInitError(format!("unknown ops fingerprint {}", fingerprint))
            })
    }
}

/// Public advertisement by a discharger: which protocol version it
/// understands and the public key third parties should encrypt caveats to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThirdPartyInfo {
    pub version: u8,
    pub public_key: PublicKey,
}

/// Looks up a discharge location's [`ThirdPartyInfo`].
pub trait ThirdPartyLocator: Send + Sync {
    fn third_party_info(&self, location: &str) -> BakeryResult<ThirdPartyInfo>;
}

fn trim_trailing_slash(location: &str) -> &str {
    location.strip_suffix('/').unwrap_or(location)
}

/// In-process locator populated directly by the caller (no HTTP lookup).
#[derive(Default)]
pub struct MemoryThirdPartyLocator {
    info: Mutex<HashMap<String, ThirdPartyInfo>>,
}

impl MemoryThirdPartyLocator {
    pub fn new() -> MemoryThirdPartyLocator {
        MemoryThirdPartyLocator::default()
    }

    pub fn add_info(&self, location: &str, info: ThirdPartyInfo) {
        if let Ok(mut map) = self.info.lock() {
            map.insert(trim_trailing_slash(location).to_string(), info);
        }
    }
}

impl ThirdPartyLocator for MemoryThirdPartyLocator {
    fn third_party_info(&self, location: &str) -> BakeryResult<ThirdPartyInfo> {
        self.info
            .lock()
            .map_err(|_| BakeryError::ThirdPartyInfoNotFound(location.to_string()))?
            .get(trim_trailing_slash(location))
            .copied()
            .ok_or_else(|| BakeryError::ThirdPartyInfoNotFound(location.to_string()))
    }
}

//! Lifetime management for locally addressable image handles
//!
//! The presentation layer never holds raw bytes; it holds `blob:` handles
//! that resolve through this registry. Each slot has at most one live handle,
//! publishing into an occupied slot revokes the old one, and dropping the
//! manager revokes whatever is still live.

use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetSlot {
    Preview,
    Result,
}

impl fmt::Display for AssetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetSlot::Preview => f.write_str("preview"),
            AssetSlot::Result => f.write_str("result"),
        }
    }
}

/// Revocable reference to bytes registered with a [`ResultAssetManager`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetHandle {
    id: Uuid,
    slot: AssetSlot,
}

impl AssetHandle {
    pub fn slot(&self) -> AssetSlot {
        self.slot
    }

    pub fn url(&self) -> String {
        format!("blob:local/{}", self.id)
    }
}

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

struct Registration {
    bytes: Arc<[u8]>,
    media_type: String,
}

/// Running totals used to check that every handle is released exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetLedger {
    pub published: usize,
    pub revoked: usize,
}

impl AssetLedger {
    pub fn live(&self) -> usize {
        self.published - self.revoked
    }
}

/// Shared view of a manager's ledger that outlives the manager itself.
#[derive(Clone, Default)]
pub struct LedgerProbe(Arc<Mutex<AssetLedger>>);

impl LedgerProbe {
    pub fn snapshot(&self) -> AssetLedger {
        *self.0.lock().unwrap()
    }

    fn record(&self, update: impl FnOnce(&mut AssetLedger)) {
        update(&mut self.0.lock().unwrap());
    }
}

#[derive(Default)]
pub struct ResultAssetManager {
    registry: HashMap<Uuid, Registration>,
    current: HashMap<AssetSlot, AssetHandle>,
    ledger: LedgerProbe,
}

impl ResultAssetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under a new handle, retiring the slot's previous handle.
    pub fn publish(
        &mut self,
        slot: AssetSlot,
        bytes: Arc<[u8]>,
        media_type: impl Into<String>,
    ) -> AssetHandle {
        self.retire(slot);

        let handle = AssetHandle {
            id: Uuid::new_v4(),
            slot,
        };
        self.registry.insert(
            handle.id,
            Registration {
                bytes,
                media_type: media_type.into(),
            },
        );
        self.current.insert(slot, handle.clone());
        self.ledger.record(|l| l.published += 1);

        tracing::debug!("Published {} handle {}", slot, handle);
        handle
    }

    pub fn revoke(&mut self, handle: &AssetHandle) -> Result<()> {
        if self.registry.remove(&handle.id).is_none() {
            return Err(Error::UnknownAsset(handle.url()));
        }
        if self.current.get(&handle.slot) == Some(handle) {
            self.current.remove(&handle.slot);
        }
        self.ledger.record(|l| l.revoked += 1);

        tracing::debug!("Revoked {} handle {}", handle.slot, handle);
        Ok(())
    }

    /// Revoke the live handle in `slot`, if any.
    pub fn retire(&mut self, slot: AssetSlot) {
        if let Some(previous) = self.current.get(&slot).cloned() {
            if let Err(e) = self.revoke(&previous) {
                tracing::warn!("Failed to retire {} handle: {}", slot, e);
            }
        }
    }

    pub fn retire_all(&mut self) {
        self.retire(AssetSlot::Preview);
        self.retire(AssetSlot::Result);
    }

    pub fn current(&self, slot: AssetSlot) -> Option<&AssetHandle> {
        self.current.get(&slot)
    }

    pub fn resolve(&self, handle: &AssetHandle) -> Option<&[u8]> {
        self.registry.get(&handle.id).map(|r| &*r.bytes)
    }

    pub fn media_type(&self, handle: &AssetHandle) -> Option<&str> {
        self.registry.get(&handle.id).map(|r| r.media_type.as_str())
    }

    pub fn is_live(&self, handle: &AssetHandle) -> bool {
        self.registry.contains_key(&handle.id)
    }

    pub fn ledger(&self) -> AssetLedger {
        self.ledger.snapshot()
    }

    pub fn ledger_probe(&self) -> LedgerProbe {
        self.ledger.clone()
    }
}

impl Drop for ResultAssetManager {
    fn drop(&mut self) {
        let live = self.registry.len();
        if live > 0 {
            tracing::debug!("Revoking {} live handle(s) on teardown", live);
        }
        self.registry.clear();
        self.current.clear();
        self.ledger.record(|l| l.revoked += live);
    }
}

//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Per-instance operation serialization."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per instance name. Different names never contend.
#[derive(Debug, Default)]
pub struct InstanceLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InstanceLocks {
    /// Empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `instance`; released when the guard drops.
    pub async fn acquire(&self, instance: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            slots
                .entry(instance.to_owned())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    /// Drop the slot of a deleted instance once nobody holds it.
    pub fn forget(&self, instance: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(instance) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(instance);
            }
        }
    }
}

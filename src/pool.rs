//! Named pools of exclusive test resources.
//!
//! A pool maps a context (for example `"tomcat-instances"`) to an ordered list of resources,
//! each free or taken. Allocation is a test-and-set under one mutex. Owners must release what
//! they take; nothing is reclaimed automatically.
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, OnceLock},
};

use tracing::{debug, warn};

#[derive(Debug)]
struct Slot {
    name: String,
    free: bool,
}

/// Thread-safe registry of allocatable resources.
#[derive(Debug, Default)]
pub struct ResourcePool {
    contexts: Mutex<HashMap<String, Vec<Slot>>>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Vec<Slot>>> {
        // The table holds plain flags, so state behind a poisoned lock is still consistent.
        self.contexts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `name` under `context`. Adding a resource that already exists is a no-op and
    /// leaves its current availability untouched.
    pub fn add(&self, context: &str, name: &str, initially_free: bool) {
        let mut table = self.table();
        let slots = table.entry(context.to_string()).or_default();
        if slots.iter().any(|slot| slot.name == name) {
            debug!("Resource '{name}' already registered in '{context}'");
            return;
        }
        slots.push(Slot {
            name: name.to_string(),
            free: initially_free,
        });
    }

    /// Claims the first free resource in registration order.
    pub fn allocate_any(&self, context: &str) -> Option<String> {
        let mut table = self.table();
        let slot = table
            .get_mut(context)?
            .iter_mut()
            .find(|slot| slot.free)?;
        slot.free = false;
        debug!("Allocated '{}' from '{context}'", slot.name);
        Some(slot.name.clone())
    }

    /// Claims `name` if it is registered and free. Returns whether this call took it.
    pub fn allocate(&self, context: &str, name: &str) -> bool {
        let mut table = self.table();
        match table
            .get_mut(context)
            .and_then(|slots| slots.iter_mut().find(|slot| slot.name == name))
        {
            Some(slot) if slot.free => {
                slot.free = false;
                debug!("Allocated '{name}' from '{context}'");
                true
            }
            Some(_) => false,
            None => {
                warn!("Resource '{name}' is not registered in '{context}'");
                false
            }
        }
    }

    /// Marks `name` free again. Releasing an unknown resource is logged and ignored.
    pub fn release(&self, context: &str, name: &str) {
        let mut table = self.table();
        match table
            .get_mut(context)
            .and_then(|slots| slots.iter_mut().find(|slot| slot.name == name))
        {
            Some(slot) => {
                if slot.free {
                    debug!("Resource '{name}' in '{context}' was already free");
                }
                slot.free = true;
            }
            None => warn!("Cannot release unknown resource '{name}' in '{context}'"),
        }
    }

    /// Unregisters `name`. Returns whether it existed.
    pub fn remove(&self, context: &str, name: &str) -> bool {
        let mut table = self.table();
        let Some(slots) = table.get_mut(context) else {
            return false;
        };
        let before = slots.len();
        slots.retain(|slot| slot.name != name);
        let removed = slots.len() != before;
        if slots.is_empty() {
            table.remove(context);
        }
        removed
    }

    /// Free resources in `context`, in registration order.
    pub fn available(&self, context: &str) -> Vec<String> {
        self.table()
            .get(context)
            .map(|slots| {
                slots
                    .iter()
                    .filter(|slot| slot.free)
                    .map(|slot| slot.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Process-wide pool, created on first use.
pub fn global() -> &'static ResourcePool {
    static POOL: OnceLock<ResourcePool> = OnceLock::new();
    POOL.get_or_init(ResourcePool::new)
}

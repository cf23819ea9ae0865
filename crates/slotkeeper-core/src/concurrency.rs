use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

type Slot = Arc<(Mutex<bool>, Condvar)>;

/// Exclusive locks keyed by string, one per occurrence.
///
/// Holders of different keys never wait on each other; the map itself is
/// only locked to look up or prune a slot. A slot is dropped from the map
/// once nobody holds or waits for it.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

/// Held key; released on drop.
pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    slot: Slot,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.to_owned()).or_default())
    }

    /// Block until `key` is free, then hold it.
    pub fn lock(&self, key: &str) -> KeyGuard<'_> {
        let slot = self.slot(key);
        {
            let (held, freed) = &*slot;
            let mut busy = held.lock().unwrap_or_else(PoisonError::into_inner);
            while *busy {
                busy = freed.wait(busy).unwrap_or_else(PoisonError::into_inner);
            }
            *busy = true;
        }
        KeyGuard {
            owner: self,
            key: key.to_owned(),
            slot,
        }
    }

    /// Hold `key` if it is free right now.
    pub fn try_lock(&self, key: &str) -> Option<KeyGuard<'_>> {
        let slot = self.slot(key);
        {
            let (held, _) = &*slot;
            let mut busy = held.lock().unwrap_or_else(PoisonError::into_inner);
            if *busy {
                drop(busy);
                self.prune(key, &slot);
                return None;
            }
            *busy = true;
        }
        Some(KeyGuard {
            owner: self,
            key: key.to_owned(),
            slot,
        })
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn prune(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held by the caller.
        if Arc::strong_count(slot) == 2 {
            slots.remove(key);
        }
    }
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        {
            let (held, freed) = &*self.slot;
            *held.lock().unwrap_or_else(PoisonError::into_inner) = false;
            freed.notify_one();
        }
        self.owner.prune(&self.key, &self.slot);
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// First Ctrl-C asks long batches to stop between items; the second exits.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, finishing current reservation...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

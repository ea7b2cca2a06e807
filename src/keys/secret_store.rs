// Side table from private key handle identity to secret material
// Handles carry a generation-checked slot reference, never the secret itself

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use zeroize::Zeroizing;

use super::secure_buffer::SecureBuffer;
use crate::codec::WireText;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Where a handle's secret lives. Only meaningful to the store that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotRef {
    store: u64,
    index: usize,
    generation: u32,
}

struct Slot {
    generation: u32,
    secret: Option<SecureBuffer>,
}

#[derive(Default)]
struct Slots {
    entries: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

/// Arena of private key material addressed by handle identity.
///
/// Entries are released when the last clone of the owning handle drops.
/// The lease only points back at the store weakly, so a store dropped
/// first simply takes its secrets with it.
pub struct SecretStore {
    id: u64,
    slots: RwLock<Slots>,
}

/// Ownership token for one store entry, shared by clones of a handle
pub(crate) struct SecretLease {
    slot: SlotRef,
    store: Weak<SecretStore>,
}

impl SecretLease {
    pub(crate) fn slot(&self) -> SlotRef {
        self.slot
    }
}

impl Drop for SecretLease {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.release(self.slot);
        }
    }
}

impl SecretStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            slots: RwLock::new(Slots::default()),
        })
    }

    /// Store `secret` and hand back the lease that keeps it alive
    pub(crate) fn register(self: &Arc<Self>, secret: &[u8]) -> Arc<SecretLease> {
        let mut slots = self.slots.write();
        let buffer = SecureBuffer::from_slice(secret);

        let (index, generation) = match slots.free.pop() {
            Some(index) => {
                let slot = &mut slots.entries[index];
                slot.generation = slot.generation.wrapping_add(1);
                slot.secret = Some(buffer);
                (index, slot.generation)
            }
            None => {
                slots.entries.push(Slot {
                    generation: 0,
                    secret: Some(buffer),
                });
                (slots.entries.len() - 1, 0)
            }
        };
        slots.live += 1;

        Arc::new(SecretLease {
            slot: SlotRef {
                store: self.id,
                index,
                generation,
            },
            store: Arc::downgrade(self),
        })
    }

    /// Secret material for `slot` as wire text, if the slot is still live
    pub(crate) fn lookup(&self, slot: SlotRef) -> Option<Zeroizing<WireText>> {
        if slot.store != self.id {
            return None;
        }

        let slots = self.slots.read();
        let entry = slots.entries.get(slot.index)?;
        if entry.generation != slot.generation {
            return None;
        }

        entry
            .secret
            .as_ref()
            .map(|secret| Zeroizing::new(WireText::encode(secret.as_slice())))
    }

    fn release(&self, slot: SlotRef) {
        let mut slots = self.slots.write();
        let Some(entry) = slots.entries.get_mut(slot.index) else {
            return;
        };
        if entry.generation != slot.generation || entry.secret.is_none() {
            return;
        }

        entry.secret = None;
        slots.free.push(slot.index);
        slots.live -= 1;
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.slots.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

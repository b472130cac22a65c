use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use automix_host::{Class, ClassId};
use parking_lot::Mutex;

/// What happened when a reserved class was handed to the script environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The bind task has not run yet
    Pending,
    /// `execute_bind` was called and succeeded
    Bound,
    /// `execute_bind` was called and reported failure
    Failed,
    /// No bind call was made (empty module path, no default instance, class gone, listener
    /// shut down, or the class was released first)
    Skipped,
}

/// Claim on a class recorded in the processed-class cache.
///
/// Holds only a weak handle to the class; the host decides when the class goes away.
pub struct Reservation {
    id: ClassId,
    name: String,
    class: Weak<Class>,
    outcome: Mutex<BindOutcome>,
    released: AtomicBool,
}

impl Reservation {
    fn new(class: &Arc<Class>) -> Self {
        Self {
            id: class.id(),
            name: class.name().to_string(),
            class: Arc::downgrade(class),
            outcome: Mutex::new(BindOutcome::Pending),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Class name captured at reservation time, usable after the class is gone
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upgrade the weak handle; `None` once the host has dropped the class
    pub fn class(&self) -> Option<Arc<Class>> {
        self.class.upgrade()
    }

    pub fn outcome(&self) -> BindOutcome {
        *self.outcome.lock()
    }

    pub(crate) fn record(&self, outcome: BindOutcome) {
        *self.outcome.lock() = outcome;
    }

    /// True when a bind call was actually issued, whatever its result
    pub fn bind_attempted(&self) -> bool {
        matches!(self.outcome(), BindOutcome::Bound | BindOutcome::Failed)
    }

    /// Whether the class has left the cache (deleted, pruned or abandoned at shutdown)
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn mark_released(&self) {
        self.released.store(true, Ordering::Release);
    }
}

/// Set of classes that currently have a bind issued and no unbind yet.
///
/// Every test-and-set / test-and-clear happens under one lock, and nothing calls into the
/// host or the script environment while it is held.
#[derive(Default)]
pub struct ProcessedClassCache {
    entries: Mutex<HashMap<ClassId, Arc<Reservation>>>,
}

impl ProcessedClassCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `class`. Returns the new reservation, or `None` if the class was already claimed.
    pub fn try_reserve(&self, class: &Arc<Class>) -> Option<Arc<Reservation>> {
        let mut entries = self.entries.lock();
        match entries.entry(class.id()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let reservation = Arc::new(Reservation::new(class));
                slot.insert(reservation.clone());
                Some(reservation)
            }
        }
    }

    /// Drop the claim on `id`. Returns the reservation if the class had been claimed.
    pub fn try_release(&self, id: ClassId) -> Option<Arc<Reservation>> {
        let reservation = self.entries.lock().remove(&id)?;
        reservation.mark_released();
        Some(reservation)
    }

    /// Undo `reservation` when its bind could not be issued.
    ///
    /// Only removes the entry if it is still this exact reservation.
    pub fn rollback(&self, reservation: &Arc<Reservation>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&reservation.id()) {
            Some(current) if Arc::ptr_eq(current, reservation) => {
                entries.remove(&reservation.id());
                reservation.mark_released();
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: ClassId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every entry, returning how many were dropped
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        for (_, reservation) in &drained {
            reservation.mark_released();
        }
        drained.len()
    }

    /// Remove entries whose class disappeared without a deletion notification
    pub fn prune_stale(&self) -> usize {
        let mut pruned = 0;
        self.entries.lock().retain(|_, reservation| {
            if reservation.class.strong_count() > 0 {
                true
            } else {
                reservation.mark_released();
                pruned += 1;
                false
            }
        });
        pruned
    }
}

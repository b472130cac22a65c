use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use automix_host::{HostRuntime, LifecycleListener, ListenerHandle, ObjectIndex, ObjectRef};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::cache::{BindOutcome, ProcessedClassCache, Reservation};
use crate::capability;
use crate::config::{ListenerConfig, UnbindPolicy};
use crate::dispatcher::{Dispatch, Dispatcher};
use crate::environment::ScriptEnvironment;

/// The environment bound by one `initialize` call.
///
/// Tasks remember the epoch they were submitted under and only ever reach the environment of
/// that same session.
struct Session {
    epoch: u64,
    environment: Weak<dyn ScriptEnvironment>,
}

/// Result of a catch-up scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Qualifying classes that were not yet processed and got reserved
    pub reserved: usize,
    pub bound: usize,
    pub failed: usize,
    /// Reserved but not bound (empty module path, no default instance, or the bind could not
    /// be queued and the reservation was rolled back)
    pub skipped: usize,
    /// Handed to the owning thread because the scan ran elsewhere
    pub deferred: usize,
    /// Stale cache entries for classes that vanished without a deletion notification
    pub pruned: usize,
}

/// Mixes script modules into host classes as their objects come and go.
///
/// Created once per process with [`MixinListener::new`] and passed to whoever drives the
/// host; there is no global instance. Between `initialize` and `shutdown` it is subscribed to
/// the host's lifecycle notifications.
pub struct MixinListener {
    host: Arc<dyn HostRuntime>,
    dispatcher: Dispatcher,
    config: ListenerConfig,
    cache: ProcessedClassCache,
    active: AtomicBool,
    session: RwLock<Option<Session>>,
    subscription: Mutex<Option<ListenerHandle>>,
    next_epoch: AtomicU64,
    self_ref: Weak<MixinListener>,
}

impl MixinListener {
    pub fn new(
        host: Arc<dyn HostRuntime>,
        dispatcher: Dispatcher,
        config: ListenerConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            host,
            dispatcher,
            config,
            cache: ProcessedClassCache::new(),
            active: AtomicBool::new(false),
            session: RwLock::new(None),
            subscription: Mutex::new(None),
            next_epoch: AtomicU64::new(0),
            self_ref: self_ref.clone(),
        })
    }

    /// Bind to `environment` and subscribe to host notifications. No-op if already initialized.
    ///
    /// The listener keeps only a weak reference to the environment.
    pub fn initialize(&self, environment: &Arc<dyn ScriptEnvironment>) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            debug!(target: "automix", "Listener already initialized");
            return;
        }

        if !self.config.enabled {
            info!(target: "automix", "Auto mixin disabled by configuration");
            return;
        }

        let Some(this) = self.self_ref.upgrade() else {
            return;
        };

        // Entries left behind by notifications racing the previous shutdown
        self.cache.clear();

        let epoch = self.next_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        *self.session.write() = Some(Session {
            epoch,
            environment: Arc::downgrade(environment),
        });
        self.active.store(true, Ordering::Release);
        *subscription = Some(self.host.add_lifecycle_listener(this));
        drop(subscription);

        info!(target: "automix", "Auto mixin listener initialized");

        if self.config.scan_on_initialize {
            self.scan_existing_objects();
        }
    }

    /// Unsubscribe, forget every processed class, then drop the environment reference.
    ///
    /// Safe to call repeatedly or without `initialize`. Tasks still queued on the owning
    /// thread become no-ops.
    pub fn shutdown(&self) {
        let mut subscription = self.subscription.lock();
        let Some(handle) = subscription.take() else {
            return;
        };

        self.active.store(false, Ordering::Release);
        self.host.remove_lifecycle_listener(handle);

        let abandoned = self.cache.clear();
        *self.session.write() = None;
        drop(subscription);

        if self.config.log_abandoned && abandoned > 0 {
            info!(target: "automix", "Abandoned {} class binding(s) at shutdown", abandoned);
        }
        info!(target: "automix", "Auto mixin listener shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Number of classes currently marked as processed
    pub fn processed_class_count(&self) -> usize {
        self.cache.len()
    }

    pub fn is_processed(&self, class: automix_host::ClassId) -> bool {
        self.cache.contains(class)
    }

    /// Bind every qualifying class the host already knows about.
    ///
    /// Classes are bound synchronously when called on the owning thread; from any other
    /// thread the binds are queued for it instead. Calling it again binds nothing new.
    pub fn scan_existing_objects(&self) -> ScanReport {
        let mut report = ScanReport::default();
        let Some(epoch) = self.current_epoch() else {
            return report;
        };

        report.pruned = self.cache.prune_stale();
        let inline = self.dispatcher.is_owning_thread();

        for class in self.host.classes() {
            if !capability::qualifies(self.host.as_ref(), &class) {
                continue;
            }
            let Some(reservation) = self.cache.try_reserve(&class) else {
                continue;
            };
            report.reserved += 1;

            if inline {
                match self.bind_reserved(epoch, &reservation) {
                    BindOutcome::Bound => report.bound += 1,
                    BindOutcome::Failed => report.failed += 1,
                    BindOutcome::Skipped | BindOutcome::Pending => report.skipped += 1,
                }
            } else if self.submit_bind(epoch, reservation.clone()) == Dispatch::Dropped {
                self.cache.rollback(&reservation);
                report.skipped += 1;
            } else {
                report.deferred += 1;
            }
        }

        if report.bound > 0 {
            info!(target: "automix", "Scanned {} existing classes", report.bound);
        }
        if report.deferred > 0 {
            debug!(target: "automix", "Deferred {} scanned class(es) to the owning thread", report.deferred);
        }
        report
    }

    fn current_epoch(&self) -> Option<u64> {
        self.session.read().as_ref().map(|session| session.epoch)
    }

    /// Environment for `epoch`, if that session is still the live one
    fn environment_for(&self, epoch: u64) -> Option<Arc<dyn ScriptEnvironment>> {
        let session = self.session.read();
        match session.as_ref() {
            Some(session) if session.epoch == epoch => session.environment.upgrade(),
            _ => None,
        }
    }

    fn submit_bind(&self, epoch: u64, reservation: Arc<Reservation>) -> Dispatch {
        let listener = self.self_ref.clone();
        self.dispatcher.run_on_owning_thread(move || {
            if let Some(listener) = listener.upgrade() {
                listener.bind_reserved(epoch, &reservation);
            }
        })
    }

    fn submit_unbind(&self, epoch: u64, reservation: Arc<Reservation>) -> Dispatch {
        let listener = self.self_ref.clone();
        self.dispatcher.run_on_owning_thread(move || {
            if let Some(listener) = listener.upgrade() {
                listener.unbind_released(epoch, &reservation);
            }
        })
    }

    /// Resolve and bind a reserved class. Runs on the owning thread.
    fn bind_reserved(&self, epoch: u64, reservation: &Reservation) -> BindOutcome {
        let outcome = self.try_bind(epoch, reservation);
        reservation.record(outcome);
        outcome
    }

    fn try_bind(&self, epoch: u64, reservation: &Reservation) -> BindOutcome {
        let Some(environment) = self.environment_for(epoch) else {
            trace!(target: "automix", "Skipping mixin for {}: listener shut down", reservation.name());
            return BindOutcome::Skipped;
        };
        if reservation.is_released() {
            trace!(target: "automix", "Skipping mixin for {}: released before bind", reservation.name());
            return BindOutcome::Skipped;
        }
        let Some(class) = reservation.class() else {
            trace!(target: "automix", "Skipping mixin for {}: class gone", reservation.name());
            return BindOutcome::Skipped;
        };

        let module_path = capability::resolve_module_path(self.host.as_ref(), &class);
        if module_path.is_empty() {
            debug!(target: "automix", "No mixin module for {}", class.name());
            return BindOutcome::Skipped;
        }

        if environment.execute_bind(&class, &module_path) {
            info!(target: "automix", "Mixin: {} -> {}", module_path, class.name());
            BindOutcome::Bound
        } else {
            warn!(target: "automix", "Mixin failed: {} -> {}", module_path, class.name());
            BindOutcome::Failed
        }
    }

    /// Unbind a released class. Runs on the owning thread.
    fn unbind_released(&self, epoch: u64, reservation: &Reservation) -> bool {
        let Some(environment) = self.environment_for(epoch) else {
            trace!(target: "automix", "Skipping unmixin for {}: listener shut down", reservation.name());
            return false;
        };

        if self.config.unbind_policy == UnbindPolicy::Attempted && !reservation.bind_attempted() {
            debug!(target: "automix", "Skipping unmixin for {}: never bound", reservation.name());
            return false;
        }

        let success = environment.execute_unbind(reservation.id(), reservation.name());
        if success {
            info!(target: "automix", "Unmixin: {}", reservation.name());
        } else {
            warn!(target: "automix", "Unmixin failed: {}", reservation.name());
        }
        success
    }
}

impl LifecycleListener for MixinListener {
    fn notify_created(&self, object: &ObjectRef, _index: ObjectIndex) {
        if !self.is_initialized() {
            return;
        }

        let Some(class) = self.host.class_of(object) else {
            return;
        };
        if !capability::qualifies(self.host.as_ref(), &class) {
            return;
        }

        let Some(reservation) = self.cache.try_reserve(&class) else {
            return;
        };
        let Some(epoch) = self.current_epoch() else {
            return;
        };

        trace!(target: "automix", "Reserved {} on creation of {}", class.name(), object.name());
        if self.submit_bind(epoch, reservation.clone()) == Dispatch::Dropped {
            // No bind will follow; let a later creation claim the class again
            self.cache.rollback(&reservation);
        }
    }

    fn notify_deleted(&self, object: &ObjectRef, _index: ObjectIndex) {
        if !self.is_initialized() {
            return;
        }

        let Some(class) = object.as_class() else {
            return;
        };
        let Some(reservation) = self.cache.try_release(class.id()) else {
            return;
        };
        let Some(epoch) = self.current_epoch() else {
            return;
        };

        trace!(target: "automix", "Released {}", class.name());
        self.submit_unbind(epoch, reservation);
    }

    fn on_registry_shutdown(&self) {
        self.shutdown();
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::object::{Class, ClassDescriptor, ClassId, Instance, ObjectIndex, ObjectRef};
use crate::runtime::{HostRuntime, LifecycleListener, ListenerHandle};

#[derive(Default)]
struct RegistryState {
    classes: BTreeMap<ClassId, Arc<Class>>,
    instances: HashMap<ObjectIndex, Arc<Instance>>,
}

/// In-memory host runtime.
///
/// Lifecycle notifications are delivered on the calling thread, after the registry's own
/// locks have been released, so listeners may call back into the registry.
pub struct ObjectRegistry {
    state: RwLock<RegistryState>,
    listeners: RwLock<Vec<(ListenerHandle, Arc<dyn LifecycleListener>)>>,
    next_class_id: AtomicU64,
    next_index: AtomicU32,
    next_listener: AtomicU64,
    shut_down: AtomicBool,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            listeners: RwLock::new(Vec::new()),
            next_class_id: AtomicU64::new(1),
            next_index: AtomicU32::new(0),
            next_listener: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    fn allocate_index(&self) -> ObjectIndex {
        ObjectIndex::new(self.next_index.fetch_add(1, Ordering::Relaxed))
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn LifecycleListener>> {
        self.listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    fn broadcast_created(&self, object: ObjectRef) {
        let index = object.index();
        for listener in self.listeners_snapshot() {
            listener.notify_created(&object, index);
        }
    }

    fn broadcast_deleted(&self, object: ObjectRef) {
        let index = object.index();
        for listener in self.listeners_snapshot() {
            listener.notify_deleted(&object, index);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Register a class, then create its default instance if the descriptor asks for one.
    ///
    /// Listeners see the class object first and the default instance second, the same order
    /// a runtime loading a class would report them.
    pub fn register_class(&self, descriptor: ClassDescriptor) -> Option<Arc<Class>> {
        if self.is_shut_down() {
            return None;
        }

        let id = ClassId::new(self.next_class_id.fetch_add(1, Ordering::Relaxed));
        let class = Arc::new(Class::new(
            id,
            self.allocate_index(),
            descriptor.name,
            descriptor.mixin,
        ));
        self.state.write().classes.insert(id, class.clone());
        debug!(target: "host", "Registered class {} ({})", class.name(), id);
        self.broadcast_created(ObjectRef::Class(class.clone()));

        if descriptor.default_instance {
            let name = format!("Default__{}", class.name());
            let instance = Arc::new(Instance::new(self.allocate_index(), name, class.clone()));
            class.set_default_instance(instance.clone());
            self.broadcast_created(ObjectRef::Instance(instance));
        }

        Some(class)
    }

    /// Create a new instance of a live class
    pub fn spawn_instance(&self, class: &Arc<Class>) -> Option<Arc<Instance>> {
        if self.is_shut_down() {
            return None;
        }

        let index = self.allocate_index();
        let instance = Arc::new(Instance::new(
            index,
            format!("{}_{}", class.name(), index.raw()),
            class.clone(),
        ));
        {
            let mut state = self.state.write();
            if !state.classes.contains_key(&class.id()) {
                return None;
            }
            state.instances.insert(index, instance.clone());
        }
        self.broadcast_created(ObjectRef::Instance(instance.clone()));
        Some(instance)
    }

    /// Destroy an instance; returns false if it was not live
    pub fn destroy_instance(&self, instance: &Arc<Instance>) -> bool {
        if self.state.write().instances.remove(&instance.index()).is_none() {
            return false;
        }
        self.broadcast_deleted(ObjectRef::Instance(instance.clone()));
        true
    }

    /// Destroy a class along with its default instance.
    ///
    /// Instances spawned from the class stay alive until destroyed themselves.
    pub fn destroy_class(&self, class: &Arc<Class>) -> bool {
        if self.state.write().classes.remove(&class.id()).is_none() {
            return false;
        }

        if let Some(default_instance) = class.take_default_instance() {
            self.broadcast_deleted(ObjectRef::Instance(default_instance));
        }
        debug!(target: "host", "Destroying class {} ({})", class.name(), class.id());
        self.broadcast_deleted(ObjectRef::Class(class.clone()));
        true
    }

    pub fn class_by_name(&self, name: &str) -> Option<Arc<Class>> {
        self.state
            .read()
            .classes
            .values()
            .find(|class| class.name() == name)
            .cloned()
    }

    pub fn class_count(&self) -> usize {
        self.state.read().classes.len()
    }

    pub fn instance_count(&self) -> usize {
        self.state.read().instances.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Tear the registry down, telling every listener before dropping them.
    ///
    /// Objects still registered are released without deletion notifications.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let listeners = std::mem::take(&mut *self.listeners.write());
        debug!(target: "host", "Registry shutting down, notifying {} listener(s)", listeners.len());
        for (_, listener) in listeners {
            listener.on_registry_shutdown();
        }

        let mut state = self.state.write();
        for class in state.classes.values() {
            class.take_default_instance();
        }
        state.classes.clear();
        state.instances.clear();
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRuntime for ObjectRegistry {
    fn class_of(&self, object: &ObjectRef) -> Option<Arc<Class>> {
        match object {
            ObjectRef::Instance(instance) => Some(instance.class().clone()),
            // Metaclasses are not modelled
            ObjectRef::Class(_) => None,
        }
    }

    fn classes(&self) -> Vec<Arc<Class>> {
        self.state.read().classes.values().cloned().collect()
    }

    fn add_lifecycle_listener(&self, listener: Arc<dyn LifecycleListener>) -> ListenerHandle {
        let handle = ListenerHandle::new(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((handle, listener));
        handle
    }

    fn remove_lifecycle_listener(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != handle);
        listeners.len() != before
    }
}

use std::sync::Arc;

use crate::object::{Class, Instance, ObjectIndex, ObjectRef};

/// Receives object creation and deletion notifications from the host.
///
/// Notifications may be delivered on any thread, concurrently.
pub trait LifecycleListener: Send + Sync {
    /// Called once per object after it has been constructed
    fn notify_created(&self, object: &ObjectRef, index: ObjectIndex);

    /// Called once per object before it is torn down, including class objects
    fn notify_deleted(&self, object: &ObjectRef, index: ObjectIndex);

    /// Called when the host's object table is being torn down
    fn on_registry_shutdown(&self);
}

/// Token returned when a listener is registered, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Reflection and subscription facilities of the host runtime
pub trait HostRuntime: Send + Sync {
    /// Class of an object; `None` for objects without a reflected class
    fn class_of(&self, object: &ObjectRef) -> Option<Arc<Class>>;

    /// Whether `class` implements the mixin capability
    fn implements_capability(&self, class: &Class) -> bool {
        class.implements_mixin()
    }

    /// The class's default instance
    fn default_instance(&self, class: &Class) -> Option<Arc<Instance>> {
        class.default_instance()
    }

    /// Every class currently alive in the host
    fn classes(&self) -> Vec<Arc<Class>>;

    fn add_lifecycle_listener(&self, listener: Arc<dyn LifecycleListener>) -> ListenerHandle;

    /// Returns false if the handle was not registered
    fn remove_lifecycle_listener(&self, handle: ListenerHandle) -> bool;
}

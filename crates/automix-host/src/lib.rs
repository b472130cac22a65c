/// Host object model consumed by the automix listener
///
/// This crate defines the boundary between the listener and the runtime that owns objects:
/// class and instance handles, the opt-in mixin capability, lifecycle notifications, and the
/// reflection queries the listener needs. `ObjectRegistry` is an in-memory runtime implementing
/// that boundary, used by the demo driver and the tests.
pub mod object;
pub mod registry;
pub mod runtime;

pub use object::{
    Class, ClassDescriptor, ClassId, Instance, MixinInterface, ObjectIndex, ObjectRef,
    StaticModulePath,
};
pub use registry::ObjectRegistry;
pub use runtime::{HostRuntime, LifecycleListener, ListenerHandle};

/// Automatic mixin binding for host classes
///
/// `MixinListener` watches the host's object lifecycle notifications. The first time an
/// object of a class implementing the mixin capability is created, the class's module path
/// is resolved and bound in the script environment; when the class itself is destroyed the
/// binding is removed. Script calls only ever happen on the owning thread, reached through a
/// `Dispatcher`.
pub mod cache;
pub mod capability;
pub mod config;
pub mod dispatcher;
pub mod environment;
pub mod listener;

pub use cache::{BindOutcome, ProcessedClassCache, Reservation};
pub use config::{ConfigError, ListenerConfig, UnbindPolicy};
pub use dispatcher::{
    owning_thread_queue, spawn_owning_thread, Dispatch, DispatchError, Dispatcher, Task,
    TaskQueue,
};
pub use environment::ScriptEnvironment;
pub use listener::{MixinListener, ScanReport};

use std::sync::Arc;

use automix_host::{Class, ClassId};

/// The embedded script environment that mixins are bound into.
///
/// Only ever called on the owning thread. Implementations report failure by returning
/// `false`; the listener logs it and moves on.
pub trait ScriptEnvironment: Send + Sync {
    /// Mix the module at `module_path` into `class`
    fn execute_bind(&self, class: &Arc<Class>, module_path: &str) -> bool;

    /// Remove whatever was mixed into the class.
    ///
    /// Called while the class is being destroyed, so only its identity and name are given.
    fn execute_unbind(&self, class: ClassId, class_name: &str) -> bool;
}

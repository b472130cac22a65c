use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Stable identity of a host class. The host never reuses an id within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Slot index of an object in the host's object table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIndex(u32);

impl ObjectIndex {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Capability a class implements to have a script module mixed into it.
///
/// Classes opt in by overriding `module_path` to return a non-empty module path, such as
/// `"Game/Actors/MyActor"`. The default implementation returns an empty string, which means
/// "no binding" even though the class carries the capability.
pub trait MixinInterface: Send + Sync {
    /// Module path to bind, queried on the class's default instance
    fn module_path(&self, _instance: &Instance) -> String {
        String::new()
    }
}

/// Mixin capability returning the same module path for every instance
#[derive(Debug, Clone, Default)]
pub struct StaticModulePath(String);

impl StaticModulePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl MixinInterface for StaticModulePath {
    fn module_path(&self, _instance: &Instance) -> String {
        self.0.clone()
    }
}

/// Everything needed to register a class with the registry
pub struct ClassDescriptor {
    pub(crate) name: String,
    pub(crate) mixin: Option<Arc<dyn MixinInterface>>,
    pub(crate) default_instance: bool,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mixin: None,
            default_instance: true,
        }
    }

    /// Implement the mixin capability with a custom accessor
    pub fn with_mixin(mut self, mixin: impl MixinInterface + 'static) -> Self {
        self.mixin = Some(Arc::new(mixin));
        self
    }

    /// Implement the mixin capability with a fixed module path (may be empty)
    pub fn with_module_path(self, path: impl Into<String>) -> Self {
        self.with_mixin(StaticModulePath::new(path))
    }

    /// Register the class without creating its default instance
    pub fn without_default_instance(mut self) -> Self {
        self.default_instance = false;
        self
    }
}

/// A class known to the host
pub struct Class {
    id: ClassId,
    index: ObjectIndex,
    name: String,
    mixin: Option<Arc<dyn MixinInterface>>,
    default_instance: RwLock<Option<Arc<Instance>>>,
}

impl Class {
    pub(crate) fn new(
        id: ClassId,
        index: ObjectIndex,
        name: String,
        mixin: Option<Arc<dyn MixinInterface>>,
    ) -> Self {
        Self {
            id,
            index,
            name,
            mixin,
            default_instance: RwLock::new(None),
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn index(&self) -> ObjectIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mixin(&self) -> Option<&Arc<dyn MixinInterface>> {
        self.mixin.as_ref()
    }

    pub fn implements_mixin(&self) -> bool {
        self.mixin.is_some()
    }

    /// The class's representative instance, if it still has one
    pub fn default_instance(&self) -> Option<Arc<Instance>> {
        self.default_instance.read().clone()
    }

    pub(crate) fn set_default_instance(&self, instance: Arc<Instance>) {
        *self.default_instance.write() = Some(instance);
    }

    pub(crate) fn take_default_instance(&self) -> Option<Arc<Instance>> {
        self.default_instance.write().take()
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("name", &self.name)
            .field("implements_mixin", &self.implements_mixin())
            .finish()
    }
}

/// An instance of a host class
#[derive(Debug)]
pub struct Instance {
    index: ObjectIndex,
    name: String,
    class: Arc<Class>,
}

impl Instance {
    pub(crate) fn new(index: ObjectIndex, name: String, class: Arc<Class>) -> Self {
        Self { index, name, class }
    }

    pub fn index(&self) -> ObjectIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }
}

/// Any object the host reports lifecycle events for
#[derive(Debug, Clone)]
pub enum ObjectRef {
    /// A class object itself
    Class(Arc<Class>),
    /// An instance of some class
    Instance(Arc<Instance>),
}

impl ObjectRef {
    pub fn index(&self) -> ObjectIndex {
        match self {
            ObjectRef::Class(class) => class.index(),
            ObjectRef::Instance(instance) => instance.index(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ObjectRef::Class(class) => class.name(),
            ObjectRef::Instance(instance) => instance.name(),
        }
    }

    /// The class this object *is*, when the object is a class
    pub fn as_class(&self) -> Option<&Arc<Class>> {
        match self {
            ObjectRef::Class(class) => Some(class),
            ObjectRef::Instance(_) => None,
        }
    }
}

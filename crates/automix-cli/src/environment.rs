use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use automix_host::{Class, ClassId};
use automix_listener::ScriptEnvironment;
use parking_lot::Mutex;
use tracing::{debug, warn};

const MODULE_EXTENSIONS: [&str; 2] = ["ts", "js"];

/// A module currently mixed into a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundModule {
    pub class_name: String,
    pub module_path: String,
    /// Script file the module path resolved to, when a script root is configured
    pub source: Option<PathBuf>,
}

/// Script environment that resolves module paths to files and tracks what is bound.
///
/// `Game/Actors/MyActor` resolves to `<root>/Game/Actors/MyActor.ts` (or `.js`). Without a
/// root every module path is accepted.
pub struct ModuleScriptEnvironment {
    script_root: Option<PathBuf>,
    bound: Mutex<BTreeMap<ClassId, BoundModule>>,
    total_binds: Mutex<usize>,
}

impl ModuleScriptEnvironment {
    pub fn new(script_root: Option<PathBuf>) -> Self {
        Self {
            script_root,
            bound: Mutex::new(BTreeMap::new()),
            total_binds: Mutex::new(0),
        }
    }

    /// Script file for `module_path`, if one exists under `root`
    pub fn resolve_module(root: &Path, module_path: &str) -> Option<PathBuf> {
        MODULE_EXTENSIONS
            .iter()
            .map(|ext| root.join(format!("{module_path}.{ext}")))
            .find(|candidate| candidate.is_file())
    }

    pub fn bound_modules(&self) -> Vec<BoundModule> {
        self.bound.lock().values().cloned().collect()
    }

    /// Classes with a module bound right now
    pub fn bound_count(&self) -> usize {
        self.bound.lock().len()
    }

    /// Successful binds since creation
    pub fn total_binds(&self) -> usize {
        *self.total_binds.lock()
    }
}

impl ScriptEnvironment for ModuleScriptEnvironment {
    fn execute_bind(&self, class: &Arc<Class>, module_path: &str) -> bool {
        let source = match &self.script_root {
            Some(root) => match Self::resolve_module(root, module_path) {
                Some(source) => Some(source),
                None => {
                    warn!(
                        "No script for module {} under {}",
                        module_path,
                        root.display()
                    );
                    return false;
                }
            },
            None => None,
        };

        let mut bound = self.bound.lock();
        if bound.contains_key(&class.id()) {
            warn!("{} already has a module bound", class.name());
            return false;
        }
        debug!("Loaded module {} for {}", module_path, class.name());
        bound.insert(
            class.id(),
            BoundModule {
                class_name: class.name().to_string(),
                module_path: module_path.to_string(),
                source,
            },
        );
        *self.total_binds.lock() += 1;
        true
    }

    fn execute_unbind(&self, class: ClassId, class_name: &str) -> bool {
        match self.bound.lock().remove(&class) {
            Some(module) => {
                debug!("Released module {} from {}", module.module_path, class_name);
                true
            }
            None => false,
        }
    }
}

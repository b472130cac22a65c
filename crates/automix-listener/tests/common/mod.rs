// Shared helpers for listener integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use automix_host::{Class, ClassId, ObjectRegistry};
use automix_listener::{
    owning_thread_queue, ListenerConfig, MixinListener, ScriptEnvironment, TaskQueue,
};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Bind { class: String, module_path: String },
    Unbind { class: String },
}

pub fn bind(class: &str, module_path: &str) -> Call {
    Call::Bind {
        class: class.to_string(),
        module_path: module_path.to_string(),
    }
}

pub fn unbind(class: &str) -> Call {
    Call::Unbind {
        class: class.to_string(),
    }
}

/// Script environment that records every call it receives
pub struct RecordingEnvironment {
    log: Arc<Mutex<Vec<Call>>>,
    owner: ThreadId,
    off_thread_calls: AtomicUsize,
    failing_modules: Mutex<HashSet<String>>,
    failing_unbinds: Mutex<HashSet<String>>,
}

impl RecordingEnvironment {
    pub fn new(owner: ThreadId) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            owner,
            off_thread_calls: AtomicUsize::new(0),
            failing_modules: Mutex::new(HashSet::new()),
            failing_unbinds: Mutex::new(HashSet::new()),
        })
    }

    /// Make binds of `module_path` report failure
    pub fn fail_binds_for(&self, module_path: &str) {
        self.failing_modules.lock().insert(module_path.to_string());
    }

    /// Make unbinds of the class named `class` report failure
    pub fn fail_unbinds_for(&self, class: &str) {
        self.failing_unbinds.lock().insert(class.to_string());
    }

    /// Handle to the call log that outlives the environment
    pub fn log(&self) -> Arc<Mutex<Vec<Call>>> {
        self.log.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().clone()
    }

    pub fn bind_count(&self, class: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::Bind { class: c, .. } if c == class))
            .count()
    }

    pub fn unbind_count(&self, class: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::Unbind { class: c } if c == class))
            .count()
    }

    pub fn off_thread_calls(&self) -> usize {
        self.off_thread_calls.load(Ordering::SeqCst)
    }

    fn check_thread(&self) {
        if thread::current().id() != self.owner {
            self.off_thread_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ScriptEnvironment for RecordingEnvironment {
    fn execute_bind(&self, class: &Arc<Class>, module_path: &str) -> bool {
        self.check_thread();
        self.log.lock().push(bind(class.name(), module_path));
        !self.failing_modules.lock().contains(module_path)
    }

    fn execute_unbind(&self, _class: ClassId, class_name: &str) -> bool {
        self.check_thread();
        self.log.lock().push(unbind(class_name));
        !self.failing_unbinds.lock().contains(class_name)
    }
}

/// Registry, listener and recording environment wired together, owned by the test thread
pub struct Fixture {
    pub registry: Arc<ObjectRegistry>,
    pub listener: Arc<MixinListener>,
    pub queue: TaskQueue,
    pub env: Arc<RecordingEnvironment>,
    pub env_handle: Arc<dyn ScriptEnvironment>,
}

impl Fixture {
    pub fn new(config: ListenerConfig) -> Self {
        let registry = Arc::new(ObjectRegistry::new());
        let (dispatcher, queue) = owning_thread_queue();
        let listener = MixinListener::new(registry.clone(), dispatcher, config);
        let env = RecordingEnvironment::new(thread::current().id());
        let env_handle: Arc<dyn ScriptEnvironment> = env.clone();
        Self {
            registry,
            listener,
            queue,
            env,
            env_handle,
        }
    }

    pub fn initialized(config: ListenerConfig) -> Self {
        let fixture = Self::new(config);
        fixture.initialize();
        fixture
    }

    pub fn initialize(&self) {
        self.listener.initialize(&self.env_handle);
    }

    pub fn pump(&mut self) -> usize {
        self.queue.pump()
    }
}

/// Run `f` on a fresh thread and wait for it
pub fn on_worker<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::spawn(f).join().expect("worker thread panicked")
}

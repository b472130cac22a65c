use std::fmt;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use automix_host::{Class, ClassDescriptor, ObjectRegistry};
use automix_listener::{owning_thread_queue, MixinListener, ScanReport, ScriptEnvironment};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::{DemoClass, DemoConfig};
use crate::environment::ModuleScriptEnvironment;

/// What happened during one demo run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DemoSummary {
    pub classes_registered: usize,
    pub instances_spawned: usize,
    /// Classes processed before any worker ran, i.e. picked up by the catch-up scan
    pub processed_at_start: usize,
    /// Report of the explicit scan, when the listener does not scan on initialize
    pub scan: Option<ScanReport>,
    /// Owning-thread tasks executed by pumping the queue
    pub tasks_run: usize,
    /// Classes with a module bound once every worker finished
    pub bound_after_spawn: usize,
    pub total_binds: usize,
    /// Modules still bound at the end of the run
    pub bound_at_exit: usize,
}

impl fmt::Display for DemoSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Classes registered:   {}", self.classes_registered)?;
        writeln!(f, "Instances spawned:    {}", self.instances_spawned)?;
        writeln!(f, "Processed at start:   {}", self.processed_at_start)?;
        if let Some(scan) = &self.scan {
            writeln!(
                f,
                "Scan:                 {} reserved, {} bound, {} failed, {} skipped",
                scan.reserved, scan.bound, scan.failed, scan.skipped
            )?;
        }
        writeln!(f, "Tasks run:            {}", self.tasks_run)?;
        writeln!(f, "Bound after spawn:    {}", self.bound_after_spawn)?;
        writeln!(f, "Total binds:          {}", self.total_binds)?;
        write!(f, "Bound at exit:        {}", self.bound_at_exit)
    }
}

fn descriptor(class: &DemoClass) -> ClassDescriptor {
    let mut descriptor = ClassDescriptor::new(class.name.clone());
    if let Some(path) = &class.module_path {
        descriptor = descriptor.with_module_path(path.clone());
    }
    if !class.default_instance {
        descriptor = descriptor.without_default_instance();
    }
    descriptor
}

fn register(registry: &ObjectRegistry, class: &DemoClass) -> Result<Arc<Class>> {
    registry
        .register_class(descriptor(class))
        .ok_or_else(|| anyhow!("registry refused class {}", class.name))
}

/// Drive a registry through a full lifecycle with the listener attached.
///
/// The calling thread owns the script environment: it initializes the listener and pumps its
/// task queue, while worker threads register classes and spawn instances.
pub fn run(config: &DemoConfig) -> Result<DemoSummary> {
    let settings = &config.demo;
    let mut summary = DemoSummary::default();

    let registry = Arc::new(ObjectRegistry::new());
    let (dispatcher, mut queue) = owning_thread_queue();
    let environment = Arc::new(ModuleScriptEnvironment::new(settings.script_root.clone()));
    let environment_handle: Arc<dyn ScriptEnvironment> = environment.clone();
    let listener = MixinListener::new(registry.clone(), dispatcher, config.listener.clone());

    let (preload, deferred): (Vec<_>, Vec<_>) =
        settings.classes.iter().partition(|class| class.preload);

    let mut classes = preload
        .iter()
        .map(|class| register(&registry, class))
        .collect::<Result<Vec<_>>>()?;
    debug!("Preloaded {} class(es)", classes.len());

    listener.initialize(&environment_handle);
    if !config.listener.scan_on_initialize {
        summary.scan = Some(listener.scan_existing_objects());
    }
    summary.processed_at_start = listener.processed_class_count();

    let loaded = thread::scope(|scope| {
        scope
            .spawn(|| {
                deferred
                    .iter()
                    .map(|class| register(&registry, class))
                    .collect::<Result<Vec<_>>>()
            })
            .join()
            .map_err(|_| anyhow!("class loader thread panicked"))
    })??;
    classes.extend(loaded);
    summary.classes_registered = classes.len();

    summary.instances_spawned = thread::scope(|scope| {
        let workers: Vec<_> = (0..settings.workers)
            .map(|_| {
                let registry = &registry;
                let classes = &classes;
                scope.spawn(move || {
                    let mut rng = rand::thread_rng();
                    (0..settings.instances_per_worker)
                        .filter_map(|_| classes.choose(&mut rng))
                        .filter(|class| registry.spawn_instance(class).is_some())
                        .count()
                })
            })
            .collect();

        workers.into_iter().try_fold(0, |total, worker| {
            worker
                .join()
                .map(|spawned| total + spawned)
                .map_err(|_| anyhow!("spawner thread panicked"))
        })
    })?;
    info!(
        "{} worker(s) spawned {} instance(s)",
        settings.workers, summary.instances_spawned
    );

    summary.tasks_run += queue.pump();
    summary.bound_after_spawn = environment.bound_count();

    if settings.destroy_classes {
        thread::scope(|scope| {
            scope
                .spawn(|| {
                    for class in &classes {
                        registry.destroy_class(class);
                    }
                })
                .join()
        })
        .map_err(|_| anyhow!("class unloader thread panicked"))?;
        summary.tasks_run += queue.pump();
    }

    registry.shutdown();
    summary.tasks_run += queue.pump();

    summary.total_binds = environment.total_binds();
    summary.bound_at_exit = environment.bound_count();
    for module in environment.bound_modules() {
        debug!(
            "Still bound at exit: {} -> {}",
            module.module_path, module.class_name
        );
    }

    Ok(summary)
}

/// Write the example configuration to `path`, refusing to overwrite an existing file
pub fn write_example_config(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("{} already exists", path.display()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, crate::config::EXAMPLE_CONFIG)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemoSettings;
    use automix_listener::{ListenerConfig, UnbindPolicy};
    use std::fs;

    fn config(settings: DemoSettings) -> DemoConfig {
        DemoConfig {
            listener: ListenerConfig::default(),
            demo: settings,
        }
    }

    #[test]
    fn test_default_run_binds_and_unbinds_everything() {
        let summary = run(&DemoConfig::default()).unwrap();

        assert_eq!(summary.classes_registered, 4);
        assert_eq!(summary.instances_spawned, 100);
        // Enemy is preloaded and caught by the scan
        assert_eq!(summary.processed_at_start, 1);
        let scan = summary.scan.unwrap();
        assert_eq!((scan.reserved, scan.bound, scan.deferred), (1, 1, 0));
        // Enemy via scan; Door is bound by its default instance
        assert_eq!(summary.bound_after_spawn, 2);
        assert_eq!(summary.total_binds, 2);
        assert_eq!(summary.bound_at_exit, 0);
    }

    #[test]
    fn test_scan_on_initialize_skips_explicit_scan() {
        let mut demo = config(DemoSettings {
            workers: 1,
            instances_per_worker: 0,
            ..DemoSettings::default()
        });
        demo.listener.scan_on_initialize = true;

        let summary = run(&demo).unwrap();
        assert_eq!(summary.scan, None);
        assert_eq!(summary.processed_at_start, 1);
        assert_eq!(summary.instances_spawned, 0);
        assert_eq!(summary.total_binds, 2);
    }

    #[test]
    fn test_missing_scripts_fail_binds() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("Game")).unwrap();
        fs::write(root.path().join("Game/Enemy.ts"), "export {}").unwrap();

        let summary = run(&config(DemoSettings {
            script_root: Some(root.path().to_path_buf()),
            ..DemoSettings::default()
        }))
        .unwrap();

        // Game/Door has no script file
        assert_eq!(summary.total_binds, 1);
        assert_eq!(summary.bound_at_exit, 0);
    }

    #[test]
    fn test_bindings_left_at_registry_shutdown_are_abandoned() {
        let mut demo = config(DemoSettings {
            destroy_classes: false,
            ..DemoSettings::default()
        });
        demo.listener.unbind_policy = UnbindPolicy::Always;

        let summary = run(&demo).unwrap();
        assert_eq!(summary.total_binds, 2);
        assert_eq!(summary.bound_at_exit, 2);
    }

    #[test]
    fn test_disabled_listener_binds_nothing() {
        let mut demo = DemoConfig::default();
        demo.listener.enabled = false;

        let summary = run(&demo).unwrap();
        assert_eq!(summary.processed_at_start, 0);
        assert_eq!(summary.tasks_run, 0);
        assert_eq!(summary.total_binds, 0);
    }

    #[test]
    fn test_write_example_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("demo.toml");

        write_example_config(&path).unwrap();
        assert!(DemoConfig::load(&path).is_ok());
        assert!(write_example_config(&path).is_err());
    }
}

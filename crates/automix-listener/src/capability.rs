use automix_host::{Class, HostRuntime};

/// Whether `class` opts into script binding
pub fn qualifies(host: &dyn HostRuntime, class: &Class) -> bool {
    host.implements_capability(class)
}

/// Module path the class asks to be bound to.
///
/// Queried on the class's default instance. An empty string means "do not bind": the class
/// has no default instance, no capability, or its accessor returned nothing.
pub fn resolve_module_path(host: &dyn HostRuntime, class: &Class) -> String {
    let Some(instance) = host.default_instance(class) else {
        return String::new();
    };

    match class.mixin() {
        Some(mixin) if host.implements_capability(class) => mixin.module_path(&instance),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automix_host::{ClassDescriptor, Instance, MixinInterface, ObjectRegistry};

    struct PerInstancePath;

    impl MixinInterface for PerInstancePath {
        fn module_path(&self, instance: &Instance) -> String {
            format!("Game/{}", instance.class().name())
        }
    }

    struct OptedOut;

    impl MixinInterface for OptedOut {}

    #[test]
    fn test_class_without_capability_does_not_qualify() {
        let registry = ObjectRegistry::new();
        let tree = registry.register_class(ClassDescriptor::new("Tree")).unwrap();

        assert!(!qualifies(&registry, &tree));
        assert_eq!(resolve_module_path(&registry, &tree), "");
    }

    #[test]
    fn test_module_path_comes_from_default_instance() {
        let registry = ObjectRegistry::new();
        let enemy = registry
            .register_class(ClassDescriptor::new("Enemy").with_mixin(PerInstancePath))
            .unwrap();

        assert!(qualifies(&registry, &enemy));
        assert_eq!(resolve_module_path(&registry, &enemy), "Game/Enemy");
    }

    #[test]
    fn test_default_accessor_opts_out() {
        let registry = ObjectRegistry::new();
        let prop = registry
            .register_class(ClassDescriptor::new("Prop").with_mixin(OptedOut))
            .unwrap();

        assert!(qualifies(&registry, &prop));
        assert_eq!(resolve_module_path(&registry, &prop), "");
    }

    #[test]
    fn test_missing_default_instance_resolves_empty() {
        let registry = ObjectRegistry::new();
        let door = registry
            .register_class(
                ClassDescriptor::new("Door")
                    .with_module_path("Game/Door")
                    .without_default_instance(),
            )
            .unwrap();

        assert!(qualifies(&registry, &door));
        assert_eq!(resolve_module_path(&registry, &door), "");
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use automix_listener::{ConfigError, ListenerConfig};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Example written by `--init-config`
pub const EXAMPLE_CONFIG: &str = r#"# automix demo configuration

[listener]
enabled = true
scan_on_initialize = true
# "attempted" only unbinds classes whose bind call was made, "always" unbinds every released class
unbind_policy = "attempted"

[demo]
workers = 4
instances_per_worker = 25
# Module paths resolve to <script_root>/<path>.ts or .js when set
# script_root = "TypeScript"

[[demo.classes]]
name = "BP_MainCharacter"
module_path = "Project/Blueprints/Character/BP_MainCharacter"
preload = true

[[demo.classes]]
name = "AC_Input"
module_path = "Project/Blueprints/Input/AC_Input"

[[demo.classes]]
name = "Prop"
module_path = ""

[[demo.classes]]
name = "Tree"
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoClass {
    pub name: String,

    /// Module path returned by the class's mixin accessor. Absent means the class does not
    /// implement the capability at all; empty means it implements it but opts out.
    #[serde(default)]
    pub module_path: Option<String>,

    /// Whether the class gets a default instance (default: true)
    #[serde(default = "default_true")]
    pub default_instance: bool,

    /// Register the class before the listener attaches, so only the catch-up scan sees it
    #[serde(default)]
    pub preload: bool,
}

impl DemoClass {
    fn new(name: &str, module_path: Option<&str>, preload: bool) -> Self {
        Self {
            name: name.to_string(),
            module_path: module_path.map(str::to_string),
            default_instance: true,
            preload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Threads creating instances concurrently (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Instances each worker creates (default: 25)
    #[serde(default = "default_instances")]
    pub instances_per_worker: usize,

    /// Directory module paths are resolved against; any path binds when unset
    #[serde(default)]
    pub script_root: Option<PathBuf>,

    /// Destroy every class before shutting the registry down (default: true)
    #[serde(default = "default_true")]
    pub destroy_classes: bool,

    #[serde(default = "default_classes")]
    pub classes: Vec<DemoClass>,
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_instances() -> usize {
    25
}

fn default_classes() -> Vec<DemoClass> {
    vec![
        DemoClass::new("Enemy", Some("Game/Enemy"), true),
        DemoClass::new("Door", Some("Game/Door"), false),
        DemoClass::new("Prop", Some(""), false),
        DemoClass::new("Tree", None, false),
    ]
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            instances_per_worker: default_instances(),
            script_root: None,
            destroy_classes: true,
            classes: default_classes(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub demo: DemoSettings,
}

impl DemoConfig {
    /// Default config location, e.g. ~/.config/automix/demo.toml
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "automix").map(|dirs| dirs.config_dir().join("demo.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `explicit` if given, otherwise the default location, falling back to defaults
    /// when no file exists there
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::config_path() {
            Some(path) => match Self::load(&path) {
                Err(ConfigError::NotFound(_)) => Ok(Self::default()),
                other => other,
            },
            None => Ok(Self::default()),
        }
    }
}

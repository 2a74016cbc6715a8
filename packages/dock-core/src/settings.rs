//! Persistent item preferences (container membership, sort positions).

use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Key/value store for item preferences. Keys are namespaced by the caller
/// (plugin name + item key).
pub trait SettingsStore {
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_bool(&mut self, key: &str, value: bool);
    fn get_int(&self, key: &str) -> Option<i64>;
    fn set_int(&mut self, key: &str, value: i64);
}

pub type SharedSettings = Rc<RefCell<dyn SettingsStore>>;

/// Non-persistent store, used by tests and when no config directory exists.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: HashMap<String, Value>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSettings {
        Rc::new(RefCell::new(Self::new()))
    }
}

impl SettingsStore for MemorySettings {
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key)?.as_bool()
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), Value::Bool(value));
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key)?.as_i64()
    }

    fn set_int(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), Value::from(value));
    }
}

/// JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: Map<String, Value>,
}

impl JsonFileSettings {
    /// Default location: `$XDG_CONFIG_HOME/dock-panel/settings.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dock-panel")
            .join("settings.json")
    }

    /// Open the store. A missing or unreadable file starts empty.
    pub fn open(path: &Path) -> Self {
        let values = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    tracing::warn!(path = %path.display(), "settings file is not a JSON object, starting empty");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        Self {
            path: path.to_path_buf(),
            values,
        }
    }

    fn save(&self) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                tracing::warn!(error = %e, "failed to create settings directory");
                return;
            }
        }
        let text = match serde_json::to_string_pretty(&self.values) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize settings");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, text) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write settings");
        }
    }
}

impl SettingsStore for JsonFileSettings {
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key)?.as_bool()
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), Value::Bool(value));
        self.save();
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key)?.as_i64()
    }

    fn set_int(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), Value::from(value));
        self.save();
    }
}

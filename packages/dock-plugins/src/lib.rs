//! Built-in item providers shipped with the dock.
//!
//! Each provider registers under a `builtin:` module name so that plugin
//! descriptors on disk can refer to them the same way they refer to any
//! other module.

pub mod network;
pub mod trash;
pub mod tray;

use dock_core::plugin::{FactoryTable, PluginDescriptor};

pub const TRASH_MODULE: &str = "builtin:trash";
pub const NETWORK_MODULE: &str = "builtin:network";
pub const TRAY_MODULE: &str = "builtin:tray";

/// Constructors for every built-in module
pub fn builtin_factories() -> FactoryTable {
    let mut table = FactoryTable::new();
    table.register(TRASH_MODULE, trash::TrashProvider::factory);
    table.register(NETWORK_MODULE, network::NetworkProvider::factory);
    table.register(TRAY_MODULE, tray::TrayProvider::factory);
    table
}

/// Descriptors loaded before anything found in the plugin directories
pub fn builtin_descriptors() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor::builtin("trash", TRASH_MODULE),
        PluginDescriptor::builtin("network", NETWORK_MODULE),
        PluginDescriptor::builtin("system-tray", TRAY_MODULE),
    ]
}

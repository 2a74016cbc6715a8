//! Window set of one application item.

use crate::snapshot::{WindowSystem, WindowSystemError};
use crate::{WindowId, WindowInfo, WindowInfoMap};

/// What changed between two consecutive window sets
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WindowSetChange {
    pub added: Vec<WindowId>,
    pub removed: Vec<WindowId>,
    pub attention_before: bool,
    pub attention_after: bool,
}

impl WindowSetChange {
    pub fn attention_cleared(&self) -> bool {
        self.attention_before && !self.attention_after
    }
}

#[derive(Debug, Default)]
pub struct WindowInfoRegistry {
    windows: WindowInfoMap,
}

impl WindowInfoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set. Updates never merge field by field.
    pub fn replace(&mut self, windows: WindowInfoMap) -> WindowSetChange {
        let attention_before = self.has_attention();
        let added = windows
            .keys()
            .filter(|id| !self.windows.contains_key(id))
            .copied()
            .collect();
        let removed = self
            .windows
            .keys()
            .filter(|id| !windows.contains_key(id))
            .copied()
            .collect();
        self.windows = windows;
        WindowSetChange {
            added,
            removed,
            attention_before,
            attention_after: self.has_attention(),
        }
    }

    pub fn get(&self, id: WindowId) -> Option<&WindowInfo> {
        self.windows.get(&id)
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn ids(&self) -> Vec<WindowId> {
        self.windows.keys().copied().collect()
    }

    pub fn map(&self) -> &WindowInfoMap {
        &self.windows
    }

    pub fn has_attention(&self) -> bool {
        self.windows.values().any(|w| w.attention)
    }

    /// Drop every window the window system no longer knows about.
    ///
    /// Only a definite "window is gone" answer prunes; transient failures
    /// keep the entry for the next check.
    pub fn revalidate(&mut self, ws: &dyn WindowSystem) -> Vec<WindowId> {
        let gone: Vec<WindowId> = self
            .windows
            .keys()
            .copied()
            .filter(|&id| matches!(ws.window_geometry(id), Err(WindowSystemError::WindowGone(_))))
            .collect();
        for id in &gone {
            tracing::debug!(window = id, "pruning vanished window");
            self.windows.remove(id);
        }
        gone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window_map;

    fn info(id: WindowId, attention: bool) -> WindowInfo {
        WindowInfo {
            id,
            title: format!("window {}", id),
            attention,
            ..Default::default()
        }
    }

    #[test]
    fn test_replace_reports_changes() {
        let mut reg = WindowInfoRegistry::new();
        reg.replace(window_map(vec![info(1, false), info(2, true)]));

        let change = reg.replace(window_map(vec![info(2, false), info(3, false)]));
        assert_eq!(change.added, vec![3]);
        assert_eq!(change.removed, vec![1]);
        assert!(change.attention_cleared());
        assert!(!reg.has_attention());
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut reg = WindowInfoRegistry::new();
        reg.replace(window_map(vec![info(1, true)]));
        reg.replace(window_map(vec![WindowInfo {
            id: 1,
            ..Default::default()
        }]));
        assert_eq!(reg.get(1).unwrap().title, "");
        assert!(!reg.has_attention());
    }
}

//! Native handle to window id mapping
//!
//! The registry is the only place where a backend translates between native
//! identity (`xcb_window_t`, `wl_surface` object id) and [`WindowId`].

use std::collections::HashMap;
use std::hash::Hash;

use crate::event::WindowId;

/// Bidirectional map between native window handles and window ids
#[derive(Debug)]
pub struct WindowRegistry<H> {
    by_native: HashMap<H, WindowId>,
    by_id: HashMap<WindowId, H>,
}

impl<H: Eq + Hash + Clone> WindowRegistry<H> {
    pub fn new() -> Self {
        Self {
            by_native: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    /// Register a freshly created native window and allocate its id
    ///
    /// # Panics
    ///
    /// Panics if `native` is already registered to a live window.
    pub fn register(&mut self, native: H) -> WindowId {
        assert!(
            !self.by_native.contains_key(&native),
            "native window handle registered twice"
        );
        let id = WindowId::new();
        self.by_native.insert(native.clone(), id);
        self.by_id.insert(id, native);
        id
    }

    /// Look up the live window for a native handle
    pub fn lookup(&self, native: &H) -> Option<WindowId> {
        self.by_native.get(native).copied()
    }

    /// The native handle behind a window id
    pub fn native(&self, id: WindowId) -> Option<&H> {
        self.by_id.get(&id)
    }

    /// Forget a window, returning its native handle
    pub fn unregister(&mut self, id: WindowId) -> Option<H> {
        let native = self.by_id.remove(&id)?;
        self.by_native.remove(&native);
        Some(native)
    }

    pub fn ids(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl<H: Eq + Hash + Clone> Default for WindowRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_lookup() {
        let mut registry = WindowRegistry::new();
        let id = registry.register(0x0040_0001u32);
        assert_eq!(registry.lookup(&0x0040_0001), Some(id));
        assert_eq!(registry.native(id), Some(&0x0040_0001));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_clears_both_directions() {
        let mut registry = WindowRegistry::new();
        let id = registry.register(7u32);
        assert_eq!(registry.unregister(id), Some(7));
        assert_eq!(registry.lookup(&7), None);
        assert_eq!(registry.native(id), None);
        assert!(registry.is_empty());
        assert_eq!(registry.unregister(id), None);
    }

    #[test]
    fn test_reused_native_handle_gets_fresh_id() {
        let mut registry = WindowRegistry::new();
        let first = registry.register(42u32);
        registry.unregister(first);
        let second = registry.register(42u32);
        assert_ne!(first, second);
        assert_eq!(registry.lookup(&42), Some(second));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_double_registration_panics() {
        let mut registry = WindowRegistry::new();
        registry.register(1u32);
        registry.register(1u32);
    }
}

//! Per-bot plugin metadata.
//!
//! Each bot owns one [`Metadata`] store. Values are namespaced by plugin name
//! and keyed by type, so a plugin keeps one slot per state type on every bot it
//! is attached to, and two plugins can never see each other's values.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use parking_lot::Mutex;

type Slots = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Typed storage slots, namespaced by plugin name.
#[derive(Default)]
pub struct Metadata {
    slots: Mutex<HashMap<String, Slots>>,
}

impl Metadata {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the `T` stored for `plugin`.
    pub fn get<T>(&self, plugin: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.slots
            .lock()
            .get(plugin)
            .and_then(|slots| slots.get(&TypeId::of::<T>()))
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Returns the stored `T`, or `default` when the slot is empty.
    pub fn get_or<T>(&self, plugin: &str, default: T) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get(plugin).unwrap_or(default)
    }

    /// Returns the stored `T`, creating it with `factory` on first access.
    ///
    /// The factory runs under the store lock and must not touch this store.
    pub fn get_or_insert_with<T, F>(&self, plugin: &str, factory: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut slots = self.slots.lock();
        let entry = slots
            .entry(plugin.to_string())
            .or_default()
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(factory()));

        match entry.downcast_ref::<T>() {
            Some(value) => value.clone(),
            // Slots are keyed by `TypeId::of::<T>()`, so the downcast cannot miss.
            None => unreachable!("metadata slot holds a foreign type"),
        }
    }

    /// Stores `value`, returning the previous one.
    pub fn set<T>(&self, plugin: &str, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.slots
            .lock()
            .entry(plugin.to_string())
            .or_default()
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Removes and returns the stored `T`.
    pub fn remove<T>(&self, plugin: &str) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.slots
            .lock()
            .get_mut(plugin)
            .and_then(|slots| slots.remove(&TypeId::of::<T>()))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Mutates the stored `T` in place, creating it with `factory` if absent.
    pub fn update<T, F, R>(&self, plugin: &str, factory: impl FnOnce() -> T, f: F) -> R
    where
        T: Send + Sync + 'static,
        F: FnOnce(&mut T) -> R,
    {
        let mut slots = self.slots.lock();
        let entry = slots
            .entry(plugin.to_string())
            .or_default()
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(factory()));

        match entry.downcast_mut::<T>() {
            Some(value) => f(value),
            None => unreachable!("metadata slot holds a foreign type"),
        }
    }

    /// Returns the names of plugins that have stored anything.
    pub fn plugins(&self) -> Vec<String> {
        self.slots.lock().keys().cloned().collect()
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metadata")
            .field("plugins", &self.plugins())
            .finish()
    }
}

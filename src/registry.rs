// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The process-wide table of named loggers and prefix-based bulk
//! configuration.

use crate::level::Level;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// A named, severity-thresholded sink descriptor. Identity is the `Arc`
/// handle, not the name: two loggers may share a name.
#[derive(Debug)]
pub struct Logger {
    name: String,
    level: AtomicU8,
}

impl Logger {
    pub fn new(name: impl Into<String>, level: Level) -> Arc<Logger> {
        Arc::new(Logger {
            name: name.into(),
            level: AtomicU8::new(level as u8),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        // SAFETY-free: the stored value only ever comes from a `Level as u8`
        // cast, so the match below is exhaustive over that byte range.
        match self.level.load(Ordering::Relaxed) {
            0 => Level::Panic,
            1 => Level::Alert,
            2 => Level::Critical,
            3 => Level::Error,
            4 => Level::Warning,
            5 => Level::Notice,
            6 => Level::Output,
            7 => Level::Info,
            8 => Level::Debug,
            9 => Level::Fine,
            10 => Level::Trace,
            _ => Level::Lowest,
        }
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Cheap fast-path check: is `level` severe enough to be emitted?
    #[inline]
    pub fn enabled_for(&self, level: Level) -> bool {
        self.level() >= level
    }
}

/// One `{prefix, level}` item for [`Registry::cfg_registered`]. Items are
/// applied in order; later items win on overlapping prefixes.
#[derive(Debug, Clone)]
pub struct ConfigItem {
    pub prefix: String,
    pub level: Level,
}

impl ConfigItem {
    pub fn new(prefix: impl Into<String>, level: Level) -> Self {
        ConfigItem {
            prefix: prefix.into(),
            level,
        }
    }
}

const INITIAL_CAPACITY: usize = 64;
const GROWTH_STEP: usize = 10;

/// The growable, mutex-protected array of registered loggers.
///
/// `unregister` tombstones (`None`) rather than compacts; a later
/// `register` always appends past existing tombstones rather than reusing
/// a freed slot (see DESIGN.md for why).
#[derive(Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    slots: Vec<Option<Arc<Logger>>>,
    count: usize,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Appends `logger`, growing the backing `Vec` (initial 64, then +10
    /// per growth) if it is full.
    pub fn register(&self, logger: Arc<Logger>) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if inner.slots.len() == inner.slots.capacity() {
            let additional = if inner.slots.is_empty() {
                INITIAL_CAPACITY
            } else {
                GROWTH_STEP
            };
            inner.slots.reserve_exact(additional);
        }
        inner.slots.push(Some(logger));
        inner.count += 1;
    }

    /// Tombstones the first slot holding a logger with this `Arc`'s
    /// identity. If the registered count reaches zero, the backing `Vec`
    /// is replaced with a fresh, zero-capacity one.
    pub fn unregister(&self, logger: &Arc<Logger>) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if let Some(slot) = inner
            .slots
            .iter_mut()
            .find(|s| matches!(s, Some(l) if Arc::ptr_eq(l, logger)))
        {
            *slot = None;
            inner.count -= 1;
        }
        if inner.count == 0 {
            inner.slots = Vec::new();
        }
    }

    /// A snapshot of every live (non-tombstone) logger.
    pub fn registered(&self) -> Vec<Arc<Logger>> {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        inner.slots.iter().flatten().cloned().collect()
    }

    /// Applies every item under a single lock acquisition: for each item,
    /// in order, every registered logger whose name starts with the
    /// prefix gets its level set. Later items win on overlap.
    ///
    /// Deliberately a single lock acquisition for the whole batch: taking
    /// and releasing the lock per item would let a concurrent `register`
    /// observe a partially-applied configuration (see DESIGN.md).
    pub fn cfg_registered(&self, items: &[ConfigItem]) {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        for item in items {
            for logger in inner.slots.iter().flatten() {
                if logger.name().starts_with(item.prefix.as_str()) {
                    logger.set_level(item.level);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry mutex poisoned").count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The single process-wide registry, created on first use.
pub fn global_registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Registers `logger` in the process-wide registry.
pub fn register(logger: Arc<Logger>) {
    global_registry().register(logger);
}

/// Unregisters `logger` from the process-wide registry.
pub fn unregister(logger: &Arc<Logger>) {
    global_registry().unregister(logger);
}

/// Returns a snapshot of every registered logger.
pub fn registered() -> Vec<Arc<Logger>> {
    global_registry().registered()
}

/// Applies `items` to the process-wide registry.
pub fn cfg_registered(items: &[ConfigItem]) {
    global_registry().cfg_registered(items);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_unregister_tombstones() {
        let reg = Registry::new();
        let a = Logger::new("a", Level::Lowest);
        reg.register(a.clone());
        assert_eq!(reg.len(), 1);
        reg.unregister(&a);
        assert_eq!(reg.len(), 0);
        assert!(reg.registered().is_empty());
    }

    #[test]
    fn unregister_tombstones_without_compacting() {
        let reg = Registry::new();
        let a = Logger::new("a", Level::Lowest);
        let b = Logger::new("b", Level::Lowest);
        reg.register(a.clone());
        reg.register(b.clone());
        reg.unregister(&a);
        assert_eq!(reg.len(), 1);
        let names: Vec<_> = reg.registered().iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn cfg_registered_prefix_override_order() {
        let reg = Registry::new();
        let a = Logger::new("a", Level::Lowest);
        let ab = Logger::new("a.b", Level::Lowest);
        let ac = Logger::new("a.c", Level::Lowest);
        reg.register(a.clone());
        reg.register(ab.clone());
        reg.register(ac.clone());

        reg.cfg_registered(&[
            ConfigItem::new("", Level::Lowest),
            ConfigItem::new("a", Level::Output),
            ConfigItem::new("a.b", Level::Warning),
        ]);

        assert_eq!(a.level(), Level::Output);
        assert_eq!(ab.level(), Level::Warning);
        assert_eq!(ac.level(), Level::Output);
    }
}

//! Static instrument catalog.
//!
//! Populated once at startup from configuration. Registering a name that is
//! already present replaces its descriptor in place (last write wins, the
//! original registration position is kept); callers are expected to avoid
//! collisions, configuration validation rejects them up front.

use std::collections::HashMap;
use tracing::debug;

use crate::instrument::{InstrumentClass, InstrumentDescriptor};

#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    entries: Vec<InstrumentDescriptor>,
    index: HashMap<String, usize>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a descriptor; returns the one it replaced.
    pub fn register(&mut self, descriptor: InstrumentDescriptor) -> Option<InstrumentDescriptor> {
        debug!(name = %descriptor.name, driver = %descriptor.driver, "Registering instrument");
        match self.index.get(&descriptor.name) {
            Some(&slot) => Some(std::mem::replace(&mut self.entries[slot], descriptor)),
            None => {
                self.index
                    .insert(descriptor.name.clone(), self.entries.len());
                self.entries.push(descriptor);
                None
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&InstrumentDescriptor> {
        self.index.get(name).map(|&slot| &self.entries[slot])
    }

    /// Names of all instruments of `class`, in registration order.
    pub fn list_by_class(&self, class: InstrumentClass) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|d| d.class == class)
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstrumentDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<InstrumentDescriptor> for InstrumentRegistry {
    fn from_iter<I: IntoIterator<Item = InstrumentDescriptor>>(iter: I) -> Self {
        let mut registry = Self::new();
        for descriptor in iter {
            registry.register(descriptor);
        }
        registry
    }
}

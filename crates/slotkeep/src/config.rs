//! Pool sizing configuration.

use std::collections::HashMap;

use crate::assigner::DEFAULT_CAPACITY;
use crate::namespace::Namespace;

/// Environment variable overriding the default capacity of every namespace.
pub const CAPACITY_ENV: &str = "SLOTKEEP_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub default_capacity: usize,
    pub overrides: HashMap<Namespace, usize>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_capacity: capacity_from(std::env::var(CAPACITY_ENV).ok().as_deref()),
            overrides: HashMap::new(),
        }
    }
}

/// Parse a capacity setting, falling back to [`DEFAULT_CAPACITY`] when it is
/// absent or not a number.
fn capacity_from(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_CAPACITY)
}

impl RegistryConfig {
    /// Same capacity for every namespace, ignoring the environment.
    pub fn uniform(capacity: usize) -> Self {
        Self {
            default_capacity: capacity,
            overrides: HashMap::new(),
        }
    }

    /// Set the capacity of a single namespace.
    pub fn with_capacity(mut self, namespace: Namespace, capacity: usize) -> Self {
        self.overrides.insert(namespace, capacity);
        self
    }

    pub fn capacity_for(&self, namespace: Namespace) -> usize {
        self.overrides
            .get(&namespace)
            .copied()
            .unwrap_or(self.default_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence() {
        let config = RegistryConfig::uniform(10).with_capacity(Namespace::WebApk, 4);
        assert_eq!(config.capacity_for(Namespace::Webapp), 10);
        assert_eq!(config.capacity_for(Namespace::WebApk), 4);
    }

    #[test]
    fn capacity_setting_parses_with_fallback() {
        assert_eq!(capacity_from(None), DEFAULT_CAPACITY);
        assert_eq!(capacity_from(Some("4")), 4);
        assert_eq!(capacity_from(Some(" 4 ")), 4);
        assert_eq!(capacity_from(Some("abc")), DEFAULT_CAPACITY);
        assert_eq!(capacity_from(Some("")), DEFAULT_CAPACITY);
        assert_eq!(capacity_from(Some("-3")), DEFAULT_CAPACITY);
    }

    #[test]
    fn uniform_ignores_environment() {
        let config = RegistryConfig::uniform(3);
        for ns in Namespace::ALL {
            assert_eq!(config.capacity_for(ns), 3);
        }
    }
}

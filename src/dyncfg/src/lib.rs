// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Named, typed optimizer settings that can be changed at runtime.
//!
//! Each setting is a `const` [Config] declared next to the code that reads
//! it. Settings are registered to a [ConfigSet], which owns their current
//! values. Sets never share values, so a test can build its own set and tune
//! it without affecting anything else.
//!
//! ```
//! # use relopt_dyncfg::{Config, ConfigSet};
//! const PUSH_FILTERS: Config<bool> = Config::new("push_filters", true, "Push filters down.");
//! let cfg = ConfigSet::default().add(&PUSH_FILTERS);
//! assert!(PUSH_FILTERS.get(&cfg));
//! PUSH_FILTERS.set(&cfg, false);
//! assert!(!PUSH_FILTERS.get(&cfg));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use tracing::error;

/// A handle to a dynamically updatable configuration value.
///
/// This represents a strongly-typed named config of type `T`. It may be
/// registered to a set of such configs with [ConfigSet::add] and then later
/// used to retrieve the latest value at any time with [Self::get].
///
/// The supported types are [bool] and [usize].
#[derive(Clone, Debug)]
pub struct Config<T: ConfigType> {
    name: &'static str,
    desc: &'static str,
    default: T,
}

impl<T: ConfigType> Config<T> {
    /// Constructs a handle for a config of type `T`.
    ///
    /// Names should be unique within a process.
    pub const fn new(name: &'static str, default: T, desc: &'static str) -> Self {
        Config {
            name,
            default,
            desc,
        }
    }

    /// The name of this config.
    pub fn name(&self) -> &str {
        self.name
    }

    /// The description of this config.
    pub fn desc(&self) -> &str {
        self.desc
    }

    /// The default value of this config.
    pub fn default(&self) -> T {
        self.default
    }

    /// Returns the latest value of this config within the given set.
    ///
    /// Configs that were never registered to the set report their default
    /// value, and the omission is logged.
    pub fn get(&self, set: &ConfigSet) -> T {
        match T::shared(self, set) {
            Some(shared) => T::get(shared),
            None => {
                error!("config {} not registered to set {:?}", self.name, set);
                self.default
            }
        }
    }

    /// Overrides the value of this config within the given set.
    ///
    /// Returns false if the config is not registered to the set.
    pub fn set(&self, set: &ConfigSet, val: T) -> bool {
        match T::shared(self, set) {
            Some(shared) => {
                T::set(shared, val);
                true
            }
            None => false,
        }
    }
}

/// A type usable as a [Config].
pub trait ConfigType: Copy + Sized {
    /// A value of this type, sharable between config value updaters and
    /// config value retrievers.
    type Shared;

    /// Extracts the sharable value for a config of this type from a set.
    fn shared<'a>(config: &Config<Self>, vals: &'a ConfigSet) -> Option<&'a Arc<Self::Shared>>;

    /// Wraps a fresh sharable value holding `val`.
    fn to_val(val: Self) -> ConfigVal;

    /// Retrieves the current config value of this type from a value of its
    /// corresponding sharable type.
    fn get(x: &Self::Shared) -> Self;

    /// Updates the sharable value for a config of this type to the given value.
    fn set(x: &Self::Shared, val: Self);
}

/// A set of [Config]s with values independent of other [ConfigSet]s (even if
/// they contain the same configs).
#[derive(Clone, Default)]
pub struct ConfigSet {
    configs: BTreeMap<&'static str, ConfigVal>,
}

impl ConfigSet {
    /// Adds the given config to this set.
    ///
    /// Panics if a config with the same name has previously been registered to
    /// this set.
    pub fn add<T: ConfigType>(mut self, config: &Config<T>) -> Self {
        if self
            .configs
            .insert(config.name, T::to_val(config.default))
            .is_some()
        {
            panic!("{} registered twice", config.name);
        }
        self
    }

    /// The names of the configs registered to this set, in order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.configs.keys().copied()
    }
}

impl fmt::Debug for ConfigSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.configs.iter()).finish()
    }
}

/// A type-erased [ConfigType::Shared], so that configs of different types
/// can share a collection.
#[derive(Clone, Debug)]
pub enum ConfigVal {
    /// A `bool` shared value.
    Bool(Arc<AtomicBool>),
    /// A `usize` shared value.
    Usize(Arc<AtomicU64>),
}

mod impls {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst};
    use std::sync::Arc;

    use relopt_ore::cast::CastFrom;

    use crate::{Config, ConfigSet, ConfigType, ConfigVal};

    impl ConfigType for bool {
        type Shared = AtomicBool;

        fn shared<'a>(config: &Config<Self>, vals: &'a ConfigSet) -> Option<&'a Arc<Self::Shared>> {
            match vals.configs.get(config.name)? {
                ConfigVal::Bool(x) => Some(x),
                _ => None,
            }
        }
        fn to_val(val: Self) -> ConfigVal {
            ConfigVal::Bool(Arc::new(val.into()))
        }
        fn set(x: &Self::Shared, val: Self) {
            x.store(val, SeqCst);
        }
        fn get(x: &Self::Shared) -> Self {
            x.load(SeqCst)
        }
    }

    impl ConfigType for usize {
        type Shared = AtomicU64;

        fn shared<'a>(config: &Config<Self>, vals: &'a ConfigSet) -> Option<&'a Arc<Self::Shared>> {
            match vals.configs.get(config.name)? {
                ConfigVal::Usize(x) => Some(x),
                _ => None,
            }
        }
        fn to_val(val: Self) -> ConfigVal {
            ConfigVal::Usize(Arc::new(u64::cast_from(val).into()))
        }
        fn set(x: &Self::Shared, val: Self) {
            x.store(u64::cast_from(val), SeqCst);
        }
        fn get(x: &Self::Shared) -> Self {
            usize::cast_from(x.load(SeqCst))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOL: Config<bool> = Config::new("bool", true, "");
    const USIZE: Config<usize> = Config::new("usize", 1, "");

    #[relopt_ore::test]
    fn all_types() {
        let configs = ConfigSet::default().add(&BOOL).add(&USIZE);
        assert_eq!(BOOL.get(&configs), true);
        assert_eq!(USIZE.get(&configs), 1);

        assert!(BOOL.set(&configs, false));
        assert!(USIZE.set(&configs, 2));
        assert_eq!(BOOL.get(&configs), false);
        assert_eq!(USIZE.get(&configs), 2);
        assert_eq!(configs.names().collect::<Vec<_>>(), vec!["bool", "usize"]);
    }

    #[relopt_ore::test]
    fn unregistered_reads_default() {
        let configs = ConfigSet::default();
        assert_eq!(USIZE.get(&configs), 1);
        assert!(!USIZE.set(&configs, 5));
    }

    #[relopt_ore::test]
    fn mismatched_type_reads_default() {
        const SAME_NAME: Config<bool> = Config::new("usize", false, "");
        let configs = ConfigSet::default().add(&USIZE);
        assert_eq!(SAME_NAME.get(&configs), false);
        assert!(!SAME_NAME.set(&configs, true));
    }

    #[relopt_ore::test]
    fn config_set() {
        let c0 = ConfigSet::default().add(&USIZE);
        assert_eq!(USIZE.get(&c0), 1);
        USIZE.set(&c0, 2);
        assert_eq!(USIZE.get(&c0), 2);

        // Each ConfigSet is independent, even if they contain the same set of
        // configs.
        let c1 = ConfigSet::default().add(&USIZE);
        assert_eq!(USIZE.get(&c1), 1);
        USIZE.set(&c1, 3);
        assert_eq!(USIZE.get(&c1), 3);
        assert_eq!(USIZE.get(&c0), 2);
    }

    #[relopt_ore::test]
    #[should_panic(expected = "usize registered twice")]
    fn duplicate_registration_panics() {
        let _ = ConfigSet::default().add(&USIZE).add(&USIZE);
    }
}

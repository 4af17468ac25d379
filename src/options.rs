//! Driver-level connection options.
//!
//! An open-ended mapping of option name to value, passed through to the pool
//! driver at creation time. Drivers pick the keys they understand with the
//! typed accessors and may forward the rest.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverOptions(BTreeMap<String, String>);

impl DriverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Display) -> &mut Self {
        self.0.insert(name.into(), value.to_string());
        self
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.set(name, value);
        self
    }

    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Parse the option `name` as `T`.
    ///
    /// Missing options are `Ok(None)`; present but unparseable values are a
    /// configuration error naming the option.
    pub fn get<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get_raw(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    Error::Configuration(format!("invalid value {raw:?} for option `{name}`: {e}"))
                })
            })
            .transpose()
    }

    /// Parse the option `name` as a whole number of seconds.
    pub fn get_seconds(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.get::<u64>(name)?.map(Duration::from_secs))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for DriverOptions
where
    K: Into<String>,
    V: Display,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (name, value) in iter {
            options.set(name, value);
        }
        options
    }
}

impl From<BTreeMap<String, String>> for DriverOptions {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

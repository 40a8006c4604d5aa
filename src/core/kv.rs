// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Key Value storage
//!
//! A very simple key-value storage used to pass per-iteration metrics from solvers to observers.

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// A simple key-value storage
///
/// Keys are static strings, values are stored in their formatted form.
#[derive(Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "serde1", derive(Serialize))]
pub struct KV {
    /// The actual key value storage
    pub kv: Vec<(&'static str, String)>,
}

// `&'static str` cannot implement `Deserialize<'de>` for an independent `'de`, so this is
// implemented by hand (leaking the deserialized key), mirroring what a derive would otherwise do.
#[cfg(feature = "serde1")]
impl<'de> Deserialize<'de> for KV {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let kv: Vec<(String, String)> = Deserialize::deserialize(deserializer)?;
        Ok(KV {
            kv: kv
                .into_iter()
                .map(|(k, v)| (&*Box::leak(k.into_boxed_str()), v))
                .collect(),
        })
    }
}

impl std::fmt::Display for KV {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "KV")?;
        for (key, val) in self.kv.iter() {
            writeln!(f, "   {}: {}", key, val)?;
        }
        Ok(())
    }
}

impl KV {
    /// Constructor
    ///
    /// # Example
    ///
    /// ```
    /// use lincoa::core::KV;
    ///
    /// let kv = KV::new();
    /// # assert!(kv.kv.is_empty());
    /// ```
    pub fn new() -> Self {
        KV { kv: vec![] }
    }

    /// Push a key-value pair to the `kv` vector.
    ///
    /// This formats the `val` using `format!`. Therefore `T` has to implement `Display`.
    ///
    /// # Example
    ///
    /// ```
    /// use lincoa::core::KV;
    ///
    /// let mut kv = KV::new();
    /// kv.push("key", 1.0f64);
    /// # assert_eq!(kv.get("key").unwrap(), "1");
    /// ```
    pub fn push<T: std::fmt::Display>(&mut self, key: &'static str, val: T) -> &mut Self {
        self.kv.push((key, format!("{}", val)));
        self
    }

    /// Returns the value stored for `key`, if present.
    ///
    /// If a key was pushed repeatedly, the most recently pushed value is returned.
    pub fn get(&self, key: &'static str) -> Option<&str> {
        self.kv
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Merge another `kv` into `self.kv`
    ///
    /// # Example
    ///
    /// ```
    /// use lincoa::kv;
    ///
    /// let kv1 = kv!("a" => 1;);
    /// let kv2 = kv!("b" => 2;);
    /// let merged = kv1.merge(kv2);
    /// # assert_eq!(merged.get("a").unwrap(), "1");
    /// # assert_eq!(merged.get("b").unwrap(), "2");
    /// ```
    #[must_use]
    pub fn merge(mut self, mut other: KV) -> Self {
        self.kv.append(&mut other.kv);
        self
    }
}

impl std::iter::FromIterator<(&'static str, String)> for KV {
    fn from_iter<I: IntoIterator<Item = (&'static str, String)>>(iter: I) -> Self {
        let mut c = KV::new();
        for i in iter {
            c.push(i.0, i.1);
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    send_sync_test!(kv, KV);

    #[test]
    fn test_push_and_get() {
        let mut kv = KV::new();
        kv.push("rho", 0.1).push("nf", 12);
        assert_eq!(kv.get("rho").unwrap(), "0.1");
        assert_eq!(kv.get("nf").unwrap(), "12");
        assert!(kv.get("missing").is_none());
    }

    #[test]
    fn test_last_value_wins() {
        let mut kv = KV::new();
        kv.push("k", 1);
        kv.push("k", 2);
        assert_eq!(kv.get("k").unwrap(), "2");
    }
}

//! Internal → external host mapping for redirect targets.
//!
//! NameNodes report DataNode identities as seen from inside the cluster.
//! When the client sits on another network those names may not resolve, so
//! a static table rewrites them before the data connection is opened.

use ahash::{HashMap, HashMapExt};

#[derive(Clone, Debug, Default)]
pub struct AddressTranslator {
    table: HashMap<String, String>,
}

impl AddressTranslator {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn insert(&mut self, internal: impl Into<String>, external: impl Into<String>) {
        self.table.insert(internal.into(), external.into());
    }

    /// Mapped host, or `host` itself when no mapping exists.
    pub fn translate<'a>(&'a self, host: &'a str) -> &'a str {
        self.table.get(host).map(String::as_str).unwrap_or(host)
    }
}

impl<K, V> FromIterator<(K, V)> for AddressTranslator
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut translator = AddressTranslator::new();
        for (internal, external) in iter {
            translator.insert(internal, external);
        }
        translator
    }
}

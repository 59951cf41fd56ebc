//! Case-insensitive containers that remember the canonical spelling of their keys.
//!
//! Schema names are accepted in any case (`mAgNeTiSm` and `magnetism` resolve alike),
//! while every emitted XPath must use the case found in the schema. Both containers store
//! the lowercased key next to the canonical one.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

fn normalize(key: &str) -> String {
    key.to_lowercase()
}

/// Set of names compared case-insensitively
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CaseInsensitiveSet {
    original_case: BTreeMap<String, String>,
}

impl CaseInsensitiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a name; the first spelling inserted is kept as canonical
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        let key = normalize(&name);
        if self.original_case.contains_key(&key) {
            return false;
        }
        self.original_case.insert(key, name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.original_case.contains_key(&normalize(name))
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.original_case.remove(&normalize(name)).is_some()
    }

    /// Canonical spelling of `name`, if present
    pub fn original_case(&self, name: &str) -> Option<&str> {
        self.original_case.get(&normalize(name)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.original_case.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original_case.is_empty()
    }

    /// Canonical names, ordered by their lowercased form
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.original_case.values().map(String::as_str)
    }

    pub fn union(&self, other: &CaseInsensitiveSet) -> CaseInsensitiveSet {
        let mut result = self.clone();
        for name in other.iter() {
            result.insert(name);
        }
        result
    }
}

impl<S: Into<String>> FromIterator<S> for CaseInsensitiveSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = CaseInsensitiveSet::new();
        for name in iter {
            set.insert(name);
        }
        set
    }
}

impl<S: Into<String>> Extend<S> for CaseInsensitiveSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for name in iter {
            self.insert(name);
        }
    }
}

impl fmt::Debug for CaseInsensitiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for CaseInsensitiveSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for name in self.iter() {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

/// Map keyed by names compared case-insensitively
#[derive(Clone, PartialEq)]
pub struct CaseInsensitiveMap<V> {
    entries: BTreeMap<String, V>,
    original_case: BTreeMap<String, String>,
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            original_case: BTreeMap::new(),
        }
    }
}

impl<V> CaseInsensitiveMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous entry of the same name
    pub fn insert(&mut self, name: impl Into<String>, value: V) -> Option<V> {
        let name = name.into();
        let key = normalize(&name);
        self.original_case.entry(key.clone()).or_insert(name);
        self.entries.insert(key, value)
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(&normalize(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.entries.get_mut(&normalize(name))
    }

    /// Value for `name`, inserting `default()` first if absent
    pub fn get_or_insert_with(&mut self, name: &str, default: impl FnOnce() -> V) -> &mut V {
        let key = normalize(name);
        self.original_case
            .entry(key.clone())
            .or_insert_with(|| name.to_string());
        self.entries.entry(key).or_insert_with(default)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<V> {
        let key = normalize(name);
        self.original_case.remove(&key);
        self.entries.remove(&key)
    }

    /// Canonical spelling of `name`, if present
    pub fn original_case(&self, name: &str) -> Option<&str> {
        self.original_case.get(&normalize(name)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with their canonical names
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| {
            let name = self
                .original_case
                .get(key)
                .map(String::as_str)
                .unwrap_or(key.as_str());
            (name, value)
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(name, _)| name)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }
}

impl<V: fmt::Debug> fmt::Debug for CaseInsensitiveMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V: Serialize> Serialize for CaseInsensitiveMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for CaseInsensitiveMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = CaseInsensitiveMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_lookup_ignores_case() {
        let set: CaseInsensitiveSet = ["kPointList", "Magnetism"].into_iter().collect();
        assert!(set.contains("kpointlist"));
        assert!(set.contains("MAGNETISM"));
        assert_eq!(set.original_case("KPOINTLIST"), Some("kPointList"));
        assert!(!set.contains("species"));
    }

    #[test]
    fn test_set_keeps_first_spelling() {
        let mut set = CaseInsensitiveSet::new();
        assert!(set.insert("jspins"));
        assert!(!set.insert("JSPINS"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["jspins"]);
    }

    #[test]
    fn test_map_lookup_and_canonical_keys() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("radius", vec!["/a/@radius".to_string()]);
        map.get_or_insert_with("Kmax", Vec::new)
            .push("/b/@Kmax".to_string());

        assert_eq!(map.get("RADIUS").map(Vec::len), Some(1));
        assert_eq!(map.original_case("kmax"), Some("Kmax"));
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["Kmax", "radius"]);
    }

    #[test]
    fn test_map_serializes_canonical_names() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("fleurInput", 1);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"fleurInput":1}"#);
    }
}

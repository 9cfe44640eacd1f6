//! Enrolled fingerprint cache
//!
//! Mirrors the set of template names fpd knows about. Only membership
//! matters to the wake policy ("is anything enrolled at all").

use std::collections::BTreeSet;
use tracing::{debug, warn};

use mce_protocol::validate_template_name;

#[derive(Debug, Default)]
pub struct FingerprintData {
    names: BTreeSet<String>,
}

impl FingerprintData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template, returning true if the set changed
    pub fn add(&mut self, name: &str) -> bool {
        if let Err(e) = validate_template_name(name) {
            warn!("fingerprint {:?} ignored: {}", name, e);
            return false;
        }
        let added = self.names.insert(name.to_string());
        if added {
            debug!("fingerprint added: {}", name);
        }
        added
    }

    /// Remove a template, returning true if the set changed
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.names.remove(name);
        if removed {
            debug!("fingerprint removed: {}", name);
        }
        removed
    }

    /// Replace contents with a full listing from fpd
    pub fn replace<I, S>(&mut self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fresh = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            match validate_template_name(name) {
                Ok(()) => {
                    fresh.insert(name.to_string());
                }
                Err(e) => warn!("fingerprint {:?} ignored: {}", name, e),
            }
        }
        if fresh == self.names {
            return false;
        }
        self.names = fresh;
        debug!("fingerprints: {}", self.names.len());
        true
    }

    pub fn clear(&mut self) -> bool {
        if self.names.is_empty() {
            return false;
        }
        self.names.clear();
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let mut data = FingerprintData::new();
        assert!(data.is_empty());
        assert!(data.add("alice"));
        assert!(!data.add("alice"));
        assert!(data.contains("alice"));
        assert!(data.remove("alice"));
        assert!(!data.remove("alice"));
        assert!(data.is_empty());
    }

    #[test]
    fn test_replace_reports_changes() {
        let mut data = FingerprintData::new();
        assert!(data.replace(["a", "b"]));
        assert!(!data.replace(vec!["b".to_string(), "a".to_string()]));
        assert!(data.replace(["a"]));
        assert_eq!(data.iter().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_invalid_names_skipped() {
        let mut data = FingerprintData::new();
        assert!(!data.add(""));
        assert!(data.replace(["ok", "bad\nname"]));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut data = FingerprintData::new();
        assert!(!data.clear());
        data.add("x");
        assert!(data.clear());
        assert!(data.is_empty());
    }
}

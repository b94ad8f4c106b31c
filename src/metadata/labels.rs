//! Vendor label lookup.
//!
//! Translating numeric codes (lens ids, mode numbers) into text is the job of
//! external tables. The engine only needs the call contract:
//! `(vendor, key, code) -> label or unknown`.

use std::collections::HashMap;

use super::ExifKey;

/// Resolves a numeric code of a metadata entry to a human-readable label.
pub trait LabelLookup {
    /// Label for `code` of `key` in files from `vendor`, if one is known.
    fn label(&self, vendor: &str, key: ExifKey, code: i64) -> Option<String>;
}

/// A lookup that never knows a label.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLabels;

impl LabelLookup for NoLabels {
    fn label(&self, _vendor: &str, _key: ExifKey, _code: i64) -> Option<String> {
        None
    }
}

/// In-memory label table.
///
/// Vendor `"*"` matches any make; vendor-specific entries match by
/// case-insensitive prefix of the make and take precedence.
#[derive(Debug, Clone, Default)]
pub struct StaticLabels {
    entries: HashMap<(String, ExifKey, i64), String>,
}

impl StaticLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, vendor: &str, key: ExifKey, code: i64, label: impl Into<String>) {
        self.entries
            .insert((vendor.to_ascii_lowercase(), key, code), label.into());
    }
}

impl LabelLookup for StaticLabels {
    fn label(&self, vendor: &str, key: ExifKey, code: i64) -> Option<String> {
        let make = vendor.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|((v, k, c), _)| *k == key && *c == code && v != "*" && make.starts_with(v.as_str()))
            .map(|(_, label)| label.clone())
            .next()
            .or_else(|| self.entries.get(&("*".to_string(), key, code)).cloned())
    }
}

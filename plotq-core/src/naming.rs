//! Fragment naming convention.
//!
//! Generators name each fragment
//! `<canonical><d><seq><d><timestamp><d><seq><d><length>`, where `<d>` is one
//! reserved delimiter character. The canonical field groups fragments into
//! batches in named-entry mode.

use serde::{Deserialize, Serialize};

pub const DEFAULT_DELIMITER: char = '_';

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameConvention {
    pub delimiter: char,
    /// Zero-based delimiter-separated field holding the canonical name.
    pub field: usize,
}

impl Default for NameConvention {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            field: 0,
        }
    }
}

impl NameConvention {
    pub fn new(delimiter: char, field: usize) -> Self {
        Self { delimiter, field }
    }

    /// Total: names with fewer than two delimiters, or whose selected field is
    /// missing or empty, come back unchanged.
    pub fn canonical<'a>(&self, raw: &'a str) -> &'a str {
        if raw.matches(self.delimiter).count() < 2 {
            return raw;
        }
        match raw.split(self.delimiter).nth(self.field) {
            Some(f) if !f.is_empty() => f,
            _ => raw,
        }
    }

    /// Trailing field parsed as the fragment length, when it is numeric.
    pub fn length_suffix(&self, raw: &str) -> Option<u64> {
        let (_, tail) = raw.rsplit_once(self.delimiter)?;
        tail.parse().ok()
    }
}

/// Canonical name under the default convention.
pub fn canonical_name(raw: &str) -> &str {
    NameConvention::default().canonical(raw)
}

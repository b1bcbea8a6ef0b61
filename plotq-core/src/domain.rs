// plotq_core/src/domain.rs
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One device-visible queue entry, as reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceFragment {
    pub raw_name: String,
    pub length: u64,
}

impl DeviceFragment {
    pub fn new(raw_name: impl Into<String>, length: u64) -> Self {
        Self {
            raw_name: raw_name.into(),
            length,
        }
    }
}

/// A submitted unit of work, shown as one row in the operator report.
///
/// `fragments` is keyed by raw name. Insertion order is irrelevant; the
/// lexicographic order of the map is only used for rendering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    pub name: String,
    pub declared_size: u64,
    pub fragments: BTreeMap<String, u64>,
    pub duplicates: Vec<String>,
}

impl Batch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn fragment_count(&self) -> u64 {
        self.fragments.len() as u64
    }

    /// Record a fragment. A raw name already present goes to `duplicates` and
    /// does not count towards the size. Returns `false` for a duplicate.
    pub fn add_fragment(&mut self, raw_name: &str, length: u64) -> bool {
        if self.fragments.contains_key(raw_name) {
            self.duplicates.push(raw_name.to_string());
            return false;
        }
        self.fragments.insert(raw_name.to_string(), length);
        self.declared_size += length;
        true
    }

    /// Sum of the individually observed fragment lengths.
    pub fn observed_size(&self) -> u64 {
        self.fragments.values().sum()
    }
}

/// Aggregate-only view of the undrained tail of the oldest surviving batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Remainder {
    pub batch_name: String,
    pub remaining_count: u64,
    pub remaining_size: u64,
}

/// Returned by `submit`; carries the provider counters seen before the write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchHandle {
    pub id: u64,
    pub name: String,
    pub before_length: u64,
    pub before_size: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DetailLevel {
    #[default]
    None,
    Detail,
    DetailWithPayload,
}

impl DetailLevel {
    pub fn shows_fragments(self) -> bool {
        !matches!(self, DetailLevel::None)
    }
}

/// What the output device can tell us about its backlog.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Aggregate length/size only, e.g. a plotter behind a counted serial buffer.
    #[default]
    CountedBuffer,
    /// Individually named jobs, e.g. a print spooler.
    NamedSpooler,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::CountedBuffer => write!(f, "counted buffer"),
            Capability::NamedSpooler => write!(f, "named spooler"),
        }
    }
}

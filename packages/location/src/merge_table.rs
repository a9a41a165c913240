//! Legacy organization code canonicalization.
//!
//! Organizations are periodically merged (most notably the April 2020 CCG
//! reconfiguration), but feeds and reference files keep reporting under the
//! retired codes. The [`MergeTable`] maps every retired code directly onto
//! the code that replaced it. The default table is embedded from
//! `merges/ccg_2020.toml` at compile time.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::LocationError;

/// The merge table baked into the binary.
const DEFAULT_MERGES_TOML: &str = include_str!("../merges/ccg_2020.toml");

/// One merged organization as written in TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeGroup {
    /// The code that replaced the legacy codes.
    pub canonical: String,
    /// Name of the merged organization (informational).
    #[serde(default)]
    pub name: Option<String>,
    /// Retired codes that now resolve to `canonical`.
    pub legacy: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MergeFile {
    #[serde(default)]
    merge: Vec<MergeGroup>,
}

/// Mapping from retired organization codes to canonical codes.
///
/// Resolution is a single lookup; codes absent from the table resolve to
/// themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeTable {
    entries: BTreeMap<String, String>,
}

impl MergeTable {
    /// Builds a table from merge groups.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::MergeTable`] if a legacy code is claimed by
    /// two different canonical codes, or if a canonical code is itself a
    /// legacy code (which would require chained resolution).
    pub fn from_groups(groups: &[MergeGroup]) -> Result<Self, LocationError> {
        let mut entries = BTreeMap::new();

        for group in groups {
            for legacy in &group.legacy {
                let legacy = legacy.trim();
                if legacy == group.canonical {
                    continue;
                }
                if let Some(existing) = entries.insert(legacy.to_owned(), group.canonical.clone())
                    && existing != group.canonical
                {
                    return Err(LocationError::MergeTable {
                        message: format!(
                            "{legacy} maps to both {existing} and {}",
                            group.canonical
                        ),
                    });
                }
            }
        }

        if let Some((legacy, canonical)) = entries
            .iter()
            .find(|(_, canonical)| entries.contains_key(canonical.as_str()))
        {
            return Err(LocationError::MergeTable {
                message: format!(
                    "{legacy} resolves to {canonical}, which is itself a retired code"
                ),
            });
        }

        Ok(Self { entries })
    }

    /// Parses a merge table from TOML (`[[merge]]` tables with `canonical`
    /// and `legacy` keys).
    ///
    /// # Errors
    ///
    /// Returns [`LocationError`] if the TOML is malformed or the table is
    /// inconsistent.
    pub fn from_toml(toml_str: &str) -> Result<Self, LocationError> {
        let file: MergeFile = toml::de::from_str(toml_str)?;
        Self::from_groups(&file.merge)
    }

    /// Returns the embedded CCG merge table.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed. The file is compiled into
    /// the binary, so this is caught by the tests below.
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml(DEFAULT_MERGES_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse ccg_2020.toml: {e}"))
    }

    /// Resolves `code` to its canonical code. Never fails.
    #[must_use]
    pub fn resolve<'a>(&'a self, code: &'a str) -> &'a str {
        self.entries.get(code).map_or(code, String::as_str)
    }

    /// Returns `true` if `code` is a retired code.
    #[must_use]
    pub fn is_legacy(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Iterates `(legacy, canonical)` pairs in legacy-code order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(legacy, canonical)| (legacy.as_str(), canonical.as_str()))
    }

    /// Number of legacy codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

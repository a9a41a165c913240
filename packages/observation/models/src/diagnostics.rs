//! Non-fatal anomalies collected during a run.

use std::collections::BTreeMap;

use covid_stats_location_models::BrokenLink;
use serde::{Deserialize, Serialize};

/// A single input row that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedRecord {
    /// Feed id or reference file name.
    pub source: String,
    /// 1-based line (or entry index).
    pub line: u64,
    /// What was wrong with it.
    pub message: String,
}

/// Everything the run skipped or flagged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// Codes with no known organization, mapped to their preferred label.
    pub missing_locations: BTreeMap<String, String>,
    /// Broken parent links in the hierarchy.
    pub broken_links: Vec<BrokenLink>,
    /// Skipped rows.
    pub malformed: Vec<MalformedRecord>,
}

impl Diagnostics {
    /// Records an unresolvable code. Returns `true` on first sighting.
    ///
    /// When a code is seen with several labels, the kept label does not
    /// depend on arrival order: a real name beats the bare code, and among
    /// names the lexicographically smallest wins.
    pub fn record_missing(&mut self, code: &str, label: &str) -> bool {
        let label = label.trim();
        let label = if label.is_empty() { code } else { label };

        match self.missing_locations.get_mut(code) {
            Some(kept) => {
                if label_rank(code, label) < label_rank(code, kept) {
                    label.clone_into(kept);
                }
                false
            }
            None => {
                self.missing_locations
                    .insert(code.to_owned(), label.to_owned());
                true
            }
        }
    }

    /// Records a skipped row.
    pub fn record_malformed(&mut self, source: &str, line: u64, message: impl Into<String>) {
        self.malformed.push(MalformedRecord {
            source: source.to_owned(),
            line,
            message: message.into(),
        });
    }

    /// Folds `other` into `self`. Labels of codes present in both are
    /// chosen as in [`Self::record_missing`].
    pub fn extend(&mut self, other: Self) {
        for (code, label) in other.missing_locations {
            self.record_missing(&code, &label);
        }
        for link in other.broken_links {
            if !self.broken_links.contains(&link) {
                self.broken_links.push(link);
            }
        }
        self.broken_links.sort();
        self.malformed.extend(other.malformed);
    }

    /// Returns `true` if nothing was flagged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing_locations.is_empty() && self.broken_links.is_empty() && self.malformed.is_empty()
    }
}

fn label_rank<'a>(code: &str, label: &'a str) -> (bool, &'a str) {
    (label == code, label)
}

#[cfg(test)]
mod tests {
    use covid_stats_location_models::BrokenLinkKind;

    use super::*;

    #[test]
    fn missing_code_reported_once() {
        let mut diagnostics = Diagnostics::default();
        assert!(diagnostics.record_missing("ZZ99999", "Somewhere"));
        assert!(!diagnostics.record_missing("ZZ99999", "Somewhere"));
        assert_eq!(diagnostics.missing_locations.len(), 1);
        assert_eq!(diagnostics.missing_locations["ZZ99999"], "Somewhere");
    }

    #[test]
    fn missing_label_does_not_depend_on_arrival_order() {
        let labels = ["Somewhere", "", "ZZ99999", "Elsewhere", "  "];

        let mut forward = Diagnostics::default();
        for label in labels {
            forward.record_missing("ZZ99999", label);
        }
        let mut backward = Diagnostics::default();
        for label in labels.iter().rev() {
            backward.record_missing("ZZ99999", label);
        }

        assert_eq!(forward.missing_locations["ZZ99999"], "Elsewhere");
        assert_eq!(forward, backward);
    }

    #[test]
    fn blank_label_falls_back_to_code() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.record_missing("ZZ1", " ");
        assert_eq!(diagnostics.missing_locations["ZZ1"], "ZZ1");

        diagnostics.record_missing("ZZ1", "Named");
        assert_eq!(diagnostics.missing_locations["ZZ1"], "Named");
    }

    #[test]
    fn extend_picks_the_same_label_either_way() {
        let mut a = Diagnostics::default();
        a.record_missing("ZZ1", "Beta");
        let mut b = Diagnostics::default();
        b.record_missing("ZZ1", "Alpha");

        let mut ab = a.clone();
        ab.extend(b.clone());
        let mut ba = b;
        ba.extend(a);

        assert_eq!(ab.missing_locations["ZZ1"], "Alpha");
        assert_eq!(ab, ba);
    }

    #[test]
    fn extend_deduplicates_broken_links() {
        let link = BrokenLink {
            code: "X".to_string(),
            parent: "GONE".to_string(),
            kind: BrokenLinkKind::UnknownParent,
        };
        let mut a = Diagnostics {
            broken_links: vec![link.clone()],
            ..Diagnostics::default()
        };
        let mut b = Diagnostics {
            broken_links: vec![link],
            ..Diagnostics::default()
        };
        b.record_missing("ZZ1", "z");
        b.record_malformed("feed", 3, "bad value");

        a.extend(b);
        assert_eq!(a.broken_links.len(), 1);
        assert_eq!(a.missing_locations.len(), 1);
        assert_eq!(a.malformed.len(), 1);
        assert!(!a.is_empty());
    }
}

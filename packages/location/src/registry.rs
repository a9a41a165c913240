//! The organization hierarchy.
//!
//! Built once from the loaded [`LocationNode`]s. Parent links are checked
//! at construction: links to unknown codes are kept on the node but
//! reported as [`BrokenLink`]s, and any parent cycle is broken by detaching
//! the node that closes it. After construction the parent graph is a
//! forest, so every ancestor walk terminates.

use std::collections::{BTreeMap, BTreeSet};

use covid_stats_location_models::{BrokenLink, BrokenLinkKind, LocationNode};

use crate::MergeTable;

/// Immutable organization hierarchy plus the merge table used to
/// canonicalize incoming codes.
#[derive(Debug, Clone, Default)]
pub struct LocationRegistry {
    nodes: BTreeMap<String, LocationNode>,
    children: BTreeMap<String, BTreeSet<String>>,
    merges: MergeTable,
    broken_links: Vec<BrokenLink>,
}

impl LocationRegistry {
    /// Builds the registry. When two nodes share a code the later one wins.
    #[must_use]
    pub fn new(nodes: impl IntoIterator<Item = LocationNode>, merges: MergeTable) -> Self {
        let mut nodes: BTreeMap<String, LocationNode> = nodes
            .into_iter()
            .map(|node| (node.code.clone(), node))
            .collect();

        let mut broken_links = Vec::new();
        break_cycles(&mut nodes, &mut broken_links);

        let mut children: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for node in nodes.values() {
            let Some(parent) = &node.parent else {
                continue;
            };
            if nodes.contains_key(parent) {
                children
                    .entry(parent.clone())
                    .or_default()
                    .insert(node.code.clone());
            } else {
                log::warn!(
                    "Location {} has unknown parent {parent}; rollup stops at {}",
                    node.code,
                    node.code
                );
                broken_links.push(BrokenLink {
                    code: node.code.clone(),
                    parent: parent.clone(),
                    kind: BrokenLinkKind::UnknownParent,
                });
            }
        }
        broken_links.sort();

        Self {
            nodes,
            children,
            merges,
            broken_links,
        }
    }

    /// Applies the merge table once. Unknown codes pass through unchanged.
    #[must_use]
    pub fn resolve<'a>(&'a self, code: &'a str) -> &'a str {
        self.merges.resolve(code)
    }

    /// Returns `true` if `code` is a known organization.
    #[must_use]
    pub fn exists(&self, code: &str) -> bool {
        self.nodes.contains_key(code)
    }

    /// Looks up a node by code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&LocationNode> {
        self.nodes.get(code)
    }

    /// Returns the parent code, if the node exists and its parent is a
    /// known organization.
    #[must_use]
    pub fn parent_of(&self, code: &str) -> Option<&str> {
        let parent = self.nodes.get(code)?.parent.as_deref()?;
        self.nodes.contains_key(parent).then_some(parent)
    }

    /// Returns the direct children of `code`. Empty for leaves and unknown
    /// codes.
    #[must_use]
    pub fn children_of(&self, code: &str) -> Vec<&str> {
        self.children
            .get(code)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns every resolvable ancestor of `code`, nearest first.
    #[must_use]
    pub fn ancestors(&self, code: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut current = code;
        while let Some(parent) = self.parent_of(current) {
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Number of resolvable ancestors (0 for roots and unknown codes).
    #[must_use]
    pub fn depth(&self, code: &str) -> usize {
        self.ancestors(code).len()
    }

    /// The broken link recorded for `code`, if any.
    #[must_use]
    pub fn broken_link(&self, code: &str) -> Option<&BrokenLink> {
        self.broken_links.iter().find(|link| link.code == code)
    }

    /// All broken links, sorted by code.
    #[must_use]
    pub fn broken_links(&self) -> &[BrokenLink] {
        &self.broken_links
    }

    /// The merge table this registry resolves through.
    #[must_use]
    pub const fn merges(&self) -> &MergeTable {
        &self.merges
    }

    /// Iterates all nodes in code order.
    pub fn nodes(&self) -> impl Iterator<Item = &LocationNode> {
        self.nodes.values()
    }

    /// Number of organizations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the registry holds no organizations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Walks every parent chain in code order and detaches the node whose
/// parent link closes a cycle.
fn break_cycles(nodes: &mut BTreeMap<String, LocationNode>, broken: &mut Vec<BrokenLink>) {
    let codes: Vec<String> = nodes.keys().cloned().collect();
    let mut done: BTreeSet<String> = BTreeSet::new();

    for start in codes {
        if done.contains(&start) {
            continue;
        }

        let mut path: Vec<String> = Vec::new();
        let mut on_path: BTreeSet<String> = BTreeSet::new();
        let mut current = start;

        loop {
            if done.contains(&current) {
                break;
            }
            if !on_path.insert(current.clone()) {
                if let Some(closing) = path.last()
                    && let Some(node) = nodes.get_mut(closing)
                    && let Some(parent) = node.parent.take()
                {
                    log::warn!("Location {closing} closes a parent cycle via {parent}; detached");
                    broken.push(BrokenLink {
                        code: closing.clone(),
                        parent,
                        kind: BrokenLinkKind::Cycle,
                    });
                }
                break;
            }
            path.push(current.clone());

            match nodes.get(&current).and_then(|n| n.parent.clone()) {
                Some(parent) if nodes.contains_key(&parent) => current = parent,
                _ => break,
            }
        }

        done.extend(path);
    }
}

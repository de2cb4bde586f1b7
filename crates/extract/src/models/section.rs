//! Arena-backed tree of document sections and their word counts.

use std::collections::BTreeMap;

/// Index of a node inside a [`SectionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(usize);

/// A single node of a [`SectionTree`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    /// Word count recorded for this section alone; children are not summed in.
    pub count: u64,
    parent: Option<SectionId>,
    children: BTreeMap<String, SectionId>,
}
impl Section {
    pub fn parent(&self) -> Option<SectionId> {
        self.parent
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, SectionId)> {
        self.children.iter().map(|(key, id)| (key.as_str(), *id))
    }

    pub fn child(&self, key: &str) -> Option<SectionId> {
        self.children.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Hierarchy of sections, owned as a flat arena.
///
/// Parent links are indices into the arena rather than pointers, so the tree
/// can be walked upwards during a single-pass parse without shared ownership.
/// The root always exists and has no parent.
///
/// Two trees are equal when they hold the same keys and counts under the same
/// parents, whatever order the nodes were inserted in.
#[derive(Debug, Clone)]
pub struct SectionTree {
    nodes: Vec<Section>,
}
impl Default for SectionTree {
    fn default() -> Self {
        Self {
            nodes: vec![Section::default()],
        }
    }
}
impl PartialEq for SectionTree {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self.root(), other.root())];
        while let Some((left, right)) = pending.pop() {
            let (left, right) = (self.get(left), other.get(right));
            if left.count != right.count || left.len() != right.len() {
                return false;
            }
            for ((left_key, left_id), (right_key, right_id)) in left.children().zip(right.children()) {
                if left_key != right_key {
                    return false;
                }
                pending.push((left_id, right_id));
            }
        }
        true
    }
}
impl Eq for SectionTree {}

impl SectionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> SectionId {
        SectionId(0)
    }

    /// Look up a node.
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn get(&self, id: SectionId) -> &Section {
        &self.nodes[id.0]
    }

    pub fn set_count(&mut self, id: SectionId, count: u64) {
        self.nodes[id.0].count = count;
    }

    pub fn parent(&self, id: SectionId) -> Option<SectionId> {
        self.get(id).parent
    }

    /// Insert (or revisit) the child `key` of `parent` and record its count.
    ///
    /// A key that already exists under `parent` keeps its node and subtree;
    /// only the count is overwritten.
    pub fn insert(&mut self, parent: SectionId, key: impl Into<String>, count: u64) -> SectionId {
        let key = key.into();
        if let Some(existing) = self.get(parent).child(&key) {
            self.set_count(existing, count);
            return existing;
        }
        let id = SectionId(self.nodes.len());
        self.nodes.push(Section {
            count,
            parent: Some(parent),
            children: BTreeMap::new(),
        });
        self.nodes[parent.0].children.insert(key, id);
        id
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when only an untouched root is present.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[0].count == 0
    }
}

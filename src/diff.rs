pub mod restore;
pub mod save;

use std::collections::BTreeMap;
use std::fmt;

use crate::data::{ItemId, OsmObject};
use crate::graph::OsmGraph;

pub use self::restore::{diff_restore, diff_restore_file};
pub use self::save::{diff_save, generate_diff};

/// Outcome of restoring a diff file, as a set of bits. An empty set means
/// the diff was restored without any remarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreStatus(u32);

impl RestoreStatus {
    pub const RESTORED: RestoreStatus = RestoreStatus(0);
    /// There is no diff file.
    pub const NONE_PRESENT: RestoreStatus = RestoreStatus(1 << 0);
    /// The file could not be read or is not a diff.
    pub const INVALID: RestoreStatus = RestoreStatus(1 << 1);
    /// The diff was written for another project.
    pub const PROJECT_MISMATCH: RestoreStatus = RestoreStatus(1 << 2);
    /// Some entries did not match the map data and were skipped.
    pub const ELEMENTS_IGNORED: RestoreStatus = RestoreStatus(1 << 3);
    /// At least one way was hidden again.
    pub const HAS_HIDDEN: RestoreStatus = RestoreStatus(1 << 4);

    pub fn contains(self, other: RestoreStatus) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RestoreStatus) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for RestoreStatus {
    type Output = RestoreStatus;

    fn bitor(self, rhs: RestoreStatus) -> RestoreStatus {
        RestoreStatus(self.0 | rhs.0)
    }
}

impl fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(RestoreStatus, &str); 5] = [
            (RestoreStatus::NONE_PRESENT, "none present"),
            (RestoreStatus::INVALID, "invalid"),
            (RestoreStatus::PROJECT_MISMATCH, "project mismatch"),
            (RestoreStatus::ELEMENTS_IGNORED, "elements ignored"),
            (RestoreStatus::HAS_HIDDEN, "has hidden"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "restored")
        } else {
            write!(f, "{}", names.join(", "))
        }
    }
}

/// Ids of the objects of one type that differ from the downloaded data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyIds {
    /// Created locally.
    pub added: Vec<ItemId>,
    /// Uploaded before and modified since.
    pub changed: Vec<ItemId>,
    /// Uploaded before and deleted since.
    pub deleted: Vec<ItemId>,
}

impl DirtyIds {
    fn collect<T: OsmObject>(objects: &BTreeMap<ItemId, T>) -> Self {
        let mut ids = DirtyIds::default();
        for (id, object) in objects {
            let base = object.base();
            if base.is_deleted() {
                ids.deleted.push(*id);
            } else if base.is_new() {
                ids.added.push(*id);
            } else if base.is_dirty() {
                ids.changed.push(*id);
            }
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Everything that would have to be uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySummary {
    pub nodes: DirtyIds,
    pub ways: DirtyIds,
    pub relations: DirtyIds,
}

impl DirtySummary {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.ways.is_empty() && self.relations.is_empty()
    }
}

impl fmt::Display for DirtySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, ids) in [
            ("nodes", &self.nodes),
            ("ways", &self.ways),
            ("relations", &self.relations),
        ] {
            writeln!(
                f,
                "{name}: {} added, {} changed, {} deleted",
                ids.added.len(),
                ids.changed.len(),
                ids.deleted.len()
            )?;
        }
        Ok(())
    }
}

fn is_unchanged<T: OsmObject>(objects: &BTreeMap<ItemId, T>) -> bool {
    objects.values().all(|object| {
        let base = object.base();
        !base.is_dirty() && !base.is_deleted()
    })
}

impl OsmGraph {
    pub fn dirty_summary(&self) -> DirtySummary {
        DirtySummary {
            nodes: DirtyIds::collect(self.nodes()),
            ways: DirtyIds::collect(self.ways()),
            relations: DirtyIds::collect(self.relations()),
        }
    }

    /// True if nothing has to be saved. Hidden ways only count if
    /// `honor_hidden` is set.
    pub fn is_clean(&self, honor_hidden: bool) -> bool {
        if honor_hidden && !self.hidden_ways().is_empty() {
            return false;
        }
        // new objects have negative ids and sort first
        let lowest = [
            self.nodes().keys().next(),
            self.ways().keys().next(),
            self.relations().keys().next(),
        ];
        if lowest.into_iter().flatten().any(|id| *id < 0) {
            return false;
        }
        is_unchanged(self.nodes()) && is_unchanged(self.ways()) && is_unchanged(self.relations())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Base, Node, ObjectRef, Pos, TagList};
    use crate::graph::test_support::*;
    use crate::graph::NodeDeleteMode;
    use crate::map::NoMap;

    #[test]
    fn summary_classifies_objects() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3]);
        add_way(&mut graph, 10, &[1, 2]);
        assert!(graph.is_clean(true));

        let new = graph.attach_node(graph.node_new(Pos::new(52.2694, 9.5753)));
        graph.set_tags(&ObjectRef::Node(2), tags(&[("name", "x")]));
        graph.node_delete(3, NodeDeleteMode::RemoveRefs, &mut NoMap);

        let summary = graph.dirty_summary();
        assert_eq!(summary.nodes.added, vec![new]);
        assert_eq!(summary.nodes.changed, vec![2]);
        assert_eq!(summary.nodes.deleted, vec![3]);
        assert!(summary.ways.is_empty());
        assert!(!graph.is_clean(false));
    }

    #[test]
    fn hidden_ways_only_count_when_asked() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2]);
        add_way(&mut graph, 10, &[1, 2]);
        graph.way_hide(10);
        assert!(graph.is_clean(false));
        assert!(!graph.is_clean(true));
    }

    #[test]
    fn cleanliness_follows_edits_and_new_objects() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1]);
        graph.set_tags(&ObjectRef::Node(1), tags(&[("name", "x")]));
        assert!(!graph.is_clean(false));
        graph.set_tags(&ObjectRef::Node(1), TagList::new());
        assert!(graph.is_clean(false));

        // a new object counts even without its dirty flag
        let unflagged = Base {
            version: 1,
            ..Base::new(-5)
        };
        graph.insert_node(Node::new(unflagged, Pos::new(52.2694, 9.5753)));
        assert!(!graph.is_clean(false));
    }

    #[test]
    fn status_bits_combine() {
        let status = RestoreStatus::RESTORED | RestoreStatus::HAS_HIDDEN;
        assert!(status.contains(RestoreStatus::HAS_HIDDEN));
        assert!(!status.contains(RestoreStatus::INVALID));
        assert_eq!(status.to_string(), "has hidden");
        assert_eq!(RestoreStatus::RESTORED.to_string(), "restored");
    }
}

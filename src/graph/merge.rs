use log::{debug, info};

use super::delete::{collapse_adjacent, NodeDeleteMode};
use super::OsmGraph;
use crate::data::{ItemId, Node, ObjectKind, ObjectRef, Relation, Way};
use crate::map::MapCollaborator;

impl OsmGraph {
    /// Decides which of two objects of the same type survives a merge.
    /// Returns true if `first` should be kept.
    ///
    /// The rules are tried in order until one decides:
    /// 1. an uploaded object wins over a new one,
    /// 2. the one that is member of more relations,
    /// 3. the node used by more ways, or the way with more nodes,
    /// 4. the higher version,
    /// 5. the older id: the lower positive one, or for two new objects the
    ///    one created first.
    ///
    /// # Panics
    /// If the references are of different kinds, not in the graph, or are
    /// relations.
    pub fn check_object_persistence(&self, first: &ObjectRef, second: &ObjectRef) -> bool {
        assert_eq!(first.kind(), second.kind(), "cannot merge {first} with {second}");
        let (Some(a), Some(b)) = (self.object_base(first), self.object_base(second)) else {
            panic!("cannot merge {first} with {second}, object missing");
        };

        if a.is_new() != b.is_new() {
            return !a.is_new();
        }

        let relations_a = self.object_to_relations(first).len();
        let relations_b = self.object_to_relations(second).len();
        if relations_a != relations_b {
            return relations_a > relations_b;
        }

        let (uses_a, uses_b) = match first.kind() {
            Some(ObjectKind::Node) => (
                self.node(a.id).map_or(0, |node| node.ways as usize),
                self.node(b.id).map_or(0, |node| node.ways as usize),
            ),
            Some(ObjectKind::Way) => (
                self.way(a.id).map_or(0, |way| way.node_chain.len()),
                self.way(b.id).map_or(0, |way| way.node_chain.len()),
            ),
            _ => panic!("merging relations is not supported"),
        };
        if uses_a != uses_b {
            return uses_a > uses_b;
        }

        if a.version != b.version {
            return a.version > b.version;
        }

        // new ids count down, so the one closest to zero is the oldest
        if a.is_new() {
            a.id > b.id
        } else {
            a.id < b.id
        }
    }

    /// Merges two nodes into one. The surviving node is placed at the
    /// position of `second`, takes over all way and relation memberships of
    /// the other one, and gets the tags of both.
    ///
    /// Returns the id of the surviving node and whether the tags conflict.
    pub fn merge_nodes(
        &mut self,
        first: ItemId,
        second: ItemId,
        map: &mut dyn MapCollaborator,
    ) -> (ItemId, bool) {
        assert_ne!(first, second, "cannot merge node #{first} with itself");
        let (keep, remove) =
            if self.check_object_persistence(&ObjectRef::Node(first), &ObjectRef::Node(second)) {
                (first, second)
            } else {
                (second, first)
            };
        debug!(keep = keep, remove = remove; "Merging nodes");

        let Some(target) = self.node(second).map(|node| node.pos) else {
            panic!("cannot merge unknown node #{second}");
        };

        let mut short_ways = Vec::new();
        for way in self.node_to_ways(remove) {
            let Some(mut chain) = self.way(way).map(|way| way.node_chain.clone()) else {
                continue;
            };
            for node in chain.iter_mut().filter(|node| **node == remove) {
                *node = keep;
            }
            collapse_adjacent(&mut chain);
            let short = chain.len() < 2;
            self.way_set_chain(way, chain);
            if short {
                short_ways.push(way);
            } else {
                map.redraw(ObjectRef::Way(way));
            }
        }

        for relation in self.object_to_relations(&ObjectRef::Node(remove)) {
            self.modify::<Relation, _>(relation, |relation| {
                for member in &mut relation.members {
                    if member.object == ObjectRef::Node(remove) {
                        member.object = ObjectRef::Node(keep);
                    }
                }
            });
        }

        let removed_tags = self
            .node(remove)
            .map(|node| node.base.tags.clone())
            .unwrap_or_default();
        let lpos = self.bounds().map(|bounds| bounds.pos_to_lpos(&target));
        let conflict = self
            .modify::<Node, _>(keep, |node| {
                node.pos = target;
                if let Some(lpos) = lpos {
                    node.lpos = lpos;
                }
                node.base.tags.merge(removed_tags)
            })
            .unwrap_or(false);

        self.node_delete(remove, NodeDeleteMode::KeepWayRefs, map);
        for way in short_ways {
            map.way_became_invalid(way);
            let mut released = Vec::new();
            let mut collect = |node: &Node| released.push(node.base.id);
            self.way_delete(way, map, Some(&mut collect));
            // the survivor lost its last way here but must stay
            for node in released.into_iter().filter(|node| *node != keep) {
                self.release_orphan(node, map);
            }
        }
        map.redraw(ObjectRef::Node(keep));
        (keep, conflict)
    }

    /// Joins two ways that share an end node into one.
    ///
    /// Returns the id of the surviving way and whether the tags conflict.
    ///
    /// # Panics
    /// If the ways have no end node in common.
    pub fn merge_ways(
        &mut self,
        first: ItemId,
        second: ItemId,
        map: &mut dyn MapCollaborator,
    ) -> (ItemId, bool) {
        assert_ne!(first, second, "cannot merge way #{first} with itself");
        let (keep, remove) =
            if self.check_object_persistence(&ObjectRef::Way(first), &ObjectRef::Way(second)) {
                (first, second)
            } else {
                (second, first)
            };
        let (Some(kept), Some(removed)) = (self.way(keep), self.way(remove)) else {
            panic!("cannot merge unknown ways #{keep} and #{remove}");
        };
        let chain = joined_chain(kept, removed)
            .unwrap_or_else(|| panic!("ways #{keep} and #{remove} share no end node"));
        let removed_tags = removed.base.tags.clone();
        info!(keep = keep, remove = remove; "Merging ways");

        for relation in self.object_to_relations(&ObjectRef::Way(remove)) {
            let already_member = self
                .relation(relation)
                .is_some_and(|relation| relation.has_member(&ObjectRef::Way(keep)));
            self.modify::<Relation, _>(relation, |relation| {
                if already_member {
                    relation
                        .members
                        .retain(|member| member.object != ObjectRef::Way(remove));
                } else {
                    for member in &mut relation.members {
                        if member.object == ObjectRef::Way(remove) {
                            member.object = ObjectRef::Way(keep);
                        }
                    }
                }
            });
        }

        // take over the nodes first so shared ones never drop to zero ways
        self.way_set_chain(keep, chain);
        self.way_set_chain(remove, Vec::new());
        let conflict = self
            .modify::<Way, _>(keep, |way| way.base.tags.merge(removed_tags))
            .unwrap_or(false);

        self.way_delete(remove, map, None);
        map.redraw(ObjectRef::Way(keep));
        (keep, conflict)
    }
}

/// Node chain of `kept` extended by `removed`, oriented so that the
/// direction of `kept` is preserved.
fn joined_chain(kept: &Way, removed: &Way) -> Option<Vec<ItemId>> {
    let (k_first, k_last) = (kept.first_node()?, kept.last_node()?);
    let (r_first, r_last) = (removed.first_node()?, removed.last_node()?);
    let k = &kept.node_chain;
    let r = &removed.node_chain;

    let chain = if r_first == k_first {
        r.iter().rev().chain(&k[1..]).copied().collect()
    } else if r_last == k_first {
        r.iter().chain(&k[1..]).copied().collect()
    } else if r_last == k_last {
        k.iter().chain(r.iter().rev().skip(1)).copied().collect()
    } else if r_first == k_last {
        k.iter().chain(&r[1..]).copied().collect()
    } else {
        return None;
    };
    Some(chain)
}

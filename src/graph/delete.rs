use log::debug;

use super::{HasStore, ObjectStore, OsmGraph};
use crate::data::{Flags, ItemId, Node, ObjectRef, OsmObject, Relation, Way};
use crate::map::MapCollaborator;

/// How deleting a node treats the ways that use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeDeleteMode {
    /// The node must not be part of any way anymore.
    KeepWayRefs,
    /// Remove the node from all ways and relations.
    #[default]
    RemoveRefs,
    /// Like `RemoveRefs`, and delete ways that end up with fewer than two
    /// nodes.
    RemoveShortWays,
}

/// Drops adjacent duplicates, e.g. after a node between two occurrences of
/// the same node was removed.
pub(crate) fn collapse_adjacent(chain: &mut Vec<ItemId>) {
    chain.dedup();
}

impl OsmGraph {
    /// Removes an object from the graph. Objects that were never uploaded
    /// are dropped, all others are only marked as deleted so that the
    /// deletion can be uploaded later.
    fn delete_object<T: OsmObject>(&mut self, id: ItemId)
    where
        Self: HasStore<T>,
    {
        let ObjectStore { live, original } = self.store_mut();
        let Some(object) = live.get_mut(&id) else {
            panic!("cannot delete unknown {} #{}", T::KIND.as_str(), id);
        };
        if object.base().is_new() {
            debug!(kind = T::KIND.as_str(), id = id; "Permanently deleting object");
            live.remove(&id);
            original.remove(&id);
        } else {
            debug!(kind = T::KIND.as_str(), id = id; "Marking object deleted");
            if !original.contains_key(&id) {
                original.insert(id, object.clone());
            }
            object.base_mut().flags.insert(Flags::DELETED);
        }
    }

    /// Deletes a node. Returns the ways the node was removed from.
    ///
    /// # Panics
    /// If the node is unknown, or `mode` is `KeepWayRefs` while a way still
    /// uses the node.
    pub fn node_delete(
        &mut self,
        node: ItemId,
        mode: NodeDeleteMode,
        map: &mut dyn MapCollaborator,
    ) -> Vec<ItemId> {
        let Some(ways) = self.node(node).map(|node| node.ways) else {
            panic!("cannot delete unknown node #{node}");
        };

        let mut affected = Vec::new();
        if mode == NodeDeleteMode::KeepWayRefs {
            assert_eq!(ways, 0, "node #{node} is still used by {ways} ways");
        } else {
            for way in self.node_to_ways(node) {
                let Some(mut chain) = self.way(way).map(|way| way.node_chain.clone()) else {
                    continue;
                };
                chain.retain(|other| *other != node);
                collapse_adjacent(&mut chain);
                self.way_set_chain(way, chain);
                affected.push(way);
            }
            self.remove_from_relations(&ObjectRef::Node(node));
        }

        map.item_chain_destroy(ObjectRef::Node(node));
        self.delete_object::<Node>(node);

        for way in &affected {
            let short = self.way(*way).is_some_and(|way| way.node_chain.len() < 2);
            if short && mode == NodeDeleteMode::RemoveShortWays {
                map.way_became_invalid(*way);
                self.way_delete(*way, map, None);
            } else {
                map.redraw(ObjectRef::Way(*way));
            }
        }
        affected
    }

    /// Deletes a way and releases its nodes.
    ///
    /// Every node of the chain is passed to `unref` after its way count was
    /// decremented. Without a callback, nodes that are left without ways,
    /// tags and relations are deleted too.
    pub fn way_delete(
        &mut self,
        way: ItemId,
        map: &mut dyn MapCollaborator,
        mut unref: Option<&mut dyn FnMut(&Node)>,
    ) {
        let Some(nodes) = self.way(way).map(Way::distinct_nodes) else {
            panic!("cannot delete unknown way #{way}");
        };

        self.remove_from_relations(&ObjectRef::Way(way));
        map.item_chain_destroy(ObjectRef::Way(way));
        self.delete_object::<Way>(way);
        if let Some(deleted) = self.ways.live.get_mut(&way) {
            deleted.node_chain.clear();
        }
        self.hidden_ways.remove(&way);

        for node in nodes {
            self.node_unref(node);
            match unref.as_mut() {
                Some(callback) => {
                    if let Some(node) = self.node(node) {
                        callback(node);
                    }
                }
                None => self.release_orphan(node, map),
            }
        }
    }

    /// Deletes a node that is no longer used by anything and carries no
    /// information of its own.
    pub(crate) fn release_orphan(&mut self, node: ItemId, map: &mut dyn MapCollaborator) {
        let orphan = self
            .node(node)
            .is_some_and(|node| node.ways == 0 && !node.has_real_tags() && !node.base.is_deleted());
        if orphan && self.object_to_relations(&ObjectRef::Node(node)).is_empty() {
            self.node_delete(node, NodeDeleteMode::KeepWayRefs, map);
        }
    }

    /// Deletes a relation. Its members are not touched.
    pub fn relation_delete(&mut self, relation: ItemId, map: &mut dyn MapCollaborator) {
        self.remove_from_relations(&ObjectRef::Relation(relation));
        map.item_chain_destroy(ObjectRef::Relation(relation));
        self.delete_object::<Relation>(relation);
    }

    /// Removes every membership of `object` in any relation. If two members
    /// around a removed one are identical afterwards, one of them is dropped.
    pub fn remove_from_relations(&mut self, object: &ObjectRef) {
        for relation in self.object_to_relations(object) {
            self.modify::<Relation, _>(relation, |relation| {
                let mut index = 0;
                while index < relation.members.len() {
                    if relation.members[index].object != *object {
                        index += 1;
                        continue;
                    }
                    relation.members.remove(index);
                    if index > 0
                        && index < relation.members.len()
                        && relation.members[index - 1] == relation.members[index]
                    {
                        relation.members.remove(index);
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Member, Pos};
    use crate::graph::test_support::*;
    use crate::map::NoMap;

    #[derive(Default)]
    struct Recorder {
        destroyed: Vec<ObjectRef>,
        invalid: Vec<ItemId>,
    }

    impl MapCollaborator for Recorder {
        fn redraw(&mut self, _object: ObjectRef) {}

        fn item_chain_destroy(&mut self, object: ObjectRef) {
            self.destroyed.push(object);
        }

        fn way_became_invalid(&mut self, way: ItemId) {
            self.invalid.push(way);
        }
    }

    #[test]
    fn new_node_is_removed_outright() {
        let mut graph = graph();
        let node = graph.attach_node(graph.node_new(Pos::new(52.2694, 9.5753)));
        graph.node_delete(node, NodeDeleteMode::RemoveRefs, &mut NoMap);
        assert!(graph.node(node).is_none());
    }

    #[test]
    fn uploaded_node_is_only_marked() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3]);
        add_way(&mut graph, 10, &[1, 2, 3]);

        let affected = graph.node_delete(2, NodeDeleteMode::RemoveRefs, &mut NoMap);
        assert_eq!(affected, vec![10]);
        assert!(graph.node(2).expect("node").base.is_deleted());
        assert_eq!(graph.way(10).expect("way").node_chain, vec![1, 3]);
        assert!(graph.way(10).expect("way").base.is_dirty());
        assert_way_counts(&graph);
    }

    #[test]
    fn short_ways_are_deleted_with_their_last_node() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2]);
        add_way(&mut graph, 10, &[1, 2]);
        let mut map = Recorder::default();

        graph.node_delete(2, NodeDeleteMode::RemoveShortWays, &mut map);
        assert_eq!(map.invalid, vec![10]);
        assert!(graph.way(10).expect("way").base.is_deleted());
        // node 1 lost its only way and has no tags
        assert!(graph.node(1).expect("node").base.is_deleted());
        assert!(map.destroyed.contains(&ObjectRef::Way(10)));
    }

    #[test]
    #[should_panic(expected = "still used")]
    fn keeping_refs_requires_unused_node() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2]);
        add_way(&mut graph, 10, &[1, 2]);
        graph.node_delete(1, NodeDeleteMode::KeepWayRefs, &mut NoMap);
    }

    #[test]
    fn way_delete_keeps_tagged_and_shared_nodes() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3, 4]);
        add_way(&mut graph, 10, &[1, 2, 3]);
        add_way(&mut graph, 11, &[3, 4]);
        graph.set_tags(&ObjectRef::Node(2), tags(&[("barrier", "gate")]));
        graph.way_hide(10);

        graph.way_delete(10, &mut NoMap, None);
        let way = graph.way(10).expect("way");
        assert!(way.base.is_deleted());
        assert!(way.node_chain.is_empty());
        assert!(graph.node(1).expect("node").base.is_deleted());
        assert!(!graph.node(2).expect("node").base.is_deleted());
        assert!(!graph.node(3).expect("node").base.is_deleted());
        assert!(!graph.is_way_hidden(10));
        assert_way_counts(&graph);
    }

    #[test]
    fn way_delete_reports_nodes_to_callback() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2]);
        add_way(&mut graph, 10, &[1, 2, 1]);
        let mut seen = Vec::new();
        let mut callback = |node: &Node| seen.push((node.base.id, node.ways));

        graph.way_delete(10, &mut NoMap, Some(&mut callback));
        assert_eq!(seen, vec![(1, 0), (2, 0)]);
        assert!(!graph.node(1).expect("node").base.is_deleted());
    }

    #[test]
    fn removing_a_member_collapses_neighbours() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2]);
        add_way(&mut graph, 10, &[1, 2]);
        add_way(&mut graph, 11, &[1, 2]);
        let mut relation = crate::data::Relation::new(base(50));
        relation.members = vec![
            Member::new(ObjectRef::Way(10), None),
            Member::new(ObjectRef::Way(11), None),
            Member::new(ObjectRef::Way(10), None),
        ];
        graph.insert_relation(relation);

        graph.remove_from_relations(&ObjectRef::Way(11));
        let members = &graph.relation(50).expect("relation").members;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].object, ObjectRef::Way(10));
    }
}

use log::debug;

use super::OsmGraph;
use crate::data::{Base, ItemId, Member, ObjectRef, Relation, Way};
use crate::map::MapCollaborator;

fn share_end_node(a: &[ItemId], b: &[ItemId]) -> bool {
    let ends = |chain: &[ItemId]| [chain.first().copied(), chain.last().copied()];
    let a_ends = ends(a);
    ends(b)
        .iter()
        .any(|end| end.is_some() && a_ends.contains(end))
}

impl OsmGraph {
    /// Splits a way at a node or in the middle of a segment.
    ///
    /// With `cut_at_node` the node at `cut_at` ends up in both parts,
    /// otherwise the segment between `cut_at - 1` and `cut_at` is removed.
    /// Closed ways are not split but opened: their chain is rotated so that
    /// it starts at the cut.
    ///
    /// The original way keeps the longer part. The new way gets the tags of
    /// the original except for discardable ones, and is inserted next to the
    /// original in every relation containing it. Returns the new way, if one
    /// was created.
    pub fn way_split(
        &mut self,
        way: ItemId,
        cut_at: usize,
        cut_at_node: bool,
        map: &mut dyn MapCollaborator,
    ) -> Option<ItemId> {
        let Some(original) = self.way(way) else {
            panic!("cannot split unknown way #{way}");
        };
        let chain = original.node_chain.clone();
        let closed = original.is_closed();
        let tags = original.base.tags.without_discardable();
        assert!(cut_at < chain.len(), "cut position {cut_at} outside of way #{way}");
        assert!(cut_at_node || cut_at > 0, "segment cut needs a preceding node");

        if closed {
            let mut ring = chain[..chain.len() - 1].to_vec();
            let len = ring.len();
            if len < 2 {
                debug!(way = way; "Closed way without a second node cannot be split");
                return None;
            }
            ring.rotate_left(cut_at % len);
            if cut_at_node {
                ring.push(ring[0]);
            }
            debug!(way = way; "Opening closed way instead of splitting");
            self.way_set_chain(way, ring);
            map.redraw(ObjectRef::Way(way));
            return None;
        }

        let (head, tail) = if cut_at_node {
            (chain[..=cut_at].to_vec(), chain[cut_at..].to_vec())
        } else {
            (chain[..cut_at].to_vec(), chain[cut_at..].to_vec())
        };

        match (head.len() >= 2, tail.len() >= 2) {
            (true, true) => {}
            (false, false) => {
                map.way_became_invalid(way);
                self.way_delete(way, map, None);
                return None;
            }
            (head_kept, _) => {
                let rest = if head_kept { head } else { tail };
                for node in self.way_set_chain(way, rest) {
                    self.release_orphan(node, map);
                }
                map.redraw(ObjectRef::Way(way));
                return None;
            }
        }

        let split_off_first = head.len() < tail.len();
        let (kept, split_off) = if split_off_first {
            (tail, head)
        } else {
            (head, tail)
        };

        self.way_set_chain(way, kept.clone());
        let new_way = self.attach_way(Way::with_nodes(
            Base {
                tags,
                ..Base::created()
            },
            split_off.clone(),
        ));
        if self.is_way_hidden(way) {
            self.way_hide(new_way);
        }
        debug!(way = way, new_way = new_way; "Split way");

        for relation in self.object_to_relations(&ObjectRef::Way(way)) {
            let Some(positions) = self.relation(relation).map(|relation| {
                self.split_insert_positions(relation, way, &kept, &split_off, split_off_first)
            }) else {
                continue;
            };
            self.modify::<Relation, _>(relation, |relation| {
                // back to front so earlier indices stay valid
                for (index, before) in positions.into_iter().rev() {
                    let role = relation.members[index].role.clone();
                    let member = Member::new(ObjectRef::Way(new_way), role);
                    let at = if before { index } else { index + 1 };
                    relation.members.insert(at, member);
                }
            });
        }

        map.redraw(ObjectRef::Way(way));
        map.redraw(ObjectRef::Way(new_way));
        Some(new_way)
    }

    /// Node chain of the way at `index` of the member list, if that member
    /// is a loaded way.
    fn member_chain<'a>(&'a self, relation: &Relation, index: Option<usize>) -> Option<&'a [ItemId]> {
        match relation.members.get(index?)?.object {
            ObjectRef::Way(id) => self.way(id).map(|way| way.node_chain.as_slice()),
            _ => None,
        }
    }

    /// Membership indices of `way` in `relation`, each with whether the new
    /// part belongs in front of it.
    ///
    /// The neighbouring members decide: the new part goes next to the one it
    /// connects to, the previous member taking precedence. Without a
    /// connected neighbour the order of the parts in the old chain is kept.
    fn split_insert_positions(
        &self,
        relation: &Relation,
        way: ItemId,
        kept: &[ItemId],
        split_off: &[ItemId],
        split_off_first: bool,
    ) -> Vec<(usize, bool)> {
        relation
            .members
            .iter()
            .enumerate()
            .filter(|(_, member)| member.object == ObjectRef::Way(way))
            .map(|(index, _)| {
                let previous = self.member_chain(relation, index.checked_sub(1));
                let next = self.member_chain(relation, Some(index + 1));
                let before = match (previous, next) {
                    (Some(previous), _) if share_end_node(previous, split_off) => true,
                    (Some(previous), _) if share_end_node(previous, kept) => false,
                    (_, Some(next)) if share_end_node(next, split_off) => false,
                    (_, Some(next)) if share_end_node(next, kept) => true,
                    _ => split_off_first,
                };
                (index, before)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::*;
    use crate::map::NoMap;

    #[test]
    fn splits_at_middle_node() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3]);
        add_way(&mut graph, 10, &[1, 2, 3]);
        graph.set_tags(
            &ObjectRef::Way(10),
            tags(&[("highway", "residential"), ("created_by", "JOSM")]),
        );

        let new_way = graph.way_split(10, 1, true, &mut NoMap).expect("new way");
        assert_eq!(graph.way(10).expect("way").node_chain, vec![1, 2]);
        let split_off = graph.way(new_way).expect("way");
        assert_eq!(split_off.node_chain, vec![2, 3]);
        assert!(split_off.base.is_new());
        assert_eq!(split_off.base.tags.len(), 1);
        assert_eq!(split_off.base.tags.get_value("highway"), Some("residential"));
        assert_eq!(graph.node(2).expect("node").ways, 2);
        assert_way_counts(&graph);
    }

    #[test]
    fn original_keeps_the_longer_part() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3, 4, 5]);
        add_way(&mut graph, 10, &[1, 2, 3, 4, 5]);

        let new_way = graph.way_split(10, 1, false, &mut NoMap);
        // a single node on the cut off side is no way on its own
        assert_eq!(new_way, None);
        assert_eq!(graph.way(10).expect("way").node_chain, vec![2, 3, 4, 5]);
        assert!(graph.node(1).expect("node").base.is_deleted());

        let new_way = graph.way_split(10, 1, true, &mut NoMap).expect("new way");
        assert_eq!(graph.way(10).expect("way").node_chain, vec![3, 4, 5]);
        assert_eq!(graph.way(new_way).expect("way").node_chain, vec![2, 3]);
        assert_way_counts(&graph);
    }

    #[test]
    fn closed_way_is_opened() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3, 4]);
        add_way(&mut graph, 10, &[1, 2, 3, 4, 1]);

        assert_eq!(graph.way_split(10, 2, true, &mut NoMap), None);
        assert_eq!(graph.way(10).expect("way").node_chain, vec![3, 4, 1, 2, 3]);

        assert_eq!(graph.way_split(10, 2, false, &mut NoMap), None);
        assert_eq!(graph.way(10).expect("way").node_chain, vec![1, 2, 3, 4]);
        assert_eq!(graph.ways().len(), 1);
        assert_way_counts(&graph);
    }

    #[test]
    fn two_node_segment_cut_deletes_the_way() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2]);
        add_way(&mut graph, 10, &[1, 2]);

        assert_eq!(graph.way_split(10, 1, false, &mut NoMap), None);
        assert!(graph.way(10).expect("way").base.is_deleted());
    }

    #[test]
    fn new_part_is_placed_next_to_its_neighbour() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3, 4, 5, 6]);
        add_way(&mut graph, 9, &[1, 2]);
        add_way(&mut graph, 10, &[2, 3, 4, 5]);
        add_way(&mut graph, 11, &[5, 6]);
        let mut route = Relation::new(base(40));
        route.members = vec![
            Member::new(ObjectRef::Way(9), None),
            Member::new(ObjectRef::Way(10), Some("forward".into())),
            Member::new(ObjectRef::Way(11), None),
        ];
        graph.insert_relation(route);

        // cut off the part at the start, next to way 9
        let new_way = graph.way_split(10, 1, false, &mut NoMap);
        assert_eq!(new_way, None);

        let new_way = graph.way_split(10, 1, true, &mut NoMap).expect("new way");
        assert_eq!(graph.way(10).expect("way").node_chain, vec![3, 4]);
        assert_eq!(graph.way(new_way).expect("way").node_chain, vec![4, 5]);
        let members: Vec<ObjectRef> = graph
            .relation(40)
            .expect("relation")
            .members
            .iter()
            .map(|member| member.object)
            .collect();
        assert_eq!(
            members,
            vec![
                ObjectRef::Way(9),
                ObjectRef::Way(10),
                ObjectRef::Way(new_way),
                ObjectRef::Way(11),
            ]
        );
        assert_eq!(graph.relation(40).expect("relation").members[2].role(), "forward");
    }

    #[test]
    fn new_part_goes_in_front_when_connected_backwards() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3, 4, 5, 6]);
        add_way(&mut graph, 9, &[1, 2]);
        add_way(&mut graph, 10, &[2, 3, 4, 5, 6]);
        let mut route = Relation::new(base(40));
        route.members = vec![
            Member::new(ObjectRef::Way(9), None),
            Member::new(ObjectRef::Way(10), None),
        ];
        graph.insert_relation(route);

        let new_way = graph.way_split(10, 2, false, &mut NoMap).expect("new way");
        assert_eq!(graph.way(new_way).expect("way").node_chain, vec![2, 3]);
        let members = &graph.relation(40).expect("relation").members;
        assert_eq!(members[1].object, ObjectRef::Way(new_way));
        assert_eq!(members[2].object, ObjectRef::Way(10));
    }

    fn member_ways(graph: &OsmGraph, relation: ItemId) -> Vec<ObjectRef> {
        graph
            .relation(relation)
            .expect("relation")
            .members
            .iter()
            .map(|member| member.object)
            .collect()
    }

    #[test]
    fn cut_off_head_goes_before_a_leading_member() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3, 4, 5, 6, 7]);
        add_way(&mut graph, 10, &[1, 2, 3, 4, 5, 6]);
        add_way(&mut graph, 11, &[6, 7]);
        let mut route = Relation::new(base(40));
        route.members = vec![
            Member::new(ObjectRef::Way(10), None),
            Member::new(ObjectRef::Way(11), None),
        ];
        graph.insert_relation(route);

        let new_way = graph.way_split(10, 1, true, &mut NoMap).expect("new way");
        assert_eq!(graph.way(10).expect("way").node_chain, vec![2, 3, 4, 5, 6]);
        assert_eq!(graph.way(new_way).expect("way").node_chain, vec![1, 2]);
        assert_eq!(
            member_ways(&graph, 40),
            vec![ObjectRef::Way(new_way), ObjectRef::Way(10), ObjectRef::Way(11)]
        );
    }

    #[test]
    fn lone_member_keeps_the_chain_order() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3, 4]);
        add_way(&mut graph, 10, &[1, 2, 3, 4]);
        let mut route = Relation::new(base(40));
        route.members = vec![Member::new(ObjectRef::Way(10), None)];
        graph.insert_relation(route);

        let new_way = graph.way_split(10, 1, true, &mut NoMap).expect("new way");
        assert_eq!(graph.way(new_way).expect("way").node_chain, vec![1, 2]);
        assert_eq!(
            member_ways(&graph, 40),
            vec![ObjectRef::Way(new_way), ObjectRef::Way(10)]
        );
    }

    #[test]
    fn single_node_ring_is_left_alone() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1]);
        add_way(&mut graph, 10, &[1]);

        assert_eq!(graph.way_split(10, 0, true, &mut NoMap), None);
        assert_eq!(graph.way(10).expect("way").node_chain, vec![1]);
        assert!(!graph.way(10).expect("way").base.is_dirty());
    }
}

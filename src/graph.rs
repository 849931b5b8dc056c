pub mod delete;
pub mod describe;
pub mod merge;
pub mod reverse;
pub mod split;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, warn};

use crate::data::{
    Base, Bounds, Flags, ItemId, LPos, Member, Node, ObjectKind, ObjectRef, OsmObject, Pos,
    Relation, TagList, ValueCache, Way,
};

pub use self::delete::NodeDeleteMode;
pub use self::reverse::ReverseResult;

/// Whether the data may be uploaded to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPolicy {
    #[default]
    Normal,
    /// The file asked for never being uploaded, e.g. test fixtures.
    Blocked,
}

/// Live objects of one type plus the state they had before their first
/// modification.
#[derive(Debug, Clone)]
pub(crate) struct ObjectStore<T> {
    pub(crate) live: BTreeMap<ItemId, T>,
    pub(crate) original: BTreeMap<ItemId, T>,
}

impl<T> Default for ObjectStore<T> {
    fn default() -> Self {
        ObjectStore {
            live: BTreeMap::new(),
            original: BTreeMap::new(),
        }
    }
}

pub(crate) trait HasStore<T: OsmObject> {
    fn store(&self) -> &ObjectStore<T>;
    fn store_mut(&mut self) -> &mut ObjectStore<T>;
}

/// In-memory OSM data being edited.
///
/// The graph exclusively owns every node, way and relation. Objects refer to
/// each other by id only; the number of ways using a node is kept as a count
/// on the node and updated by every operation that changes a node chain.
///
/// All modifications go through methods of this type so that the dirty state
/// of each object is tracked in one place: an object is dirty while its
/// content differs from the state it had before it was first touched.
#[derive(Debug, Clone, Default)]
pub struct OsmGraph {
    nodes: ObjectStore<Node>,
    ways: ObjectStore<Way>,
    relations: ObjectStore<Relation>,
    bounds: Option<Bounds>,
    hidden_ways: BTreeSet<ItemId>,
    upload_policy: UploadPolicy,
    users: BTreeMap<i32, String>,
    cache: ValueCache,
}

impl HasStore<Node> for OsmGraph {
    fn store(&self) -> &ObjectStore<Node> {
        &self.nodes
    }

    fn store_mut(&mut self) -> &mut ObjectStore<Node> {
        &mut self.nodes
    }
}

impl HasStore<Way> for OsmGraph {
    fn store(&self) -> &ObjectStore<Way> {
        &self.ways
    }

    fn store_mut(&mut self) -> &mut ObjectStore<Way> {
        &mut self.ways
    }
}

impl HasStore<Relation> for OsmGraph {
    fn store(&self) -> &ObjectStore<Relation> {
        &self.relations
    }

    fn store_mut(&mut self) -> &mut ObjectStore<Relation> {
        &mut self.relations
    }
}

impl OsmGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: Bounds) -> Self {
        OsmGraph {
            bounds: Some(bounds),
            ..Self::default()
        }
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Sets the map area and reprojects all nodes.
    pub fn set_bounds(&mut self, bounds: Bounds) {
        for node in self.nodes.live.values_mut() {
            node.lpos = bounds.pos_to_lpos(&node.pos);
        }
        self.bounds = Some(bounds);
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        self.upload_policy
    }

    pub fn set_upload_policy(&mut self, policy: UploadPolicy) {
        self.upload_policy = policy;
    }

    pub fn users(&self) -> &BTreeMap<i32, String> {
        &self.users
    }

    pub fn add_user(&mut self, uid: i32, name: &str) {
        self.users
            .entry(uid)
            .or_insert_with(|| name.to_string());
    }

    pub fn value_cache(&mut self) -> &mut ValueCache {
        &mut self.cache
    }

    pub fn nodes(&self) -> &BTreeMap<ItemId, Node> {
        &self.nodes.live
    }

    pub fn ways(&self) -> &BTreeMap<ItemId, Way> {
        &self.ways.live
    }

    pub fn relations(&self) -> &BTreeMap<ItemId, Relation> {
        &self.relations.live
    }

    pub fn node(&self, id: ItemId) -> Option<&Node> {
        self.nodes.live.get(&id)
    }

    pub fn way(&self, id: ItemId) -> Option<&Way> {
        self.ways.live.get(&id)
    }

    pub fn relation(&self, id: ItemId) -> Option<&Relation> {
        self.relations.live.get(&id)
    }

    /// State of a node before it was first modified, if it was.
    pub fn original_node(&self, id: ItemId) -> Option<&Node> {
        self.nodes.original.get(&id)
    }

    pub fn original_way(&self, id: ItemId) -> Option<&Way> {
        self.ways.original.get(&id)
    }

    pub fn original_relation(&self, id: ItemId) -> Option<&Relation> {
        self.relations.original.get(&id)
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.object_base(object).is_some()
    }

    pub fn object_base(&self, object: &ObjectRef) -> Option<&Base> {
        let id = object.get_id();
        match object.kind()? {
            ObjectKind::Node => self.node(id).map(|node| &node.base),
            ObjectKind::Way => self.way(id).map(|way| &way.base),
            ObjectKind::Relation => self.relation(id).map(|relation| &relation.base),
        }
    }

    pub fn tags_of(&self, object: &ObjectRef) -> Option<&TagList> {
        self.object_base(object).map(|base| &base.tags)
    }

    pub(crate) fn get<T: OsmObject>(&self, id: ItemId) -> Option<&T>
    where
        Self: HasStore<T>,
    {
        self.store().live.get(&id)
    }

    /// Applies `change` to the object and updates its dirty state.
    ///
    /// The first time an uploaded object is modified its current state is
    /// recorded as original. The object is dirty afterwards unless its
    /// content is back to that original state.
    pub(crate) fn modify<T: OsmObject, R>(
        &mut self,
        id: ItemId,
        change: impl FnOnce(&mut T) -> R,
    ) -> Option<R>
    where
        Self: HasStore<T>,
    {
        let ObjectStore { live, original } = self.store_mut();
        let object = live.get_mut(&id)?;
        if !object.base().is_new() && !original.contains_key(&id) {
            original.insert(id, object.clone());
        }

        let result = change(object);

        object.base_mut().flags.insert(Flags::DIRTY);
        if let Some(before) = original.get(&id) {
            if !object.base().is_deleted() && object.same_content(before) {
                object.base_mut().flags.remove(Flags::DIRTY);
            }
        }
        Some(result)
    }

    fn next_id<T: OsmObject>(&self) -> ItemId
    where
        Self: HasStore<T>,
    {
        let lowest = self.store().live.keys().next().copied().unwrap_or(0);
        lowest.min(0) - 1
    }

    fn attach_object<T: OsmObject>(&mut self, mut object: T) -> ItemId
    where
        Self: HasStore<T>,
    {
        let id = self.next_id::<T>();
        let base = object.base_mut();
        base.id = id;
        base.flags = Flags::DIRTY;
        if base.version == 0 {
            base.version = 1;
        }
        let tags = std::mem::take(&mut base.tags);
        base.tags = tags.interned(&mut self.cache);

        debug!(kind = T::KIND.as_str(), id = id; "Attaching new object");
        self.store_mut().live.insert(id, object);
        id
    }

    fn insert_object<T: OsmObject>(&mut self, mut object: T) -> ItemId
    where
        Self: HasStore<T>,
    {
        let id = object.id();
        assert!(id != 0, "cannot insert {} with illegal id", T::KIND.as_str());
        assert!(
            id < 0 || object.base().version > 0,
            "{} #{} has no version",
            T::KIND.as_str(),
            id
        );
        assert!(
            !self.store().live.contains_key(&id),
            "duplicate {} id {}",
            T::KIND.as_str(),
            id
        );
        let base = object.base_mut();
        let tags = std::mem::take(&mut base.tags);
        base.tags = tags.interned(&mut self.cache);
        self.store_mut().live.insert(id, object);
        id
    }

    /// Creates an unattached node at a geographic position.
    pub fn node_new(&self, pos: Pos) -> Node {
        let mut node = Node::new(Base::created(), pos);
        if let Some(bounds) = &self.bounds {
            node.lpos = bounds.pos_to_lpos(&pos);
        }
        node
    }

    /// Creates an unattached node at a projected position.
    ///
    /// # Panics
    /// If the graph has no bounds to convert the position with.
    pub fn node_new_lpos(&self, lpos: LPos) -> Node {
        let bounds = self
            .bounds
            .as_ref()
            .expect("projected positions need map bounds");
        let mut node = Node::new(Base::created(), bounds.lpos_to_pos(&lpos));
        node.lpos = lpos;
        node
    }

    /// Adds a newly created node and gives it a fresh negative id.
    pub fn attach_node(&mut self, mut node: Node) -> ItemId {
        node.ways = 0;
        if let Some(bounds) = &self.bounds {
            node.lpos = bounds.pos_to_lpos(&node.pos);
        }
        self.attach_object(node)
    }

    /// Adds a newly created way and gives it a fresh negative id. All nodes
    /// of its chain must already be part of the graph.
    pub fn attach_way(&mut self, way: Way) -> ItemId {
        let nodes = way.distinct_nodes();
        let id = self.attach_object(way);
        for node in nodes {
            self.node_ref(node);
        }
        id
    }

    /// Adds a newly created relation and gives it a fresh negative id.
    pub fn attach_relation(&mut self, mut relation: Relation) -> ItemId {
        self.prepare_members(&mut relation.members);
        self.attach_object(relation)
    }

    /// Adds a node that already has its final id, e.g. from a file.
    ///
    /// # Panics
    /// If the id is already in use.
    pub fn insert_node(&mut self, mut node: Node) -> ItemId {
        node.ways = 0;
        if let Some(bounds) = &self.bounds {
            node.lpos = bounds.pos_to_lpos(&node.pos);
        }
        self.insert_object(node)
    }

    /// Adds a way that already has its final id. Nodes missing from the
    /// graph must have been filtered out by the caller.
    ///
    /// # Panics
    /// If the id is already in use or a node of the chain is unknown.
    pub fn insert_way(&mut self, way: Way) -> ItemId {
        let nodes = way.distinct_nodes();
        let id = self.insert_object(way);
        for node in nodes {
            self.node_ref(node);
        }
        id
    }

    /// Adds a relation that already has its final id.
    ///
    /// # Panics
    /// If the id is already in use.
    pub fn insert_relation(&mut self, mut relation: Relation) -> ItemId {
        self.prepare_members(&mut relation.members);
        self.insert_object(relation)
    }

    /// Resolves members against the graph and interns their roles.
    fn prepare_members(&mut self, members: &mut [Member]) {
        for member in members.iter_mut() {
            member.object = self.resolve(member.object);
            if let Some(role) = member.role.take() {
                member.role = (!role.is_empty()).then(|| self.cache.intern(&role));
            }
        }
    }

    /// Turns a placeholder into a real reference if the object is loaded,
    /// and a real reference to a missing object into a placeholder.
    pub fn resolve(&self, object: ObjectRef) -> ObjectRef {
        match object.kind() {
            Some(_) if self.contains(&object) => object.to_real(),
            Some(_) => object.to_unresolved(),
            None => object,
        }
    }

    /// Re-resolves placeholder members of all relations, e.g. references to
    /// relations that appear later in the same file. Returns the number of
    /// references that became real.
    pub fn resolve_references(&mut self) -> usize {
        let mut resolved = 0;
        let mut pending: Vec<(ItemId, usize, ObjectRef)> = Vec::new();
        for relation in self.relations.live.values() {
            for (index, member) in relation.members.iter().enumerate() {
                if !member.object.is_real() && self.contains(&member.object) {
                    pending.push((relation.base.id, index, member.object.to_real()));
                }
            }
        }
        for (relation, index, object) in pending {
            if let Some(relation) = self.relations.live.get_mut(&relation) {
                relation.members[index].object = object;
                resolved += 1;
            }
        }
        resolved
    }

    pub(crate) fn node_ref(&mut self, id: ItemId) {
        let node = self
            .nodes
            .live
            .get_mut(&id)
            .unwrap_or_else(|| panic!("way references unknown node #{id}"));
        node.ways += 1;
    }

    pub(crate) fn node_unref(&mut self, id: ItemId) -> u32 {
        let node = self
            .nodes
            .live
            .get_mut(&id)
            .unwrap_or_else(|| panic!("way references unknown node #{id}"));
        assert!(node.ways > 0, "node #{id} is not used by any way");
        node.ways -= 1;
        node.ways
    }

    /// Replaces the node chain of a way, keeping the way counts of all
    /// involved nodes in sync. Returns the nodes no longer in the way.
    pub(crate) fn way_set_chain(&mut self, way: ItemId, chain: Vec<ItemId>) -> Vec<ItemId> {
        let Some(old) = self.way(way).map(Way::distinct_nodes) else {
            panic!("unknown way #{way}");
        };
        let new: BTreeSet<ItemId> = chain.iter().copied().collect();
        for added in new.difference(&old) {
            self.node_ref(*added);
        }
        let removed: Vec<ItemId> = old.difference(&new).copied().collect();
        for node in &removed {
            self.node_unref(*node);
        }
        self.modify::<Way, _>(way, |way| way.node_chain = chain);
        removed
    }

    /// Replaces the tags of an object. Returns true if the content changed.
    pub fn set_tags(&mut self, object: &ObjectRef, tags: TagList) -> bool {
        let tags = tags.interned(&mut self.cache);
        let id = object.get_id();
        let changed = match object.kind() {
            Some(ObjectKind::Node) => self.modify::<Node, _>(id, |node| node.base.tags.replace(tags)),
            Some(ObjectKind::Way) => self.modify::<Way, _>(id, |way| way.base.tags.replace(tags)),
            Some(ObjectKind::Relation) => {
                self.modify::<Relation, _>(id, |relation| relation.base.tags.replace(tags))
            }
            None => None,
        };
        match changed {
            Some(changed) => changed,
            None => {
                warn!(id = id; "Cannot set tags of an object that is not in the graph");
                false
            }
        }
    }

    /// Moves a node. Returns false if the node is unknown.
    pub fn node_set_pos(&mut self, node: ItemId, pos: Pos) -> bool {
        let lpos = self.bounds.map(|bounds| bounds.pos_to_lpos(&pos));
        self.modify::<Node, _>(node, |node| {
            node.pos = pos;
            if let Some(lpos) = lpos {
                node.lpos = lpos;
            }
        })
        .is_some()
    }

    /// Appends a node to the end of a way's chain.
    pub fn way_append_node(&mut self, way: ItemId, node: ItemId) {
        let Some(mut chain) = self.way(way).map(|way| way.node_chain.clone()) else {
            panic!("unknown way #{way}");
        };
        chain.push(node);
        self.way_set_chain(way, chain);
    }

    pub fn relation_add_member(&mut self, relation: ItemId, member: Member) -> bool {
        let mut members = [member];
        self.prepare_members(&mut members);
        let [member] = members;
        self.modify::<Relation, _>(relation, |relation| relation.members.push(member))
            .is_some()
    }

    /// Replaces all members of a relation.
    pub fn relation_set_members(&mut self, relation: ItemId, mut members: Vec<Member>) -> bool {
        self.prepare_members(&mut members);
        self.modify::<Relation, _>(relation, |relation| relation.members = members)
            .is_some()
    }

    pub fn relation_remove_member(&mut self, relation: ItemId, index: usize) -> Option<Member> {
        self.modify::<Relation, _>(relation, |relation| {
            (index < relation.members.len()).then(|| relation.members.remove(index))
        })
        .flatten()
    }

    pub fn relation_set_role(&mut self, relation: ItemId, index: usize, role: Option<&str>) -> bool {
        let role: Option<Arc<str>> = role
            .filter(|role| !role.is_empty())
            .map(|role| self.cache.intern(role));
        self.modify::<Relation, _>(relation, |relation| match relation.members.get_mut(index) {
            Some(member) => {
                member.role = role;
                true
            }
            None => false,
        })
        .unwrap_or(false)
    }

    pub fn way_hide(&mut self, way: ItemId) {
        if self.ways.live.contains_key(&way) {
            self.hidden_ways.insert(way);
        }
    }

    pub fn way_show(&mut self, way: ItemId) {
        self.hidden_ways.remove(&way);
    }

    pub fn is_way_hidden(&self, way: ItemId) -> bool {
        self.hidden_ways.contains(&way)
    }

    pub fn hidden_ways(&self) -> &BTreeSet<ItemId> {
        &self.hidden_ways
    }

    pub fn hidden_ways_clear(&mut self) {
        self.hidden_ways.clear();
    }

    /// Ways (not deleted) whose chain contains the node.
    pub fn node_to_ways(&self, node: ItemId) -> Vec<ItemId> {
        self.ways
            .live
            .values()
            .filter(|way| !way.base.is_deleted() && way.contains_node(node))
            .map(|way| way.base.id)
            .collect()
    }

    pub fn node_in_other_way(&self, way: ItemId, node: ItemId) -> bool {
        self.node_to_ways(node).iter().any(|other| *other != way)
    }

    /// Relations (not deleted) that have the object as a direct member.
    pub fn object_to_relations(&self, object: &ObjectRef) -> Vec<ItemId> {
        self.relations
            .live
            .values()
            .filter(|relation| !relation.base.is_deleted() && relation.has_member(object))
            .map(|relation| relation.base.id)
            .collect()
    }

    /// Checks whether the parsed data can be edited at all.
    pub fn sanity_check(&self) -> Option<&'static str> {
        if self.bounds.is_none() {
            return Some("Invalid data in OSM file:\nBoundary box missing!");
        }
        if self.nodes.live.is_empty() {
            return Some("Invalid data in OSM file:\nNo drawable content found!");
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::data::Tag;

    pub fn graph() -> OsmGraph {
        let bounds = Bounds::new(Pos::new(52.2692786, 9.5750497), Pos::new(52.2695463, 9.5755))
            .expect("valid bounds");
        OsmGraph::with_bounds(bounds)
    }

    pub fn base(id: ItemId) -> Base {
        Base {
            version: 1,
            ..Base::new(id)
        }
    }

    pub fn tags(pairs: &[(&str, &str)]) -> TagList {
        pairs.iter().map(|&pair| Tag::from(pair)).collect()
    }

    /// Inserts uploaded nodes with the given ids at slightly different positions.
    pub fn add_nodes(graph: &mut OsmGraph, ids: &[ItemId]) {
        for (offset, id) in ids.iter().enumerate() {
            let pos = Pos::new(52.2693 + offset as f64 * 0.00001, 9.5752);
            graph.insert_node(Node::new(base(*id), pos));
        }
    }

    pub fn add_way(graph: &mut OsmGraph, id: ItemId, chain: &[ItemId]) {
        graph.insert_way(Way::with_nodes(base(id), chain.to_vec()));
    }

    /// Every node's way count matches the ways that actually contain it.
    pub fn assert_way_counts(graph: &OsmGraph) {
        for node in graph.nodes().values() {
            let expected = graph
                .ways()
                .values()
                .filter(|way| way.contains_node(node.base.id))
                .count();
            assert_eq!(
                node.ways as usize, expected,
                "way count of node #{}",
                node.base.id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn attach_allocates_descending_negative_ids() {
        let mut graph = graph();
        add_nodes(&mut graph, &[10, 11]);
        let first = graph.attach_node(graph.node_new(Pos::new(52.2694, 9.5753)));
        let second = graph.attach_node(graph.node_new(Pos::new(52.2694, 9.5754)));
        assert_eq!((first, second), (-1, -2));

        let node = graph.node(first).expect("attached node");
        assert!(node.base.is_dirty());
        assert_eq!(node.base.version, 1);
    }

    #[test]
    #[should_panic(expected = "duplicate node id")]
    fn double_insert_fails_loudly() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 1]);
    }

    #[test]
    fn editing_back_to_the_original_clears_dirty() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1]);
        graph.set_tags(&ObjectRef::Node(1), tags(&[("amenity", "bench")]));
        assert!(graph.node(1).expect("node").base.is_dirty());
        assert!(graph.original_node(1).expect("original").base.tags.is_empty());

        graph.set_tags(&ObjectRef::Node(1), tags(&[("created_by", "test")]));
        assert!(!graph.node(1).expect("node").base.is_dirty());
    }

    #[test]
    fn way_counts_follow_chain_changes() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3]);
        add_way(&mut graph, 100, &[1, 2, 3, 1]);
        assert_eq!(graph.node(1).expect("node").ways, 1);
        assert_way_counts(&graph);

        graph.way_append_node(100, 2);
        let removed = graph.way_set_chain(100, vec![1, 2]);
        assert_eq!(removed, vec![3]);
        assert_way_counts(&graph);
        assert!(graph.way(100).expect("way").base.is_dirty());
    }

    #[test]
    fn forward_references_are_resolved() {
        let mut graph = graph();
        let mut parent = Relation::new(base(1));
        parent.members.push(Member::new(ObjectRef::Relation(2), None));
        graph.insert_relation(parent);
        assert!(!graph.relation(1).expect("relation").members[0].object.is_real());

        graph.insert_relation(Relation::new(base(2)));
        assert_eq!(graph.resolve_references(), 1);
        assert!(graph.relation(1).expect("relation").members[0].object.is_real());
    }

    #[test]
    fn sanity_check_reports_missing_content() {
        let mut graph = OsmGraph::new();
        assert!(graph.sanity_check().is_some_and(|msg| msg.contains("Boundary box")));
        graph = super::test_support::graph();
        assert!(graph.sanity_check().is_some_and(|msg| msg.contains("No drawable")));
        add_nodes(&mut graph, &[1]);
        assert_eq!(graph.sanity_check(), None);
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;

use super::object::{ItemId, ObjectKind, ObjectRef};
use super::pos::{LPos, Pos};
use super::tags::TagList;

/// Modification state of an object relative to the downloaded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Differs from the downloaded state and needs to be uploaded.
    pub const DIRTY: Flags = Flags(1 << 0);
    pub const DELETED: Flags = Flags(1 << 1);

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Attributes shared by nodes, ways and relations.
#[derive(Debug, Clone, PartialEq)]
pub struct Base {
    pub id: ItemId,
    pub version: u32,
    /// Seconds since the epoch of the last modification.
    pub time: i64,
    /// Uid of the last editor, 0 if unknown.
    pub user: i32,
    pub visible: bool,
    pub flags: Flags,
    pub tags: TagList,
}

impl Base {
    pub fn new(id: ItemId) -> Self {
        Base {
            id,
            version: 0,
            time: 0,
            user: 0,
            visible: true,
            flags: Flags::NONE,
            tags: TagList::new(),
        }
    }

    /// Attributes of an object created in the editor right now.
    pub fn created() -> Self {
        Base {
            version: 1,
            time: chrono::Utc::now().timestamp(),
            ..Base::new(0)
        }
    }

    /// Created locally and never uploaded.
    pub fn is_new(&self) -> bool {
        self.id < 0
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(Flags::DIRTY)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(Flags::DELETED)
    }
}

/// Common access to the three OSM primitives.
pub trait OsmObject: Clone {
    const KIND: ObjectKind;

    fn base(&self) -> &Base;
    fn base_mut(&mut self) -> &mut Base;

    /// True if the editable content (tags plus the type specific structure)
    /// is identical. Metadata like flags, version and time is ignored.
    fn same_content(&self, other: &Self) -> bool;

    fn id(&self) -> ItemId {
        self.base().id
    }

    fn tags(&self) -> &TagList {
        &self.base().tags
    }

    fn object_ref(&self) -> ObjectRef {
        ObjectRef::real(Self::KIND, self.id())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub base: Base,
    pub pos: Pos,
    /// Projected position, derived from `pos` and the map bounds.
    pub lpos: LPos,
    /// Number of distinct ways containing this node.
    pub ways: u32,
}

impl Node {
    pub fn new(base: Base, pos: Pos) -> Self {
        Node {
            base,
            pos,
            lpos: LPos::default(),
            ways: 0,
        }
    }

    pub fn has_real_tags(&self) -> bool {
        self.base.tags.has_real_tags()
    }
}

impl OsmObject for Node {
    const KIND: ObjectKind = ObjectKind::Node;

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn same_content(&self, other: &Self) -> bool {
        self.pos == other.pos && self.base.tags == other.base.tags
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub base: Base,
    pub node_chain: Vec<ItemId>,
}

impl Way {
    pub fn new(base: Base) -> Self {
        Way {
            base,
            node_chain: Vec::new(),
        }
    }

    pub fn with_nodes(base: Base, node_chain: Vec<ItemId>) -> Self {
        Way { base, node_chain }
    }

    pub fn first_node(&self) -> Option<ItemId> {
        self.node_chain.first().copied()
    }

    pub fn last_node(&self) -> Option<ItemId> {
        self.node_chain.last().copied()
    }

    /// First and last node are the same.
    pub fn is_closed(&self) -> bool {
        match (self.first_node(), self.last_node()) {
            (Some(first), Some(last)) => first == last,
            _ => false,
        }
    }

    /// At least two distinct nodes.
    pub fn is_valid(&self) -> bool {
        match self.node_chain.split_first() {
            Some((first, rest)) => rest.iter().any(|node| node != first),
            None => false,
        }
    }

    pub fn contains_node(&self, node: ItemId) -> bool {
        self.node_chain.contains(&node)
    }

    pub fn ends_with_node(&self, node: ItemId) -> bool {
        if self.base.is_deleted() {
            return false;
        }
        self.first_node() == Some(node) || self.last_node() == Some(node)
    }

    pub fn distinct_nodes(&self) -> BTreeSet<ItemId> {
        self.node_chain.iter().copied().collect()
    }
}

impl OsmObject for Way {
    const KIND: ObjectKind = ObjectKind::Way;

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn same_content(&self, other: &Self) -> bool {
        self.node_chain == other.node_chain && self.base.tags == other.base.tags
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    pub object: ObjectRef,
    pub role: Option<Arc<str>>,
}

impl Member {
    pub fn new(object: ObjectRef, role: Option<Arc<str>>) -> Self {
        Member { object, role }
    }

    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub base: Base,
    pub members: Vec<Member>,
}

impl Relation {
    pub fn new(base: Base) -> Self {
        Relation {
            base,
            members: Vec::new(),
        }
    }

    pub fn find_member(&self, object: &ObjectRef) -> Option<usize> {
        self.members.iter().position(|member| member.object == *object)
    }

    pub fn has_member(&self, object: &ObjectRef) -> bool {
        self.find_member(object).is_some()
    }

    /// Counts members as (nodes, ways, relations), resolved or not.
    pub fn members_by_type(&self) -> (usize, usize, usize) {
        self.members
            .iter()
            .fold((0, 0, 0), |(nodes, ways, relations), member| match member.object.kind() {
                Some(ObjectKind::Node) => (nodes + 1, ways, relations),
                Some(ObjectKind::Way) => (nodes, ways + 1, relations),
                Some(ObjectKind::Relation) => (nodes, ways, relations + 1),
                None => (nodes, ways, relations),
            })
    }

    pub fn is_type(&self, relation_type: &str) -> bool {
        self.base
            .tags
            .get_value("type")
            .is_some_and(|value| value.eq_ignore_ascii_case(relation_type))
    }

    /// Something to show the user instead of the bare id.
    pub fn descriptive_name(&self) -> String {
        ["ref", "name", "description", "note", "fixme"]
            .iter()
            .find_map(|key| self.base.tags.get_value(key))
            .map(str::to_string)
            .unwrap_or_else(|| format!("<ID #{}>", self.base.id))
    }
}

impl OsmObject for Relation {
    const KIND: ObjectKind = ObjectKind::Relation;

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn same_content(&self, other: &Self) -> bool {
        self.members == other.members && self.base.tags == other.base.tags
    }
}

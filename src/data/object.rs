use std::fmt;
use std::hash::{Hash, Hasher};

/// Numeric OSM identifier. Positive ids come from the server, negative ids
/// belong to objects created locally and not uploaded yet.
pub type ItemId = i64;

/// Never stored in a graph; returned where no object can be named.
pub const ID_ILLEGAL: ItemId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Node,
    Way,
    Relation,
}

impl ObjectKind {
    /// Element and member type name used in OSM XML.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Node => "node",
            ObjectKind::Way => "way",
            ObjectKind::Relation => "relation",
        }
    }

    pub fn from_xml(name: &str) -> Option<Self> {
        match name {
            "node" => Some(ObjectKind::Node),
            "way" => Some(ObjectKind::Way),
            "relation" => Some(ObjectKind::Relation),
            _ => None,
        }
    }
}

/// Reference to an OSM object.
///
/// The "real" variants name an object that is present in the graph. The
/// `*Id` variants are placeholders for objects that are referenced (usually
/// by a relation) but were never downloaded. Equality and hashing only look
/// at kind and id, so a placeholder compares equal to the resolved reference.
#[derive(Debug, Clone, Copy, Default)]
pub enum ObjectRef {
    Node(ItemId),
    Way(ItemId),
    Relation(ItemId),
    NodeId(ItemId),
    WayId(ItemId),
    RelationId(ItemId),
    #[default]
    Illegal,
}

impl ObjectRef {
    pub fn real(kind: ObjectKind, id: ItemId) -> Self {
        match kind {
            ObjectKind::Node => ObjectRef::Node(id),
            ObjectKind::Way => ObjectRef::Way(id),
            ObjectKind::Relation => ObjectRef::Relation(id),
        }
    }

    pub fn unresolved(kind: ObjectKind, id: ItemId) -> Self {
        match kind {
            ObjectKind::Node => ObjectRef::NodeId(id),
            ObjectKind::Way => ObjectRef::WayId(id),
            ObjectKind::Relation => ObjectRef::RelationId(id),
        }
    }

    pub fn kind(&self) -> Option<ObjectKind> {
        match self {
            ObjectRef::Node(_) | ObjectRef::NodeId(_) => Some(ObjectKind::Node),
            ObjectRef::Way(_) | ObjectRef::WayId(_) => Some(ObjectKind::Way),
            ObjectRef::Relation(_) | ObjectRef::RelationId(_) => Some(ObjectKind::Relation),
            ObjectRef::Illegal => None,
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(
            self,
            ObjectRef::Node(_) | ObjectRef::Way(_) | ObjectRef::Relation(_)
        )
    }

    /// The referenced id, or [`ID_ILLEGAL`] for [`ObjectRef::Illegal`].
    pub fn get_id(&self) -> ItemId {
        match *self {
            ObjectRef::Node(id)
            | ObjectRef::Way(id)
            | ObjectRef::Relation(id)
            | ObjectRef::NodeId(id)
            | ObjectRef::WayId(id)
            | ObjectRef::RelationId(id) => id,
            ObjectRef::Illegal => ID_ILLEGAL,
        }
    }

    /// Same kind and id, turned into a placeholder.
    pub fn to_unresolved(&self) -> Self {
        match self.kind() {
            Some(kind) => ObjectRef::unresolved(kind, self.get_id()),
            None => ObjectRef::Illegal,
        }
    }

    pub fn to_real(&self) -> Self {
        match self.kind() {
            Some(kind) => ObjectRef::real(kind, self.get_id()),
            None => ObjectRef::Illegal,
        }
    }

    /// True if both references name the same object. Unlike `==`, two
    /// illegal references are not the same object.
    pub fn is_same(&self, other: &ObjectRef) -> bool {
        self.kind().is_some() && self == other
    }

    /// Human-readable type, as shown to the user.
    pub fn type_string(&self) -> &'static str {
        match self {
            ObjectRef::Illegal => "illegal",
            ObjectRef::Node(_) => "node",
            ObjectRef::Way(_) => "way/area",
            ObjectRef::Relation(_) => "relation",
            ObjectRef::NodeId(_) => "node id",
            ObjectRef::WayId(_) => "way/area id",
            ObjectRef::RelationId(_) => "relation id",
        }
    }

    pub fn id_string(&self) -> Option<String> {
        match self {
            ObjectRef::Illegal => None,
            other => Some(format!("#{}", other.get_id())),
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.get_id() == other.get_id()
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.get_id().hash(state);
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectRef::Illegal => write!(f, "illegal #<unspec>"),
            other => write!(f, "{} #{}", other.type_string(), other.get_id()),
        }
    }
}

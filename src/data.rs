pub mod object;
pub mod osm;
pub mod pos;
pub mod tags;
pub mod value_cache;

pub use self::object::{ItemId, ObjectKind, ObjectRef, ID_ILLEGAL};
pub use self::osm::{Base, Flags, Member, Node, OsmObject, Relation, Way};
pub use self::pos::{Bounds, LPos, Pos};
pub use self::tags::{Tag, TagList, TagMap};
pub use self::value_cache::ValueCache;

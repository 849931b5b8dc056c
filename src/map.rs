use crate::data::{ItemId, ObjectRef};

/// Callbacks into the map display, invoked by graph operations that change
/// what has to be drawn.
pub trait MapCollaborator {
    /// The object changed shape or tags and has to be drawn again.
    fn redraw(&mut self, object: ObjectRef);

    /// The object is gone, all of its visual items must be removed.
    fn item_chain_destroy(&mut self, object: ObjectRef);

    /// The way dropped below two nodes and is about to be deleted.
    fn way_became_invalid(&mut self, way: ItemId);
}

/// Collaborator for callers without a display, e.g. batch tools and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMap;

impl MapCollaborator for NoMap {
    fn redraw(&mut self, _object: ObjectRef) {}

    fn item_chain_destroy(&mut self, _object: ObjectRef) {}

    fn way_became_invalid(&mut self, _way: ItemId) {}
}

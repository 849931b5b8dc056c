use std::io::BufRead;
use std::path::Path;

use log::{debug, info, warn};
use quick_xml::events::{BytesStart, Event};

use super::RestoreStatus;
use crate::data::{
    Base, Flags, ItemId, Member, Node, ObjectKind, ObjectRef, Pos, Relation, Tag, TagList, Way,
};
use crate::errors::{Error, Result};
use crate::graph::{NodeDeleteMode, OsmGraph};
use crate::map::NoMap;
use crate::xml::parse::{parse_member, parse_node_ref, parse_pos};
use crate::xml::{attribute, create_reader, element_name, open_reader, parse_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    New,
    Modified,
    Deleted,
}

/// One object as recorded in a diff file.
#[derive(Debug)]
struct DiffEntry {
    kind: ObjectKind,
    id: ItemId,
    state: Option<EntryState>,
    version: u32,
    hidden: bool,
    pos: Option<Pos>,
    nodes: Vec<ItemId>,
    members: Vec<Member>,
    tags: TagList,
}

/// Contents of a diff file, not yet applied to any graph.
#[derive(Debug, Default)]
struct DiffDocument {
    name: Option<String>,
    entries: Vec<DiffEntry>,
}

fn parse_entry(element: &BytesStart, kind: ObjectKind) -> Result<Option<DiffEntry>> {
    let Some(id) = attribute(element, b"id")? else {
        warn!(kind = kind.as_str(); "Diff entry without id");
        return Ok(None);
    };
    let id: ItemId = parse_value(b"id", &id)?;
    let state = match attribute(element, b"state")?.as_deref() {
        Some("new") => Some(EntryState::New),
        Some("modified") => Some(EntryState::Modified),
        Some("deleted") => Some(EntryState::Deleted),
        Some(other) => {
            warn!(kind = kind.as_str(), id = id, state = other; "Unknown diff state");
            return Ok(None);
        }
        None => None,
    };
    let version = match attribute(element, b"version")? {
        Some(version) => parse_value(b"version", &version)?,
        None => 0,
    };
    let hidden = attribute(element, b"hidden")?.as_deref() == Some("true");
    let pos = match kind {
        ObjectKind::Node => parse_pos(element)?,
        _ => None,
    };
    Ok(Some(DiffEntry {
        kind,
        id,
        state,
        version,
        hidden,
        pos,
        nodes: Vec::new(),
        members: Vec::new(),
        tags: TagList::new(),
    }))
}

fn add_child(entry: &mut DiffEntry, element: &BytesStart) -> Result<()> {
    match element.name().as_ref() {
        b"tag" => {
            let key = attribute(element, b"k")?;
            let value = attribute(element, b"v")?;
            if let (Some(key), Some(value)) = (key, value) {
                entry.tags.push(Tag::new(&key, &value));
            }
        }
        b"nd" if entry.kind == ObjectKind::Way => {
            if let Some(node) = parse_node_ref(element)? {
                entry.nodes.push(node);
            }
        }
        b"member" if entry.kind == ObjectKind::Relation => {
            if let Some(member) = parse_member(element)? {
                entry.members.push(member);
            }
        }
        _ => debug!(element = element_name(element)?.as_str(); "Ignoring element in diff entry"),
    }
    Ok(())
}

fn read_document<R: BufRead>(input: R) -> Result<DiffDocument> {
    let mut reader = create_reader(input);
    let mut buf = Vec::new();
    let mut document = DiffDocument::default();
    let mut seen_root = false;
    let mut current: Option<DiffEntry> = None;
    // entries that could not be read still have children to skip
    let mut skipping = false;

    loop {
        let event = match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(element) => Some((element.into_owned(), false)),
            Event::Empty(element) => Some((element.into_owned(), true)),
            Event::End(element) => {
                if matches!(element.name().as_ref(), b"node" | b"way" | b"relation") {
                    document.entries.extend(current.take());
                    skipping = false;
                }
                None
            }
            _ => None,
        };
        buf.clear();
        let Some((element, empty)) = event else {
            continue;
        };

        if !seen_root {
            if element.name().as_ref() != b"diff" {
                return Err(Error::format(format!(
                    "unexpected root element <{}> in diff",
                    element_name(&element)?
                )));
            }
            seen_root = true;
            document.name = attribute(&element, b"name")?;
            continue;
        }

        if let Some(entry) = current.as_mut() {
            add_child(entry, &element)?;
            continue;
        }
        if skipping {
            continue;
        }

        let Some(kind) = ObjectKind::from_xml(&element_name(&element)?) else {
            debug!(element = element_name(&element)?.as_str(); "Ignoring element in diff");
            continue;
        };
        match parse_entry(&element, kind)? {
            Some(entry) if empty => document.entries.push(entry),
            Some(entry) => current = Some(entry),
            None => skipping = !empty,
        }
    }

    if !seen_root {
        return Err(Error::format("no diff element found"));
    }
    Ok(document)
}

/// Attributes of an object created before the diff was saved.
fn new_base(entry: &DiffEntry) -> Base {
    Base {
        id: entry.id,
        version: entry.version.max(1),
        flags: Flags::DIRTY,
        tags: entry.tags.clone(),
        ..Base::created()
    }
}

struct Restorer<'a> {
    graph: &'a mut OsmGraph,
    status: RestoreStatus,
}

impl Restorer<'_> {
    fn ignore(&mut self, entry: &DiffEntry, reason: &str) {
        warn!(kind = entry.kind.as_str(), id = entry.id, reason = reason; "Skipping diff entry");
        self.status.insert(RestoreStatus::ELEMENTS_IGNORED);
    }

    fn node(&mut self, entry: &DiffEntry) {
        if !matches!(entry.state, Some(EntryState::New | EntryState::Modified)) {
            return;
        }
        let Some(pos) = entry.pos else {
            self.ignore(entry, "no valid position");
            return;
        };
        match entry.state {
            Some(EntryState::New) => {
                if entry.id >= 0 || self.graph.node(entry.id).is_some() {
                    self.ignore(entry, "new node with unusable id");
                    return;
                }
                let node = Node::new(new_base(entry), pos);
                self.graph.insert_node(node);
            }
            Some(EntryState::Modified) => {
                let Some(current) = self.graph.node(entry.id) else {
                    self.ignore(entry, "node not in map data");
                    return;
                };
                if current.base.version != entry.version {
                    warn!(id = entry.id, version = current.base.version, diff_version = entry.version;
                        "Node was changed upstream since the diff was saved");
                }
                self.graph.node_set_pos(entry.id, pos);
                self.graph.set_tags(&ObjectRef::Node(entry.id), entry.tags.clone());
            }
            _ => (),
        }
    }

    /// Node chain of a way entry, without nodes missing from the graph.
    fn chain(&mut self, entry: &DiffEntry) -> Vec<ItemId> {
        let mut chain = Vec::with_capacity(entry.nodes.len());
        for node in &entry.nodes {
            if self.graph.node(*node).is_some_and(|node| !node.base.is_deleted()) {
                chain.push(*node);
            } else {
                warn!(way = entry.id, node = *node; "Way references unknown node");
                self.status.insert(RestoreStatus::ELEMENTS_IGNORED);
            }
        }
        chain
    }

    fn way(&mut self, entry: &DiffEntry) {
        match entry.state {
            Some(EntryState::New) => {
                if entry.id >= 0 || self.graph.way(entry.id).is_some() {
                    self.ignore(entry, "new way with unusable id");
                    return;
                }
                let chain = self.chain(entry);
                if chain.len() < 2 {
                    self.ignore(entry, "fewer than two nodes");
                    return;
                }
                let way = Way::with_nodes(new_base(entry), chain);
                self.graph.insert_way(way);
            }
            Some(EntryState::Modified) => {
                if self.graph.way(entry.id).is_none() {
                    self.ignore(entry, "way not in map data");
                    return;
                }
                let chain = self.chain(entry);
                if chain.len() < 2 {
                    self.ignore(entry, "fewer than two nodes");
                    return;
                }
                self.graph.way_set_chain(entry.id, chain);
                self.graph.set_tags(&ObjectRef::Way(entry.id), entry.tags.clone());
            }
            _ => (),
        }
        if entry.hidden && entry.state != Some(EntryState::Deleted) {
            if self.graph.way(entry.id).is_some() {
                self.graph.way_hide(entry.id);
                self.status.insert(RestoreStatus::HAS_HIDDEN);
            } else {
                self.ignore(entry, "hidden way not in map data");
            }
        }
    }

    fn relation(&mut self, entry: &DiffEntry) {
        match entry.state {
            Some(EntryState::New) => {
                if entry.id >= 0 || self.graph.relation(entry.id).is_some() {
                    self.ignore(entry, "new relation with unusable id");
                    return;
                }
                let mut relation = Relation::new(new_base(entry));
                relation.members = entry.members.clone();
                self.graph.insert_relation(relation);
            }
            Some(EntryState::Modified) => {
                if self.graph.relation(entry.id).is_none() {
                    self.ignore(entry, "relation not in map data");
                    return;
                }
                self.graph
                    .relation_set_members(entry.id, entry.members.clone());
                self.graph
                    .set_tags(&ObjectRef::Relation(entry.id), entry.tags.clone());
            }
            _ => (),
        }
    }

    fn delete(&mut self, entry: &DiffEntry) {
        let present = self
            .graph
            .object_base(&ObjectRef::real(entry.kind, entry.id))
            .map(|base| !base.is_deleted());
        match present {
            None => self.ignore(entry, "deleted object not in map data"),
            Some(false) => debug!(id = entry.id; "Object already deleted"),
            Some(true) => match entry.kind {
                ObjectKind::Relation => self.graph.relation_delete(entry.id, &mut NoMap),
                ObjectKind::Way => {
                    // nodes are restored by their own entries
                    let mut keep = |_: &Node| {};
                    self.graph.way_delete(entry.id, &mut NoMap, Some(&mut keep));
                }
                ObjectKind::Node => {
                    self.graph
                        .node_delete(entry.id, NodeDeleteMode::RemoveRefs, &mut NoMap);
                }
            },
        }
    }

    fn apply(&mut self, document: &DiffDocument) {
        let of_kind = |kind: ObjectKind| {
            document
                .entries
                .iter()
                .filter(move |entry| entry.kind == kind)
        };

        for entry in of_kind(ObjectKind::Node) {
            self.node(entry);
        }
        for entry in of_kind(ObjectKind::Way) {
            self.way(entry);
        }
        for entry in of_kind(ObjectKind::Relation) {
            self.relation(entry);
        }
        for kind in [ObjectKind::Relation, ObjectKind::Way, ObjectKind::Node] {
            for entry in of_kind(kind).filter(|entry| entry.state == Some(EntryState::Deleted)) {
                self.delete(entry);
            }
        }
        self.graph.resolve_references();
    }
}

/// Replays a diff onto a freshly parsed graph.
///
/// Entries that do not fit the map data are skipped and reported through
/// [`RestoreStatus::ELEMENTS_IGNORED`] instead of failing the restore.
pub fn diff_restore<R: BufRead>(
    graph: &mut OsmGraph,
    input: R,
    project_name: Option<&str>,
) -> RestoreStatus {
    let document = match read_document(input) {
        Ok(document) => document,
        Err(err) => {
            warn!(err = err.message.as_str(); "Unreadable diff");
            return RestoreStatus::INVALID;
        }
    };

    let mut restorer = Restorer {
        graph,
        status: RestoreStatus::RESTORED,
    };
    if let (Some(expected), Some(name)) = (project_name, document.name.as_deref()) {
        if expected != name {
            warn!(project = expected, diff = name; "Diff belongs to another project");
            restorer.status.insert(RestoreStatus::PROJECT_MISMATCH);
        }
    }
    restorer.apply(&document);
    info!(entries = document.entries.len(), status = restorer.status.to_string().as_str(); "Restored diff");
    restorer.status
}

/// Replays the diff stored at `path`, see [`diff_restore`].
pub fn diff_restore_file(
    graph: &mut OsmGraph,
    path: &Path,
    project_name: Option<&str>,
) -> RestoreStatus {
    if !path.exists() {
        debug!(path = path.to_string_lossy().as_ref(); "No diff present");
        return RestoreStatus::NONE_PRESENT;
    }
    match open_reader(path) {
        Ok(reader) => diff_restore(graph, reader.into_inner(), project_name),
        Err(err) => {
            warn!(path = path.to_string_lossy().as_ref(), err = err.message.as_str(); "Cannot open diff");
            RestoreStatus::INVALID
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::save::generate_diff;
    use crate::graph::test_support::*;

    #[test]
    fn round_trip_reproduces_the_edits() {
        let mut base_graph = graph();
        add_nodes(&mut base_graph, &[1, 2, 3, 4]);
        add_way(&mut base_graph, 10, &[1, 2]);
        add_way(&mut base_graph, 11, &[3, 4]);
        let mut relation = Relation::new(base(20));
        relation.members.push(Member::new(ObjectRef::Way(11), None));
        base_graph.insert_relation(relation);

        let mut edited = base_graph.clone();
        let new = edited.attach_node(edited.node_new(Pos::new(52.2694, 9.5753)));
        edited.way_append_node(10, new);
        edited.way_delete(11, &mut NoMap, None);
        edited.set_tags(&ObjectRef::Relation(20), tags(&[("type", "site")]));
        let text = generate_diff(&edited, "test").expect("diff");

        let mut restored = base_graph.clone();
        let status = diff_restore(&mut restored, text.as_bytes(), Some("test"));
        assert_eq!(status, RestoreStatus::RESTORED);
        assert_eq!(restored.dirty_summary(), edited.dirty_summary());
        assert_eq!(restored.way(10).expect("way").node_chain, vec![1, 2, new]);
        assert!(restored.relation(20).expect("relation").members.is_empty());
    }

    #[test]
    fn unknown_ids_are_skipped_and_reported() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1]);
        let text = r#"<diff name="test">
  <node id="1" state="modified" version="1" lat="52.2693" lon="9.5752"><tag k="a" v="b"/></node>
  <node id="7" state="deleted"/>
  <way id="8" hidden="true"/>
</diff>"#;
        let status = diff_restore(&mut graph, text.as_bytes(), Some("test"));
        assert!(status.contains(RestoreStatus::ELEMENTS_IGNORED));
        assert!(!status.contains(RestoreStatus::HAS_HIDDEN));
        assert!(graph.node(1).expect("node").base.is_dirty());
    }

    #[test]
    fn foreign_project_and_garbage() {
        let mut graph = graph();
        let status = diff_restore(&mut graph, r#"<diff name="other"/>"#.as_bytes(), Some("test"));
        assert_eq!(status, RestoreStatus::PROJECT_MISMATCH);

        let status = diff_restore(&mut graph, "<osm/>".as_bytes(), Some("test"));
        assert_eq!(status, RestoreStatus::INVALID);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let status = diff_restore_file(&mut graph(), &dir.path().join("none.diff"), None);
        assert_eq!(status, RestoreStatus::NONE_PRESENT);
    }
}

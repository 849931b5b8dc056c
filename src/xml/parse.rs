use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::DateTime;
use log::{debug, info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::{attributes, create_reader, element_name, open_reader, parse_value};
use crate::data::{
    Base, Bounds, ItemId, Member, Node, ObjectKind, ObjectRef, Pos, Relation, Tag, Way,
};
use crate::errors::{Error, Result};
use crate::graph::{OsmGraph, UploadPolicy};

/// Top level sections of an OSM file. Every section may only appear after
/// the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Block {
    Osm,
    Bounds,
    Nodes,
    Ways,
    Relations,
}

/// Object whose child elements are still being read.
enum Pending {
    Node(Node),
    Way(Way),
    Relation(Relation),
    /// Broken element, its children are consumed and dropped.
    Skipped,
}

struct OsmParser<R: BufRead> {
    reader: Reader<R>,
    graph: OsmGraph,
    block: Block,
    seen_root: bool,
    pending: Option<Pending>,
    skipped: usize,
}

fn parse_upload_policy(element: &BytesStart) -> Result<UploadPolicy> {
    let policy = match super::attribute(element, b"upload")?.as_deref() {
        Some("false") | Some("never") => UploadPolicy::Blocked,
        _ => UploadPolicy::Normal,
    };
    Ok(policy)
}

fn parse_bounds(element: &BytesStart) -> Result<Option<Bounds>> {
    let mut min = Pos::default();
    let mut max = Pos::default();
    let mut found = 0;
    for (key, value) in attributes(element)? {
        match key.as_slice() {
            b"minlat" => min.lat = parse_value(&key, &value)?,
            b"minlon" => min.lon = parse_value(&key, &value)?,
            b"maxlat" => max.lat = parse_value(&key, &value)?,
            b"maxlon" => max.lon = parse_value(&key, &value)?,
            _ => continue,
        }
        found += 1;
    }
    if found != 4 {
        warn!(attributes = found; "Incomplete bounds, ignoring them");
        return Ok(None);
    }
    let bounds = Bounds::new(min, max);
    if bounds.is_none() {
        warn!("Invalid bounds, ignoring them");
    }
    Ok(bounds)
}

/// Reads the attributes shared by all object types. Returns `None` if the
/// element cannot be used.
fn parse_base(element: &BytesStart, graph: &mut OsmGraph) -> Result<Option<Base>> {
    let mut id: Option<ItemId> = None;
    let mut base = Base::new(0);
    let mut user_name: Option<String> = None;

    for (key, value) in attributes(element)? {
        match key.as_slice() {
            b"id" => id = Some(parse_value(&key, &value)?),
            b"version" => base.version = parse_value(&key, &value)?,
            b"uid" => base.user = parse_value(&key, &value)?,
            b"user" => user_name = Some(value),
            b"visible" => base.visible = value == "true",
            b"timestamp" => match DateTime::parse_from_rfc3339(&value) {
                Ok(time) => base.time = time.timestamp(),
                Err(err) => {
                    warn!(timestamp = value.as_str(), err = err.to_string().as_str(); "Unparsable timestamp");
                }
            },
            _ => (),
        }
    }

    let Some(id) = id.filter(|id| *id != 0) else {
        warn!(element = element_name(element)?.as_str(); "Element without valid id");
        return Ok(None);
    };
    if id > 0 && base.version == 0 {
        warn!(id = id; "Uploaded object without version");
        return Ok(None);
    }
    if let Some(name) = user_name {
        if base.user != 0 {
            graph.add_user(base.user, &name);
        }
    }
    base.id = id;
    Ok(Some(base))
}

fn parse_tag(element: &BytesStart) -> Result<Option<Tag>> {
    let mut key = None;
    let mut value = None;
    for (name, text) in attributes(element)? {
        match name.as_slice() {
            b"k" => key = Some(text),
            b"v" => value = Some(text),
            _ => (),
        }
    }
    match (key, value) {
        (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => {
            Ok(Some(Tag::new(&key, &value)))
        }
        _ => {
            warn!("Incomplete tag, ignoring it");
            Ok(None)
        }
    }
}

/// Reads a relation member. The reference is a placeholder until the
/// relation is added to the graph.
pub(crate) fn parse_member(element: &BytesStart) -> Result<Option<Member>> {
    let mut kind = None;
    let mut id: Option<ItemId> = None;
    let mut role: Option<Arc<str>> = None;
    for (name, value) in attributes(element)? {
        match name.as_slice() {
            b"type" => kind = ObjectKind::from_xml(&value),
            b"ref" => id = Some(parse_value(&name, &value)?),
            b"role" if !value.is_empty() => role = Some(Arc::from(value.as_str())),
            _ => (),
        }
    }
    match (kind, id) {
        (Some(kind), Some(id)) if id != 0 => Ok(Some(Member::new(ObjectRef::unresolved(kind, id), role))),
        _ => {
            warn!("Relation member without valid type or ref, ignoring it");
            Ok(None)
        }
    }
}

pub(crate) fn parse_node_ref(element: &BytesStart) -> Result<Option<ItemId>> {
    match super::attribute(element, b"ref")? {
        Some(value) => Ok(Some(parse_value(b"ref", &value)?)),
        None => {
            warn!("Node reference without ref, ignoring it");
            Ok(None)
        }
    }
}

pub(crate) fn parse_pos(element: &BytesStart) -> Result<Option<Pos>> {
    let lat = super::attribute(element, b"lat")?;
    let lon = super::attribute(element, b"lon")?;
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Ok(None);
    };
    let pos = Pos::new(parse_value(b"lat", &lat)?, parse_value(b"lon", &lon)?);
    Ok(pos.is_valid().then_some(pos))
}

impl<R: BufRead> OsmParser<R> {
    fn new(reader: Reader<R>) -> Self {
        OsmParser {
            reader,
            graph: OsmGraph::new(),
            block: Block::Osm,
            seen_root: false,
            pending: None,
            skipped: 0,
        }
    }

    /// Moves on to `block`, refusing to go back to an earlier section.
    fn enter(&mut self, block: Block, name: &str) -> Result<()> {
        if block < self.block {
            return Err(Error::format(format!(
                "unexpected <{name}> after the {:?} section",
                self.block
            )));
        }
        self.block = block;
        Ok(())
    }

    fn start_object(&mut self, element: &BytesStart, kind: ObjectKind) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::format(format!("nested <{}> element", kind.as_str())));
        }
        let pending = match parse_base(element, &mut self.graph)? {
            None => Pending::Skipped,
            Some(base) => match kind {
                ObjectKind::Node => match parse_pos(element)? {
                    Some(pos) => Pending::Node(Node::new(base, pos)),
                    None => {
                        warn!(id = base.id; "Node without valid position");
                        Pending::Skipped
                    }
                },
                ObjectKind::Way => Pending::Way(Way::new(base)),
                ObjectKind::Relation => Pending::Relation(Relation::new(base)),
            },
        };
        self.pending = Some(pending);
        Ok(())
    }

    fn child(&mut self, element: &BytesStart) -> Result<()> {
        let name = element_name(element)?;
        match (name.as_str(), self.pending.as_mut()) {
            (_, Some(Pending::Skipped)) => {}
            ("tag", Some(pending)) => {
                if let Some(tag) = parse_tag(element)? {
                    let base = match pending {
                        Pending::Node(node) => &mut node.base,
                        Pending::Way(way) => &mut way.base,
                        Pending::Relation(relation) => &mut relation.base,
                        Pending::Skipped => return Ok(()),
                    };
                    base.tags.push(tag);
                }
            }
            ("nd", Some(Pending::Way(way))) => {
                if let Some(node) = parse_node_ref(element)? {
                    if self.graph.node(node).is_some() {
                        way.node_chain.push(node);
                    } else {
                        warn!(way = way.base.id, node = node; "Way references unknown node, dropping it");
                    }
                }
            }
            ("member", Some(Pending::Relation(relation))) => {
                if let Some(member) = parse_member(element)? {
                    relation.members.push(member);
                }
            }
            (other, _) => debug!(element = other; "Ignoring unexpected element"),
        }
        Ok(())
    }

    fn finish_object(&mut self) {
        match self.pending.take() {
            Some(Pending::Node(node)) => {
                if self.graph.node(node.base.id).is_some() {
                    warn!(id = node.base.id; "Duplicate node id, ignoring it");
                    self.skipped += 1;
                } else {
                    self.graph.insert_node(node);
                }
            }
            Some(Pending::Way(way)) => {
                if self.graph.way(way.base.id).is_some() {
                    warn!(id = way.base.id; "Duplicate way id, ignoring it");
                    self.skipped += 1;
                } else {
                    self.graph.insert_way(way);
                }
            }
            Some(Pending::Relation(relation)) => {
                if self.graph.relation(relation.base.id).is_some() {
                    warn!(id = relation.base.id; "Duplicate relation id, ignoring it");
                    self.skipped += 1;
                } else {
                    self.graph.insert_relation(relation);
                }
            }
            Some(Pending::Skipped) => self.skipped += 1,
            None => (),
        }
    }

    fn element(&mut self, element: &BytesStart, empty: bool) -> Result<()> {
        let name = element_name(element)?;
        if !self.seen_root {
            if name != "osm" {
                return Err(Error::format(format!("unexpected root element <{name}>")));
            }
            self.seen_root = true;
            let policy = parse_upload_policy(element)?;
            self.graph.set_upload_policy(policy);
            return Ok(());
        }
        if self.pending.is_some() {
            return self.child(element);
        }

        match name.as_str() {
            "bounds" => {
                self.enter(Block::Bounds, &name)?;
                if let Some(bounds) = parse_bounds(element)? {
                    self.graph.set_bounds(bounds);
                }
            }
            "node" => {
                self.enter(Block::Nodes, &name)?;
                self.start_object(element, ObjectKind::Node)?;
            }
            "way" => {
                self.enter(Block::Ways, &name)?;
                self.start_object(element, ObjectKind::Way)?;
            }
            "relation" => {
                self.enter(Block::Relations, &name)?;
                self.start_object(element, ObjectKind::Relation)?;
            }
            other => {
                return Err(Error::format(format!("unexpected element <{other}> in osm data")))
            }
        }
        if empty {
            self.finish_object();
        }
        Ok(())
    }

    fn run(mut self) -> Result<OsmGraph> {
        let started = Instant::now();
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event_into(&mut buf)? {
                Event::Eof => break,
                Event::Start(element) => self.element(&element, false)?,
                Event::Empty(element) => self.element(&element, true)?,
                Event::End(element) => {
                    if matches!(element.name().as_ref(), b"node" | b"way" | b"relation") {
                        self.finish_object();
                    }
                }
                // declarations, comments, whitespace and the like carry no data
                _ => (),
            }
            buf.clear();
        }

        if !self.seen_root {
            return Err(Error::format("no osm element found"));
        }
        let resolved = self.graph.resolve_references();
        info!(
            nodes = self.graph.nodes().len(),
            ways = self.graph.ways().len(),
            relations = self.graph.relations().len(),
            skipped = self.skipped,
            resolved = resolved,
            elapsed_ms = started.elapsed().as_millis() as u64;
            "Parsed OSM data"
        );
        Ok(self.graph)
    }
}

/// Reads OSM XML into a fresh graph.
pub fn parse_osm<R: BufRead>(input: R) -> Result<OsmGraph> {
    OsmParser::new(create_reader(input)).run()
}

/// Reads an OSM XML file, optionally gzip or xz compressed.
pub fn parse_osm_file(path: &Path) -> Result<OsmGraph> {
    info!(path = path.to_string_lossy().as_ref(); "Reading OSM file");
    OsmParser::new(open_reader(path)?).run()
}

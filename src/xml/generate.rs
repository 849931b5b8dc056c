use quick_xml::events::{BytesStart, Event};
use quick_xml::writer::Writer;

use super::{create_writer, finish_writer, format_coordinate};
use crate::data::{ItemId, Node, OsmObject, Relation, Tag, TagList, Way};
use crate::diff::DirtySummary;
use crate::errors::Result;
use crate::graph::OsmGraph;

const GENERATOR: &str = concat!("osmedit v", env!("CARGO_PKG_VERSION"));

/// Upload representation of a single object.
pub trait ToOsmXml {
    /// Document with an `<osm>` root holding just this object, as sent to
    /// the server when creating or modifying it within `changeset`.
    fn generate_xml(&self, changeset: &str) -> Result<String>;
}

fn tag_element(tag: &Tag) -> BytesStart<'static> {
    let mut element = BytesStart::new("tag");
    element.push_attribute(("k", &*tag.key));
    element.push_attribute(("v", &*tag.value));
    element
}

/// Tag elements of everything but discardable tags.
fn tag_elements(tags: &TagList) -> Vec<BytesStart<'static>> {
    tags.iter()
        .filter(|tag| !tag.is_discardable())
        .map(tag_element)
        .collect()
}

/// Writes `element` with empty child elements, or as an empty element if
/// there are no children.
pub(crate) fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: BytesStart<'_>,
    children: &[BytesStart<'_>],
) -> Result<()> {
    if children.is_empty() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }
    let end = element.to_end().into_owned();
    writer.write_event(Event::Start(element))?;
    for child in children {
        writer.write_event(Event::Empty(child.borrow()))?;
    }
    writer.write_event(Event::End(end))?;
    Ok(())
}

/// Opening element of an object with id, version and changeset. New
/// objects get their id from the server, so it is left out.
fn object_element<T: OsmObject>(object: &T, changeset: &str) -> BytesStart<'static> {
    let mut element = BytesStart::new(T::KIND.as_str());
    if !object.base().is_new() {
        element.push_attribute(("id", object.id().to_string().as_str()));
    }
    element.push_attribute(("version", object.base().version.to_string().as_str()));
    element.push_attribute(("changeset", changeset));
    element
}

fn wrap_in_osm(element: BytesStart<'_>, children: &[BytesStart<'_>]) -> Result<String> {
    let mut writer = create_writer()?;
    writer.write_event(Event::Start(BytesStart::new("osm")))?;
    write_element(&mut writer, element, children)?;
    writer.write_event(Event::End(BytesStart::new("osm").to_end()))?;
    finish_writer(writer)
}

pub(crate) fn node_ref_element(node: ItemId) -> BytesStart<'static> {
    let mut element = BytesStart::new("nd");
    element.push_attribute(("ref", node.to_string().as_str()));
    element
}

impl ToOsmXml for Node {
    fn generate_xml(&self, changeset: &str) -> Result<String> {
        let mut element = object_element(self, changeset);
        element.push_attribute(("lat", format_coordinate(self.pos.lat).as_str()));
        element.push_attribute(("lon", format_coordinate(self.pos.lon).as_str()));
        wrap_in_osm(element, &tag_elements(&self.base.tags))
    }
}

impl ToOsmXml for Way {
    fn generate_xml(&self, changeset: &str) -> Result<String> {
        let mut children: Vec<BytesStart> =
            self.node_chain.iter().copied().map(node_ref_element).collect();
        children.extend(tag_elements(&self.base.tags));
        wrap_in_osm(object_element(self, changeset), &children)
    }
}

impl ToOsmXml for Relation {
    fn generate_xml(&self, changeset: &str) -> Result<String> {
        let mut children = Vec::with_capacity(self.members.len() + self.base.tags.len());
        for member in &self.members {
            let Some(kind) = member.object.kind() else {
                continue;
            };
            let mut element = BytesStart::new("member");
            element.push_attribute(("type", kind.as_str()));
            element.push_attribute(("ref", member.object.get_id().to_string().as_str()));
            element.push_attribute(("role", member.role()));
            children.push(element);
        }
        children.extend(tag_elements(&self.base.tags));
        wrap_in_osm(object_element(self, changeset), &children)
    }
}

/// Document opening a changeset. Unlike object tags the `created_by` tag
/// is kept here, it is how the server learns about the editor.
pub fn generate_changeset_xml(comment: &str, created_by: Option<&str>) -> Result<String> {
    let children = [
        tag_element(&Tag::new("created_by", created_by.unwrap_or(GENERATOR))),
        tag_element(&Tag::new("comment", comment)),
    ];
    wrap_in_osm(BytesStart::new("changeset"), &children)
}

/// osmChange document collecting the deletions of an upload.
#[derive(Debug, Clone, Default)]
pub struct OsmChange {
    deletions: Vec<BytesStart<'static>>,
}

impl OsmChange {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = create_writer()?;
        let mut root = BytesStart::new("osmChange");
        root.push_attribute(("generator", GENERATOR));
        root.push_attribute(("version", "0.6"));
        let end = root.to_end().into_owned();
        writer.write_event(Event::Start(root))?;
        write_element(&mut writer, BytesStart::new("delete"), &self.deletions)?;
        writer.write_event(Event::End(end))?;
        finish_writer(writer)
    }
}

pub fn osmchange_init() -> OsmChange {
    OsmChange::default()
}

fn deletion_element<T: OsmObject>(object: &T, changeset: &str) -> BytesStart<'static> {
    let mut element = BytesStart::new(T::KIND.as_str());
    element.push_attribute(("id", object.id().to_string().as_str()));
    element.push_attribute(("version", object.base().version.to_string().as_str()));
    element.push_attribute(("changeset", changeset));
    element
}

/// Adds every deleted object of `summary` to `change`. Relations come
/// first, then ways, then nodes, so nothing is deleted while still in use.
pub fn osmchange_delete(
    change: &mut OsmChange,
    graph: &OsmGraph,
    summary: &DirtySummary,
    changeset: &str,
) {
    for id in &summary.relations.deleted {
        if let Some(relation) = graph.relation(*id) {
            change.deletions.push(deletion_element(relation, changeset));
        }
    }
    for id in &summary.ways.deleted {
        if let Some(way) = graph.way(*id) {
            change.deletions.push(deletion_element(way, changeset));
        }
    }
    for id in &summary.nodes.deleted {
        if let Some(node) = graph.node(*id) {
            change.deletions.push(deletion_element(node, changeset));
        }
    }
}

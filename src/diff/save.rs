use std::fs;
use std::path::Path;

use log::info;
use quick_xml::events::{BytesStart, Event};

use crate::data::{Base, Member, OsmObject, TagList};
use crate::errors::Result;
use crate::graph::OsmGraph;
use crate::xml::generate::{node_ref_element, write_element};
use crate::xml::{create_writer, finish_writer, format_coordinate};

fn state(base: &Base) -> &'static str {
    if base.is_deleted() {
        "deleted"
    } else if base.is_new() {
        "new"
    } else {
        "modified"
    }
}

/// Opening element of a diff entry. Deleted objects only need their id.
fn entry_element<T: OsmObject>(object: &T) -> BytesStart<'static> {
    let base = object.base();
    let mut element = BytesStart::new(T::KIND.as_str());
    element.push_attribute(("id", base.id.to_string().as_str()));
    element.push_attribute(("state", state(base)));
    if !base.is_deleted() {
        element.push_attribute(("version", base.version.to_string().as_str()));
    }
    element
}

fn tag_children(tags: &TagList) -> Vec<BytesStart<'static>> {
    tags.iter()
        .map(|tag| {
            let mut element = BytesStart::new("tag");
            element.push_attribute(("k", &*tag.key));
            element.push_attribute(("v", &*tag.value));
            element
        })
        .collect()
}

fn member_element(member: &Member) -> Option<BytesStart<'static>> {
    let kind = member.object.kind()?;
    let mut element = BytesStart::new("member");
    element.push_attribute(("type", kind.as_str()));
    element.push_attribute(("ref", member.object.get_id().to_string().as_str()));
    if let Some(role) = &member.role {
        element.push_attribute(("role", &**role));
    }
    Some(element)
}

fn needs_entry(base: &Base) -> bool {
    base.is_dirty() || base.is_deleted()
}

/// Serializes all pending changes of `graph` into the diff format.
pub fn generate_diff(graph: &OsmGraph, project_name: &str) -> Result<String> {
    let mut writer = create_writer()?;
    let mut root = BytesStart::new("diff");
    root.push_attribute(("name", project_name));
    let end = root.to_end().into_owned();
    writer.write_event(Event::Start(root))?;

    for node in graph.nodes().values().filter(|node| needs_entry(&node.base)) {
        let mut element = entry_element(node);
        if node.base.is_deleted() {
            write_element(&mut writer, element, &[])?;
            continue;
        }
        element.push_attribute(("lat", format_coordinate(node.pos.lat).as_str()));
        element.push_attribute(("lon", format_coordinate(node.pos.lon).as_str()));
        write_element(&mut writer, element, &tag_children(&node.base.tags))?;
    }

    for way in graph.ways().values() {
        let hidden = graph.is_way_hidden(way.base.id);
        if !needs_entry(&way.base) {
            if hidden {
                let mut element = BytesStart::new("way");
                element.push_attribute(("id", way.base.id.to_string().as_str()));
                element.push_attribute(("hidden", "true"));
                write_element(&mut writer, element, &[])?;
            }
            continue;
        }
        let mut element = entry_element(way);
        if way.base.is_deleted() {
            write_element(&mut writer, element, &[])?;
            continue;
        }
        if hidden {
            element.push_attribute(("hidden", "true"));
        }
        let mut children: Vec<BytesStart> =
            way.node_chain.iter().copied().map(node_ref_element).collect();
        children.extend(tag_children(&way.base.tags));
        write_element(&mut writer, element, &children)?;
    }

    for relation in graph
        .relations()
        .values()
        .filter(|relation| needs_entry(&relation.base))
    {
        let element = entry_element(relation);
        if relation.base.is_deleted() {
            write_element(&mut writer, element, &[])?;
            continue;
        }
        let mut children: Vec<BytesStart> =
            relation.members.iter().filter_map(member_element).collect();
        children.extend(tag_children(&relation.base.tags));
        write_element(&mut writer, element, &children)?;
    }

    writer.write_event(Event::End(end))?;
    finish_writer(writer)
}

/// Writes the pending changes of `graph` to `path`. If there is nothing to
/// save an existing diff file is removed instead.
pub fn diff_save(graph: &OsmGraph, path: &Path, project_name: &str) -> Result<()> {
    if graph.is_clean(true) {
        if path.exists() {
            info!(path = path.to_string_lossy().as_ref(); "No changes left, removing diff");
            fs::remove_file(path)?;
        }
        return Ok(());
    }

    let text = generate_diff(graph, project_name)?;
    fs::write(path, text)?;
    let summary = graph.dirty_summary();
    info!(
        path = path.to_string_lossy().as_ref(),
        nodes = summary.nodes.added.len() + summary.nodes.changed.len() + summary.nodes.deleted.len(),
        ways = summary.ways.added.len() + summary.ways.changed.len() + summary.ways.deleted.len(),
        relations = summary.relations.added.len()
            + summary.relations.changed.len()
            + summary.relations.deleted.len(),
        hidden = graph.hidden_ways().len();
        "Saved diff"
    );
    Ok(())
}

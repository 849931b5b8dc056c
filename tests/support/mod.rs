#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use osmedit::data::{Base, ItemId, Node, Pos, Way};
use osmedit::{OsmGraph, Project};
use tempfile::TempDir;

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Project directory holding a copy of the village data, and the diff if
/// `with_diff` is set.
pub fn village_project(with_diff: bool) -> (TempDir, Project) {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::copy(fixture("village.osm"), dir.path().join("village.osm")).expect("copy osm");
    if with_diff {
        fs::copy(fixture("village.diff"), dir.path().join("village.diff")).expect("copy diff");
    }
    let project = Project::new("village", dir.path());
    (dir, project)
}

pub fn village() -> OsmGraph {
    osmedit::xml::parse_osm_file(&fixture("village.osm")).expect("village parses")
}

pub fn uploaded(id: ItemId) -> Base {
    Base {
        version: 1,
        ..Base::new(id)
    }
}

/// Village data plus `count` unused nodes, numbered from 100.
pub fn graph_with_nodes(count: ItemId) -> OsmGraph {
    let mut graph = village();
    for id in 100..100 + count {
        let pos = Pos::new(52.2693 + (id - 100) as f64 * 0.00001, 9.5752);
        graph.insert_node(Node::new(uploaded(id), pos));
    }
    graph
}

pub fn insert_way(graph: &mut OsmGraph, id: ItemId, chain: Vec<ItemId>) {
    graph.insert_way(Way::with_nodes(uploaded(id), chain));
}

pub fn assert_way_counts(graph: &OsmGraph) {
    for node in graph.nodes().values() {
        let expected = graph
            .ways()
            .values()
            .filter(|way| way.contains_node(node.base.id))
            .count();
        assert_eq!(node.ways as usize, expected, "way count of node #{}", node.base.id);
    }
}

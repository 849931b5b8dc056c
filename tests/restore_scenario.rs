mod support;

use std::fs;

use osmedit::data::{Flags, ItemId, ObjectRef};
use osmedit::graph::UploadPolicy;
use osmedit::xml::{osmchange_delete, osmchange_init, ToOsmXml};
use osmedit::{OpenProject, Project, RestoreStatus};
use rstest::rstest;
use tempfile::TempDir;

fn open_scenario() -> (TempDir, Project, OpenProject) {
    let dir = tempfile::tempdir().expect("tempdir");
    for file in ["scenario.osm", "scenario.diff"] {
        fs::copy(support::fixture(file), dir.path().join(file)).expect("copy fixture");
    }
    let project = Project::new("scenario", dir.path());
    let opened = project.open().expect("open");
    (dir, project, opened)
}

fn reference(name: &str) -> String {
    fs::read_to_string(support::fixture(name))
        .expect("reference output")
        .replace("@VERSION@", env!("CARGO_PKG_VERSION"))
}

#[test]
fn base_data_matches_the_fixture() {
    let graph = osmedit::xml::parse_osm_file(&support::fixture("scenario.osm")).expect("parse");
    assert_eq!(
        (graph.nodes().len(), graph.ways().len(), graph.relations().len()),
        (10, 3, 4)
    );
    assert_eq!(graph.upload_policy(), UploadPolicy::Blocked);
    assert!(graph.is_clean(true));
}

#[test]
fn restore_keeps_counts_and_grows_by_the_new_nodes() {
    let (_dir, _project, opened) = open_scenario();
    let graph = &opened.graph;
    assert_eq!(opened.restore_status, RestoreStatus::RESTORED);
    assert_eq!(
        (graph.nodes().len(), graph.ways().len(), graph.relations().len()),
        (12, 3, 4)
    );
    assert_eq!(graph.upload_policy(), UploadPolicy::Blocked);
    support::assert_way_counts(graph);
}

#[rstest]
#[case::new_node_on_top_of_another(ObjectRef::Node(-1), Flags::DIRTY)]
#[case::new_node(ObjectRef::Node(-2), Flags::DIRTY)]
#[case::unchanged_node(ObjectRef::Node(1), Flags::NONE)]
#[case::node_identical_to_base(ObjectRef::Node(3), Flags::NONE)]
#[case::retagged_node(ObjectRef::Node(4), Flags::DIRTY)]
#[case::node_of_deleted_way(ObjectRef::Node(5), Flags::NONE)]
#[case::deleted_node(ObjectRef::Node(6), Flags::DELETED)]
#[case::way_identical_to_base(ObjectRef::Way(100), Flags::NONE)]
#[case::deleted_way(ObjectRef::Way(101), Flags::DELETED)]
#[case::untouched_way(ObjectRef::Way(102), Flags::NONE)]
#[case::route_with_new_role(ObjectRef::Relation(200), Flags::DIRTY)]
#[case::untouched_relation(ObjectRef::Relation(201), Flags::NONE)]
#[case::relation_of_placeholders(ObjectRef::Relation(202), Flags::DIRTY)]
#[case::deleted_relation(ObjectRef::Relation(203), Flags::DELETED)]
fn restored_flags(#[case] object: ObjectRef, #[case] expected: Flags) {
    let (_dir, _project, opened) = open_scenario();
    let base = opened.graph.object_base(&object).expect("object is present");
    assert_eq!(base.flags, expected, "flags of {object}");
}

#[test]
fn restored_objects_carry_the_diff_state() {
    let (_dir, _project, opened) = open_scenario();
    let graph = &opened.graph;

    let gate = graph.node(-1).expect("gate");
    assert_eq!(gate.pos, graph.node(5).expect("bollard").pos);
    assert_eq!(gate.base.tags.get_value("barrier"), Some("gate"));
    assert_eq!(graph.node(4).expect("bench").base.tags.get_value("backrest"), Some("yes"));
    assert_eq!(graph.node(5).expect("bollard").ways, 0);

    let route = graph.relation(200).expect("route");
    assert_eq!(route.members.len(), 2);
    assert_eq!(route.members[0].object, ObjectRef::Way(100));
    assert_eq!(route.members[0].role(), "backward");

    let network = graph.relation(202).expect("network");
    assert!(network.members.iter().all(|member| !member.object.is_real()));
    let ids: Vec<ItemId> = network.members.iter().map(|member| member.object.get_id()).collect();
    assert_eq!(ids, vec![300, 301]);
    assert_eq!(network.base.tags.get_value("name"), Some("Bus lines"));

    let summary = graph.dirty_summary();
    assert_eq!(summary.nodes.added, vec![-2, -1]);
    assert_eq!(summary.nodes.changed, vec![4]);
    assert_eq!(summary.nodes.deleted, vec![6]);
    assert!(summary.ways.added.is_empty() && summary.ways.changed.is_empty());
    assert_eq!(summary.ways.deleted, vec![101]);
    assert_eq!(summary.relations.changed, vec![200, 202]);
    assert_eq!(summary.relations.deleted, vec![203]);
}

#[test]
fn upload_documents_match_the_reference() {
    let (_dir, _project, opened) = open_scenario();
    let graph = &opened.graph;

    let xml = graph.relation(200).expect("route").generate_xml("42").expect("xml");
    assert_eq!(xml, reference("scenario_relation_200.osm"));

    let mut change = osmchange_init();
    osmchange_delete(&mut change, graph, &graph.dirty_summary(), "42");
    assert_eq!(change.to_xml().expect("osmChange"), reference("scenario_delete.osc"));
}

#[test]
fn saved_diff_drops_entries_identical_to_the_base() {
    let (_dir, project, opened) = open_scenario();
    project.diff_save(&opened.graph).expect("save");

    let text = fs::read_to_string(project.diff_path()).expect("read diff");
    assert!(!text.contains("<node id=\"3\""));
    assert!(!text.contains("<way id=\"100\""));

    let reopened = project.open().expect("reopen");
    assert_eq!(reopened.restore_status, RestoreStatus::RESTORED);
    assert_eq!(reopened.graph.dirty_summary(), opened.graph.dirty_summary());
}

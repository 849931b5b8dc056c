use super::OsmGraph;
use crate::data::{ObjectRef, TagList};

const NAME_KEYS: &[&str] = &["name", "ref", "note", "fixme", "sport"];
const TYPE_KEYS: &[&str] = &[
    "amenity", "place", "historic", "leisure", "tourism", "landuse", "waterway", "railway",
    "natural",
];
const ROAD_CLASSES: &[&str] = &[
    "primary",
    "secondary",
    "tertiary",
    "unclassified",
    "residential",
    "service",
];

fn first_value<'a>(tags: &'a TagList, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| tags.get_value(key))
}

/// Best guess at what kind of feature the tags describe, plus a name found
/// on the way.
fn feature_type(tags: &TagList, name: &mut Option<String>) -> Option<String> {
    let mut kind = first_value(tags, TYPE_KEYS).map(str::to_string);
    // set when the type already carries all information about the feature
    let mut complete = false;

    if kind.is_none() && tags.get_value("building").is_some() {
        let street = tags.get_value("addr:street");
        let number = tags.get_value("addr:housenumber");
        kind = Some(match (street, number) {
            (Some(street), Some(number)) => {
                complete = true;
                format!("building {street} {number}")
            }
            (None, Some(number)) => {
                complete = true;
                format!("building housenumber {number}")
            }
            _ => {
                if name.is_none() {
                    *name = tags.get_value("addr:housename").map(str::to_string);
                }
                "building".to_string()
            }
        });
    }
    if kind.is_none() {
        kind = tags.get_value("emergency").map(str::to_string);
    }

    match tags.get_value("highway") {
        Some(highway) if !complete => Some(if ROAD_CLASSES.contains(&highway) {
            format!("{highway} road")
        } else if highway == "pedestrian" {
            "pedestrian way/area".to_string()
        } else if highway == "construction" {
            "road/street under construction".to_string()
        } else {
            highway.to_string()
        }),
        _ => kind,
    }
}

impl OsmGraph {
    /// Short description of an object for the user, e.g.
    /// `residential road: "Main Street"`.
    pub fn object_name(&self, object: &ObjectRef) -> String {
        let tags = match self.tags_of(object) {
            Some(tags) if !tags.is_empty() => tags,
            _ => return format!("unspecified {}", object.type_string()),
        };

        let mut name = first_value(tags, NAME_KEYS).map(str::to_string);
        let kind = feature_type(tags, &mut name);

        let description = match (kind, name) {
            (Some(kind), Some(name)) => format!("{kind}: \"{name}\""),
            (Some(kind), None) => kind,
            (None, Some(name)) => format!("{}: \"{}\"", object.type_string(), name),
            (None, None) => format!("unspecified {}", object.type_string()),
        };
        description.replace('_', " ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Node, Pos};
    use crate::graph::test_support::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[], "unspecified node")]
    #[case(&[("name", "Town Hall")], "node: \"Town Hall\"")]
    #[case(&[("amenity", "post_box")], "post box")]
    #[case(&[("amenity", "bench"), ("note", "broken")], "bench: \"broken\"")]
    #[case(&[("highway", "residential"), ("name", "Main Street")], "residential road: \"Main Street\"")]
    #[case(&[("highway", "bus_stop")], "bus stop")]
    #[case(&[("building", "yes"), ("addr:street", "Elm Road"), ("addr:housenumber", "3")], "building Elm Road 3")]
    #[case(&[("building", "yes"), ("addr:housename", "Rose Cottage")], "building: \"Rose Cottage\"")]
    #[case(&[("created_by", "JOSM")], "unspecified node")]
    fn describes_nodes(#[case] pairs: &[(&str, &str)], #[case] expected: &str) {
        let mut graph = graph();
        let mut node = Node::new(base(1), Pos::new(52.2693, 9.5752));
        node.base.tags = tags(pairs);
        graph.insert_node(node);
        assert_eq!(graph.object_name(&ObjectRef::Node(1)), expected);
    }

    #[test]
    fn placeholders_are_unspecified() {
        let graph = graph();
        assert_eq!(graph.object_name(&ObjectRef::WayId(3)), "unspecified way/area id");
    }
}

use std::sync::{Arc, OnceLock};

use log::warn;
use regex::Regex;

use super::OsmGraph;
use crate::data::{ItemId, ObjectRef, Relation, Tag, TagList, ValueCache, Way};

/// What reversing a way changed besides the node order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReverseResult {
    /// Direction dependent tags of the way that were flipped.
    pub tags_flipped: usize,
    /// forward/backward roles in route relations that were flipped.
    pub roles_flipped: usize,
}

fn direction_suffix() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| {
        Regex::new(r"(?i):(left|right|forward|backward)$").expect("direction suffix pattern")
    })
}

fn opposite(direction: &str) -> Option<&'static str> {
    match direction.to_ascii_lowercase().as_str() {
        "left" => Some("right"),
        "right" => Some("left"),
        "forward" => Some("backward"),
        "backward" => Some("forward"),
        _ => None,
    }
}

/// Flips tags whose meaning depends on the direction of the way. Returns
/// the number of tags changed.
fn reverse_direction_sensitive_tags(tags: &mut TagList, cache: &mut ValueCache) -> usize {
    let mut flipped = 0;
    for tag in tags.iter_mut() {
        let key = tag.key.to_ascii_lowercase();
        if key == "oneway" {
            let value = tag.value.to_ascii_lowercase();
            let reversed = match value.as_str() {
                "yes" | "true" | "1" => Some("-1"),
                "-1" => Some("yes"),
                _ => None,
            };
            match reversed {
                Some(reversed) => {
                    tag.value = cache.intern(reversed);
                    flipped += 1;
                }
                None => warn!(value = &*tag.value; "Unknown oneway value, left unchanged"),
            }
        } else if key == "sidewalk" {
            if let Some(reversed) = opposite(&tag.value).filter(|_| {
                tag.value.eq_ignore_ascii_case("left") || tag.value.eq_ignore_ascii_case("right")
            }) {
                tag.value = cache.intern(reversed);
                flipped += 1;
            }
        } else if let Some(suffix) = direction_suffix()
            .captures(&tag.key)
            .and_then(|captures| captures.get(1))
        {
            if let Some(reversed) = opposite(suffix.as_str()) {
                let new_key = format!("{}{}", &tag.key[..suffix.start()], reversed);
                *tag = Tag {
                    key: cache.intern(&new_key),
                    value: Arc::clone(&tag.value),
                };
                flipped += 1;
            }
        }
    }
    flipped
}

impl OsmGraph {
    /// Reverses the node order of a way, together with the tags and route
    /// roles that refer to its direction.
    pub fn way_reverse(&mut self, way: ItemId) -> ReverseResult {
        let mut cache = std::mem::take(&mut self.cache);
        let tags_flipped = self
            .modify::<Way, _>(way, |way| {
                way.node_chain.reverse();
                reverse_direction_sensitive_tags(&mut way.base.tags, &mut cache)
            })
            .unwrap_or_else(|| panic!("cannot reverse unknown way #{way}"));

        let mut roles_flipped = 0;
        let routes: Vec<ItemId> = self
            .object_to_relations(&ObjectRef::Way(way))
            .into_iter()
            .filter(|relation| self.relation(*relation).is_some_and(|r| r.is_type("route")))
            .collect();
        for relation in routes {
            roles_flipped += self
                .modify::<Relation, _>(relation, |relation| {
                    let mut flipped = 0;
                    for member in &mut relation.members {
                        if member.object != ObjectRef::Way(way) {
                            continue;
                        }
                        let reversed = member
                            .role
                            .as_deref()
                            .filter(|role| {
                                role.eq_ignore_ascii_case("forward")
                                    || role.eq_ignore_ascii_case("backward")
                            })
                            .and_then(opposite);
                        if let Some(reversed) = reversed {
                            member.role = Some(cache.intern(reversed));
                            flipped += 1;
                        }
                    }
                    flipped
                })
                .unwrap_or(0);
        }
        self.cache = cache;

        ReverseResult {
            tags_flipped,
            roles_flipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Member;
    use crate::graph::test_support::*;
    use rstest::rstest;

    #[rstest]
    #[case(("oneway", "yes"), ("oneway", "-1"))]
    #[case(("oneway", "True"), ("oneway", "-1"))]
    #[case(("oneway", "-1"), ("oneway", "yes"))]
    #[case(("sidewalk", "left"), ("sidewalk", "right"))]
    #[case(("cycleway:left", "lane"), ("cycleway:right", "lane"))]
    #[case(("maxspeed:Forward", "50"), ("maxspeed:backward", "50"))]
    fn flips_direction_tags(#[case] before: (&str, &str), #[case] after: (&str, &str)) {
        let mut list = tags(&[before]);
        let flipped = reverse_direction_sensitive_tags(&mut list, &mut ValueCache::new());
        assert_eq!(flipped, 1);
        assert_eq!(list.get_value(after.0), Some(after.1));
    }

    #[rstest]
    #[case(("oneway", "no"))]
    #[case(("sidewalk", "both"))]
    #[case(("name", "Left Street"))]
    fn leaves_other_tags_alone(#[case] tag: (&str, &str)) {
        let mut list = tags(&[tag]);
        assert_eq!(reverse_direction_sensitive_tags(&mut list, &mut ValueCache::new()), 0);
        assert_eq!(list.get_value(tag.0), Some(tag.1));
    }

    #[test]
    fn reverses_chain_tags_and_route_roles() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2, 3]);
        add_way(&mut graph, 10, &[1, 2, 3]);
        graph.set_tags(&ObjectRef::Way(10), tags(&[("highway", "primary"), ("oneway", "yes")]));
        let mut route = Relation::new(base(20));
        route.base.tags = tags(&[("type", "route")]);
        route.members = vec![
            Member::new(ObjectRef::Way(10), Some("forward".into())),
            Member::new(ObjectRef::Node(2), Some("stop".into())),
        ];
        graph.insert_relation(route);
        let mut area = Relation::new(base(21));
        area.base.tags = tags(&[("type", "multipolygon")]);
        area.members = vec![Member::new(ObjectRef::Way(10), Some("forward".into()))];
        graph.insert_relation(area);

        let result = graph.way_reverse(10);
        assert_eq!(
            result,
            ReverseResult {
                tags_flipped: 1,
                roles_flipped: 1
            }
        );
        assert_eq!(graph.way(10).expect("way").node_chain, vec![3, 2, 1]);
        assert_eq!(graph.relation(20).expect("route").members[0].role(), "backward");
        assert_eq!(graph.relation(21).expect("area").members[0].role(), "forward");
    }

    #[test]
    fn reversing_twice_restores_the_clean_state() {
        let mut graph = graph();
        add_nodes(&mut graph, &[1, 2]);
        let mut way = Way::with_nodes(base(10), vec![1, 2]);
        way.base.tags = tags(&[("oneway", "yes")]);
        graph.insert_way(way);

        graph.way_reverse(10);
        assert!(graph.way(10).expect("way").base.is_dirty());
        graph.way_reverse(10);
        assert!(!graph.way(10).expect("way").base.is_dirty());
    }
}

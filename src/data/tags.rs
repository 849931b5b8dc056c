use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::value_cache::ValueCache;

/// Plain key → value view of a tag list, as produced by editors and importers.
pub type TagMap = BTreeMap<String, String>;

/// Keys that carry no information for other mappers and are dropped on upload.
const DISCARDABLE_KEYS: &[&str] = &[
    "created_by",
    "converted_by",
    "odbl",
    "odbl:note",
    "tiger:upload_uuid",
    "tiger:tlid",
    "tiger:source",
    "tiger:separated",
    "geobase:datasetName",
    "geobase:uuid",
];

pub fn is_discardable_key(key: &str) -> bool {
    DISCARDABLE_KEYS.iter().any(|discardable| discardable.eq_ignore_ascii_case(key))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: Arc<str>,
    pub value: Arc<str>,
}

impl Tag {
    pub fn new(key: &str, value: &str) -> Self {
        Tag {
            key: Arc::from(key),
            value: Arc::from(value),
        }
    }

    pub fn interned(cache: &mut ValueCache, key: &str, value: &str) -> Self {
        Tag {
            key: cache.intern(key),
            value: cache.intern(value),
        }
    }

    pub fn is_discardable(&self) -> bool {
        is_discardable_key(&self.key)
    }

    fn same_key(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }

    fn same_key_and_value(&self, other: &Tag) -> bool {
        self.same_key(&other.key) && self.value == other.value
    }
}

impl<K: AsRef<str>, V: AsRef<str>> From<(K, V)> for Tag {
    fn from((key, value): (K, V)) -> Self {
        Tag::new(key.as_ref(), value.as_ref())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Ordered tags of a single object.
///
/// Keys are unique on the normal editing path. Two tags can share a key
/// after a merge with conflicting values; [`TagList::has_tag_collisions`]
/// reports that situation so the editor can ask the user to resolve it.
#[derive(Debug, Clone, Default)]
pub struct TagList {
    tags: Vec<Tag>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &TagMap) -> Self {
        map.iter().map(|(key, value)| Tag::new(key, value)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tag> {
        self.tags.iter_mut()
    }

    pub fn push(&mut self, tag: Tag) {
        self.tags.push(tag);
    }

    /// True if at least one tag is not discardable.
    pub fn has_real_tags(&self) -> bool {
        self.real_tags().next().is_some()
    }

    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| &*tag.key == key)
            .map(|tag| &*tag.value)
    }

    pub fn contains(&self, predicate: impl Fn(&Tag) -> bool) -> bool {
        self.tags.iter().any(predicate)
    }

    /// Installs `new_tags` in place of the current ones and reports whether
    /// the content differs from what was there before.
    pub fn replace(&mut self, new_tags: TagList) -> bool {
        let changed = *self != new_tags;
        self.tags = new_tags.tags;
        changed
    }

    /// Appends the tags of `other`, used when two objects are merged.
    ///
    /// Identical tags are only kept once and discardable tags of `other` are
    /// dropped. Tags with the same key but a different value are both kept.
    /// Returns true if such a conflicting pair was found.
    pub fn merge(&mut self, other: TagList) -> bool {
        let mut conflict = false;
        for tag in other.tags {
            if tag.is_discardable() {
                continue;
            }
            if self.tags.iter().any(|mine| mine.same_key_and_value(&tag)) {
                continue;
            }
            if self.tags.iter().any(|mine| mine.same_key(&tag.key)) {
                conflict = true;
            }
            self.tags.push(tag);
        }
        conflict
    }

    /// True if two tags share a key, ignoring ASCII case.
    pub fn has_tag_collisions(&self) -> bool {
        self.tags.iter().enumerate().any(|(index, tag)| {
            self.tags[index + 1..]
                .iter()
                .any(|later| later.same_key(&tag.key))
        })
    }

    pub fn as_map(&self) -> TagMap {
        let mut map = TagMap::new();
        for tag in &self.tags {
            map.entry(tag.key.to_string())
                .or_insert_with(|| tag.value.to_string());
        }
        map
    }

    pub fn without_discardable(&self) -> TagList {
        self.real_tags().cloned().collect()
    }

    /// Moves every key and value into `cache`.
    pub fn interned(self, cache: &mut ValueCache) -> TagList {
        self.tags
            .into_iter()
            .map(|tag| Tag::interned(cache, &tag.key, &tag.value))
            .collect()
    }

    fn real_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(|tag| !tag.is_discardable())
    }
}

impl FromIterator<Tag> for TagList {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        TagList {
            tags: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TagList {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

/// True if the real tags in `mine` and the entries in `theirs` pair up one
/// to one.
fn pair_up<T>(mine: Vec<&Tag>, mut theirs: Vec<T>, matches: impl Fn(&Tag, &T) -> bool) -> bool {
    if mine.len() != theirs.len() {
        return false;
    }
    for tag in mine {
        match theirs.iter().position(|candidate| matches(tag, candidate)) {
            Some(index) => {
                theirs.swap_remove(index);
            }
            None => return false,
        }
    }
    true
}

impl PartialEq for TagList {
    fn eq(&self, other: &Self) -> bool {
        pair_up(
            self.real_tags().collect(),
            other.real_tags().collect(),
            |mine, theirs: &&Tag| theirs.same_key_and_value(mine),
        )
    }
}

impl PartialEq<TagMap> for TagList {
    fn eq(&self, other: &TagMap) -> bool {
        pair_up(
            self.real_tags().collect(),
            other
                .iter()
                .filter(|(key, _)| !is_discardable_key(key))
                .collect(),
            |mine, (key, value): &(&String, &String)| {
                mine.same_key(key) && &*mine.value == value.as_str()
            },
        )
    }
}

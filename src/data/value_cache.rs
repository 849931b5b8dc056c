use std::collections::HashSet;
use std::sync::Arc;

/// Interning pool for tag keys, tag values and member roles.
///
/// Most strings in an OSM extract repeat thousands of times (`highway`,
/// `residential`, `outer`, ...), so every object shares one allocation per
/// distinct string. The pool is owned by the graph that uses it.
#[derive(Debug, Default, Clone)]
pub struct ValueCache {
    values: HashSet<Arc<str>>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared copy of `value`, inserting it on first use.
    pub fn intern(&mut self, value: &str) -> Arc<str> {
        if let Some(existing) = self.values.get(value) {
            return Arc::clone(existing);
        }
        let shared: Arc<str> = Arc::from(value);
        self.values.insert(Arc::clone(&shared));
        shared
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops every string no object refers to anymore. Returns how many
    /// entries were released.
    pub fn purge(&mut self) -> usize {
        let before = self.values.len();
        self.values.retain(|value| Arc::strong_count(value) > 1);
        before - self.values.len()
    }
}

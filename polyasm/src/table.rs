use indexmap::IndexMap;

/// Name-keyed storage shared by labels, macros and segments.
///
/// Keys are case-sensitive; `get_ignore_case` is the lookup used for names
/// the source may spell in any case. Iteration follows insertion order.
#[derive(Debug, Clone)]
pub struct SymbolTable<T> {
    entries: IndexMap<String, T>,
}

impl<T> SymbolTable<T> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: T) -> Option<T> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_ignore_case(&self, key: &str) -> Option<(&str, &T)> {
        if let Some((k, v)) = self.entries.get_key_value(key) {
            return Some((k.as_str(), v));
        }
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        self.entries.shift_remove(key)
    }

    pub fn remove_ignore_case(&mut self, key: &str) -> Option<T> {
        let exact = self
            .get_ignore_case(key)
            .map(|(k, _)| k.to_owned())?;
        self.remove(&exact)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lookup_is_case_sensitive() {
        let mut table = SymbolTable::new();
        table.insert("Loop", 1);

        assert_eq!(table.get("Loop"), Some(&1));
        assert_eq!(table.get("loop"), None);
        assert_eq!(table.get_ignore_case("LOOP"), Some(("Loop", &1)));
    }

    #[test]
    fn removal_keeps_insertion_order() {
        let mut table = SymbolTable::new();
        table.insert("a", 1);
        table.insert("b", 2);
        table.insert("c", 3);

        assert_eq!(table.remove_ignore_case("B"), Some(2));
        let keys: Vec<_> = table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "c"]);
    }
}

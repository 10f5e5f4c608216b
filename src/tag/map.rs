//! The ordered multimap backing every field-based tag.

use crate::tag::field::TagField;
use crate::tag::value::TagValue;
use std::cmp::Ordering;

/// A dialect-specific field identifier.
///
/// `cmp_ids` defines the order fields are serialized in. For most dialects
/// this is a plain lexicographic or numeric order; ID3v2 uses the frame
/// comparer tiers so readers that stop early see the identifying fields
/// first.
pub trait FieldId: Clone + PartialEq + std::fmt::Debug {
    /// Comparator defining the serialization order.
    fn cmp_ids(&self, other: &Self) -> Ordering;

    /// Whether two identifiers address the same field. Defaults to
    /// comparing equal under [`FieldId::cmp_ids`]; dialects with aliased
    /// identifiers override this.
    fn same_field(&self, other: &Self) -> bool {
        self.cmp_ids(other) == Ordering::Equal
    }
}

/// A multimap of tag fields kept sorted by the dialect comparator.
///
/// Duplicate identifiers are allowed; among duplicates the insertion order
/// is preserved (insertions are stable).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap<I: FieldId> {
    entries: Vec<TagField<I>>,
}

impl<I: FieldId> FieldMap<I> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Number of fields, duplicates included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts a field at its sorted position, after any duplicates.
    pub fn insert(&mut self, field: TagField<I>) {
        let pos = self
            .entries
            .partition_point(|e| e.id.cmp_ids(&field.id) != Ordering::Greater);
        self.entries.insert(pos, field);
    }

    /// First field with the given identifier.
    pub fn get(&self, id: &I) -> Option<&TagField<I>> {
        self.entries.iter().find(|e| e.id.same_field(id))
    }

    /// First field with the given identifier, mutably.
    pub fn get_mut(&mut self, id: &I) -> Option<&mut TagField<I>> {
        self.entries.iter_mut().find(|e| e.id.same_field(id))
    }

    /// Value of the first non-empty field with the given identifier.
    pub fn value(&self, id: &I) -> Option<&TagValue> {
        self.entries
            .iter()
            .filter(|e| e.id.same_field(id))
            .map(|e| &e.value)
            .find(|v| !v.is_empty())
    }

    /// Values of all non-empty fields with the given identifier.
    pub fn values(&self, id: &I) -> Vec<&TagValue> {
        self.entries
            .iter()
            .filter(|e| e.id.same_field(id) && !e.value.is_empty())
            .map(|e| &e.value)
            .collect()
    }

    /// Whether a non-empty field with the given identifier exists.
    pub fn has(&self, id: &I) -> bool {
        self.entries
            .iter()
            .any(|e| e.id.same_field(id) && !e.value.is_empty())
    }

    /// Sets the value of the first field with the given identifier,
    /// inserting a new field when none exists. An empty value clears the
    /// field (it is dropped on the next serialization).
    pub fn set_value(&mut self, id: I, value: TagValue) {
        match self.get_mut(&id) {
            Some(field) => field.value = value,
            None => self.insert(TagField::new(id, value)),
        }
    }

    /// Replaces the full multiset of values for the given identifier.
    pub fn set_values(&mut self, id: I, values: Vec<TagValue>) {
        let mut values = values.into_iter();
        // overwrite existing duplicates in place, then append the surplus
        for entry in self.entries.iter_mut().filter(|e| e.id.same_field(&id)) {
            match values.next() {
                Some(value) => entry.value = value,
                None => entry.clear_value(),
            }
        }
        for value in values {
            self.insert(TagField::new(id.clone(), value));
        }
    }

    /// Removes every field with the given identifier, returning how many
    /// were dropped.
    pub fn remove(&mut self, id: &I) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.id.same_field(id));
        before - self.entries.len()
    }

    /// Drops all fields.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All fields in serialization order.
    pub fn iter(&self) -> impl Iterator<Item = &TagField<I>> {
        self.entries.iter()
    }

    /// All fields in serialization order, mutably. The caller must not
    /// change identifiers (the sort position would go stale).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TagField<I>> {
        self.entries.iter_mut()
    }

    /// Drops fields not satisfying the predicate.
    pub fn retain(&mut self, f: impl FnMut(&TagField<I>) -> bool) {
        self.entries.retain(f);
    }
}

/// Plain strings are the case-sensitive, lexicographically ordered
/// identifiers of Matroska simple tags.
impl FieldId for String {
    fn cmp_ids(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl<I: FieldId> IntoIterator for FieldMap<I> {
    type Item = TagField<I>;
    type IntoIter = std::vec::IntoIter<TagField<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn insert_keeps_sorted_stable_order() {
        let mut map = FieldMap::new();
        map.insert(TagField::new(id("B"), TagValue::text("b1")));
        map.insert(TagField::new(id("A"), TagValue::text("a")));
        map.insert(TagField::new(id("B"), TagValue::text("b2")));
        let order: Vec<String> = map
            .iter()
            .map(|f| f.value.to_display_string().unwrap())
            .collect();
        assert_eq!(order, ["a", "b1", "b2"]);
    }

    #[test]
    fn multimap_values() {
        let mut map = FieldMap::new();
        map.insert(TagField::new(id("ARTIST"), TagValue::text("one")));
        map.insert(TagField::new(id("ARTIST"), TagValue::text("two")));
        assert_eq!(map.values(&id("ARTIST")).len(), 2);
        assert_eq!(
            map.value(&id("ARTIST")).unwrap().to_display_string().unwrap(),
            "one"
        );
        assert!(!map.has(&id("TITLE")));
    }

    #[test]
    fn set_values_replaces_the_multiset() {
        let mut map = FieldMap::new();
        map.insert(TagField::new(id("X"), TagValue::text("a")));
        map.insert(TagField::new(id("X"), TagValue::text("b")));
        map.insert(TagField::new(id("X"), TagValue::text("c")));
        map.set_values(id("X"), vec![TagValue::text("only")]);
        assert_eq!(map.values(&id("X")).len(), 1);
        map.set_values(id("X"), vec![TagValue::text("1"), TagValue::text("2")]);
        assert_eq!(map.values(&id("X")).len(), 2);
    }

    #[test]
    fn remove_drops_all_duplicates() {
        let mut map = FieldMap::new();
        map.insert(TagField::new(id("X"), TagValue::text("a")));
        map.insert(TagField::new(id("X"), TagValue::text("b")));
        map.insert(TagField::new(id("Y"), TagValue::text("c")));
        assert_eq!(map.remove(&id("X")), 2);
        assert_eq!(map.len(), 1);
    }
}

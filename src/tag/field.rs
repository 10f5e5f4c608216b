//! A single field of a tag.

use crate::tag::value::TagValue;

/// A tag field: an identifier, a value and dialect-specific extras.
///
/// The identifier type varies by dialect (frame ID for ID3v2, name string
/// for Matroska and Vorbis, atom code for MP4). Nested fields are only
/// meaningful for dialects that advertise them (Matroska SimpleTag).
#[derive(Debug, Clone, PartialEq)]
pub struct TagField<I> {
    /// Dialect-specific identifier.
    pub id: I,
    /// The value the field carries.
    pub value: TagValue,
    /// Dialect-defined extra type information, e.g. the ID3v2 picture-type
    /// byte of an attached picture.
    pub type_info: Option<u64>,
    /// Language of the value for dialects that store one per field
    /// (Matroska TagLanguage, ID3v2 comment language).
    pub language: Option<String>,
    /// Whether the field is flagged as the default among its duplicates
    /// (Matroska TagDefault).
    pub is_default: bool,
    /// Nested sub-fields.
    pub nested: Vec<TagField<I>>,
}

impl<I> TagField<I> {
    /// Creates a field with just an identifier and value.
    pub fn new(id: I, value: TagValue) -> Self {
        Self { id, value, type_info: None, language: None, is_default: false, nested: Vec::new() }
    }

    /// Creates a field with extra type information.
    pub fn with_type_info(id: I, value: TagValue, type_info: u64) -> Self {
        Self { type_info: Some(type_info), ..Self::new(id, value) }
    }

    /// Whether the field holds neither a value nor nested fields.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.nested.is_empty()
    }

    /// Drops the value and nested fields, keeping the identifier.
    pub fn clear_value(&mut self) {
        self.value = TagValue::Empty;
        self.nested.clear();
    }
}

//! The dialect-independent tag model.

pub mod field;
pub mod genres;
pub mod map;
pub mod target;
pub mod value;

use crate::text::TextEncoding;
use map::{FieldId, FieldMap};
use target::TagTarget;
use value::TagValue;

/// The tag dialects this library understands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TagType {
    /// ID3 version 1 (and 1.1).
    Id3v1,
    /// ID3 version 2.2, 2.3 or 2.4.
    Id3v2,
    /// Matroska `Tag` elements.
    Matroska,
    /// Vorbis comments.
    VorbisComment,
    /// MP4 `ilst` atoms.
    Mp4,
}

impl TagType {
    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            TagType::Id3v1 => "ID3v1 tag",
            TagType::Id3v2 => "ID3v2 tag",
            TagType::Matroska => "Matroska tag",
            TagType::VorbisComment => "Vorbis comment",
            TagType::Mp4 => "MP4/iTunes tag",
        }
    }
}

/// Fields every dialect maps onto its own identifiers.
///
/// `Invalid` is the sentinel for "no mapping in this dialect"; setting a
/// value through a field a dialect cannot express fails without touching
/// the tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum KnownField {
    /// No mapping exists.
    Invalid,
    /// Title of the track/work.
    Title,
    /// Album the track belongs to.
    Album,
    /// Performing artist.
    Artist,
    /// Album-level artist.
    AlbumArtist,
    /// Composer.
    Composer,
    /// Lyricist.
    Lyricist,
    /// Genre.
    Genre,
    /// Date of recording.
    RecordDate,
    /// Free-form comment.
    Comment,
    /// Position of the track within its album.
    TrackPosition,
    /// Position of the disk within its set.
    DiskPosition,
    /// Beats per minute.
    Bpm,
    /// Encoder software.
    Encoder,
    /// Settings the encoder ran with.
    EncoderSettings,
    /// Unsynchronized lyrics.
    Lyrics,
    /// Record label.
    RecordLabel,
    /// Copyright statement.
    Copyright,
    /// Attached cover picture.
    Cover,
    /// Stable identifier of the file, e.g. an ID3v2 unique file ID.
    UniqueFileId,
    /// Rating on a dialect-specific scale.
    Rating,
}

impl KnownField {
    /// Every mappable field (the `Invalid` sentinel excluded).
    pub const ALL: &'static [KnownField] = &[
        KnownField::Title,
        KnownField::Album,
        KnownField::Artist,
        KnownField::AlbumArtist,
        KnownField::Composer,
        KnownField::Lyricist,
        KnownField::Genre,
        KnownField::RecordDate,
        KnownField::Comment,
        KnownField::TrackPosition,
        KnownField::DiskPosition,
        KnownField::Bpm,
        KnownField::Encoder,
        KnownField::EncoderSettings,
        KnownField::Lyrics,
        KnownField::RecordLabel,
        KnownField::Copyright,
        KnownField::Cover,
        KnownField::UniqueFileId,
        KnownField::Rating,
    ];
}

/// A tag dialect: the identifier type, the known-field mapping and the
/// capabilities that vary between dialects.
pub trait TagDialect {
    /// The dialect's field identifier.
    type Id: FieldId;

    /// Which kind of tag this dialect produces.
    const TAG_TYPE: TagType;

    /// Maps a known field onto the dialect identifier; `None` when the
    /// dialect cannot express the field.
    fn known_field_to_id(field: KnownField) -> Option<Self::Id>;

    /// Maps a dialect identifier back onto a known field;
    /// [`KnownField::Invalid`] when the identifier has no generic meaning.
    fn id_to_known_field(id: &Self::Id) -> KnownField;

    /// Whether a field may carry several values.
    fn supports_multiple_values(id: &Self::Id) -> bool;

    /// Whether fields may nest (Matroska SimpleTag).
    fn supports_nested_fields() -> bool {
        false
    }

    /// Whether tags of this dialect carry a target.
    fn supports_target() -> bool {
        false
    }

    /// The text encoding the dialect prefers on write.
    fn default_encoding() -> TextEncoding;
}

/// Generic field-map-backed tag storage, specialized per dialect.
///
/// Dialect tag types embed this and add their own parsing/serialization
/// plus any dialect-only state (ID3v2 version, Vorbis vendor, ...).
pub struct FieldMapTag<D: TagDialect> {
    target: TagTarget,
    fields: FieldMap<D::Id>,
}

// manual impls: deriving would put bounds on the dialect marker itself
impl<D: TagDialect> std::fmt::Debug for FieldMapTag<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMapTag")
            .field("target", &self.target)
            .field("fields", &self.fields)
            .finish()
    }
}

impl<D: TagDialect> Clone for FieldMapTag<D> {
    fn clone(&self) -> Self {
        Self { target: self.target.clone(), fields: self.fields.clone() }
    }
}

impl<D: TagDialect> Default for FieldMapTag<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: TagDialect> FieldMapTag<D> {
    /// Creates an empty tag with the default target.
    pub fn new() -> Self {
        Self { target: TagTarget::default(), fields: FieldMap::new() }
    }

    /// Creates an empty tag scoped to `target`.
    pub fn with_target(target: TagTarget) -> Self {
        Self { target, fields: FieldMap::new() }
    }

    /// The tag's target.
    pub fn target(&self) -> &TagTarget {
        &self.target
    }

    /// Replaces the tag's target.
    pub fn set_target(&mut self, target: TagTarget) {
        self.target = target;
    }

    /// The underlying field map.
    pub fn fields(&self) -> &FieldMap<D::Id> {
        &self.fields
    }

    /// The underlying field map, mutably.
    pub fn fields_mut(&mut self) -> &mut FieldMap<D::Id> {
        &mut self.fields
    }

    /// Value of the known field, if mapped and present.
    pub fn value(&self, field: KnownField) -> Option<&TagValue> {
        D::known_field_to_id(field).and_then(|id| self.fields.value(&id))
    }

    /// All values of the known field.
    pub fn values(&self, field: KnownField) -> Vec<&TagValue> {
        D::known_field_to_id(field)
            .map(|id| self.fields.values(&id))
            .unwrap_or_default()
    }

    /// Sets the value of the known field. Returns `false` (leaving the tag
    /// untouched) when the dialect cannot express the field.
    pub fn set_value(&mut self, field: KnownField, value: TagValue) -> bool {
        match D::known_field_to_id(field) {
            Some(id) => {
                self.fields.set_value(id, value);
                true
            }
            None => false,
        }
    }

    /// Replaces all values of the known field. Multi-value semantics
    /// require dialect support; on a single-value dialect only the first
    /// value is kept and `false` is returned.
    pub fn set_values(&mut self, field: KnownField, mut values: Vec<TagValue>) -> bool {
        let Some(id) = D::known_field_to_id(field) else {
            return false;
        };
        if values.len() > 1 && !D::supports_multiple_values(&id) {
            values.truncate(1);
            self.fields.set_values(id, values);
            return false;
        }
        self.fields.set_values(id, values);
        true
    }

    /// Whether the known field maps and is present with a value.
    pub fn has_field(&self, field: KnownField) -> bool {
        D::known_field_to_id(field)
            .map(|id| self.fields.has(&id))
            .unwrap_or(false)
    }

    /// Whether the dialect can express the known field.
    pub fn supports_field(&self, field: KnownField) -> bool {
        D::known_field_to_id(field).is_some()
    }

    /// Number of fields, duplicates included.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|f| f.is_empty())
    }

    /// Drops all fields.
    pub fn remove_all_fields(&mut self) {
        self.fields.clear();
    }

    /// Re-encodes every text value into the dialect's preferred encoding.
    pub fn ensure_text_values_are_properly_encoded(&mut self) -> crate::Result<()> {
        let encoding = D::default_encoding();
        for field in self.fields.iter_mut() {
            field.value.convert_encoding(encoding)?;
            for nested in &mut field.nested {
                nested.value.convert_encoding(encoding)?;
            }
        }
        Ok(())
    }

    /// Copies values of `from` into this tag for every known field both
    /// dialects can express; existing values are kept unless `overwrite`.
    /// Returns how many values were copied.
    pub fn insert_values(&mut self, from: &dyn Tag, overwrite: bool) -> usize {
        let mut copied = 0;
        for &field in KnownField::ALL {
            if !overwrite && self.has_field(field) {
                continue;
            }
            if let Some(value) = from.value_of(field) {
                if self.set_value(field, value.clone()) {
                    copied += 1;
                }
            }
        }
        copied
    }
}

/// Object-safe view of a tag of any dialect, as handed out by the file
/// facade.
pub trait Tag {
    /// The dialect of this tag.
    fn tag_type(&self) -> TagType;

    /// Display name of the dialect.
    fn type_name(&self) -> &'static str {
        self.tag_type().name()
    }

    /// The tag's target, or the default target for dialects without
    /// target support.
    fn target(&self) -> &TagTarget;

    /// Replaces the tag's target (ignored by dialects without target
    /// support).
    fn set_target(&mut self, target: TagTarget);

    /// Value of a known field.
    fn value_of(&self, field: KnownField) -> Option<&TagValue>;

    /// All values of a known field.
    fn values_of(&self, field: KnownField) -> Vec<&TagValue>;

    /// Sets the value of a known field; `false` when unsupported.
    fn set_value_of(&mut self, field: KnownField, value: TagValue) -> bool;

    /// Whether the dialect can express the field.
    fn supports_field(&self, field: KnownField) -> bool;

    /// Whether the field may carry several values in this dialect.
    fn supports_multiple_values(&self, field: KnownField) -> bool;

    /// Number of fields present.
    fn field_count(&self) -> usize;

    /// Whether no field carries a value.
    fn is_empty(&self) -> bool;

    /// Drops all fields.
    fn remove_all_fields(&mut self);
}

/// Delegates the object-safe [`Tag`] surface to an embedded
/// [`FieldMapTag`] field. Dialect modules invoke this for their tag types.
macro_rules! impl_field_map_tag {
    ($tag:ty, $dialect:ty, $base:ident) => {
        impl $crate::tag::Tag for $tag {
            fn tag_type(&self) -> $crate::tag::TagType {
                <$dialect as $crate::tag::TagDialect>::TAG_TYPE
            }

            fn target(&self) -> &$crate::tag::target::TagTarget {
                self.$base.target()
            }

            fn set_target(&mut self, target: $crate::tag::target::TagTarget) {
                if <$dialect as $crate::tag::TagDialect>::supports_target() {
                    self.$base.set_target(target);
                }
            }

            fn value_of(
                &self,
                field: $crate::tag::KnownField,
            ) -> Option<&$crate::tag::value::TagValue> {
                self.$base.value(field)
            }

            fn values_of(
                &self,
                field: $crate::tag::KnownField,
            ) -> Vec<&$crate::tag::value::TagValue> {
                self.$base.values(field)
            }

            fn set_value_of(
                &mut self,
                field: $crate::tag::KnownField,
                value: $crate::tag::value::TagValue,
            ) -> bool {
                self.$base.set_value(field, value)
            }

            fn supports_field(&self, field: $crate::tag::KnownField) -> bool {
                self.$base.supports_field(field)
            }

            fn supports_multiple_values(&self, field: $crate::tag::KnownField) -> bool {
                <$dialect as $crate::tag::TagDialect>::known_field_to_id(field)
                    .map(|id| <$dialect as $crate::tag::TagDialect>::supports_multiple_values(&id))
                    .unwrap_or(false)
            }

            fn field_count(&self) -> usize {
                self.$base.field_count()
            }

            fn is_empty(&self) -> bool {
                self.$base.is_empty()
            }

            fn remove_all_fields(&mut self) {
                self.$base.remove_all_fields()
            }
        }
    };
}
pub(crate) use impl_field_map_tag;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    struct TestDialect;

    impl TagDialect for TestDialect {
        type Id = String;
        const TAG_TYPE: TagType = TagType::Matroska;

        fn known_field_to_id(field: KnownField) -> Option<String> {
            match field {
                KnownField::Title => Some("TITLE".into()),
                KnownField::Artist => Some("ARTIST".into()),
                _ => None,
            }
        }

        fn id_to_known_field(id: &String) -> KnownField {
            match id.as_str() {
                "TITLE" => KnownField::Title,
                "ARTIST" => KnownField::Artist,
                _ => KnownField::Invalid,
            }
        }

        fn supports_multiple_values(_id: &String) -> bool {
            true
        }

        fn default_encoding() -> TextEncoding {
            TextEncoding::Utf8
        }
    }

    #[test]
    fn known_field_routing() {
        let mut tag: FieldMapTag<TestDialect> = FieldMapTag::new();
        assert!(tag.set_value(KnownField::Title, TagValue::text("Demo")));
        assert!(!tag.set_value(KnownField::Cover, TagValue::Binary(vec![1])));
        assert_eq!(
            tag.value(KnownField::Title).unwrap().to_display_string().unwrap(),
            "Demo"
        );
        assert!(tag.has_field(KnownField::Title));
        assert!(!tag.has_field(KnownField::Artist));
        assert!(tag.supports_field(KnownField::Artist));
        assert!(!tag.supports_field(KnownField::Cover));
    }

    #[test]
    fn multi_values_round_trip() {
        let mut tag: FieldMapTag<TestDialect> = FieldMapTag::new();
        assert!(tag.set_values(
            KnownField::Artist,
            vec![TagValue::text("A"), TagValue::text("B")],
        ));
        assert_eq!(tag.values(KnownField::Artist).len(), 2);
    }

    #[test]
    fn string_id_ordering() {
        let a = "ARTIST".to_string();
        let t = "TITLE".to_string();
        assert_eq!(a.cmp_ids(&t), Ordering::Less);
    }
}

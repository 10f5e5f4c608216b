//! Matroska `Tag` elements and their `SimpleTag` fields.

use crate::diag::Diagnostics;
use crate::ebml::{self, ids, EbmlTree};
use crate::error::{Error, Result};
use crate::tag::field::TagField;
use crate::tag::target::TagTarget;
use crate::tag::value::TagValue;
use crate::tag::{impl_field_map_tag, FieldMapTag, KnownField, TagDialect, TagType};
use crate::text::TextEncoding;
use crate::tree::NodeId;
use std::io::{Read, Seek};

/// The Matroska tag dialect: case-sensitive string identifiers, nested
/// fields and targets.
#[derive(Debug, Clone, Copy)]
pub struct MatroskaDialect;

impl TagDialect for MatroskaDialect {
    type Id = String;
    const TAG_TYPE: TagType = TagType::Matroska;

    fn known_field_to_id(field: KnownField) -> Option<String> {
        let id = match field {
            KnownField::Title => "TITLE",
            // the album is the title at the album target level; the
            // container routes by target
            KnownField::Album => "TITLE",
            KnownField::Artist => "ARTIST",
            KnownField::AlbumArtist => "ARTIST",
            KnownField::Composer => "COMPOSER",
            KnownField::Lyricist => "LYRICIST",
            KnownField::Genre => "GENRE",
            KnownField::RecordDate => "DATE_RECORDED",
            KnownField::Comment => "COMMENT",
            KnownField::TrackPosition => "PART_NUMBER",
            KnownField::Bpm => "BPM",
            KnownField::Encoder => "ENCODER",
            KnownField::EncoderSettings => "ENCODER_SETTINGS",
            KnownField::Lyrics => "LYRICS",
            KnownField::RecordLabel => "LABEL",
            KnownField::Copyright => "COPYRIGHT",
            KnownField::Rating => "RATING",
            _ => return None,
        };
        Some(id.to_string())
    }

    fn id_to_known_field(id: &String) -> KnownField {
        match id.as_str() {
            "TITLE" => KnownField::Title,
            "ARTIST" => KnownField::Artist,
            "COMPOSER" => KnownField::Composer,
            "LYRICIST" => KnownField::Lyricist,
            "GENRE" => KnownField::Genre,
            "DATE_RECORDED" => KnownField::RecordDate,
            "COMMENT" => KnownField::Comment,
            "PART_NUMBER" => KnownField::TrackPosition,
            "BPM" => KnownField::Bpm,
            "ENCODER" => KnownField::Encoder,
            "ENCODER_SETTINGS" => KnownField::EncoderSettings,
            "LYRICS" => KnownField::Lyrics,
            "LABEL" => KnownField::RecordLabel,
            "COPYRIGHT" => KnownField::Copyright,
            "RATING" => KnownField::Rating,
            _ => KnownField::Invalid,
        }
    }

    fn supports_multiple_values(_id: &String) -> bool {
        true
    }

    fn supports_nested_fields() -> bool {
        true
    }

    fn supports_target() -> bool {
        true
    }

    fn default_encoding() -> TextEncoding {
        TextEncoding::Utf8
    }
}

/// A Matroska tag: a target plus `SimpleTag` fields.
#[derive(Debug, Clone, Default)]
pub struct MatroskaTag {
    base: FieldMapTag<MatroskaDialect>,
}

impl_field_map_tag!(MatroskaTag, MatroskaDialect, base);

impl MatroskaTag {
    /// Creates an empty tag with the default target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty tag scoped to `target`.
    pub fn with_target(target: TagTarget) -> Self {
        Self { base: FieldMapTag::with_target(target) }
    }

    /// The generic field-map surface.
    pub fn base(&self) -> &FieldMapTag<MatroskaDialect> {
        &self.base
    }

    /// The generic field-map surface, mutably.
    pub fn base_mut(&mut self) -> &mut FieldMapTag<MatroskaDialect> {
        &mut self.base
    }

    /// Parses a `Tag` element rooted at `node`.
    pub fn parse<R: Read + Seek>(
        io: &mut R,
        tree: &mut EbmlTree,
        node: NodeId,
        diag: &mut Diagnostics,
    ) -> Result<MatroskaTag> {
        let context = "parsing Matroska tag";
        let mut tag = MatroskaTag::new();
        let mut child = tree.first_child(io, node)?;
        while let Some(n) = child {
            match tree.id(n) {
                ids::TARGETS => {
                    let target = Self::parse_target(io, tree, n)?;
                    tag.base.set_target(target);
                }
                ids::SIMPLE_TAG => {
                    match Self::parse_simple_tag(io, tree, n, diag) {
                        Ok(field) => tag.base.fields_mut().insert(field),
                        Err(error) => {
                            diag.warn(format!("skipping malformed SimpleTag: {error}"), context)
                        }
                    }
                }
                ids::CRC32 | ids::VOID => {}
                id => diag.info(format!("ignoring element 0x{id:X} within Tag"), context),
            }
            child = tree.next_sibling(io, n)?;
        }
        Ok(tag)
    }

    fn parse_target<R: Read + Seek>(
        io: &mut R,
        tree: &mut EbmlTree,
        node: NodeId,
    ) -> Result<TagTarget> {
        let mut target = TagTarget::default();
        let mut child = tree.first_child(io, node)?;
        while let Some(n) = child {
            match tree.id(n) {
                ids::TARGET_TYPE_VALUE => target.level = ebml::read_uint(io, tree, n)?,
                ids::TARGET_TYPE => target.level_name = ebml::read_string(io, tree, n)?,
                ids::TAG_TRACK_UID => target.tracks.push(ebml::read_uint(io, tree, n)?),
                ids::TAG_EDITION_UID => target.editions.push(ebml::read_uint(io, tree, n)?),
                ids::TAG_CHAPTER_UID => target.chapters.push(ebml::read_uint(io, tree, n)?),
                ids::TAG_ATTACHMENT_UID => target.attachments.push(ebml::read_uint(io, tree, n)?),
                _ => {}
            }
            child = tree.next_sibling(io, n)?;
        }
        Ok(target)
    }

    fn parse_simple_tag<R: Read + Seek>(
        io: &mut R,
        tree: &mut EbmlTree,
        node: NodeId,
        diag: &mut Diagnostics,
    ) -> Result<TagField<String>> {
        let mut name = None;
        let mut value = TagValue::Empty;
        let mut language = None;
        // TagDefault defaults to set
        let mut is_default = true;
        let mut nested = Vec::new();
        let mut child = tree.first_child(io, node)?;
        while let Some(n) = child {
            match tree.id(n) {
                ids::TAG_NAME => name = Some(ebml::read_string(io, tree, n)?),
                ids::TAG_STRING => {
                    value = TagValue::Text {
                        bytes: ebml::read_binary(io, tree, n)?,
                        encoding: TextEncoding::Utf8,
                    };
                }
                ids::TAG_BINARY => value = TagValue::Binary(ebml::read_binary(io, tree, n)?),
                ids::TAG_LANGUAGE => {
                    let code = ebml::read_string(io, tree, n)?;
                    if code != "und" {
                        language = Some(code);
                    }
                }
                ids::TAG_LANGUAGE_IETF => {
                    // preferred over the ISO code when both are present
                    language = Some(ebml::read_string(io, tree, n)?);
                }
                ids::TAG_DEFAULT => is_default = ebml::read_uint(io, tree, n)? != 0,
                ids::SIMPLE_TAG => nested.push(Self::parse_simple_tag(io, tree, n, diag)?),
                _ => {}
            }
            child = tree.next_sibling(io, n)?;
        }
        let name = name.ok_or(Error::Invalid("SimpleTag without TagName"))?;
        Ok(TagField { id: name, value, type_info: None, language, is_default, nested })
    }

    fn target_data(&self) -> Result<Vec<u8>> {
        let target = self.base.target();
        let mut data = Vec::new();
        if target.level != 0 {
            ebml::make_uint_element(ids::TARGET_TYPE_VALUE, target.level, &mut data)?;
        }
        if !target.level_name.is_empty() {
            ebml::make_string_element(ids::TARGET_TYPE, &target.level_name, &mut data)?;
        }
        for &uid in &target.tracks {
            ebml::make_uint_element(ids::TAG_TRACK_UID, uid, &mut data)?;
        }
        for &uid in &target.editions {
            ebml::make_uint_element(ids::TAG_EDITION_UID, uid, &mut data)?;
        }
        for &uid in &target.chapters {
            ebml::make_uint_element(ids::TAG_CHAPTER_UID, uid, &mut data)?;
        }
        for &uid in &target.attachments {
            ebml::make_uint_element(ids::TAG_ATTACHMENT_UID, uid, &mut data)?;
        }
        Ok(data)
    }

    fn simple_tag_data(field: &TagField<String>, diag: &mut Diagnostics) -> Result<Vec<u8>> {
        if field.id.is_empty() {
            diag.critical("cannot make a SimpleTag with an empty TagName", "making Matroska tag");
            return Err(Error::Invalid("SimpleTag without TagName"));
        }
        let mut data = Vec::new();
        ebml::make_string_element(ids::TAG_NAME, &field.id, &mut data)?;
        let language = field.language.as_deref().unwrap_or("und");
        ebml::make_string_element(ids::TAG_LANGUAGE, language, &mut data)?;
        ebml::make_uint_element(ids::TAG_DEFAULT, u64::from(field.is_default), &mut data)?;
        match &field.value {
            TagValue::Binary(bytes) => ebml::make_element(ids::TAG_BINARY, bytes, &mut data)?,
            TagValue::Empty => {}
            value => {
                let text = value.to_display_string()?;
                ebml::make_string_element(ids::TAG_STRING, &text, &mut data)?;
            }
        }
        for nested in &field.nested {
            if nested.is_empty() {
                continue;
            }
            let nested_data = Self::simple_tag_data(nested, diag)?;
            ebml::make_element(ids::SIMPLE_TAG, &nested_data, &mut data)?;
        }
        Ok(data)
    }

    /// Serializes the whole `Tag` element, returning its bytes. An empty
    /// result means the tag has nothing to store.
    pub fn make_element(&self, diag: &mut Diagnostics) -> Result<Vec<u8>> {
        let mut data = self.target_data()?;
        // Targets is written even when empty so readers see an explicit
        // default target
        let mut body = Vec::new();
        ebml::make_element(ids::TARGETS, &data, &mut body)?;
        let mut fields_written = 0;
        for field in self.base.fields().iter() {
            if field.is_empty() {
                continue;
            }
            let field_data = Self::simple_tag_data(field, diag)?;
            ebml::make_element(ids::SIMPLE_TAG, &field_data, &mut body)?;
            fields_written += 1;
        }
        if fields_written == 0 {
            return Ok(Vec::new());
        }
        data = Vec::new();
        ebml::make_element(ids::TAG, &body, &mut data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::EbmlKind;
    use crate::tag::target::TagTargetLevel;
    use crate::tag::Tag;
    use std::io::Cursor;

    #[test]
    fn simple_tag_round_trip() {
        let mut tag = MatroskaTag::with_target(TagTarget::with_level(TagTargetLevel::Album));
        tag.set_value_of(KnownField::Title, TagValue::text("Demo"));
        tag.base_mut().fields_mut().insert(TagField {
            id: "ARTIST".into(),
            value: TagValue::text("Somebody"),
            type_info: None,
            language: Some("eng".into()),
            is_default: false,
            nested: vec![TagField::new("SORT_WITH".to_string(), TagValue::text("Somebody, The"))],
        });
        let mut diag = Diagnostics::new();
        let bytes = tag.make_element(&mut diag).unwrap();
        assert!(!bytes.is_empty());

        let mut io = Cursor::new(bytes.clone());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(&mut io, 0, bytes.len() as u64).unwrap();
        assert_eq!(tree.id(root), ids::TAG);
        let reread = MatroskaTag::parse(&mut io, &mut tree, root, &mut diag).unwrap();
        assert_eq!(reread.target().level, 50);
        assert_eq!(
            reread.value_of(KnownField::Title).unwrap().to_display_string().unwrap(),
            "Demo"
        );
        let artist = reread.base().fields().get(&"ARTIST".to_string()).unwrap();
        assert_eq!(artist.language.as_deref(), Some("eng"));
        assert_eq!(artist.nested.len(), 1);
        assert_eq!(
            artist.nested[0].value.to_display_string().unwrap(),
            "Somebody, The"
        );
        assert_eq!(diag.level(), crate::diag::DiagLevel::None);
    }

    #[test]
    fn empty_tag_serializes_to_nothing() {
        let tag = MatroskaTag::new();
        let bytes = tag.make_element(&mut Diagnostics::new()).unwrap();
        assert!(bytes.is_empty());
    }
}

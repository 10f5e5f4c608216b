//! ID3v1 and ID3v1.1 tags.

use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::tag::map::FieldId;
use crate::tag::value::TagValue;
use crate::tag::{impl_field_map_tag, FieldMapTag, KnownField, TagDialect, TagType};
use crate::text::{self, TextEncoding};
use std::cmp::Ordering;
use std::io::{Read, Seek, SeekFrom};

/// Size of an ID3v1 tag.
pub const TAG_SIZE: u64 = 128;

/// The fixed slots of an ID3v1 tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Id3v1Field {
    /// Title, 30 bytes.
    Title,
    /// Artist, 30 bytes.
    Artist,
    /// Album, 30 bytes.
    Album,
    /// Year, 4 bytes.
    Year,
    /// Comment, 30 bytes (28 when a track number is present).
    Comment,
    /// Track number (ID3v1.1).
    Track,
    /// Genre index.
    Genre,
}

impl FieldId for Id3v1Field {
    fn cmp_ids(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

/// The ID3v1 dialect: one value per fixed slot, Latin-1 text only.
#[derive(Debug, Clone, Copy)]
pub struct Id3v1Dialect;

impl TagDialect for Id3v1Dialect {
    type Id = Id3v1Field;
    const TAG_TYPE: TagType = TagType::Id3v1;

    fn known_field_to_id(field: KnownField) -> Option<Id3v1Field> {
        match field {
            KnownField::Title => Some(Id3v1Field::Title),
            KnownField::Artist => Some(Id3v1Field::Artist),
            KnownField::Album => Some(Id3v1Field::Album),
            KnownField::RecordDate => Some(Id3v1Field::Year),
            KnownField::Comment => Some(Id3v1Field::Comment),
            KnownField::TrackPosition => Some(Id3v1Field::Track),
            KnownField::Genre => Some(Id3v1Field::Genre),
            _ => None,
        }
    }

    fn id_to_known_field(id: &Id3v1Field) -> KnownField {
        match id {
            Id3v1Field::Title => KnownField::Title,
            Id3v1Field::Artist => KnownField::Artist,
            Id3v1Field::Album => KnownField::Album,
            Id3v1Field::Year => KnownField::RecordDate,
            Id3v1Field::Comment => KnownField::Comment,
            Id3v1Field::Track => KnownField::TrackPosition,
            Id3v1Field::Genre => KnownField::Genre,
        }
    }

    fn supports_multiple_values(_id: &Id3v1Field) -> bool {
        false
    }

    fn default_encoding() -> TextEncoding {
        TextEncoding::Latin1
    }
}

/// An ID3v1 tag.
#[derive(Debug, Clone, Default)]
pub struct Id3v1Tag {
    base: FieldMapTag<Id3v1Dialect>,
}

impl_field_map_tag!(Id3v1Tag, Id3v1Dialect, base);

fn fixed_text(data: &[u8]) -> TagValue {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let trimmed: &[u8] = {
        let mut slice = &data[..end];
        while let [rest @ .., b' '] = slice {
            slice = rest;
        }
        slice
    };
    if trimmed.is_empty() {
        TagValue::Empty
    } else {
        TagValue::Text { bytes: trimmed.to_vec(), encoding: TextEncoding::Latin1 }
    }
}

impl Id3v1Tag {
    /// Creates an empty tag.
    pub fn new() -> Self {
        Self::default()
    }

    /// The generic field-map surface.
    pub fn base(&self) -> &FieldMapTag<Id3v1Dialect> {
        &self.base
    }

    /// The generic field-map surface, mutably.
    pub fn base_mut(&mut self) -> &mut FieldMapTag<Id3v1Dialect> {
        &mut self.base
    }

    /// Parses the 128-byte block at `start_offset`, which must begin with
    /// "TAG".
    pub fn parse<R: Read + Seek>(io: &mut R, start_offset: u64) -> Result<Id3v1Tag> {
        io.seek(SeekFrom::Start(start_offset))?;
        let mut block = [0u8; TAG_SIZE as usize];
        io.read_exact(&mut block).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::Truncated
            } else {
                Error::Io(e)
            }
        })?;
        if &block[0..3] != b"TAG" {
            return Err(Error::NoDataFound);
        }
        let mut tag = Id3v1Tag::new();
        let fields = tag.base.fields_mut();
        fields.set_value(Id3v1Field::Title, fixed_text(&block[3..33]));
        fields.set_value(Id3v1Field::Artist, fixed_text(&block[33..63]));
        fields.set_value(Id3v1Field::Album, fixed_text(&block[63..93]));
        fields.set_value(Id3v1Field::Year, fixed_text(&block[93..97]));
        // ID3v1.1: a zero byte at 125 marks byte 126 as the track number
        if block[125] == 0 && block[126] != 0 {
            fields.set_value(Id3v1Field::Comment, fixed_text(&block[97..125]));
            fields.set_value(
                Id3v1Field::Track,
                TagValue::PositionInSet { position: block[126] as i32, total: 0 },
            );
        } else {
            fields.set_value(Id3v1Field::Comment, fixed_text(&block[97..127]));
        }
        if block[127] != 0xFF {
            fields.set_value(Id3v1Field::Genre, TagValue::StandardGenreIndex(block[127] as u32));
        }
        Ok(tag)
    }

    fn put_field(
        &self,
        block: &mut [u8; TAG_SIZE as usize],
        field: Id3v1Field,
        range: std::ops::Range<usize>,
        diag: &mut Diagnostics,
    ) {
        let context = "making ID3v1 tag";
        if let Some(value) = self.base.fields().value(&field) {
            match value
                .to_display_string()
                .and_then(|t| text::encode(TextEncoding::Latin1, &t))
            {
                Ok(bytes) => {
                    if bytes.len() > range.len() {
                        diag.warn(
                            format!("{field:?} exceeds {} bytes and is cut off", range.len()),
                            context,
                        );
                    }
                    let n = bytes.len().min(range.len());
                    block[range.start..range.start + n].copy_from_slice(&bytes[..n]);
                }
                Err(_) => diag.warn(
                    format!("{field:?} is not representable in Latin-1 and was skipped"),
                    context,
                ),
            }
        }
    }

    /// Serializes the 128-byte block.
    pub fn make(&self, diag: &mut Diagnostics) -> Result<[u8; TAG_SIZE as usize]> {
        let mut block = [0u8; TAG_SIZE as usize];
        block[0..3].copy_from_slice(b"TAG");
        self.put_field(&mut block, Id3v1Field::Title, 3..33, diag);
        self.put_field(&mut block, Id3v1Field::Artist, 33..63, diag);
        self.put_field(&mut block, Id3v1Field::Album, 63..93, diag);
        self.put_field(&mut block, Id3v1Field::Year, 93..97, diag);
        let track = self
            .base
            .fields()
            .value(&Id3v1Field::Track)
            .and_then(|v| v.to_position_in_set().ok())
            .map(|(position, _)| position)
            .filter(|&p| (1..=255).contains(&p));
        if let Some(track) = track {
            self.put_field(&mut block, Id3v1Field::Comment, 97..125, diag);
            block[125] = 0;
            block[126] = track as u8;
        } else {
            self.put_field(&mut block, Id3v1Field::Comment, 97..127, diag);
        }
        block[127] = self
            .base
            .fields()
            .value(&Id3v1Field::Genre)
            .and_then(|v| v.to_standard_genre_index().ok())
            .filter(|&g| g <= 0xFF)
            .map(|g| g as u8)
            .unwrap_or(0xFF);
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;
    use std::io::Cursor;

    #[test]
    fn round_trip_with_track_number() {
        let mut tag = Id3v1Tag::new();
        tag.set_value_of(KnownField::Title, TagValue::text("Some Title"));
        tag.set_value_of(KnownField::Artist, TagValue::text("Some Artist"));
        tag.set_value_of(KnownField::Genre, TagValue::StandardGenreIndex(17));
        tag.set_value_of(
            KnownField::TrackPosition,
            TagValue::PositionInSet { position: 5, total: 0 },
        );
        let block = tag.make(&mut Diagnostics::new()).unwrap();
        let mut io = Cursor::new(block.to_vec());
        let reread = Id3v1Tag::parse(&mut io, 0).unwrap();
        assert_eq!(
            reread.value_of(KnownField::Title).unwrap().to_display_string().unwrap(),
            "Some Title"
        );
        assert_eq!(
            reread.value_of(KnownField::TrackPosition).unwrap().to_position_in_set().unwrap(),
            (5, 0)
        );
        assert_eq!(
            reread.value_of(KnownField::Genre).unwrap().to_standard_genre_index().unwrap(),
            17
        );
    }

    #[test]
    fn long_values_are_cut_off_with_a_warning() {
        let mut tag = Id3v1Tag::new();
        tag.set_value_of(
            KnownField::Title,
            TagValue::text("a title way beyond the thirty bytes an ID3v1 slot can hold"),
        );
        let mut diag = Diagnostics::new();
        let block = tag.make(&mut diag).unwrap();
        assert_eq!(diag.level(), crate::diag::DiagLevel::Warning);
        let reread = Id3v1Tag::parse(&mut Cursor::new(block.to_vec()), 0).unwrap();
        assert_eq!(
            reread.value_of(KnownField::Title).unwrap().to_display_string().unwrap(),
            "a title way beyond the thirty"
        );
    }

    #[test]
    fn missing_signature_reports_no_data() {
        let mut io = Cursor::new(vec![0u8; 128]);
        assert!(matches!(Id3v1Tag::parse(&mut io, 0), Err(Error::NoDataFound)));
    }

    #[test]
    fn multiple_values_are_rejected() {
        let tag = Id3v1Tag::new();
        assert!(!tag.supports_multiple_values(KnownField::Title));
    }
}

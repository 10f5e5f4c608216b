//! MP4: signature-level support and the atom field-identifier dialect.
//!
//! The tag engine knows the MP4 identifier space so field maps can be
//! parameterized over it; parsing and writing the atom tree itself is out
//! of the tag engine's scope and reported as not implemented.

use crate::error::{Error, Result};
use crate::tag::map::FieldId;
use crate::tag::{KnownField, TagDialect, TagType};
use crate::text::TextEncoding;
use byteorder::{BigEndian, ByteOrder};
use std::cmp::Ordering;

/// A four-character atom code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AtomId(
    /// The code as a big-endian integer.
    pub u32,
);

impl AtomId {
    /// Builds an identifier from its four-character code.
    pub const fn from_code(code: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*code))
    }

    /// The display form of the code.
    pub fn as_string(self) -> String {
        self.0.to_be_bytes().iter().map(|&b| char::from(b)).collect()
    }
}

impl FieldId for AtomId {
    fn cmp_ids(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// The MP4/iTunes dialect at the field-map level.
#[derive(Debug, Clone, Copy)]
pub struct Mp4Dialect;

impl TagDialect for Mp4Dialect {
    type Id = AtomId;
    const TAG_TYPE: TagType = TagType::Mp4;

    fn known_field_to_id(field: KnownField) -> Option<AtomId> {
        let code: &[u8; 4] = match field {
            KnownField::Title => b"\xA9nam",
            KnownField::Album => b"\xA9alb",
            KnownField::Artist => b"\xA9ART",
            KnownField::AlbumArtist => b"aART",
            KnownField::Composer => b"\xA9wrt",
            KnownField::Genre => b"\xA9gen",
            KnownField::RecordDate => b"\xA9day",
            KnownField::Comment => b"\xA9cmt",
            KnownField::TrackPosition => b"trkn",
            KnownField::DiskPosition => b"disk",
            KnownField::Bpm => b"tmpo",
            KnownField::Encoder => b"\xA9too",
            KnownField::Lyrics => b"\xA9lyr",
            KnownField::Copyright => b"cprt",
            KnownField::Cover => b"covr",
            _ => return None,
        };
        Some(AtomId::from_code(code))
    }

    fn id_to_known_field(id: &AtomId) -> KnownField {
        for &field in KnownField::ALL {
            if Self::known_field_to_id(field) == Some(*id) {
                return field;
            }
        }
        KnownField::Invalid
    }

    fn supports_multiple_values(_id: &AtomId) -> bool {
        false
    }

    fn default_encoding() -> TextEncoding {
        TextEncoding::Utf8
    }
}

/// The major brand read from an `ftyp` atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp4Brand(
    /// The brand code as a big-endian integer.
    pub u32,
);

impl Mp4Brand {
    /// Reads the major brand out of the first bytes of an MP4 file.
    pub fn probe(buffer: &[u8]) -> Result<Mp4Brand> {
        if buffer.len() < 12 || &buffer[4..8] != b"ftyp" {
            return Err(Error::Invalid("no ftyp atom at the start"));
        }
        Ok(Mp4Brand(BigEndian::read_u32(&buffer[8..12])))
    }

    /// The display form of the brand.
    pub fn as_string(self) -> String {
        self.0.to_be_bytes().iter().map(|&b| char::from(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_mapping_is_bijective_for_known_fields() {
        for &field in KnownField::ALL {
            if let Some(id) = Mp4Dialect::known_field_to_id(field) {
                assert_eq!(Mp4Dialect::id_to_known_field(&id), field, "{field:?}");
            }
        }
    }

    #[test]
    fn brand_probe() {
        let data = b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00";
        assert_eq!(Mp4Brand::probe(data).unwrap().as_string(), "isom");
        assert!(Mp4Brand::probe(b"junk").is_err());
    }
}

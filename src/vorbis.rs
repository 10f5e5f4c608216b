//! Vorbis comments and the Vorbis identification header.

use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::ogg::iter::OggIterator;
use crate::tag::map::FieldId;
use crate::tag::value::TagValue;
use crate::tag::{impl_field_map_tag, FieldMapTag, KnownField, TagDialect, TagType};
use crate::text::TextEncoding;
use byteorder::{ByteOrder, LittleEndian};
use std::cmp::Ordering;
use std::io::{Read, Seek, Write};

/// Field name of the base64-coded cover art block.
pub const COVER_FIELD: &str = "METADATA_BLOCK_PICTURE";

/// A Vorbis comment field name: ASCII, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VorbisFieldId(
    /// The field name as stored in the file.
    pub String,
);

impl VorbisFieldId {
    /// Creates an identifier from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl FieldId for VorbisFieldId {
    fn cmp_ids(&self, other: &Self) -> Ordering {
        let a = self.0.bytes().map(|b| b.to_ascii_uppercase());
        let b = other.0.bytes().map(|b| b.to_ascii_uppercase());
        a.cmp(b)
    }
}

/// The Vorbis comment dialect.
#[derive(Debug, Clone, Copy)]
pub struct VorbisDialect;

impl TagDialect for VorbisDialect {
    type Id = VorbisFieldId;
    const TAG_TYPE: TagType = TagType::VorbisComment;

    fn known_field_to_id(field: KnownField) -> Option<VorbisFieldId> {
        let name = match field {
            KnownField::Title => "TITLE",
            KnownField::Album => "ALBUM",
            KnownField::Artist => "ARTIST",
            KnownField::AlbumArtist => "ALBUMARTIST",
            KnownField::Composer => "COMPOSER",
            KnownField::Lyricist => "LYRICIST",
            KnownField::Genre => "GENRE",
            KnownField::RecordDate => "DATE",
            KnownField::Comment => "COMMENT",
            KnownField::TrackPosition => "TRACKNUMBER",
            KnownField::DiskPosition => "DISCNUMBER",
            KnownField::Bpm => "BPM",
            KnownField::Encoder => "ENCODEDBY",
            KnownField::EncoderSettings => "ENCODER",
            KnownField::Lyrics => "LYRICS",
            KnownField::RecordLabel => "LABEL",
            KnownField::Copyright => "COPYRIGHT",
            KnownField::Cover => COVER_FIELD,
            _ => return None,
        };
        Some(VorbisFieldId::new(name))
    }

    fn id_to_known_field(id: &VorbisFieldId) -> KnownField {
        match id.0.to_ascii_uppercase().as_str() {
            "TITLE" => KnownField::Title,
            "ALBUM" => KnownField::Album,
            "ARTIST" => KnownField::Artist,
            "ALBUMARTIST" => KnownField::AlbumArtist,
            "COMPOSER" => KnownField::Composer,
            "LYRICIST" => KnownField::Lyricist,
            "GENRE" => KnownField::Genre,
            "DATE" => KnownField::RecordDate,
            "COMMENT" => KnownField::Comment,
            "TRACKNUMBER" => KnownField::TrackPosition,
            "DISCNUMBER" => KnownField::DiskPosition,
            "BPM" => KnownField::Bpm,
            "ENCODEDBY" => KnownField::Encoder,
            "ENCODER" => KnownField::EncoderSettings,
            "LYRICS" => KnownField::Lyrics,
            "LABEL" => KnownField::RecordLabel,
            "COPYRIGHT" => KnownField::Copyright,
            COVER_FIELD => KnownField::Cover,
            _ => KnownField::Invalid,
        }
    }

    fn supports_multiple_values(_id: &VorbisFieldId) -> bool {
        true
    }

    fn default_encoding() -> TextEncoding {
        TextEncoding::Utf8
    }
}

/// The comment packet signature preceding the field data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommentSignature {
    /// `0x03` + "vorbis", with a trailing framing bit.
    Vorbis,
    /// "OpusTags".
    OpusTags,
    /// No signature (FLAC-style bare comment block).
    None,
}

const VORBIS_COMMENT_SIG: &[u8] = b"\x03vorbis";
const OPUS_TAGS_SIG: &[u8] = b"OpusTags";

/// A Vorbis comment: the vendor string plus a case-insensitive field
/// multimap.
#[derive(Debug, Clone, Default)]
pub struct VorbisComment {
    base: FieldMapTag<VorbisDialect>,
    /// Vendor string of the encoder.
    pub vendor: String,
}

impl_field_map_tag!(VorbisComment, VorbisDialect, base);

impl VorbisComment {
    /// Creates an empty comment.
    pub fn new() -> Self {
        Self::default()
    }

    /// The generic field-map surface.
    pub fn base(&self) -> &FieldMapTag<VorbisDialect> {
        &self.base
    }

    /// The generic field-map surface, mutably.
    pub fn base_mut(&mut self) -> &mut FieldMapTag<VorbisDialect> {
        &mut self.base
    }

    /// Parses a comment packet from the current position of `iter`.
    pub fn parse<R: Read + Seek>(
        &mut self,
        io: &mut R,
        iter: &mut OggIterator,
        signature: CommentSignature,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let context = "parsing Vorbis comment";
        match signature {
            CommentSignature::Vorbis => {
                let mut sig = [0u8; 7];
                iter.read(io, &mut sig)?;
                if sig != VORBIS_COMMENT_SIG {
                    return Err(Error::Invalid("Vorbis comment signature not present"));
                }
            }
            CommentSignature::OpusTags => {
                let mut sig = [0u8; 8];
                iter.read(io, &mut sig)?;
                if &sig != OPUS_TAGS_SIG {
                    return Err(Error::Invalid("OpusTags signature not present"));
                }
            }
            CommentSignature::None => {}
        }
        let mut len = [0u8; 4];
        iter.read(io, &mut len)?;
        let vendor_size = LittleEndian::read_u32(&len);
        let mut vendor = vec![0u8; vendor_size as usize];
        iter.read(io, &mut vendor)?;
        self.vendor = String::from_utf8_lossy(&vendor).into_owned();
        iter.read(io, &mut len)?;
        let field_count = LittleEndian::read_u32(&len);
        for index in 0..field_count {
            match self.parse_field(io, iter) {
                Ok(()) => {}
                Err(Error::Truncated) => {
                    diag.critical(
                        format!("comment field {index} of {field_count} is truncated"),
                        context,
                    );
                    return Err(Error::Truncated);
                }
                Err(_) => {
                    diag.warn(format!("comment field {index} is malformed and was skipped"), context);
                }
            }
        }
        Ok(())
    }

    fn parse_field<R: Read + Seek>(&mut self, io: &mut R, iter: &mut OggIterator) -> Result<()> {
        let mut len = [0u8; 4];
        iter.read(io, &mut len)?;
        let size = LittleEndian::read_u32(&len) as usize;
        if size == 0 {
            return Ok(());
        }
        let mut data = vec![0u8; size];
        iter.read(io, &mut data)?;
        let split = data.iter().position(|&b| b == b'=');
        let Some(split) = split else {
            return Err(Error::Invalid("comment field without a separator"));
        };
        if split == 0 {
            return Err(Error::Invalid("comment field with an empty name"));
        }
        let name = String::from_utf8(data[..split].to_vec())
            .map_err(|_| Error::Invalid("comment field name is not valid UTF-8"))?;
        let id = VorbisFieldId::new(name);
        let value = if id.cmp_ids(&VorbisFieldId::new(COVER_FIELD)) == Ordering::Equal {
            // the base64 picture block is carried through verbatim
            TagValue::Binary(data[split + 1..].to_vec())
        } else {
            TagValue::Text {
                bytes: data[split + 1..].to_vec(),
                encoding: TextEncoding::Utf8,
            }
        };
        self.base.fields_mut().insert(crate::tag::field::TagField::new(id, value));
        Ok(())
    }

    /// Serializes the comment packet, including the signature and (for the
    /// plain Vorbis layout) the framing bit.
    pub fn make<W: Write>(
        &self,
        out: &mut W,
        signature: CommentSignature,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let context = "making Vorbis comment";
        match signature {
            CommentSignature::Vorbis => out.write_all(VORBIS_COMMENT_SIG)?,
            CommentSignature::OpusTags => out.write_all(OPUS_TAGS_SIG)?,
            CommentSignature::None => {}
        }
        let mut len = [0u8; 4];
        LittleEndian::write_u32(&mut len, self.vendor.len() as u32);
        out.write_all(&len)?;
        out.write_all(self.vendor.as_bytes())?;
        let fields: Vec<(String, Vec<u8>)> = self
            .base
            .fields()
            .iter()
            .filter(|field| !field.value.is_empty())
            .filter_map(|field| {
                let data = match &field.value {
                    TagValue::Binary(bytes) => bytes.clone(),
                    value => match value.to_display_string() {
                        Ok(text) => text.into_bytes(),
                        Err(_) => {
                            diag.warn(
                                format!("field {} has no text form and was skipped", field.id.0),
                                context,
                            );
                            return None;
                        }
                    },
                };
                Some((field.id.0.clone(), data))
            })
            .collect();
        LittleEndian::write_u32(&mut len, fields.len() as u32);
        out.write_all(&len)?;
        for (name, data) in fields {
            LittleEndian::write_u32(&mut len, (name.len() + 1 + data.len()) as u32);
            out.write_all(&len)?;
            out.write_all(name.as_bytes())?;
            out.write_all(b"=")?;
            out.write_all(&data)?;
        }
        if signature == CommentSignature::Vorbis {
            out.write_all(&[0x01])?;
        }
        Ok(())
    }
}

/// The Vorbis identification header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VorbisIdentificationHeader {
    /// Vorbis version.
    pub version: u32,
    /// Channel count.
    pub channels: u8,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Maximum bitrate.
    pub max_bitrate: u32,
    /// Nominal bitrate.
    pub nominal_bitrate: u32,
    /// Minimum bitrate.
    pub min_bitrate: u32,
}

impl VorbisIdentificationHeader {
    /// Parses the header from the current position of `iter`.
    pub fn parse<R: Read + Seek>(io: &mut R, iter: &mut OggIterator) -> Result<Self> {
        let mut sig = [0u8; 7];
        iter.read(io, &mut sig)?;
        if sig != *b"\x01vorbis" {
            return Err(Error::Invalid("Vorbis identification header not present"));
        }
        let mut buff = [0u8; 23];
        iter.read(io, &mut buff)?;
        Ok(Self {
            version: LittleEndian::read_u32(&buff),
            channels: buff[4],
            sample_rate: LittleEndian::read_u32(&buff[5..]),
            max_bitrate: LittleEndian::read_u32(&buff[9..]),
            nominal_bitrate: LittleEndian::read_u32(&buff[13..]),
            min_bitrate: LittleEndian::read_u32(&buff[17..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg::page::tests::build_page;
    use crate::ogg::page::FLAG_FIRST;
    use crate::tag::Tag;
    use std::io::Cursor;

    fn comment_packet() -> Vec<u8> {
        let mut comment = VorbisComment::new();
        comment.vendor = "test vendor".into();
        comment.set_value_of(KnownField::Title, TagValue::text("Demo"));
        comment.set_value_of(KnownField::Artist, TagValue::text("Somebody"));
        let mut out = Vec::new();
        comment
            .make(&mut out, CommentSignature::Vorbis, &mut Diagnostics::new())
            .unwrap();
        out
    }

    #[test]
    fn comment_round_trip() {
        let packet = comment_packet();
        let page = build_page(9, 0, FLAG_FIRST, 0, &[&packet]);
        let mut io = Cursor::new(page.clone());
        let mut iter = OggIterator::new(0, page.len() as u64);
        iter.reset(&mut io).unwrap();
        let mut reread = VorbisComment::new();
        reread
            .parse(&mut io, &mut iter, CommentSignature::Vorbis, &mut Diagnostics::new())
            .unwrap();
        assert_eq!(reread.vendor, "test vendor");
        assert_eq!(
            reread
                .value_of(KnownField::Title)
                .unwrap()
                .to_display_string()
                .unwrap(),
            "Demo"
        );
        assert_eq!(
            reread
                .value_of(KnownField::Artist)
                .unwrap()
                .to_display_string()
                .unwrap(),
            "Somebody"
        );
    }

    #[test]
    fn field_names_are_case_insensitive() {
        let mut comment = VorbisComment::new();
        comment
            .base_mut()
            .fields_mut()
            .insert(crate::tag::field::TagField::new(
                VorbisFieldId::new("title"),
                TagValue::text("lower"),
            ));
        assert_eq!(
            comment
                .value_of(KnownField::Title)
                .unwrap()
                .to_display_string()
                .unwrap(),
            "lower"
        );
    }
}

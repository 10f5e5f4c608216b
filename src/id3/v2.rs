//! ID3v2 tag and frame codec.

use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::id3::{
    convert_to_long_id, convert_to_short_id, frame_ids, id_to_string, is_long_id, is_short_id,
    is_text_frame, FrameId,
};
use crate::tag::field::TagField;
use crate::tag::value::TagValue;
use crate::tag::{impl_field_map_tag, FieldMapTag, KnownField, TagDialect, TagType};
use crate::text::{self, TextEncoding};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

/// Size of the fixed ID3v2 header (and footer).
pub const HEADER_SIZE: u64 = 10;

/// Decodes a 28-bit synchsafe integer.
pub fn decode_synchsafe(value: u32) -> u32 {
    (value & 0x7F)
        | ((value >> 1) & 0x3F80)
        | ((value >> 2) & 0x1F_C000)
        | ((value >> 3) & 0xFE0_0000)
}

/// Encodes a value below 2^28 as a synchsafe integer.
pub fn encode_synchsafe(value: u32) -> u32 {
    (value & 0x7F)
        | ((value & 0x3F80) << 1)
        | ((value & 0x1F_C000) << 2)
        | ((value & 0xFE0_0000) << 3)
}

/// Reverts unsynchronization (`FF 00` becomes `FF`).
fn deunsynchronize(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut skip = false;
    for (index, &byte) in data.iter().enumerate() {
        if skip {
            skip = false;
            continue;
        }
        out.push(byte);
        if byte == 0xFF && data.get(index + 1) == Some(&0x00) {
            skip = true;
        }
    }
    out
}

/// The ID3v2 dialect: integer frame IDs ordered by the frame comparer.
#[derive(Debug, Clone, Copy)]
pub struct Id3v2Dialect;

impl TagDialect for Id3v2Dialect {
    type Id = FrameId;
    const TAG_TYPE: TagType = TagType::Id3v2;

    fn known_field_to_id(field: KnownField) -> Option<FrameId> {
        use frame_ids::*;
        let id = match field {
            KnownField::Title => L_TITLE,
            KnownField::Album => L_ALBUM,
            KnownField::Artist => L_ARTIST,
            KnownField::AlbumArtist => L_ALBUM_ARTIST,
            KnownField::Composer => L_COMPOSER,
            KnownField::Lyricist => L_LYRICIST,
            KnownField::Genre => L_GENRE,
            KnownField::RecordDate => L_RECORD_DATE,
            KnownField::Comment => L_COMMENT,
            KnownField::TrackPosition => L_TRACK_POSITION,
            KnownField::DiskPosition => L_DISK_POSITION,
            KnownField::Bpm => L_BPM,
            KnownField::Encoder => L_ENCODER,
            KnownField::EncoderSettings => L_ENCODER_SETTINGS,
            KnownField::Lyrics => L_LYRICS,
            KnownField::RecordLabel => L_RECORD_LABEL,
            KnownField::Copyright => L_COPYRIGHT,
            KnownField::Cover => L_COVER,
            KnownField::UniqueFileId => L_UNIQUE_FILE_ID,
            KnownField::Rating => L_RATING,
            _ => return None,
        };
        Some(FrameId(id))
    }

    fn id_to_known_field(id: &FrameId) -> KnownField {
        use frame_ids::*;
        let long = if is_short_id(id.0) { convert_to_long_id(id.0) } else { id.0 };
        match long {
            L_TITLE => KnownField::Title,
            L_ALBUM => KnownField::Album,
            L_ARTIST => KnownField::Artist,
            L_ALBUM_ARTIST => KnownField::AlbumArtist,
            L_COMPOSER => KnownField::Composer,
            L_LYRICIST => KnownField::Lyricist,
            L_GENRE => KnownField::Genre,
            L_RECORD_DATE | L_YEAR => KnownField::RecordDate,
            L_COMMENT => KnownField::Comment,
            L_TRACK_POSITION => KnownField::TrackPosition,
            L_DISK_POSITION => KnownField::DiskPosition,
            L_BPM => KnownField::Bpm,
            L_ENCODER => KnownField::Encoder,
            L_ENCODER_SETTINGS => KnownField::EncoderSettings,
            L_LYRICS => KnownField::Lyrics,
            L_RECORD_LABEL => KnownField::RecordLabel,
            L_COPYRIGHT => KnownField::Copyright,
            L_COVER => KnownField::Cover,
            L_UNIQUE_FILE_ID => KnownField::UniqueFileId,
            L_RATING => KnownField::Rating,
            _ => KnownField::Invalid,
        }
    }

    fn supports_multiple_values(id: &FrameId) -> bool {
        // multi-value text frames are an ID3v2.4 feature; the tag enforces
        // the version on write
        is_text_frame(id.0)
    }

    fn default_encoding() -> TextEncoding {
        TextEncoding::Utf16Le
    }
}

/// An ID3v2 tag.
#[derive(Debug, Clone)]
pub struct Id3v2Tag {
    base: FieldMapTag<Id3v2Dialect>,
    /// Major version (2, 3 or 4).
    pub major_version: u8,
    /// Revision number.
    pub revision: u8,
    flags: u8,
    size_excluding_header: u32,
}

impl_field_map_tag!(Id3v2Tag, Id3v2Dialect, base);

impl Default for Id3v2Tag {
    fn default() -> Self {
        Self::with_version(3)
    }
}

impl Id3v2Tag {
    /// Creates an empty tag of the given major version.
    pub fn with_version(major_version: u8) -> Self {
        Self {
            base: FieldMapTag::new(),
            major_version,
            revision: 0,
            flags: 0,
            size_excluding_header: 0,
        }
    }

    /// The generic field-map surface.
    pub fn base(&self) -> &FieldMapTag<Id3v2Dialect> {
        &self.base
    }

    /// The generic field-map surface, mutably.
    pub fn base_mut(&mut self) -> &mut FieldMapTag<Id3v2Dialect> {
        &mut self.base
    }

    /// Total on-disk size of the parsed tag, header and footer included.
    pub fn total_size(&self) -> u64 {
        let footer = if self.flags & 0x10 != 0 { HEADER_SIZE } else { 0 };
        HEADER_SIZE + self.size_excluding_header as u64 + footer
    }

    /// Whether this implementation can parse the given major version.
    pub fn is_version_supported(major_version: u8) -> bool {
        (2..=4).contains(&major_version)
    }

    /// Parses a tag at `start_offset`. `max_size` bounds the read.
    pub fn parse<R: Read + Seek>(
        io: &mut R,
        start_offset: u64,
        max_size: u64,
        diag: &mut Diagnostics,
    ) -> Result<Id3v2Tag> {
        let context = "parsing ID3v2 tag";
        if max_size < HEADER_SIZE {
            return Err(Error::Truncated);
        }
        io.seek(SeekFrom::Start(start_offset))?;
        let mut sig = [0u8; 3];
        io.read_exact(&mut sig)?;
        if &sig != b"ID3" {
            return Err(Error::NoDataFound);
        }
        let major_version = io.read_u8()?;
        let revision = io.read_u8()?;
        let flags = io.read_u8()?;
        let size_excluding_header = decode_synchsafe(io.read_u32::<BigEndian>()?);
        if !Self::is_version_supported(major_version) {
            diag.critical(
                format!("ID3v2.{major_version} is not supported"),
                context,
            );
            return Err(Error::VersionNotSupported("unknown ID3v2 major version"));
        }
        let mut tag = Id3v2Tag {
            base: FieldMapTag::new(),
            major_version,
            revision,
            flags,
            size_excluding_header,
        };
        if size_excluding_header == 0 {
            diag.warn("ID3v2 tag is empty", context);
            return Ok(tag);
        }
        if HEADER_SIZE + size_excluding_header as u64 > max_size {
            diag.critical("ID3v2 tag exceeds the available space", context);
            return Err(Error::Truncated);
        }
        let mut data = vec![0u8; size_excluding_header as usize];
        io.read_exact(&mut data)?;
        // whole-tag unsynchronization (v2.2/v2.3 style)
        let data = if flags & 0x80 != 0 { deunsynchronize(&data) } else { data };
        let mut slice = &data[..];
        // skip the extended header
        if flags & 0x40 != 0 && major_version >= 3 {
            if slice.len() < 4 {
                return Err(Error::Truncated);
            }
            let declared = BigEndian::read_u32(slice);
            let extended_size = match major_version {
                3 => 4 + declared as usize,
                _ => decode_synchsafe(declared) as usize,
            };
            if extended_size < 4 || extended_size > slice.len() {
                diag.critical("extended header is invalid", context);
                return Err(Error::Invalid("extended header is invalid"));
            }
            slice = &slice[extended_size..];
        }
        let mut text_frames_seen = Vec::new();
        while !slice.is_empty() {
            match parse_frame(&mut slice, major_version) {
                Ok(None) => break, // padding
                Ok(Some(fields)) => {
                    let id = fields[0].id.0;
                    if is_text_frame(id) && text_frames_seen.contains(&id) {
                        diag.warn(
                            format!("text frame {} occurs more than once", id_to_string(id)),
                            context,
                        );
                    } else if is_text_frame(id) {
                        text_frames_seen.push(id);
                    }
                    for field in fields {
                        tag.base.fields_mut().insert(field);
                    }
                }
                Err(Error::Truncated) => {
                    diag.critical("frame is truncated", context);
                    return Err(Error::Truncated);
                }
                Err(error) => {
                    diag.warn(format!("skipping malformed frame: {error}"), context);
                    break;
                }
            }
        }
        Ok(tag)
    }

    /// Rewrites ID3v2.2 frame IDs to their ID3v2.3/2.4 equivalents where a
    /// mapping exists, so lookups and writes use the canonical IDs.
    pub fn normalize_ids(&mut self) {
        let mut renamed = Vec::new();
        self.base.fields_mut().retain(|field| {
            if is_short_id(field.id.0) {
                let long = convert_to_long_id(field.id.0);
                if long != 0 {
                    let mut field = field.clone();
                    field.id = FrameId(long);
                    renamed.push(field);
                    return false;
                }
            }
            true
        });
        for field in renamed {
            self.base.fields_mut().insert(field);
        }
    }

    /// Converts ID3v2.3 record-date fields (TYER/TDAT) to the v2.4 TDRC
    /// form.
    pub fn convert_record_date_fields(&mut self) {
        let year_id = FrameId(frame_ids::L_YEAR);
        let date_id = FrameId(frame_ids::L_RECORDING_DATES);
        let record_id = FrameId(frame_ids::L_RECORD_DATE);
        if self.base.fields().has(&record_id) {
            return;
        }
        let year = self
            .base
            .fields()
            .value(&year_id)
            .and_then(|v| v.to_display_string().ok());
        if let Some(year) = year {
            // TDAT is DDMM
            let date = self
                .base
                .fields()
                .value(&date_id)
                .and_then(|v| v.to_display_string().ok())
                .filter(|d| d.len() == 4);
            let combined = match date {
                Some(date) => format!("{year}-{}-{}", &date[2..4], &date[..2]),
                None => year,
            };
            self.base.fields_mut().remove(&year_id);
            self.base.fields_mut().remove(&date_id);
            self.base
                .fields_mut()
                .set_value(record_id, TagValue::text(combined));
        }
    }

    /// Serializes the tag, appending `padding` zero bytes after the
    /// frames. Empty fields are skipped; a tag without any serialized
    /// frame yields [`Error::NoDataProvided`].
    pub fn make(&self, padding: u32, diag: &mut Diagnostics) -> Result<Vec<u8>> {
        let context = "making ID3v2 tag";
        let version = self.major_version;
        if !(3..=4).contains(&version) {
            return Err(Error::VersionNotSupported("can only write ID3v2.3 and ID3v2.4"));
        }
        let mut body = Vec::new();
        let mut frames_written = 0usize;
        let mut index = 0;
        let fields: Vec<&TagField<FrameId>> = self.base.fields().iter().collect();
        while index < fields.len() {
            let field = fields[index];
            // gather duplicates of the same text frame into one multi-value
            // frame on v2.4, or warn and keep the first on v2.3
            let mut values = vec![&field.value];
            let mut span = 1;
            while index + span < fields.len() && fields[index + span].id == field.id {
                values.push(&fields[index + span].value);
                span += 1;
            }
            index += span;
            if values.iter().all(|v| v.is_empty()) {
                continue;
            }
            if values.len() > 1 && is_text_frame(field.id.0) && version < 4 {
                diag.warn(
                    format!(
                        "multiple values of {} are only supported by ID3v2.4, keeping the first",
                        id_to_string(field.id.0)
                    ),
                    context,
                );
                values.truncate(1);
            }
            match make_frame(field, &values, version, diag) {
                Ok(frame) => {
                    body.extend_from_slice(&frame);
                    frames_written += 1;
                }
                Err(error) => {
                    diag.warn(
                        format!("skipping frame {}: {error}", id_to_string(field.id.0)),
                        context,
                    );
                }
            }
        }
        if frames_written == 0 {
            return Err(Error::NoDataProvided);
        }
        body.extend(std::iter::repeat(0u8).take(padding as usize));
        let mut out = Vec::with_capacity(body.len() + HEADER_SIZE as usize);
        out.extend_from_slice(b"ID3");
        out.push(version);
        out.push(0);
        out.push(0); // no unsynchronization, no extended header, no footer
        let mut size = [0u8; 4];
        BigEndian::write_u32(&mut size, encode_synchsafe(body.len() as u32));
        out.extend_from_slice(&size);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// Parses one frame off the front of `slice`, yielding one field per
/// value (ID3v2.4 text frames may carry several, NUL-separated).
/// `Ok(None)` means padding was reached.
fn parse_frame(slice: &mut &[u8], version: u8) -> Result<Option<Vec<TagField<FrameId>>>> {
    let header_size = if version == 2 { 6 } else { 10 };
    if slice.len() < header_size {
        // trailing padding smaller than a frame header
        return Ok(None);
    }
    if slice[0] == 0 {
        return Ok(None);
    }
    let (id, size, flags) = if version == 2 {
        let id = u32::from_be_bytes([0, slice[0], slice[1], slice[2]]);
        let size = u32::from_be_bytes([0, slice[3], slice[4], slice[5]]);
        (id, size, 0u16)
    } else {
        let id = BigEndian::read_u32(slice);
        let raw = BigEndian::read_u32(&slice[4..]);
        let size = if version >= 4 { decode_synchsafe(raw) } else { raw };
        (id, size, BigEndian::read_u16(&slice[8..]))
    };
    if !id
        .to_be_bytes()
        .iter()
        .skip(if version == 2 { 1 } else { 0 })
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return Err(Error::Invalid("frame ID holds characters outside A-Z0-9"));
    }
    *slice = &slice[header_size..];
    if size as usize > slice.len() {
        return Err(Error::Truncated);
    }
    let mut content = &slice[..size as usize];
    *slice = &slice[size as usize..];
    if flags & 0x00FF != 0 {
        // compression, encryption, grouping or data-length indicator
        return Err(Error::NotImplemented("frame uses format flags"));
    }
    let fields = if is_text_frame(id) {
        let (value, encoding) = parse_text_content(&mut content)?;
        if version >= 4 {
            // NUL separates the values of a multi-value frame
            let text = value.to_display_string()?;
            let values: Vec<&str> = text
                .split('\0')
                .map(|part| part.strip_prefix('\u{FEFF}').unwrap_or(part))
                .filter(|part| !part.is_empty())
                .collect();
            if values.len() > 1 {
                values
                    .into_iter()
                    .map(|part| {
                        Ok(TagField::new(
                            FrameId(id),
                            TagValue::text_with_encoding(part, encoding)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?
            } else {
                vec![TagField::new(FrameId(id), value)]
            }
        } else {
            vec![TagField::new(FrameId(id), value)]
        }
    } else if id == frame_ids::L_COVER || id == frame_ids::S_COVER {
        vec![parse_picture_content(&mut content, version, id)?]
    } else if id == frame_ids::L_COMMENT || id == frame_ids::S_COMMENT {
        vec![parse_comment_content(&mut content, id)?]
    } else {
        vec![TagField::new(FrameId(id), TagValue::Binary(content.to_vec()))]
    };
    Ok(Some(fields))
}

/// Reads the encoding byte and decodes the remaining bytes.
fn parse_text_content(content: &mut &[u8]) -> Result<(TagValue, TextEncoding)> {
    if content.is_empty() {
        return Ok((TagValue::Empty, TextEncoding::Latin1));
    }
    let (encoding, bytes) = match content[0] {
        0 => (TextEncoding::Latin1, &content[1..]),
        1 => {
            let (_, encoding) = text::decode_utf16_bom(&content[1..])?;
            (encoding, content[1..].strip_prefix(bom(encoding)).unwrap_or(&content[1..]))
        }
        2 => (TextEncoding::Utf16Be, &content[1..]),
        3 => (TextEncoding::Utf8, &content[1..]),
        _ => return Err(Error::Invalid("unknown text encoding byte")),
    };
    // round-trip check of the declared encoding
    let decoded = text::decode(encoding, bytes)?;
    Ok((
        TagValue::Text { bytes: text::encode(encoding, &decoded)?, encoding },
        encoding,
    ))
}

fn bom(encoding: TextEncoding) -> &'static [u8] {
    match encoding {
        TextEncoding::Utf16Le => &[0xFF, 0xFE],
        TextEncoding::Utf16Be => &[0xFE, 0xFF],
        _ => &[],
    }
}

fn split_terminated<'a>(data: &'a [u8], encoding: TextEncoding) -> (&'a [u8], &'a [u8]) {
    match encoding.nul_size() {
        2 => {
            let mut index = 0;
            while index + 1 < data.len() {
                if data[index] == 0 && data[index + 1] == 0 {
                    return (&data[..index], &data[index + 2..]);
                }
                index += 2;
            }
            (data, &[])
        }
        _ => match data.iter().position(|&b| b == 0) {
            Some(index) => (&data[..index], &data[index + 1..]),
            None => (data, &[]),
        },
    }
}

fn encoding_from_byte(byte: u8, data: &[u8]) -> Result<(TextEncoding, usize)> {
    Ok(match byte {
        0 => (TextEncoding::Latin1, 0),
        1 => match data {
            [0xFF, 0xFE, ..] => (TextEncoding::Utf16Le, 2),
            [0xFE, 0xFF, ..] => (TextEncoding::Utf16Be, 2),
            _ => (TextEncoding::Utf16Le, 0),
        },
        2 => (TextEncoding::Utf16Be, 0),
        3 => (TextEncoding::Utf8, 0),
        _ => return Err(Error::Invalid("unknown text encoding byte")),
    })
}

fn parse_picture_content(
    content: &mut &[u8],
    version: u8,
    id: u32,
) -> Result<TagField<FrameId>> {
    if content.len() < 2 {
        return Err(Error::Truncated);
    }
    let encoding_byte = content[0];
    let rest = &content[1..];
    let (mime, rest) = if version == 2 {
        // three-character image format
        if rest.len() < 3 {
            return Err(Error::Truncated);
        }
        let mime = match &rest[..3] {
            b"PNG" => "image/png".to_string(),
            b"JPG" => "image/jpeg".to_string(),
            other => String::from_utf8_lossy(other).into_owned(),
        };
        (mime, &rest[3..])
    } else {
        let (mime, rest) = split_terminated(rest, TextEncoding::Latin1);
        (String::from_utf8_lossy(mime).into_owned(), rest)
    };
    if rest.is_empty() {
        return Err(Error::Truncated);
    }
    let picture_type = rest[0];
    let rest = &rest[1..];
    let (encoding, bom_len) = encoding_from_byte(encoding_byte, rest)?;
    let (description, data) = split_terminated(&rest[bom_len..], encoding);
    let description = text::decode(encoding, description)?;
    Ok(TagField::with_type_info(
        FrameId(id),
        TagValue::Picture { bytes: data.to_vec(), mime, description },
        picture_type as u64,
    ))
}

fn parse_comment_content(content: &mut &[u8], id: u32) -> Result<TagField<FrameId>> {
    if content.len() < 4 {
        return Err(Error::Truncated);
    }
    let encoding_byte = content[0];
    // three-character language, then a terminated description
    let rest = &content[4..];
    let (encoding, bom_len) = encoding_from_byte(encoding_byte, rest)?;
    let (_description, text_bytes) = split_terminated(&rest[bom_len..], encoding);
    let (_, stripped) = match encoding {
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            let (enc2, skip) = encoding_from_byte(encoding_byte, text_bytes)?;
            (enc2, &text_bytes[skip..])
        }
        _ => (encoding, text_bytes),
    };
    let decoded = text::decode(encoding, stripped)?;
    Ok(TagField::new(
        FrameId(id),
        TagValue::Text { bytes: text::encode(encoding, &decoded)?, encoding },
    ))
}

/// Serializes one frame; `values` holds the field's value and those of its
/// duplicates (already capped for the version).
fn make_frame(
    field: &TagField<FrameId>,
    values: &[&TagValue],
    version: u8,
    diag: &mut Diagnostics,
) -> Result<Vec<u8>> {
    let long = if is_long_id(field.id.0) {
        field.id.0
    } else {
        let converted = convert_to_long_id(field.id.0);
        if converted == 0 {
            return Err(Error::Invalid("frame has no ID3v2.3/2.4 identifier"));
        }
        converted
    };
    let content = if is_text_frame(long) {
        make_text_content(values, version)?
    } else if long == frame_ids::L_COVER {
        make_picture_content(field)?
    } else if long == frame_ids::L_COMMENT {
        make_comment_content(values[0])?
    } else {
        match &field.value {
            TagValue::Binary(bytes) => bytes.clone(),
            value => value.to_binary()?,
        }
    };
    if content.is_empty() {
        return Err(Error::NoDataProvided);
    }
    if content.len() > 0x0FFF_FFFF {
        diag.critical("frame content exceeds the representable size", "making ID3v2 frame");
        return Err(Error::Invalid("frame content exceeds the representable size"));
    }
    let mut out = Vec::with_capacity(10 + content.len());
    out.extend_from_slice(&long.to_be_bytes());
    let size = if version >= 4 {
        encode_synchsafe(content.len() as u32)
    } else {
        content.len() as u32
    };
    let mut bytes = [0u8; 4];
    BigEndian::write_u32(&mut bytes, size);
    out.extend_from_slice(&bytes);
    out.extend_from_slice(&[0, 0]); // flags
    out.extend_from_slice(&content);
    Ok(out)
}

fn encoding_byte(encoding: TextEncoding, version: u8) -> (u8, TextEncoding) {
    match (encoding, version) {
        (TextEncoding::Latin1, _) => (0, TextEncoding::Latin1),
        (TextEncoding::Utf8, 4) => (3, TextEncoding::Utf8),
        (TextEncoding::Utf16Be, 4) => (2, TextEncoding::Utf16Be),
        // everything else is expressed as UTF-16 with BOM
        _ => (1, TextEncoding::Utf16Le),
    }
}

fn make_text_content(values: &[&TagValue], version: u8) -> Result<Vec<u8>> {
    let encoding = values
        .iter()
        .find_map(|v| v.encoding())
        .unwrap_or(TextEncoding::Utf16Le);
    let (byte, encoding) = encoding_byte(encoding, version);
    let mut out = vec![byte];
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            // multi-value separator (v2.4 only; the caller capped v2.3)
            out.extend_from_slice(match encoding.nul_size() {
                2 => &[0, 0][..],
                _ => &[0][..],
            });
        }
        let text = value.to_display_string()?;
        if byte == 1 {
            out.extend(text::encode_with_bom(encoding, &text)?);
        } else {
            out.extend(text::encode(encoding, &text)?);
        }
    }
    Ok(out)
}

fn make_picture_content(field: &TagField<FrameId>) -> Result<Vec<u8>> {
    let TagValue::Picture { bytes, mime, description } = &field.value else {
        return Err(Error::Invalid("cover value is not picture data"));
    };
    let mut out = vec![0u8]; // Latin-1 description
    out.extend_from_slice(mime.as_bytes());
    out.push(0);
    out.push(field.type_info.unwrap_or(3) as u8); // 3 = front cover
    out.extend(text::encode(TextEncoding::Latin1, description)?);
    out.push(0);
    out.extend_from_slice(bytes);
    Ok(out)
}

fn make_comment_content(value: &TagValue) -> Result<Vec<u8>> {
    let encoding = value.encoding().unwrap_or(TextEncoding::Utf16Le);
    let (byte, encoding) = encoding_byte(encoding, 3);
    let mut out = vec![byte];
    out.extend_from_slice(b"und"); // language
    let text = value.to_display_string()?;
    if byte == 1 {
        out.extend(text::encode_with_bom(encoding, "")?);
        out.extend_from_slice(&[0, 0]);
        out.extend(text::encode_with_bom(encoding, &text)?);
    } else {
        out.push(0);
        out.extend(text::encode(encoding, &text)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;
    use std::io::Cursor;

    #[test]
    fn synchsafe_round_trip() {
        let test_pair = [(0u32, 0u32), (0x7F, 0x7F), (0x80, 0x0100), (0x3FFF, 0x7F7F), (0x0FFF_FFFF, 0x7F7F_7F7F)];
        for (plain, coded) in test_pair {
            assert_eq!(encode_synchsafe(plain), coded, "{plain:#X}");
            assert_eq!(decode_synchsafe(coded), plain, "{coded:#X}");
        }
    }

    #[test]
    fn deunsynchronize_drops_stuffing() {
        assert_eq!(deunsynchronize(&[0xFF, 0x00, 0xE0, 0x12]), vec![0xFF, 0xE0, 0x12]);
        assert_eq!(deunsynchronize(&[0xFF, 0x00, 0x00]), vec![0xFF, 0x00]);
        assert_eq!(deunsynchronize(&[0x01, 0x02]), vec![0x01, 0x02]);
    }

    fn parse_bytes(bytes: &[u8], diag: &mut Diagnostics) -> Id3v2Tag {
        let mut io = Cursor::new(bytes.to_vec());
        Id3v2Tag::parse(&mut io, 0, bytes.len() as u64, diag).unwrap()
    }

    #[test]
    fn utf16_title_round_trip() {
        let mut tag = Id3v2Tag::with_version(3);
        tag.set_value_of(
            KnownField::Title,
            TagValue::text_with_encoding("Hello", TextEncoding::Utf16Le).unwrap(),
        );
        let mut diag = Diagnostics::new();
        let bytes = tag.make(0, &mut diag).unwrap();
        let reread = parse_bytes(&bytes, &mut diag);
        assert_eq!(reread.major_version, 3);
        let value = reread.value_of(KnownField::Title).unwrap();
        assert_eq!(value.to_display_string().unwrap(), "Hello");
        assert_eq!(value.encoding(), Some(TextEncoding::Utf16Le));
        assert_eq!(diag.level(), crate::diag::DiagLevel::None);
    }

    #[test]
    fn frames_are_written_in_comparer_order() {
        let mut tag = Id3v2Tag::with_version(4);
        tag.set_value_of(KnownField::Cover, TagValue::Picture {
            bytes: vec![1, 2, 3],
            mime: "image/png".into(),
            description: String::new(),
        });
        tag.set_value_of(KnownField::Comment, TagValue::text("a comment"));
        tag.set_value_of(KnownField::Title, TagValue::text("a title"));
        let bytes = tag.make(0, &mut Diagnostics::new()).unwrap();
        let title = frame_ids::L_TITLE.to_be_bytes();
        let comment = frame_ids::L_COMMENT.to_be_bytes();
        let cover = frame_ids::L_COVER.to_be_bytes();
        let pos = |needle: &[u8]| {
            bytes
                .windows(needle.len())
                .position(|w| w == needle)
                .unwrap()
        };
        assert!(pos(&title) < pos(&comment));
        assert!(pos(&comment) < pos(&cover));
    }

    #[test]
    fn multi_value_text_frames_on_v24() {
        let mut tag = Id3v2Tag::with_version(4);
        tag.base_mut().set_values(
            KnownField::Artist,
            vec![TagValue::text("One"), TagValue::text("Two")],
        );
        let bytes = tag.make(0, &mut Diagnostics::new()).unwrap();
        let mut diag = Diagnostics::new();
        let reread = parse_bytes(&bytes, &mut diag);
        let values = reread.values_of(KnownField::Artist);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].to_display_string().unwrap(), "One");
        assert_eq!(values[1].to_display_string().unwrap(), "Two");
        // splitting one frame into its values is not a duplicate frame
        assert_eq!(diag.level(), crate::diag::DiagLevel::None);
    }

    #[test]
    fn picture_round_trip() {
        let mut tag = Id3v2Tag::with_version(3);
        tag.set_value_of(KnownField::Title, TagValue::text("x"));
        tag.base_mut().fields_mut().insert(TagField::with_type_info(
            FrameId(frame_ids::L_COVER),
            TagValue::Picture {
                bytes: vec![0x89, 0x50, 0x4E, 0x47],
                mime: "image/png".into(),
                description: "front".into(),
            },
            3,
        ));
        let bytes = tag.make(0, &mut Diagnostics::new()).unwrap();
        let reread = parse_bytes(&bytes, &mut Diagnostics::new());
        let TagValue::Picture { bytes, mime, description } =
            reread.value_of(KnownField::Cover).unwrap()
        else {
            panic!("not a picture");
        };
        assert_eq!(bytes, &[0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(mime, "image/png");
        assert_eq!(description, "front");
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut bytes = vec![];
        bytes.extend_from_slice(b"ID3");
        bytes.push(5); // unsupported major version
        bytes.push(0);
        bytes.push(0);
        bytes.extend_from_slice(&[0, 0, 0, 10]);
        bytes.extend_from_slice(&[0u8; 10]);
        let mut io = Cursor::new(bytes.clone());
        let mut diag = Diagnostics::new();
        assert!(matches!(
            Id3v2Tag::parse(&mut io, 0, bytes.len() as u64, &mut diag),
            Err(Error::VersionNotSupported(_))
        ));
        assert_eq!(diag.level(), crate::diag::DiagLevel::Critical);
    }

    #[test]
    fn record_date_conversion() {
        let mut tag = Id3v2Tag::with_version(3);
        tag.base_mut()
            .fields_mut()
            .set_value(FrameId(frame_ids::L_YEAR), TagValue::text("2004"));
        tag.base_mut()
            .fields_mut()
            .set_value(FrameId(frame_ids::L_RECORDING_DATES), TagValue::text("1604"));
        tag.convert_record_date_fields();
        assert!(!tag.base().fields().has(&FrameId(frame_ids::L_YEAR)));
        let value = tag
            .base()
            .fields()
            .value(&FrameId(frame_ids::L_RECORD_DATE))
            .unwrap();
        assert_eq!(value.to_display_string().unwrap(), "2004-04-16");
    }

    #[test]
    fn empty_tag_fails_to_serialize() {
        let tag = Id3v2Tag::with_version(3);
        assert!(matches!(
            tag.make(0, &mut Diagnostics::new()),
            Err(Error::NoDataProvided)
        ));
    }
}

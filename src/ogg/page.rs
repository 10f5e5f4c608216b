//! Ogg page headers, lacing and checksums.

use crate::error::{Error, Result};
use crate::io::ogg_crc_update;
use crate::tree::{ElementKind, ParsedHeader};
use crate::vint::ElementId;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

/// The page capture pattern "OggS".
pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
/// Size of the fixed part of a page header.
pub const HEADER_SIZE: usize = 27;
/// Continuation flag: the first segment continues a packet of the
/// preceding page.
pub const FLAG_CONTINUED: u8 = 0x01;
/// First page of its logical bitstream.
pub const FLAG_FIRST: u8 = 0x02;
/// Last page of its logical bitstream.
pub const FLAG_LAST: u8 = 0x04;

/// A parsed Ogg page header.
///
/// `segment_sizes` collapses the lacing chains of the raw segment table:
/// each entry is the byte count of one packet part within this page. A
/// trailing raw lacing value of 255 means the last packet part continues
/// on the next page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OggPageHeader {
    /// Offset of the capture pattern within the stream.
    pub start_offset: u64,
    /// Stream structure version, 0 for all known files.
    pub stream_structure_version: u8,
    /// Combination of the `FLAG_*` bits.
    pub header_type_flag: u8,
    /// Absolute granule position; all bits set means "no packet finishes
    /// on this page".
    pub granule_position: u64,
    /// Serial number of the logical bitstream the page belongs to.
    pub stream_serial: u32,
    /// Page sequence number within the logical bitstream.
    pub sequence_number: u32,
    /// Stored checksum over the whole page.
    pub checksum: u32,
    /// The raw lacing values.
    pub segment_table: Vec<u8>,
    /// Collapsed segment sizes (lacing chains merged).
    pub segment_sizes: Vec<u32>,
}

impl OggPageHeader {
    /// Parses a page header at `start_offset`, bounded by `max_size` bytes.
    pub fn parse<R: Read + Seek>(io: &mut R, start_offset: u64, max_size: u64) -> Result<Self> {
        if max_size < HEADER_SIZE as u64 {
            return Err(Error::Truncated);
        }
        io.seek(SeekFrom::Start(start_offset))?;
        let mut pattern = [0u8; 4];
        io.read_exact(&mut pattern)?;
        if &pattern != CAPTURE_PATTERN {
            return Err(Error::Invalid("capture pattern is not present"));
        }
        let stream_structure_version = io.read_u8()?;
        let header_type_flag = io.read_u8()?;
        let granule_position = io.read_u64::<LittleEndian>()?;
        let stream_serial = io.read_u32::<LittleEndian>()?;
        let sequence_number = io.read_u32::<LittleEndian>()?;
        let checksum = io.read_u32::<LittleEndian>()?;
        let segment_count = io.read_u8()?;
        let mut remaining = max_size - HEADER_SIZE as u64;
        if (segment_count as u64) > remaining {
            return Err(Error::Truncated);
        }
        remaining -= segment_count as u64;
        let mut segment_table = vec![0u8; segment_count as usize];
        io.read_exact(&mut segment_table)?;
        let mut segment_sizes: Vec<u32> = Vec::new();
        let mut data_size = 0u64;
        let mut open_segment = false;
        for (index, &entry) in segment_table.iter().enumerate() {
            data_size += entry as u64;
            if open_segment {
                if let Some(last) = segment_sizes.last_mut() {
                    *last += entry as u32;
                }
            } else {
                segment_sizes.push(entry as u32);
            }
            // a lacing value of 255 chains into the next entry
            open_segment = entry == 0xFF && index + 1 < segment_table.len();
        }
        if data_size > remaining {
            return Err(Error::Truncated);
        }
        Ok(Self {
            start_offset,
            stream_structure_version,
            header_type_flag,
            granule_position,
            stream_serial,
            sequence_number,
            checksum,
            segment_table,
            segment_sizes,
        })
    }

    /// Size of the header including the segment table.
    pub fn header_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.segment_table.len() as u64
    }

    /// Total size of the payload following the header.
    pub fn data_size(&self) -> u64 {
        self.segment_table.iter().map(|&v| v as u64).sum()
    }

    /// Total page size.
    pub fn total_size(&self) -> u64 {
        self.header_size() + self.data_size()
    }

    /// Absolute offset of the payload.
    pub fn data_offset(&self) -> u64 {
        self.start_offset + self.header_size()
    }

    /// Whether the first segment continues a packet of the previous page.
    pub fn is_continued(&self) -> bool {
        self.header_type_flag & FLAG_CONTINUED != 0
    }

    /// Whether this is the first page of its logical bitstream.
    pub fn is_first(&self) -> bool {
        self.header_type_flag & FLAG_FIRST != 0
    }

    /// Whether this is the last page of its logical bitstream.
    pub fn is_last(&self) -> bool {
        self.header_type_flag & FLAG_LAST != 0
    }

    /// Whether the last packet part of this page continues on the next
    /// page (final lacing value of 255).
    pub fn last_segment_continues(&self) -> bool {
        self.segment_table.last() == Some(&0xFF)
    }

    /// Whether no packet finishes on this page.
    pub fn has_no_finishing_packet(&self) -> bool {
        self.granule_position == u64::MAX
    }

    /// Serializes the header (with `checksum` as stored; write zero and
    /// patch via [`update_checksum`] when composing pages).
    pub fn make<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(CAPTURE_PATTERN)?;
        out.write_u8(self.stream_structure_version)?;
        out.write_u8(self.header_type_flag)?;
        out.write_u64::<LittleEndian>(self.granule_position)?;
        out.write_u32::<LittleEndian>(self.stream_serial)?;
        out.write_u32::<LittleEndian>(self.sequence_number)?;
        out.write_u32::<LittleEndian>(self.checksum)?;
        if self.segment_table.len() > 0xFF {
            return Err(Error::Invalid("segment table longer than 255 entries"));
        }
        out.write_u8(self.segment_table.len() as u8)?;
        out.write_all(&self.segment_table)?;
        Ok(())
    }
}

/// Appends the lacing values denoting a segment of `size` bytes.
///
/// Returns the number of lacing values written. A size that is a multiple
/// of 255 ends with a zero lacing value, per the Ogg framing rules.
pub fn make_segment_size_denotation(size: u64, table: &mut Vec<u8>) -> u32 {
    let mut written = 1;
    let mut size = size;
    while size >= 0xFF {
        table.push(0xFF);
        size -= 0xFF;
        written += 1;
    }
    table.push(size as u8);
    written
}

/// Computes the checksum of the page starting at `start_offset`, treating
/// the stored checksum bytes as zero.
pub fn compute_checksum<R: Read + Seek>(io: &mut R, start_offset: u64) -> Result<u32> {
    io.seek(SeekFrom::Start(start_offset))?;
    let mut header = [0u8; HEADER_SIZE];
    io.read_exact(&mut header)?;
    let segment_count = header[26] as usize;
    let mut table = vec![0u8; segment_count];
    io.read_exact(&mut table)?;
    let payload_size: u64 = table.iter().map(|&v| v as u64).sum();

    // bytes 22..26 hold the denoted checksum and count as zero
    let mut crc = ogg_crc_update(0, &header[..22]);
    crc = ogg_crc_update(crc, &[0, 0, 0, 0]);
    crc = ogg_crc_update(crc, &header[26..]);
    crc = ogg_crc_update(crc, &table);
    let mut remaining = payload_size;
    let mut buf = [0u8; 0x2000];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        io.read_exact(&mut buf[..chunk])?;
        crc = ogg_crc_update(crc, &buf[..chunk]);
        remaining -= chunk as u64;
    }
    Ok(crc)
}

/// Recomputes the checksum of the page starting at `start_offset` and
/// stores it.
pub fn update_checksum<S: Read + Write + Seek>(io: &mut S, start_offset: u64) -> Result<()> {
    let checksum = compute_checksum(io, start_offset)?;
    io.seek(SeekFrom::Start(start_offset + 22))?;
    io.write_u32::<LittleEndian>(checksum)?;
    Ok(())
}

/// The Ogg dialect strategy for the generic element tree: pages are a flat
/// chain of siblings, the node ID is the page's stream serial.
#[derive(Debug, Clone, Copy, Default)]
pub struct OggKind;

impl ElementKind for OggKind {
    type Data = OggPageHeader;

    fn read_header<R: Read + Seek>(
        &self,
        io: &mut R,
        start: u64,
        max_size: u64,
    ) -> Result<ParsedHeader<Self::Data>> {
        let page = OggPageHeader::parse(io, start, max_size)?;
        Ok(ParsedHeader {
            id: page.stream_serial as ElementId,
            header_size: page.header_size() as u32,
            data_size: page.data_size(),
            size_unknown: false,
            data: page,
        })
    }

    fn is_parent(&self, _id: ElementId) -> bool {
        false
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds a page with payload and a correct checksum.
    pub(crate) fn build_page(
        serial: u32,
        sequence: u32,
        flags: u8,
        granule: u64,
        packets: &[&[u8]],
    ) -> Vec<u8> {
        let mut table = Vec::new();
        for packet in packets {
            make_segment_size_denotation(packet.len() as u64, &mut table);
        }
        let header = OggPageHeader {
            start_offset: 0,
            stream_structure_version: 0,
            header_type_flag: flags,
            granule_position: granule,
            stream_serial: serial,
            sequence_number: sequence,
            checksum: 0,
            segment_sizes: Vec::new(),
            segment_table: table,
        };
        let mut bytes = Vec::new();
        header.make(&mut bytes).unwrap();
        for packet in packets {
            bytes.extend_from_slice(packet);
        }
        let mut cursor = Cursor::new(bytes);
        update_checksum(&mut cursor, 0).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn parse_round_trip() {
        let bytes = build_page(0xDEAD_BEEF, 7, FLAG_FIRST, 1234, &[b"hello", b"world!"]);
        let mut io = Cursor::new(bytes.clone());
        let page = OggPageHeader::parse(&mut io, 0, bytes.len() as u64).unwrap();
        assert_eq!(page.stream_serial, 0xDEAD_BEEF);
        assert_eq!(page.sequence_number, 7);
        assert!(page.is_first());
        assert!(!page.is_continued());
        assert_eq!(page.segment_sizes, vec![5, 6]);
        assert_eq!(page.data_size(), 11);
        assert_eq!(page.total_size() as usize, bytes.len());
    }

    #[test]
    fn checksum_matches_stored_value() {
        let bytes = build_page(1, 0, FLAG_FIRST, 0, &[b"test packet"]);
        let mut io = Cursor::new(bytes.clone());
        let page = OggPageHeader::parse(&mut io, 0, bytes.len() as u64).unwrap();
        let computed = compute_checksum(&mut io, 0).unwrap();
        assert_eq!(computed, page.checksum);
        assert_ne!(computed, 0);
    }

    #[test]
    fn corrupting_payload_breaks_checksum() {
        let mut bytes = build_page(1, 0, 0, 0, &[b"test packet"]);
        let stored = {
            let mut io = Cursor::new(bytes.clone());
            OggPageHeader::parse(&mut io, 0, bytes.len() as u64).unwrap().checksum
        };
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut io = Cursor::new(bytes);
        assert_ne!(compute_checksum(&mut io, 0).unwrap(), stored);
    }

    #[test]
    fn lacing_chains_collapse() {
        // a 510-byte packet laces as FF FF 00
        let payload = vec![0xABu8; 510];
        let bytes = build_page(1, 0, 0, 0, &[&payload]);
        let mut io = Cursor::new(bytes.clone());
        let page = OggPageHeader::parse(&mut io, 0, bytes.len() as u64).unwrap();
        assert_eq!(page.segment_table, vec![0xFF, 0xFF, 0x00]);
        assert_eq!(page.segment_sizes, vec![510]);
        assert!(!page.last_segment_continues());
    }

    #[test]
    fn capture_pattern_is_checked() {
        let mut bytes = build_page(1, 0, 0, 0, &[b"x"]);
        bytes[0] = b'X';
        let mut io = Cursor::new(bytes.clone());
        assert!(matches!(
            OggPageHeader::parse(&mut io, 0, bytes.len() as u64),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn truncation_is_detected() {
        let bytes = build_page(1, 0, 0, 0, &[b"a longer test packet"]);
        let mut io = Cursor::new(bytes.clone());
        assert!(matches!(
            OggPageHeader::parse(&mut io, 0, 20),
            Err(Error::Truncated)
        ));
        assert!(matches!(
            OggPageHeader::parse(&mut io, 0, bytes.len() as u64 - 1),
            Err(Error::Truncated)
        ));
    }
}

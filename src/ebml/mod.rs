//! The EBML codec: element headers, the EBML document header and the
//! helpers the rewrite engine uses to emit elements.

pub mod ids;

use crate::bufext::BufMut;
use crate::error::{Error, Result};
use crate::tree::{ElementKind, ElementTree, NodeId, ParsedHeader};
use crate::vint::{self, ElementId};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

/// Per-node data of an EBML element: the encoded lengths of its ID and
/// size denotation.
#[derive(Debug, Clone, Copy)]
pub struct EbmlNodeData {
    /// Encoded length of the element ID in bytes (1..=4).
    pub id_length: u8,
    /// Encoded length of the size denotation in bytes (1..=8).
    pub size_length: u8,
}

/// The EBML dialect strategy for [`ElementTree`].
///
/// Carries the `EBMLMaxIDLength`/`EBMLMaxSizeLength` limits declared by the
/// document header; elements exceeding them fail with
/// [`Error::VersionNotSupported`].
#[derive(Debug, Clone, Copy)]
pub struct EbmlKind {
    /// Maximum element ID length in bytes.
    pub max_id_length: u32,
    /// Maximum size denotation length in bytes.
    pub max_size_length: u32,
}

impl Default for EbmlKind {
    fn default() -> Self {
        Self { max_id_length: 4, max_size_length: 8 }
    }
}

/// An element tree over an EBML document.
pub type EbmlTree = ElementTree<EbmlKind>;

impl ElementKind for EbmlKind {
    type Data = EbmlNodeData;

    fn read_header<R: Read + Seek>(
        &self,
        io: &mut R,
        start: u64,
        max_size: u64,
    ) -> Result<ParsedHeader<Self::Data>> {
        io.seek(SeekFrom::Start(start))?;
        let (id, id_length) = vint::read_id(io, self.max_id_length).map_err(map_eof)?;
        if id_length as u64 > max_size {
            return Err(Error::Truncated);
        }
        let (size, size_length) = vint::read_size(io, self.max_size_length).map_err(map_eof)?;
        let header_size = id_length + size_length;
        if header_size as u64 > max_size {
            return Err(Error::Truncated);
        }
        let (data_size, size_unknown) = match size {
            Some(size) => (size, false),
            // unknown size: the element extends to the end of its parent
            None => (max_size - header_size as u64, true),
        };
        if header_size as u64 + data_size > max_size {
            return Err(Error::Truncated);
        }
        Ok(ParsedHeader {
            id,
            header_size,
            data_size,
            size_unknown,
            data: EbmlNodeData { id_length: id_length as u8, size_length: size_length as u8 },
        })
    }

    fn is_parent(&self, id: ElementId) -> bool {
        ids::is_parent(id)
    }

    fn is_padding(&self, id: ElementId) -> bool {
        ids::is_padding(id)
    }
}

fn map_eof(error: Error) -> Error {
    match error {
        Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Error::Truncated,
        other => other,
    }
}

/// Reads the data of an unsigned-integer element (big-endian, leading
/// zero bytes trimmed, empty data counts as zero).
pub fn read_uint<R: Read + Seek>(io: &mut R, tree: &EbmlTree, node: NodeId) -> Result<u64> {
    let size = tree.data_size(node);
    if size > 8 {
        return Err(Error::Invalid("unsigned integer element longer than eight bytes"));
    }
    io.seek(SeekFrom::Start(tree.data_offset(node)))?;
    let mut bytes = [0u8; 8];
    io.read_exact(&mut bytes[8 - size as usize..])?;
    Ok(u64::from_be_bytes(bytes))
}

/// Reads the data of a float element (zero, four or eight bytes).
pub fn read_float<R: Read + Seek>(io: &mut R, tree: &EbmlTree, node: NodeId) -> Result<f64> {
    io.seek(SeekFrom::Start(tree.data_offset(node)))?;
    match tree.data_size(node) {
        0 => Ok(0.0),
        4 => Ok(io.read_f32::<BigEndian>()? as f64),
        8 => Ok(io.read_f64::<BigEndian>()?),
        _ => Err(Error::Invalid("float element with an odd length")),
    }
}

/// Reads the data of a UTF-8/ASCII string element.
pub fn read_string<R: Read + Seek>(io: &mut R, tree: &EbmlTree, node: NodeId) -> Result<String> {
    let bytes = read_binary(io, tree, node)?;
    // strings may be zero-padded
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec())
        .map_err(|_| Error::Invalid("string element is not valid UTF-8"))
}

/// Reads the raw data of an element.
pub fn read_binary<R: Read + Seek>(io: &mut R, tree: &EbmlTree, node: NodeId) -> Result<Vec<u8>> {
    crate::io::read_buffer(io, tree.data_offset(node), tree.data_size(node))
}

/// Total encoded size of an element holding `data_size` bytes.
pub fn calculate_element_size(id: ElementId, data_size: u64) -> Result<u64> {
    Ok(vint::calculate_id_length(id)? as u64
        + vint::calculate_size_length(data_size) as u64
        + data_size)
}

/// Total encoded size of an unsigned-integer element.
pub fn calculate_uint_element_size(id: ElementId, value: u64) -> Result<u64> {
    calculate_element_size(id, vint::calculate_uinteger_length(value) as u64)
}

/// Appends a complete element with the given data to `buf`.
pub fn make_element(id: ElementId, data: &[u8], buf: &mut impl BufMut) -> Result<()> {
    vint::make_id(id, buf)?;
    vint::make_size(data.len() as u64, 0, buf)?;
    buf.append_slice(data);
    Ok(())
}

/// Appends an unsigned-integer element to `buf`.
pub fn make_uint_element(id: ElementId, value: u64, buf: &mut impl BufMut) -> Result<()> {
    vint::make_id(id, buf)?;
    let length = vint::calculate_uinteger_length(value);
    vint::make_size(length as u64, 0, buf)?;
    buf.append_slice(&value.to_be_bytes()[8 - length as usize..]);
    Ok(())
}

/// Appends a string element to `buf`.
pub fn make_string_element(id: ElementId, text: &str, buf: &mut impl BufMut) -> Result<()> {
    make_element(id, text.as_bytes(), buf)
}

/// Appends a float element (always eight bytes) to `buf`.
pub fn make_float_element(id: ElementId, value: f64, buf: &mut impl BufMut) -> Result<()> {
    make_element(id, &value.to_be_bytes(), buf)
}

/// Appends a `Void` element covering exactly `total_size` bytes to `buf`.
///
/// The smallest representable padding is two bytes (one ID byte plus one
/// size byte); `total_size` of 0 writes nothing and 1 fails.
pub fn make_void(total_size: u64, buf: &mut impl BufMut) -> Result<()> {
    match total_size {
        0 => return Ok(()),
        1 => return Err(Error::Invalid("cannot produce one byte of padding")),
        _ => {}
    }
    vint::make_id(ids::VOID, buf)?;
    // pick the size length so that header plus data lands exactly on
    // total_size; a long size denotation absorbs slack for tiny voids
    let mut size_length = 1u32;
    while size_length < 8 {
        let data_size = total_size - 1 - size_length as u64;
        if vint::calculate_size_length(data_size) <= size_length {
            break;
        }
        size_length += 1;
    }
    let data_size = total_size - 1 - size_length as u64;
    vint::make_size(data_size, size_length, buf)?;
    buf.append_slice(&vec![0u8; data_size as usize]);
    Ok(())
}

/// The parsed EBML document header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbmlHeader {
    /// EBMLVersion (defaults to 1).
    pub version: u64,
    /// EBMLReadVersion (defaults to 1).
    pub read_version: u64,
    /// EBMLMaxIDLength (defaults to 4).
    pub max_id_length: u64,
    /// EBMLMaxSizeLength (defaults to 8).
    pub max_size_length: u64,
    /// DocType, e.g. "matroska" or "webm".
    pub doc_type: String,
    /// DocTypeVersion (defaults to 1).
    pub doc_type_version: u64,
    /// DocTypeReadVersion (defaults to 1).
    pub doc_type_read_version: u64,
}

impl Default for EbmlHeader {
    fn default() -> Self {
        Self {
            version: 1,
            read_version: 1,
            max_id_length: 4,
            max_size_length: 8,
            doc_type: "matroska".to_string(),
            doc_type_version: 1,
            doc_type_read_version: 1,
        }
    }
}

impl EbmlHeader {
    /// Parses the EBML master element rooted at `node`, enforcing the
    /// maximum-length limits this implementation supports.
    pub fn parse<R: Read + Seek>(io: &mut R, tree: &mut EbmlTree, node: NodeId) -> Result<Self> {
        if tree.id(node) != ids::HEADER {
            return Err(Error::Invalid("not an EBML element"));
        }
        let mut header = EbmlHeader::default();
        let mut child = tree.first_child(io, node)?;
        while let Some(n) = child {
            match tree.id(n) {
                ids::VERSION => header.version = read_uint(io, tree, n)?,
                ids::READ_VERSION => header.read_version = read_uint(io, tree, n)?,
                ids::MAX_ID_LENGTH => header.max_id_length = read_uint(io, tree, n)?,
                ids::MAX_SIZE_LENGTH => header.max_size_length = read_uint(io, tree, n)?,
                ids::DOC_TYPE => header.doc_type = read_string(io, tree, n)?,
                ids::DOC_TYPE_VERSION => header.doc_type_version = read_uint(io, tree, n)?,
                ids::DOC_TYPE_READ_VERSION => {
                    header.doc_type_read_version = read_uint(io, tree, n)?
                }
                _ => {}
            }
            child = tree.next_sibling(io, n)?;
        }
        if header.max_id_length > 4 {
            return Err(Error::VersionNotSupported("EBMLMaxIDLength above four bytes"));
        }
        if header.max_size_length > 8 {
            return Err(Error::VersionNotSupported("EBMLMaxSizeLength above eight bytes"));
        }
        Ok(header)
    }

    /// Serializes the header as a complete EBML master element.
    pub fn make(&self, buf: &mut impl BufMut) -> Result<()> {
        let mut body = Vec::new();
        make_uint_element(ids::VERSION, self.version, &mut body)?;
        make_uint_element(ids::READ_VERSION, self.read_version, &mut body)?;
        make_uint_element(ids::MAX_ID_LENGTH, self.max_id_length, &mut body)?;
        make_uint_element(ids::MAX_SIZE_LENGTH, self.max_size_length, &mut body)?;
        make_string_element(ids::DOC_TYPE, &self.doc_type, &mut body)?;
        make_uint_element(ids::DOC_TYPE_VERSION, self.doc_type_version, &mut body)?;
        make_uint_element(ids::DOC_TYPE_READ_VERSION, self.doc_type_read_version, &mut body)?;
        make_element(ids::HEADER, &body, buf)
    }

    /// The limits for the element tree strategy.
    pub fn kind(&self) -> EbmlKind {
        EbmlKind {
            max_id_length: self.max_id_length as u32,
            max_size_length: self.max_size_length as u32,
        }
    }
}

/// Reads the little-endian checksum stored in a CRC-32 element.
pub fn read_crc32_element<R: Read + Seek>(io: &mut R, tree: &EbmlTree, node: NodeId) -> Result<u32> {
    if tree.data_size(node) != 4 {
        return Err(Error::Invalid("CRC-32 element is not four bytes"));
    }
    io.seek(SeekFrom::Start(tree.data_offset(node)))?;
    let mut bytes = [0u8; 4];
    io.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Appends a CRC-32 element with a placeholder value; the rewrite engine
/// patches the real checksum after the enclosing element is on disk.
pub fn make_crc32_placeholder(buf: &mut impl BufMut) -> Result<()> {
    make_element(ids::CRC32, &[0u8; 4], buf)
}

/// Verifies the CRC-32 element at `node` against its parent's remaining
/// data (everything after the CRC-32 element itself).
pub fn verify_crc32<R: Read + Seek>(io: &mut R, tree: &EbmlTree, node: NodeId) -> Result<bool> {
    let stored = read_crc32_element(io, tree, node)?;
    let parent = tree.parent(node).ok_or(Error::Invalid("CRC-32 element without a parent"))?;
    let covered_start = tree.end_offset(node);
    let covered_end = tree.end_offset(parent);
    io.seek(SeekFrom::Start(covered_start))?;
    let actual = crate::io::read_crc32(io, covered_end - covered_start)?;
    Ok(stored == actual)
}

/// `true` when `buffer` (the first bytes of a file) denotes an EBML
/// document; used by the signature probe's Matroska-family dispatch.
pub fn starts_with_ebml_header(buffer: &[u8]) -> bool {
    buffer.len() >= 4 && BigEndian::read_u32(buffer) == ids::HEADER
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // EBML header of a typical Matroska file
    const EBML_HEADER: &[u8] = &[
        0x1A, 0x45, 0xDF, 0xA3, 0x93, 0x42, 0x82, 0x88, 0x6D, 0x61, 0x74, 0x72, 0x6F, 0x73, 0x6B,
        0x61, 0x42, 0x87, 0x81, 0x01, 0x42, 0x85, 0x81, 0x01,
    ];

    #[test]
    fn parse_header() {
        let mut io = Cursor::new(EBML_HEADER.to_vec());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(&mut io, 0, EBML_HEADER.len() as u64).unwrap();
        assert_eq!(tree.id(root), ids::HEADER);
        assert_eq!(tree.header_size(root), 5);
        assert_eq!(tree.data_size(root), 0x13);
        let header = EbmlHeader::parse(&mut io, &mut tree, root).unwrap();
        assert_eq!(header.doc_type, "matroska");
        assert_eq!(header.doc_type_version, 1);
        assert_eq!(header.max_id_length, 4);
        assert_eq!(header.max_size_length, 8);
    }

    #[test]
    fn header_round_trip() {
        let header = EbmlHeader { doc_type: "webm".into(), doc_type_version: 4, ..Default::default() };
        let mut buf = Vec::new();
        header.make(&mut buf).unwrap();
        let mut io = Cursor::new(buf.clone());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(&mut io, 0, buf.len() as u64).unwrap();
        let reread = EbmlHeader::parse(&mut io, &mut tree, root).unwrap();
        assert_eq!(reread, header);
    }

    #[test]
    fn lazy_children_and_siblings() {
        let mut io = Cursor::new(EBML_HEADER.to_vec());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(&mut io, 0, EBML_HEADER.len() as u64).unwrap();
        let first = tree.first_child(&mut io, root).unwrap().unwrap();
        assert_eq!(tree.id(first), ids::DOC_TYPE);
        assert_eq!(tree.data_offset(first), 8);
        let second = tree.next_sibling(&mut io, first).unwrap().unwrap();
        assert_eq!(tree.id(second), ids::DOC_TYPE_VERSION);
        let third = tree.next_sibling(&mut io, second).unwrap().unwrap();
        assert_eq!(tree.id(third), ids::DOC_TYPE_READ_VERSION);
        assert_eq!(tree.next_sibling(&mut io, third).unwrap(), None);
        // repeated access returns the cached nodes
        assert_eq!(tree.first_child(&mut io, root).unwrap(), Some(first));
        let by_id = tree.child_by_id(&mut io, root, ids::DOC_TYPE_VERSION).unwrap();
        assert_eq!(by_id, Some(second));
    }

    #[test]
    fn truncated_header_is_detected() {
        let mut truncated = EBML_HEADER.to_vec();
        truncated.truncate(10);
        let mut io = Cursor::new(truncated);
        let mut tree = EbmlTree::new(EbmlKind::default());
        assert!(matches!(tree.parse_root(&mut io, 0, 10), Err(Error::Truncated)));
    }

    #[test]
    fn void_is_sized_exactly() {
        for total in [2u64, 3, 9, 0x7F, 0x80, 0x81, 0x4000, 0x4002] {
            let mut buf = Vec::new();
            make_void(total, &mut buf).unwrap();
            assert_eq!(buf.len() as u64, total, "total {total}");
            assert_eq!(buf[0], 0xEC);
        }
        assert!(make_void(1, &mut Vec::new()).is_err());
    }

    #[test]
    fn crc32_covers_the_parent_remainder() {
        // a SeekHead whose first child is a CRC-32 element
        let mut body = Vec::new();
        make_crc32_placeholder(&mut body).unwrap();
        let covered_start = body.len();
        make_uint_element(ids::SEEK_POSITION, 0x1234, &mut body).unwrap();
        let mut crc = crate::io::Crc32Ieee::new();
        crc.update(&body[covered_start..]);
        let checksum = crc.finish().to_le_bytes();
        body[2..6].copy_from_slice(&checksum);
        let mut bytes = Vec::new();
        make_element(ids::SEEK_HEAD, &body, &mut bytes).unwrap();

        let mut io = Cursor::new(bytes.clone());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(&mut io, 0, bytes.len() as u64).unwrap();
        let crc_node = tree.child_by_id(&mut io, root, ids::CRC32).unwrap().unwrap();
        assert!(verify_crc32(&mut io, &tree, crc_node).unwrap());
        // corrupt a covered byte
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut io = Cursor::new(bytes);
        assert!(!verify_crc32(&mut io, &tree, crc_node).unwrap());
    }

    #[test]
    fn uint_elements_round_trip() {
        let mut buf = Vec::new();
        make_uint_element(ids::TRACK_UID, 0x0102_0304, &mut buf).unwrap();
        let mut io = Cursor::new(buf.clone());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let node = tree.parse_root(&mut io, 0, buf.len() as u64).unwrap();
        assert_eq!(tree.id(node), ids::TRACK_UID);
        assert_eq!(read_uint(&mut io, &tree, node).unwrap(), 0x0102_0304);
    }
}

//! The lazy element tree parsed over a seekable stream.
//!
//! One node type serves every container dialect; the dialect supplies a
//! strategy ([`ElementKind`]) that knows how to parse a single header and
//! which element IDs act as parents. Nodes are arena-allocated and linked
//! by index; children materialize on first access and the tree never owns
//! the stream.

use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::io;
use crate::progress::Progress;
use crate::vint::ElementId;
use std::io::{Read, Seek, SeekFrom, Write};

/// Index of a node within its [`ElementTree`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One parsed element header, as produced by [`ElementKind::read_header`].
#[derive(Debug, Clone)]
pub struct ParsedHeader<D> {
    /// Element identifier (dialect-specific meaning).
    pub id: ElementId,
    /// Size of the header itself.
    pub header_size: u32,
    /// Size of the element data following the header.
    pub data_size: u64,
    /// Whether the data size was not denoted and had to be inferred from
    /// the enclosing bound.
    pub size_unknown: bool,
    /// Dialect-specific extra header data.
    pub data: D,
}

/// Strategy object a container dialect plugs into the tree.
pub trait ElementKind {
    /// Extra per-node data the dialect parses out of the header.
    type Data: Clone + std::fmt::Debug;

    /// Parses one element header at `start`. `max_size` is the number of
    /// bytes to the end of the enclosing element (or file); implementations
    /// fail with [`Error::Truncated`] when the header or the denoted data
    /// would exceed it.
    fn read_header<R: Read + Seek>(
        &self,
        io: &mut R,
        start: u64,
        max_size: u64,
    ) -> Result<ParsedHeader<Self::Data>>;

    /// Whether elements with this ID contain child elements.
    fn is_parent(&self, id: ElementId) -> bool;

    /// Whether elements with this ID are padding.
    fn is_padding(&self, _id: ElementId) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct Node<D> {
    id: ElementId,
    start_offset: u64,
    header_size: u32,
    data_size: u64,
    size_unknown: bool,
    /// Exclusive upper bound the element and its siblings must stay under.
    bound: u64,
    parent: Option<NodeId>,
    /// `None` until materialized, then `Some(child)` / `Some(None)`.
    first_child: Option<Option<NodeId>>,
    next_sibling: Option<Option<NodeId>>,
    data: D,
}

/// A lazily materialized element tree.
#[derive(Debug)]
pub struct ElementTree<K: ElementKind> {
    kind: K,
    nodes: Vec<Node<K::Data>>,
}

impl<K: ElementKind> ElementTree<K> {
    /// Creates an empty tree with the given dialect strategy.
    pub fn new(kind: K) -> Self {
        Self { kind, nodes: Vec::new() }
    }

    /// The dialect strategy.
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Replaces the dialect strategy (used when header parsing refines the
    /// dialect limits, e.g. EBML maximum lengths).
    pub fn set_kind(&mut self, kind: K) {
        self.kind = kind;
    }

    /// Drops all nodes, keeping the strategy.
    pub fn reset(&mut self) {
        self.nodes.clear();
    }

    /// Parses the element starting at `start`, bounded by `end`, as a root
    /// node (no parent).
    pub fn parse_root<R: Read + Seek>(&mut self, io: &mut R, start: u64, end: u64) -> Result<NodeId> {
        if start >= end {
            return Err(Error::NoDataFound);
        }
        self.parse_at(io, start, end, None)
    }

    fn parse_at<R: Read + Seek>(
        &mut self,
        io: &mut R,
        start: u64,
        bound: u64,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let header = self.kind.read_header(io, start, bound - start)?;
        let node = Node {
            id: header.id,
            start_offset: start,
            header_size: header.header_size,
            data_size: header.data_size,
            size_unknown: header.size_unknown,
            bound,
            parent,
            first_child: None,
            next_sibling: None,
            data: header.data,
        };
        if node.start_offset + node.header_size as u64 + node.data_size > bound {
            return Err(Error::Truncated);
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    /// Element identifier.
    pub fn id(&self, node: NodeId) -> ElementId {
        self.nodes[node.0].id
    }

    /// Absolute offset of the element header.
    pub fn start_offset(&self, node: NodeId) -> u64 {
        self.nodes[node.0].start_offset
    }

    /// Size of the element header.
    pub fn header_size(&self, node: NodeId) -> u32 {
        self.nodes[node.0].header_size
    }

    /// Size of the element data.
    pub fn data_size(&self, node: NodeId) -> u64 {
        self.nodes[node.0].data_size
    }

    /// Whether the element's size was not denoted.
    pub fn size_unknown(&self, node: NodeId) -> bool {
        self.nodes[node.0].size_unknown
    }

    /// Header plus data size.
    pub fn total_size(&self, node: NodeId) -> u64 {
        let n = &self.nodes[node.0];
        n.header_size as u64 + n.data_size
    }

    /// Absolute offset of the element data.
    pub fn data_offset(&self, node: NodeId) -> u64 {
        let n = &self.nodes[node.0];
        n.start_offset + n.header_size as u64
    }

    /// Absolute offset just past the element.
    pub fn end_offset(&self, node: NodeId) -> u64 {
        self.data_offset(node) + self.nodes[node.0].data_size
    }

    /// The parent node.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Dialect-specific header data.
    pub fn data(&self, node: NodeId) -> &K::Data {
        &self.nodes[node.0].data
    }

    /// First child, materializing it on first access. `None` when the
    /// element is not a parent or has no room for children.
    pub fn first_child<R: Read + Seek>(&mut self, io: &mut R, node: NodeId) -> Result<Option<NodeId>> {
        if let Some(cached) = self.nodes[node.0].first_child {
            return Ok(cached);
        }
        let child = if self.kind.is_parent(self.nodes[node.0].id) {
            let start = self.data_offset(node);
            let end = self.end_offset(node);
            if start < end {
                Some(self.parse_at(io, start, end, Some(node))?)
            } else {
                None
            }
        } else {
            None
        };
        self.nodes[node.0].first_child = Some(child);
        Ok(child)
    }

    /// Next sibling, materializing it on first access. `None` once a
    /// sibling would start at or past the enclosing bound.
    pub fn next_sibling<R: Read + Seek>(&mut self, io: &mut R, node: NodeId) -> Result<Option<NodeId>> {
        if let Some(cached) = self.nodes[node.0].next_sibling {
            return Ok(cached);
        }
        let start = self.end_offset(node);
        let bound = self.nodes[node.0].bound;
        let parent = self.nodes[node.0].parent;
        let sibling = if start < bound {
            Some(self.parse_at(io, start, bound, parent)?)
        } else {
            None
        };
        self.nodes[node.0].next_sibling = Some(sibling);
        Ok(sibling)
    }

    /// First child with the given ID (linear scan; element trees are
    /// shallow and wide).
    pub fn child_by_id<R: Read + Seek>(
        &mut self,
        io: &mut R,
        node: NodeId,
        id: ElementId,
    ) -> Result<Option<NodeId>> {
        let mut current = self.first_child(io, node)?;
        while let Some(child) = current {
            if self.id(child) == id {
                return Ok(Some(child));
            }
            current = self.next_sibling(io, child)?;
        }
        Ok(None)
    }

    /// Next sibling with the given ID.
    pub fn sibling_by_id<R: Read + Seek>(
        &mut self,
        io: &mut R,
        node: NodeId,
        id: ElementId,
    ) -> Result<Option<NodeId>> {
        let mut current = self.next_sibling(io, node)?;
        while let Some(sibling) = current {
            if self.id(sibling) == id {
                return Ok(Some(sibling));
            }
            current = self.next_sibling(io, sibling)?;
        }
        Ok(None)
    }

    /// Parses the whole subtree below `node` and all its subsequent
    /// siblings, surfacing the first fatal error and accumulating the total
    /// size of padding elements.
    pub fn validate_subsequent<R: Read + Seek>(
        &mut self,
        io: &mut R,
        node: NodeId,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<u64> {
        let mut padding = 0u64;
        let mut current = Some(node);
        while let Some(n) = current {
            progress.check()?;
            if self.kind.is_padding(self.id(n)) {
                padding += self.total_size(n);
            }
            if self.size_unknown(n) {
                diag.warn(
                    format!(
                        "element 0x{:X} at {} has an unknown size, assuming it extends to the end of its parent",
                        self.id(n),
                        self.start_offset(n)
                    ),
                    "validating element structure",
                );
            }
            if let Some(child) = self.first_child(io, n)? {
                padding += self.validate_subsequent(io, child, diag, progress)?;
            }
            current = self.next_sibling(io, n)?;
        }
        Ok(padding)
    }

    /// Streams the element's bytes (header and data) to `out`.
    pub fn copy_entirely<R: Read + Seek, W: Write>(
        &self,
        io: &mut R,
        node: NodeId,
        out: &mut W,
        progress: &Progress,
    ) -> Result<()> {
        io.seek(SeekFrom::Start(self.start_offset(node)))?;
        io::copy_range(io, out, self.total_size(node), progress)
    }

    /// Captures the element's bytes (header and data) so they stay
    /// available after the underlying file is truncated for rewriting.
    pub fn make_buffer<R: Read + Seek>(&self, io: &mut R, node: NodeId) -> Result<Vec<u8>> {
        io::read_buffer(io, self.start_offset(node), self.total_size(node))
    }

    /// Writes a previously captured buffer to `out` (the counterpart of
    /// [`ElementTree::make_buffer`] when input and output alias).
    pub fn copy_buffer<W: Write>(buffer: &[u8], out: &mut W) -> Result<()> {
        out.write_all(buffer)?;
        Ok(())
    }
}

//! Parsing and rebuilding the Matroska `SeekHead`.

use crate::bufext::BufMut;
use crate::diag::Diagnostics;
use crate::ebml::{self, ids, EbmlTree};
use crate::error::Result;
use crate::tree::NodeId;
use crate::vint::{self, ElementId};
use std::io::{Read, Seek};

/// The seeking directory of a segment: `(element ID, offset)` pairs, the
/// offsets relative to the segment data start.
#[derive(Debug, Clone, Default)]
pub struct SeekInfo {
    entries: Vec<(ElementId, u64)>,
    /// Node the info was read from, so the rewrite can tell how much room
    /// the original directory occupied.
    source: Option<NodeId>,
}

impl SeekInfo {
    /// The `(element ID, offset)` pairs in file order.
    pub fn entries(&self) -> &[(ElementId, u64)] {
        &self.entries
    }

    /// The node of the `SeekHead` element this was parsed from.
    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    /// Resets to the initial state.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.source = None;
    }

    /// Parses a `SeekHead` element, appending to the current entries.
    pub fn parse<R: Read + Seek>(
        &mut self,
        io: &mut R,
        tree: &mut EbmlTree,
        node: NodeId,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let context = "parsing SeekHead";
        self.source = Some(node);
        let mut seek = tree.child_by_id(io, node, ids::SEEK)?;
        while let Some(seek_node) = seek {
            let mut id = None;
            let mut position = None;
            let mut child = tree.first_child(io, seek_node)?;
            while let Some(n) = child {
                match tree.id(n) {
                    ids::SEEK_ID => {
                        // the payload is the raw encoded ID of the target
                        let raw = ebml::read_uint(io, tree, n)?;
                        id = Some(raw as ElementId);
                    }
                    ids::SEEK_POSITION => position = Some(ebml::read_uint(io, tree, n)?),
                    _ => {}
                }
                child = tree.next_sibling(io, n)?;
            }
            match (id, position) {
                (Some(id), Some(position)) => self.entries.push((id, position)),
                _ => diag.warn("Seek entry without SeekID or SeekPosition", context),
            }
            seek = tree.sibling_by_id(io, seek_node, ids::SEEK)?;
        }
        Ok(())
    }

    /// Records `offset` for the `index`-th element with the given ID,
    /// updating the matching entry or appending a new one.
    ///
    /// Returns whether the serialized size of the directory changed, in
    /// which case the caller restarts its layout calculation.
    pub fn push(&mut self, index: usize, id: ElementId, offset: u64) -> bool {
        let mut current = 0;
        for entry in &mut self.entries {
            if entry.0 == id {
                if current == index {
                    let size_changed = vint::calculate_uinteger_length(entry.1)
                        != vint::calculate_uinteger_length(offset);
                    entry.1 = offset;
                    return size_changed;
                }
                current += 1;
            }
        }
        self.entries.push((id, offset));
        true
    }

    /// The offset recorded for the first entry with the given ID.
    pub fn offset_of(&self, id: ElementId) -> Option<u64> {
        self.entries.iter().find(|e| e.0 == id).map(|e| e.1)
    }

    fn entry_sizes(id: ElementId, offset: u64) -> (u64, u64, u64) {
        let id_payload = vint::calculate_id_length(id).unwrap_or(4) as u64;
        let position_payload = vint::calculate_uinteger_length(offset) as u64;
        // SeekID and SeekPosition carry two-byte IDs and one-byte sizes
        let seek_data = (2 + 1 + id_payload) + (2 + 1 + position_payload);
        (id_payload, position_payload, seek_data)
    }

    /// Total size of the `SeekHead` element as it would be written now
    /// (zero when there are no entries).
    pub fn actual_size(&self) -> u64 {
        if self.entries.is_empty() {
            return 0;
        }
        let data: u64 = self
            .entries
            .iter()
            .map(|&(id, offset)| {
                let (_, _, seek_data) = Self::entry_sizes(id, offset);
                2 + vint::calculate_size_length(seek_data) as u64 + seek_data
            })
            .sum();
        4 + vint::calculate_size_length(data) as u64 + data
    }

    /// Serializes the directory (nothing when there are no entries).
    pub fn make(&self, buf: &mut impl BufMut) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let data: u64 = self
            .entries
            .iter()
            .map(|&(id, offset)| {
                let (_, _, seek_data) = Self::entry_sizes(id, offset);
                2 + vint::calculate_size_length(seek_data) as u64 + seek_data
            })
            .sum();
        vint::make_id(ids::SEEK_HEAD, buf)?;
        vint::make_size(data, 0, buf)?;
        for &(id, offset) in &self.entries {
            let (id_payload, position_payload, seek_data) = Self::entry_sizes(id, offset);
            vint::make_id(ids::SEEK, buf)?;
            vint::make_size(seek_data, 0, buf)?;
            vint::make_id(ids::SEEK_ID, buf)?;
            vint::make_size(id_payload, 0, buf)?;
            buf.append_slice(&id.to_be_bytes()[(4 - id_payload as usize)..]);
            vint::make_id(ids::SEEK_POSITION, buf)?;
            vint::make_size(position_payload, 0, buf)?;
            buf.append_slice(&offset.to_be_bytes()[(8 - position_payload as usize)..]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::EbmlKind;
    use std::io::Cursor;

    #[test]
    fn push_updates_and_appends() {
        let mut info = SeekInfo::default();
        assert!(info.push(0, ids::SEGMENT_INFO, 0x20)); // new entry
        assert!(!info.push(0, ids::SEGMENT_INFO, 0x25)); // same length
        assert!(info.push(0, ids::SEGMENT_INFO, 0x100)); // longer offset
        assert!(info.push(0, ids::TRACKS, 0x200)); // new entry
        assert_eq!(info.entries().len(), 2);
        assert_eq!(info.offset_of(ids::SEGMENT_INFO), Some(0x100));
    }

    #[test]
    fn make_parse_round_trip() {
        let mut info = SeekInfo::default();
        info.push(0, ids::SEGMENT_INFO, 0x40);
        info.push(0, ids::TRACKS, 0x8F);
        info.push(0, ids::TAGS, 0x4321);
        info.push(0, ids::CLUSTER, 0x98_7654);
        let mut buf = Vec::new();
        info.make(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, info.actual_size());

        let mut io = Cursor::new(buf.clone());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(&mut io, 0, buf.len() as u64).unwrap();
        assert_eq!(tree.id(root), ids::SEEK_HEAD);
        let mut reread = SeekInfo::default();
        reread
            .parse(&mut io, &mut tree, root, &mut Diagnostics::new())
            .unwrap();
        assert_eq!(reread.entries(), info.entries());
    }
}

//! Parsing and updating the Matroska cue index.

use crate::bufext::BufMut;
use crate::diag::Diagnostics;
use crate::ebml::{self, ids, EbmlTree};
use crate::error::Result;
use crate::tree::NodeId;
use crate::vint::{self, ElementId};
use std::io::{Read, Seek};

/// An offset that is being rewritten: the value read from the file and the
/// value to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetState {
    /// Value read from the original file.
    pub initial: u64,
    /// Value the rewrite will store.
    pub current: u64,
}

impl OffsetState {
    fn new(initial: u64) -> Self {
        Self { initial, current: initial }
    }
}

/// The positions of one `CueTrackPositions` element.
#[derive(Debug, Clone)]
pub struct CueTrackPositions {
    /// The track the cue applies to.
    pub track: u64,
    /// Cluster position relative to the segment data start.
    pub cluster_position: OffsetState,
    /// Block position relative to the cluster data start.
    pub relative_position: Option<OffsetState>,
    /// Duration of the block.
    pub duration: Option<u64>,
    /// Block number within the cluster.
    pub block_number: Option<u64>,
    /// Codec state position.
    pub codec_state: Option<u64>,
    /// `CueRefTime` values of `CueReference` children.
    pub references: Vec<u64>,
}

/// One `CuePoint`: a timestamp and at least one track position.
#[derive(Debug, Clone)]
pub struct CuePoint {
    /// The cue timestamp.
    pub time: u64,
    /// Track positions for this timestamp.
    pub positions: Vec<CueTrackPositions>,
}

/// Parses a `Cues` element, shifts its cluster offsets while the rewrite
/// engine lays out the segment, and serializes the updated index.
#[derive(Debug, Clone, Default)]
pub struct CuePositionUpdater {
    /// All cue points in file order.
    pub cue_points: Vec<CuePoint>,
    parsed: bool,
}

impl CuePositionUpdater {
    /// Whether a `Cues` element has been parsed.
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Resets to the initial state.
    pub fn clear(&mut self) {
        self.cue_points.clear();
        self.parsed = false;
    }

    /// Parses the `Cues` element rooted at `node`.
    pub fn parse<R: Read + Seek>(
        &mut self,
        io: &mut R,
        tree: &mut EbmlTree,
        node: NodeId,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let context = "parsing Cues";
        self.clear();
        let mut cue_point = tree.child_by_id(io, node, ids::CUE_POINT)?;
        while let Some(point_node) = cue_point {
            let mut point = CuePoint { time: 0, positions: Vec::new() };
            let mut child = tree.first_child(io, point_node)?;
            while let Some(n) = child {
                match tree.id(n) {
                    ids::CUE_TIME => point.time = ebml::read_uint(io, tree, n)?,
                    ids::CUE_TRACK_POSITIONS => {
                        point.positions.push(Self::parse_positions(io, tree, n, diag)?);
                    }
                    ids::CRC32 | ids::VOID => {}
                    id => diag.info(
                        format!("ignoring element 0x{id:X} within CuePoint"),
                        context,
                    ),
                }
                child = tree.next_sibling(io, n)?;
            }
            if point.positions.is_empty() {
                diag.warn("CuePoint without CueTrackPositions", context);
            } else {
                self.cue_points.push(point);
            }
            cue_point = tree.sibling_by_id(io, point_node, ids::CUE_POINT)?;
        }
        self.parsed = true;
        Ok(())
    }

    fn parse_positions<R: Read + Seek>(
        io: &mut R,
        tree: &mut EbmlTree,
        node: NodeId,
        diag: &mut Diagnostics,
    ) -> Result<CueTrackPositions> {
        let mut positions = CueTrackPositions {
            track: 0,
            cluster_position: OffsetState::new(0),
            relative_position: None,
            duration: None,
            block_number: None,
            codec_state: None,
            references: Vec::new(),
        };
        let mut child = tree.first_child(io, node)?;
        while let Some(n) = child {
            match tree.id(n) {
                ids::CUE_TRACK => positions.track = ebml::read_uint(io, tree, n)?,
                ids::CUE_CLUSTER_POSITION => {
                    positions.cluster_position = OffsetState::new(ebml::read_uint(io, tree, n)?);
                }
                ids::CUE_RELATIVE_POSITION => {
                    positions.relative_position =
                        Some(OffsetState::new(ebml::read_uint(io, tree, n)?));
                }
                ids::CUE_DURATION => positions.duration = Some(ebml::read_uint(io, tree, n)?),
                ids::CUE_BLOCK_NUMBER => {
                    positions.block_number = Some(ebml::read_uint(io, tree, n)?)
                }
                ids::CUE_CODEC_STATE => {
                    positions.codec_state = Some(ebml::read_uint(io, tree, n)?)
                }
                ids::CUE_REFERENCE => {
                    if let Some(time) = tree.child_by_id(io, n, ids::CUE_REF_TIME)? {
                        positions.references.push(ebml::read_uint(io, tree, time)?);
                    }
                }
                ids::CRC32 | ids::VOID => {}
                id => diag.info(
                    format!("ignoring element 0x{id:X} within CueTrackPositions"),
                    "parsing Cues",
                ),
            }
            child = tree.next_sibling(io, n)?;
        }
        Ok(positions)
    }

    /// Updates every cluster position that was `original_offset` to
    /// `new_offset`. Returns whether the encoded length of any updated
    /// value changed (the caller must then recompute the index size).
    pub fn update_offsets(&mut self, original_offset: u64, new_offset: u64) -> bool {
        let mut size_changed = false;
        for point in &mut self.cue_points {
            for positions in &mut point.positions {
                if positions.cluster_position.initial == original_offset
                    && positions.cluster_position.current != new_offset
                {
                    size_changed |= vint::calculate_uinteger_length(
                        positions.cluster_position.current,
                    ) != vint::calculate_uinteger_length(new_offset);
                    positions.cluster_position.current = new_offset;
                }
            }
        }
        size_changed
    }

    /// Updates every relative position within the cluster that was at
    /// `reference_offset` from `original_relative` to `new_relative`.
    pub fn update_relative_offsets(
        &mut self,
        reference_offset: u64,
        original_relative: u64,
        new_relative: u64,
    ) -> bool {
        let mut size_changed = false;
        for point in &mut self.cue_points {
            for positions in &mut point.positions {
                if positions.cluster_position.initial != reference_offset {
                    continue;
                }
                if let Some(relative) = &mut positions.relative_position {
                    if relative.initial == original_relative && relative.current != new_relative {
                        size_changed |= vint::calculate_uinteger_length(relative.current)
                            != vint::calculate_uinteger_length(new_relative);
                        relative.current = new_relative;
                    }
                }
            }
        }
        size_changed
    }

    fn positions_data_size(positions: &CueTrackPositions) -> u64 {
        let mut size = uint_size(ids::CUE_TRACK, positions.track)
            + uint_size(ids::CUE_CLUSTER_POSITION, positions.cluster_position.current);
        if let Some(relative) = positions.relative_position {
            size += uint_size(ids::CUE_RELATIVE_POSITION, relative.current);
        }
        if let Some(duration) = positions.duration {
            size += uint_size(ids::CUE_DURATION, duration);
        }
        if let Some(block_number) = positions.block_number {
            size += uint_size(ids::CUE_BLOCK_NUMBER, block_number);
        }
        if let Some(codec_state) = positions.codec_state {
            size += uint_size(ids::CUE_CODEC_STATE, codec_state);
        }
        for &reference in &positions.references {
            let inner = uint_size(ids::CUE_REF_TIME, reference);
            size += 1 + vint::calculate_size_length(inner) as u64 + inner;
        }
        size
    }

    fn point_data_size(point: &CuePoint) -> u64 {
        let mut size = uint_size(ids::CUE_TIME, point.time);
        for positions in &point.positions {
            let inner = Self::positions_data_size(positions);
            size += 1 + vint::calculate_size_length(inner) as u64 + inner;
        }
        size
    }

    fn data_size(&self) -> u64 {
        self.cue_points
            .iter()
            .map(|point| {
                let inner = Self::point_data_size(point);
                1 + vint::calculate_size_length(inner) as u64 + inner
            })
            .sum()
    }

    /// Total size of the `Cues` element as it would be written now.
    pub fn total_size(&self) -> u64 {
        if !self.parsed || self.cue_points.is_empty() {
            return 0;
        }
        let data = self.data_size();
        4 + vint::calculate_size_length(data) as u64 + data
    }

    /// Serializes the updated `Cues` element.
    pub fn make(&self, buf: &mut impl BufMut) -> Result<()> {
        if !self.parsed || self.cue_points.is_empty() {
            return Ok(());
        }
        vint::make_id(ids::CUES, buf)?;
        vint::make_size(self.data_size(), 0, buf)?;
        for point in &self.cue_points {
            vint::make_id(ids::CUE_POINT, buf)?;
            vint::make_size(Self::point_data_size(point), 0, buf)?;
            ebml::make_uint_element(ids::CUE_TIME, point.time, buf)?;
            for positions in &point.positions {
                vint::make_id(ids::CUE_TRACK_POSITIONS, buf)?;
                vint::make_size(Self::positions_data_size(positions), 0, buf)?;
                ebml::make_uint_element(ids::CUE_TRACK, positions.track, buf)?;
                ebml::make_uint_element(
                    ids::CUE_CLUSTER_POSITION,
                    positions.cluster_position.current,
                    buf,
                )?;
                if let Some(relative) = positions.relative_position {
                    ebml::make_uint_element(ids::CUE_RELATIVE_POSITION, relative.current, buf)?;
                }
                if let Some(duration) = positions.duration {
                    ebml::make_uint_element(ids::CUE_DURATION, duration, buf)?;
                }
                if let Some(block_number) = positions.block_number {
                    ebml::make_uint_element(ids::CUE_BLOCK_NUMBER, block_number, buf)?;
                }
                if let Some(codec_state) = positions.codec_state {
                    ebml::make_uint_element(ids::CUE_CODEC_STATE, codec_state, buf)?;
                }
                for &reference in &positions.references {
                    vint::make_id(ids::CUE_REFERENCE, buf)?;
                    vint::make_size(uint_size(ids::CUE_REF_TIME, reference), 0, buf)?;
                    ebml::make_uint_element(ids::CUE_REF_TIME, reference, buf)?;
                }
            }
        }
        Ok(())
    }
}

fn uint_size(id: ElementId, value: u64) -> u64 {
    let data = vint::calculate_uinteger_length(value) as u64;
    let id_length = match vint::calculate_id_length(id) {
        Ok(length) => length as u64,
        Err(_) => 0,
    };
    id_length + vint::calculate_size_length(data) as u64 + data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::EbmlKind;
    use std::io::Cursor;

    fn sample_cues() -> Vec<u8> {
        let mut buf = Vec::new();
        let updater = CuePositionUpdater {
            cue_points: vec![
                CuePoint {
                    time: 0,
                    positions: vec![CueTrackPositions {
                        track: 1,
                        cluster_position: OffsetState::new(0x100),
                        relative_position: Some(OffsetState::new(7)),
                        duration: None,
                        block_number: Some(1),
                        codec_state: None,
                        references: Vec::new(),
                    }],
                },
                CuePoint {
                    time: 5000,
                    positions: vec![CueTrackPositions {
                        track: 1,
                        cluster_position: OffsetState::new(0x2000),
                        relative_position: None,
                        duration: Some(40),
                        block_number: None,
                        codec_state: None,
                        references: Vec::new(),
                    }],
                },
            ],
            parsed: true,
        };
        updater.make(&mut buf).unwrap();
        buf
    }

    #[test]
    fn parse_make_round_trip() {
        let bytes = sample_cues();
        let mut io = Cursor::new(bytes.clone());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(&mut io, 0, bytes.len() as u64).unwrap();
        assert_eq!(tree.id(root), ids::CUES);
        let mut updater = CuePositionUpdater::default();
        updater.parse(&mut io, &mut tree, root, &mut Diagnostics::new()).unwrap();
        assert_eq!(updater.cue_points.len(), 2);
        assert_eq!(updater.cue_points[0].positions[0].cluster_position.initial, 0x100);
        assert_eq!(updater.total_size() as usize, bytes.len());
        let mut rewritten = Vec::new();
        updater.make(&mut rewritten).unwrap();
        assert_eq!(rewritten, bytes);
    }

    #[test]
    fn offset_updates_report_size_changes() {
        let bytes = sample_cues();
        let mut io = Cursor::new(bytes.clone());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(&mut io, 0, bytes.len() as u64).unwrap();
        let mut updater = CuePositionUpdater::default();
        updater.parse(&mut io, &mut tree, root, &mut Diagnostics::new()).unwrap();
        // same length: no size change
        assert!(!updater.update_offsets(0x100, 0x180));
        // one byte to two bytes: size change
        assert!(updater.update_offsets(0x2000, 0x2_0000));
        assert_eq!(updater.cue_points[1].positions[0].cluster_position.current, 0x2_0000);
        // updating a second time against the initial offset still works
        assert!(!updater.update_offsets(0x2000, 0x2_0001));
        let mut rewritten = Vec::new();
        updater.make(&mut rewritten).unwrap();
        assert_eq!(rewritten.len() as u64, updater.total_size());
        assert_ne!(rewritten, bytes);
    }
}

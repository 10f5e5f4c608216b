//! The Matroska container driver: segment scanning, the five parse
//! phases and the rewrite engine.

use crate::attachment::{Attachment, StreamProvider};
use crate::chapter::Edition;
use crate::config::{ElementPosition, MediaFileConfig, MediaFileFlags};
use crate::diag::Diagnostics;
use crate::ebml::{self, ids, EbmlHeader, EbmlKind, EbmlTree};
use crate::error::{Error, Result};
use crate::matroska::attachment::{attached_file_size, make_attached_file, parse_attached_file};
use crate::matroska::chapter::parse_edition_entry;
use crate::matroska::cues::CuePositionUpdater;
use crate::matroska::seekinfo::SeekInfo;
use crate::matroska::tag::MatroskaTag;
use crate::matroska::track::parse_track_entry;
use crate::progress::Progress;
use crate::track::Track;
use crate::tree::NodeId;
use crate::vint;
use std::io::{Read, Seek, SeekFrom, Write};

const APP_INFO: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// A CRC-32 element the rewrite wrote with a placeholder value.
///
/// `element_offset` is the absolute offset of the CRC-32 element in the
/// output; `covered_size` the number of bytes after it the checksum covers.
#[derive(Debug, Clone, Copy)]
pub struct CrcPatch {
    /// Offset of the CRC-32 element header.
    pub element_offset: u64,
    /// Bytes covered, starting right after the CRC-32 element.
    pub covered_size: u64,
}

/// How a save is carried out.
#[derive(Debug)]
pub enum SavePlan {
    /// The file already stores exactly what would be written.
    NoChange,
    /// The new metadata fits into the existing region; only that region is
    /// patched.
    InPlace(InPlacePatch),
    /// The whole file is rewritten.
    Rewrite,
}

/// An in-place patch of the tag region.
#[derive(Debug)]
pub struct InPlacePatch {
    /// Absolute offset of the region being replaced.
    pub region_offset: u64,
    /// Size of the region being replaced.
    pub region_size: u64,
    /// Replacement bytes; the remainder of the region becomes padding.
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct SegmentRecord {
    node: Option<NodeId>,
    info_nodes: Vec<NodeId>,
    tracks_nodes: Vec<NodeId>,
    tags_nodes: Vec<NodeId>,
    chapters_nodes: Vec<NodeId>,
    attachments_nodes: Vec<NodeId>,
    cues_nodes: Vec<NodeId>,
    has_crc32: bool,
}

/// The parsed state of a Matroska/WebM file.
#[derive(Debug, Default)]
pub struct MatroskaContainer {
    tree: Option<EbmlTree>,
    root: Option<NodeId>,
    /// The parsed EBML document header.
    pub ebml_header: EbmlHeader,
    segments: Vec<SegmentRecord>,
    /// Aggregated seeking directory of the first segment.
    pub seek_info: SeekInfo,
    /// TimestampScale of the first segment.
    pub timestamp_scale: u64,
    /// Raw Duration value of the first segment.
    pub duration: f64,
    /// MuxingApp of the first segment.
    pub muxing_app: String,
    /// WritingApp of the first segment.
    pub writing_app: String,
    /// Per-segment titles.
    pub titles: Vec<String>,
    /// Parsed tags.
    pub tags: Vec<MatroskaTag>,
    /// Parsed tracks.
    pub tracks: Vec<Track>,
    /// Parsed editions with their chapters.
    pub editions: Vec<Edition>,
    /// Parsed attachments.
    pub attachments: Vec<Attachment>,
    file_size: u64,
}

impl MatroskaContainer {
    /// Creates an unparsed container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all parsed state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// DocType of the document ("matroska" or "webm").
    pub fn doc_type(&self) -> &str {
        &self.ebml_header.doc_type
    }

    /// Duration of the first segment in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.duration * self.timestamp_scale as f64 / 1_000_000_000.0
    }

    /// Parses the EBML header and scans the top level of every segment,
    /// recording the offsets of the metadata elements.
    pub fn parse_header<R: Read + Seek>(
        &mut self,
        io: &mut R,
        file_size: u64,
        config: &MediaFileConfig,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        let context = "parsing Matroska header";
        self.reset();
        self.file_size = file_size;
        self.timestamp_scale = 1_000_000;
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(io, 0, file_size)?;
        if tree.id(root) != ids::HEADER {
            return Err(Error::Invalid("not an EBML document"));
        }
        self.ebml_header = EbmlHeader::parse(io, &mut tree, root)?;
        tree.set_kind(self.ebml_header.kind());
        self.root = Some(root);

        let mut level0 = Some(root);
        while let Some(node) = level0 {
            progress.check()?;
            match tree.id(node) {
                ids::HEADER | ids::VOID | ids::CRC32 => {}
                ids::SEGMENT => {
                    self.scan_segment(io, &mut tree, node, config, diag, progress)?;
                }
                id => diag.warn(
                    format!("unknown top-level element 0x{id:X} at {}", tree.start_offset(node)),
                    context,
                ),
            }
            level0 = tree.next_sibling(io, node)?;
        }
        if self.segments.is_empty() {
            diag.critical("no segment found", context);
            return Err(Error::NoDataFound);
        }
        self.tree = Some(tree);
        Ok(())
    }

    fn scan_segment<R: Read + Seek>(
        &mut self,
        io: &mut R,
        tree: &mut EbmlTree,
        segment: NodeId,
        config: &MediaFileConfig,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        let context = "parsing Matroska header";
        let first_segment = self.segments.is_empty();
        let mut record = SegmentRecord { node: Some(segment), ..SegmentRecord::default() };
        let segment_data = tree.data_offset(segment);
        let segment_end = tree.end_offset(segment);
        let mut title = String::new();
        let mut child = tree.first_child(io, segment)?;
        record.has_crc32 = child.map(|n| tree.id(n) == ids::CRC32).unwrap_or(false);
        while let Some(node) = child {
            progress.check()?;
            match tree.id(node) {
                ids::SEEK_HEAD => {
                    if first_segment {
                        if !self.seek_info.entries().is_empty() {
                            diag.warn("segment carries more than one SeekHead", context);
                        }
                        self.seek_info.parse(io, tree, node, diag)?;
                    }
                }
                ids::SEGMENT_INFO => {
                    record.info_nodes.push(node);
                    self.parse_segment_info(io, tree, node, first_segment, &mut title)?;
                }
                ids::TRACKS => record.tracks_nodes.push(node),
                ids::TAGS => record.tags_nodes.push(node),
                ids::CHAPTERS => record.chapters_nodes.push(node),
                ids::ATTACHMENTS => record.attachments_nodes.push(node),
                ids::CUES => record.cues_nodes.push(node),
                ids::CLUSTER => {
                    let metadata_located =
                        !record.tracks_nodes.is_empty() && !record.tags_nodes.is_empty();
                    let oversized = self.file_size > config.max_full_parse_size;
                    let force = config.flags.contains(MediaFileFlags::FORCE_FULL_PARSE);
                    if !force && (metadata_located || oversized) {
                        // pick up whatever the SeekHead advertises beyond
                        // this point, then stop walking clusters
                        self.resolve_seek_entries(
                            io,
                            tree,
                            &mut record,
                            segment_data,
                            segment_end,
                            diag,
                        )?;
                        break;
                    }
                }
                ids::VOID | ids::CRC32 => {}
                id => diag.info(
                    format!("ignoring element 0x{id:X} within Segment"), context),
            }
            child = tree.next_sibling(io, node)?;
        }
        self.titles.push(title);
        self.segments.push(record);
        Ok(())
    }

    fn parse_segment_info<R: Read + Seek>(
        &mut self,
        io: &mut R,
        tree: &mut EbmlTree,
        node: NodeId,
        first_segment: bool,
        title: &mut String,
    ) -> Result<()> {
        let mut child = tree.first_child(io, node)?;
        while let Some(n) = child {
            match tree.id(n) {
                ids::TIMESTAMP_SCALE if first_segment => {
                    self.timestamp_scale = ebml::read_uint(io, tree, n)?;
                }
                ids::DURATION if first_segment => {
                    self.duration = ebml::read_float(io, tree, n)?;
                }
                ids::MUXING_APP if first_segment => {
                    self.muxing_app = ebml::read_string(io, tree, n)?;
                }
                ids::WRITING_APP if first_segment => {
                    self.writing_app = ebml::read_string(io, tree, n)?;
                }
                ids::TITLE => *title = ebml::read_string(io, tree, n)?,
                _ => {}
            }
            child = tree.next_sibling(io, n)?;
        }
        Ok(())
    }

    /// Materializes elements the SeekHead advertises but the partial scan
    /// did not reach, cross-checking entries against what was seen.
    fn resolve_seek_entries<R: Read + Seek>(
        &mut self,
        io: &mut R,
        tree: &mut EbmlTree,
        record: &mut SegmentRecord,
        segment_data: u64,
        segment_end: u64,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let context = "resolving SeekHead entries";
        let entries: Vec<_> = self.seek_info.entries().to_vec();
        for (id, offset) in entries {
            let absolute = segment_data + offset;
            if absolute >= segment_end {
                diag.warn(
                    format!("SeekHead entry for 0x{id:X} points past the segment"),
                    context,
                );
                continue;
            }
            let list = match id {
                ids::TAGS => &mut record.tags_nodes,
                ids::ATTACHMENTS => &mut record.attachments_nodes,
                ids::CHAPTERS => &mut record.chapters_nodes,
                ids::CUES => &mut record.cues_nodes,
                ids::TRACKS => &mut record.tracks_nodes,
                _ => continue,
            };
            if list.iter().any(|&n| tree.start_offset(n) == absolute) {
                continue;
            }
            let node = match tree.parse_root(io, absolute, segment_end) {
                Ok(node) => node,
                Err(_) => {
                    diag.warn(
                        format!("SeekHead entry for 0x{id:X} does not point at a parsable element"),
                        context,
                    );
                    continue;
                }
            };
            if tree.id(node) != id {
                diag.warn(
                    format!(
                        "SeekHead advertises 0x{id:X} at offset {offset} but 0x{:X} was found",
                        tree.id(node)
                    ),
                    context,
                );
                continue;
            }
            list.push(node);
        }
        Ok(())
    }

    /// Parses all track entries.
    pub fn parse_tracks<R: Read + Seek>(
        &mut self,
        io: &mut R,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        progress.check()?;
        let mut tree = self.tree.take().ok_or(Error::NoDataFound)?;
        self.tracks.clear();
        let result = (|| {
            for segment_index in 0..self.segments.len() {
                for node_index in 0..self.segments[segment_index].tracks_nodes.len() {
                    let node = self.segments[segment_index].tracks_nodes[node_index];
                    let mut entry = tree.child_by_id(io, node, ids::TRACK_ENTRY)?;
                    while let Some(n) = entry {
                        self.tracks.push(parse_track_entry(io, &mut tree, n, diag)?);
                        entry = tree.sibling_by_id(io, n, ids::TRACK_ENTRY)?;
                    }
                }
            }
            Ok(())
        })();
        self.tree = Some(tree);
        result
    }

    /// Parses all tags.
    pub fn parse_tags<R: Read + Seek>(
        &mut self,
        io: &mut R,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        progress.check()?;
        let mut tree = self.tree.take().ok_or(Error::NoDataFound)?;
        self.tags.clear();
        let result = (|| {
            for segment_index in 0..self.segments.len() {
                for node_index in 0..self.segments[segment_index].tags_nodes.len() {
                    let node = self.segments[segment_index].tags_nodes[node_index];
                    let mut entry = tree.child_by_id(io, node, ids::TAG)?;
                    while let Some(n) = entry {
                        let tag = MatroskaTag::parse(io, &mut tree, n, diag)?;
                        if tag.base().field_count() != 0 {
                            self.tags.push(tag);
                        }
                        entry = tree.sibling_by_id(io, n, ids::TAG)?;
                    }
                }
            }
            Ok(())
        })();
        self.tree = Some(tree);
        result
    }

    /// Parses all chapter editions.
    pub fn parse_chapters<R: Read + Seek>(
        &mut self,
        io: &mut R,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        progress.check()?;
        let mut tree = self.tree.take().ok_or(Error::NoDataFound)?;
        self.editions.clear();
        let result = (|| {
            for segment_index in 0..self.segments.len() {
                for node_index in 0..self.segments[segment_index].chapters_nodes.len() {
                    let node = self.segments[segment_index].chapters_nodes[node_index];
                    let mut entry = tree.child_by_id(io, node, ids::EDITION_ENTRY)?;
                    while let Some(n) = entry {
                        self.editions.push(parse_edition_entry(io, &mut tree, n, diag)?);
                        entry = tree.sibling_by_id(io, n, ids::EDITION_ENTRY)?;
                    }
                }
            }
            Ok(())
        })();
        self.tree = Some(tree);
        result
    }

    /// Parses all attachments; their payloads stay lazy against
    /// `provider`.
    pub fn parse_attachments<R: Read + Seek>(
        &mut self,
        io: &mut R,
        provider: &StreamProvider,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        progress.check()?;
        let mut tree = self.tree.take().ok_or(Error::NoDataFound)?;
        self.attachments.clear();
        let result = (|| {
            for segment_index in 0..self.segments.len() {
                for node_index in 0..self.segments[segment_index].attachments_nodes.len() {
                    let node = self.segments[segment_index].attachments_nodes[node_index];
                    let mut entry = tree.child_by_id(io, node, ids::ATTACHED_FILE)?;
                    while let Some(n) = entry {
                        self.attachments
                            .push(parse_attached_file(io, &mut tree, n, provider, diag)?);
                        entry = tree.sibling_by_id(io, n, ids::ATTACHED_FILE)?;
                    }
                }
            }
            Ok(())
        })();
        self.tree = Some(tree);
        result
    }

    /// Generates a UID not yet used by any attachment: a bounded
    /// pseudo-random probe first, then a linear scan that always succeeds.
    pub fn next_attachment_id(&mut self, diag: &mut Diagnostics) -> u64 {
        let used: Vec<u64> = self.attachments.iter().map(|a| a.id).collect();
        let mut state = 0x9E37_79B9_7F4A_7C15u64 ^ ((used.len() as u64) << 32);
        for _ in 0..0xFF {
            // xorshift
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            if state != 0 && !used.contains(&state) {
                return state;
            }
        }
        diag.info(
            "random attachment UIDs kept colliding, falling back to a counter",
            "creating attachment",
        );
        (1..).find(|id| !used.contains(id)).unwrap_or(u64::MAX)
    }

    /// Validates the cue index and the cluster back-references, recording
    /// violations as warnings.
    pub fn validate_index<R: Read + Seek>(
        &mut self,
        io: &mut R,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        let context = "validating Matroska index";
        let mut tree = self.tree.take().ok_or(Error::NoDataFound)?;
        let segments = self.segments.clone();
        let result = (|| {
            for record in &segments {
                let Some(segment) = record.node else { continue };
                let segment_data = tree.data_offset(segment);
                let segment_end = tree.end_offset(segment);
                for &cues_node in &record.cues_nodes {
                    let mut updater = CuePositionUpdater::default();
                    updater.parse(io, &mut tree, cues_node, diag)?;
                    for point in &updater.cue_points {
                        progress.check()?;
                        for positions in &point.positions {
                            let cluster_offset =
                                segment_data + positions.cluster_position.initial;
                            let cluster = match tree.parse_root(io, cluster_offset, segment_end) {
                                Ok(node) if tree.id(node) == ids::CLUSTER => node,
                                _ => {
                                    diag.warn(
                                        format!(
                                            "CueClusterPosition {} does not point at a Cluster",
                                            positions.cluster_position.initial
                                        ),
                                        context,
                                    );
                                    continue;
                                }
                            };
                            if let Some(relative) = positions.relative_position {
                                let target = tree.data_offset(cluster) + relative.initial;
                                if !Self::offset_is_block(io, &mut tree, cluster, target)? {
                                    diag.warn(
                                        format!(
                                            "CueRelativePosition {} does not land on a block",
                                            relative.initial
                                        ),
                                        context,
                                    );
                                }
                            }
                        }
                    }
                }
                // cluster self-references
                let mut previous_size: Option<u64> = None;
                let mut cluster = tree.child_by_id(io, segment, ids::CLUSTER)?;
                while let Some(node) = cluster {
                    progress.check()?;
                    let expected_position = tree.start_offset(node) - segment_data;
                    if let Some(position_node) = tree.child_by_id(io, node, ids::POSITION)? {
                        let stored = ebml::read_uint(io, &tree, position_node)?;
                        if stored != expected_position {
                            diag.warn(
                                format!(
                                    "Cluster Position {stored} differs from the actual offset {expected_position}"
                                ),
                                context,
                            );
                        }
                    }
                    if let Some(prev_node) = tree.child_by_id(io, node, ids::PREV_SIZE)? {
                        let stored = ebml::read_uint(io, &tree, prev_node)?;
                        let expected = previous_size.unwrap_or(0);
                        if stored != expected {
                            diag.warn(
                                format!(
                                    "Cluster PrevSize {stored} differs from the previous cluster's size {expected}"
                                ),
                                context,
                            );
                        }
                    }
                    previous_size = Some(tree.total_size(node));
                    cluster = tree.sibling_by_id(io, node, ids::CLUSTER)?;
                }
            }
            Ok(())
        })();
        self.tree = Some(tree);
        result
    }

    fn offset_is_block<R: Read + Seek>(
        io: &mut R,
        tree: &mut EbmlTree,
        cluster: NodeId,
        target: u64,
    ) -> Result<bool> {
        let mut child = tree.first_child(io, cluster)?;
        while let Some(node) = child {
            let start = tree.start_offset(node);
            if start == target {
                return Ok(matches!(
                    tree.id(node),
                    ids::SIMPLE_BLOCK | ids::BLOCK | ids::BLOCK_GROUP
                ));
            }
            if start > target {
                return Ok(false);
            }
            child = tree.next_sibling(io, node)?;
        }
        Ok(false)
    }

    fn serialize_tags(&self, diag: &mut Diagnostics) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        for tag in &self.tags {
            let bytes = tag.make_element(diag)?;
            if !bytes.is_empty() {
                out.push(bytes);
            }
        }
        Ok(out)
    }

    /// Decides how the pending changes can be carried out.
    pub fn plan_save<R: Read + Seek>(
        &mut self,
        io: &mut R,
        config: &MediaFileConfig,
        diag: &mut Diagnostics,
    ) -> Result<SavePlan> {
        let tag_bytes = self.serialize_tags(diag)?;
        let tags_data_size: u64 = tag_bytes.iter().map(|b| b.len() as u64).sum();
        let have_attachments = self.attachments.iter().any(|a| !a.ignored && !a.is_empty());

        if config.flags.contains(MediaFileFlags::FORCE_REWRITE) {
            return Ok(SavePlan::Rewrite);
        }
        let mut tree = self.tree.take().ok_or(Error::NoDataFound)?;
        let plan = self.plan_save_inner(
            io,
            &mut tree,
            config,
            tag_bytes,
            tags_data_size,
            have_attachments,
        );
        self.tree = Some(tree);
        plan
    }

    fn plan_save_inner<R: Read + Seek>(
        &mut self,
        io: &mut R,
        tree: &mut EbmlTree,
        config: &MediaFileConfig,
        tag_bytes: Vec<Vec<u8>>,
        tags_data_size: u64,
        have_attachments: bool,
    ) -> Result<SavePlan> {
        // tags or attachments in a segment other than the first force a
        // rewrite (they are consolidated into the first segment)
        for record in self.segments.iter().skip(1) {
            if !record.tags_nodes.is_empty() || !record.attachments_nodes.is_empty() {
                return Ok(SavePlan::Rewrite);
            }
        }
        if config.flags.contains(MediaFileFlags::FORCE_TAG_POSITION)
            || config.flags.contains(MediaFileFlags::FORCE_INDEX_POSITION)
        {
            // the current layout cannot be proven to match the requested
            // positions without a full layout pass
            if config.tag_position != ElementPosition::Keep
                || config.index_position != ElementPosition::Keep
            {
                return Ok(SavePlan::Rewrite);
            }
        }
        let record = self.segments.first().cloned().unwrap_or_default();
        if have_attachments || !record.attachments_nodes.is_empty() {
            // attachment edits always relayout the segment
            return Ok(SavePlan::Rewrite);
        }
        // the region the new tags have to fit into: the existing Tags
        // element plus any directly following padding
        let region = match record.tags_nodes.first() {
            Some(&node) => {
                let start = tree.start_offset(node);
                let mut end = tree.end_offset(node);
                let mut sibling = tree.next_sibling(io, node)?;
                while let Some(n) = sibling {
                    if tree.id(n) != ids::VOID {
                        break;
                    }
                    end = tree.end_offset(n);
                    sibling = tree.next_sibling(io, n)?;
                }
                Some((start, end - start))
            }
            None => None,
        };
        let new_bytes = if tags_data_size == 0 {
            Vec::new()
        } else {
            let mut out = Vec::new();
            vint::make_id(ids::TAGS, &mut out)?;
            vint::make_size(tags_data_size, 0, &mut out)?;
            for bytes in &tag_bytes {
                out.extend_from_slice(bytes);
            }
            out
        };
        match region {
            None if new_bytes.is_empty() => Ok(SavePlan::NoChange),
            None => Ok(SavePlan::Rewrite),
            Some((offset, size)) => {
                if new_bytes.len() as u64 <= size {
                    let remainder = size - new_bytes.len() as u64;
                    // byte-identical content needs no write at all
                    if remainder == 0 {
                        let existing = crate::io::read_buffer(io, offset, size)?;
                        if existing == new_bytes {
                            return Ok(SavePlan::NoChange);
                        }
                    }
                    // the leftover space must be expressible as a Void
                    // element and acceptable as padding; a segment-level
                    // CRC-32 would be invalidated by a spot write
                    if !record.has_crc32
                        && (remainder == 0
                            || (remainder >= 2
                                && remainder >= config.min_padding
                                && remainder <= config.max_padding))
                    {
                        return Ok(SavePlan::InPlace(InPlacePatch {
                            region_offset: offset,
                            region_size: size,
                            bytes: new_bytes,
                        }));
                    }
                }
                Ok(SavePlan::Rewrite)
            }
        }
    }

    /// Applies an in-place patch produced by [`MatroskaContainer::plan_save`]:
    /// the new bytes followed by padding filling the region.
    pub fn apply_in_place<S: Read + Write + Seek>(
        &mut self,
        io: &mut S,
        patch: &InPlacePatch,
    ) -> Result<()> {
        io.seek(SeekFrom::Start(patch.region_offset))?;
        io.write_all(&patch.bytes)?;
        let remainder = patch.region_size - patch.bytes.len() as u64;
        if remainder > 0 {
            let mut void = Vec::new();
            ebml::make_void(remainder, &mut void)?;
            io.write_all(&void)?;
        }
        io.flush()?;
        Ok(())
    }

    /// Rewrites the whole file: every segment is laid out afresh, metadata
    /// consolidated per the configured positions, clusters streamed
    /// through with their `Position` elements rewritten.
    ///
    /// Returns the CRC-32 elements that still need patching once the
    /// output is on disk.
    pub fn make_file<R: Read + Seek, W: Write + Seek>(
        &mut self,
        input: &mut R,
        output: &mut W,
        config: &MediaFileConfig,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<Vec<CrcPatch>> {
        let context = "making Matroska container";
        progress.status("Calculating element sizes ...");
        let mut tree = self.tree.take().ok_or(Error::NoDataFound)?;
        let result = self.make_file_inner(input, output, &mut tree, config, diag, progress);
        self.tree = Some(tree);
        if result.is_err() {
            diag.critical("rewriting the file failed", context);
        }
        result
    }

    fn make_file_inner<R: Read + Seek, W: Write + Seek>(
        &mut self,
        input: &mut R,
        output: &mut W,
        tree: &mut EbmlTree,
        config: &MediaFileConfig,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<Vec<CrcPatch>> {
        let context = "making Matroska container";
        let tag_bytes = self.serialize_tags(diag)?;
        let tags_data_size: u64 = tag_bytes.iter().map(|b| b.len() as u64).sum();
        let tags_size = if tags_data_size != 0 {
            4 + vint::calculate_size_length(tags_data_size) as u64 + tags_data_size
        } else {
            0
        };
        let mut attachments_data_size = 0u64;
        for attachment in &self.attachments {
            if attachment.ignored || attachment.is_empty() {
                continue;
            }
            attachments_data_size += attached_file_size(attachment)?;
        }
        let attachments_size = if attachments_data_size != 0 {
            4 + vint::calculate_size_length(attachments_data_size) as u64 + attachments_data_size
        } else {
            0
        };
        let tags_before_data = config.tag_position != ElementPosition::AfterData;

        // the EBML document header is rewritten from the parsed values
        let mut ebml_bytes = Vec::new();
        self.ebml_header.make(&mut ebml_bytes)?;

        let mut crc_patches = Vec::new();
        let mut current_offset = 0u64; // cumulative segment-data write offset
        let segment_count = self.segments.len();
        let segments = self.segments.clone();

        output.write_all(&ebml_bytes)?;

        // non-segment top-level elements (besides header, padding and
        // checksums) are copied through in their original order
        let mut level0 = self.root;
        let mut pending_unknown: Vec<NodeId> = Vec::new();
        while let Some(node) = level0 {
            match tree.id(node) {
                ids::HEADER | ids::SEGMENT | ids::VOID | ids::CRC32 => {}
                id => {
                    diag.warn(
                        format!("copying unknown top-level element 0x{id:X} as it is"),
                        context,
                    );
                    pending_unknown.push(node);
                }
            }
            level0 = tree.next_sibling(input, node)?;
        }

        for (segment_index, record) in segments.iter().enumerate() {
            progress.check()?;
            let Some(segment) = record.node else { continue };
            let segment_data = tree.data_offset(segment);
            let is_first = segment_index == 0;
            let is_last = segment_index == segment_count - 1;
            let write_tags_here = tags_before_data && is_first || !tags_before_data && is_last;

            // parse the cue index of this segment
            let mut cues = CuePositionUpdater::default();
            if let Some(&cues_node) = record.cues_nodes.first() {
                cues.parse(input, tree, cues_node, diag)?;
            }
            let has_crc = record.has_crc32;
            let mut seek_info = SeekInfo::default();

            // fixed point: offsets written into the SeekHead and Cues
            // depend on the sizes being computed here
            let mut segment_info_data_size = 0u64;
            let mut cluster_sizes: Vec<u64> = Vec::new();
            let mut element_size;
            'calc: loop {
                element_size = if has_crc { 6 } else { 0 };
                element_size += seek_info.actual_size();
                // SegmentInfo
                let mut index = 0;
                let mut restart = false;
                for &info_node in &record.info_nodes {
                    if seek_info.push(index, ids::SEGMENT_INFO, current_offset + element_size) {
                        restart = true;
                        break;
                    }
                    segment_info_data_size =
                        self.segment_info_size(input, tree, info_node, segment_index, config)?;
                    element_size += 4
                        + vint::calculate_size_length(segment_info_data_size) as u64
                        + segment_info_data_size;
                    index += 1;
                }
                if restart {
                    continue 'calc;
                }
                // Tracks and Chapters are copied as they are
                for (id, nodes) in [
                    (ids::TRACKS, &record.tracks_nodes),
                    (ids::CHAPTERS, &record.chapters_nodes),
                ] {
                    for (index, &node) in nodes.iter().enumerate() {
                        if seek_info.push(index, id, current_offset + element_size) {
                            restart = true;
                            break;
                        }
                        element_size += tree.total_size(node);
                    }
                    if restart {
                        break;
                    }
                }
                if restart {
                    continue 'calc;
                }
                if write_tags_here && tags_before_data {
                    if tags_size != 0 {
                        if seek_info.push(0, ids::TAGS, current_offset + element_size) {
                            continue 'calc;
                        }
                        element_size += tags_size;
                    }
                    if attachments_size != 0 {
                        if seek_info.push(0, ids::ATTACHMENTS, current_offset + element_size) {
                            continue 'calc;
                        }
                        element_size += attachments_size;
                    }
                }
                // Cues and clusters: cue offsets depend on the cluster
                // layout which depends on the size of the Cues element
                let cues_offset = element_size;
                if cues.is_parsed() {
                    if seek_info.push(0, ids::CUES, current_offset + element_size) {
                        continue 'calc;
                    }
                }
                'cues_size: loop {
                    let mut running = cues_offset;
                    if cues.is_parsed() {
                        running += cues.total_size();
                    }
                    cluster_sizes.clear();
                    let mut previous_cluster_total = 0u64;
                    let mut cluster = tree.child_by_id(input, segment, ids::CLUSTER)?;
                    let mut cluster_index = 0usize;
                    while let Some(cluster_node) = cluster {
                        progress.check()?;
                        let cluster_read_offset = tree.start_offset(cluster_node) - segment_data;
                        if cues.is_parsed()
                            && cues.update_offsets(cluster_read_offset, current_offset + running)
                        {
                            continue 'cues_size;
                        }
                        if cluster_index == 0
                            && seek_info.push(0, ids::CLUSTER, current_offset + running)
                        {
                            continue 'calc;
                        }
                        let mut cluster_size = 0u64;
                        let mut cluster_read_size = 0u64;
                        let mut child = tree.first_child(input, cluster_node)?;
                        while let Some(child_node) = child {
                            if cues.is_parsed()
                                && cues.update_relative_offsets(
                                    cluster_read_offset,
                                    cluster_read_size,
                                    cluster_size,
                                )
                            {
                                continue 'cues_size;
                            }
                            match tree.id(child_node) {
                                ids::VOID | ids::CRC32 => {}
                                // both back-references are recomputed so
                                // they stay consistent with the new layout
                                ids::POSITION => {
                                    cluster_size += 1
                                        + 1
                                        + vint::calculate_uinteger_length(
                                            current_offset + running,
                                        ) as u64;
                                }
                                ids::PREV_SIZE => {
                                    cluster_size += 1
                                        + 1
                                        + vint::calculate_uinteger_length(previous_cluster_total)
                                            as u64;
                                }
                                _ => cluster_size += tree.total_size(child_node),
                            }
                            cluster_read_size += tree.total_size(child_node);
                            child = tree.next_sibling(input, child_node)?;
                        }
                        cluster_sizes.push(cluster_size);
                        previous_cluster_total =
                            4 + vint::calculate_size_length(cluster_size) as u64 + cluster_size;
                        running += previous_cluster_total;
                        cluster = tree.sibling_by_id(input, cluster_node, ids::CLUSTER)?;
                        cluster_index += 1;
                    }
                    element_size = running;
                    break;
                }
                if write_tags_here && !tags_before_data {
                    if tags_size != 0 {
                        if seek_info.push(0, ids::TAGS, current_offset + element_size) {
                            continue 'calc;
                        }
                        element_size += tags_size;
                    }
                    if attachments_size != 0 {
                        if seek_info.push(0, ids::ATTACHMENTS, current_offset + element_size) {
                            continue 'calc;
                        }
                        element_size += attachments_size;
                    }
                }
                break;
            }

            // write the segment
            progress.status("Writing segment header ...");
            let mut header = Vec::new();
            vint::make_id(ids::SEGMENT, &mut header)?;
            let size_length = vint::make_size(element_size, 0, &mut header)?;
            output.write_all(&header)?;
            let segment_write_offset = ebml_offset(output)?;
            if has_crc {
                let patch_offset = ebml_offset(output)?;
                let mut crc = Vec::new();
                ebml::make_crc32_placeholder(&mut crc)?;
                output.write_all(&crc)?;
                crc_patches.push(CrcPatch {
                    element_offset: patch_offset,
                    covered_size: element_size - 6,
                });
            }
            let mut seek_buf = Vec::new();
            seek_info.make(&mut seek_buf)?;
            output.write_all(&seek_buf)?;
            // SegmentInfo
            for &info_node in &record.info_nodes {
                self.write_segment_info(
                    input,
                    output,
                    tree,
                    info_node,
                    segment_index,
                    segment_info_data_size,
                    config,
                    progress,
                )?;
            }
            for nodes in [&record.tracks_nodes, &record.chapters_nodes] {
                for &node in nodes.iter() {
                    tree.copy_entirely(input, node, output, progress)?;
                }
            }
            if write_tags_here && tags_before_data {
                self.write_tags_and_attachments(
                    output,
                    &tag_bytes,
                    tags_data_size,
                    attachments_data_size,
                    diag,
                    progress,
                )?;
            }
            if cues.is_parsed() {
                let mut cues_buf = Vec::new();
                cues.make(&mut cues_buf)?;
                output.write_all(&cues_buf)?;
            }
            progress.status("Writing segment data ...");
            // clusters
            let mut previous_cluster_total = 0u64;
            let mut cluster = tree.child_by_id(input, segment, ids::CLUSTER)?;
            let mut cluster_index = 0usize;
            while let Some(cluster_node) = cluster {
                progress.check()?;
                let cluster_size = cluster_sizes[cluster_index];
                let cluster_position = current_offset + (ebml_offset(output)? - segment_write_offset);
                let mut cluster_header = Vec::new();
                vint::make_id(ids::CLUSTER, &mut cluster_header)?;
                let cluster_size_length = vint::make_size(cluster_size, 0, &mut cluster_header)?;
                output.write_all(&cluster_header)?;
                let mut child = tree.first_child(input, cluster_node)?;
                while let Some(child_node) = child {
                    match tree.id(child_node) {
                        ids::VOID | ids::CRC32 => {}
                        ids::POSITION => {
                            let mut buf = Vec::new();
                            ebml::make_uint_element(ids::POSITION, cluster_position, &mut buf)?;
                            output.write_all(&buf)?;
                        }
                        ids::PREV_SIZE => {
                            let mut buf = Vec::new();
                            ebml::make_uint_element(
                                ids::PREV_SIZE,
                                previous_cluster_total,
                                &mut buf,
                            )?;
                            output.write_all(&buf)?;
                        }
                        _ => tree.copy_entirely(input, child_node, output, progress)?,
                    }
                    child = tree.next_sibling(input, child_node)?;
                }
                previous_cluster_total = 4 + cluster_size_length as u64 + cluster_size;
                progress.percentage(
                    (ebml_offset(output)? - segment_write_offset) as f64 / element_size as f64,
                );
                cluster = tree.sibling_by_id(input, cluster_node, ids::CLUSTER)?;
                cluster_index += 1;
            }
            if write_tags_here && !tags_before_data {
                self.write_tags_and_attachments(
                    output,
                    &tag_bytes,
                    tags_data_size,
                    attachments_data_size,
                    diag,
                    progress,
                )?;
            }
            current_offset += 4 + size_length as u64 + element_size;
        }
        for node in pending_unknown {
            tree.copy_entirely(input, node, output, progress)?;
        }
        output.flush()?;
        progress.percentage(1.0);
        Ok(crc_patches)
    }

    fn write_tags_and_attachments<W: Write + Seek>(
        &self,
        output: &mut W,
        tag_bytes: &[Vec<u8>],
        tags_data_size: u64,
        attachments_data_size: u64,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        if tags_data_size != 0 {
            let mut header = Vec::new();
            vint::make_id(ids::TAGS, &mut header)?;
            vint::make_size(tags_data_size, 0, &mut header)?;
            output.write_all(&header)?;
            for bytes in tag_bytes {
                output.write_all(bytes)?;
            }
        }
        if attachments_data_size != 0 {
            let mut header = Vec::new();
            vint::make_id(ids::ATTACHMENTS, &mut header)?;
            vint::make_size(attachments_data_size, 0, &mut header)?;
            output.write_all(&header)?;
            for attachment in &self.attachments {
                if attachment.ignored || attachment.is_empty() {
                    continue;
                }
                make_attached_file(attachment, output, diag, progress)?;
            }
        }
        Ok(())
    }

    fn segment_info_size<R: Read + Seek>(
        &self,
        input: &mut R,
        tree: &mut EbmlTree,
        info_node: NodeId,
        segment_index: usize,
        config: &MediaFileConfig,
    ) -> Result<u64> {
        let mut size = 0u64;
        size += ebml::calculate_element_size(
            ids::MUXING_APP,
            self.muxing_app_value(config).len() as u64,
        )?;
        size += ebml::calculate_element_size(
            ids::WRITING_APP,
            self.writing_app_value(config).len() as u64,
        )?;
        if let Some(title) = self.titles.get(segment_index) {
            if !title.is_empty() {
                size += ebml::calculate_element_size(ids::TITLE, title.len() as u64)?;
            }
        }
        let mut child = tree.first_child(input, info_node)?;
        while let Some(node) = child {
            match tree.id(node) {
                ids::VOID | ids::CRC32 | ids::TITLE | ids::MUXING_APP | ids::WRITING_APP => {}
                _ => size += tree.total_size(node),
            }
            child = tree.next_sibling(input, node)?;
        }
        Ok(size)
    }

    fn muxing_app_value(&self, config: &MediaFileConfig) -> &str {
        if config.flags.contains(MediaFileFlags::PRESERVE_MUXING_APPLICATION) {
            &self.muxing_app
        } else {
            APP_INFO
        }
    }

    fn writing_app_value(&self, config: &MediaFileConfig) -> &str {
        if config.flags.contains(MediaFileFlags::PRESERVE_WRITING_APPLICATION) {
            &self.writing_app
        } else {
            APP_INFO
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_segment_info<R: Read + Seek, W: Write + Seek>(
        &self,
        input: &mut R,
        output: &mut W,
        tree: &mut EbmlTree,
        info_node: NodeId,
        segment_index: usize,
        data_size: u64,
        config: &MediaFileConfig,
        progress: &Progress,
    ) -> Result<()> {
        let mut header = Vec::new();
        vint::make_id(ids::SEGMENT_INFO, &mut header)?;
        vint::make_size(data_size, 0, &mut header)?;
        output.write_all(&header)?;
        let mut child = tree.first_child(input, info_node)?;
        while let Some(node) = child {
            match tree.id(node) {
                ids::VOID | ids::CRC32 | ids::TITLE | ids::MUXING_APP | ids::WRITING_APP => {}
                _ => tree.copy_entirely(input, node, output, progress)?,
            }
            child = tree.next_sibling(input, node)?;
        }
        let mut buf = Vec::new();
        if let Some(title) = self.titles.get(segment_index) {
            if !title.is_empty() {
                ebml::make_string_element(ids::TITLE, title, &mut buf)?;
            }
        }
        ebml::make_string_element(ids::MUXING_APP, self.muxing_app_value(config), &mut buf)?;
        ebml::make_string_element(ids::WRITING_APP, self.writing_app_value(config), &mut buf)?;
        output.write_all(&buf)?;
        Ok(())
    }
}

fn ebml_offset<W: Seek>(output: &mut W) -> Result<u64> {
    Ok(output.stream_position()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_ids_are_unique_without_silent_collisions() {
        let mut container = MatroskaContainer::new();
        let mut diag = Diagnostics::new();
        for _ in 0..64 {
            let id = container.next_attachment_id(&mut diag);
            assert_ne!(id, 0);
            container.attachments.push(Attachment { id, ..Attachment::default() });
        }
        let mut ids: Vec<u64> = container.attachments.iter().map(|a| a.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 64);
    }
}

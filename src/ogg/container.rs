//! The Ogg container driver: logical streams, Vorbis comments and the
//! page-rebuilding rewrite.

use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::ogg::iter::OggIterator;
use crate::ogg::page::{self, OggPageHeader, FLAG_CONTINUED};
use crate::opus::OpusIdentificationHeader;
use crate::progress::Progress;
use crate::sig::MediaType;
use crate::track::Track;
use crate::vorbis::{CommentSignature, VorbisComment, VorbisIdentificationHeader};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Seek, SeekFrom, Write};

/// Codec of a logical Ogg bitstream, identified by the first bytes of its
/// first packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum OggCodec {
    /// Could not be identified.
    #[default]
    Unknown,
    /// Vorbis audio.
    Vorbis,
    /// Opus audio.
    Opus,
    /// FLAC in Ogg.
    Flac,
    /// Speex audio.
    Speex,
    /// Theora video.
    Theora,
}

impl OggCodec {
    fn from_packet(data: &[u8]) -> OggCodec {
        if data.starts_with(b"\x01vorbis") {
            OggCodec::Vorbis
        } else if data.starts_with(b"OpusHead") {
            OggCodec::Opus
        } else if data.starts_with(b"\x7FFLAC") {
            OggCodec::Flac
        } else if data.starts_with(b"Speex   ") {
            OggCodec::Speex
        } else if data.starts_with(b"\x80theora") {
            OggCodec::Theora
        } else {
            OggCodec::Unknown
        }
    }

    /// Codec name.
    pub fn name(self) -> &'static str {
        match self {
            OggCodec::Unknown => "unknown",
            OggCodec::Vorbis => "Vorbis",
            OggCodec::Opus => "Opus",
            OggCodec::Flac => "FLAC",
            OggCodec::Speex => "Speex",
            OggCodec::Theora => "Theora",
        }
    }

    fn media_type(self) -> MediaType {
        match self {
            OggCodec::Theora => MediaType::Video,
            OggCodec::Unknown => MediaType::Unknown,
            _ => MediaType::Audio,
        }
    }
}

/// A logical bitstream of an Ogg file.
#[derive(Debug, Clone, Default)]
pub struct OggStream {
    /// Serial number identifying the stream.
    pub serial: u32,
    /// Identified codec.
    pub codec: OggCodec,
    /// Identification header of a Vorbis stream.
    pub vorbis_ident: Option<VorbisIdentificationHeader>,
    /// Identification header of an Opus stream.
    pub opus_ident: Option<OpusIdentificationHeader>,
    /// Index of the stream's first page.
    pub first_page_index: usize,
}

impl OggStream {
    /// Sample rate in Hz, when known.
    pub fn sample_rate(&self) -> u32 {
        self.vorbis_ident
            .map(|i| i.sample_rate)
            .or(self.opus_ident.map(|i| i.sample_rate))
            .unwrap_or(0)
    }

    /// Channel count, when known.
    pub fn channels(&self) -> u8 {
        self.vorbis_ident
            .map(|i| i.channels)
            .or(self.opus_ident.map(|i| i.channels))
            .unwrap_or(0)
    }

    /// Opus pre-skip, when applicable.
    pub fn pre_skip(&self) -> u16 {
        self.opus_ident.map(|i| i.pre_skip).unwrap_or(0)
    }
}

/// Where a stream's comment packet sits within the page buffer.
#[derive(Debug, Clone, Copy)]
struct CommentLocation {
    tag_index: usize,
    serial: u32,
    first_page_index: usize,
    first_segment_index: usize,
    last_page_index: usize,
    last_segment_index: usize,
}

/// The parsed state of an Ogg file.
#[derive(Debug, Default)]
pub struct OggContainer {
    iter: OggIterator,
    /// The logical bitstreams.
    pub streams: Vec<OggStream>,
    /// One comment per stream that has one, in stream order.
    pub comments: Vec<VorbisComment>,
    comment_table: Vec<CommentLocation>,
    file_size: u64,
}

impl OggContainer {
    /// Creates an unparsed container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all parsed state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Walks the whole page chain, identifying the logical bitstreams and
    /// their identification headers.
    pub fn parse_header<R: Read + Seek>(
        &mut self,
        io: &mut R,
        file_size: u64,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        let context = "parsing Ogg streams";
        self.reset();
        self.file_size = file_size;
        self.iter.clear(0, file_size);
        self.iter.reset(io)?;
        if !self.iter.is_valid() {
            return Err(Error::NoDataFound);
        }
        // fetch every page so stream boundaries and sequence gaps surface
        let mut expected: Vec<(u32, u32)> = Vec::new();
        loop {
            progress.check()?;
            let Some(page) = self.iter.current_page() else { break };
            let serial = page.stream_serial;
            let sequence = page.sequence_number;
            let page_index = self.iter.current_page_index();
            match expected.iter_mut().find(|(s, _)| *s == serial) {
                Some((_, next)) => {
                    if sequence != *next {
                        diag.warn(
                            format!(
                                "page sequence number {sequence} of stream {serial:#X} does not follow {}",
                                *next
                            ),
                            context,
                        );
                    }
                    *next = sequence + 1;
                }
                None => {
                    if !page.is_first() {
                        diag.warn(
                            format!("stream {serial:#X} starts without the first-page flag"),
                            context,
                        );
                    }
                    expected.push((serial, sequence + 1));
                    self.streams.push(OggStream {
                        serial,
                        first_page_index: page_index,
                        ..OggStream::default()
                    });
                }
            }
            if self.iter.is_last_page_fetched() {
                break;
            }
            self.iter.next_page(io)?;
        }
        // identify each stream from its first packet
        for index in 0..self.streams.len() {
            let serial = self.streams[index].serial;
            self.iter.set_filter(serial);
            self.iter.reset(io)?;
            if !self.iter.is_valid() {
                continue;
            }
            let probe_size = self.iter.current_segment_size().min(8) as usize;
            let mut probe = vec![0u8; probe_size];
            self.iter.read(io, &mut probe)?;
            let codec = OggCodec::from_packet(&probe);
            self.streams[index].codec = codec;
            self.iter.reset(io)?;
            match codec {
                OggCodec::Vorbis => {
                    self.streams[index].vorbis_ident =
                        Some(VorbisIdentificationHeader::parse(io, &mut self.iter)?);
                }
                OggCodec::Opus => {
                    self.streams[index].opus_ident =
                        Some(OpusIdentificationHeader::parse(io, &mut self.iter)?);
                }
                _ => {}
            }
        }
        self.iter.remove_filter();
        Ok(())
    }

    /// Parses the comment packet of every Vorbis/Opus stream.
    pub fn parse_tags<R: Read + Seek>(
        &mut self,
        io: &mut R,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        self.comments.clear();
        self.comment_table.clear();
        for index in 0..self.streams.len() {
            progress.check()?;
            let (serial, signature) = {
                let stream = &self.streams[index];
                let signature = match stream.codec {
                    OggCodec::Vorbis => CommentSignature::Vorbis,
                    OggCodec::Opus => CommentSignature::OpusTags,
                    _ => continue,
                };
                (stream.serial, signature)
            };
            self.iter.set_filter(serial);
            self.iter.reset(io)?;
            if !self.iter.is_valid() {
                continue;
            }
            // the identification header is the first packet; the comment
            // packet follows
            self.iter.next_segment(io)?;
            if !self.iter.is_valid() {
                diag.warn(
                    format!("stream {serial:#X} has no comment packet"),
                    "parsing Ogg tags",
                );
                continue;
            }
            let first_page_index = self.iter.current_page_index();
            let first_segment_index = self.iter.current_segment_index();
            let mut comment = VorbisComment::new();
            comment.parse(io, &mut self.iter, signature, diag)?;
            self.comment_table.push(CommentLocation {
                tag_index: self.comments.len(),
                serial,
                first_page_index,
                first_segment_index,
                last_page_index: self.iter.current_page_index(),
                last_segment_index: self.iter.current_segment_index(),
            });
            self.comments.push(comment);
        }
        self.iter.remove_filter();
        Ok(())
    }

    /// Track descriptors for the facade, one per logical stream.
    pub fn tracks(&self) -> Vec<Track> {
        self.streams
            .iter()
            .map(|stream| Track {
                id: stream.serial as u64,
                number: stream.first_page_index as u64 + 1,
                media_type: stream.codec.media_type(),
                codec_id: stream.codec.name().to_string(),
                channels: stream.channels() as u64,
                sampling_frequency: stream.sample_rate() as f64,
                ..Track::default()
            })
            .collect()
    }

    /// Rewrites the file: pages carrying a comment packet are rebuilt from
    /// the in-memory comments, all other pages are copied with their
    /// sequence numbers renumbered dense.
    ///
    /// Returns the offsets of pages whose checksums must be recomputed once
    /// the output is on disk.
    pub fn make_file<R: Read + Seek, W: Write + Seek>(
        &mut self,
        input: &mut R,
        output: &mut W,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<Vec<u64>> {
        let mut updated_page_offsets = Vec::new();
        let mut comment_iter = self.comment_table.iter().peekable();
        // per-stream dense output numbering
        let mut sequences: Vec<(u32, u32)> = Vec::new();
        self.iter.remove_filter();
        self.iter.reset(input)?;
        let mut pending_region: Option<(CommentLocation, Vec<Vec<u8>>, OggPageHeader)> = None;
        loop {
            let Some(page) = self.iter.current_page().cloned() else { break };
            if !self.iter.is_valid() {
                break;
            }
            progress.check()?;
            let page_index = self.iter.current_page_index();
            let location = comment_iter
                .peek()
                .filter(|l| {
                    page.stream_serial == l.serial
                        && page_index >= l.first_page_index
                        && page_index <= l.last_page_index
                })
                .copied()
                .copied();
            if let Some(location) = location {
                // gather the replacement segments for the affected region
                let (_, segments, _) = pending_region
                    .get_or_insert_with(|| (location, Vec::new(), page.clone()));
                let read_segments = read_page_segments(input, &page)?;
                for (segment_index, segment) in read_segments.into_iter().enumerate() {
                    let in_comment = (page_index > location.first_page_index
                        || segment_index >= location.first_segment_index)
                        && (page_index < location.last_page_index
                            || segment_index <= location.last_segment_index);
                    if in_comment {
                        if page_index == location.first_page_index
                            && segment_index == location.first_segment_index
                        {
                            // the comment itself is serialized once
                            let comment = &self.comments[location.tag_index];
                            let codec = self
                                .streams
                                .iter()
                                .find(|s| s.serial == location.serial)
                                .map(|s| s.codec)
                                .unwrap_or_default();
                            let signature = match codec {
                                OggCodec::Opus => CommentSignature::OpusTags,
                                _ => CommentSignature::Vorbis,
                            };
                            let mut bytes = Vec::new();
                            comment.make(&mut bytes, signature, diag)?;
                            segments.push(bytes);
                        }
                    } else {
                        segments.push(segment);
                    }
                }
                if page_index == location.last_page_index {
                    if let Some((location, segments, template)) = pending_region.take() {
                        let sequence = next_sequence(&mut sequences, location.serial);
                        let written = write_pages(
                            output,
                            &template,
                            &segments,
                            sequence,
                            &mut updated_page_offsets,
                        )?;
                        advance_sequence(&mut sequences, location.serial, written);
                    }
                    comment_iter.next();
                }
            } else {
                let sequence = next_sequence(&mut sequences, page.stream_serial);
                advance_sequence(&mut sequences, page.stream_serial, 1);
                if sequence != page.sequence_number {
                    // copy with a fixed sequence number; the checksum is
                    // recomputed afterwards
                    let mut bytes = read_page_bytes(input, &page)?;
                    LittleEndian::write_u32(&mut bytes[18..22], sequence);
                    LittleEndian::write_u32(&mut bytes[22..26], 0);
                    updated_page_offsets.push(output.stream_position()?);
                    output.write_all(&bytes)?;
                } else {
                    input.seek(SeekFrom::Start(page.start_offset))?;
                    crate::io::copy_range(input, output, page.total_size(), progress)?;
                }
            }
            if self.iter.is_last_page_fetched()
                && self.iter.current_page_index() + 1 >= self.iter.pages().len()
            {
                break;
            }
            self.iter.next_page(input)?;
        }
        output.flush()?;
        Ok(updated_page_offsets)
    }
}

fn next_sequence(sequences: &mut Vec<(u32, u32)>, serial: u32) -> u32 {
    match sequences.iter().find(|(s, _)| *s == serial) {
        Some(&(_, next)) => next,
        None => {
            sequences.push((serial, 0));
            0
        }
    }
}

fn advance_sequence(sequences: &mut [(u32, u32)], serial: u32, by: u32) {
    if let Some((_, next)) = sequences.iter_mut().find(|(s, _)| *s == serial) {
        *next += by;
    }
}

fn read_page_bytes<R: Read + Seek>(io: &mut R, page: &OggPageHeader) -> Result<Vec<u8>> {
    crate::io::read_buffer(io, page.start_offset, page.total_size())
}

fn read_page_segments<R: Read + Seek>(io: &mut R, page: &OggPageHeader) -> Result<Vec<Vec<u8>>> {
    let mut segments = Vec::new();
    let mut offset = page.data_offset();
    for &size in &page.segment_sizes {
        segments.push(crate::io::read_buffer(io, offset, size as u64)?);
        offset += size as u64;
    }
    Ok(segments)
}

/// Lays `segments` out as pages, copying the header fields of `template`,
/// numbering pages from `first_sequence`. Returns the number of pages
/// written; their offsets are appended to `updated` for checksum patching.
fn write_pages<W: Write + Seek>(
    output: &mut W,
    template: &OggPageHeader,
    segments: &[Vec<u8>],
    first_sequence: u32,
    updated: &mut Vec<u64>,
) -> Result<u32> {
    // build the full lacing table, remembering which values end a packet
    let mut lacing: Vec<u8> = Vec::new();
    for segment in segments {
        page::make_segment_size_denotation(segment.len() as u64, &mut lacing);
    }
    let payload: Vec<u8> = segments.iter().flatten().copied().collect();
    let mut pages_written = 0u32;
    let mut lacing_offset = 0usize;
    let mut payload_offset = 0usize;
    let mut continued = template.is_continued();
    while lacing_offset < lacing.len() || pages_written == 0 {
        let table = &lacing[lacing_offset..(lacing_offset + 0xFF).min(lacing.len())];
        let chunk: u64 = table.iter().map(|&v| v as u64).sum();
        let is_last_chunk = lacing_offset + table.len() >= lacing.len();
        let mut header = template.clone();
        header.header_type_flag = (template.header_type_flag & !FLAG_CONTINUED)
            | if continued { FLAG_CONTINUED } else { 0 };
        header.sequence_number = first_sequence + pages_written;
        header.checksum = 0;
        header.segment_table = table.to_vec();
        updated.push(output.stream_position()?);
        header.make(output)?;
        output.write_all(&payload[payload_offset..payload_offset + chunk as usize])?;
        // a page ending with a 255 lacing value continues on the next page
        continued = table.last() == Some(&0xFF);
        lacing_offset += table.len();
        payload_offset += chunk as usize;
        pages_written += 1;
        if is_last_chunk {
            break;
        }
    }
    Ok(pages_written)
}

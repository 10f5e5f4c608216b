//! MPEG audio frames bracketed by ID3 tags.

use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::id3::v1::{self, Id3v1Tag};
use crate::id3::v2::Id3v2Tag;
use crate::progress::Progress;
use crate::tag::Tag as _;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

/// MPEG version of an audio frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MpegVersion {
    /// MPEG-1.
    V1,
    /// MPEG-2.
    V2,
    /// MPEG-2.5.
    V25,
}

/// A parsed MPEG audio frame header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MpegFrameHeader {
    /// MPEG version.
    pub version: MpegVersion,
    /// Layer (1, 2 or 3).
    pub layer: u8,
    /// Bitrate in kbit/s (0 = free format).
    pub bitrate: u32,
    /// Sampling rate in Hz.
    pub sampling_rate: u32,
    /// Whether the frame carries two channels.
    pub stereo: bool,
    /// Whether a CRC follows the header.
    pub has_crc: bool,
}

const BITRATES_V1: [[u32; 14]; 3] = [
    // layer I
    [32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    // layer II
    [32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    // layer III
    [32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];
const BITRATES_V2: [[u32; 14]; 3] = [
    [32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];
const SAMPLING_RATES_V1: [u32; 3] = [44_100, 48_000, 32_000];

impl MpegFrameHeader {
    /// Parses the four header bytes at the current position.
    pub fn parse<R: Read>(io: &mut R) -> Result<MpegFrameHeader> {
        let raw = io.read_u32::<BigEndian>()?;
        if raw >> 21 != 0x7FF {
            return Err(Error::Invalid("MPEG frame sync not present"));
        }
        let version = match (raw >> 19) & 0x3 {
            0b00 => MpegVersion::V25,
            0b10 => MpegVersion::V2,
            0b11 => MpegVersion::V1,
            _ => return Err(Error::Invalid("reserved MPEG version")),
        };
        let layer = match (raw >> 17) & 0x3 {
            0b01 => 3,
            0b10 => 2,
            0b11 => 1,
            _ => return Err(Error::Invalid("reserved MPEG layer")),
        };
        let bitrate_index = ((raw >> 12) & 0xF) as usize;
        if bitrate_index == 0xF {
            return Err(Error::Invalid("bad MPEG bitrate index"));
        }
        let table = match version {
            MpegVersion::V1 => &BITRATES_V1,
            _ => &BITRATES_V2,
        };
        let bitrate = if bitrate_index == 0 { 0 } else { table[layer as usize - 1][bitrate_index - 1] };
        let sampling_index = ((raw >> 10) & 0x3) as usize;
        if sampling_index == 3 {
            return Err(Error::Invalid("reserved MPEG sampling rate"));
        }
        let sampling_rate = match version {
            MpegVersion::V1 => SAMPLING_RATES_V1[sampling_index],
            MpegVersion::V2 => SAMPLING_RATES_V1[sampling_index] / 2,
            MpegVersion::V25 => SAMPLING_RATES_V1[sampling_index] / 4,
        };
        let channel_mode = (raw >> 6) & 0x3;
        Ok(MpegFrameHeader {
            version,
            layer,
            bitrate,
            sampling_rate,
            stereo: channel_mode != 0b11,
            has_crc: raw & 0x10000 == 0,
        })
    }

    /// Channel count.
    pub fn channels(&self) -> u64 {
        if self.stereo { 2 } else { 1 }
    }
}

/// The parsed state of an MP3 file: leading ID3v2 tags, the MPEG frame
/// stream and a trailing ID3v1 tag.
#[derive(Debug, Default)]
pub struct Mp3Container {
    /// Leading ID3v2 tags in file order.
    pub id3v2_tags: Vec<Id3v2Tag>,
    /// Trailing ID3v1 tag.
    pub id3v1_tag: Option<Id3v1Tag>,
    /// First byte of the MPEG frame stream.
    pub audio_start: u64,
    /// One past the last byte of the MPEG frame stream.
    pub audio_end: u64,
    /// The first frame header, for the technical summary.
    pub first_frame: Option<MpegFrameHeader>,
}

impl Mp3Container {
    /// Creates an unparsed container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all parsed state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Locates the ID3 tags bracketing the MPEG frames and parses them.
    pub fn parse_header<R: Read + Seek>(
        &mut self,
        io: &mut R,
        file_size: u64,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        let context = "parsing MP3 file";
        self.reset();
        progress.check()?;
        // multiple successive ID3v2 tags may precede the frames
        let mut offset = 0u64;
        loop {
            match Id3v2Tag::parse(io, offset, file_size - offset, diag) {
                Ok(tag) => {
                    offset += tag.total_size();
                    self.id3v2_tags.push(tag);
                }
                Err(Error::NoDataFound) => break,
                Err(error) => return Err(error),
            }
        }
        self.audio_start = offset;
        self.audio_end = file_size;
        if file_size >= offset + v1::TAG_SIZE {
            match Id3v1Tag::parse(io, file_size - v1::TAG_SIZE) {
                Ok(tag) => {
                    self.id3v1_tag = Some(tag);
                    self.audio_end = file_size - v1::TAG_SIZE;
                }
                Err(Error::NoDataFound) => {}
                Err(error) => return Err(error),
            }
        }
        if self.audio_start >= self.audio_end {
            diag.warn("no MPEG frames between the ID3 tags", context);
            return Ok(());
        }
        io.seek(SeekFrom::Start(self.audio_start))?;
        match MpegFrameHeader::parse(io) {
            Ok(frame) => self.first_frame = Some(frame),
            Err(_) => diag.warn("audio data does not start with an MPEG frame", context),
        }
        Ok(())
    }

    /// Rewrites the file: new ID3v2 tags at the front, the frame stream
    /// copied verbatim, the ID3v1 tag at the back.
    pub fn make_file<R: Read + Seek, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<()> {
        for tag in &self.id3v2_tags {
            if tag.is_empty() {
                continue;
            }
            match tag.make(0, diag) {
                Ok(bytes) => output.write_all(&bytes)?,
                Err(Error::NoDataProvided) => {}
                Err(error) => return Err(error),
            }
        }
        input.seek(SeekFrom::Start(self.audio_start))?;
        crate::io::copy_range(input, output, self.audio_end - self.audio_start, progress)?;
        if let Some(tag) = &self.id3v1_tag {
            if !tag.is_empty() {
                output.write_all(&tag.make(diag)?)?;
            }
        }
        output.flush()?;
        Ok(())
    }

    /// The technical label of the frame stream, e.g. `"MP3-2ch"`.
    pub fn technical_label(&self) -> String {
        match &self.first_frame {
            Some(frame) => {
                let name = match (frame.version, frame.layer) {
                    (MpegVersion::V1, 1) => "MP1",
                    (MpegVersion::V1, 2) => "MP2",
                    _ => "MP3",
                };
                format!("{name}-{}ch", frame.channels())
            }
            None => "MPEG audio".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::value::TagValue;
    use crate::tag::KnownField;
    use crate::text::TextEncoding;
    use std::io::Cursor;

    // a minimal MPEG-1 layer III frame header (44.1 kHz, 128 kbit/s,
    // stereo) followed by arbitrary payload
    fn frame_bytes() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFB, 0x90, 0x00];
        bytes.extend(std::iter::repeat(0xAA).take(100));
        bytes
    }

    #[test]
    fn parses_frame_header() {
        let bytes = frame_bytes();
        let frame = MpegFrameHeader::parse(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(frame.version, MpegVersion::V1);
        assert_eq!(frame.layer, 3);
        assert_eq!(frame.bitrate, 128);
        assert_eq!(frame.sampling_rate, 44_100);
        assert!(frame.stereo);
    }

    #[test]
    fn id3v2_splice_round_trip() {
        // bare frames at first
        let audio = frame_bytes();
        let mut container = Mp3Container::new();
        let mut diag = Diagnostics::new();
        let mut io = Cursor::new(audio.clone());
        container
            .parse_header(&mut io, audio.len() as u64, &mut diag, &Progress::new())
            .unwrap();
        assert_eq!(container.audio_start, 0);
        assert!(container.id3v2_tags.is_empty());

        // splice in an ID3v2.3 tag and an ID3v1 tag
        let mut v2 = Id3v2Tag::with_version(3);
        v2.set_value_of(
            KnownField::Title,
            TagValue::text_with_encoding("Hello", TextEncoding::Utf16Le).unwrap(),
        );
        container.id3v2_tags.push(v2);
        let mut v1 = Id3v1Tag::new();
        v1.set_value_of(KnownField::Title, TagValue::text("Hello"));
        container.id3v1_tag = Some(v1);
        let mut rewritten = Vec::new();
        container
            .make_file(&mut io, &mut rewritten, &mut diag, &Progress::new())
            .unwrap();

        // the audio region must be byte-identical, bracketed by the tags
        let mut reread = Mp3Container::new();
        let mut io = Cursor::new(rewritten.clone());
        reread
            .parse_header(&mut io, rewritten.len() as u64, &mut diag, &Progress::new())
            .unwrap();
        assert_eq!(reread.id3v2_tags.len(), 1);
        assert!(reread.id3v1_tag.is_some());
        let value = reread.id3v2_tags[0].value_of(KnownField::Title).unwrap();
        assert_eq!(value.to_display_string().unwrap(), "Hello");
        assert_eq!(value.encoding(), Some(TextEncoding::Utf16Le));
        assert_eq!(
            &rewritten[reread.audio_start as usize..reread.audio_end as usize],
            &audio[..]
        );
        assert_eq!(reread.technical_label(), "MP3-2ch");
    }

    #[test]
    fn strips_and_replaces_existing_tags() {
        // build a file that already carries tags, mutate, save again
        let audio = frame_bytes();
        let mut container = Mp3Container::new();
        let mut diag = Diagnostics::new();
        let mut v2 = Id3v2Tag::with_version(4);
        v2.set_value_of(KnownField::Title, TagValue::text("Old"));
        container.id3v2_tags.push(v2);
        container.audio_start = 0;
        container.audio_end = audio.len() as u64;
        let mut first = Vec::new();
        container
            .make_file(&mut Cursor::new(audio.clone()), &mut first, &mut diag, &Progress::new())
            .unwrap();

        let mut reread = Mp3Container::new();
        let mut io = Cursor::new(first.clone());
        reread
            .parse_header(&mut io, first.len() as u64, &mut diag, &Progress::new())
            .unwrap();
        reread.id3v2_tags[0].set_value_of(KnownField::Title, TagValue::text("New"));
        let mut second = Vec::new();
        reread
            .make_file(&mut io, &mut second, &mut diag, &Progress::new())
            .unwrap();

        let mut checked = Mp3Container::new();
        let mut io = Cursor::new(second.clone());
        checked
            .parse_header(&mut io, second.len() as u64, &mut diag, &Progress::new())
            .unwrap();
        assert_eq!(checked.id3v2_tags.len(), 1);
        assert_eq!(
            checked.id3v2_tags[0]
                .value_of(KnownField::Title)
                .unwrap()
                .to_display_string()
                .unwrap(),
            "New"
        );
        assert_eq!(
            &second[checked.audio_start as usize..checked.audio_end as usize],
            &audio[..]
        );
    }
}

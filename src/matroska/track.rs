//! Parsing Matroska `TrackEntry` elements.

use crate::diag::Diagnostics;
use crate::ebml::{self, ids, EbmlTree};
use crate::error::Result;
use crate::sig::MediaType;
use crate::track::Track;
use crate::tree::NodeId;
use std::io::{Read, Seek};

/// Maps a Matroska `TrackType` value onto the general media type.
fn media_type(track_type: u64) -> MediaType {
    match track_type {
        0x1 => MediaType::Video,
        0x2 => MediaType::Audio,
        0x11 => MediaType::Text,
        _ => MediaType::Unknown,
    }
}

/// Parses a `TrackEntry` rooted at `node` into a [`Track`], capturing the
/// raw header bytes for the rewrite path.
pub fn parse_track_entry<R: Read + Seek>(
    io: &mut R,
    tree: &mut EbmlTree,
    node: NodeId,
    diag: &mut Diagnostics,
) -> Result<Track> {
    let context = "parsing Matroska track";
    let mut track = Track { enabled: true, ..Track::default() };
    let mut child = tree.first_child(io, node)?;
    while let Some(n) = child {
        match tree.id(n) {
            ids::TRACK_NUMBER => track.number = ebml::read_uint(io, tree, n)?,
            ids::TRACK_UID => track.id = ebml::read_uint(io, tree, n)?,
            ids::TRACK_TYPE => track.media_type = media_type(ebml::read_uint(io, tree, n)?),
            ids::TRACK_FLAG_ENABLED => track.enabled = ebml::read_uint(io, tree, n)? != 0,
            ids::TRACK_FLAG_DEFAULT => track.default = ebml::read_uint(io, tree, n)? != 0,
            ids::TRACK_NAME => track.name = ebml::read_string(io, tree, n)?,
            ids::TRACK_LANGUAGE => {
                if track.language.is_empty() {
                    track.language = ebml::read_string(io, tree, n)?;
                }
            }
            ids::TRACK_LANGUAGE_IETF => track.language_ietf = ebml::read_string(io, tree, n)?,
            ids::CODEC_ID => track.codec_id = ebml::read_string(io, tree, n)?,
            ids::TRACK_VIDEO => {
                let mut video_child = tree.first_child(io, n)?;
                while let Some(v) = video_child {
                    match tree.id(v) {
                        ids::PIXEL_WIDTH => track.pixel_width = ebml::read_uint(io, tree, v)?,
                        ids::PIXEL_HEIGHT => track.pixel_height = ebml::read_uint(io, tree, v)?,
                        _ => {}
                    }
                    video_child = tree.next_sibling(io, v)?;
                }
            }
            ids::TRACK_AUDIO => {
                let mut audio_child = tree.first_child(io, n)?;
                while let Some(a) = audio_child {
                    match tree.id(a) {
                        ids::SAMPLING_FREQUENCY => {
                            track.sampling_frequency = ebml::read_float(io, tree, a)?
                        }
                        ids::CHANNELS => track.channels = ebml::read_uint(io, tree, a)?,
                        ids::BIT_DEPTH => track.bit_depth = ebml::read_uint(io, tree, a)?,
                        _ => {}
                    }
                    audio_child = tree.next_sibling(io, a)?;
                }
            }
            _ => {}
        }
        child = tree.next_sibling(io, n)?;
    }
    if track.id == 0 {
        diag.warn("TrackEntry without TrackUID", context);
    }
    // the raw entry is written back verbatim on rewrite
    track.set_header_bytes(tree.make_buffer(io, node)?);
    Ok(track)
}

//! Parsing Matroska chapters and editions.

use crate::chapter::{Chapter, Edition, LocaleAwareString};
use crate::diag::Diagnostics;
use crate::ebml::{self, ids, EbmlTree};
use crate::error::Result;
use crate::tag::value::TimeSpan;
use crate::tree::NodeId;
use std::io::{Read, Seek};

/// Parses an `EditionEntry` rooted at `node`.
pub fn parse_edition_entry<R: Read + Seek>(
    io: &mut R,
    tree: &mut EbmlTree,
    node: NodeId,
    diag: &mut Diagnostics,
) -> Result<Edition> {
    let mut edition = Edition::default();
    let mut child = tree.first_child(io, node)?;
    while let Some(n) = child {
        match tree.id(n) {
            ids::EDITION_UID => edition.id = ebml::read_uint(io, tree, n)?,
            ids::EDITION_FLAG_HIDDEN => edition.hidden = ebml::read_uint(io, tree, n)? != 0,
            ids::EDITION_FLAG_DEFAULT => edition.default = ebml::read_uint(io, tree, n)? != 0,
            ids::EDITION_FLAG_ORDERED => edition.ordered = ebml::read_uint(io, tree, n)? != 0,
            ids::CHAPTER_ATOM => edition.chapters.push(parse_chapter_atom(io, tree, n, diag)?),
            _ => {}
        }
        child = tree.next_sibling(io, n)?;
    }
    if edition.chapters.is_empty() {
        diag.warn("edition without chapters", "parsing Matroska chapters");
    }
    Ok(edition)
}

/// Parses a `ChapterAtom` rooted at `node`, including nested atoms.
pub fn parse_chapter_atom<R: Read + Seek>(
    io: &mut R,
    tree: &mut EbmlTree,
    node: NodeId,
    diag: &mut Diagnostics,
) -> Result<Chapter> {
    // Matroska timestamps here are in nanoseconds
    let mut chapter = Chapter { enabled: true, ..Chapter::default() };
    let mut child = tree.first_child(io, node)?;
    while let Some(n) = child {
        match tree.id(n) {
            ids::CHAPTER_UID => chapter.id = ebml::read_uint(io, tree, n)?,
            ids::CHAPTER_TIME_START => {
                chapter.start_time =
                    Some(TimeSpan::from_nanos(ebml::read_uint(io, tree, n)? as i128));
            }
            ids::CHAPTER_TIME_END => {
                chapter.end_time =
                    Some(TimeSpan::from_nanos(ebml::read_uint(io, tree, n)? as i128));
            }
            ids::CHAPTER_FLAG_HIDDEN => chapter.hidden = ebml::read_uint(io, tree, n)? != 0,
            ids::CHAPTER_FLAG_ENABLED => chapter.enabled = ebml::read_uint(io, tree, n)? != 0,
            ids::CHAPTER_TRACK => {
                let mut track_child = tree.first_child(io, n)?;
                while let Some(t) = track_child {
                    if tree.id(t) == ids::CHAPTER_TRACK_NUMBER {
                        chapter.tracks.push(ebml::read_uint(io, tree, t)?);
                    }
                    track_child = tree.next_sibling(io, t)?;
                }
            }
            ids::CHAPTER_DISPLAY => {
                let mut name = LocaleAwareString::default();
                let mut display_child = tree.first_child(io, n)?;
                while let Some(d) = display_child {
                    match tree.id(d) {
                        ids::CHAP_STRING => name.value = ebml::read_string(io, tree, d)?,
                        ids::CHAP_LANGUAGE => {
                            name.languages.push(ebml::read_string(io, tree, d)?)
                        }
                        ids::CHAP_LANGUAGE_IETF => {
                            name.ietf_languages.push(ebml::read_string(io, tree, d)?)
                        }
                        ids::CHAP_COUNTRY => {
                            name.countries.push(ebml::read_string(io, tree, d)?)
                        }
                        _ => {}
                    }
                    display_child = tree.next_sibling(io, d)?;
                }
                chapter.names.push(name);
            }
            ids::CHAPTER_ATOM => {
                chapter.nested.push(parse_chapter_atom(io, tree, n, diag)?);
            }
            _ => {}
        }
        child = tree.next_sibling(io, n)?;
    }
    if chapter.id == 0 {
        diag.warn("ChapterAtom without ChapterUID", "parsing Matroska chapters");
    }
    Ok(chapter)
}

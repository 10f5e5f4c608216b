//! ID3v1 and ID3v2 tags.

pub mod v1;
pub mod v2;

use crate::tag::map::FieldId;
use std::cmp::Ordering;

/// Builds a 32-bit frame ID from its four-character code.
pub const fn long_id(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

/// Builds a 24-bit frame ID from its three-character code (ID3v2.2).
pub const fn short_id(code: &[u8; 3]) -> u32 {
    u32::from_be_bytes([0, code[0], code[1], code[2]])
}

/// Frame IDs of ID3v2.3/2.4 (long) and ID3v2.2 (short) frames.
pub mod frame_ids {
    #![allow(missing_docs)]

    use super::{long_id, short_id};

    pub const L_UNIQUE_FILE_ID: u32 = long_id(b"UFID");
    pub const L_TITLE: u32 = long_id(b"TIT2");
    pub const L_ALBUM: u32 = long_id(b"TALB");
    pub const L_ARTIST: u32 = long_id(b"TPE1");
    pub const L_ALBUM_ARTIST: u32 = long_id(b"TPE2");
    pub const L_COMPOSER: u32 = long_id(b"TCOM");
    pub const L_LYRICIST: u32 = long_id(b"TEXT");
    pub const L_GENRE: u32 = long_id(b"TCON");
    pub const L_YEAR: u32 = long_id(b"TYER");
    pub const L_RECORD_DATE: u32 = long_id(b"TDRC");
    pub const L_RECORDING_DATES: u32 = long_id(b"TDAT");
    pub const L_COMMENT: u32 = long_id(b"COMM");
    pub const L_TRACK_POSITION: u32 = long_id(b"TRCK");
    pub const L_DISK_POSITION: u32 = long_id(b"TPOS");
    pub const L_BPM: u32 = long_id(b"TBPM");
    pub const L_ENCODER: u32 = long_id(b"TENC");
    pub const L_ENCODER_SETTINGS: u32 = long_id(b"TSSE");
    pub const L_LYRICS: u32 = long_id(b"USLT");
    pub const L_RECORD_LABEL: u32 = long_id(b"TPUB");
    pub const L_COPYRIGHT: u32 = long_id(b"TCOP");
    pub const L_COVER: u32 = long_id(b"APIC");
    pub const L_RATING: u32 = long_id(b"POPM");
    pub const L_USER_TEXT: u32 = long_id(b"TXXX");

    pub const S_UNIQUE_FILE_ID: u32 = short_id(b"UFI");
    pub const S_TITLE: u32 = short_id(b"TT2");
    pub const S_ALBUM: u32 = short_id(b"TAL");
    pub const S_ARTIST: u32 = short_id(b"TP1");
    pub const S_ALBUM_ARTIST: u32 = short_id(b"TP2");
    pub const S_COMPOSER: u32 = short_id(b"TCM");
    pub const S_LYRICIST: u32 = short_id(b"TXT");
    pub const S_GENRE: u32 = short_id(b"TCO");
    pub const S_YEAR: u32 = short_id(b"TYE");
    pub const S_COMMENT: u32 = short_id(b"COM");
    pub const S_TRACK_POSITION: u32 = short_id(b"TRK");
    pub const S_DISK_POSITION: u32 = short_id(b"TPA");
    pub const S_BPM: u32 = short_id(b"TBP");
    pub const S_ENCODER: u32 = short_id(b"TEN");
    pub const S_ENCODER_SETTINGS: u32 = short_id(b"TSS");
    pub const S_LYRICS: u32 = short_id(b"ULT");
    pub const S_RECORD_LABEL: u32 = short_id(b"TPB");
    pub const S_COPYRIGHT: u32 = short_id(b"TCR");
    pub const S_COVER: u32 = short_id(b"PIC");
    pub const S_USER_TEXT: u32 = short_id(b"TXX");
}

/// Whether the ID is a four-character (ID3v2.3/2.4) frame ID.
pub fn is_long_id(id: u32) -> bool {
    id & 0xFF00_0000 != 0
}

/// Whether the ID is a three-character (ID3v2.2) frame ID.
pub fn is_short_id(id: u32) -> bool {
    id != 0 && id & 0xFF00_0000 == 0
}

/// Whether the frame is a text frame (its code starts with `T`).
pub fn is_text_frame(id: u32) -> bool {
    let first = if is_long_id(id) { (id >> 24) as u8 } else { (id >> 16) as u8 };
    first == b'T' && id != frame_ids::L_USER_TEXT && id != frame_ids::S_USER_TEXT
}

/// Maps a long frame ID onto its ID3v2.2 equivalent (0 when none exists).
pub fn convert_to_short_id(id: u32) -> u32 {
    use frame_ids::*;
    match id {
        L_UNIQUE_FILE_ID => S_UNIQUE_FILE_ID,
        L_TITLE => S_TITLE,
        L_ALBUM => S_ALBUM,
        L_ARTIST => S_ARTIST,
        L_ALBUM_ARTIST => S_ALBUM_ARTIST,
        L_COMPOSER => S_COMPOSER,
        L_LYRICIST => S_LYRICIST,
        L_GENRE => S_GENRE,
        L_YEAR | L_RECORD_DATE => S_YEAR,
        L_COMMENT => S_COMMENT,
        L_TRACK_POSITION => S_TRACK_POSITION,
        L_DISK_POSITION => S_DISK_POSITION,
        L_BPM => S_BPM,
        L_ENCODER => S_ENCODER,
        L_ENCODER_SETTINGS => S_ENCODER_SETTINGS,
        L_LYRICS => S_LYRICS,
        L_RECORD_LABEL => S_RECORD_LABEL,
        L_COPYRIGHT => S_COPYRIGHT,
        L_COVER => S_COVER,
        L_USER_TEXT => S_USER_TEXT,
        _ => 0,
    }
}

/// Maps an ID3v2.2 frame ID onto its long equivalent (0 when none exists).
pub fn convert_to_long_id(id: u32) -> u32 {
    use frame_ids::*;
    match id {
        S_UNIQUE_FILE_ID => L_UNIQUE_FILE_ID,
        S_TITLE => L_TITLE,
        S_ALBUM => L_ALBUM,
        S_ARTIST => L_ARTIST,
        S_ALBUM_ARTIST => L_ALBUM_ARTIST,
        S_COMPOSER => L_COMPOSER,
        S_LYRICIST => L_LYRICIST,
        S_GENRE => L_GENRE,
        S_YEAR => L_YEAR,
        S_COMMENT => L_COMMENT,
        S_TRACK_POSITION => L_TRACK_POSITION,
        S_DISK_POSITION => L_DISK_POSITION,
        S_BPM => L_BPM,
        S_ENCODER => L_ENCODER,
        S_ENCODER_SETTINGS => L_ENCODER_SETTINGS,
        S_LYRICS => L_LYRICS,
        S_RECORD_LABEL => L_RECORD_LABEL,
        S_COPYRIGHT => L_COPYRIGHT,
        S_COVER => L_COVER,
        S_USER_TEXT => L_USER_TEXT,
        _ => 0,
    }
}

/// The display form of a frame ID ("TIT2", "TT2").
pub fn id_to_string(id: u32) -> String {
    let bytes = id.to_be_bytes();
    let start = if is_long_id(id) { 0 } else { 1 };
    bytes[start..].iter().map(|&b| char::from(b)).collect()
}

/// An ID3v2 frame identifier.
///
/// Ordering implements the frame write order: the unique file ID first,
/// then the title, then other text frames, then everything else, with the
/// cover always last; ties fall back to ascending numeric order. Readers
/// that stop at the first recognized frame this way see the most
/// identifying fields first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FrameId(
    /// The numeric frame ID (24-bit for ID3v2.2, 32-bit otherwise).
    pub u32,
);

impl FrameId {
    /// The display form of the ID.
    pub fn as_string(self) -> String {
        id_to_string(self.0)
    }
}

impl FieldId for FrameId {
    fn cmp_ids(&self, other: &Self) -> Ordering {
        use frame_ids::*;
        let (lhs, rhs) = (self.0, other.0);
        if lhs == rhs {
            return Ordering::Equal;
        }
        let tier = |id: u32| -> u8 {
            match id {
                L_UNIQUE_FILE_ID | S_UNIQUE_FILE_ID => 0,
                L_TITLE | S_TITLE => 1,
                L_COVER | S_COVER => 4,
                _ if is_text_frame(id) => 2,
                _ => 3,
            }
        };
        tier(lhs).cmp(&tier(rhs)).then(lhs.cmp(&rhs))
    }

    fn same_field(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_classification() {
        assert!(is_long_id(frame_ids::L_TITLE));
        assert!(!is_short_id(frame_ids::L_TITLE));
        assert!(is_short_id(frame_ids::S_TITLE));
        assert!(is_text_frame(frame_ids::L_TITLE));
        assert!(is_text_frame(frame_ids::S_GENRE));
        assert!(!is_text_frame(frame_ids::L_COVER));
        assert!(!is_text_frame(frame_ids::L_USER_TEXT));
        assert_eq!(id_to_string(frame_ids::L_TITLE), "TIT2");
        assert_eq!(id_to_string(frame_ids::S_TITLE), "TT2");
    }

    #[test]
    fn long_short_conversion_round_trips() {
        for id in [
            frame_ids::L_TITLE,
            frame_ids::L_ALBUM,
            frame_ids::L_COVER,
            frame_ids::L_COMMENT,
        ] {
            assert_eq!(convert_to_long_id(convert_to_short_id(id)), id);
        }
        assert_eq!(convert_to_short_id(long_id(b"WXXX")), 0);
    }

    #[test]
    fn comparer_tiers() {
        use frame_ids::*;
        let order = [L_UNIQUE_FILE_ID, L_TITLE, L_ALBUM, L_COMMENT, L_COVER];
        for window in order.windows(2) {
            assert_eq!(
                FrameId(window[0]).cmp_ids(&FrameId(window[1])),
                Ordering::Less,
                "{} < {}",
                id_to_string(window[0]),
                id_to_string(window[1])
            );
        }
    }

    #[test]
    fn comparer_is_a_strict_weak_order() {
        use frame_ids::*;
        let ids = [
            L_UNIQUE_FILE_ID, L_TITLE, L_ALBUM, L_ARTIST, L_GENRE, L_COMMENT, L_COVER, L_RATING,
            S_TITLE, S_COVER, L_USER_TEXT,
        ];
        for &a in &ids {
            // irreflexive
            assert_eq!(FrameId(a).cmp_ids(&FrameId(a)), Ordering::Equal);
            for &b in &ids {
                // asymmetric
                let ab = FrameId(a).cmp_ids(&FrameId(b));
                let ba = FrameId(b).cmp_ids(&FrameId(a));
                assert_eq!(ab, ba.reverse());
                for &c in &ids {
                    // transitive
                    if FrameId(a).cmp_ids(&FrameId(b)) == Ordering::Less
                        && FrameId(b).cmp_ids(&FrameId(c)) == Ordering::Less
                    {
                        assert_eq!(FrameId(a).cmp_ids(&FrameId(c)), Ordering::Less);
                    }
                }
            }
        }
    }
}

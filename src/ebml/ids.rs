//! EBML and Matroska element IDs.
//!
//! IDs are stored with their length-marker bit, so the constants read the
//! same as they appear on the wire. Names follow the Matroska
//! specification.
#![allow(missing_docs)]

use crate::vint::ElementId;

// EBML core
pub const HEADER: ElementId = 0x1A45_DFA3;
pub const VERSION: ElementId = 0x4286;
pub const READ_VERSION: ElementId = 0x42F7;
pub const MAX_ID_LENGTH: ElementId = 0x42F2;
pub const MAX_SIZE_LENGTH: ElementId = 0x42F3;
pub const DOC_TYPE: ElementId = 0x4282;
pub const DOC_TYPE_VERSION: ElementId = 0x4287;
pub const DOC_TYPE_READ_VERSION: ElementId = 0x4285;
pub const VOID: ElementId = 0xEC;
pub const CRC32: ElementId = 0xBF;
pub const SIGNATURE_SLOT: ElementId = 0x1B53_8667;
pub const SIGNATURE_ELEMENTS: ElementId = 0x7E5B;
pub const SIGNATURE_ELEMENT_LIST: ElementId = 0x7E7B;

// Matroska top level
pub const SEGMENT: ElementId = 0x1853_8067;
pub const SEEK_HEAD: ElementId = 0x114D_9B74;
pub const SEGMENT_INFO: ElementId = 0x1549_A966;
pub const TRACKS: ElementId = 0x1654_AE6B;
pub const CUES: ElementId = 0x1C53_BB6B;
pub const TAGS: ElementId = 0x1254_C367;
pub const CLUSTER: ElementId = 0x1F43_B675;
pub const ATTACHMENTS: ElementId = 0x1941_A469;
pub const CHAPTERS: ElementId = 0x1043_A770;

// SeekHead
pub const SEEK: ElementId = 0x4DBB;
pub const SEEK_ID: ElementId = 0x53AB;
pub const SEEK_POSITION: ElementId = 0x53AC;

// SegmentInfo
pub const TIMESTAMP_SCALE: ElementId = 0x2A_D7B1;
pub const DURATION: ElementId = 0x4489;
pub const DATE_UTC: ElementId = 0x4461;
pub const TITLE: ElementId = 0x7BA9;
pub const MUXING_APP: ElementId = 0x4D80;
pub const WRITING_APP: ElementId = 0x5741;
pub const SEGMENT_UID: ElementId = 0x73A4;
pub const CHAPTER_TRANSLATE: ElementId = 0x6924;

// Cluster
pub const TIMESTAMP: ElementId = 0xE7;
pub const POSITION: ElementId = 0xA7;
pub const PREV_SIZE: ElementId = 0xAB;
pub const SIMPLE_BLOCK: ElementId = 0xA3;
pub const BLOCK_GROUP: ElementId = 0xA0;
pub const BLOCK: ElementId = 0xA1;
pub const BLOCK_ADDITIONS: ElementId = 0x75A1;
pub const BLOCK_MORE: ElementId = 0xA6;
pub const BLOCK_DURATION: ElementId = 0x9B;
pub const REFERENCE_BLOCK: ElementId = 0xFB;
pub const SILENT_TRACKS: ElementId = 0x5854;
pub const SLICES: ElementId = 0x8E;
pub const TIME_SLICE: ElementId = 0xE8;
pub const REFERENCE_FRAME: ElementId = 0xC8;

// Tracks
pub const TRACK_ENTRY: ElementId = 0xAE;
pub const TRACK_NUMBER: ElementId = 0xD7;
pub const TRACK_UID: ElementId = 0x73C5;
pub const TRACK_TYPE: ElementId = 0x83;
pub const TRACK_FLAG_ENABLED: ElementId = 0xB9;
pub const TRACK_FLAG_DEFAULT: ElementId = 0x88;
pub const TRACK_FLAG_FORCED: ElementId = 0x55AA;
pub const TRACK_FLAG_LACING: ElementId = 0x9C;
pub const TRACK_NAME: ElementId = 0x536E;
pub const TRACK_LANGUAGE: ElementId = 0x22_B59C;
pub const TRACK_LANGUAGE_IETF: ElementId = 0x22_B59D;
pub const CODEC_ID: ElementId = 0x86;
pub const CODEC_NAME: ElementId = 0x25_8688;
pub const CODEC_PRIVATE: ElementId = 0x63A2;
pub const DEFAULT_DURATION: ElementId = 0x23_E383;
pub const TRACK_TRANSLATE: ElementId = 0x6624;
pub const TRACK_VIDEO: ElementId = 0xE0;
pub const TRACK_AUDIO: ElementId = 0xE1;
pub const TRACK_OPERATION: ElementId = 0xE2;
pub const TRACK_COMBINE_PLANES: ElementId = 0xE3;
pub const TRACK_PLANE: ElementId = 0xE4;
pub const TRACK_JOIN_BLOCKS: ElementId = 0xE9;
pub const CONTENT_ENCODINGS: ElementId = 0x6D80;
pub const CONTENT_ENCODING: ElementId = 0x6240;
pub const CONTENT_COMPRESSION: ElementId = 0x5034;
pub const CONTENT_ENCRYPTION: ElementId = 0x5035;
pub const PIXEL_WIDTH: ElementId = 0xB0;
pub const PIXEL_HEIGHT: ElementId = 0xBA;
pub const FLAG_INTERLACED: ElementId = 0x9A;
pub const SAMPLING_FREQUENCY: ElementId = 0xB5;
pub const CHANNELS: ElementId = 0x9F;
pub const BIT_DEPTH: ElementId = 0x6264;

// Cues
pub const CUE_POINT: ElementId = 0xBB;
pub const CUE_TIME: ElementId = 0xB3;
pub const CUE_TRACK_POSITIONS: ElementId = 0xB7;
pub const CUE_TRACK: ElementId = 0xF7;
pub const CUE_CLUSTER_POSITION: ElementId = 0xF1;
pub const CUE_RELATIVE_POSITION: ElementId = 0xF0;
pub const CUE_DURATION: ElementId = 0xB2;
pub const CUE_BLOCK_NUMBER: ElementId = 0x5378;
pub const CUE_CODEC_STATE: ElementId = 0xEA;
pub const CUE_REFERENCE: ElementId = 0xDB;
pub const CUE_REF_TIME: ElementId = 0x96;

// Tags
pub const TAG: ElementId = 0x7373;
pub const TARGETS: ElementId = 0x63C0;
pub const TARGET_TYPE_VALUE: ElementId = 0x68CA;
pub const TARGET_TYPE: ElementId = 0x63CA;
pub const TAG_TRACK_UID: ElementId = 0x63C5;
pub const TAG_EDITION_UID: ElementId = 0x63C9;
pub const TAG_CHAPTER_UID: ElementId = 0x63C4;
pub const TAG_ATTACHMENT_UID: ElementId = 0x63C6;
pub const SIMPLE_TAG: ElementId = 0x67C8;
pub const TAG_NAME: ElementId = 0x45A3;
pub const TAG_LANGUAGE: ElementId = 0x447A;
pub const TAG_LANGUAGE_IETF: ElementId = 0x447B;
pub const TAG_DEFAULT: ElementId = 0x4484;
pub const TAG_STRING: ElementId = 0x4487;
pub const TAG_BINARY: ElementId = 0x4485;

// Attachments
pub const ATTACHED_FILE: ElementId = 0x61A7;
pub const FILE_DESCRIPTION: ElementId = 0x467E;
pub const FILE_NAME: ElementId = 0x466E;
pub const FILE_MIME_TYPE: ElementId = 0x4660;
pub const FILE_DATA: ElementId = 0x465C;
pub const FILE_UID: ElementId = 0x46AE;

// Chapters
pub const EDITION_ENTRY: ElementId = 0x45B9;
pub const EDITION_UID: ElementId = 0x45BC;
pub const EDITION_FLAG_HIDDEN: ElementId = 0x45BD;
pub const EDITION_FLAG_DEFAULT: ElementId = 0x45DB;
pub const EDITION_FLAG_ORDERED: ElementId = 0x45DD;
pub const CHAPTER_ATOM: ElementId = 0xB6;
pub const CHAPTER_UID: ElementId = 0x73C4;
pub const CHAPTER_TIME_START: ElementId = 0x91;
pub const CHAPTER_TIME_END: ElementId = 0x92;
pub const CHAPTER_FLAG_HIDDEN: ElementId = 0x98;
pub const CHAPTER_FLAG_ENABLED: ElementId = 0x4598;
pub const CHAPTER_TRACK: ElementId = 0x8F;
pub const CHAPTER_TRACK_NUMBER: ElementId = 0x89;
pub const CHAPTER_DISPLAY: ElementId = 0x80;
pub const CHAP_STRING: ElementId = 0x85;
pub const CHAP_LANGUAGE: ElementId = 0x437C;
pub const CHAP_LANGUAGE_IETF: ElementId = 0x437D;
pub const CHAP_COUNTRY: ElementId = 0x437E;
pub const CHAP_PROCESS: ElementId = 0x6944;
pub const CHAP_PROCESS_COMMAND: ElementId = 0x6911;

/// Whether elements with this ID contain child elements. Parenthood is
/// intrinsic to the ID; unknown IDs are treated as non-parents.
pub fn is_parent(id: ElementId) -> bool {
    matches!(
        id,
        HEADER
            | SIGNATURE_SLOT
            | SIGNATURE_ELEMENTS
            | SIGNATURE_ELEMENT_LIST
            | SEGMENT
            | SEEK_HEAD
            | SEEK
            | SEGMENT_INFO
            | CHAPTER_TRANSLATE
            | CLUSTER
            | SILENT_TRACKS
            | BLOCK_GROUP
            | BLOCK_ADDITIONS
            | BLOCK_MORE
            | SLICES
            | TIME_SLICE
            | REFERENCE_FRAME
            | TRACKS
            | TRACK_ENTRY
            | TRACK_TRANSLATE
            | TRACK_VIDEO
            | TRACK_AUDIO
            | TRACK_OPERATION
            | TRACK_COMBINE_PLANES
            | TRACK_PLANE
            | TRACK_JOIN_BLOCKS
            | CONTENT_ENCODINGS
            | CONTENT_ENCODING
            | CONTENT_COMPRESSION
            | CONTENT_ENCRYPTION
            | CUES
            | CUE_POINT
            | CUE_TRACK_POSITIONS
            | CUE_REFERENCE
            | ATTACHMENTS
            | ATTACHED_FILE
            | CHAPTERS
            | EDITION_ENTRY
            | CHAPTER_ATOM
            | CHAPTER_TRACK
            | CHAPTER_DISPLAY
            | CHAP_PROCESS
            | CHAP_PROCESS_COMMAND
            | TAGS
            | TAG
            | TARGETS
            | SIMPLE_TAG
    )
}

/// Whether elements with this ID are padding.
pub fn is_padding(id: ElementId) -> bool {
    id == VOID
}

/// Display name for the IDs the drivers deal with; the raw ID in hex for
/// everything else would be noise, so unknown IDs yield `None`.
pub fn name(id: ElementId) -> Option<&'static str> {
    Some(match id {
        HEADER => "EBML",
        SEGMENT => "Segment",
        SEEK_HEAD => "SeekHead",
        SEGMENT_INFO => "Info",
        TRACKS => "Tracks",
        CUES => "Cues",
        TAGS => "Tags",
        CLUSTER => "Cluster",
        ATTACHMENTS => "Attachments",
        CHAPTERS => "Chapters",
        VOID => "Void",
        CRC32 => "CRC-32",
        _ => return None,
    })
}

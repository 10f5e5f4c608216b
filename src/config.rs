//! Configuration for parsing and saving.

use crate::tag::target::TagTarget;
use bitflags::bitflags;

bitflags! {
    /// Options recognized by the parse and save paths.
    pub struct MediaFileFlags: u32 {
        /// Parse every element, even beyond the configured full-parse size.
        const FORCE_FULL_PARSE = 1 << 0;
        /// Take the rewrite path even when an in-place patch would do.
        const FORCE_REWRITE = 1 << 1;
        /// Honor the configured tag position even when it requires a rewrite.
        const FORCE_TAG_POSITION = 1 << 2;
        /// Honor the configured index position even when it requires a rewrite.
        const FORCE_INDEX_POSITION = 1 << 3;
        /// Rewrite known field aliases to their canonical IDs during parse.
        const NORMALIZE_KNOWN_TAG_FIELD_IDS = 1 << 4;
        /// Keep raw timing values instead of rescaling on save.
        const PRESERVE_RAW_TIMING_VALUES = 1 << 5;
        /// Do not replace the muxing application on save.
        const PRESERVE_MUXING_APPLICATION = 1 << 6;
        /// Do not replace the writing application on save.
        const PRESERVE_WRITING_APPLICATION = 1 << 7;
        /// Normalize ID3v2.3 record-date fields to the v2.4 form on parse.
        const CONVERT_RECORD_DATE_FIELDS = 1 << 8;
    }
}

impl Default for MediaFileFlags {
    fn default() -> Self {
        MediaFileFlags::empty()
    }
}

/// Where an element should be placed relative to the media data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ElementPosition {
    /// Keep the element where the original file had it.
    #[default]
    Keep,
    /// Place the element before the media data.
    BeforeData,
    /// Place the element after the media data.
    AfterData,
}

/// Whether a tag dialect should be used when creating tags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TagUsage {
    /// Use the dialect, creating a new tag when none exists.
    Always,
    /// Keep and update existing tags of the dialect but never create one.
    #[default]
    KeepExisting,
    /// Remove tags of the dialect.
    Never,
}

bitflags! {
    /// Options for `create_appropriate_tags`.
    pub struct TagCreationFlags: u32 {
        /// Treat files of unknown format as MP3 files.
        const TREAT_UNKNOWN_FILES_AS_MP3 = 1 << 0;
        /// Initialize newly created ID3 tags with values of present ones.
        const ID3_INIT_ON_CREATE = 1 << 1;
        /// Transfer values of removed ID3 tags to the remaining ones.
        const ID3_TRANSFER_VALUES_ON_REMOVAL = 1 << 2;
        /// Keep the version of existing ID3v2 tags.
        const KEEP_EXISTING_ID3V2_VERSION = 1 << 3;
    }
}

/// Settings for `create_appropriate_tags`.
#[derive(Debug, Clone)]
pub struct TagCreationSettings {
    /// Targets a tag must exist for (container formats with targets only).
    pub required_targets: Vec<TagTarget>,
    /// Creation options.
    pub flags: TagCreationFlags,
    /// ID3v1 policy for MP3 files.
    pub id3v1_usage: TagUsage,
    /// ID3v2 policy for MP3 files.
    pub id3v2_usage: TagUsage,
    /// Major version for newly created ID3v2 tags (3 or 4).
    pub id3v2_major_version: u8,
}

impl Default for TagCreationSettings {
    fn default() -> Self {
        Self {
            required_targets: Vec::new(),
            flags: TagCreationFlags::ID3_TRANSFER_VALUES_ON_REMOVAL
                | TagCreationFlags::KEEP_EXISTING_ID3V2_VERSION,
            id3v1_usage: TagUsage::KeepExisting,
            id3v2_usage: TagUsage::Always,
            id3v2_major_version: 3,
        }
    }
}

/// Parse and save configuration of a media file.
#[derive(Debug, Clone)]
pub struct MediaFileConfig {
    /// Option flags.
    pub flags: MediaFileFlags,
    /// Desired position of tag elements.
    pub tag_position: ElementPosition,
    /// Desired position of index elements (Matroska Cues).
    pub index_position: ElementPosition,
    /// Smallest amount of padding that may remain after an in-place save.
    pub min_padding: u64,
    /// Largest amount of padding that may remain after an in-place save.
    pub max_padding: u64,
    /// Amount of padding created on a full rewrite.
    pub preferred_padding: u64,
    /// Files larger than this are not fully scanned unless forced.
    pub max_full_parse_size: u64,
}

impl Default for MediaFileConfig {
    fn default() -> Self {
        Self {
            flags: MediaFileFlags::default(),
            tag_position: ElementPosition::BeforeData,
            index_position: ElementPosition::Keep,
            min_padding: 0,
            max_padding: 0,
            preferred_padding: 0,
            max_full_parse_size: 0x3200000, // 50 MiB
        }
    }
}

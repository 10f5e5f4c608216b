//! Tag targets: what part of the file a tag applies to.

use std::fmt;

/// Semantic levels a tag target can address, mirroring the Matroska
/// target-value scale (10 = shot ... 70 = collection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TagTargetLevel {
    /// Level is not specified.
    #[default]
    Unspecified,
    /// The lowest level, e.g. a single shot.
    Shot,
    /// A subtrack, movement or scene.
    Subtrack,
    /// A single track or song.
    Track,
    /// A part or session.
    Part,
    /// An album, movie or episode.
    Album,
    /// An edition, issue, volume or opus.
    Edition,
    /// The highest level, a collection.
    Collection,
}

impl TagTargetLevel {
    /// The Matroska target-value for this level (0 when unspecified).
    pub fn value(self) -> u64 {
        match self {
            TagTargetLevel::Unspecified => 0,
            TagTargetLevel::Shot => 10,
            TagTargetLevel::Subtrack => 20,
            TagTargetLevel::Track => 30,
            TagTargetLevel::Part => 40,
            TagTargetLevel::Album => 50,
            TagTargetLevel::Edition => 60,
            TagTargetLevel::Collection => 70,
        }
    }

    /// Maps a Matroska target-value onto a level; values between two steps
    /// map onto the lower one.
    pub fn from_value(value: u64) -> Self {
        match value {
            0..=9 => TagTargetLevel::Unspecified,
            10..=19 => TagTargetLevel::Shot,
            20..=29 => TagTargetLevel::Subtrack,
            30..=39 => TagTargetLevel::Track,
            40..=49 => TagTargetLevel::Part,
            50..=59 => TagTargetLevel::Album,
            60..=69 => TagTargetLevel::Edition,
            _ => TagTargetLevel::Collection,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            TagTargetLevel::Unspecified => "",
            TagTargetLevel::Shot => "shot",
            TagTargetLevel::Subtrack => "subtrack, movement, scene",
            TagTargetLevel::Track => "track, song, chapter",
            TagTargetLevel::Part => "part, session",
            TagTargetLevel::Album => "album, opera, concert, movie, episode",
            TagTargetLevel::Edition => "edition, issue, volume, opus",
            TagTargetLevel::Collection => "collection",
        }
    }
}

/// Describes which tracks, editions, chapters or attachments a tag applies
/// to, at which semantic level.
///
/// Equality compares everything except the level name; [`TagTarget::matches`]
/// additionally treats empty specifications as wildcards so field writes can
/// be routed to the most specific tag.
#[derive(Debug, Clone, Default)]
pub struct TagTarget {
    /// Target level value (0 = unspecified).
    pub level: u64,
    /// Free-form level name overriding the standard name for `level`.
    pub level_name: String,
    /// UIDs of the tracks the tag applies to.
    pub tracks: Vec<u64>,
    /// UIDs of the chapters the tag applies to.
    pub chapters: Vec<u64>,
    /// UIDs of the editions the tag applies to.
    pub editions: Vec<u64>,
    /// UIDs of the attachments the tag applies to.
    pub attachments: Vec<u64>,
}

impl TagTarget {
    /// A target with only a level set.
    pub fn with_level(level: TagTargetLevel) -> Self {
        Self { level: level.value(), ..Self::default() }
    }

    /// A target for specific tracks at the given level.
    pub fn for_tracks(level: TagTargetLevel, tracks: Vec<u64>) -> Self {
        Self { level: level.value(), tracks, ..Self::default() }
    }

    /// The semantic level of this target.
    pub fn level(&self) -> TagTargetLevel {
        TagTargetLevel::from_value(self.level)
    }

    /// Whether nothing at all is specified.
    pub fn is_empty(&self) -> bool {
        self.level == 0
            && self.level_name.is_empty()
            && self.tracks.is_empty()
            && self.chapters.is_empty()
            && self.editions.is_empty()
            && self.attachments.is_empty()
    }

    /// Resets to the default target.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether every non-empty specification of `self` (level name aside)
    /// equals the corresponding specification of `other`.
    pub fn matches(&self, other: &TagTarget) -> bool {
        (self.level == 0 || self.level == other.level)
            && (self.tracks.is_empty() || self.tracks == other.tracks)
            && (self.chapters.is_empty() || self.chapters == other.chapters)
            && (self.editions.is_empty() || self.editions == other.editions)
            && (self.attachments.is_empty() || self.attachments == other.attachments)
    }
}

impl PartialEq for TagTarget {
    fn eq(&self, other: &Self) -> bool {
        // the level name is presentation only
        self.level == other.level
            && self.tracks == other.tracks
            && self.chapters == other.chapters
            && self.editions == other.editions
            && self.attachments == other.attachments
    }
}

impl Eq for TagTarget {}

impl fmt::Display for TagTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("default target");
        }
        let mut written = false;
        if self.level != 0 {
            let name = if self.level_name.is_empty() {
                self.level().name()
            } else {
                &self.level_name
            };
            write!(f, "level {}", self.level)?;
            if !name.is_empty() {
                write!(f, " '{name}'")?;
            }
            written = true;
        }
        for (label, ids) in [
            ("track", &self.tracks),
            ("chapter", &self.chapters),
            ("edition", &self.editions),
            ("attachment", &self.attachments),
        ] {
            for id in ids {
                if written {
                    f.write_str(", ")?;
                }
                write!(f, "{label} {id}")?;
                written = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_mapping_is_decadal() {
        assert_eq!(TagTargetLevel::from_value(0), TagTargetLevel::Unspecified);
        assert_eq!(TagTargetLevel::from_value(30), TagTargetLevel::Track);
        assert_eq!(TagTargetLevel::from_value(35), TagTargetLevel::Track);
        assert_eq!(TagTargetLevel::from_value(50), TagTargetLevel::Album);
        assert_eq!(TagTargetLevel::from_value(70), TagTargetLevel::Collection);
        assert_eq!(TagTargetLevel::from_value(99), TagTargetLevel::Collection);
        assert_eq!(TagTargetLevel::Album.value(), 50);
    }

    #[test]
    fn equality_ignores_level_name() {
        let mut a = TagTarget::with_level(TagTargetLevel::Album);
        let mut b = TagTarget::with_level(TagTargetLevel::Album);
        a.level_name = "album".into();
        b.level_name = "LP".into();
        assert_eq!(a, b);
        b.tracks.push(1);
        assert_ne!(a, b);
    }

    #[test]
    fn matches_treats_empty_as_wildcard() {
        let general = TagTarget::default();
        let album = TagTarget::with_level(TagTargetLevel::Album);
        let track = TagTarget::for_tracks(TagTargetLevel::Track, vec![3]);
        assert!(general.matches(&album));
        assert!(general.matches(&track));
        assert!(!album.matches(&track));
        assert!(TagTarget::with_level(TagTargetLevel::Track).matches(&track));
    }
}

//! Chapters and locale-aware strings.

use crate::tag::value::TimeSpan;

/// A string with the languages/countries it applies to, as used by
/// chapter display names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleAwareString {
    /// The string itself.
    pub value: String,
    /// ISO-639-2 language codes.
    pub languages: Vec<String>,
    /// IETF (BCP-47) language tags.
    pub ietf_languages: Vec<String>,
    /// Country codes.
    pub countries: Vec<String>,
}

impl LocaleAwareString {
    /// A plain string with no locale information.
    pub fn plain(value: impl Into<String>) -> Self {
        Self { value: value.into(), ..Self::default() }
    }
}

/// A chapter, possibly nested.
#[derive(Debug, Clone, Default)]
pub struct Chapter {
    /// Unique ID within the container.
    pub id: u64,
    /// Start of the chapter.
    pub start_time: Option<TimeSpan>,
    /// End of the chapter.
    pub end_time: Option<TimeSpan>,
    /// Display names, one per locale.
    pub names: Vec<LocaleAwareString>,
    /// UIDs of the tracks the chapter applies to (empty = all).
    pub tracks: Vec<u64>,
    /// Whether the chapter is hidden.
    pub hidden: bool,
    /// Whether the chapter is enabled.
    pub enabled: bool,
    /// Nested chapters.
    pub nested: Vec<Chapter>,
}

impl Chapter {
    /// The display name best matching no locale preference: simply the
    /// first one.
    pub fn display_name(&self) -> Option<&str> {
        self.names.first().map(|n| n.value.as_str())
    }

    /// A short description for diagnostics.
    pub fn label(&self) -> String {
        match self.display_name() {
            Some(name) => format!("chapter '{name}'"),
            None => format!("chapter {}", self.id),
        }
    }
}

/// An edition: a set of top-level chapters with ordering flags.
#[derive(Debug, Clone, Default)]
pub struct Edition {
    /// Unique ID within the container.
    pub id: u64,
    /// Whether the edition is hidden.
    pub hidden: bool,
    /// Whether the edition is the default one.
    pub default: bool,
    /// Whether chapters are meant to be played in order.
    pub ordered: bool,
    /// The edition's chapters.
    pub chapters: Vec<Chapter>,
}

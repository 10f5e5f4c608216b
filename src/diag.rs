//! Diagnostic messages collected while parsing and writing.

use std::fmt;

/// Severity of a diagnostic message.
///
/// The ordering is meaningful: `Diagnostics::level` reports the maximum
/// severity seen so far.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DiagLevel {
    /// No diagnostics recorded.
    #[default]
    None,
    /// Informational message.
    Information,
    /// Something odd was found but a usable result was produced.
    Warning,
    /// The operation could not produce a usable result.
    Critical,
}

impl fmt::Display for DiagLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagLevel::None => "none",
            DiagLevel::Information => "information",
            DiagLevel::Warning => "warning",
            DiagLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A single diagnostic message with its severity and the context it was
/// recorded in (e.g. "parsing Ogg page header").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagMessage {
    /// Severity of the message.
    pub level: DiagLevel,
    /// Human-readable message.
    pub message: String,
    /// The operation the message was recorded in.
    pub context: &'static str,
}

impl fmt::Display for DiagMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.level, self.message, self.context)
    }
}

/// An append-only log of diagnostic messages.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    messages: Vec<DiagMessage>,
}

impl Diagnostics {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message. Also mirrors it to the `log` facade so library
    /// consumers without a diagnostics sink still see problems.
    pub fn push(&mut self, level: DiagLevel, message: impl Into<String>, context: &'static str) {
        let message = message.into();
        match level {
            DiagLevel::Critical => log::error!("{context}: {message}"),
            DiagLevel::Warning => log::warn!("{context}: {message}"),
            _ => log::debug!("{context}: {message}"),
        }
        self.messages.push(DiagMessage { level, message, context });
    }

    /// Records an informational message.
    pub fn info(&mut self, message: impl Into<String>, context: &'static str) {
        self.push(DiagLevel::Information, message, context);
    }

    /// Records a warning.
    pub fn warn(&mut self, message: impl Into<String>, context: &'static str) {
        self.push(DiagLevel::Warning, message, context);
    }

    /// Records a critical message.
    pub fn critical(&mut self, message: impl Into<String>, context: &'static str) {
        self.push(DiagLevel::Critical, message, context);
    }

    /// The maximum severity recorded so far.
    pub fn level(&self) -> DiagLevel {
        self.messages
            .iter()
            .map(|m| m.level)
            .max()
            .unwrap_or(DiagLevel::None)
    }

    /// Whether any message of `level` or above has been recorded.
    pub fn has_level(&self, level: DiagLevel) -> bool {
        self.level() >= level
    }

    /// All recorded messages in order.
    pub fn messages(&self) -> &[DiagMessage] {
        &self.messages
    }

    /// Moves all messages out of `other` into this log.
    pub fn absorb(&mut self, other: &mut Diagnostics) {
        self.messages.append(&mut other.messages);
    }

    /// Drops all recorded messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_maximum_seen() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.level(), DiagLevel::None);
        diag.info("opened file", "test");
        assert_eq!(diag.level(), DiagLevel::Information);
        diag.critical("broken header", "test");
        diag.warn("odd padding", "test");
        assert_eq!(diag.level(), DiagLevel::Critical);
        assert_eq!(diag.messages().len(), 3);
    }

    #[test]
    fn absorb_moves_messages() {
        let mut a = Diagnostics::new();
        let mut b = Diagnostics::new();
        b.warn("from b", "test");
        a.absorb(&mut b);
        assert_eq!(a.level(), DiagLevel::Warning);
        assert!(b.messages().is_empty());
    }
}

//! The value a tag field carries, abstracted over tag dialects.

use crate::error::{Error, Result};
use crate::tag::genres;
use crate::text::{self, TextEncoding};
use std::fmt;

/// Ticks per second of a [`TimeSpan`] (one tick is a hundred nanoseconds).
pub const TICKS_PER_SECOND: i128 = 10_000_000;

/// A length of time in hundred-nanosecond ticks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TimeSpan {
    ticks: i128,
}

impl TimeSpan {
    /// Creates a span from raw ticks.
    pub fn from_ticks(ticks: i128) -> Self {
        Self { ticks }
    }

    /// Creates a span from whole seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        Self { ticks: seconds as i128 * TICKS_PER_SECOND }
    }

    /// Creates a span from milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self { ticks: millis as i128 * (TICKS_PER_SECOND / 1000) }
    }

    /// Creates a span from nanoseconds.
    pub fn from_nanos(nanos: i128) -> Self {
        Self { ticks: nanos / 100 }
    }

    /// Raw ticks.
    pub fn ticks(self) -> i128 {
        self.ticks
    }

    /// Total seconds, truncated.
    pub fn total_seconds(self) -> i64 {
        (self.ticks / TICKS_PER_SECOND) as i64
    }

    /// Total nanoseconds.
    pub fn total_nanos(self) -> i128 {
        self.ticks * 100
    }

    /// Whether the span is zero.
    pub fn is_zero(self) -> bool {
        self.ticks == 0
    }

    /// Parses `"HH:MM:SS"` or `"HH:MM:SS.fff"`.
    pub fn parse(text: &str) -> Result<Self> {
        let (clock, fraction) = match text.split_once('.') {
            Some((clock, fraction)) => (clock, Some(fraction)),
            None => (text, None),
        };
        let mut parts = clock.split(':');
        let mut value: i128 = 0;
        let mut count = 0;
        for part in &mut parts {
            let field: i128 = part
                .parse()
                .map_err(|_| Error::Conversion("malformed time span"))?;
            value = value * 60 + field;
            count += 1;
        }
        if count == 0 || count > 3 {
            return Err(Error::Conversion("malformed time span"));
        }
        let mut ticks = value * TICKS_PER_SECOND;
        if let Some(fraction) = fraction {
            if fraction.is_empty() || fraction.len() > 7 {
                return Err(Error::Conversion("malformed time span"));
            }
            let digits: i128 = fraction
                .parse()
                .map_err(|_| Error::Conversion("malformed time span"))?;
            ticks += digits * 10i128.pow(7 - fraction.len() as u32);
        }
        Ok(Self { ticks })
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_seconds = self.ticks / TICKS_PER_SECOND;
        let sub_ticks = (self.ticks % TICKS_PER_SECOND).unsigned_abs();
        let millis = sub_ticks / 10_000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;
        if millis != 0 {
            write!(f, "{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
        } else {
            write!(f, "{hours:02}:{minutes:02}:{seconds:02}")
        }
    }
}

/// A point in time, stored as hundred-nanosecond ticks since 0001-01-01.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DateTime {
    ticks: u64,
}

impl DateTime {
    /// Creates a date from raw ticks since 0001-01-01.
    pub fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    /// Creates a date from a calendar date at midnight.
    pub fn from_date(year: i64, month: u32, day: u32) -> Self {
        let days = days_from_civil(year, month, day);
        Self { ticks: (days as u64) * 86_400 * TICKS_PER_SECOND as u64 }
    }

    /// Raw ticks since 0001-01-01.
    pub fn ticks(self) -> u64 {
        self.ticks
    }

    /// Calendar date `(year, month, day)`.
    pub fn date(self) -> (i64, u32, u32) {
        civil_from_days((self.ticks / (86_400 * TICKS_PER_SECOND as u64)) as i64)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (year, month, day) = self.date();
        let day_ticks = self.ticks % (86_400 * TICKS_PER_SECOND as u64);
        let seconds = day_ticks / TICKS_PER_SECOND as u64;
        write!(
            f,
            "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}",
            seconds / 3600,
            (seconds / 60) % 60,
            seconds % 60
        )
    }
}

// days relative to 0001-01-01 (proleptic Gregorian)
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 306
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 306;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

/// The value of a tag field.
///
/// Dialects store their wire representation here and convert on demand;
/// conversions that would discard information fail with
/// [`Error::Conversion`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TagValue {
    /// No value.
    #[default]
    Empty,
    /// Text with its declared encoding.
    Text {
        /// Raw bytes in the declared encoding.
        bytes: Vec<u8>,
        /// The declared encoding.
        encoding: TextEncoding,
    },
    /// Signed integer.
    Integer(i64),
    /// Unsigned integer.
    UnsignedInteger(u64),
    /// A position within a set, e.g. track 3 of 12.
    PositionInSet {
        /// The position (0 = unknown).
        position: i32,
        /// The set size (0 = unknown).
        total: i32,
    },
    /// Index into the ID3v1 genre table.
    StandardGenreIndex(u32),
    /// A length of time.
    TimeSpan(TimeSpan),
    /// A point in time.
    DateTime(DateTime),
    /// Raw binary data.
    Binary(Vec<u8>),
    /// An attached picture.
    Picture {
        /// Raw picture data.
        bytes: Vec<u8>,
        /// MIME type of the picture data.
        mime: String,
        /// Free-form description.
        description: String,
    },
}

impl TagValue {
    /// Creates a UTF-8 text value.
    pub fn text(text: impl Into<String>) -> Self {
        TagValue::Text { bytes: text.into().into_bytes(), encoding: TextEncoding::Utf8 }
    }

    /// Creates a text value in the given encoding.
    pub fn text_with_encoding(text: &str, encoding: TextEncoding) -> Result<Self> {
        Ok(TagValue::Text { bytes: text::encode(encoding, text)?, encoding })
    }

    /// Whether the value holds no data.
    pub fn is_empty(&self) -> bool {
        match self {
            TagValue::Empty => true,
            TagValue::Text { bytes, .. } => bytes.is_empty(),
            TagValue::Binary(bytes) => bytes.is_empty(),
            TagValue::Picture { bytes, .. } => bytes.is_empty(),
            _ => false,
        }
    }

    /// The declared text encoding, if the value is text.
    pub fn encoding(&self) -> Option<TextEncoding> {
        match self {
            TagValue::Text { encoding, .. } => Some(*encoding),
            _ => None,
        }
    }

    /// Converts to a string.
    pub fn to_display_string(&self) -> Result<String> {
        match self {
            TagValue::Empty => Ok(String::new()),
            TagValue::Text { bytes, encoding } => text::decode(*encoding, bytes),
            TagValue::Integer(value) => Ok(value.to_string()),
            TagValue::UnsignedInteger(value) => Ok(value.to_string()),
            TagValue::PositionInSet { position, total } => {
                if *total != 0 {
                    Ok(format!("{position}/{total}"))
                } else {
                    Ok(position.to_string())
                }
            }
            TagValue::StandardGenreIndex(index) => genres::genre_name(*index)
                .map(str::to_string)
                .ok_or(Error::Conversion("genre index outside the standard table")),
            TagValue::TimeSpan(span) => Ok(span.to_string()),
            TagValue::DateTime(date) => Ok(date.to_string()),
            TagValue::Binary(_) | TagValue::Picture { .. } => {
                Err(Error::Conversion("binary data has no text form"))
            }
        }
    }

    /// Converts to a signed integer. Position-in-set converts lossily to
    /// its position only when no total is present.
    pub fn to_integer(&self) -> Result<i64> {
        match self {
            TagValue::Integer(value) => Ok(*value),
            TagValue::UnsignedInteger(value) => i64::try_from(*value)
                .map_err(|_| Error::Conversion("unsigned value exceeds the signed range")),
            TagValue::Text { bytes, encoding } => {
                let text = text::decode(*encoding, bytes)?;
                text.trim()
                    .parse()
                    .map_err(|_| Error::Conversion("text is not a decimal integer"))
            }
            TagValue::PositionInSet { position, total } => {
                if *total == 0 {
                    Ok(*position as i64)
                } else {
                    Err(Error::Conversion("dropping the total of a position-in-set"))
                }
            }
            TagValue::StandardGenreIndex(index) => Ok(*index as i64),
            TagValue::TimeSpan(span) => Ok(span.ticks() as i64),
            TagValue::Empty => Err(Error::NoDataProvided),
            _ => Err(Error::Conversion("value has no integer form")),
        }
    }

    /// Converts to an unsigned integer.
    pub fn to_unsigned_integer(&self) -> Result<u64> {
        match self {
            TagValue::UnsignedInteger(value) => Ok(*value),
            _ => {
                let value = self.to_integer()?;
                u64::try_from(value).map_err(|_| Error::Conversion("negative value"))
            }
        }
    }

    /// Converts to a position in a set; text parses as `"a"` or `"a/b"`.
    pub fn to_position_in_set(&self) -> Result<(i32, i32)> {
        match self {
            TagValue::PositionInSet { position, total } => Ok((*position, *total)),
            TagValue::Integer(value) => {
                let position = i32::try_from(*value)
                    .map_err(|_| Error::Conversion("position exceeds 32 bits"))?;
                Ok((position, 0))
            }
            TagValue::UnsignedInteger(value) => {
                let position = i32::try_from(*value)
                    .map_err(|_| Error::Conversion("position exceeds 32 bits"))?;
                Ok((position, 0))
            }
            TagValue::Text { bytes, encoding } => {
                let string = text::decode(*encoding, bytes)?;
                let text = string.trim();
                let (position, total) = match text.split_once('/') {
                    Some((a, b)) => (a, Some(b)),
                    None => (text, None),
                };
                let position = position
                    .parse()
                    .map_err(|_| Error::Conversion("text is not a position-in-set"))?;
                let total = match total {
                    Some(t) => t
                        .parse()
                        .map_err(|_| Error::Conversion("text is not a position-in-set"))?,
                    None => 0,
                };
                Ok((position, total))
            }
            TagValue::Empty => Err(Error::NoDataProvided),
            _ => Err(Error::Conversion("value has no position-in-set form")),
        }
    }

    /// Converts to a time span; text parses as `"HH:MM:SS.fff"`, integers
    /// are taken as raw ticks.
    pub fn to_time_span(&self) -> Result<TimeSpan> {
        match self {
            TagValue::TimeSpan(span) => Ok(*span),
            TagValue::Integer(value) => Ok(TimeSpan::from_ticks(*value as i128)),
            TagValue::UnsignedInteger(value) => Ok(TimeSpan::from_ticks(*value as i128)),
            TagValue::Text { bytes, encoding } => {
                TimeSpan::parse(&text::decode(*encoding, bytes)?)
            }
            TagValue::Empty => Err(Error::NoDataProvided),
            _ => Err(Error::Conversion("value has no time span form")),
        }
    }

    /// Converts to a standard genre index; text must name a genre from the
    /// table, integers must index into it.
    pub fn to_standard_genre_index(&self) -> Result<u32> {
        match self {
            TagValue::StandardGenreIndex(index) => Ok(*index),
            TagValue::Integer(_) | TagValue::UnsignedInteger(_) => {
                let index = self.to_unsigned_integer()?;
                let index = u32::try_from(index).map_err(|_| Error::Conversion("genre index outside the standard table"))?;
                if genres::genre_name(index).is_some() {
                    Ok(index)
                } else {
                    Err(Error::Conversion("genre index outside the standard table"))
                }
            }
            TagValue::Text { bytes, encoding } => {
                let name = text::decode(*encoding, bytes)?;
                genres::genre_index(&name)
                    .ok_or(Error::Conversion("genre name not in the standard table"))
            }
            TagValue::Empty => Err(Error::NoDataProvided),
            _ => Err(Error::Conversion("value has no genre form")),
        }
    }

    /// Converts to raw bytes: text reinterprets its encoded bytes,
    /// integers become big-endian, pictures yield their data.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        match self {
            TagValue::Binary(bytes) => Ok(bytes.clone()),
            TagValue::Text { bytes, .. } => Ok(bytes.clone()),
            TagValue::Integer(value) => Ok(value.to_be_bytes().to_vec()),
            TagValue::UnsignedInteger(value) => Ok(value.to_be_bytes().to_vec()),
            TagValue::Picture { bytes, .. } => Ok(bytes.clone()),
            TagValue::Empty => Err(Error::NoDataProvided),
            _ => Err(Error::Conversion("value has no binary form")),
        }
    }

    /// Re-encodes a text value in place, failing when a character cannot
    /// be represented in `encoding`.
    pub fn convert_encoding(&mut self, encoding: TextEncoding) -> Result<()> {
        if let TagValue::Text { bytes, encoding: current } = self {
            if *current != encoding {
                let decoded = text::decode(*current, bytes)?;
                *bytes = text::encode(encoding, &decoded)?;
                *current = encoding;
            }
        }
        Ok(())
    }
}

impl From<&str> for TagValue {
    fn from(text: &str) -> Self {
        TagValue::text(text)
    }
}

impl From<String> for TagValue {
    fn from(text: String) -> Self {
        TagValue::text(text)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Integer(value)
    }
}

impl From<u64> for TagValue {
    fn from(value: u64) -> Self {
        TagValue::UnsignedInteger(value)
    }
}

impl From<TimeSpan> for TagValue {
    fn from(span: TimeSpan) -> Self {
        TagValue::TimeSpan(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_span_formats_and_parses() {
        let test_pair = [
            ("00:00:00", 0i128),
            ("00:03:25", 205 * TICKS_PER_SECOND),
            ("01:00:00", 3600 * TICKS_PER_SECOND),
            ("00:00:01.500", TICKS_PER_SECOND + TICKS_PER_SECOND / 2),
        ];
        for (text, ticks) in test_pair {
            assert_eq!(TimeSpan::parse(text).unwrap().ticks(), ticks, "{text}");
            assert_eq!(TimeSpan::from_ticks(ticks).to_string(), text);
        }
        assert!(TimeSpan::parse("abc").is_err());
        assert!(TimeSpan::parse("1:2:3:4").is_err());
    }

    #[test]
    fn date_time_round_trip() {
        let date = DateTime::from_date(2004, 4, 16);
        assert_eq!(date.date(), (2004, 4, 16));
        assert_eq!(date.to_string(), "2004-04-16 00:00:00");
        let epoch = DateTime::from_date(1, 1, 1);
        assert_eq!(epoch.ticks(), 0);
    }

    #[test]
    fn text_to_integer() {
        assert_eq!(TagValue::text("42").to_integer().unwrap(), 42);
        assert_eq!(TagValue::text("-7").to_integer().unwrap(), -7);
        assert!(TagValue::text("4x").to_integer().is_err());
    }

    #[test]
    fn position_in_set_conversions() {
        assert_eq!(TagValue::text("3/12").to_position_in_set().unwrap(), (3, 12));
        assert_eq!(TagValue::text("3").to_position_in_set().unwrap(), (3, 0));
        let value = TagValue::PositionInSet { position: 3, total: 12 };
        assert_eq!(value.to_display_string().unwrap(), "3/12");
        // dropping the total loses information
        assert!(value.to_integer().is_err());
        let bare = TagValue::PositionInSet { position: 3, total: 0 };
        assert_eq!(bare.to_integer().unwrap(), 3);
    }

    #[test]
    fn genre_conversions() {
        assert_eq!(TagValue::text("Rock").to_standard_genre_index().unwrap(), 17);
        assert_eq!(
            TagValue::StandardGenreIndex(17).to_display_string().unwrap(),
            "Rock"
        );
        assert!(TagValue::StandardGenreIndex(9999).to_display_string().is_err());
    }

    #[test]
    fn binary_reinterprets() {
        assert_eq!(TagValue::text("ab").to_binary().unwrap(), b"ab");
        assert_eq!(
            TagValue::Integer(1).to_binary().unwrap(),
            vec![0, 0, 0, 0, 0, 0, 0, 1]
        );
        assert!(TagValue::Empty.to_binary().is_err());
    }

    #[test]
    fn encoding_conversion_checks_representability() {
        let mut value = TagValue::text("na\u{EF}ve");
        value.convert_encoding(TextEncoding::Latin1).unwrap();
        assert_eq!(value.encoding(), Some(TextEncoding::Latin1));
        assert_eq!(value.to_display_string().unwrap(), "na\u{EF}ve");

        let mut wide = TagValue::text("\u{4E16}\u{754C}");
        assert!(wide.convert_encoding(TextEncoding::Latin1).is_err());
    }
}

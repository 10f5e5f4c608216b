//! Text encoding and decoding for tag fields.

use crate::error::{Error, Result};

/// Text encodings a tag field can declare.
///
/// Not every dialect supports every encoding: Vorbis comments and Matroska
/// strings are always UTF-8, ID3v2 offers all of them, ID3v1 is Latin-1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// Encoding was not declared; bytes are passed through unchanged.
    #[default]
    Unspecified,
    /// ISO-8859-1.
    Latin1,
    /// UTF-8.
    Utf8,
    /// UTF-16 little-endian.
    Utf16Le,
    /// UTF-16 big-endian.
    Utf16Be,
}

impl TextEncoding {
    /// Size of the NUL terminator in this encoding.
    pub fn nul_size(self) -> usize {
        match self {
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => 2,
            _ => 1,
        }
    }
}

/// Decodes `data` into a string according to `encoding`.
///
/// Trailing NUL terminators are trimmed; plenty of writers append them even
/// to non-terminated fields. Fails with [`Error::Conversion`] when the data
/// does not round-trip through the declared encoding.
pub fn decode(encoding: TextEncoding, data: &[u8]) -> Result<String> {
    let data = match encoding.nul_size() {
        2 => data.strip_suffix(&[0, 0]).unwrap_or(data),
        _ => data.strip_suffix(&[0]).unwrap_or(data),
    };
    match encoding {
        TextEncoding::Latin1 => Ok(data.iter().map(|&b| char::from(b)).collect()),
        TextEncoding::Utf8 | TextEncoding::Unspecified => String::from_utf8(data.to_vec())
            .map_err(|_| Error::Conversion("text is not valid UTF-8")),
        TextEncoding::Utf16Le => decode_utf16(data, u16::from_le_bytes),
        TextEncoding::Utf16Be => decode_utf16(data, u16::from_be_bytes),
    }
}

/// Decodes UTF-16 data with a BOM, falling back to little-endian when the
/// BOM is missing.
pub fn decode_utf16_bom(data: &[u8]) -> Result<(String, TextEncoding)> {
    match data {
        [0xFF, 0xFE, rest @ ..] => Ok((decode_utf16(rest, u16::from_le_bytes)?, TextEncoding::Utf16Le)),
        [0xFE, 0xFF, rest @ ..] => Ok((decode_utf16(rest, u16::from_be_bytes)?, TextEncoding::Utf16Be)),
        _ => {
            log::warn!("UTF-16 text without byte-order mark, assuming little-endian");
            Ok((decode_utf16(data, u16::from_le_bytes)?, TextEncoding::Utf16Le))
        }
    }
}

fn decode_utf16(data: &[u8], read: fn([u8; 2]) -> u16) -> Result<String> {
    if data.len() % 2 != 0 {
        return Err(Error::Conversion("UTF-16 text with odd byte count"));
    }
    let data = data.strip_suffix(&[0, 0]).unwrap_or(data);
    let units: Vec<u16> = data.chunks_exact(2).map(|pair| read([pair[0], pair[1]])).collect();
    String::from_utf16(&units).map_err(|_| Error::Conversion("text is not valid UTF-16"))
}

/// Encodes `text` according to `encoding`, without a terminator.
///
/// Fails with [`Error::Conversion`] if a character cannot be represented
/// (only possible for Latin-1).
pub fn encode(encoding: TextEncoding, text: &str) -> Result<Vec<u8>> {
    match encoding {
        TextEncoding::Latin1 => text
            .chars()
            .map(|c| {
                let code = c as u32;
                if code <= 0xFF {
                    Ok(code as u8)
                } else {
                    Err(Error::Conversion("character not representable in Latin-1"))
                }
            })
            .collect(),
        TextEncoding::Utf8 | TextEncoding::Unspecified => Ok(text.as_bytes().to_vec()),
        TextEncoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        TextEncoding::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
    }
}

/// Encodes `text` with a leading byte-order mark (UTF-16 variants only;
/// other encodings are returned unchanged).
pub fn encode_with_bom(encoding: TextEncoding, text: &str) -> Result<Vec<u8>> {
    let mut out = match encoding {
        TextEncoding::Utf16Le => vec![0xFF, 0xFE],
        TextEncoding::Utf16Be => vec![0xFE, 0xFF],
        _ => vec![],
    };
    out.extend(encode(encoding, text)?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_round_trip() {
        let text = "na\u{EF}ve";
        let bytes = encode(TextEncoding::Latin1, text).unwrap();
        assert_eq!(bytes, b"na\xEFve");
        assert_eq!(decode(TextEncoding::Latin1, &bytes).unwrap(), text);
    }

    #[test]
    fn latin1_rejects_wide_characters() {
        assert!(matches!(
            encode(TextEncoding::Latin1, "\u{4E16}\u{754C}"),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn utf16_bom_detection() {
        let (text, enc) = decode_utf16_bom(&[0xFF, 0xFE, b'H', 0, b'i', 0]).unwrap();
        assert_eq!(text, "Hi");
        assert_eq!(enc, TextEncoding::Utf16Le);
        let (text, enc) = decode_utf16_bom(&[0xFE, 0xFF, 0, b'H', 0, b'i']).unwrap();
        assert_eq!(text, "Hi");
        assert_eq!(enc, TextEncoding::Utf16Be);
    }

    #[test]
    fn trailing_nul_is_trimmed() {
        assert_eq!(decode(TextEncoding::Utf8, b"abc\0").unwrap(), "abc");
        assert_eq!(
            decode(TextEncoding::Utf16Le, &[b'a', 0, 0, 0]).unwrap(),
            "a"
        );
    }

    #[test]
    fn utf16_round_trip_with_bom() {
        let text = "Hello";
        let bytes = encode_with_bom(TextEncoding::Utf16Le, text).unwrap();
        let (decoded, enc) = decode_utf16_bom(&bytes).unwrap();
        assert_eq!(decoded, text);
        assert_eq!(enc, TextEncoding::Utf16Le);
    }
}

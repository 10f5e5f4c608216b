//! Track descriptors.
//!
//! Tracks are opaque to the tag engine: the rewrite path only needs their
//! identity and byte range, the facade additionally renders display labels
//! and the technical summary.

use crate::sig::MediaType;

/// A media track of a container.
#[derive(Debug, Clone, Default)]
pub struct Track {
    /// Unique ID (Matroska TrackUID, Ogg stream serial).
    pub id: u64,
    /// Track number within the container (where the format has one).
    pub number: u64,
    /// Kind of payload the track carries.
    pub media_type: MediaType,
    /// Codec identifier as stored in the container (e.g. "A_MPEG/L3").
    pub codec_id: String,
    /// Display name.
    pub name: String,
    /// ISO-639-2 language code.
    pub language: String,
    /// IETF (BCP-47) language tag.
    pub language_ietf: String,
    /// Whether the track is enabled.
    pub enabled: bool,
    /// Whether the track is flagged default.
    pub default: bool,
    /// Total size of the track header element, in bytes.
    pub size: u64,
    /// Pixel width (video only).
    pub pixel_width: u64,
    /// Pixel height (video only).
    pub pixel_height: u64,
    /// Sampling frequency in Hz (audio only).
    pub sampling_frequency: f64,
    /// Channel count (audio only).
    pub channels: u64,
    /// Bit depth (audio only).
    pub bit_depth: u64,
    pub(crate) header_bytes: Vec<u8>,
}

impl Track {
    /// The raw bytes of the track's header element, as read from the
    /// container.
    pub fn header_bytes(&self) -> &[u8] {
        &self.header_bytes
    }

    /// Replaces the raw header bytes (set by the driver on parse).
    pub fn set_header_bytes(&mut self, bytes: Vec<u8>) {
        self.size = bytes.len() as u64;
        self.header_bytes = bytes;
    }

    /// Writes the header element unchanged.
    pub fn write_header<W: std::io::Write>(&self, out: &mut W) -> crate::Result<()> {
        out.write_all(&self.header_bytes)?;
        Ok(())
    }

    /// A short name for the codec, derived from the codec ID.
    pub fn format_abbreviation(&self) -> &str {
        match self.codec_id.as_str() {
            "A_MPEG/L3" => "MP3",
            "A_MPEG/L2" => "MP2",
            "A_MPEG/L1" => "MP1",
            "A_AAC" | "A_AAC/MPEG4/LC" | "A_AAC/MPEG2/LC" => "AAC",
            "A_AC3" => "AC-3",
            "A_EAC3" => "E-AC-3",
            "A_DTS" => "DTS",
            "A_FLAC" => "FLAC",
            "A_OPUS" => "Opus",
            "A_VORBIS" => "Vorbis",
            "A_PCM/INT/LIT" | "A_PCM/INT/BIG" => "PCM",
            "V_MPEG4/ISO/AVC" => "H.264",
            "V_MPEGH/ISO/HEVC" => "H.265",
            "V_MPEG4/ISO/ASP" | "V_MPEG4/ISO/SP" => "MPEG-4",
            "V_MPEG4/MS/V3" | "V_MS/VFW/FOURCC" => "MS-MPEG-4",
            "V_MPEG2" => "MPEG-2",
            "V_MPEG1" => "MPEG-1",
            "V_AV1" => "AV1",
            "V_VP9" => "VP9",
            "V_VP8" => "VP8",
            "V_THEORA" => "Theora",
            "S_TEXT/UTF8" => "SRT",
            "S_TEXT/ASS" => "ASS",
            "S_VOBSUB" => "VobSub",
            other => other,
        }
    }

    /// A display label like `"ID: 3653291187, type: Audio, language: English"`.
    ///
    /// The language part is omitted when no language is set or the set
    /// language is the special "undetermined" code.
    pub fn label(&self) -> String {
        let mut label = format!("ID: {}, type: {}", self.id, self.media_type.name());
        if !self.language.is_empty() && self.language != "und" {
            label.push_str(", language: ");
            label.push_str(language_name(&self.language));
        }
        label
    }

    /// The track's part of the technical summary, e.g. `"MP3-2ch-eng"` or
    /// `"MS-MPEG-4-480p"`.
    pub fn technical_label(&self) -> String {
        let mut label = self.format_abbreviation().to_string();
        match self.media_type {
            MediaType::Video => {
                if self.pixel_height != 0 {
                    label.push_str(&format!("-{}p", self.pixel_height));
                }
            }
            MediaType::Audio => {
                if self.channels != 0 {
                    label.push_str(&format!("-{}ch", self.channels));
                }
                if !self.language.is_empty() && self.language != "und" {
                    label.push_str(&format!("-{}", self.language));
                }
            }
            _ => {}
        }
        label
    }
}

/// English name of an ISO-639-2 language code; the code itself when the
/// table does not cover it.
pub fn language_name(code: &str) -> &str {
    match code {
        "eng" => "English",
        "ger" | "deu" => "German",
        "fre" | "fra" => "French",
        "spa" => "Spanish",
        "ita" => "Italian",
        "dut" | "nld" => "Dutch",
        "por" => "Portuguese",
        "rus" => "Russian",
        "jpn" => "Japanese",
        "chi" | "zho" => "Chinese",
        "kor" => "Korean",
        "swe" => "Swedish",
        "nor" => "Norwegian",
        "dan" => "Danish",
        "fin" => "Finnish",
        "pol" => "Polish",
        "cze" | "ces" => "Czech",
        "hun" => "Hungarian",
        "tur" => "Turkish",
        "ara" => "Arabic",
        "heb" => "Hebrew",
        "hin" => "Hindi",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_the_established_format() {
        let video = Track {
            id: 2422994868,
            media_type: MediaType::Video,
            codec_id: "V_MS/VFW/FOURCC".into(),
            pixel_width: 640,
            pixel_height: 480,
            ..Track::default()
        };
        assert_eq!(video.label(), "ID: 2422994868, type: Video");
        assert_eq!(video.technical_label(), "MS-MPEG-4-480p");

        let audio = Track {
            id: 3653291187,
            media_type: MediaType::Audio,
            codec_id: "A_MPEG/L3".into(),
            channels: 2,
            language: "eng".into(),
            ..Track::default()
        };
        assert_eq!(audio.label(), "ID: 3653291187, type: Audio, language: English");
        assert_eq!(audio.technical_label(), "MP3-2ch-eng");
    }

    #[test]
    fn undetermined_language_is_omitted() {
        let track = Track {
            id: 1,
            media_type: MediaType::Audio,
            language: "und".into(),
            ..Track::default()
        };
        assert_eq!(track.label(), "ID: 1, type: Audio");
    }
}

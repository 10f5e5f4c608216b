//! Container format detection from file signatures.

use byteorder::{BigEndian, ByteOrder};

/// General media type of a track or file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MediaType {
    /// Media type could not be determined.
    #[default]
    Unknown,
    /// Audio track.
    Audio,
    /// Video track.
    Video,
    /// Subtitle/caption track.
    Text,
    /// Attached picture.
    Picture,
}

impl MediaType {
    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            MediaType::Unknown => "Other",
            MediaType::Audio => "Audio",
            MediaType::Video => "Video",
            MediaType::Text => "Text",
            MediaType::Picture => "Picture",
        }
    }
}

/// The container formats the signature probe can classify.
///
/// The set is closed; formats the library recognizes but cannot modify are
/// still listed so callers get a proper name and MIME type for them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ContainerFormat {
    /// Unknown data.
    #[default]
    Unknown,
    /// Raw Dolby Digital frames.
    Ac3Frames,
    /// Audio Data Transport Stream.
    Adts,
    /// Audio Interchange File Format.
    Aiff,
    /// APE tag block.
    ApeTag,
    /// GNU ar archive.
    Ar,
    /// Advanced Systems Format.
    Asf,
    /// bzip2 compressed data.
    Bzip2,
    /// Raw Dirac video.
    Dirac,
    /// EBML document whose DocType has not been resolved yet.
    Ebml,
    /// Executable and Linkable Format.
    Elf,
    /// Free Lossless Audio Codec stream.
    Flac,
    /// Flash video.
    FlashVideo,
    /// GIF, 87a revision.
    Gif87a,
    /// GIF, 89a revision.
    Gif89a,
    /// gzip compressed data.
    Gzip,
    /// ID3v2 tag followed by MPEG audio frames.
    Id3v2Tag,
    /// IVF video.
    Ivf,
    /// Java class file.
    JavaClassFile,
    /// JPEG picture.
    Jpeg,
    /// LHA archive.
    Lha,
    /// lzip compressed data.
    Lzip,
    /// LZW compressed data.
    Lzw,
    /// Matroska container (EBML with a "matroska" DocType).
    Matroska,
    /// Standard MIDI file.
    Midi,
    /// Monkey's Audio.
    MonkeysAudio,
    /// MP4 container.
    Mp4,
    /// Raw MPEG audio frames (MP1/MP2/MP3).
    MpegAudioFrames,
    /// Ogg transport stream.
    Ogg,
    /// Photoshop document.
    PhotoshopDocument,
    /// Portable Network Graphics picture.
    Png,
    /// Windows PE executable.
    PortableExecutable,
    /// QuickTime container.
    QuickTime,
    /// RAR archive.
    Rar,
    /// Generic RIFF container.
    Riff,
    /// RIFF/AVI video.
    RiffAvi,
    /// RIFF/WAVE audio.
    RiffWave,
    /// 7-Zip archive.
    SevenZ,
    /// Tape archive.
    Tar,
    /// TIFF picture, big-endian.
    TiffBigEndian,
    /// TIFF picture, little-endian.
    TiffLittleEndian,
    /// UTF-16 text with byte-order mark.
    Utf16Text,
    /// UTF-32 text with byte-order mark.
    Utf32Text,
    /// UTF-8 text with byte-order mark.
    Utf8Text,
    /// WavPack audio.
    WavPack,
    /// WebM container (EBML with a "webm" DocType).
    Webm,
    /// Windows bitmap picture.
    WindowsBitmap,
    /// Windows icon.
    WindowsIcon,
    /// xz compressed data.
    Xz,
    /// YUV4MPEG2 video.
    YUV4Mpeg2,
    /// ZIP archive.
    Zip,
    /// Zstandard compressed data.
    Zstd,
}

// 64-bit signatures
const SIG_APE_TAG: u64 = 0x4150455441474558; // APETAGEX
const SIG_AR: u64 = 0x213C617263683E0A;
const SIG_ASF_1: u64 = 0x3026B2758E66CF11;
const SIG_ASF_2: u64 = 0xA6D900AA0062CE6C;
const SIG_PNG: u64 = 0x89504E470D0A1A0A;
const SIG_RIFF_AVI: u64 = 0x415649204C495354; // "AVI LIST" at offset 8
const SIG_YUV4MPEG2: u64 = 0x595556344D504547;
// 56-bit signatures
const SIG_RAR: u64 = 0x526172211A0700;
// 48-bit signatures
const SIG_GIF_87A: u64 = 0x474946383761;
const SIG_GIF_89A: u64 = 0x474946383961;
const SIG_SEVEN_Z: u64 = 0x377ABCAF271C;
const SIG_XZ: u64 = 0xFD377A585A00;
// 40-bit signatures
const SIG_AIFF: u64 = 0x464F524D00;
// 32-bit signatures
const SIG_DIRAC: u32 = 0x42424344;
const SIG_ELF: u32 = 0x7F454C46;
const SIG_FLAC: u32 = 0x664C6143; // fLaC
const SIG_IVF: u32 = 0x444B4946;
const SIG_JAVA_CLASS: u32 = 0xCAFEBABE;
const SIG_EBML: u32 = 0x1A45DFA3;
const SIG_MIDI: u32 = 0x4D546864;
const SIG_MONKEYS_AUDIO: u32 = 0x4D414320;
const SIG_MP4: u32 = 0x66747970; // "ftyp" at offset 4
const SIG_OGG: u32 = 0x4F676753; // OggS
const SIG_PSD: u32 = 0x38425053;
const SIG_QUICKTIME: u32 = 0x6D6F6F76;
const SIG_RIFF: u32 = 0x52494646;
const SIG_RIFF_WAVE: u32 = 0x57415645; // "WAVE" at offset 8
const SIG_TIFF_BE: u32 = 0x4D4D002A;
const SIG_TIFF_LE: u32 = 0x49492A00;
const SIG_UTF32: u32 = 0xFFFE0000;
const SIG_WAVPACK: u32 = 0x7776706B;
const SIG_WINDOWS_ICON: u32 = 0x00000100;
const SIG_LZIP: u32 = 0x4C5A4950;
const SIG_ZIP_1: u32 = 0x504B0304;
const SIG_ZIP_2: u32 = 0x504B0506;
const SIG_ZIP_3: u32 = 0x504B0708;
const SIG_ZSTD: u32 = 0x28B52FFD;
// 24-bit signatures
const SIG_BZIP2: u32 = 0x425A68;
const SIG_FLV: u32 = 0x464C56;
const SIG_GZIP: u32 = 0x1F8B08;
const SIG_ID3V2: u32 = 0x494433; // "ID3"
const SIG_UTF8: u32 = 0xEFBBBF;
// 16-bit signatures
const SIG_AC3: u16 = 0x0B77;
const SIG_ADTS: u16 = 0xFFF0;
const SIG_ADTS_MASK: u16 = 0xFFF6;
const SIG_JPEG: u16 = 0xFFD8;
const SIG_LHA: u16 = 0x1FA0;
const SIG_LZW: u16 = 0x1F9D;
const SIG_MPEG_AUDIO: u16 = 0x7FF; // first eleven bits set
const SIG_PE: u16 = 0x4D5A;
const SIG_UTF16: u16 = 0xFFFE;
const SIG_BMP: u16 = 0x424D;

impl ContainerFormat {
    /// Classifies the leading bytes of a stream. First match wins; the
    /// checks run from the longest signature to the shortest.
    pub fn probe(buffer: &[u8]) -> ContainerFormat {
        let sig: u64 = if buffer.len() >= 8 {
            BigEndian::read_u64(buffer)
        } else if buffer.len() >= 4 {
            (BigEndian::read_u32(buffer) as u64) << 32
        } else if buffer.len() >= 2 {
            (BigEndian::read_u16(buffer) as u64) << 48
        } else {
            return ContainerFormat::Unknown;
        };
        // 64-bit signatures
        match sig {
            SIG_APE_TAG => return ContainerFormat::ApeTag,
            SIG_AR => return ContainerFormat::Ar,
            SIG_ASF_1 | SIG_ASF_2 => return ContainerFormat::Asf,
            SIG_PNG => return ContainerFormat::Png,
            SIG_YUV4MPEG2 => {
                if buffer.len() >= 10 && buffer[8] == 0x32 && buffer[9] == 0x20 {
                    return ContainerFormat::YUV4Mpeg2;
                }
            }
            _ => {}
        }
        // 32-bit signatures at offset 4 ("ftyp", "moov")
        match (sig & 0xFFFF_FFFF) as u32 {
            SIG_MP4 => return ContainerFormat::Mp4,
            SIG_QUICKTIME => return ContainerFormat::QuickTime,
            _ => {}
        }
        // 56-bit signatures
        if sig >> 8 == SIG_RAR {
            return ContainerFormat::Rar;
        }
        // 48-bit signatures
        match sig >> 16 {
            SIG_GIF_87A => return ContainerFormat::Gif87a,
            SIG_GIF_89A => return ContainerFormat::Gif89a,
            SIG_SEVEN_Z => return ContainerFormat::SevenZ,
            SIG_XZ => return ContainerFormat::Xz,
            _ => {}
        }
        // 40-bit signatures
        if sig >> 24 == SIG_AIFF {
            return ContainerFormat::Aiff;
        }
        // 32-bit signatures
        match (sig >> 32) as u32 {
            SIG_DIRAC => return ContainerFormat::Dirac,
            SIG_ELF => return ContainerFormat::Elf,
            SIG_FLAC => return ContainerFormat::Flac,
            SIG_IVF => return ContainerFormat::Ivf,
            SIG_JAVA_CLASS => return ContainerFormat::JavaClassFile,
            SIG_EBML => return ContainerFormat::Ebml,
            SIG_MIDI => return ContainerFormat::Midi,
            SIG_MONKEYS_AUDIO => return ContainerFormat::MonkeysAudio,
            SIG_OGG => return ContainerFormat::Ogg,
            SIG_PSD => return ContainerFormat::PhotoshopDocument,
            SIG_RIFF => {
                if buffer.len() >= 16 && BigEndian::read_u64(&buffer[8..]) == SIG_RIFF_AVI {
                    return ContainerFormat::RiffAvi;
                } else if buffer.len() >= 12 && BigEndian::read_u32(&buffer[8..]) == SIG_RIFF_WAVE {
                    return ContainerFormat::RiffWave;
                }
                return ContainerFormat::Riff;
            }
            SIG_TIFF_BE => return ContainerFormat::TiffBigEndian,
            SIG_TIFF_LE => return ContainerFormat::TiffLittleEndian,
            SIG_UTF32 => return ContainerFormat::Utf32Text,
            SIG_WAVPACK => return ContainerFormat::WavPack,
            SIG_WINDOWS_ICON => return ContainerFormat::WindowsIcon,
            SIG_LZIP => return ContainerFormat::Lzip,
            SIG_ZIP_1 | SIG_ZIP_2 | SIG_ZIP_3 => return ContainerFormat::Zip,
            SIG_ZSTD => return ContainerFormat::Zstd,
            _ => {}
        }
        // 24-bit signatures
        match (sig >> 40) as u32 {
            SIG_BZIP2 => return ContainerFormat::Bzip2,
            SIG_FLV => return ContainerFormat::FlashVideo,
            SIG_GZIP => return ContainerFormat::Gzip,
            SIG_ID3V2 => return ContainerFormat::Id3v2Tag,
            SIG_UTF8 => return ContainerFormat::Utf8Text,
            _ => {}
        }
        // 16-bit signatures
        match (sig >> 48) as u16 {
            SIG_AC3 => return ContainerFormat::Ac3Frames,
            SIG_JPEG => return ContainerFormat::Jpeg,
            SIG_LHA => return ContainerFormat::Lha,
            SIG_LZW => return ContainerFormat::Lzw,
            SIG_PE => return ContainerFormat::PortableExecutable,
            SIG_UTF16 => return ContainerFormat::Utf16Text,
            SIG_BMP => return ContainerFormat::WindowsBitmap,
            _ => {}
        }
        // masked signatures
        if (sig >> 48) as u16 & SIG_ADTS_MASK == SIG_ADTS {
            return ContainerFormat::Adts;
        }
        if (sig >> 53) as u16 == SIG_MPEG_AUDIO {
            return ContainerFormat::MpegAudioFrames;
        }
        ContainerFormat::Unknown
    }

    /// Canonical file extension, considering the dominant media type.
    /// Empty when no abbreviation is established.
    pub fn abbreviation(self, media_type: MediaType) -> &'static str {
        match self {
            ContainerFormat::Ac3Frames => "ac3",
            ContainerFormat::Adts => "aac",
            ContainerFormat::Aiff => "aiff",
            ContainerFormat::Ar => "a",
            ContainerFormat::Asf => "asf",
            ContainerFormat::Bzip2 => "bz",
            ContainerFormat::Dirac => "drc",
            ContainerFormat::Elf => "elf",
            ContainerFormat::Flac => "flac",
            ContainerFormat::FlashVideo => "flv",
            ContainerFormat::Gif87a | ContainerFormat::Gif89a => "gif",
            ContainerFormat::Gzip => "gz",
            ContainerFormat::Id3v2Tag | ContainerFormat::MpegAudioFrames => "mp3",
            ContainerFormat::Ivf => "ivf",
            ContainerFormat::JavaClassFile => "class",
            ContainerFormat::Jpeg => "jpeg",
            ContainerFormat::Lha => "lzh",
            ContainerFormat::Lzip => "lz",
            ContainerFormat::Lzw => "lzw",
            ContainerFormat::Matroska | ContainerFormat::Ebml => match media_type {
                MediaType::Audio => "mka",
                _ => "mkv",
            },
            ContainerFormat::Midi => "mid",
            ContainerFormat::MonkeysAudio => "ape",
            ContainerFormat::Mp4 => match media_type {
                MediaType::Audio => "m4a",
                _ => "mp4",
            },
            ContainerFormat::Ogg => match media_type {
                MediaType::Video => "ogv",
                _ => "ogg",
            },
            ContainerFormat::PhotoshopDocument => "psd",
            ContainerFormat::Png => "png",
            ContainerFormat::PortableExecutable => "exe",
            ContainerFormat::QuickTime => "mov",
            ContainerFormat::Rar => "rar",
            ContainerFormat::Riff => "riff",
            ContainerFormat::RiffAvi => "avi",
            ContainerFormat::RiffWave => "wav",
            ContainerFormat::SevenZ => "7z",
            ContainerFormat::Tar => "tar",
            ContainerFormat::TiffBigEndian | ContainerFormat::TiffLittleEndian => "tiff",
            ContainerFormat::WavPack => "wv",
            ContainerFormat::Webm => "webm",
            ContainerFormat::WindowsBitmap => "bmp",
            ContainerFormat::WindowsIcon => "ico",
            ContainerFormat::Xz => "xz",
            ContainerFormat::YUV4Mpeg2 => "y4m",
            ContainerFormat::Zip => "zip",
            ContainerFormat::Zstd => "zst",
            _ => "",
        }
    }

    /// MIME type, considering the dominant media type. Empty when none is
    /// established.
    pub fn mime_type(self, media_type: MediaType) -> &'static str {
        match self {
            ContainerFormat::Ac3Frames => "audio/ac3",
            ContainerFormat::Adts => "audio/aac",
            ContainerFormat::Aiff => "audio/aiff",
            ContainerFormat::Asf => "video/x-ms-asf",
            ContainerFormat::Flac => "audio/flac",
            ContainerFormat::FlashVideo => "video/x-flv",
            ContainerFormat::Gif87a | ContainerFormat::Gif89a => "image/gif",
            ContainerFormat::Jpeg => "image/jpeg",
            ContainerFormat::Png => "image/png",
            ContainerFormat::Id3v2Tag | ContainerFormat::MpegAudioFrames => "audio/mpeg",
            ContainerFormat::Matroska | ContainerFormat::Ebml => match media_type {
                MediaType::Audio => "audio/x-matroska",
                _ => "video/x-matroska",
            },
            ContainerFormat::Mp4 => match media_type {
                MediaType::Audio => "audio/mp4",
                _ => "video/mp4",
            },
            ContainerFormat::Ogg => match media_type {
                MediaType::Audio => "audio/ogg",
                _ => "video/ogg",
            },
            ContainerFormat::QuickTime => "video/quicktime",
            ContainerFormat::RiffAvi => "video/x-msvideo",
            ContainerFormat::RiffWave => "audio/vnd.wave",
            ContainerFormat::TiffBigEndian | ContainerFormat::TiffLittleEndian => "image/tiff",
            ContainerFormat::WavPack => "audio/x-wavpack",
            ContainerFormat::Webm => match media_type {
                MediaType::Audio => "audio/webm",
                _ => "video/webm",
            },
            ContainerFormat::WindowsBitmap => "image/bmp",
            ContainerFormat::WindowsIcon => "image/vnd.microsoft.icon",
            _ => "",
        }
    }

    /// Human-readable format name.
    pub fn name(self) -> &'static str {
        match self {
            ContainerFormat::Unknown => "unknown",
            ContainerFormat::Ac3Frames => "raw Dolby Digital",
            ContainerFormat::Adts => "Audio Data Transport Stream",
            ContainerFormat::Aiff => "Audio Interchange File Format",
            ContainerFormat::ApeTag => "APE tag",
            ContainerFormat::Ar => "Archive (GNU ar)",
            ContainerFormat::Asf => "Advanced Systems Format",
            ContainerFormat::Bzip2 => "bzip2 compressed data",
            ContainerFormat::Dirac => "raw Dirac",
            ContainerFormat::Ebml => "EBML document",
            ContainerFormat::Elf => "Executable and Linkable Format",
            ContainerFormat::Flac => "raw Free Lossless Audio Codec frames",
            ContainerFormat::FlashVideo => "Flash Video",
            ContainerFormat::Gif87a | ContainerFormat::Gif89a => "Graphics Interchange Format",
            ContainerFormat::Gzip => "gzip compressed data",
            ContainerFormat::Id3v2Tag => "MPEG audio frames with ID3v2 tag",
            ContainerFormat::Ivf => "IVF",
            ContainerFormat::JavaClassFile => "Java class file",
            ContainerFormat::Jpeg => "JPEG File Interchange Format",
            ContainerFormat::Lha => "LHA compressed file",
            ContainerFormat::Lzip => "lzip compressed data",
            ContainerFormat::Lzw => "LZW compressed data",
            ContainerFormat::Matroska => "Matroska",
            ContainerFormat::Midi => "MIDI",
            ContainerFormat::MonkeysAudio => "Monkey's Audio",
            ContainerFormat::Mp4 => "MPEG-4 Part 14",
            ContainerFormat::MpegAudioFrames => "MPEG-1 audio",
            ContainerFormat::Ogg => "Ogg transport bitstream",
            ContainerFormat::PhotoshopDocument => "Photoshop document",
            ContainerFormat::Png => "Portable Network Graphics",
            ContainerFormat::PortableExecutable => "Portable Executable",
            ContainerFormat::QuickTime => "QuickTime container",
            ContainerFormat::Rar => "RAR archive",
            ContainerFormat::Riff => "Resource Interchange File Format",
            ContainerFormat::RiffAvi => "RIFF/Audio Video Interleave",
            ContainerFormat::RiffWave => "RIFF/WAVE",
            ContainerFormat::SevenZ => "7z archive",
            ContainerFormat::Tar => "Tape archive",
            ContainerFormat::TiffBigEndian | ContainerFormat::TiffLittleEndian => {
                "Tagged Image File Format"
            }
            ContainerFormat::Utf16Text => "UTF-16 text",
            ContainerFormat::Utf32Text => "UTF-32 text",
            ContainerFormat::Utf8Text => "UTF-8 text",
            ContainerFormat::WavPack => "WavPack",
            ContainerFormat::Webm => "WebM",
            ContainerFormat::WindowsBitmap => "Windows Bitmap",
            ContainerFormat::WindowsIcon => "Windows Icon",
            ContainerFormat::Xz => "xz compressed data",
            ContainerFormat::YUV4Mpeg2 => "YUV4MPEG2",
            ContainerFormat::Zip => "ZIP archive",
            ContainerFormat::Zstd => "Zstandard compressed data",
        }
    }

    /// Whether the format belongs to the Matroska family.
    pub fn is_matroska_family(self) -> bool {
        matches!(
            self,
            ContainerFormat::Ebml | ContainerFormat::Matroska | ContainerFormat::Webm
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_common_signatures() {
        let test_pair: &[(&[u8], ContainerFormat)] = &[
            (&[0x1A, 0x45, 0xDF, 0xA3], ContainerFormat::Ebml),
            (b"OggS\x00\x02", ContainerFormat::Ogg),
            (b"ID3\x03\x00", ContainerFormat::Id3v2Tag),
            (b"fLaC\x00\x00\x00\x22", ContainerFormat::Flac),
            (b"\x00\x00\x00\x20ftypisom", ContainerFormat::Mp4),
            (b"RIFF\x24\x00\x00\x00WAVEfmt ", ContainerFormat::RiffWave),
            (b"RIFF\x24\x00\x00\x00AVI LIST", ContainerFormat::RiffAvi),
            (b"RIFF\x24\x00\x00\x00junk", ContainerFormat::Riff),
            (
                &[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11],
                ContainerFormat::Asf,
            ),
            (&[0xFF, 0xFB, 0x90, 0x00], ContainerFormat::MpegAudioFrames),
            (&[0xFF, 0xE3, 0x18, 0xC4], ContainerFormat::MpegAudioFrames),
            (b"\x89PNG\r\n\x1a\n", ContainerFormat::Png),
            (&[0xFF, 0xD8, 0xFF, 0xE0], ContainerFormat::Jpeg),
            (&[], ContainerFormat::Unknown),
            (&[0x00], ContainerFormat::Unknown),
        ];
        for (bytes, expected) in test_pair {
            assert_eq!(ContainerFormat::probe(bytes), *expected, "{bytes:02X?}");
        }
    }

    #[test]
    fn adts_respects_layer_mask() {
        // 0xFFF1: MPEG-4 ADTS without CRC
        assert_eq!(
            ContainerFormat::probe(&[0xFF, 0xF1, 0x4C, 0x80]),
            ContainerFormat::Adts
        );
        // 0xFFF9: MPEG-2 ADTS with CRC
        assert_eq!(
            ContainerFormat::probe(&[0xFF, 0xF9, 0x4C, 0x80]),
            ContainerFormat::Adts
        );
    }

    #[test]
    fn random_garbage_is_unknown() {
        // 41 bytes that match no signature
        let data = [0x11u8; 41];
        assert_eq!(ContainerFormat::probe(&data), ContainerFormat::Unknown);
    }

    #[test]
    fn abbreviation_considers_media_type() {
        assert_eq!(ContainerFormat::Matroska.abbreviation(MediaType::Audio), "mka");
        assert_eq!(ContainerFormat::Matroska.abbreviation(MediaType::Video), "mkv");
        assert_eq!(ContainerFormat::Ogg.abbreviation(MediaType::Video), "ogv");
        assert_eq!(ContainerFormat::Mp4.abbreviation(MediaType::Audio), "m4a");
    }
}

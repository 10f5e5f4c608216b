//! End-to-end tests for MP3 files and the unsupported-file behaviour.

use mediatag::prelude::*;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "mediatag-test-{name}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

fn frame_bytes() -> Vec<u8> {
    // MPEG-1 layer III, 128 kbit/s, 44.1 kHz, stereo
    let mut bytes = vec![0xFF, 0xFB, 0x90, 0x00];
    bytes.extend(std::iter::repeat(0x55).take(417 - 4));
    bytes
}

#[test]
fn id3v2_utf16_round_trip() {
    let path = temp_path("id3-roundtrip");
    let audio = frame_bytes();
    std::fs::write(&path, &audio).unwrap();

    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    assert_eq!(file.container_format(), ContainerFormat::MpegAudioFrames);
    assert!(file.tags().is_empty());

    // create an ID3v2.3 tag and store a UTF-16 title
    let settings = TagCreationSettings { id3v2_major_version: 3, ..TagCreationSettings::default() };
    file.create_appropriate_tags(&settings, &mut diag).unwrap();
    let mp3 = file.mp3().unwrap();
    assert_eq!(mp3.id3v2_tags.len(), 1);
    mp3.id3v2_tags[0].set_value_of(
        KnownField::Title,
        TagValue::text_with_encoding("Hello", TextEncoding::Utf16Le).unwrap(),
    );
    file.apply_changes(&mut diag, &progress).unwrap();
    assert!(!diag.has_level(DiagLevel::Critical), "{:?}", diag.messages());

    // the rewritten file: ID3v2 at the front, the frames verbatim
    let rewritten = std::fs::read(&path).unwrap();
    assert_eq!(&rewritten[..3], b"ID3");
    assert!(rewritten.ends_with(&audio));

    let mut diag = Diagnostics::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    assert_eq!(file.container_format(), ContainerFormat::Id3v2Tag);
    let tags = file.tags();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag_type(), TagType::Id3v2);
    let value = tags[0].value_of(KnownField::Title).unwrap();
    assert_eq!(value.to_display_string().unwrap(), "Hello");
    assert_eq!(value.encoding(), Some(TextEncoding::Utf16Le));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn id3v1_is_spliced_at_the_back() {
    let path = temp_path("id3v1-splice");
    let audio = frame_bytes();
    std::fs::write(&path, &audio).unwrap();

    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    let settings = TagCreationSettings {
        id3v1_usage: TagUsage::Always,
        id3v2_usage: TagUsage::Never,
        ..TagCreationSettings::default()
    };
    file.create_appropriate_tags(&settings, &mut diag).unwrap();
    let mp3 = file.mp3().unwrap();
    mp3.id3v1_tag
        .as_mut()
        .unwrap()
        .set_value_of(KnownField::Title, TagValue::text("Back Matter"));
    file.apply_changes(&mut diag, &progress).unwrap();

    let rewritten = std::fs::read(&path).unwrap();
    assert_eq!(rewritten.len(), audio.len() + 128);
    assert_eq!(&rewritten[..audio.len()], &audio[..]);
    assert_eq!(&rewritten[audio.len()..audio.len() + 3], b"TAG");

    let mut file = MediaFile::open(&path).unwrap();
    let mut diag = Diagnostics::new();
    file.parse_everything(&mut diag, &progress).unwrap();
    let tags = file.tags();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag_type(), TagType::Id3v1);
    assert_eq!(
        tags[0]
            .value_of(KnownField::Title)
            .unwrap()
            .to_display_string()
            .unwrap(),
        "Back Matter"
    );
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn unsupported_files_report_their_status() {
    let path = temp_path("unsupported");
    // 41 bytes matching no signature
    std::fs::write(&path, [0x11u8; 41]).unwrap();

    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_container(&mut diag, &progress).unwrap();
    assert_eq!(file.container_format(), ContainerFormat::Unknown);
    assert_eq!(file.container_status(), ParsingStatus::NotSupported);
    assert_eq!(file.tags_status(), ParsingStatus::NotSupported);
    assert_eq!(file.tracks_status(), ParsingStatus::NotParsedYet);
    assert_eq!(file.chapters_status(), ParsingStatus::NotParsedYet);
    assert_eq!(file.attachments_status(), ParsingStatus::NotParsedYet);
    std::fs::remove_file(&path).unwrap();
}

//! End-to-end tests driving whole Matroska files through the facade.

use mediatag::ebml::{self, ids};
use mediatag::prelude::*;
use std::path::PathBuf;

const VIDEO_UID: u64 = 2422994868;
const AUDIO_UID: u64 = 3653291187;

fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "mediatag-test-{name}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

fn uint(id: u32, value: u64, out: &mut Vec<u8>) {
    ebml::make_uint_element(id, value, out).unwrap();
}

fn string(id: u32, value: &str, out: &mut Vec<u8>) {
    ebml::make_string_element(id, value, out).unwrap();
}

fn element(id: u32, body: &[u8], out: &mut Vec<u8>) {
    ebml::make_element(id, body, out).unwrap();
}

/// Builds a small but complete Matroska file: two tracks, two clusters
/// with position/back references and a cue index.
fn build_test_file() -> Vec<u8> {
    let header = ebml::EbmlHeader::default();
    let mut out = Vec::new();
    header.make(&mut out).unwrap();

    // segment body is assembled first so offsets are known
    let mut seg = Vec::new();
    // Info
    let mut info = Vec::new();
    uint(ids::TIMESTAMP_SCALE, 1_000_000, &mut info);
    ebml::make_float_element(ids::DURATION, 48_000.0, &mut info).unwrap();
    string(ids::MUXING_APP, "synthesizer-1.0", &mut info);
    string(ids::WRITING_APP, "synthesizer-1.0", &mut info);
    element(ids::SEGMENT_INFO, &info, &mut seg);
    // Tracks
    let mut tracks = Vec::new();
    let mut video = Vec::new();
    uint(ids::TRACK_NUMBER, 1, &mut video);
    uint(ids::TRACK_UID, VIDEO_UID, &mut video);
    uint(ids::TRACK_TYPE, 1, &mut video);
    string(ids::CODEC_ID, "V_MS/VFW/FOURCC", &mut video);
    let mut video_settings = Vec::new();
    uint(ids::PIXEL_WIDTH, 640, &mut video_settings);
    uint(ids::PIXEL_HEIGHT, 480, &mut video_settings);
    element(ids::TRACK_VIDEO, &video_settings, &mut video);
    element(ids::TRACK_ENTRY, &video, &mut tracks);
    let mut audio = Vec::new();
    uint(ids::TRACK_NUMBER, 2, &mut audio);
    uint(ids::TRACK_UID, AUDIO_UID, &mut audio);
    uint(ids::TRACK_TYPE, 2, &mut audio);
    string(ids::TRACK_LANGUAGE, "eng", &mut audio);
    string(ids::CODEC_ID, "A_MPEG/L3", &mut audio);
    let mut audio_settings = Vec::new();
    ebml::make_float_element(ids::SAMPLING_FREQUENCY, 44_100.0, &mut audio_settings).unwrap();
    uint(ids::CHANNELS, 2, &mut audio_settings);
    element(ids::TRACK_AUDIO, &audio_settings, &mut audio);
    element(ids::TRACK_ENTRY, &audio, &mut tracks);
    element(ids::TRACKS, &tracks, &mut seg);

    // first cluster
    let cluster1_offset = seg.len() as u64;
    let mut cluster1 = Vec::new();
    uint(ids::TIMESTAMP, 0, &mut cluster1);
    uint(ids::POSITION, cluster1_offset, &mut cluster1);
    uint(ids::PREV_SIZE, 0, &mut cluster1);
    // SimpleBlock: track 1 (vint), timestamp 0, no lacing, payload
    let mut block = vec![0x81, 0x00, 0x00, 0x00];
    block.extend_from_slice(&[0xDE; 32]);
    let block1_relative;
    {
        let mut probe = Vec::new();
        element(ids::SIMPLE_BLOCK, &block, &mut probe);
        block1_relative = cluster1.len() as u64;
        cluster1.extend_from_slice(&probe);
    }
    let mut cluster1_element = Vec::new();
    element(ids::CLUSTER, &cluster1, &mut cluster1_element);
    seg.extend_from_slice(&cluster1_element);

    // second cluster
    let cluster2_offset = seg.len() as u64;
    let mut cluster2 = Vec::new();
    uint(ids::TIMESTAMP, 24_000, &mut cluster2);
    uint(ids::POSITION, cluster2_offset, &mut cluster2);
    uint(ids::PREV_SIZE, cluster1_element.len() as u64, &mut cluster2);
    let mut block2 = vec![0x81, 0x00, 0x10, 0x00];
    block2.extend_from_slice(&[0xAD; 24]);
    element(ids::SIMPLE_BLOCK, &block2, &mut cluster2);
    element(ids::CLUSTER, &cluster2, &mut seg);

    // cue index referring back into the clusters
    let mut cues = Vec::new();
    let mut point = Vec::new();
    uint(ids::CUE_TIME, 0, &mut point);
    let mut positions = Vec::new();
    uint(ids::CUE_TRACK, 1, &mut positions);
    uint(ids::CUE_CLUSTER_POSITION, cluster1_offset, &mut positions);
    uint(ids::CUE_RELATIVE_POSITION, block1_relative, &mut positions);
    element(ids::CUE_TRACK_POSITIONS, &positions, &mut point);
    element(ids::CUE_POINT, &point, &mut cues);
    element(ids::CUES, &cues, &mut seg);

    element(ids::SEGMENT, &seg, &mut out);
    out
}

fn write_test_file(name: &str) -> PathBuf {
    let path = temp_path(name);
    std::fs::write(&path, build_test_file()).unwrap();
    path
}

#[test]
fn no_op_save_keeps_the_file_byte_identical() {
    let path = write_test_file("noop");
    let original = std::fs::read(&path).unwrap();
    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    assert_eq!(file.container_format(), ContainerFormat::Matroska);
    assert_eq!(diag.level(), DiagLevel::None, "{:?}", diag.messages());

    // two tracks with the established IDs
    let ids: Vec<u64> = file.tracks().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![VIDEO_UID, AUDIO_UID]);

    file.apply_changes(&mut diag, &progress).unwrap();
    let after = std::fs::read(&path).unwrap();
    assert_eq!(original, after);
    assert_eq!(diag.level(), DiagLevel::None, "{:?}", diag.messages());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn track_labels_and_technical_summary() {
    let path = write_test_file("labels");
    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    let tracks = file.tracks();
    assert_eq!(tracks[0].label(), format!("ID: {VIDEO_UID}, type: Video"));
    assert_eq!(
        tracks[1].label(),
        format!("ID: {AUDIO_UID}, type: Audio, language: English")
    );
    assert_eq!(file.technical_summary(), "MS-MPEG-4-480p / MP3-2ch-eng");
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn adding_a_tag_survives_the_rewrite() {
    let path = write_test_file("tagadd");
    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    assert!(file.tags().is_empty());

    let matroska = file.matroska().unwrap();
    let mut tag =
        mediatag::matroska::MatroskaTag::with_target(TagTarget::with_level(TagTargetLevel::Album));
    assert!(tag.set_value_of(KnownField::Title, TagValue::text("Demo")));
    matroska.tags.push(tag);
    file.apply_changes(&mut diag, &progress).unwrap();
    assert!(
        !diag.has_level(DiagLevel::Critical),
        "{:?}",
        diag.messages()
    );

    // re-parse the rewritten file
    let mut diag = Diagnostics::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    let tags = file.tags();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].target().level, 50);
    assert_eq!(
        tags[0]
            .value_of(KnownField::Title)
            .unwrap()
            .to_display_string()
            .unwrap(),
        "Demo"
    );
    // the index and the cluster back-references must still line up
    file.matroska()
        .unwrap()
        .validate_index(
            &mut std::fs::File::open(&path).unwrap(),
            &mut diag,
            &progress,
        )
        .unwrap();
    assert!(
        !diag.has_level(DiagLevel::Warning),
        "{:?}",
        diag.messages()
    );
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn second_save_of_unchanged_tags_is_stable() {
    let path = write_test_file("stable");
    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    let matroska = file.matroska().unwrap();
    let mut tag = mediatag::matroska::MatroskaTag::new();
    tag.set_value_of(KnownField::Title, TagValue::text("Stable"));
    matroska.tags.push(tag);
    file.apply_changes(&mut diag, &progress).unwrap();

    // saving again without further mutation must not touch the bytes
    let after_first = std::fs::read(&path).unwrap();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    file.apply_changes(&mut diag, &progress).unwrap();
    let after_second = std::fs::read(&path).unwrap();
    assert_eq!(after_first, after_second);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn shrinking_a_tag_patches_in_place() {
    let path = write_test_file("inplace");
    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    let matroska = file.matroska().unwrap();
    let mut tag = mediatag::matroska::MatroskaTag::new();
    tag.set_value_of(
        KnownField::Title,
        TagValue::text("a reasonably long title that leaves room"),
    );
    matroska.tags.push(tag);
    file.apply_changes(&mut diag, &progress).unwrap();
    let size_after_rewrite = std::fs::metadata(&path).unwrap().len();

    // shortening the value must fit into the existing element, with the
    // slack turned into padding
    let mut file = MediaFile::open(&path).unwrap();
    file.config.max_padding = 1024;
    file.parse_everything(&mut diag, &progress).unwrap();
    let matroska = file.matroska().unwrap();
    assert!(matroska.tags[0].set_value_of(KnownField::Title, TagValue::text("tiny")));
    file.apply_changes(&mut diag, &progress).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), size_after_rewrite);

    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    let tags = file.tags();
    assert_eq!(tags.len(), 1);
    assert_eq!(
        tags[0]
            .value_of(KnownField::Title)
            .unwrap()
            .to_display_string()
            .unwrap(),
        "tiny"
    );
    assert!(!diag.has_level(DiagLevel::Critical), "{:?}", diag.messages());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn emitted_seek_head_points_at_matching_elements() {
    use mediatag::ebml::{EbmlKind, EbmlTree};
    use mediatag::matroska::SeekInfo;

    let path = write_test_file("seekhead");
    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    let matroska = file.matroska().unwrap();
    let mut tag = mediatag::matroska::MatroskaTag::new();
    tag.set_value_of(KnownField::Title, TagValue::text("Indexed"));
    matroska.tags.push(tag);
    file.apply_changes(&mut diag, &progress).unwrap();

    // walk the rewritten file with the raw element tree and verify every
    // advertised (id, offset) pair
    let bytes = std::fs::read(&path).unwrap();
    let mut io = std::io::Cursor::new(bytes.clone());
    let mut tree = EbmlTree::new(EbmlKind::default());
    let header = tree.parse_root(&mut io, 0, bytes.len() as u64).unwrap();
    let segment = tree.next_sibling(&mut io, header).unwrap().unwrap();
    assert_eq!(tree.id(segment), ids::SEGMENT);
    let segment_data = tree.data_offset(segment);
    let seek_head = tree
        .child_by_id(&mut io, segment, ids::SEEK_HEAD)
        .unwrap()
        .expect("rewritten file carries a SeekHead");
    let mut info = SeekInfo::default();
    info.parse(&mut io, &mut tree, seek_head, &mut diag).unwrap();
    assert!(!info.entries().is_empty());
    for &(id, offset) in info.entries() {
        let target = tree
            .parse_root(&mut io, segment_data + offset, tree.end_offset(segment))
            .unwrap();
        assert_eq!(tree.id(target), id, "entry for 0x{id:X} at {offset}");
    }
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn aborting_is_cooperative() {
    let path = write_test_file("abort");
    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    progress.abort();
    let mut file = MediaFile::open(&path).unwrap();
    assert!(matches!(
        file.parse_container(&mut diag, &progress),
        Err(Error::OperationAborted)
    ));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn idempotent_parse_phases() {
    let path = write_test_file("idempotent");
    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_tags(&mut diag, &progress).unwrap();
    let count = file.tags().len();
    file.parse_tags(&mut diag, &progress).unwrap();
    assert_eq!(file.tags().len(), count);
    assert_eq!(file.tags_status(), ParsingStatus::Ok);
    std::fs::remove_file(&path).unwrap();
}

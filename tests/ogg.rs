//! End-to-end tests driving whole Ogg files through the facade.

use mediatag::ogg::page::{
    self, make_segment_size_denotation, update_checksum, OggPageHeader, FLAG_FIRST, FLAG_LAST,
};
use mediatag::prelude::*;
use std::io::Cursor;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "mediatag-test-{name}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

fn build_page(serial: u32, sequence: u32, flags: u8, granule: u64, packets: &[&[u8]]) -> Vec<u8> {
    let mut table = Vec::new();
    for packet in packets {
        make_segment_size_denotation(packet.len() as u64, &mut table);
    }
    let header = OggPageHeader {
        start_offset: 0,
        stream_structure_version: 0,
        header_type_flag: flags,
        granule_position: granule,
        stream_serial: serial,
        sequence_number: sequence,
        checksum: 0,
        segment_sizes: Vec::new(),
        segment_table: table,
    };
    let mut bytes = Vec::new();
    header.make(&mut bytes).unwrap();
    for packet in packets {
        bytes.extend_from_slice(packet);
    }
    let mut cursor = Cursor::new(bytes);
    update_checksum(&mut cursor, 0).unwrap();
    cursor.into_inner()
}

fn vorbis_ident_packet() -> Vec<u8> {
    let mut packet = b"\x01vorbis".to_vec();
    packet.extend_from_slice(&0u32.to_le_bytes()); // version
    packet.push(2); // channels
    packet.extend_from_slice(&44_100u32.to_le_bytes());
    packet.extend_from_slice(&0u32.to_le_bytes()); // max bitrate
    packet.extend_from_slice(&128_000u32.to_le_bytes()); // nominal
    packet.extend_from_slice(&0u32.to_le_bytes()); // min
    packet.push(0xB8); // block sizes
    packet.push(0x01); // framing
    packet
}

fn vorbis_comment_packet(title: &str) -> Vec<u8> {
    let mut packet = b"\x03vorbis".to_vec();
    let vendor = b"test vendor";
    packet.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    packet.extend_from_slice(vendor);
    packet.extend_from_slice(&1u32.to_le_bytes());
    let field = format!("TITLE={title}");
    packet.extend_from_slice(&(field.len() as u32).to_le_bytes());
    packet.extend_from_slice(field.as_bytes());
    packet.push(0x01); // framing
    packet
}

fn build_vorbis_file(title: &str) -> Vec<u8> {
    let serial = 0x0001_F00D;
    let mut bytes = Vec::new();
    bytes.extend(build_page(serial, 0, FLAG_FIRST, 0, &[&vorbis_ident_packet()]));
    // comment and a fake setup packet share the second page
    bytes.extend(build_page(
        serial,
        1,
        0,
        0,
        &[&vorbis_comment_packet(title), b"\x05vorbis-setup-stub"],
    ));
    bytes.extend(build_page(serial, 2, FLAG_LAST, 48_000, &[&[0x42u8; 64]]));
    bytes
}

fn checksums_hold(bytes: &[u8]) {
    let mut io = Cursor::new(bytes.to_vec());
    let mut offset = 0u64;
    while offset < bytes.len() as u64 {
        let header = OggPageHeader::parse(&mut io, offset, bytes.len() as u64 - offset).unwrap();
        let computed = page::compute_checksum(&mut io, offset).unwrap();
        assert_eq!(computed, header.checksum, "page at {offset}");
        offset += header.total_size();
    }
}

#[test]
fn comment_edit_rebuilds_affected_pages() {
    let path = temp_path("vorbis-edit");
    std::fs::write(&path, build_vorbis_file("Before")).unwrap();
    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    assert_eq!(file.container_format(), ContainerFormat::Ogg);
    {
        let tags = file.tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(
            tags[0]
                .value_of(KnownField::Title)
                .unwrap()
                .to_display_string()
                .unwrap(),
            "Before"
        );
    }
    let ogg = file.ogg().unwrap();
    ogg.comments[0].set_value_of(KnownField::Title, TagValue::text("After the edit"));
    file.apply_changes(&mut diag, &progress).unwrap();
    assert!(!diag.has_level(DiagLevel::Critical), "{:?}", diag.messages());

    let rewritten = std::fs::read(&path).unwrap();
    checksums_hold(&rewritten);

    let mut file = MediaFile::open(&path).unwrap();
    let mut diag = Diagnostics::new();
    file.parse_everything(&mut diag, &progress).unwrap();
    let tags = file.tags();
    assert_eq!(
        tags[0]
            .value_of(KnownField::Title)
            .unwrap()
            .to_display_string()
            .unwrap(),
        "After the edit"
    );
    // the audio page was copied verbatim apart from numbering
    let ogg = file.ogg().unwrap();
    assert_eq!(ogg.streams.len(), 1);
    assert_eq!(ogg.streams[0].sample_rate(), 44_100);
    assert_eq!(ogg.streams[0].channels(), 2);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn sequence_numbers_are_renumbered_dense() {
    let serial = 7;
    let mut bytes = Vec::new();
    bytes.extend(build_page(serial, 0, FLAG_FIRST, 0, &[&vorbis_ident_packet()]));
    bytes.extend(build_page(serial, 1, 0, 0, &[&vorbis_comment_packet("x")]));
    // a gap in the numbering (page 2 missing)
    bytes.extend(build_page(serial, 3, FLAG_LAST, 48_000, &[&[0u8; 16]]));
    let path = temp_path("vorbis-renumber");
    std::fs::write(&path, bytes).unwrap();

    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    // the gap surfaces as a warning
    assert!(diag.has_level(DiagLevel::Warning));
    file.apply_changes(&mut diag, &progress).unwrap();

    let rewritten = std::fs::read(&path).unwrap();
    checksums_hold(&rewritten);
    let mut io = Cursor::new(rewritten.clone());
    let mut offset = 0u64;
    let mut sequences = Vec::new();
    while offset < rewritten.len() as u64 {
        let header =
            OggPageHeader::parse(&mut io, offset, rewritten.len() as u64 - offset).unwrap();
        sequences.push(header.sequence_number);
        offset += header.total_size();
    }
    assert_eq!(sequences, vec![0, 1, 2]);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn opus_identification_is_exposed() {
    let serial = 0x0BAD_CAFE;
    let mut ident = b"OpusHead".to_vec();
    ident.push(1);
    ident.push(2);
    ident.extend_from_slice(&312u16.to_le_bytes());
    ident.extend_from_slice(&48_000u32.to_le_bytes());
    ident.extend_from_slice(&0i16.to_le_bytes());
    ident.push(0);
    let mut tags_packet = b"OpusTags".to_vec();
    tags_packet.extend_from_slice(&0u32.to_le_bytes());
    tags_packet.extend_from_slice(&0u32.to_le_bytes());
    let mut bytes = Vec::new();
    bytes.extend(build_page(serial, 0, FLAG_FIRST, 0, &[&ident]));
    bytes.extend(build_page(serial, 1, 0, 0, &[&tags_packet]));
    bytes.extend(build_page(serial, 2, FLAG_LAST, 960, &[&[0u8; 8]]));
    let path = temp_path("opus-ident");
    std::fs::write(&path, bytes).unwrap();

    let mut diag = Diagnostics::new();
    let progress = Progress::new();
    let mut file = MediaFile::open(&path).unwrap();
    file.parse_everything(&mut diag, &progress).unwrap();
    let ogg = file.ogg().unwrap();
    assert_eq!(ogg.streams.len(), 1);
    let stream = &ogg.streams[0];
    assert_eq!(stream.codec, mediatag::ogg::OggCodec::Opus);
    assert_eq!(stream.sample_rate(), 48_000);
    assert_eq!(stream.channels(), 2);
    assert_eq!(stream.pre_skip(), 312);
    std::fs::remove_file(&path).unwrap();
}

//! Parsing and making Matroska `AttachedFile` elements.

use crate::attachment::{Attachment, DataBlock, StreamProvider};
use crate::diag::Diagnostics;
use crate::ebml::{self, ids, EbmlTree};
use crate::error::Result;
use crate::progress::Progress;
use crate::tree::NodeId;
use crate::vint;
use std::io::{Read, Seek};

/// Parses an `AttachedFile` rooted at `node`. The payload stays lazy: the
/// block records its byte range against `provider`.
pub fn parse_attached_file<R: Read + Seek>(
    io: &mut R,
    tree: &mut EbmlTree,
    node: NodeId,
    provider: &StreamProvider,
    diag: &mut Diagnostics,
) -> Result<Attachment> {
    let mut attachment = Attachment::default();
    let mut child = tree.first_child(io, node)?;
    while let Some(n) = child {
        match tree.id(n) {
            ids::FILE_UID => attachment.id = ebml::read_uint(io, tree, n)?,
            ids::FILE_NAME => attachment.name = ebml::read_string(io, tree, n)?,
            ids::FILE_DESCRIPTION => attachment.description = ebml::read_string(io, tree, n)?,
            ids::FILE_MIME_TYPE => attachment.mime_type = ebml::read_string(io, tree, n)?,
            ids::FILE_DATA => {
                attachment.data = Some(DataBlock::new(
                    provider.clone(),
                    tree.data_offset(n),
                    tree.end_offset(n),
                ));
            }
            _ => {}
        }
        child = tree.next_sibling(io, n)?;
    }
    if attachment.data.is_some() && attachment.mime_type.is_empty() {
        diag.warn(
            format!("{} carries data but no MIME type", attachment.label()),
            "parsing Matroska attachment",
        );
    }
    Ok(attachment)
}

/// Serialized size of the `AttachedFile` element for this attachment,
/// zero when the attachment is empty.
pub fn attached_file_size(attachment: &Attachment) -> Result<u64> {
    if attachment.is_empty() {
        return Ok(0);
    }
    let data_size = attachment.data.as_ref().map(|d| d.size()).unwrap_or(0);
    let mut inner = ebml::calculate_element_size(ids::FILE_NAME, attachment.name.len() as u64)?
        + ebml::calculate_element_size(ids::FILE_MIME_TYPE, attachment.mime_type.len() as u64)?
        + ebml::calculate_uint_element_size(ids::FILE_UID, attachment.id)?
        + ebml::calculate_element_size(ids::FILE_DATA, data_size)?;
    if !attachment.description.is_empty() {
        inner +=
            ebml::calculate_element_size(ids::FILE_DESCRIPTION, attachment.description.len() as u64)?;
    }
    ebml::calculate_element_size(ids::ATTACHED_FILE, inner)
}

/// Streams the `AttachedFile` element for this attachment to `out`.
pub fn make_attached_file<W: std::io::Write>(
    attachment: &Attachment,
    out: &mut W,
    diag: &mut Diagnostics,
    progress: &Progress,
) -> Result<()> {
    if attachment.is_empty() {
        return Ok(());
    }
    if attachment.data.is_some() && attachment.mime_type.is_empty() {
        diag.warn(
            format!("{} carries data but no MIME type", attachment.label()),
            "making Matroska attachment",
        );
    }
    let data_size = attachment.data.as_ref().map(|d| d.size()).unwrap_or(0);
    let mut head = Vec::new();
    if !attachment.description.is_empty() {
        ebml::make_string_element(ids::FILE_DESCRIPTION, &attachment.description, &mut head)?;
    }
    ebml::make_string_element(ids::FILE_NAME, &attachment.name, &mut head)?;
    ebml::make_string_element(ids::FILE_MIME_TYPE, &attachment.mime_type, &mut head)?;
    ebml::make_uint_element(ids::FILE_UID, attachment.id, &mut head)?;
    // FileData last so the payload can be streamed
    vint::make_id(ids::FILE_DATA, &mut head)?;
    vint::make_size(data_size, 0, &mut head)?;

    let mut header = Vec::new();
    vint::make_id(ids::ATTACHED_FILE, &mut header)?;
    vint::make_size(head.len() as u64 + data_size, 0, &mut header)?;
    out.write_all(&header)?;
    out.write_all(&head)?;
    if let Some(data) = &attachment.data {
        data.copy_to(out, progress)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::EbmlKind;
    use std::io::Cursor;

    #[test]
    fn make_parse_round_trip() {
        let attachment = Attachment {
            id: 42,
            name: "cover.png".into(),
            description: "front cover".into(),
            mime_type: "image/png".into(),
            data: Some(DataBlock::from_buffer(vec![0x89, b'P', b'N', b'G'])),
            ignored: false,
        };
        let mut bytes = Vec::new();
        make_attached_file(&attachment, &mut bytes, &mut Diagnostics::new(), &Progress::new())
            .unwrap();
        assert_eq!(bytes.len() as u64, attached_file_size(&attachment).unwrap());

        let provider = StreamProvider::Buffer(std::sync::Arc::new(bytes.clone()));
        let mut io = Cursor::new(bytes.clone());
        let mut tree = EbmlTree::new(EbmlKind::default());
        let root = tree.parse_root(&mut io, 0, bytes.len() as u64).unwrap();
        assert_eq!(tree.id(root), ids::ATTACHED_FILE);
        let reread =
            parse_attached_file(&mut io, &mut tree, root, &provider, &mut Diagnostics::new())
                .unwrap();
        assert_eq!(reread.id, 42);
        assert_eq!(reread.name, "cover.png");
        assert_eq!(reread.mime_type, "image/png");
        let mut payload = Vec::new();
        reread
            .data
            .unwrap()
            .copy_to(&mut payload, &Progress::new())
            .unwrap();
        assert_eq!(payload, vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn missing_mime_type_is_reported() {
        let attachment = Attachment {
            id: 1,
            name: "blob".into(),
            data: Some(DataBlock::from_buffer(vec![1])),
            ..Attachment::default()
        };
        let mut diag = Diagnostics::new();
        make_attached_file(&attachment, &mut Vec::new(), &mut diag, &Progress::new()).unwrap();
        assert_eq!(diag.level(), crate::diag::DiagLevel::Warning);
    }
}

//! Attached files and the lazy data blocks backing them.

use crate::error::{Error, Result};
use crate::progress::Progress;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Where a [`DataBlock`] reads its bytes from.
///
/// Stored by value so the file facade can swap the path-backed variant for
/// a new one after a rewrite re-opens the file; outstanding blocks keep
/// working without holding a stale handle.
#[derive(Debug, Clone)]
pub enum StreamProvider {
    /// Re-open the file at this path on demand.
    Path(PathBuf),
    /// Serve from an in-memory buffer.
    Buffer(Arc<Vec<u8>>),
}

/// A lazily loaded range of bytes, usually the payload of an attachment.
#[derive(Debug, Clone)]
pub struct DataBlock {
    provider: StreamProvider,
    start_offset: u64,
    end_offset: u64,
    buffer: Option<Arc<Vec<u8>>>,
}

impl DataBlock {
    /// A block serving `start_offset..end_offset` of the provider.
    pub fn new(provider: StreamProvider, start_offset: u64, end_offset: u64) -> Self {
        Self { provider, start_offset, end_offset, buffer: None }
    }

    /// A block backed entirely by memory.
    pub fn from_buffer(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            provider: StreamProvider::Buffer(Arc::new(data)),
            start_offset: 0,
            end_offset: size,
            buffer: None,
        }
    }

    /// Size of the block in bytes.
    pub fn size(&self) -> u64 {
        self.end_offset - self.start_offset
    }

    /// Offset of the first byte within the provider.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Rebinds the provider, keeping the offsets. Called by the facade
    /// when the underlying file has been replaced.
    pub fn rebind(&mut self, provider: StreamProvider) {
        self.provider = provider;
    }

    /// Loads the block into memory so it stays available while the
    /// original file is truncated and rewritten.
    pub fn make_buffer(&mut self) -> Result<()> {
        if self.buffer.is_some() {
            return Ok(());
        }
        let data = match &self.provider {
            StreamProvider::Buffer(data) => {
                let start = self.start_offset as usize;
                let end = self.end_offset as usize;
                data.get(start..end).ok_or(Error::Truncated)?.to_vec()
            }
            StreamProvider::Path(path) => {
                let mut reader = BufReader::new(File::open(path)?);
                reader.seek(SeekFrom::Start(self.start_offset))?;
                let mut data = Vec::with_capacity(self.size() as usize);
                let n = std::io::copy(&mut std::io::Read::take(reader, self.size()), &mut data)?;
                if n != self.size() {
                    return Err(Error::Truncated);
                }
                data
            }
        };
        self.buffer = Some(Arc::new(data));
        Ok(())
    }

    /// Discards the in-memory copy.
    pub fn discard_buffer(&mut self) {
        self.buffer = None;
    }

    /// Streams the block to `out`, from the buffer when one was captured.
    pub fn copy_to<W: Write>(&self, out: &mut W, progress: &Progress) -> Result<()> {
        if let Some(buffer) = &self.buffer {
            out.write_all(buffer)?;
            return Ok(());
        }
        match &self.provider {
            StreamProvider::Buffer(data) => {
                let start = self.start_offset as usize;
                let end = self.end_offset as usize;
                out.write_all(data.get(start..end).ok_or(Error::Truncated)?)?;
                Ok(())
            }
            StreamProvider::Path(path) => {
                let mut reader = BufReader::new(File::open(path)?);
                reader.seek(SeekFrom::Start(self.start_offset))?;
                crate::io::copy_range(&mut reader, out, self.size(), progress)
            }
        }
    }
}

/// A file attached to a container.
#[derive(Debug, Clone, Default)]
pub struct Attachment {
    /// Unique ID within the container.
    pub id: u64,
    /// File name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// MIME type of the payload.
    pub mime_type: String,
    /// The payload.
    pub data: Option<DataBlock>,
    /// Ignored attachments are skipped on save.
    pub ignored: bool,
}

impl Attachment {
    /// Creates an attachment from an in-memory payload.
    pub fn from_data(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: Some(DataBlock::from_buffer(data)),
            ..Self::default()
        }
    }

    /// Whether nothing about the attachment is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.description.is_empty()
            && self.mime_type.is_empty()
            && self.data.is_none()
    }

    /// A short description for diagnostics.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("attachment {}", self.id)
        } else {
            format!("attachment '{}'", self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_considers_all_metadata() {
        let mut attachment = Attachment::default();
        assert!(attachment.is_empty());
        attachment.mime_type = "image/png".into();
        assert!(!attachment.is_empty());
        attachment = Attachment::from_data("cover.png", "image/png", vec![1, 2, 3]);
        assert!(!attachment.is_empty());
    }

    #[test]
    fn buffered_block_round_trip() {
        let mut block = DataBlock::from_buffer(vec![1, 2, 3, 4]);
        assert_eq!(block.size(), 4);
        block.make_buffer().unwrap();
        let mut out = Vec::new();
        block.copy_to(&mut out, &Progress::new()).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }
}

//! Iteration over the segments of an Ogg bitstream.

use crate::error::{Error, Result};
use crate::ogg::page::OggPageHeader;
use std::io::{Read, Seek, SeekFrom};

/// Iterates through the segments of an Ogg stream, hiding page and
/// segment boundaries from the caller.
///
/// Freshly constructed iterators are invalid; call [`OggIterator::reset`]
/// to point at the first matching segment. The page buffer is append-only:
/// pages stay materialized once fetched, so rewinding never re-parses.
///
/// The serial-number filter applies to page navigation
/// ([`OggIterator::next_page`], [`OggIterator::previous_page`],
/// [`OggIterator::reset`]) and to the segment hops done inside
/// [`OggIterator::read`]; pages of other logical streams are skipped.
#[derive(Debug, Clone, Default)]
pub struct OggIterator {
    start_offset: u64,
    stream_size: u64,
    pages: Vec<OggPageHeader>,
    page: usize,
    segment: usize,
    bytes_read: u64,
    offset: u64,
    filter: Option<u32>,
}

impl OggIterator {
    /// Creates an iterator over `stream_size` bytes starting at
    /// `start_offset`. The iterator is invalid until [`OggIterator::reset`].
    pub fn new(start_offset: u64, stream_size: u64) -> Self {
        Self { start_offset, stream_size, ..Self::default() }
    }

    /// Drops all fetched pages and re-targets the iterator.
    pub fn clear(&mut self, start_offset: u64, stream_size: u64) {
        *self = Self::new(start_offset, stream_size);
    }

    /// All pages fetched so far.
    pub fn pages(&self) -> &[OggPageHeader] {
        &self.pages
    }

    /// Restricts page navigation to the logical stream with this serial.
    pub fn set_filter(&mut self, stream_serial: u32) {
        self.filter = Some(stream_serial);
    }

    /// Removes the serial filter.
    pub fn remove_filter(&mut self) {
        self.filter = None;
    }

    fn matches_filter(&self, page: &OggPageHeader) -> bool {
        self.filter.map_or(true, |serial| page.stream_serial == serial)
    }

    /// Whether the iterator points at a valid segment.
    pub fn is_valid(&self) -> bool {
        self.page < self.pages.len()
            && self.segment < self.pages[self.page].segment_sizes.len()
    }

    /// The page the iterator points at.
    pub fn current_page(&self) -> Option<&OggPageHeader> {
        self.pages.get(self.page)
    }

    /// Index of the current page.
    pub fn current_page_index(&self) -> usize {
        self.page
    }

    /// Index of the current segment within the current page.
    pub fn current_segment_index(&self) -> usize {
        self.segment
    }

    /// Size of the current segment.
    pub fn current_segment_size(&self) -> u64 {
        self.pages[self.page].segment_sizes[self.segment] as u64
    }

    /// Bytes already consumed from the current segment.
    pub fn bytes_read_from_current_segment(&self) -> u64 {
        self.bytes_read
    }

    /// Absolute offset of the next byte [`OggIterator::read`] would yield.
    pub fn current_character_offset(&self) -> u64 {
        self.offset + self.bytes_read
    }

    /// Points the iterator at the first non-empty segment of the first
    /// matching page. Fetched pages remain buffered.
    pub fn reset<R: Read + Seek>(&mut self, io: &mut R) -> Result<()> {
        self.page = 0;
        self.segment = 0;
        self.bytes_read = 0;
        self.offset = 0;
        loop {
            if self.page >= self.pages.len() && !self.fetch_next_page(io)? {
                // no matching page found: the iterator stays invalid
                return Ok(());
            }
            let page = &self.pages[self.page];
            if !page.segment_sizes.is_empty() && self.matches_filter(page) {
                self.offset = page.data_offset();
                return Ok(());
            }
            self.page += 1;
        }
    }

    /// Advances to the first segment of the next matching page.
    pub fn next_page<R: Read + Seek>(&mut self, io: &mut R) -> Result<()> {
        loop {
            self.page += 1;
            if self.page >= self.pages.len() && !self.fetch_next_page(io)? {
                // no further page: the iterator becomes invalid
                return Ok(());
            }
            let page = &self.pages[self.page];
            if !page.segment_sizes.is_empty() && self.matches_filter(page) {
                self.segment = 0;
                self.bytes_read = 0;
                self.offset = page.data_offset();
                return Ok(());
            }
        }
    }

    /// Advances to the next segment, hopping to the next matching page
    /// when the current one is exhausted.
    pub fn next_segment<R: Read + Seek>(&mut self, io: &mut R) -> Result<()> {
        let page = &self.pages[self.page];
        if self.matches_filter(page) && self.segment + 1 < page.segment_sizes.len() {
            self.offset += page.segment_sizes[self.segment] as u64;
            self.segment += 1;
            self.bytes_read = 0;
            Ok(())
        } else {
            self.next_page(io)
        }
    }

    /// Rewinds to the last segment of the previous matching page. Only
    /// already-fetched pages are considered.
    pub fn previous_page(&mut self) {
        while self.page > 0 {
            self.page -= 1;
            let page = &self.pages[self.page];
            if self.matches_filter(page) && !page.segment_sizes.is_empty() {
                self.segment = page.segment_sizes.len() - 1;
                self.bytes_read = 0;
                self.offset = page.data_offset()
                    + page.segment_sizes[..self.segment].iter().map(|&s| s as u64).sum::<u64>();
                return;
            }
        }
    }

    /// Rewinds by one segment.
    pub fn previous_segment(&mut self) {
        let page = &self.pages[self.page];
        if self.segment > 0 && self.matches_filter(page) {
            self.segment -= 1;
            self.offset -= page.segment_sizes[self.segment] as u64;
            self.bytes_read = 0;
        } else {
            self.previous_page();
        }
    }

    /// Reads exactly `buffer.len()` bytes, crossing segment and page
    /// boundaries as needed. Fails with [`Error::Truncated`] when the
    /// stream ends first.
    pub fn read<R: Read + Seek>(&mut self, io: &mut R, buffer: &mut [u8]) -> Result<()> {
        let mut done = 0;
        let mut count = buffer.len();
        while self.is_valid() && count > 0 {
            let available = (self.current_segment_size() - self.bytes_read) as usize;
            io.seek(SeekFrom::Start(self.current_character_offset()))?;
            if count <= available {
                io.read_exact(&mut buffer[done..done + count])?;
                self.bytes_read += count as u64;
                return Ok(());
            }
            io.read_exact(&mut buffer[done..done + available])?;
            self.next_segment(io)?;
            done += available;
            count -= available;
        }
        if count > 0 {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    /// Advances the read position by `count` bytes without reading them.
    pub fn seek_forward<R: Read + Seek>(&mut self, io: &mut R, mut count: u64) -> Result<()> {
        while self.is_valid() && count > 0 {
            let available = self.current_segment_size() - self.bytes_read;
            if count <= available {
                self.bytes_read += count;
                return Ok(());
            }
            self.next_segment(io)?;
            count -= available;
        }
        if count > 0 {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    /// Whether at least `at_least` bytes remain in the current segment.
    pub fn bytes_remaining(&self, at_least: u64) -> bool {
        self.is_valid() && self.current_segment_size() - self.bytes_read >= at_least
    }

    /// Whether the last page of the stream has been fetched.
    pub fn is_last_page_fetched(&self) -> bool {
        self.pages
            .last()
            .map(|page| page.start_offset + page.total_size() >= self.stream_size)
            .unwrap_or(false)
    }

    /// Fetches the page following the last buffered one. Only possible when
    /// the iterator stands at the end of the buffer.
    fn fetch_next_page<R: Read + Seek>(&mut self, io: &mut R) -> Result<bool> {
        if self.page == self.pages.len() {
            let offset = match self.pages.last() {
                Some(page) => page.start_offset + page.total_size(),
                None => self.start_offset,
            };
            if offset < self.stream_size {
                let page = OggPageHeader::parse(io, offset, self.stream_size - offset)?;
                self.pages.push(page);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg::page::tests::build_page;
    use crate::ogg::page::{FLAG_FIRST, FLAG_LAST};
    use std::io::Cursor;

    fn two_stream_file() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(build_page(1, 0, FLAG_FIRST, 0, &[b"s1-first"]));
        bytes.extend(build_page(2, 0, FLAG_FIRST, 0, &[b"s2-first"]));
        bytes.extend(build_page(1, 1, 0, 100, &[b"s1-", b"second"]));
        bytes.extend(build_page(2, 1, FLAG_LAST, 100, &[b"s2-second"]));
        bytes.extend(build_page(1, 2, FLAG_LAST, 200, &[b"s1-last"]));
        bytes
    }

    #[test]
    fn read_crosses_segments_and_pages() {
        let bytes = two_stream_file();
        let mut io = Cursor::new(bytes.clone());
        let mut iter = OggIterator::new(0, bytes.len() as u64);
        iter.set_filter(1);
        iter.reset(&mut io).unwrap();
        assert!(iter.is_valid());
        let mut buf = [0u8; 8];
        iter.read(&mut io, &mut buf).unwrap();
        assert_eq!(&buf, b"s1-first");
        // crossing into the next matching page skips the serial-2 page
        let mut buf = [0u8; 9];
        iter.read(&mut io, &mut buf).unwrap();
        assert_eq!(&buf, b"s1-second");
        let mut buf = [0u8; 7];
        iter.read(&mut io, &mut buf).unwrap();
        assert_eq!(&buf, b"s1-last");
        assert!(matches!(iter.read(&mut io, &mut [0u8; 1]), Err(Error::Truncated)));
    }

    #[test]
    fn seek_forward_crosses_boundaries() {
        let bytes = two_stream_file();
        let mut io = Cursor::new(bytes.clone());
        let mut iter = OggIterator::new(0, bytes.len() as u64);
        iter.set_filter(1);
        iter.reset(&mut io).unwrap();
        iter.seek_forward(&mut io, 11).unwrap();
        let mut buf = [0u8; 6];
        iter.read(&mut io, &mut buf).unwrap();
        assert_eq!(&buf, b"second");
    }

    #[test]
    fn previous_page_rewinds_within_buffer() {
        let bytes = two_stream_file();
        let mut io = Cursor::new(bytes.clone());
        let mut iter = OggIterator::new(0, bytes.len() as u64);
        iter.reset(&mut io).unwrap();
        iter.next_page(&mut io).unwrap();
        iter.next_page(&mut io).unwrap();
        assert_eq!(iter.current_page().unwrap().sequence_number, 1);
        let fetched = iter.pages().len();
        iter.previous_page();
        assert_eq!(iter.pages().len(), fetched);
        assert_eq!(iter.current_page().unwrap().stream_serial, 2);
        assert_eq!(iter.current_page().unwrap().sequence_number, 0);
    }

    #[test]
    fn filter_applies_to_navigation() {
        let bytes = two_stream_file();
        let mut io = Cursor::new(bytes.clone());
        let mut iter = OggIterator::new(0, bytes.len() as u64);
        iter.set_filter(2);
        iter.reset(&mut io).unwrap();
        assert_eq!(iter.current_page().unwrap().stream_serial, 2);
        iter.next_page(&mut io).unwrap();
        assert_eq!(iter.current_page().unwrap().stream_serial, 2);
        assert!(iter.current_page().unwrap().is_last());
        iter.next_page(&mut io).unwrap();
        assert!(!iter.is_valid());
    }
}

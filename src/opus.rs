//! The Opus identification header.

use crate::error::{Error, Result};
use crate::ogg::iter::OggIterator;
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Seek};

/// The "OpusHead" packet of an Ogg Opus stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpusIdentificationHeader {
    /// Encapsulation version.
    pub version: u8,
    /// Channel count.
    pub channels: u8,
    /// Samples (at 48 kHz) to discard from the decoder output at the start.
    pub pre_skip: u16,
    /// Sample rate of the original input, in Hz.
    pub sample_rate: u32,
    /// Output gain in Q7.8 dB.
    pub output_gain: i16,
    /// Channel mapping family.
    pub channel_map: u8,
}

impl OpusIdentificationHeader {
    /// Parses the header from the current position of `iter`.
    pub fn parse<R: Read + Seek>(io: &mut R, iter: &mut OggIterator) -> Result<Self> {
        let mut sig = [0u8; 8];
        iter.read(io, &mut sig)?;
        if &sig != b"OpusHead" {
            return Err(Error::Invalid("Opus identification header not present"));
        }
        let mut buff = [0u8; 11];
        iter.read(io, &mut buff)?;
        Ok(Self {
            version: buff[0],
            channels: buff[1],
            pre_skip: LittleEndian::read_u16(&buff[2..]),
            sample_rate: LittleEndian::read_u32(&buff[4..]),
            output_gain: LittleEndian::read_i16(&buff[8..]),
            channel_map: buff[10],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg::page::tests::build_page;
    use crate::ogg::page::FLAG_FIRST;
    use std::io::Cursor;

    #[test]
    fn parses_opus_head() {
        // 2 channels, 48000 Hz input rate, pre-skip 312
        let mut packet = b"OpusHead".to_vec();
        packet.push(1); // version
        packet.push(2); // channels
        packet.extend_from_slice(&312u16.to_le_bytes());
        packet.extend_from_slice(&48_000u32.to_le_bytes());
        packet.extend_from_slice(&0i16.to_le_bytes());
        packet.push(0); // channel map
        let page = build_page(5, 0, FLAG_FIRST, 0, &[&packet]);
        let mut io = Cursor::new(page.clone());
        let mut iter = OggIterator::new(0, page.len() as u64);
        iter.reset(&mut io).unwrap();
        let header = OpusIdentificationHeader::parse(&mut io, &mut iter).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.sample_rate, 48_000);
        assert_eq!(header.pre_skip, 312);
        assert_eq!(header.version, 1);
    }
}

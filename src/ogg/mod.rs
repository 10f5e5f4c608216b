//! Ogg transport: pages, the segment iterator and the container driver.

pub mod container;
pub mod iter;
pub mod page;

pub use container::{OggCodec, OggContainer, OggStream};
pub use iter::OggIterator;
pub use page::OggPageHeader;

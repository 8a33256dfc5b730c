//! Fixed-length key encoding for index pages.

use byteorder::{ByteOrder, LittleEndian};

/// A key that can live in a B+ tree page.
///
/// Keys are fixed-length so a page holds a statically known number of
/// entries and slot arithmetic stays trivial. Ordering is *not* part of
/// this trait; the tree is constructed with an explicit comparator.
pub trait IndexKey: Copy + Default + std::fmt::Debug {
    /// Encoded width in bytes.
    const ENCODED_LEN: usize;

    /// Write the key into the first [`Self::ENCODED_LEN`] bytes of `buf`.
    fn encode(&self, buf: &mut [u8]);

    /// Read a key from the first [`Self::ENCODED_LEN`] bytes of `buf`.
    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for u32 {
    const ENCODED_LEN: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl IndexKey for u64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

impl IndexKey for i64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

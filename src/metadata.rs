//! Fixed-size binary records describing where entries live inside a file.
//!
//! Both records are stored little-endian. `EntryMetadata` fills the
//! allocation table at the head of every partition file; `SnapshotMetadata`
//! is the header of the snapshot file.

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

/// One slot of a partition's allocation table.
///
/// `offset` is the absolute file offset of the payload; an offset of zero
/// marks the slot as unused, which is unambiguous because payloads always
/// start past the table.
#[derive(Debug, Clone, Copy, Default)]
#[derive(PartialEq, Eq)]
pub(crate) struct EntryMetadata {
    pub offset: u64,
    pub length: u64,
    pub term: i64,
    pub timestamp: i64,
}

impl EntryMetadata {
    /// Encoded size in bytes.
    pub const SIZE: usize = 32;

    /// Whether the slot has never been written.
    pub fn is_vacant(&self) -> bool {
        self.offset == 0
    }

    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), Self::SIZE);

        let mut w = buf;
        w.write_u64::<LittleEndian>(self.offset).unwrap();
        w.write_u64::<LittleEndian>(self.length).unwrap();
        w.write_i64::<LittleEndian>(self.term).unwrap();
        w.write_i64::<LittleEndian>(self.timestamp).unwrap();
    }

    pub fn decode(mut buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= Self::SIZE);

        Self {
            offset: buf.read_u64::<LittleEndian>().unwrap(),
            length: buf.read_u64::<LittleEndian>().unwrap(),
            term: buf.read_i64::<LittleEndian>().unwrap(),
            timestamp: buf.read_i64::<LittleEndian>().unwrap(),
        }
    }
}

/// Header of the snapshot file.
///
/// `index` is the last log index the snapshot replaces, inclusive.
#[derive(Debug, Clone, Copy, Default)]
#[derive(PartialEq, Eq)]
pub(crate) struct SnapshotMetadata {
    pub offset: u64,
    pub length: u64,
    pub term: i64,
    pub timestamp: i64,
    pub index: u64,
}

impl SnapshotMetadata {
    /// Encoded size in bytes.
    pub const SIZE: usize = 40;

    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), Self::SIZE);

        let mut w = buf;
        w.write_u64::<LittleEndian>(self.offset).unwrap();
        w.write_u64::<LittleEndian>(self.length).unwrap();
        w.write_i64::<LittleEndian>(self.term).unwrap();
        w.write_i64::<LittleEndian>(self.timestamp).unwrap();
        w.write_u64::<LittleEndian>(self.index).unwrap();
    }

    pub fn decode(mut buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= Self::SIZE);

        Self {
            offset: buf.read_u64::<LittleEndian>().unwrap(),
            length: buf.read_u64::<LittleEndian>().unwrap(),
            term: buf.read_i64::<LittleEndian>().unwrap(),
            timestamp: buf.read_i64::<LittleEndian>().unwrap(),
            index: buf.read_u64::<LittleEndian>().unwrap(),
        }
    }
}

//! Partition files.
//!
//! A partition holds a contiguous range of `records_per_partition` log
//! entries in a file named by its decimal partition number. The file starts
//! with an allocation table of [`EntryMetadata`] slots and continues with
//! the payload region, where payloads of consecutive slots are laid out
//! back to back.

use std::fs::File;
use std::fs::OpenOptions;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use crate::config::Options;
use crate::entry::LogEntry;
use crate::error::Error;
use crate::error::Result;
use crate::metadata::EntryMetadata;
use crate::pio;
use crate::session::Session;

pub(crate) struct Partition {
    file: File,
    path: PathBuf,
    number: u64,
    records: u32,
    /// In-memory mirror of the on-disk allocation table, when enabled.
    cache: Option<Vec<EntryMetadata>>,
}

impl Partition {
    /// Open or create the partition file `<number>` under `dir`.
    ///
    /// A newly created file is extended to cover the allocation table plus
    /// the configured initial payload region. An existing file keeps its
    /// length and, when caching is enabled, has its table read back through
    /// `session`; a table shorter than expected fails with
    /// [`Error::UnexpectedEof`].
    pub fn open(dir: &Path, number: u64, options: &Options, session: &mut Session) -> Result<Self> {
        let path = dir.join(number.to_string());
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;

        let fresh = file.metadata()?.len() == 0;

        let mut partition = Self {
            file,
            path,
            number,
            records: options.records_per_partition,
            cache: options
                .use_caching
                .then(|| vec![EntryMetadata::default(); options.records_per_partition as usize]),
        };

        if fresh {
            partition.allocate(options.initial_partition_size)?;
        } else {
            partition.populate_cache(session)?;
        }

        Ok(partition)
    }

    /// Absolute index of slot 0.
    pub fn first_index(&self) -> u64 {
        self.number * self.records as u64
    }

    /// Absolute index of the highest slot.
    pub fn last_index(&self) -> u64 {
        self.first_index() + self.records as u64 - 1
    }

    fn table_size(&self) -> u64 {
        self.records as u64 * EntryMetadata::SIZE as u64
    }

    fn slot_of(&self, index: u64) -> u32 {
        debug_assert!(
            index >= self.first_index() && index <= self.last_index(),
            "index {} outside partition {}",
            index,
            self.number,
        );
        (index - self.first_index()) as u32
    }

    /// Extend a fresh file to the payload region start plus `initial_size`,
    /// so early appends do not grow the file one entry at a time.
    fn allocate(&mut self, initial_size: u64) -> io::Result<()> {
        self.file.set_len(self.table_size() + initial_size)
    }

    /// Read the allocation table back into the in-memory mirror, in chunks
    /// sized by the session buffer.
    fn populate_cache(&mut self, session: &mut Session) -> Result<()> {
        let Some(mut cache) = self.cache.take() else {
            return Ok(());
        };

        let table = self.table_size() as usize;
        let mut offset = 0usize;
        while offset < table {
            let want = (table - offset).min(session.capacity() / EntryMetadata::SIZE * EntryMetadata::SIZE);
            let buf = session.chunk(want);

            pio::read_exact_at(&self.file, buf, offset as u64).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    Error::UnexpectedEof {
                        path: self.path.clone(),
                    }
                } else {
                    Error::Io(e)
                }
            })?;

            for (i, record) in buf.chunks_exact(EntryMetadata::SIZE).enumerate() {
                cache[offset / EntryMetadata::SIZE + i] = EntryMetadata::decode(record);
            }
            offset += want;
        }

        self.cache = Some(cache);
        Ok(())
    }

    /// Metadata of a slot, from the cache when present.
    pub fn metadata(&self, session: &mut Session, slot: u32) -> Result<EntryMetadata> {
        debug_assert!(slot < self.records);

        if let Some(cache) = &self.cache {
            return Ok(cache[slot as usize]);
        }

        let buf = session.chunk(EntryMetadata::SIZE);
        pio::read_exact_at(&self.file, buf, slot as u64 * EntryMetadata::SIZE as u64)?;
        Ok(EntryMetadata::decode(buf))
    }

    /// Read the entry at `index`, which is absolute when `absolute` is set
    /// and slot-relative otherwise. Returns `None` for a vacant slot.
    pub fn read(&self, session: &mut Session, index: u64, absolute: bool) -> Result<Option<LogEntry>> {
        let slot = if absolute { self.slot_of(index) } else { index as u32 };

        let meta = self.metadata(session, slot)?;
        if meta.is_vacant() {
            return Ok(None);
        }

        let mut payload = vec![0u8; meta.length as usize];
        pio::read_exact_at(&self.file, &mut payload, meta.offset)?;

        Ok(Some(LogEntry::from_parts(meta.term, meta.timestamp, payload, None)))
    }

    /// Write `entry` at the absolute `index`.
    ///
    /// The payload lands right after the previous slot's payload, keeping
    /// the region contiguous; the first writable slot starts at the payload
    /// region base. The caller batches `flush` calls, so durability is
    /// deferred.
    pub fn write(&mut self, session: &mut Session, entry: &LogEntry, index: u64) -> Result<()> {
        let slot = self.slot_of(index);
        debug_assert!(self.number != 0 || slot != 0, "slot 0 of partition 0 is the initial entry");

        let first_writable = if self.number == 0 { 1 } else { 0 };
        let offset = if slot == first_writable {
            self.table_size()
        } else {
            let prev = self.metadata(session, slot - 1)?;
            debug_assert!(!prev.is_vacant(), "write at {} leaves a gap", index);
            prev.offset + prev.length
        };

        let meta = EntryMetadata {
            offset,
            length: entry.payload().len() as u64,
            term: entry.term(),
            timestamp: entry.timestamp(),
        };

        pio::write_all_at(&self.file, entry.payload(), offset)?;

        let mut buf = [0u8; EntryMetadata::SIZE];
        meta.encode(&mut buf);
        pio::write_all_at(&self.file, &buf, slot as u64 * EntryMetadata::SIZE as u64)?;

        if let Some(cache) = &mut self.cache {
            cache[slot as usize] = meta;
        }

        Ok(())
    }

    pub fn flush(&self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Close the partition and delete its file.
    pub fn destroy(self) -> io::Result<()> {
        let Self { file, path, .. } = self;
        drop(file);
        fs::remove_file(path)
    }
}

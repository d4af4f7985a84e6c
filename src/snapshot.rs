//! Snapshot file.
//!
//! The snapshot is a single entry summarizing the whole committed prefix of
//! the log up to its recorded index. On disk it is a [`SnapshotMetadata`]
//! header followed by the payload. A zero-length file means "no snapshot".

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use crate::entry::LogEntry;
use crate::error::Error;
use crate::error::Result;
use crate::metadata::SnapshotMetadata;
use crate::pio;

pub(crate) const SNAPSHOT_FILE: &str = "snapshot";
pub(crate) const SNAPSHOT_TEMP_FILE: &str = "snapshot.new";

pub(crate) struct SnapshotFile {
    file: File,
    path: PathBuf,
    metadata: SnapshotMetadata,
}

impl SnapshotFile {
    /// Open or create the snapshot file under `dir`. The `temp` variant is
    /// the staging file a snapshot installation writes before the atomic
    /// rename.
    pub fn open(dir: &Path, temp: bool) -> Result<Self> {
        let name = if temp { SNAPSHOT_TEMP_FILE } else { SNAPSHOT_FILE };
        let path = dir.join(name);
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;

        let mut snapshot = Self {
            file,
            path,
            metadata: SnapshotMetadata::default(),
        };
        snapshot.populate_cache()?;

        Ok(snapshot)
    }

    /// Read the header back into memory. An empty file caches index 0.
    pub fn populate_cache(&mut self) -> Result<()> {
        let len = self.file.metadata().map_err(Error::Io)?.len();

        if len == 0 {
            self.metadata = SnapshotMetadata::default();
            return Ok(());
        }

        if len < SnapshotMetadata::SIZE as u64 {
            return Err(Error::UnexpectedEof {
                path: self.path.clone(),
            });
        }

        let mut buf = [0u8; SnapshotMetadata::SIZE];
        pio::read_exact_at(&self.file, &mut buf, 0)?;
        self.metadata = SnapshotMetadata::decode(&buf);

        Ok(())
    }

    /// The last index the snapshot replaces, or 0 when empty.
    pub fn index(&self) -> u64 {
        self.metadata.index
    }

    /// Term of the snapshot entry.
    pub fn term(&self) -> i64 {
        self.metadata.term
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.length == 0
    }

    /// Replace the file content with `entry`, recorded as covering the log
    /// up to `snapshot_index`. The payload is written first and the header
    /// last, then the file is cut to the new size so nothing of a longer
    /// predecessor survives.
    pub fn write(&mut self, entry: &LogEntry, snapshot_index: u64) -> Result<()> {
        let meta = SnapshotMetadata {
            offset: SnapshotMetadata::SIZE as u64,
            length: entry.payload().len() as u64,
            term: entry.term(),
            timestamp: entry.timestamp(),
            index: snapshot_index,
        };

        pio::write_all_at(&self.file, entry.payload(), meta.offset)?;

        let mut buf = [0u8; SnapshotMetadata::SIZE];
        meta.encode(&mut buf);
        pio::write_all_at(&self.file, &buf, 0)?;

        self.file.set_len(meta.offset + meta.length)?;
        self.metadata = meta;

        Ok(())
    }

    /// Materialize the snapshot entry.
    pub fn read(&self) -> Result<LogEntry> {
        debug_assert!(!self.is_empty(), "reading an empty snapshot");

        let mut payload = vec![0u8; self.metadata.length as usize];
        pio::read_exact_at(&self.file, &mut payload, self.metadata.offset)?;

        Ok(LogEntry::from_parts(
            self.metadata.term,
            self.metadata.timestamp,
            payload,
            Some(self.metadata.index),
        ))
    }

    pub fn flush(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

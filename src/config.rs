//! Store configuration.

/// Tunables of a [`WalStore`](crate::WalStore).
///
/// Build one with struct update syntax and let the store validate it:
///
/// ```
/// use walstore::Options;
///
/// let options = Options {
///     records_per_partition: 512,
///     ..Options::default()
/// };
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of log records each partition file holds. At least 2.
    ///
    /// This is a layout parameter: a directory must always be reopened with
    /// the value it was created with.
    pub records_per_partition: u32,

    /// Size of the per-session scratch buffer used for allocation-table I/O,
    /// in bytes. At least 128.
    pub buffer_size: u32,

    /// Bytes preallocated for the payload region of a newly created
    /// partition, to reduce fragmentation of appends.
    pub initial_partition_size: u64,

    /// Mirror every partition's allocation table in memory.
    pub use_caching: bool,

    /// Upper bound on readers running concurrently with each other.
    pub max_concurrent_reads: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            records_per_partition: 1024,
            buffer_size: 2048,
            initial_partition_size: 0,
            use_caching: true,
            max_concurrent_reads: 3,
        }
    }
}

impl Options {
    /// Validate the configuration, returning it on success.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.records_per_partition < 2 {
            return Err(ConfigError::RecordsPerPartition {
                got: self.records_per_partition,
            });
        }

        if self.buffer_size < 128 {
            return Err(ConfigError::BufferSize { got: self.buffer_size });
        }

        if self.max_concurrent_reads < 1 {
            return Err(ConfigError::MaxConcurrentReads {
                got: self.max_concurrent_reads,
            });
        }

        Ok(self)
    }
}

/// Error variants related to configuration.
#[derive(Debug, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ConfigError {
    /// A partition must hold at least the sentinel slot and one record.
    #[error("records_per_partition({got}) must be >= 2")]
    RecordsPerPartition {
        /// The rejected value.
        got: u32,
    },

    /// The scratch buffer must fit at least a few metadata records.
    #[error("buffer_size({got}) must be >= 128")]
    BufferSize {
        /// The rejected value.
        got: u32,
    },

    /// At least one reader must be admitted.
    #[error("max_concurrent_reads({got}) must be >= 1")]
    MaxConcurrentReads {
        /// The rejected value.
        got: u32,
    },
}

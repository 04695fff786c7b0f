//! Engine open options.

/// Verbosity threshold for the engine's own informational log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfoLogLevel {
    /// Everything, including per-operation detail.
    Debug,
    /// Normal operational events.
    #[default]
    Info,
    /// Suspicious but recoverable conditions.
    Warn,
    /// Failed operations.
    Error,
    /// Unrecoverable conditions.
    Fatal,
    /// File headers only.
    Header,
}

/// Options for opening an engine store.
///
/// The sizing knobs mirror what LSM engines expose; the reference
/// [`MemoryEngine`](crate::MemoryEngine) honours the open-behaviour flags
/// and records the rest without acting on them.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Fail if the store already exists.
    pub error_if_exists: bool,

    /// Compress blocks on disk.
    pub compression: bool,

    /// Block cache capacity in bytes.
    pub cache_size: usize,

    /// Memtable size in bytes before flushing.
    pub write_buffer_size: usize,

    /// Approximate uncompressed block size in bytes.
    pub block_size: usize,

    /// Maximum number of open files.
    pub max_open_files: u32,

    /// Keys between restart points for delta encoding.
    pub block_restart_interval: u32,

    /// Maximum size of a table file in bytes.
    pub max_file_size: usize,

    /// Verbosity of the engine's informational log.
    pub info_log_level: InfoLogLevel,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            compression: true,
            cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            block_size: 4096,
            max_open_files: 1000,
            block_restart_interval: 16,
            max_file_size: 2 * 1024 * 1024,
            info_log_level: InfoLogLevel::Info,
        }
    }
}

impl EngineOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fail if the store exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets block compression.
    #[must_use]
    pub const fn compression(mut self, value: bool) -> Self {
        self.compression = value;
        self
    }

    /// Sets the block cache capacity.
    #[must_use]
    pub const fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = bytes;
        self
    }

    /// Sets the write buffer size.
    #[must_use]
    pub const fn write_buffer_size(mut self, bytes: usize) -> Self {
        self.write_buffer_size = bytes;
        self
    }

    /// Sets the informational log level.
    #[must_use]
    pub const fn info_log_level(mut self, level: InfoLogLevel) -> Self {
        self.info_log_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = EngineOptions::default();
        assert!(options.create_if_missing);
        assert!(!options.error_if_exists);
        assert_eq!(options.cache_size, 8 * 1024 * 1024);
        assert_eq!(options.write_buffer_size, 4 * 1024 * 1024);
        assert_eq!(options.block_size, 4096);
        assert_eq!(options.max_open_files, 1000);
        assert_eq!(options.block_restart_interval, 16);
        assert_eq!(options.max_file_size, 2 * 1024 * 1024);
    }

    #[test]
    fn builder_pattern() {
        let options = EngineOptions::new()
            .create_if_missing(false)
            .error_if_exists(true)
            .cache_size(1024);
        assert!(!options.create_if_missing);
        assert!(options.error_if_exists);
        assert_eq!(options.cache_size, 1024);
    }
}

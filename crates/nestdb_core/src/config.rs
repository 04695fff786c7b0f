//! Database configuration.

use crate::crypto::Crypto;
use nestdb_engine::{EngineOptions, InfoLogLevel};

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Delete any existing data directory before opening.
    pub fresh: bool,

    /// At-rest encryption; `None` stores values verbatim.
    pub crypto: Option<Crypto>,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the store already exists.
    pub error_if_exists: bool,

    /// Compress blocks in the engine.
    pub compression: bool,

    /// Engine block cache capacity in bytes.
    pub cache_size: usize,

    /// Engine write buffer size in bytes.
    pub write_buffer_size: usize,

    /// Engine block size in bytes.
    pub block_size: usize,

    /// Maximum open files for the engine.
    pub max_open_files: u32,

    /// Keys between restart points in engine blocks.
    pub block_restart_interval: u32,

    /// Maximum engine table file size in bytes.
    pub max_file_size: usize,

    /// Verbosity of the engine's informational log.
    pub info_log_level: InfoLogLevel,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            fresh: false,
            crypto: None,
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

impl DatabaseOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to delete any existing data directory first.
    #[must_use]
    pub fn fresh(mut self, value: bool) -> Self {
        self.fresh = value;
        self
    }

    /// Sets the encryption configuration.
    #[must_use]
    pub fn crypto(mut self, crypto: Crypto) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if the store exists.
    #[must_use]
    pub fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets the engine block cache capacity.
    #[must_use]
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = bytes;
        self
    }

    /// Sets the engine write buffer size.
    #[must_use]
    pub fn write_buffer_size(mut self, bytes: usize) -> Self {
        self.write_buffer_size = bytes;
        self
    }

    /// Translates the engine-facing subset into engine options.
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            create_if_missing: self.create_if_missing,
            error_if_exists: self.error_if_exists,
            compression: self.compression,
            cache_size: self.cache_size,
            write_buffer_size: self.write_buffer_size,
            block_size: self.block_size,
            max_open_files: self.max_open_files,
            block_restart_interval: self.block_restart_interval,
            max_file_size: self.max_file_size,
            info_log_level: self.info_log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = DatabaseOptions::default();
        assert!(!options.fresh);
        assert!(options.crypto.is_none());
        assert!(options.create_if_missing);
        assert!(!options.error_if_exists);
        assert_eq!(options.cache_size, 8 * 1024 * 1024);
    }

    #[test]
    fn builder_pattern() {
        let options = DatabaseOptions::new().fresh(true).cache_size(1024);
        assert!(options.fresh);
        assert_eq!(options.cache_size, 1024);
    }

    #[test]
    fn engine_options_mirror_tunables() {
        let options = DatabaseOptions::new()
            .write_buffer_size(123)
            .error_if_exists(true);
        let engine = options.engine_options();
        assert_eq!(engine.write_buffer_size, 123);
        assert!(engine.error_if_exists);
    }
}

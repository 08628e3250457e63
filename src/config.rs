//! Store configuration.
//!
//! [`StoreOptions`] collects the open-time knobs: page size (fixed per
//! file, validated against [`PAGE_SIZES`]), the soft block-cache limit,
//! and whether a missing file may be created.

use crate::error::{Error, Result};
use crate::page::PAGE_SIZES;

pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default cache budget in bytes; the block limit is derived from the
/// page size.
pub const DEFAULT_CACHE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    page_size: usize,
    cache_size: Option<usize>,
    create: bool,
}

impl StoreOptions {
    pub fn new() -> Self {
        StoreOptions {
            page_size: DEFAULT_PAGE_SIZE,
            cache_size: None,
            create: true,
        }
    }

    /// Page size for the file. Must be one of [`PAGE_SIZES`].
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Soft limit on cached blocks. Defaults to `8 MiB / page_size`,
    /// rounded up. Zero is allowed: every clean block is evicted as
    /// soon as an operation finishes.
    pub fn cache_size(mut self, blocks: usize) -> Self {
        self.cache_size = Some(blocks);
        self
    }

    /// Whether to create the file when it does not exist.
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !PAGE_SIZES.contains(&self.page_size) {
            return Err(Error::InvalidPageSize {
                size: self.page_size,
            });
        }
        Ok(())
    }

    pub(crate) fn page_size_value(&self) -> usize {
        self.page_size
    }

    pub(crate) fn cache_blocks(&self) -> usize {
        self.cache_size
            .unwrap_or_else(|| DEFAULT_CACHE_BYTES.div_ceil(self.page_size))
    }

    pub(crate) fn create_value(&self) -> bool {
        self.create
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = StoreOptions::default();
        assert_eq!(opts.page_size_value(), 4096);
        assert_eq!(opts.cache_blocks(), 2048);
        assert!(opts.create_value());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn cache_blocks_derive_from_page_size() {
        let opts = StoreOptions::new().page_size(256);
        assert_eq!(opts.cache_blocks(), 32768);

        let opts = StoreOptions::new().page_size(256).cache_size(0);
        assert_eq!(opts.cache_blocks(), 0);
    }

    #[test]
    fn rejects_unlisted_page_sizes() {
        for size in [0, 128, 300, 1000, 65536] {
            let opts = StoreOptions::new().page_size(size);
            assert!(
                matches!(opts.validate(), Err(Error::InvalidPageSize { .. })),
                "page size {} should be rejected",
                size
            );
        }
        for size in PAGE_SIZES {
            assert!(StoreOptions::new().page_size(size).validate().is_ok());
        }
    }
}

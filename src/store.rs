//! # Store Core
//!
//! [`StoreInner`] is the single mutation domain behind the public
//! handles: the host file, the block cache, the two page counters, and
//! the registry of open logical pages. Everything the public API does
//! funnels into methods on this struct; the free-list and overflow
//! walkers live in their own modules as further `impl` blocks.
//!
//! ## Page Counters
//!
//! - `file_pages`: whole pages currently persisted in the host file.
//! - `memory_pages`: the authoritative in-memory count, always at
//!   least `max(file_pages, 1)`. Addresses in
//!   `[file_pages, memory_pages)` exist only as dirty cache blocks
//!   until the next [`StoreInner::save`].
//!
//! ## Allocation
//!
//! [`StoreInner::allocate`] pops the free-list first and extends
//! `memory_pages` otherwise. A freshly created block is always dirty,
//! and dirty blocks are never evicted, so every allocated address is
//! either in the cache or on disk; there is no third place.
//!
//! ## Root Materialization
//!
//! The root page comes into being lazily: a brand-new file stays
//! zero-length until something touches the store, at which point
//! [`StoreInner::ensure_root`] stamps a dirty root block into the
//! cache. A store that is opened and saved without any page activity
//! leaves an empty file behind.
//!
//! ## Save
//!
//! `save` walks the cache in least-recently-used order, raises
//! `file_pages` over any address beyond it, writes dirty blocks in
//! full-page units, marks them clean, and finally trims the cache back
//! to its soft limit.

use std::path::Path;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::block::Block;
use crate::cache::BlockCache;
use crate::config::StoreOptions;
use crate::error::{Error, Result};
use crate::io::PagedFile;
use crate::page::{Addr, PageKind, MAX_SUBTYPE, NIL};

pub(crate) type ManagerId = u64;

/// Registry record for one open logical page.
#[derive(Debug)]
struct OpenPage {
    /// Distinguishes this logical page from a later one at a recycled
    /// address, so a stale handle can never act on the newcomer.
    uid: u64,
    holders: HashMap<ManagerId, usize>,
}

#[derive(Debug)]
pub(crate) struct StoreInner {
    file: Option<PagedFile>,
    page_size: usize,
    cache: BlockCache,
    file_pages: u32,
    memory_pages: u32,
    registry: HashMap<Addr, OpenPage>,
    next_manager: ManagerId,
    next_uid: u64,
}

impl StoreInner {
    pub(crate) fn open(path: &Path, options: &StoreOptions) -> Result<Self> {
        options.validate()?;
        let page_size = options.page_size_value();
        let (file, file_pages) = PagedFile::open(path, page_size, options.create_value())?;

        let mut inner = StoreInner {
            file: Some(file),
            page_size,
            cache: BlockCache::new(options.cache_blocks()),
            file_pages,
            memory_pages: file_pages.max(1),
            registry: HashMap::new(),
            next_manager: 0,
            next_uid: 0,
        };

        if file_pages > 0 {
            inner.load_block(0)?;
            let root = inner
                .cache
                .peek(0)
                .expect("root block loaded above"); // INVARIANT: load_block inserted it
            if root.kind() != PageKind::Root {
                return Err(Error::corrupt(format!(
                    "page 0 is {}, not Root",
                    root.kind().name()
                )));
            }
            let stored = root.stored_page_size() as usize;
            if stored != page_size {
                return Err(Error::corrupt(format!(
                    "stored page size {} does not match configured {}",
                    stored, page_size
                )));
            }
        }

        debug!(page_size, file_pages, "store opened");
        Ok(inner)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.file.is_some() {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    /// Brings the block at `addr` into the cache and refreshes its LRU
    /// position.
    pub(crate) fn load_block(&mut self, addr: Addr) -> Result<()> {
        if self.cache.contains(addr) {
            self.cache.get(addr);
            return Ok(());
        }
        if (addr as u32) < self.file_pages {
            let mut buf = vec![0u8; self.page_size].into_boxed_slice();
            self.file
                .as_mut()
                .ok_or(Error::Closed)?
                .read_page(addr, &mut buf)?;
            self.cache.insert(Block::from_disk(addr, buf));
            Ok(())
        } else {
            Err(Error::RangeExceeded { addr })
        }
    }

    pub(crate) fn block(&mut self, addr: Addr) -> Result<&Block> {
        self.load_block(addr)?;
        Ok(self.cache.get(addr).expect("block loaded above")) // INVARIANT: load_block inserted it
    }

    pub(crate) fn block_mut(&mut self, addr: Addr) -> Result<&mut Block> {
        self.load_block(addr)?;
        Ok(self.cache.get_mut(addr).expect("block loaded above")) // INVARIANT: load_block inserted it
    }

    /// Replaces the slot at `addr` with a dirty Empty block so the
    /// cleared state reaches disk on the next save.
    pub(crate) fn clear_block(&mut self, addr: Addr) {
        self.cache.insert(Block::empty(addr, self.page_size));
    }

    /// Replaces the slot at `addr` with a freshly created dirty block.
    /// Only brand-new addresses and Empty blocks may be overwritten.
    pub(crate) fn materialize(&mut self, addr: Addr, kind: PageKind) {
        debug_assert!(self
            .cache
            .peek(addr)
            .map_or(true, |b| b.kind() == PageKind::Empty));
        self.cache.insert(Block::alloc(addr, kind, self.page_size));
    }

    /// Guarantees the root block exists in the cache, creating it on a
    /// fresh file.
    pub(crate) fn ensure_root(&mut self) -> Result<()> {
        if self.cache.contains(0) {
            return Ok(());
        }
        if self.file_pages > 0 {
            self.load_block(0)
        } else {
            let mut root = Block::alloc(0, PageKind::Root, self.page_size);
            root.set_stored_page_size(self.page_size as u16);
            self.cache.insert(root);
            trace!("root page materialized");
            Ok(())
        }
    }

    /// Returns the address of an unused page: a recycled one from the
    /// free-list if available, otherwise the next counter value.
    pub(crate) fn allocate(&mut self) -> Result<Addr> {
        self.ensure_root()?;
        if let Some(addr) = self.free_take_one()? {
            trace!(addr, "allocated recycled page");
            return Ok(addr);
        }
        if self.memory_pages > u16::MAX as u32 {
            return Err(Error::AddressSpaceExhausted);
        }
        let addr = self.memory_pages as Addr;
        self.memory_pages += 1;
        trace!(addr, "allocated fresh page");
        Ok(addr)
    }

    pub(crate) fn save(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        let mut written = 0usize;

        for addr in self.cache.addrs_lru_first() {
            if addr as u32 >= self.file_pages {
                self.file_pages = addr as u32 + 1;
            }
            if let Some(block) = self.cache.peek_mut(addr) {
                if block.is_dirty() {
                    file.write_page(addr, block.bytes())?;
                    block.mark_clean();
                    written += 1;
                }
            }
        }

        debug!(written, file_pages = self.file_pages, "store saved");
        self.cache.trim();
        Ok(())
    }

    pub(crate) fn sync(&mut self) -> Result<()> {
        self.file.as_ref().ok_or(Error::Closed)?.sync()
    }

    /// Drops the host file handle. Safe to call repeatedly.
    pub(crate) fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("store closed");
        }
    }

    pub(crate) fn trim_cache(&mut self) {
        self.cache.trim();
    }

    /// Whether the page at `addr` physically exists, in the cache or in
    /// the host file.
    pub(crate) fn has_block(&self, addr: Addr) -> bool {
        self.cache.contains(addr) || (addr as u32) < self.file_pages
    }

    pub(crate) fn size(&self) -> u64 {
        self.file_pages as u64 * self.page_size as u64
    }

    pub(crate) fn unsaved_size(&self) -> u64 {
        self.cache.dirty_count() as u64 * self.page_size as u64
    }

    pub(crate) fn page_count(&self) -> u32 {
        self.memory_pages
    }

    // ------------------------------------------------------------------
    // Open-page registry.

    pub(crate) fn new_manager(&mut self) -> ManagerId {
        let id = self.next_manager;
        self.next_manager += 1;
        id
    }

    fn acquire(&mut self, mgr: ManagerId, addr: Addr) -> u64 {
        let next_uid = &mut self.next_uid;
        let entry = self.registry.entry(addr).or_insert_with(|| {
            let uid = *next_uid;
            *next_uid += 1;
            OpenPage {
                uid,
                holders: HashMap::new(),
            }
        });
        *entry.holders.entry(mgr).or_insert(0) += 1;
        entry.uid
    }

    pub(crate) fn release(&mut self, mgr: ManagerId, addr: Addr, uid: u64) {
        if let Some(entry) = self.registry.get_mut(&addr) {
            if entry.uid != uid {
                return;
            }
            if let Some(count) = entry.holders.get_mut(&mgr) {
                *count -= 1;
                if *count == 0 {
                    entry.holders.remove(&mgr);
                }
            }
            if entry.holders.is_empty() {
                self.registry.remove(&addr);
            }
        }
    }

    pub(crate) fn release_all(&mut self, mgr: ManagerId) {
        self.registry.retain(|_, entry| {
            entry.holders.remove(&mgr);
            !entry.holders.is_empty()
        });
    }

    /// A handle is valid while its logical page is still registered
    /// under the same uid and its manager still holds it.
    pub(crate) fn check_handle(&self, mgr: ManagerId, addr: Addr, uid: u64) -> Result<()> {
        match self.registry.get(&addr) {
            Some(entry) if entry.uid == uid && entry.holders.contains_key(&mgr) => Ok(()),
            _ => Err(Error::UseAfterRelease { addr }),
        }
    }

    // ------------------------------------------------------------------
    // Logical page operations.

    /// Loads an existing root or entry page and records the hold.
    /// Returns `(addr, uid)` for the handle.
    pub(crate) fn open_page(
        &mut self,
        mgr: ManagerId,
        addr: Addr,
        subtype: Option<u8>,
    ) -> Result<(Addr, u64)> {
        if addr != 0 && addr as u32 >= self.memory_pages {
            return Err(Error::InvalidAddress {
                addr,
                page_count: self.memory_pages,
            });
        }
        self.ensure_root()?;

        let kind = self.block(addr)?.kind();
        match kind {
            PageKind::Root => {
                if subtype.is_some() {
                    return Err(Error::TypeMismatch {
                        addr,
                        expected: "Entry".into(),
                        actual: "Root".into(),
                    });
                }
            }
            PageKind::Entry(actual) => {
                if let Some(expected) = subtype {
                    if expected != actual {
                        return Err(Error::TypeMismatch {
                            addr,
                            expected: format!("Entry({})", expected),
                            actual: format!("Entry({})", actual),
                        });
                    }
                }
            }
            PageKind::Empty => return Err(Error::EmptyPageOp { addr }),
            other => {
                return Err(Error::TypeMismatch {
                    addr,
                    expected: "Root or Entry".into(),
                    actual: other.name().into(),
                })
            }
        }

        let uid = self.acquire(mgr, addr);
        self.cache.trim();
        Ok((addr, uid))
    }

    /// Creates a new entry page and records the hold.
    pub(crate) fn create_page(&mut self, mgr: ManagerId, subtype: u8) -> Result<(Addr, u64)> {
        if subtype > MAX_SUBTYPE {
            return Err(Error::SubtypeTooLarge {
                subtype,
                max: MAX_SUBTYPE,
            });
        }
        self.ensure_root()?;
        let addr = self.allocate()?;
        self.materialize(addr, PageKind::Entry(subtype));
        let uid = self.acquire(mgr, addr);
        self.cache.trim();
        trace!(addr, subtype, "entry page created");
        Ok((addr, uid))
    }

    /// Destroys a head page and its overflow chain. Deleting the root
    /// is a no-op.
    pub(crate) fn delete_page(&mut self, addr: Addr, subtype: Option<u8>) -> Result<()> {
        if addr == NIL {
            return Ok(());
        }
        if addr as u32 >= self.memory_pages {
            return Err(Error::InvalidAddress {
                addr,
                page_count: self.memory_pages,
            });
        }
        self.ensure_root()?;

        let next = match self.block(addr)?.kind() {
            PageKind::Entry(actual) => {
                if let Some(expected) = subtype {
                    if expected != actual {
                        return Err(Error::TypeMismatch {
                            addr,
                            expected: format!("Entry({})", expected),
                            actual: format!("Entry({})", actual),
                        });
                    }
                }
                self.block(addr)?.next()
            }
            PageKind::Empty => return Err(Error::EmptyPageOp { addr }),
            other => {
                return Err(Error::TypeMismatch {
                    addr,
                    expected: "Entry".into(),
                    actual: other.name().into(),
                })
            }
        };

        self.free_chain_from(next)?;
        self.clear_block(addr);
        self.free_give_back(addr)?;
        self.registry.remove(&addr);
        self.cache.trim();
        trace!(addr, "entry page deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Kind expectations shared by the free-list and overflow walkers.

    pub(crate) fn expect_data(&mut self, addr: Addr) -> Result<()> {
        match self.block(addr)?.kind() {
            PageKind::Data => Ok(()),
            PageKind::Empty => Err(Error::EmptyPageOp { addr }),
            other => Err(Error::corrupt(format!(
                "overflow chain reaches {} page {}",
                other.name(),
                addr
            ))),
        }
    }

    pub(crate) fn expect_freelist(&mut self, addr: Addr) -> Result<()> {
        match self.block(addr)?.kind() {
            PageKind::FreeList => Ok(()),
            other => Err(Error::corrupt(format!(
                "free-list chain reaches {} page {}",
                other.name(),
                addr
            ))),
        }
    }
}

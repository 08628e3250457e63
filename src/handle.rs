//! # Public Handles
//!
//! [`Store`] is the user-facing entry point; [`PageManager`] is a named
//! reference holder over logical pages; [`Page`] is the handle for one
//! logical page.
//!
//! All three are thin shells over the shared store core: each method
//! takes the store lock, runs one operation against
//! [`StoreInner`](crate::store::StoreInner), and trims the cache on the
//! way out. The store itself is one mutation domain; handles add no
//! finer-grained locking.
//!
//! ## Reference Holding
//!
//! A logical page stays registered while at least one manager holds it.
//! Dropping a [`Page`] releases its manager's hold; dropping a
//! [`PageManager`] releases everything it still holds. A handle whose
//! page was deleted, or whose manager released it, fails every
//! operation with [`Error::UseAfterRelease`].
//!
//! The store owns one implicit manager through which the `Store`-level
//! page methods operate.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::StoreOptions;
use crate::error::{Error, Result};
use crate::page::{Addr, PageKind, MAX_SUBTYPE};
use crate::store::{ManagerId, StoreInner};

/// A paged random-access store over a single host file.
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
    main: ManagerId,
}

impl Store {
    /// Opens a store with default options (4 KiB pages, 8 MiB cache,
    /// create when missing).
    pub fn open(path: impl AsRef<Path>) -> Result<Store> {
        Store::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Store> {
        let mut inner = StoreInner::open(path.as_ref(), &options)?;
        let main = inner.new_manager();
        Ok(Store {
            inner: Arc::new(RwLock::new(inner)),
            main,
        })
    }

    /// A named reference holder over this store's pages.
    pub fn manager(&self, name: impl Into<String>) -> PageManager {
        let id = self.inner.write().new_manager();
        PageManager {
            inner: Arc::clone(&self.inner),
            id,
            name: name.into(),
        }
    }

    /// The permanent root page, materializing it on a fresh file.
    pub fn root_page(&self) -> Result<Page> {
        open_page(&self.inner, self.main, 0, None)
    }

    /// Loads an existing root or entry page. With a subtype given, the
    /// page must carry it.
    pub fn page(&self, addr: Addr, subtype: Option<u8>) -> Result<Page> {
        open_page(&self.inner, self.main, addr, subtype)
    }

    /// Creates an entry page of the given subtype (0..=251).
    pub fn create_page(&self, subtype: u8) -> Result<Page> {
        create_page(&self.inner, self.main, subtype)
    }

    /// Destroys the head page at `addr` together with its overflow
    /// chain. A no-op for address 0.
    pub fn delete_page(&self, addr: Addr, subtype: Option<u8>) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner.delete_page(addr, subtype)
    }

    /// Writes every dirty block to the host file and trims the cache.
    pub fn save(&self) -> Result<()> {
        self.inner.write().save()
    }

    /// Flushes the host file's buffers to the device.
    pub fn sync(&self) -> Result<()> {
        self.inner.write().sync()
    }

    /// Releases the host file handle. Idempotent; every other
    /// operation afterwards fails with [`Error::Closed`].
    pub fn close(&self) {
        self.inner.write().close();
    }

    /// Bytes currently persisted in the host file.
    pub fn size(&self) -> Result<u64> {
        let inner = self.inner.read();
        inner.ensure_open()?;
        Ok(inner.size())
    }

    /// Bytes staged in dirty cache blocks, not yet saved.
    pub fn unsaved_size(&self) -> Result<u64> {
        let inner = self.inner.read();
        inner.ensure_open()?;
        Ok(inner.unsaved_size())
    }

    /// The in-memory page count, the authoritative view of the store.
    pub fn page_count(&self) -> Result<u32> {
        let inner = self.inner.read();
        inner.ensure_open()?;
        Ok(inner.page_count())
    }

    /// Addresses currently parked in the free-list.
    pub fn free_page_count(&self) -> Result<usize> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner.free_page_count()
    }

    /// One line per physically existing page.
    pub fn dump(&self) -> Result<Vec<String>> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner.dump()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let mut inner = self.inner.write();
        inner.release_all(self.main);
        inner.close();
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

/// A named reference holder. Multiple managers may hold the same page;
/// the page stays registered until every one of them releases it.
pub struct PageManager {
    inner: Arc<RwLock<StoreInner>>,
    id: ManagerId,
    name: String,
}

impl PageManager {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_page(&self) -> Result<Page> {
        open_page(&self.inner, self.id, 0, None)
    }

    pub fn page(&self, addr: Addr, subtype: Option<u8>) -> Result<Page> {
        open_page(&self.inner, self.id, addr, subtype)
    }

    pub fn create_page(&self, subtype: u8) -> Result<Page> {
        create_page(&self.inner, self.id, subtype)
    }

    pub fn delete_page(&self, addr: Addr, subtype: Option<u8>) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner.delete_page(addr, subtype)
    }

    /// Releases every hold this manager still has.
    pub fn release_all(&self) {
        self.inner.write().release_all(self.id);
    }
}

impl Drop for PageManager {
    fn drop(&mut self) {
        self.inner.write().release_all(self.id);
    }
}

impl std::fmt::Debug for PageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageManager")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn open_page(
    inner: &Arc<RwLock<StoreInner>>,
    mgr: ManagerId,
    addr: Addr,
    subtype: Option<u8>,
) -> Result<Page> {
    let (addr, uid) = {
        let mut guard = inner.write();
        guard.ensure_open()?;
        guard.open_page(mgr, addr, subtype)?
    };
    Ok(Page {
        inner: Arc::clone(inner),
        addr,
        mgr,
        uid,
    })
}

fn create_page(inner: &Arc<RwLock<StoreInner>>, mgr: ManagerId, subtype: u8) -> Result<Page> {
    let (addr, uid) = {
        let mut guard = inner.write();
        guard.ensure_open()?;
        guard.create_page(mgr, subtype)?
    };
    Ok(Page {
        inner: Arc::clone(inner),
        addr,
        mgr,
        uid,
    })
}

/// Handle for one logical page: a head page plus its overflow chain.
pub struct Page {
    inner: Arc<RwLock<StoreInner>>,
    addr: Addr,
    mgr: ManagerId,
    uid: u64,
}

impl Page {
    pub fn addr(&self) -> Addr {
        self.addr
    }

    pub fn is_root(&self) -> bool {
        self.addr == 0
    }

    fn with_inner<T>(&self, op: impl FnOnce(&mut StoreInner) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner.check_handle(self.mgr, self.addr, self.uid)?;
        let result = op(&mut inner);
        inner.trim_cache();
        result
    }

    /// Reads `len` bytes starting at `start`, or everything to the end
    /// of the chain with `len == None`.
    pub fn read(&self, start: usize, len: Option<usize>) -> Result<Vec<u8>> {
        self.with_inner(|inner| inner.chain_read(self.addr, start, len))
    }

    /// Writes `content` at byte `offset`, growing the chain as needed.
    pub fn write(&self, content: &[u8], offset: usize) -> Result<()> {
        self.with_inner(|inner| inner.chain_write(self.addr, content, offset, false))
    }

    /// Like [`Page::write`], then releases every chain page past the
    /// written range.
    pub fn write_and_cleanup(&self, content: &[u8], offset: usize) -> Result<()> {
        self.with_inner(|inner| inner.chain_write(self.addr, content, offset, true))
    }

    /// Releases every chain page past the one containing byte
    /// `offset`.
    pub fn cleanup_after(&self, offset: usize) -> Result<()> {
        self.with_inner(|inner| inner.chain_write(self.addr, &[], offset, true))
    }

    /// Current byte length of the logical page.
    pub fn byte_length(&self) -> Result<usize> {
        self.with_inner(|inner| inner.chain_byte_length(self.addr))
    }

    /// The entry subtype, or `None` for the root page.
    pub fn subtype(&self) -> Result<Option<u8>> {
        self.with_inner(|inner| {
            Ok(match inner.block(self.addr)?.kind() {
                PageKind::Entry(subtype) => Some(subtype),
                _ => None,
            })
        })
    }

    /// Changes the entry subtype in place. Fails on the root page.
    pub fn set_subtype(&self, subtype: u8) -> Result<()> {
        if subtype > MAX_SUBTYPE {
            return Err(Error::SubtypeTooLarge {
                subtype,
                max: MAX_SUBTYPE,
            });
        }
        self.with_inner(|inner| {
            let block = inner.block_mut(self.addr)?;
            match block.kind() {
                PageKind::Entry(_) => {
                    block.set_subtype(subtype);
                    Ok(())
                }
                other => Err(Error::TypeMismatch {
                    addr: self.addr,
                    expected: "Entry".into(),
                    actual: other.name().into(),
                }),
            }
        })
    }

    /// Destroys this page and its overflow chain. A no-op for the
    /// root.
    pub fn delete(self) -> Result<()> {
        self.with_inner(|inner| inner.delete_page(self.addr, None))
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.inner.write().release(self.mgr, self.addr, self.uid);
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("addr", &self.addr).finish()
    }
}

//! # pagestore - Paged Single-File Storage
//!
//! pagestore keeps arbitrarily sized logical pages inside one host
//! file. The file is split into fixed-size pages; each page carries a
//! one-byte kind tag (root, free-list, data, or an application entry
//! subtype) and a small big-endian header. A logical page that outgrows
//! its head page spills transparently across a linked chain of data
//! pages, and deleted pages are recycled through an on-disk free-list
//! so the file does not grow without bound.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pagestore::{Store, StoreOptions};
//!
//! # fn main() -> pagestore::Result<()> {
//! let store = Store::open_with("app.pgs", StoreOptions::new().page_size(4096))?;
//!
//! let page = store.create_page(0)?;
//! page.write(b"hello overflow world", 0)?;
//! let addr = page.addr();
//!
//! store.save()?;
//!
//! let again = store.page(addr, Some(0))?;
//! assert_eq!(again.read(0, Some(5))?, b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Store / PageManager / Page        │  handles, reference holding
//! ├─────────────────────────────────────┤
//! │   Overflow engine │ Free-list       │  chain walkers, recycling
//! ├─────────────────────────────────────┤
//! │   Allocator + page registry         │  address reuse, holder counts
//! ├─────────────────────────────────────┤
//! │   Block cache (LRU, dirty-gated)    │  address → page block
//! ├─────────────────────────────────────┤
//! │   Page codecs (zerocopy headers)    │  root / free-list / data / entry
//! ├─────────────────────────────────────┤
//! │   PagedFile (whole-page I/O)        │  host file binding
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Persistence Model
//!
//! Mutations land in the block cache; only [`Store::save`] writes to the
//! host file, in whole-page units. There is no journal and no fsync
//! policy. A crash between saves loses staged changes and is allowed
//! to leave the free-list inconsistent. Call [`Store::sync`] after
//! `save` when the application wants the file buffers flushed.
//!
//! ## Concurrency Model
//!
//! The store is a single mutation domain behind one lock; operations
//! are synchronous and strictly ordered per call. Handles may be moved
//! across threads, but the store never runs two operations at once.

mod block;
mod cache;
mod config;
mod dump;
mod error;
mod freelist;
mod handle;
mod io;
mod overflow;
mod page;
mod store;

pub use config::{StoreOptions, DEFAULT_CACHE_BYTES, DEFAULT_PAGE_SIZE};
pub use error::{Error, Result};
pub use handle::{Page, PageManager, Store};
pub use page::{Addr, PageKind, MAX_SUBTYPE, PAGE_SIZES};

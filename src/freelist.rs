//! # Free-List Management
//!
//! Released page addresses are parked in a chain of free-list pages
//! rooted at the root header's `freelistHead` field. Each node stores
//! `prev`/`next` links and an array of address slots; the chain grows
//! and shrinks only at its tail (the node whose `next` is 0).
//!
//! ## Pop (`free_take_one`)
//!
//! 1. No chain → `None`; the allocator extends the file instead.
//! 2. Tail has slots → pop the last one.
//! 3. Tail is an empty node → the node itself is the recycled page:
//!    unlink it (the surviving neighbor's `next` becomes 0, or the
//!    root's `freelistHead` if it was the only node), clear it to an
//!    Empty block, and hand out its address. This is the only place a
//!    free-list node is reclaimed.
//!
//! ## Push (`free_give_back`)
//!
//! 1. No chain → the released page itself becomes the first node.
//! 2. Tail full → the released page becomes a new tail node.
//! 3. Otherwise → append the address into the tail's slot array.
//!
//! The allocator never hands out an address still stored in a slot:
//! pop removes the slot before the address is reused, and push records
//! the address before the donor page is cleared.

use tracing::trace;

use crate::error::Result;
use crate::page::{Addr, PageKind, NIL};
use crate::store::StoreInner;

impl StoreInner {
    fn freelist_head(&mut self) -> Result<Addr> {
        self.ensure_root()?;
        Ok(self.block(0)?.freelist_head())
    }

    /// Walks `next` links from `head` to the terminal node.
    fn freelist_tail_from(&mut self, head: Addr) -> Result<Addr> {
        let mut addr = head;
        loop {
            self.expect_freelist(addr)?;
            let next = self.block(addr)?.next();
            if next == NIL {
                return Ok(addr);
            }
            addr = next;
        }
    }

    /// Pops one recycled address, or `None` when the free-list is
    /// empty.
    pub(crate) fn free_take_one(&mut self) -> Result<Option<Addr>> {
        let head = self.freelist_head()?;
        if head == NIL {
            return Ok(None);
        }

        let tail = self.freelist_tail_from(head)?;
        if self.block(tail)?.slot_count() > 0 {
            let addr = self.block_mut(tail)?.pop_slot();
            trace!(addr, node = tail, "popped free address");
            return Ok(Some(addr));
        }

        // The tail node holds no addresses; recycle the node itself.
        let prev = self.block(tail)?.prev();
        if prev == NIL {
            self.block_mut(0)?.set_freelist_head(NIL);
        } else {
            self.block_mut(prev)?.set_next(NIL);
        }
        self.clear_block(tail);
        trace!(addr = tail, "recycled free-list node");
        Ok(Some(tail))
    }

    /// Parks a released address in the free-list.
    pub(crate) fn free_give_back(&mut self, addr: Addr) -> Result<()> {
        let head = self.freelist_head()?;
        if head == NIL {
            self.materialize(addr, PageKind::FreeList);
            self.block_mut(0)?.set_freelist_head(addr);
            trace!(addr, "free-list chain started");
            return Ok(());
        }

        let tail = self.freelist_tail_from(head)?;
        let tail_full = {
            let block = self.block(tail)?;
            block.slot_count() >= block.slot_capacity()
        };

        if tail_full {
            self.materialize(addr, PageKind::FreeList);
            self.block_mut(addr)?.set_prev(tail);
            self.block_mut(tail)?.set_next(addr);
            trace!(addr, prev = tail, "free-list chain grown");
        } else {
            self.block_mut(tail)?.push_slot(addr);
            trace!(addr, node = tail, "parked free address");
        }
        Ok(())
    }

    /// Number of addresses currently parked across the chain.
    pub(crate) fn free_page_count(&mut self) -> Result<usize> {
        let mut count = 0;
        let mut addr = self.freelist_head()?;
        while addr != NIL {
            self.expect_freelist(addr)?;
            count += self.block(addr)?.slot_count();
            addr = self.block(addr)?.next();
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreOptions;
    use crate::page::freelist_capacity;
    use crate::store::StoreInner;
    use tempfile::tempdir;

    fn open_inner(dir: &tempfile::TempDir) -> StoreInner {
        let path = dir.path().join("test.pgs");
        StoreInner::open(&path, &StoreOptions::new().page_size(256)).unwrap()
    }

    #[test]
    fn take_one_on_empty_freelist_returns_none() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);

        assert_eq!(inner.free_take_one().unwrap(), None);
    }

    #[test]
    fn first_released_page_becomes_the_chain_node() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);

        let addr = inner.allocate().unwrap();
        inner.free_give_back(addr).unwrap();

        // The node itself holds no slot entries yet.
        assert_eq!(inner.free_page_count().unwrap(), 0);

        // Popping recycles the node and empties the chain.
        assert_eq!(inner.free_take_one().unwrap(), Some(addr));
        assert_eq!(inner.free_take_one().unwrap(), None);
    }

    #[test]
    fn released_addresses_come_back_in_lifo_order() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);

        let a = inner.allocate().unwrap();
        let b = inner.allocate().unwrap();
        let c = inner.allocate().unwrap();

        inner.free_give_back(a).unwrap();
        inner.free_give_back(b).unwrap();
        inner.free_give_back(c).unwrap();

        // `a` became the node; b and c are slot entries.
        assert_eq!(inner.free_page_count().unwrap(), 2);
        assert_eq!(inner.free_take_one().unwrap(), Some(c));
        assert_eq!(inner.free_take_one().unwrap(), Some(b));
        assert_eq!(inner.free_take_one().unwrap(), Some(a));
        assert_eq!(inner.free_take_one().unwrap(), None);
    }

    #[test]
    fn full_node_grows_the_chain_and_drains_back() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        let capacity = freelist_capacity(256);

        // One address for the node, `capacity` slot entries, and one
        // more to force a second node.
        let total = capacity + 2;
        let addrs: Vec<u16> = (0..total).map(|_| inner.allocate().unwrap()).collect();
        for &addr in &addrs {
            inner.free_give_back(addr).unwrap();
        }

        assert_eq!(inner.free_page_count().unwrap(), capacity);

        // Every address drains back out exactly once.
        let mut drained = Vec::new();
        while let Some(addr) = inner.free_take_one().unwrap() {
            drained.push(addr);
        }
        drained.sort_unstable();
        let mut expected = addrs.clone();
        expected.sort_unstable();
        assert_eq!(drained, expected);
    }

    #[test]
    fn no_address_is_handed_out_twice() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);

        let addrs: Vec<u16> = (0..10).map(|_| inner.allocate().unwrap()).collect();
        for &addr in &addrs {
            inner.free_give_back(addr).unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        while let Some(addr) = inner.free_take_one().unwrap() {
            assert!(seen.insert(addr), "address {} popped twice", addr);
        }
        assert_eq!(seen.len(), addrs.len());
    }
}

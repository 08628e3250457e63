//! # Page Blocks
//!
//! A [`Block`] owns the raw byte buffer of exactly one page together with
//! its decoded kind and a dirty flag. Blocks are constructed in one of
//! two modes:
//!
//! - **new** ([`Block::alloc`], [`Block::empty`]): a zeroed buffer with
//!   the kind byte stamped, born dirty;
//! - **loaded** ([`Block::from_disk`]): wraps bytes read from the host
//!   file, born clean.
//!
//! Every setter writes straight into the buffer and marks the block
//! dirty; getters are pure. The kind category is immutable; only the
//! entry subtype may change, via [`Block::set_subtype`].
//!
//! Accessors are kind-checked with assertions: calling a root accessor
//! on a data page is a programming error, not a runtime condition.

use zerocopy::FromBytes;

use crate::page::{
    content_len, freelist_capacity, Addr, FreeListHeader, LinkHeader, PageKind, RootHeader,
    KIND_ENTRY_BASE,
};

#[derive(Debug)]
pub struct Block {
    addr: Addr,
    kind: PageKind,
    dirty: bool,
    buf: Box<[u8]>,
}

impl Block {
    /// A freshly created page of `kind`: zeroed buffer, kind byte
    /// stamped, dirty.
    pub fn alloc(addr: Addr, kind: PageKind, page_size: usize) -> Self {
        let mut buf = vec![0u8; page_size].into_boxed_slice();
        buf[0] = kind.to_byte();
        Block {
            addr,
            kind,
            dirty: true,
            buf,
        }
    }

    /// A cleared page slot. Dirty so the zeroed state reaches disk on
    /// the next save.
    pub fn empty(addr: Addr, page_size: usize) -> Self {
        Block::alloc(addr, PageKind::Empty, page_size)
    }

    /// Wraps a page buffer read from the host file.
    pub fn from_disk(addr: Addr, buf: Box<[u8]>) -> Self {
        let kind = PageKind::from_byte(buf[0]);
        Block {
            addr,
            kind,
            dirty: false,
            buf,
        }
    }

    pub fn addr(&self) -> Addr {
        self.addr
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// The full page buffer, for writing to the host file.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Content bytes after the header.
    pub fn content(&self) -> &[u8] {
        &self.buf[self.kind.header_len()..]
    }

    /// Mutable content view. Marks the block dirty.
    pub fn content_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.buf[self.kind.header_len()..]
    }

    pub fn content_len(&self) -> usize {
        content_len(self.kind, self.buf.len())
    }

    // Header views. The slices are exact-size and the structs are
    // unaligned, so parsing cannot fail.

    fn root(&self) -> &RootHeader {
        debug_assert_eq!(self.kind, PageKind::Root);
        RootHeader::ref_from_bytes(&self.buf[1..1 + size_of::<RootHeader>()])
            .expect("root header slice") // INVARIANT: exact-size unaligned slice
    }

    fn root_mut(&mut self) -> &mut RootHeader {
        debug_assert_eq!(self.kind, PageKind::Root);
        self.dirty = true;
        RootHeader::mut_from_bytes(&mut self.buf[1..1 + size_of::<RootHeader>()])
            .expect("root header slice") // INVARIANT: exact-size unaligned slice
    }

    fn list(&self) -> &FreeListHeader {
        debug_assert_eq!(self.kind, PageKind::FreeList);
        FreeListHeader::ref_from_bytes(&self.buf[1..1 + size_of::<FreeListHeader>()])
            .expect("free-list header slice") // INVARIANT: exact-size unaligned slice
    }

    fn list_mut(&mut self) -> &mut FreeListHeader {
        debug_assert_eq!(self.kind, PageKind::FreeList);
        self.dirty = true;
        FreeListHeader::mut_from_bytes(&mut self.buf[1..1 + size_of::<FreeListHeader>()])
            .expect("free-list header slice") // INVARIANT: exact-size unaligned slice
    }

    fn link(&self) -> &LinkHeader {
        debug_assert!(matches!(self.kind, PageKind::Data | PageKind::Entry(_)));
        LinkHeader::ref_from_bytes(&self.buf[1..1 + size_of::<LinkHeader>()])
            .expect("link header slice") // INVARIANT: exact-size unaligned slice
    }

    fn link_mut(&mut self) -> &mut LinkHeader {
        debug_assert!(matches!(self.kind, PageKind::Data | PageKind::Entry(_)));
        self.dirty = true;
        LinkHeader::mut_from_bytes(&mut self.buf[1..1 + size_of::<LinkHeader>()])
            .expect("link header slice") // INVARIANT: exact-size unaligned slice
    }

    /// Next link: overflow successor for root/data/entry pages, chain
    /// successor for free-list pages.
    pub fn next(&self) -> Addr {
        match self.kind {
            PageKind::Root => self.root().next(),
            PageKind::FreeList => self.list().next(),
            PageKind::Data | PageKind::Entry(_) => self.link().next(),
            PageKind::Empty => unreachable!("empty page has no links"),
        }
    }

    pub fn set_next(&mut self, addr: Addr) {
        match self.kind {
            PageKind::Root => self.root_mut().set_next(addr),
            PageKind::FreeList => self.list_mut().set_next(addr),
            PageKind::Data | PageKind::Entry(_) => self.link_mut().set_next(addr),
            PageKind::Empty => unreachable!("empty page has no links"),
        }
    }

    /// Previous link for free-list, data, and entry pages.
    pub fn prev(&self) -> Addr {
        match self.kind {
            PageKind::FreeList => self.list().prev(),
            PageKind::Data | PageKind::Entry(_) => self.link().prev(),
            PageKind::Root | PageKind::Empty => unreachable!("page kind has no prev link"),
        }
    }

    pub fn set_prev(&mut self, addr: Addr) {
        match self.kind {
            PageKind::FreeList => self.list_mut().set_prev(addr),
            PageKind::Data | PageKind::Entry(_) => self.link_mut().set_prev(addr),
            PageKind::Root | PageKind::Empty => unreachable!("page kind has no prev link"),
        }
    }

    // Root accessors.

    pub fn stored_page_size(&self) -> u16 {
        self.root().page_size()
    }

    pub fn set_stored_page_size(&mut self, page_size: u16) {
        self.root_mut().set_page_size(page_size);
    }

    pub fn freelist_head(&self) -> Addr {
        self.root().freelist_head()
    }

    pub fn set_freelist_head(&mut self, addr: Addr) {
        self.root_mut().set_freelist_head(addr);
    }

    // Entry accessors.

    /// Changes the application subtype. The kind category stays Entry.
    pub fn set_subtype(&mut self, subtype: u8) {
        assert!(matches!(self.kind, PageKind::Entry(_)));
        self.kind = PageKind::Entry(subtype);
        self.buf[0] = KIND_ENTRY_BASE + subtype;
        self.dirty = true;
    }

    // Free-list slot accessors. Slots are big-endian u16 addresses laid
    // out right after the header.

    pub fn slot_count(&self) -> usize {
        self.list().count() as usize
    }

    pub fn slot_capacity(&self) -> usize {
        freelist_capacity(self.buf.len())
    }

    fn slot_offset(&self, index: usize) -> usize {
        self.kind.header_len() + index * 2
    }

    pub fn push_slot(&mut self, addr: Addr) {
        let count = self.slot_count();
        assert!(count < self.slot_capacity(), "free-list page overflow");
        let offset = self.slot_offset(count);
        self.buf[offset..offset + 2].copy_from_slice(&addr.to_be_bytes());
        self.list_mut().set_count(count as u16 + 1);
    }

    pub fn pop_slot(&mut self) -> Addr {
        let count = self.slot_count();
        assert!(count > 0, "free-list page underflow");
        let offset = self.slot_offset(count - 1);
        let addr = Addr::from_be_bytes([self.buf[offset], self.buf[offset + 1]]);
        self.list_mut().set_count(count as u16 - 1);
        addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_stamps_kind_byte_and_is_dirty() {
        let block = Block::alloc(5, PageKind::Entry(42), 256);
        assert_eq!(block.bytes()[0], 46);
        assert!(block.is_dirty());
        assert_eq!(block.kind(), PageKind::Entry(42));
        assert_eq!(block.content_len(), 251);
    }

    #[test]
    fn from_disk_decodes_kind_and_is_clean() {
        let mut buf = vec![0u8; 256].into_boxed_slice();
        buf[0] = 3;
        let block = Block::from_disk(9, buf);
        assert_eq!(block.kind(), PageKind::Data);
        assert!(!block.is_dirty());
    }

    #[test]
    fn setters_mark_dirty() {
        let mut buf = vec![0u8; 256].into_boxed_slice();
        buf[0] = 1;
        let mut block = Block::from_disk(0, buf);
        assert!(!block.is_dirty());

        block.set_freelist_head(7);
        assert!(block.is_dirty());
        assert_eq!(block.freelist_head(), 7);

        block.mark_clean();
        block.set_next(3);
        assert!(block.is_dirty());
        assert_eq!(block.next(), 3);
    }

    #[test]
    fn content_mut_marks_dirty() {
        let mut buf = vec![0u8; 256].into_boxed_slice();
        buf[0] = 3;
        let mut block = Block::from_disk(1, buf);

        block.content_mut()[0] = 0xFF;
        assert!(block.is_dirty());
        assert_eq!(block.content()[0], 0xFF);
        // Content starts right after the 5-byte data header.
        assert_eq!(block.bytes()[5], 0xFF);
    }

    #[test]
    fn root_header_lands_at_fixed_offsets() {
        let mut block = Block::alloc(0, PageKind::Root, 256);
        block.set_stored_page_size(256);
        block.set_freelist_head(2);
        block.set_next(1);

        assert_eq!(&block.bytes()[..7], &[1, 0x01, 0x00, 0x00, 0x02, 0x00, 0x01]);
    }

    #[test]
    fn freelist_slots_push_and_pop() {
        let mut block = Block::alloc(1, PageKind::FreeList, 256);
        assert_eq!(block.slot_capacity(), 124);
        assert_eq!(block.slot_count(), 0);

        block.push_slot(10);
        block.push_slot(11);
        assert_eq!(block.slot_count(), 2);

        assert_eq!(block.pop_slot(), 11);
        assert_eq!(block.pop_slot(), 10);
        assert_eq!(block.slot_count(), 0);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn pop_on_empty_freelist_page_panics() {
        let mut block = Block::alloc(1, PageKind::FreeList, 256);
        block.pop_slot();
    }

    #[test]
    fn subtype_change_keeps_entry_category() {
        let mut block = Block::alloc(3, PageKind::Entry(0), 256);
        block.mark_clean();
        block.set_subtype(99);

        assert_eq!(block.kind(), PageKind::Entry(99));
        assert_eq!(block.bytes()[0], 103);
        assert!(block.is_dirty());
    }
}

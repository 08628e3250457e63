//! # Block Cache
//!
//! An insertion-ordered map from page address to [`Block`], used as the
//! raw tier of the store's cache. Access moves a block to the
//! most-recently-used end; [`BlockCache::trim`] walks the map oldest to
//! newest and drops clean blocks until the soft limit is met.
//!
//! Dirty blocks are never evicted. When everything over the limit is
//! dirty the cache simply stays larger than configured until the next
//! save cleans it. Correctness beats the bound.

use hashlink::LinkedHashMap;
use tracing::trace;

use crate::block::Block;
use crate::page::Addr;

#[derive(Debug)]
pub struct BlockCache {
    blocks: LinkedHashMap<Addr, Block>,
    limit: usize,
}

impl BlockCache {
    pub fn new(limit: usize) -> Self {
        BlockCache {
            blocks: LinkedHashMap::new(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.blocks.contains_key(&addr)
    }

    /// Looks up a block and refreshes its LRU position.
    pub fn get(&mut self, addr: Addr) -> Option<&Block> {
        self.refresh(addr);
        self.blocks.get(&addr)
    }

    /// Mutable lookup; refreshes the LRU position.
    pub fn get_mut(&mut self, addr: Addr) -> Option<&mut Block> {
        self.refresh(addr);
        self.blocks.get_mut(&addr)
    }

    /// Lookup without touching the LRU order. Used by `save`, which
    /// must not reorder the walk it is iterating.
    pub fn peek(&self, addr: Addr) -> Option<&Block> {
        self.blocks.get(&addr)
    }

    pub fn peek_mut(&mut self, addr: Addr) -> Option<&mut Block> {
        self.blocks.get_mut(&addr)
    }

    /// Inserts or replaces the block at its address, at the
    /// most-recently-used end.
    pub fn insert(&mut self, block: Block) {
        let addr = block.addr();
        self.blocks.remove(&addr);
        self.blocks.insert(addr, block);
    }

    fn refresh(&mut self, addr: Addr) {
        if let Some(block) = self.blocks.remove(&addr) {
            self.blocks.insert(addr, block);
        }
    }

    /// Cached addresses, least-recently-used first.
    pub fn addrs_lru_first(&self) -> Vec<Addr> {
        self.blocks.keys().copied().collect()
    }

    pub fn dirty_count(&self) -> usize {
        self.blocks.values().filter(|b| b.is_dirty()).count()
    }

    /// Evicts clean blocks, oldest first, until the cache is back at
    /// its soft limit or no clean candidate remains. Returns the number
    /// of evicted blocks.
    pub fn trim(&mut self) -> usize {
        if self.blocks.len() <= self.limit {
            return 0;
        }

        let excess = self.blocks.len() - self.limit;
        let victims: Vec<Addr> = self
            .blocks
            .iter()
            .filter(|(_, block)| !block.is_dirty())
            .map(|(addr, _)| *addr)
            .take(excess)
            .collect();

        for addr in &victims {
            self.blocks.remove(addr);
        }
        if !victims.is_empty() {
            trace!(evicted = victims.len(), len = self.blocks.len(), "trimmed block cache");
        }
        victims.len()
    }
}

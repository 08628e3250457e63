//! Textual page-table dump, one line per physically existing page.
//!
//! Used by tests and debugging sessions to assert on the exact shape
//! of a store. Pages that were never created (a fresh file before the
//! root materializes) produce no line.

use crate::block::Block;
use crate::error::Result;
use crate::page::{Addr, PageKind};
use crate::store::StoreInner;

impl StoreInner {
    pub(crate) fn dump(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for addr in 0..self.page_count() {
            let addr = addr as Addr;
            if !self.has_block(addr) {
                continue;
            }
            let line = format_line(self.block(addr)?);
            lines.push(line);
        }
        self.trim_cache();
        Ok(lines)
    }
}

fn format_line(block: &Block) -> String {
    let addr = block.addr();
    match block.kind() {
        PageKind::Empty => format!("{:03}: Empty", addr),
        PageKind::Root => format!(
            "{:03}: Root [pageSize: {}, freelist: {}, nextPage: {}]",
            addr,
            block.stored_page_size(),
            block.freelist_head(),
            block.next()
        ),
        PageKind::FreeList => format!(
            "{:03}: Freelist [prevPage: {}, nextPage: {}, count: {}]",
            addr,
            block.prev(),
            block.next(),
            block.slot_count()
        ),
        PageKind::Data => format!(
            "{:03}: Data [prevPage: {}, nextPage: {}]",
            addr,
            block.prev(),
            block.next()
        ),
        PageKind::Entry(_) => format!(
            "{:03}: Entry({}) [prevPage: {}, nextPage: {}]",
            addr,
            block.bytes()[0],
            block.prev(),
            block.next()
        ),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreOptions;
    use crate::store::StoreInner;
    use tempfile::tempdir;

    fn open_inner(dir: &tempfile::TempDir) -> StoreInner {
        let path = dir.path().join("test.pgs");
        StoreInner::open(&path, &StoreOptions::new().page_size(256)).unwrap()
    }

    #[test]
    fn fresh_store_dumps_nothing() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);

        assert!(inner.dump().unwrap().is_empty());
    }

    #[test]
    fn materialized_root_dumps_one_line() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();

        assert_eq!(
            inner.dump().unwrap(),
            vec!["000: Root [pageSize: 256, freelist: 0, nextPage: 0]"]
        );
    }

    #[test]
    fn spilled_root_dumps_the_chain() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();
        inner.chain_write(0, &vec![0u8; 300], 0, false).unwrap();

        assert_eq!(
            inner.dump().unwrap(),
            vec![
                "000: Root [pageSize: 256, freelist: 0, nextPage: 1]",
                "001: Data [prevPage: 0, nextPage: 0]",
            ]
        );
    }
}

//! # Overflow Chains
//!
//! A logical page is the content of its head (root or entry) page
//! followed by the content of every data page reachable through `next`
//! links. The reader and the writer drive the same walker: a
//! `(skip, remaining)` pair advanced node by node.
//!
//! The writer grows the chain lazily: when it needs bytes beyond the
//! last node, it allocates a data page, links it (with the back-link
//! set at creation), and continues. With `cleanup` requested, the tail
//! of the chain beyond the last written node is released to the
//! free-list.
//!
//! The reader fails with `OutOfRange` when a requested range runs past
//! the end of the chain.

use tracing::trace;

use crate::error::{Error, Result};
use crate::page::{Addr, PageKind, NIL};
use crate::store::StoreInner;

impl StoreInner {
    /// Reads from the chain headed at `head`. With `len == None` the
    /// read extends to the end of the chain.
    pub(crate) fn chain_read(
        &mut self,
        head: Addr,
        start: usize,
        len: Option<usize>,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.unwrap_or(0));
        let mut addr = head;
        let mut skip = start;

        loop {
            let (content_len, next) = {
                let block = self.block(addr)?;
                (block.content_len(), block.next())
            };

            if skip >= content_len {
                skip -= content_len;
                if next == NIL {
                    return Err(Error::OutOfRange {
                        offset: start,
                        len: self.chain_byte_length(head)?,
                    });
                }
                self.expect_data(next)?;
                addr = next;
                continue;
            }

            let take = match len {
                Some(want) => (want - out.len()).min(content_len - skip),
                None => content_len - skip,
            };
            out.extend_from_slice(&self.block(addr)?.content()[skip..skip + take]);
            skip = 0;

            if let Some(want) = len {
                if out.len() == want {
                    return Ok(out);
                }
            }
            if next == NIL {
                return if len.is_some() {
                    Err(Error::OutOfRange {
                        offset: start,
                        len: self.chain_byte_length(head)?,
                    })
                } else {
                    Ok(out)
                };
            }
            self.expect_data(next)?;
            addr = next;
        }
    }

    /// Writes `content` into the chain headed at `head`, starting at
    /// byte `start`. Grows the chain as needed; with `cleanup` the
    /// remainder of the chain past the written range is released.
    pub(crate) fn chain_write(
        &mut self,
        head: Addr,
        content: &[u8],
        start: usize,
        cleanup: bool,
    ) -> Result<()> {
        let mut addr = head;
        let mut skip = start;
        let mut data = content;

        loop {
            let content_len = self.block(addr)?.content_len();

            if skip >= content_len {
                skip -= content_len;
                addr = self.next_or_grow(addr)?;
                continue;
            }

            let take = (content_len - skip).min(data.len());
            self.block_mut(addr)?.content_mut()[skip..skip + take]
                .copy_from_slice(&data[..take]);
            data = &data[take..];
            skip = 0;

            if data.is_empty() {
                if cleanup {
                    let next = self.block(addr)?.next();
                    if next != NIL {
                        self.free_chain_from(next)?;
                        self.block_mut(addr)?.set_next(NIL);
                    }
                }
                return Ok(());
            }
            addr = self.next_or_grow(addr)?;
        }
    }

    /// The chain successor of `addr`, allocating and linking a fresh
    /// data page when the chain ends here.
    fn next_or_grow(&mut self, addr: Addr) -> Result<Addr> {
        let next = self.block(addr)?.next();
        if next != NIL {
            self.expect_data(next)?;
            return Ok(next);
        }

        let fresh = self.allocate()?;
        self.materialize(fresh, PageKind::Data);
        self.block_mut(fresh)?.set_prev(addr);
        self.block_mut(addr)?.set_next(fresh);
        trace!(addr = fresh, prev = addr, "overflow chain grown");
        Ok(fresh)
    }

    /// Releases every data page reachable from `addr` to the
    /// free-list.
    pub(crate) fn free_chain_from(&mut self, addr: Addr) -> Result<()> {
        let mut addr = addr;
        while addr != NIL {
            self.expect_data(addr)?;
            let next = self.block(addr)?.next();
            self.clear_block(addr);
            self.free_give_back(addr)?;
            trace!(addr, "overflow page released");
            addr = next;
        }
        Ok(())
    }

    /// Total byte length of the chain headed at `head`: the head's
    /// content capacity plus that of every linked data page.
    pub(crate) fn chain_byte_length(&mut self, head: Addr) -> Result<usize> {
        let (mut len, mut addr) = {
            let block = self.block(head)?;
            (block.content_len(), block.next())
        };
        while addr != NIL {
            self.expect_data(addr)?;
            let block = self.block(addr)?;
            len += block.content_len();
            addr = block.next();
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreOptions;
    use crate::error::Error;
    use crate::store::StoreInner;
    use tempfile::tempdir;

    // Content capacities at page size 256: root 249, entry/data 251.

    fn open_inner(dir: &tempfile::TempDir) -> StoreInner {
        let path = dir.path().join("test.pgs");
        StoreInner::open(&path, &StoreOptions::new().page_size(256)).unwrap()
    }

    #[test]
    fn short_write_stays_on_the_head() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();

        inner.chain_write(0, &[255, 255, 255], 0, false).unwrap();

        assert_eq!(inner.chain_read(0, 0, Some(3)).unwrap(), vec![255, 255, 255]);
        assert_eq!(inner.chain_byte_length(0).unwrap(), 249);
        assert_eq!(inner.page_count(), 1);
    }

    #[test]
    fn long_write_spills_into_data_pages() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();

        let content = vec![7u8; 300];
        inner.chain_write(0, &content, 0, false).unwrap();

        assert_eq!(inner.page_count(), 2);
        assert_eq!(inner.chain_byte_length(0).unwrap(), 249 + 251);
        assert_eq!(inner.chain_read(0, 0, Some(300)).unwrap(), content);
    }

    #[test]
    fn offset_write_grows_intermediate_pages() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();

        let content = vec![9u8; 300];
        inner.chain_write(0, &content, 260, false).unwrap();

        // Bytes 260..560 need two data pages behind the 249-byte head.
        assert_eq!(inner.page_count(), 3);
        assert_eq!(inner.chain_read(0, 260, Some(300)).unwrap(), content);

        // The skipped range reads back as zeroes.
        assert_eq!(inner.chain_read(0, 0, Some(260)).unwrap(), vec![0u8; 260]);
    }

    #[test]
    fn read_past_end_is_out_of_range() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();

        let result = inner.chain_read(0, 0, Some(250));
        assert!(matches!(result, Err(Error::OutOfRange { .. })));

        let result = inner.chain_read(0, 300, None);
        assert!(matches!(result, Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn unbounded_read_returns_the_tail() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();

        inner.chain_write(0, &[1, 2, 3, 4, 5], 0, false).unwrap();

        let all = inner.chain_read(0, 0, None).unwrap();
        assert_eq!(all.len(), 249);
        assert_eq!(&all[..5], &[1, 2, 3, 4, 5]);

        let tail = inner.chain_read(0, 247, None).unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn cleanup_releases_the_chain_tail() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();

        // Three pages: head + two data pages.
        inner.chain_write(0, &vec![1u8; 600], 0, false).unwrap();
        assert_eq!(inner.page_count(), 3);
        assert_eq!(inner.chain_byte_length(0).unwrap(), 249 + 251 + 251);

        // Rewrite only the head range with cleanup: both data pages go
        // back to the free-list.
        inner.chain_write(0, &[2u8; 10], 0, true).unwrap();
        assert_eq!(inner.chain_byte_length(0).unwrap(), 249);
        assert_eq!(inner.free_page_count().unwrap() + 1, 2);

        // The freed pages are reused before the file grows again.
        inner.chain_write(0, &vec![3u8; 600], 0, false).unwrap();
        assert_eq!(inner.page_count(), 3);
    }

    #[test]
    fn write_at_offset_preserves_earlier_bytes() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();

        inner.chain_write(0, &[1, 2, 3, 4], 0, false).unwrap();
        inner.chain_write(0, &[9, 9], 2, false).unwrap();

        assert_eq!(inner.chain_read(0, 0, Some(4)).unwrap(), vec![1, 2, 9, 9]);
    }

    #[test]
    fn chains_are_doubly_linked() {
        let dir = tempdir().unwrap();
        let mut inner = open_inner(&dir);
        inner.ensure_root().unwrap();

        inner.chain_write(0, &vec![1u8; 600], 0, false).unwrap();

        let first = inner.block(0).unwrap().next();
        let second = inner.block(first).unwrap().next();
        assert_eq!(inner.block(first).unwrap().prev(), 0);
        assert_eq!(inner.block(second).unwrap().prev(), first);
        assert_eq!(inner.block(second).unwrap().next(), 0);
    }
}

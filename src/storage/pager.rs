//! # Pager
//!
//! The pager owns the database file and a fixed-capacity table of resident
//! page buffers. Pages are materialized on demand: the first access to a
//! page number either reads it back from disk or hands out a zeroed buffer
//! for pages past the end of the file. Nothing is written back before
//! [`Pager::close`], which flushes every resident page in order.
//!
//! Each slot holds its node behind `Arc<Mutex<_>>` so tree operations can
//! borrow several distinct pages at once during a split. The engine is
//! single-threaded; the mutex is an aliasing device, not a concurrency one,
//! and a contended `try_lock` is reported as a storage error.

use super::btree::{Node, NodeType, PAGE_SIZE};
use crate::errors::Error;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, trace};

/// Fixed capacity of the page table. Allocating past it fails the
/// statement rather than the process.
pub const TABLE_MAX_PAGES: usize = 100;

pub struct Pager {
    file: std::fs::File,
    file_length: u64,
    num_pages: u32,
    pages: heapless::Vec<Option<Arc<Mutex<Node>>>, TABLE_MAX_PAGES>,
}

impl Pager {
    /// Opens the database file read-write, creating it if absent.
    ///
    /// # Errors
    /// Fails with `Error::Storage` when the file length is not a whole
    /// number of pages; the file is considered corrupt.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_length = file.metadata()?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(err!(
                Storage,
                "Db file is not a whole number of pages. Corrupt file."
            ));
        }
        let num_pages = (file_length / PAGE_SIZE as u64) as u32;
        debug!(path = %path.display(), file_length, num_pages, "Opened database file");
        Ok(Pager {
            file,
            file_length,
            num_pages,
            pages: heapless::Vec::new(),
        })
    }

    /// Number of allocated pages: the highest allocated page number plus
    /// one, counting both on-disk and not-yet-flushed pages.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Ensures the page is resident, reading it from disk when it lies
    /// within the on-disk page range and zero-filling it otherwise.
    /// Advances `num_pages` past the materialized page.
    pub fn materialize(&mut self, page_num: u32) -> Result<(), Error> {
        if page_num as usize >= TABLE_MAX_PAGES {
            return Err(err!(
                Storage,
                "Tried to fetch page number out of bounds. {} >= {}",
                page_num,
                TABLE_MAX_PAGES
            ));
        }
        while self.pages.len() <= page_num as usize {
            if self.pages.push(None).is_err() {
                return Err(err!(Storage, "Page table overflow at page {}", page_num));
            }
        }
        if self.pages[page_num as usize].is_some() {
            return Ok(());
        }

        let mut node = Node::new();
        let mut pages_on_disk = (self.file_length / PAGE_SIZE as u64) as u32;
        // A trailing partial page still counts; short reads below tolerate it.
        if self.file_length % PAGE_SIZE as u64 != 0 {
            pages_on_disk += 1;
        }
        if page_num < pages_on_disk {
            self.file
                .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
            let mut filled = 0;
            while filled < PAGE_SIZE {
                let n = self.file.read(&mut node.data[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            trace!(page_num, bytes = filled, "Read page from disk");
        }

        self.pages[page_num as usize] = Some(Arc::new(Mutex::new(node)));
        if page_num + 1 > self.num_pages {
            self.num_pages = page_num + 1;
        }
        Ok(())
    }

    /// Locks and returns a resident page.
    ///
    /// # Errors
    /// Accessing a page that was never materialized is a programmer error
    /// and surfaces as `Error::Storage`.
    pub fn get(&self, page_num: u32) -> Result<MutexGuard<'_, Node>, Error> {
        let slot = self
            .pages
            .get(page_num as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| {
                err!(
                    Storage,
                    "Tried to access page {} before it was materialized.",
                    page_num
                )
            })?;
        slot.try_lock()
            .map_err(|_| err!(Storage, "Page {} is already borrowed.", page_num))
    }

    /// Materializes and locks a page in one step. Callers that need two
    /// pages at once materialize both first and use [`Pager::get`].
    pub fn page(&mut self, page_num: u32) -> Result<MutexGuard<'_, Node>, Error> {
        self.materialize(page_num)?;
        self.get(page_num)
    }

    /// Hands out the next unallocated page number. Freed pages are never
    /// recycled; there is no free list.
    pub fn get_unused_page_num(&mut self) -> Result<u32, Error> {
        if self.num_pages as usize >= TABLE_MAX_PAGES {
            return Err(Error::TableFull);
        }
        let page_num = self.num_pages;
        self.num_pages += 1;
        Ok(page_num)
    }

    /// Writes one full page back to its slot in the file.
    ///
    /// # Errors
    /// Flushing a non-resident page is a programmer error.
    pub fn flush(&mut self, page_num: u32) -> Result<(), Error> {
        let node = self
            .pages
            .get(page_num as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| err!(Storage, "Tried to flush a non-resident page {}.", page_num))?
            .try_lock()
            .map_err(|_| err!(Storage, "Page {} is already borrowed.", page_num))?;
        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&node.data)?;
        trace!(page_num, "Flushed page");
        Ok(())
    }

    /// Flushes every resident page and releases the buffers. The file
    /// handle closes when the pager drops.
    pub fn close(&mut self) -> Result<(), Error> {
        let mut flushed = 0;
        for page_num in 0..self.num_pages {
            let resident = self
                .pages
                .get(page_num as usize)
                .map_or(false, |slot| slot.is_some());
            if resident {
                self.flush(page_num)?;
                flushed += 1;
            }
        }
        self.file.flush()?;
        self.pages.clear();
        info!(flushed, "Closed pager");
        Ok(())
    }

    /// Maximum key of the subtree rooted at `page_num`: the last cell of a
    /// leaf (0 when empty), resolved through the right child chain for
    /// internal nodes.
    pub fn node_max_key(&mut self, page_num: u32) -> Result<u32, Error> {
        let mut current = page_num;
        loop {
            self.materialize(current)?;
            let node = self.get(current)?;
            match node.node_type()? {
                NodeType::Leaf => {
                    let num_cells = node.leaf_num_cells();
                    return if num_cells == 0 {
                        Ok(0)
                    } else {
                        node.leaf_key(num_cells as usize - 1)
                    };
                }
                NodeType::Internal => {
                    let right_child = node.internal_right_child();
                    if right_child == super::btree::INVALID_PAGE_NUM {
                        return Err(err!(
                            Storage,
                            "Internal node {} has no right child to take a max key from",
                            current
                        ));
                    }
                    drop(node);
                    current = right_child;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::btree::initialize_leaf_node;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_empty_file() {
        let temp = NamedTempFile::new().unwrap();
        let pager = Pager::open(temp.path()).unwrap();
        assert_eq!(pager.num_pages(), 0);
    }

    #[test]
    fn test_open_rejects_partial_page_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0u8; 100]).unwrap();
        temp.flush().unwrap();
        assert!(Pager::open(temp.path()).is_err());
    }

    #[test]
    fn test_materialize_advances_num_pages() {
        let temp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(temp.path()).unwrap();
        pager.materialize(2).unwrap();
        assert_eq!(pager.num_pages(), 3);
        pager.materialize(0).unwrap();
        assert_eq!(pager.num_pages(), 3);
    }

    #[test]
    fn test_materialize_out_of_bounds() {
        let temp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(temp.path()).unwrap();
        assert!(pager.materialize(TABLE_MAX_PAGES as u32).is_err());
    }

    #[test]
    fn test_get_requires_materialize() {
        let temp = NamedTempFile::new().unwrap();
        let pager = Pager::open(temp.path()).unwrap();
        assert!(pager.get(0).is_err());
    }

    #[test]
    fn test_get_unused_page_num_is_monotonic() {
        let temp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(temp.path()).unwrap();
        assert_eq!(pager.get_unused_page_num().unwrap(), 0);
        assert_eq!(pager.get_unused_page_num().unwrap(), 1);
        assert_eq!(pager.num_pages(), 2);
    }

    #[test]
    fn test_get_unused_page_num_table_full() {
        let temp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(temp.path()).unwrap();
        pager.materialize(TABLE_MAX_PAGES as u32 - 1).unwrap();
        assert!(matches!(
            pager.get_unused_page_num(),
            Err(Error::TableFull)
        ));
    }

    #[test]
    fn test_flush_non_resident_page() {
        let temp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(temp.path()).unwrap();
        assert!(pager.flush(0).is_err());
    }

    #[test]
    fn test_flush_and_reopen_round_trip() {
        let temp = NamedTempFile::new().unwrap();
        {
            let mut pager = Pager::open(temp.path()).unwrap();
            pager.materialize(0).unwrap();
            pager.materialize(1).unwrap();
            {
                let mut node = pager.get(1).unwrap();
                initialize_leaf_node(&mut node);
                node.set_leaf_num_cells(5);
            }
            pager.close().unwrap();
        }
        let mut pager = Pager::open(temp.path()).unwrap();
        assert_eq!(pager.num_pages(), 2);
        pager.materialize(1).unwrap();
        assert_eq!(pager.get(1).unwrap().leaf_num_cells(), 5);
    }
}

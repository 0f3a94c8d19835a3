//! Fixed-size paged storage: a [`Page`] is one `PAGESIZE` block with a
//! small item-count header; a [`PagedFile`] is an append-only, 0-indexed
//! sequence of pages backed by a single `std::fs::File`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Page size shared by every file in a relation.
pub const PAGESIZE: usize = 4096;

/// Bytes reserved at the front of every page for the item-count header.
const HEADER_SIZE: usize = 4;

/// 0-based, dense page identifier within a single paged file.
pub type PageId = u32;

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("page {page} does not exist (file has {npages} pages)")]
    NoSuchPage { page: PageId, npages: u32 },
    #[error("item slot {slot} of size {item_size} does not fit in a page (capacity {capacity} bytes)")]
    SlotOutOfBounds {
        slot: u32,
        item_size: usize,
        capacity: usize,
    },
    #[error("I/O error on paged file: {0}")]
    Io(#[from] std::io::Error),
}

/// One fixed-size block of storage: a 4-byte little-endian item count
/// followed by equal-sized item slots.
#[derive(Clone)]
pub struct Page {
    buf: [u8; PAGESIZE],
}

impl Page {
    /// A fresh, zeroed page (item count 0).
    pub fn zeroed() -> Self {
        Self {
            buf: [0u8; PAGESIZE],
        }
    }

    /// Number of bytes usable for item slots (`PAGESIZE` minus the header).
    pub const fn capacity() -> usize {
        PAGESIZE - HEADER_SIZE
    }

    /// How many whole items of `item_size` bytes fit on a page.
    pub fn items_per_page(item_size: usize) -> u32 {
        (Self::capacity() / item_size) as u32
    }

    /// Current item count, read from the header.
    pub fn item_count(&self) -> u32 {
        u32::from_le_bytes(self.buf[0..HEADER_SIZE].try_into().unwrap())
    }

    fn set_item_count(&mut self, count: u32) {
        self.buf[0..HEADER_SIZE].copy_from_slice(&count.to_le_bytes());
    }

    /// Bumps the item count by one.
    pub fn add_one_item(&mut self) {
        self.set_item_count(self.item_count() + 1);
    }

    /// Byte offset of item slot `slot`, each `item_size` bytes wide.
    fn addr(slot: u32, item_size: usize) -> Result<usize, PageError> {
        let offset = HEADER_SIZE + slot as usize * item_size;
        if offset + item_size > PAGESIZE {
            return Err(PageError::SlotOutOfBounds {
                slot,
                item_size,
                capacity: Self::capacity(),
            });
        }
        Ok(offset)
    }

    /// Reads the `item_size`-byte item at `slot`.
    pub fn get_item(&self, slot: u32, item_size: usize) -> Result<&[u8], PageError> {
        let offset = Self::addr(slot, item_size)?;
        Ok(&self.buf[offset..offset + item_size])
    }

    /// Overwrites the `item_size`-byte item at `slot`. Does not touch the
    /// item count; callers that are appending a new item call
    /// [`Page::add_one_item`] separately.
    pub fn put_item(&mut self, slot: u32, item_size: usize, data: &[u8]) -> Result<(), PageError> {
        let offset = Self::addr(slot, item_size)?;
        if data.len() != item_size {
            return Err(PageError::SlotOutOfBounds {
                slot,
                item_size,
                capacity: Self::capacity(),
            });
        }
        self.buf[offset..offset + item_size].copy_from_slice(data);
        Ok(())
    }
}

/// An append-only sequence of [`Page`]s backed by one file, indexed by a
/// monotonically increasing [`PageId`].
pub struct PagedFile {
    file: File,
    npages: u32,
}

impl PagedFile {
    /// Opens (creating if absent) the paged file at `path`. `existing`
    /// pages are those already on disk, counted from the file's current
    /// length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        let npages = (len / PAGESIZE as u64) as u32;
        Ok(Self { file, npages })
    }

    /// Number of pages currently in the file.
    pub fn npages(&self) -> u32 {
        self.npages
    }

    /// Appends a zeroed page and returns its id.
    pub fn add_page(&mut self) -> Result<PageId, PageError> {
        let id = self.npages;
        self.file.seek(SeekFrom::Start(id as u64 * PAGESIZE as u64))?;
        self.file.write_all(&Page::zeroed().buf)?;
        self.npages += 1;
        Ok(id)
    }

    /// Reads page `id`.
    pub fn get_page(&mut self, id: PageId) -> Result<Page, PageError> {
        if id >= self.npages {
            return Err(PageError::NoSuchPage {
                page: id,
                npages: self.npages,
            });
        }
        let mut page = Page::zeroed();
        self.file.seek(SeekFrom::Start(id as u64 * PAGESIZE as u64))?;
        self.file.read_exact(&mut page.buf)?;
        Ok(page)
    }

    /// Writes `page` back at `id`.
    pub fn put_page(&mut self, id: PageId, page: &Page) -> Result<(), PageError> {
        if id >= self.npages {
            return Err(PageError::NoSuchPage {
                page: id,
                npages: self.npages,
            });
        }
        self.file.seek(SeekFrom::Start(id as u64 * PAGESIZE as u64))?;
        self.file.write_all(&page.buf)?;
        Ok(())
    }

    /// Appends a new page and returns it along with its id. Callers use
    /// this only once they've established the current last page is full;
    /// this method never checks that itself, it always appends.
    pub fn get_new_last_page(&mut self) -> Result<(PageId, Page), PageError> {
        let id = self.add_page()?;
        Ok((id, Page::zeroed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_per_page_matches_capacity() {
        assert_eq!(Page::items_per_page(64), (Page::capacity() / 64) as u32);
    }

    #[test]
    fn item_roundtrip() {
        let mut page = Page::zeroed();
        assert_eq!(page.item_count(), 0);
        page.put_item(0, 8, b"abcdefgh").unwrap();
        page.add_one_item();
        assert_eq!(page.item_count(), 1);
        assert_eq!(page.get_item(0, 8).unwrap(), b"abcdefgh");
    }

    #[test]
    fn slot_out_of_bounds_is_rejected() {
        let page = Page::zeroed();
        let item_size = 16;
        let max_slot = Page::items_per_page(item_size);
        assert!(page.get_item(max_slot, item_size).is_err());
    }

    #[test]
    fn paged_file_add_get_put_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pages");
        let mut pf = PagedFile::open(&path).unwrap();
        assert_eq!(pf.npages(), 0);

        let id = pf.add_page().unwrap();
        assert_eq!(id, 0);
        assert_eq!(pf.npages(), 1);

        let mut page = pf.get_page(id).unwrap();
        page.put_item(0, 4, b"hiya").unwrap();
        page.add_one_item();
        pf.put_page(id, &page).unwrap();

        let reread = pf.get_page(id).unwrap();
        assert_eq!(reread.item_count(), 1);
        assert_eq!(reread.get_item(0, 4).unwrap(), b"hiya");
    }

    #[test]
    fn reopen_sees_existing_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pages");
        {
            let mut pf = PagedFile::open(&path).unwrap();
            pf.add_page().unwrap();
            pf.add_page().unwrap();
        }
        let pf = PagedFile::open(&path).unwrap();
        assert_eq!(pf.npages(), 2);
    }

    #[test]
    fn get_page_out_of_range_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pages");
        let mut pf = PagedFile::open(&path).unwrap();
        assert!(pf.get_page(0).is_err());
    }
}

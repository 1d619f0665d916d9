use std::collections::HashMap;

use super::frame::FrameId;
use crate::error::{Error, Result};

pub type PageNumber = usize;

/// One entry per page that has ever been touched. Entries are created
/// lazily on first touch and never removed; invalidation clears `valid`
/// so the access statistics survive eviction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageEntry {
    /// Whether the page is currently resident.
    pub valid: bool,
    /// Soft bit, set on each recorded access.
    pub referenced: bool,
    /// Dirty bit, set by writes, cleared on eviction.
    pub modified: bool,
    /// Resident frame, meaningful only while `valid`.
    pub frame: Option<FrameId>,
    pub access_count: u64,
    pub last_access_tick: u64,
}

/// Mapping from page number to page entry. Guarded by the VMM's
/// exclusive lock; mutation fails with OutOfRange for page numbers
/// outside [0, total_pages).
pub struct PageTable {
    pages: HashMap<PageNumber, PageEntry>,
    total_pages: usize,
}

impl PageTable {
    pub fn new(total_pages: usize) -> PageTable {
        PageTable { pages: HashMap::new(), total_pages }
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    fn check(&self, page: PageNumber) -> Result<()> {
        if page >= self.total_pages {
            return Err(Error::OutOfRange { page, total_pages: self.total_pages });
        }
        Ok(())
    }

    fn entry(&mut self, page: PageNumber) -> Result<&mut PageEntry> {
        self.check(page)?;
        Ok(self.pages.entry(page).or_default())
    }

    pub fn get(&self, page: PageNumber) -> Option<&PageEntry> {
        self.pages.get(&page)
    }

    pub fn is_valid(&self, page: PageNumber) -> bool {
        self.pages.get(&page).map_or(false, |entry| entry.valid)
    }

    pub fn is_modified(&self, page: PageNumber) -> bool {
        self.pages.get(&page).map_or(false, |entry| entry.modified)
    }

    /// Resident frame of `page`, None when the page is not resident.
    pub fn frame_of(&self, page: PageNumber) -> Option<FrameId> {
        self.pages.get(&page).filter(|entry| entry.valid).and_then(|entry| entry.frame)
    }

    pub fn set_valid(&mut self, page: PageNumber, valid: bool) -> Result<()> {
        let entry = self.entry(page)?;
        entry.valid = valid;
        if !valid {
            // an invalid page must not name a frame
            entry.frame = None;
        }
        Ok(())
    }

    pub fn set_frame(&mut self, page: PageNumber, frame: FrameId) -> Result<()> {
        self.entry(page)?.frame = Some(frame);
        Ok(())
    }

    pub fn set_modified(&mut self, page: PageNumber, modified: bool) -> Result<()> {
        self.entry(page)?.modified = modified;
        Ok(())
    }

    /// Composite access bookkeeping: sets `referenced`, bumps the access
    /// count and stamps the logical tick in one step.
    pub fn record_access(&mut self, page: PageNumber, tick: u64) -> Result<()> {
        let entry = self.entry(page)?;
        entry.referenced = true;
        entry.access_count += 1;
        entry.last_access_tick = tick;
        Ok(())
    }

    /// Snapshot of currently resident page numbers, ascending.
    pub fn valid_pages(&self) -> Vec<PageNumber> {
        let mut pages: Vec<PageNumber> =
            self.pages.iter().filter(|(_, entry)| entry.valid).map(|(&page, _)| page).collect();
        pages.sort_unstable();
        pages
    }

    pub fn valid_page_count(&self) -> usize {
        self.pages.values().filter(|entry| entry.valid).count()
    }
}

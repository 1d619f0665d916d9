use super::page_table::PageNumber;

pub type FrameId = usize;

/// A physical frame slot. `resident_page` is None while the slot is
/// empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameSlot {
    pub occupied: bool,
    pub resident_page: Option<PageNumber>,
    pub dirty: bool,
}

/// Fixed-size array of physical frames, the only bounded resource in
/// the simulator. No resizing, no fragmentation: allocation always
/// takes the lowest free index.
#[derive(Debug)]
pub struct FrameArray {
    frames: Vec<FrameSlot>,
}

impl FrameArray {
    pub fn new(total_frames: usize) -> FrameArray {
        FrameArray { frames: vec![FrameSlot::default(); total_frames] }
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn get(&self, frame: FrameId) -> Option<&FrameSlot> {
        self.frames.get(frame)
    }

    pub fn get_mut(&mut self, frame: FrameId) -> Option<&mut FrameSlot> {
        self.frames.get_mut(frame)
    }

    pub fn is_occupied(&self, frame: FrameId) -> bool {
        self.frames.get(frame).map_or(false, |slot| slot.occupied)
    }

    /// Lowest-indexed unoccupied frame, None when the array is full.
    pub fn find_free(&self) -> Option<FrameId> {
        self.frames.iter().position(|slot| !slot.occupied)
    }

    /// Claim the lowest free frame: marked occupied, no resident page,
    /// clean.
    pub fn allocate(&mut self) -> Option<FrameId> {
        let frame = self.find_free()?;
        self.frames[frame] = FrameSlot { occupied: true, resident_page: None, dirty: false };
        Some(frame)
    }

    pub fn deallocate(&mut self, frame: FrameId) {
        if let Some(slot) = self.frames.get_mut(frame) {
            *slot = FrameSlot::default();
        }
    }

    pub fn used_count(&self) -> usize {
        self.frames.iter().filter(|slot| slot.occupied).count()
    }

    pub fn free_count(&self) -> usize {
        self.capacity() - self.used_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameId, &FrameSlot)> {
        self.frames.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_lowest_first() {
        let mut frames = FrameArray::new(3);
        assert_eq!(Some(0), frames.allocate());
        assert_eq!(Some(1), frames.allocate());
        assert_eq!(Some(2), frames.allocate());
        assert_eq!(None, frames.allocate());
        assert_eq!(None, frames.find_free());
        assert_eq!(3, frames.used_count());

        frames.deallocate(1);
        assert_eq!(Some(1), frames.find_free());
        assert_eq!(Some(1), frames.allocate());
    }

    #[test]
    fn test_allocate_resets_slot() {
        let mut frames = FrameArray::new(1);
        let frame = frames.allocate().expect("free frame");
        {
            let slot = frames.get_mut(frame).expect("slot");
            slot.resident_page = Some(7);
            slot.dirty = true;
        }
        frames.deallocate(frame);
        let frame = frames.allocate().expect("free frame");
        let slot = frames.get(frame).expect("slot");
        assert!(slot.occupied);
        assert_eq!(None, slot.resident_page);
        assert!(!slot.dirty);
    }

    #[test]
    fn test_counts() {
        let mut frames = FrameArray::new(4);
        assert_eq!(4, frames.free_count());
        frames.allocate();
        frames.allocate();
        assert_eq!(2, frames.used_count());
        assert_eq!(2, frames.free_count());
        assert_eq!(4, frames.capacity());
    }
}

use std::collections::HashSet;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::frame::{FrameArray, FrameId};
use super::page_table::PageTable;
use crate::error::{Error, Result};

/// Selector for the active replacement algorithm.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Policy {
    Fifo,
    Lru,
    Clock,
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Policy> {
        match s.to_ascii_uppercase().as_str() {
            "FIFO" => Ok(Policy::Fifo),
            "LRU" => Ok(Policy::Lru),
            "CLOCK" => Ok(Policy::Clock),
            other => Err(Error::config(format!("unknown replacement policy {}", other))),
        }
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::Fifo => write!(f, "FIFO"),
            Policy::Lru => write!(f, "LRU"),
            Policy::Clock => write!(f, "CLOCK"),
        }
    }
}

/// Victim-selection contract shared by all replacement algorithms. The
/// policy only bookkeeps frame usage; residency itself lives in the
/// page table and the frame array.
pub trait ReplacementPolicy: Send {
    /// Pick the frame to evict. Returns None iff no frame is occupied.
    fn select_victim(&mut self, frames: &FrameArray, pages: &PageTable) -> Option<FrameId>;

    /// Record that a page was installed into or accessed through
    /// `frame`.
    fn record_access(&mut self, frame: FrameId);

    /// Record that `frame` lost its resident page.
    fn record_eviction(&mut self, frame: FrameId);

    fn name(&self) -> &'static str;
}

/// FIFO evicts the frame whose page was installed first. Frames are
/// enqueued on first install only; re-accessing a resident frame is a
/// no-op.
pub struct Fifo {
    queue: VecDeque<FrameId>,
    queued: HashSet<FrameId>,
}

impl Fifo {
    pub fn new() -> Fifo {
        Fifo { queue: VecDeque::new(), queued: HashSet::new() }
    }
}

impl Default for Fifo {
    fn default() -> Self {
        Fifo::new()
    }
}

impl ReplacementPolicy for Fifo {
    fn select_victim(&mut self, frames: &FrameArray, _pages: &PageTable) -> Option<FrameId> {
        // Entries for frames that were freed outside of an eviction are
        // discarded lazily here. The victim itself is popped so that the
        // replacing install re-enqueues the frame at the back.
        while let Some(frame) = self.queue.pop_front() {
            self.queued.remove(&frame);
            if frames.is_occupied(frame) {
                return Some(frame);
            }
        }
        // Prefetch installs never pass through record_access, so the
        // queue can under-cover the frame array. Fall back to the lowest
        // occupied frame rather than reporting no victim.
        frames.iter().find(|(_, slot)| slot.occupied).map(|(frame, _)| frame)
    }

    fn record_access(&mut self, frame: FrameId) {
        if self.queued.insert(frame) {
            self.queue.push_back(frame);
        }
    }

    fn record_eviction(&mut self, _frame: FrameId) {}

    fn name(&self) -> &'static str {
        "FIFO"
    }
}

/// LRU keeps one logical clock and the tick of each frame's last
/// access. Victim selection scans every occupied frame, O(F) per
/// decision.
pub struct Lru {
    ticks: Vec<u64>,
    clock: u64,
}

impl Lru {
    pub fn new(total_frames: usize) -> Lru {
        Lru { ticks: vec![0; total_frames], clock: 0 }
    }
}

impl ReplacementPolicy for Lru {
    fn select_victim(&mut self, frames: &FrameArray, _pages: &PageTable) -> Option<FrameId> {
        let mut victim: Option<(FrameId, u64)> = None;
        for (frame, slot) in frames.iter() {
            if !slot.occupied {
                continue;
            }
            let tick = self.ticks.get(frame).copied().unwrap_or(0);
            // strict comparison keeps the lowest index on ties
            let better = match victim {
                None => true,
                Some((_, best)) => tick < best,
            };
            if better {
                victim = Some((frame, tick));
            }
        }
        victim.map(|(frame, _)| frame)
    }

    fn record_access(&mut self, frame: FrameId) {
        if let Some(tick) = self.ticks.get_mut(frame) {
            *tick = self.clock;
            self.clock += 1;
        }
    }

    fn record_eviction(&mut self, _frame: FrameId) {}

    fn name(&self) -> &'static str {
        "LRU"
    }
}

/// CLOCK approximates LRU with one reference bit per frame and a
/// wrap-around hand. The sweep clears set bits as it passes, so after
/// at most two full rotations an occupied frame with a clear bit
/// exists.
pub struct Clock {
    bits: Vec<bool>,
    hand: usize,
}

impl Clock {
    pub fn new(total_frames: usize) -> Clock {
        Clock { bits: vec![false; total_frames], hand: 0 }
    }
}

impl ReplacementPolicy for Clock {
    fn select_victim(&mut self, frames: &FrameArray, _pages: &PageTable) -> Option<FrameId> {
        let len = self.bits.len();
        if len == 0 {
            return None;
        }
        for _ in 0..2 * len {
            let frame = self.hand;
            self.hand = (self.hand + 1) % len;
            if !frames.is_occupied(frame) {
                continue;
            }
            if self.bits[frame] {
                self.bits[frame] = false;
            } else {
                return Some(frame);
            }
        }
        None
    }

    fn record_access(&mut self, frame: FrameId) {
        if let Some(bit) = self.bits.get_mut(frame) {
            *bit = true;
        }
    }

    fn record_eviction(&mut self, frame: FrameId) {
        if let Some(bit) = self.bits.get_mut(frame) {
            *bit = false;
        }
    }

    fn name(&self) -> &'static str {
        "CLOCK"
    }
}

/// Owns the active replacement algorithm. `set_policy` swaps the
/// algorithm and discards whatever bookkeeping the previous one had
/// accumulated.
pub struct ReplacementManager {
    total_frames: usize,
    policy: Policy,
    algorithm: Box<dyn ReplacementPolicy>,
}

impl ReplacementManager {
    pub fn new(policy: Policy, total_frames: usize) -> ReplacementManager {
        let algorithm = Self::build(policy, total_frames);
        ReplacementManager { total_frames, policy, algorithm }
    }

    fn build(policy: Policy, total_frames: usize) -> Box<dyn ReplacementPolicy> {
        match policy {
            Policy::Fifo => Box::new(Fifo::new()),
            Policy::Lru => Box::new(Lru::new(total_frames)),
            Policy::Clock => Box::new(Clock::new(total_frames)),
        }
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
        self.algorithm = Self::build(policy, self.total_frames);
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn select_victim(&mut self, frames: &FrameArray, pages: &PageTable) -> Option<FrameId> {
        self.algorithm.select_victim(frames, pages)
    }

    pub fn record_access(&mut self, frame: FrameId) {
        self.algorithm.record_access(frame)
    }

    pub fn record_eviction(&mut self, frame: FrameId) {
        self.algorithm.record_eviction(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied(frames: &mut FrameArray, count: usize) {
        for _ in 0..count {
            frames.allocate();
        }
    }

    #[test]
    fn test_policy_parse() -> Result<()> {
        assert_eq!(Policy::Fifo, "fifo".parse()?);
        assert_eq!(Policy::Lru, "LRU".parse()?);
        assert_eq!(Policy::Clock, "Clock".parse()?);
        assert!("nru".parse::<Policy>().is_err());
        Ok(())
    }

    #[test]
    fn test_fifo_order() {
        let mut fifo = Fifo::new();
        let mut frames = FrameArray::new(3);
        let pages = PageTable::new(8);
        occupied(&mut frames, 3);

        // install order 1, 0, 2
        fifo.record_access(1);
        fifo.record_access(0);
        fifo.record_access(2);
        // hits do not change the order
        fifo.record_access(1);
        fifo.record_access(0);

        assert_eq!(Some(1), fifo.select_victim(&frames, &pages));
        // the evicted frame is reused right away, as the access loop does
        fifo.record_access(1);
        assert_eq!(Some(0), fifo.select_victim(&frames, &pages));
        fifo.record_access(0);
        assert_eq!(Some(2), fifo.select_victim(&frames, &pages));
    }

    #[test]
    fn test_fifo_skips_stale_entries() {
        let mut fifo = Fifo::new();
        let mut frames = FrameArray::new(3);
        let pages = PageTable::new(8);
        occupied(&mut frames, 3);

        fifo.record_access(0);
        fifo.record_access(1);
        fifo.record_access(2);
        // frame 0 was freed outside of an eviction
        frames.deallocate(0);
        assert_eq!(Some(1), fifo.select_victim(&frames, &pages));
    }

    #[test]
    fn test_fifo_covers_unqueued_frames() {
        let mut fifo = Fifo::new();
        let mut frames = FrameArray::new(2);
        let pages = PageTable::new(8);
        occupied(&mut frames, 2);

        // nothing was ever enqueued (prefetch-only installs); a victim
        // must still come out of a full frame array
        assert_eq!(Some(0), fifo.select_victim(&frames, &pages));
    }

    #[test]
    fn test_fifo_empty() {
        let mut fifo = Fifo::new();
        let frames = FrameArray::new(3);
        let pages = PageTable::new(8);
        assert_eq!(None, fifo.select_victim(&frames, &pages));
    }

    #[test]
    fn test_lru_minimum_tick() {
        let mut lru = Lru::new(3);
        let mut frames = FrameArray::new(3);
        let pages = PageTable::new(8);
        occupied(&mut frames, 3);

        lru.record_access(0);
        lru.record_access(1);
        lru.record_access(2);
        lru.record_access(0);
        assert_eq!(Some(1), lru.select_victim(&frames, &pages));

        lru.record_access(1);
        assert_eq!(Some(2), lru.select_victim(&frames, &pages));
    }

    #[test]
    fn test_lru_tie_breaks_lowest_index() {
        let mut lru = Lru::new(4);
        let mut frames = FrameArray::new(4);
        let pages = PageTable::new(8);
        occupied(&mut frames, 4);

        // frames 2 and 3 never accessed, both at tick 0
        lru.record_access(0);
        lru.record_access(1);
        assert_eq!(Some(2), lru.select_victim(&frames, &pages));
    }

    #[test]
    fn test_clock_sweep() {
        let mut clock = Clock::new(3);
        let mut frames = FrameArray::new(3);
        let pages = PageTable::new(8);
        occupied(&mut frames, 3);

        clock.record_access(0);
        clock.record_access(1);
        clock.record_access(2);
        // first sweep starts at frame 0, clears every bit, second pass
        // takes frame 0
        assert_eq!(Some(0), clock.select_victim(&frames, &pages));
        // the hand advanced past the victim; bit of 1 and 2 are clear now
        assert_eq!(Some(1), clock.select_victim(&frames, &pages));

        clock.record_access(2);
        // 2 is referenced, hand wraps to 0
        assert_eq!(Some(0), clock.select_victim(&frames, &pages));
    }

    #[test]
    fn test_clock_eviction_clears_bit() {
        let mut clock = Clock::new(2);
        let mut frames = FrameArray::new(2);
        let pages = PageTable::new(8);
        occupied(&mut frames, 2);

        clock.record_access(0);
        clock.record_access(1);
        clock.record_eviction(0);
        assert_eq!(Some(0), clock.select_victim(&frames, &pages));
    }

    #[test]
    fn test_clock_no_occupied_frames() {
        let mut clock = Clock::new(4);
        let frames = FrameArray::new(4);
        let pages = PageTable::new(8);
        assert_eq!(None, clock.select_victim(&frames, &pages));
    }

    #[test]
    fn test_manager_set_policy_discards_state() {
        let mut manager = ReplacementManager::new(Policy::Fifo, 3);
        let mut frames = FrameArray::new(3);
        let pages = PageTable::new(8);
        occupied(&mut frames, 3);

        manager.record_access(2);
        manager.record_access(0);
        manager.record_access(1);
        assert_eq!("FIFO", manager.name());
        assert_eq!(Some(2), manager.select_victim(&frames, &pages));

        manager.set_policy(Policy::Clock);
        assert_eq!("CLOCK", manager.name());
        assert_eq!(Policy::Clock, manager.policy());
        // fresh clock state: all bits clear, hand at frame 0
        assert_eq!(Some(0), manager.select_victim(&frames, &pages));
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::config::VmmConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind, EventSender};

use self::frame::{FrameArray, FrameId, FrameSlot};
use self::metrics::{Metrics, MetricsSnapshot};
use self::page_table::{PageEntry, PageNumber, PageTable};
use self::predictor::{Predictor, RulePredictor};
use self::replacement::{Policy, ReplacementManager};

pub mod frame;
pub mod metrics;
pub mod page_table;
pub mod predictor;
pub mod replacement;

/// Upper bound of the recent-access window fed to the predictor.
pub const RECENT_ACCESS_WINDOW: usize = 100;

/// Upper bound of outstanding predictions kept for hit attribution.
pub const RECENT_PREDICTIONS_CAP: usize = 50;

/// Minimum window length before the predictor is consulted.
const PREDICTION_MIN_WINDOW: usize = 3;

/// Mutable simulator state, guarded by the single exclusive lock in
/// `Vmm`. Nothing in here suspends; event emission is a non-blocking
/// channel send, so emission order matches access order.
struct VmmState {
    config: VmmConfig,
    page_table: PageTable,
    frames: FrameArray,
    replacement: ReplacementManager,
    predictor: Box<dyn Predictor>,
    /// Last up-to-100 accessed pages, oldest first.
    recent_accesses: VecDeque<PageNumber>,
    /// Predicted pages not yet attributed, oldest first.
    recent_predictions: VecDeque<PageNumber>,
    running: bool,
}

impl VmmState {
    fn new(config: VmmConfig) -> VmmState {
        let page_table = PageTable::new(config.total_pages);
        let frames = FrameArray::new(config.total_frames);
        let replacement = ReplacementManager::new(config.replacement_policy, config.total_frames);
        let predictor: Box<dyn Predictor> = Box::new(RulePredictor::new(config.total_pages));
        VmmState {
            config,
            page_table,
            frames,
            replacement,
            predictor,
            recent_accesses: VecDeque::new(),
            recent_predictions: VecDeque::new(),
            running: false,
        }
    }

    /// Rebuild the page table, frame array and replacement policy from
    /// scratch. Metrics are owned by the wrapper and survive.
    fn apply_config(&mut self, config: VmmConfig) {
        self.page_table = PageTable::new(config.total_pages);
        self.frames = FrameArray::new(config.total_frames);
        self.replacement = ReplacementManager::new(config.replacement_policy, config.total_frames);
        self.predictor = Box::new(RulePredictor::new(config.total_pages));
        self.recent_accesses.clear();
        self.recent_predictions.clear();
        self.config = config;
    }

    /// Service one access. Returns false only when the simulation is
    /// not running; every other outcome, fault or error included,
    /// counts as serviced.
    fn access(
        &mut self,
        metrics: &Metrics,
        events: &EventSender,
        page: PageNumber,
        is_write: bool,
    ) -> Result<bool> {
        if !self.running {
            return Ok(false);
        }
        if page >= self.config.total_pages {
            // the offending access is skipped, not fatal
            let err = Error::OutOfRange { page, total_pages: self.config.total_pages };
            events.emit(Event::new(EventKind::Error, err.to_string()));
            return Ok(true);
        }

        let tick = metrics.record_access();
        self.push_recent(page);

        // Prefetching happens before the residency test of the current
        // page.
        if self.config.enable_ai_predictions && self.recent_accesses.len() >= PREDICTION_MIN_WINDOW
        {
            self.prefetch(metrics, events, page)?;
        }

        if let Some(frame) = self.page_table.frame_of(page) {
            self.page_table.record_access(page, tick)?;
            self.replacement.record_access(frame);
            self.attribute_hit(metrics, events, page);
            if is_write {
                self.page_table.set_modified(page, true)?;
                if let Some(slot) = self.frames.get_mut(frame) {
                    slot.dirty = true;
                }
            }
            events.emit(Event::new(
                EventKind::Access,
                format!("Page {} ({})", page, if is_write { "write" } else { "read" }),
            ));
            return Ok(true);
        }

        metrics.record_fault();
        events.emit(Event::new(EventKind::Fault, format!("Page fault for page {}", page)));

        let frame = match self.frames.allocate() {
            Some(frame) => frame,
            None => match self.replacement.select_victim(&self.frames, &self.page_table) {
                Some(frame) => {
                    self.evict(metrics, events, frame)?;
                    frame
                }
                None => {
                    events.emit(Event::new(EventKind::Error, Error::NoVictim.to_string()));
                    return Ok(true);
                }
            },
        };
        self.install(metrics, events, page, frame, is_write, tick)?;
        Ok(true)
    }

    fn evict(&mut self, metrics: &Metrics, events: &EventSender, frame: FrameId) -> Result<()> {
        let victim = self.frames.get(frame).and_then(|slot| slot.resident_page);
        if let Some(victim) = victim {
            self.page_table.set_valid(victim, false)?;
            self.page_table.set_modified(victim, false)?;
            let dirty = self.frames.get(frame).map_or(false, |slot| slot.dirty);
            if dirty {
                metrics.record_swap_out();
                events.emit(Event::new(
                    EventKind::SwapOut,
                    format!("Swapped out page {} from frame {}", victim, frame),
                ));
            }
            events.emit(Event::new(
                EventKind::Evict,
                format!("Evicted page {} from frame {}", victim, frame),
            ));
        }
        if let Some(slot) = self.frames.get_mut(frame) {
            slot.resident_page = None;
            slot.dirty = false;
        }
        self.replacement.record_eviction(frame);
        Ok(())
    }

    fn install(
        &mut self,
        metrics: &Metrics,
        events: &EventSender,
        page: PageNumber,
        frame: FrameId,
        is_write: bool,
        tick: u64,
    ) -> Result<()> {
        metrics.record_swap_in();
        events.emit(Event::new(
            EventKind::SwapIn,
            format!("Swapped in page {} to frame {}", page, frame),
        ));
        if let Some(slot) = self.frames.get_mut(frame) {
            slot.occupied = true;
            slot.resident_page = Some(page);
            slot.dirty = is_write;
        }
        self.page_table.set_valid(page, true)?;
        self.page_table.set_frame(page, frame)?;
        self.page_table.set_modified(page, is_write)?;
        self.page_table.record_access(page, tick)?;
        self.replacement.record_access(frame);
        Ok(())
    }

    /// Credit a predicted page exactly once, at the moment its access
    /// turns into a residency hit.
    fn attribute_hit(&mut self, metrics: &Metrics, events: &EventSender, page: PageNumber) {
        if let Some(pos) = self.recent_predictions.iter().position(|&predicted| predicted == page)
        {
            self.recent_predictions.remove(pos);
            metrics.record_ai_hit();
            events.emit(Event::new(
                EventKind::Ai,
                format!("AI HIT: page {} was correctly predicted", page),
            ));
        }
    }

    fn prefetch(
        &mut self,
        metrics: &Metrics,
        events: &EventSender,
        current: PageNumber,
    ) -> Result<()> {
        let window: Vec<PageNumber> = self.recent_accesses.iter().copied().collect();
        let prediction = match self.predictor.predict(&window) {
            Ok(prediction) => prediction,
            Err(err) => {
                // no predictions this access, confidence is reset and no
                // metric moves
                metrics.set_ai_confidence(0.0);
                debug!("predictor unavailable: {}", err);
                return Ok(());
            }
        };
        if prediction.pages.is_empty() {
            return Ok(());
        }

        metrics.record_prediction();
        metrics.set_ai_confidence(prediction.confidence);
        for &page in &prediction.pages {
            self.recent_predictions.push_back(page);
        }
        while self.recent_predictions.len() > RECENT_PREDICTIONS_CAP {
            self.recent_predictions.pop_front();
        }
        let listed =
            prediction.pages.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ");
        events.emit(Event::with_data(
            EventKind::Ai,
            format!(
                "Generated {} predictions (confidence: {:.2})",
                prediction.pages.len(),
                prediction.confidence
            ),
            format!("Predicted {{{}}}", listed),
        ));

        for page in prediction.pages {
            // predictions outside the address range are ignored, and
            // prefetching the page being accessed is pointless
            if page == current || page >= self.config.total_pages {
                continue;
            }
            if self.page_table.frame_of(page).is_some() {
                continue;
            }
            // prefetches only ever take free frames, they never evict
            let frame = match self.frames.allocate() {
                Some(frame) => frame,
                None => continue,
            };
            metrics.record_swap_in();
            if let Some(slot) = self.frames.get_mut(frame) {
                slot.resident_page = Some(page);
            }
            self.page_table.set_valid(page, true)?;
            self.page_table.set_frame(page, frame)?;
            events.emit(Event::new(
                EventKind::Ai,
                format!("Prefetched page {} into frame {}", page, frame),
            ));
        }
        Ok(())
    }

    fn push_recent(&mut self, page: PageNumber) {
        self.recent_accesses.push_back(page);
        while self.recent_accesses.len() > RECENT_ACCESS_WINDOW {
            self.recent_accesses.pop_front();
        }
    }
}

/// Handle to the virtual memory manager. All state mutation happens
/// under one exclusive lock; the counters are atomics so metric
/// snapshots never take the lock. Cloning shares the same manager.
#[derive(Clone)]
pub struct Vmm {
    state: Arc<Mutex<VmmState>>,
    metrics: Arc<Metrics>,
    events: EventSender,
}

impl Vmm {
    pub fn new(config: VmmConfig, events: EventSender) -> Result<Vmm> {
        config.validate()?;
        Ok(Vmm {
            state: Arc::new(Mutex::new(VmmState::new(config))),
            metrics: Arc::new(Metrics::new()),
            events,
        })
    }

    /// Service one access. Returns false only when the simulation is
    /// not running.
    pub fn access(&self, page: PageNumber, is_write: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.access(&self.metrics, &self.events, page, is_write) {
            Ok(serviced) => serviced,
            Err(err) => {
                self.events.emit(Event::new(EventKind::Error, err.to_string()));
                true
            }
        }
    }

    pub fn start_simulation(&self) {
        let mut state = self.state.lock().unwrap();
        state.running = true;
        self.events.emit(Event::new(EventKind::Simulation, "Simulation started"));
    }

    pub fn stop_simulation(&self) {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        self.events.emit(Event::new(EventKind::Simulation, "Simulation stopped"));
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Apply a new configuration atomically with respect to the access
    /// service: validation happens first and an invalid configuration
    /// changes nothing. Metrics are not reset.
    pub fn set_config(&self, config: VmmConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.state.lock()?;
        state.apply_config(config);
        Ok(())
    }

    pub fn config(&self) -> VmmConfig {
        self.state.lock().unwrap().config.clone()
    }

    /// Swap the active replacement policy, discarding its predecessor's
    /// bookkeeping.
    pub fn set_policy(&self, policy: Policy) -> Result<()> {
        let mut state = self.state.lock()?;
        state.replacement.set_policy(policy);
        Ok(())
    }

    /// Plug a different predictor, e.g. an adapter for a remote learned
    /// service. The built-in rule predictor is installed by default.
    pub fn set_predictor(&self, predictor: Box<dyn Predictor>) {
        self.state.lock().unwrap().predictor = predictor;
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn free_frames(&self) -> usize {
        self.state.lock().unwrap().frames.free_count()
    }

    pub fn used_frames(&self) -> usize {
        self.state.lock().unwrap().frames.used_count()
    }

    pub fn valid_pages(&self) -> Vec<PageNumber> {
        self.state.lock().unwrap().page_table.valid_pages()
    }

    pub fn recent_accesses(&self) -> Vec<PageNumber> {
        self.state.lock().unwrap().recent_accesses.iter().copied().collect()
    }

    pub fn page_entry(&self, page: PageNumber) -> Option<PageEntry> {
        self.state.lock().unwrap().page_table.get(page).cloned()
    }

    pub fn frame_slots(&self) -> Vec<FrameSlot> {
        self.state.lock().unwrap().frames.iter().map(|(_, slot)| slot.clone()).collect()
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }
}

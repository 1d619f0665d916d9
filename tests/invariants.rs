//! Property tests for the bookkeeping invariants that must hold
//! between accesses, whatever the policy and trace.

use proptest::prelude::*;
use tokio::sync::broadcast::error::TryRecvError;
use vmsim::config::VmmConfig;
use vmsim::event::{EventKind, EventSender};
use vmsim::vmm::replacement::Policy;
use vmsim::vmm::Vmm;

fn policy_strategy() -> impl Strategy<Value = Policy> {
    prop_oneof![Just(Policy::Fifo), Just(Policy::Lru), Just(Policy::Clock)]
}

proptest! {
    #[test]
    fn bookkeeping_invariants_hold(
        policy in policy_strategy(),
        total_frames in 1usize..8,
        enable_ai in any::<bool>(),
        accesses in proptest::collection::vec((0usize..16, any::<bool>()), 1..80),
    ) {
        let config = VmmConfig {
            total_frames,
            page_size: 4096,
            total_pages: 16,
            replacement_policy: policy,
            enable_ai_predictions: enable_ai,
        };
        let vmm = Vmm::new(config, EventSender::new()).unwrap();
        let mut rx = vmm.events().subscribe();
        vmm.start_simulation();
        for &(page, write) in &accesses {
            prop_assert!(vmm.access(page, write));
        }

        let snapshot = vmm.snapshot();
        let used = vmm.used_frames();
        let free = vmm.free_frames();
        let valid = vmm.valid_pages();
        let slots = vmm.frame_slots();

        // frame accounting
        prop_assert_eq!(total_frames, used + free);
        prop_assert_eq!(used, valid.len());

        // residency is a bijection between occupied frames and valid
        // pages, and the dirty bits agree on both sides
        let mut resident: Vec<usize> = Vec::new();
        for (frame, slot) in slots.iter().enumerate() {
            if !slot.occupied {
                prop_assert_eq!(None, slot.resident_page);
                continue;
            }
            let page = slot.resident_page.expect("occupied frame names a page");
            resident.push(page);
            let entry = vmm.page_entry(page).expect("resident page has an entry");
            prop_assert!(entry.valid);
            prop_assert_eq!(Some(frame), entry.frame);
            prop_assert_eq!(slot.dirty, entry.modified);
        }
        resident.sort_unstable();
        let mut deduped = resident.clone();
        deduped.dedup();
        prop_assert_eq!(&deduped, &resident, "no two frames share a page");
        prop_assert_eq!(resident, valid);

        // counter sanity
        prop_assert!(snapshot.page_faults <= snapshot.total_accesses);
        prop_assert_eq!(snapshot.total_accesses, accesses.len() as u64);
        prop_assert!(snapshot.ai_hits <= snapshot.ai_predictions);
        if !enable_ai {
            prop_assert_eq!(0, snapshot.ai_predictions);
            prop_assert_eq!(0, snapshot.ai_hits);
        }

        // installs minus evictions equals the frames in use
        let mut evictions: u64 = 0;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    if event.kind == EventKind::Evict {
                        evictions += 1;
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        prop_assert_eq!(snapshot.swap_ins - evictions, used as u64);
    }

    #[test]
    fn dirty_evictions_match_swap_outs(
        policy in policy_strategy(),
        accesses in proptest::collection::vec((0usize..8, any::<bool>()), 1..60),
    ) {
        let config = VmmConfig {
            total_frames: 2,
            page_size: 4096,
            total_pages: 8,
            replacement_policy: policy,
            enable_ai_predictions: false,
        };
        let vmm = Vmm::new(config, EventSender::new()).unwrap();
        let mut rx = vmm.events().subscribe();
        vmm.start_simulation();
        for &(page, write) in &accesses {
            prop_assert!(vmm.access(page, write));
        }

        // every SWAP_OUT is immediately followed by its EVICT
        let mut kinds = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => kinds.push(event.kind),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        let swap_outs = kinds.iter().filter(|&&k| k == EventKind::SwapOut).count() as u64;
        prop_assert_eq!(vmm.snapshot().swap_outs, swap_outs);
        for window in kinds.windows(2) {
            if window[0] == EventKind::SwapOut {
                prop_assert_eq!(EventKind::Evict, window[1]);
            }
        }
    }
}

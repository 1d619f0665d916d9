use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{Config, VmmConfig};
use crate::error::Result;
use crate::event::{Event, EventKind, EventSender};
use crate::vmm::metrics::MetricsSnapshot;
use crate::vmm::Vmm;
use crate::workload::{WorkloadConfig, WorkloadGenerator, WorkloadType};

/// Ties the workload generator to the VMM: applies start requests,
/// owns the producer task that paces accesses and restarts the
/// workload when it completes.
pub struct Simulator {
    vmm: Vmm,
    workload: Arc<Mutex<WorkloadGenerator>>,
    base: Config,
    events: EventSender,
    producer_running: Arc<AtomicBool>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl Simulator {
    pub fn new(config: Config) -> Result<Simulator> {
        let events = EventSender::new();
        let vmm = Vmm::new(config.vmm.clone(), events.clone())?;
        let workload = WorkloadGenerator::new(config.workload.clone())?;
        Ok(Simulator {
            vmm,
            workload: Arc::new(Mutex::new(workload)),
            base: config,
            events,
            producer_running: Arc::new(AtomicBool::new(false)),
            producer: Mutex::new(None),
        })
    }

    pub fn vmm(&self) -> &Vmm {
        &self.vmm
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Apply a start request and (re)start the producer task. The
    /// request is validated before anything changes, so an invalid one
    /// leaves the running simulation untouched.
    pub fn start(&self, enable_ai: bool, workload_type: WorkloadType) -> Result<()> {
        let vmm_config = VmmConfig { enable_ai_predictions: enable_ai, ..self.base.vmm.clone() };
        let workload_config = WorkloadConfig { workload_type, ..self.base.workload.clone() };
        let generator = WorkloadGenerator::new(workload_config)?;

        self.halt_producer();
        self.vmm.set_config(vmm_config)?;
        *self.workload.lock().unwrap() = generator;
        self.vmm.start_simulation();
        self.spawn_producer();
        info!(
            "simulation started: {} workload, ai predictions {}",
            workload_type,
            if enable_ai { "on" } else { "off" }
        );
        Ok(())
    }

    /// Halt the workload and the VMM. An in-flight access completes.
    pub fn stop(&self) {
        self.halt_producer();
        self.vmm.stop_simulation();
        info!("simulation stopped");
    }

    pub fn metrics(&self) -> (MetricsSnapshot, usize, usize) {
        (self.vmm.snapshot(), self.vmm.free_frames(), self.vmm.used_frames())
    }

    fn halt_producer(&self) {
        self.producer_running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.producer.lock().unwrap().take() {
            // cancellation lands on the pacing sleep, never inside an
            // access
            handle.abort();
        }
    }

    fn spawn_producer(&self) {
        let vmm = self.vmm.clone();
        let workload = Arc::clone(&self.workload);
        let events = self.events.clone();
        let running = Arc::clone(&self.producer_running);
        let tick = Duration::from_millis(self.base.tick_ms);
        running.store(true, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            loop {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                let next = workload.lock().unwrap().next_access();
                match next {
                    Some(access) => {
                        if !vmm.access(access.page, access.write) {
                            debug!("vmm stopped accepting accesses, producer exiting");
                            break;
                        }
                    }
                    None => {
                        events.emit(Event::new(
                            EventKind::Simulation,
                            "Workload completed, restarting",
                        ));
                        workload.lock().unwrap().reset();
                        continue;
                    }
                }
                tokio::time::sleep(tick).await;
            }
        });
        *self.producer.lock().unwrap() = Some(handle);
    }
}

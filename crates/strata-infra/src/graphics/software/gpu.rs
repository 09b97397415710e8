// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The software GPU: one in-order queue, a memory budget and fault injection.
//!
//! Drivers hand work to the queue as jobs. In [`CompletionMode::Immediate`] a job runs
//! as soon as it is queued; in [`CompletionMode::Manual`] it waits until the test
//! calls [`SoftwareGpu::advance`] or [`SoftwareGpu::complete_all`], which makes the
//! GPU arbitrarily slow from the device's point of view.

use crate::graphics::common::DriverError;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// When queued work executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Work executes while it is submitted.
    #[default]
    Immediate,
    /// Work executes only when the owner advances the queue.
    Manual,
}

/// Configuration of a [`SoftwareGpu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareConfig {
    pub completion: CompletionMode,
    /// Bytes of memory the GPU can hand out.
    pub memory_budget: u64,
}

impl Default for SoftwareConfig {
    fn default() -> Self {
        Self {
            completion: CompletionMode::Immediate,
            memory_budget: 256 * 1024 * 1024,
        }
    }
}

impl SoftwareConfig {
    /// The default configuration with manual completion.
    pub fn manual() -> Self {
        Self {
            completion: CompletionMode::Manual,
            ..Self::default()
        }
    }
}

type Job = Box<dyn FnOnce() -> Result<(), DriverError> + Send>;

struct Queued {
    seq: u64,
    label: String,
    job: Job,
}

struct GpuShared {
    config: SoftwareConfig,
    sender: flume::Sender<Queued>,
    receiver: flume::Receiver<Queued>,
    /// The last sequence number handed out. Held while queuing so numbers follow
    /// queue order.
    last_queued: Mutex<u64>,
    /// Held while jobs execute, so they run one at a time and in order.
    executing: Mutex<()>,
    executed: AtomicU64,
    progress: Mutex<()>,
    progressed: Condvar,
    lost: AtomicBool,
    fault_next: AtomicBool,
    allocated: AtomicU64,
}

/// A CPU stand-in for a GPU, shared by the software drivers.
///
/// The handle is cheap to clone; clones share the GPU.
#[derive(Clone)]
pub struct SoftwareGpu {
    shared: Arc<GpuShared>,
}

impl fmt::Debug for SoftwareGpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareGpu")
            .field("config", &self.shared.config)
            .field("executed", &self.shared.executed)
            .field("pending", &self.shared.receiver.len())
            .field("lost", &self.shared.lost)
            .field("allocated", &self.shared.allocated)
            .finish()
    }
}

impl SoftwareGpu {
    pub fn new(config: SoftwareConfig) -> Self {
        let (sender, receiver) = flume::unbounded();
        log::info!(
            "software GPU: {:?} completion, {} byte budget",
            config.completion,
            config.memory_budget
        );
        Self {
            shared: Arc::new(GpuShared {
                config,
                sender,
                receiver,
                last_queued: Mutex::new(0),
                executing: Mutex::new(()),
                executed: AtomicU64::new(0),
                progress: Mutex::new(()),
                progressed: Condvar::new(),
                lost: AtomicBool::new(false),
                fault_next: AtomicBool::new(false),
                allocated: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SoftwareConfig {
        &self.shared.config
    }

    /// Fails with [`DriverError::DeviceLost`] once the GPU is lost.
    pub fn check_alive(&self) -> Result<(), DriverError> {
        if self.is_lost() {
            Err(DriverError::DeviceLost)
        } else {
            Ok(())
        }
    }

    pub fn is_lost(&self) -> bool {
        self.shared.lost.load(Ordering::Acquire)
    }

    // --- Queue ---

    /// Queues `job` behind everything queued before.
    /// ## Returns
    /// The sequence number of the job. It has executed once
    /// [`executed`](Self::executed) reaches it.
    pub(crate) fn enqueue(
        &self,
        label: impl Into<String>,
        job: impl FnOnce() -> Result<(), DriverError> + Send + 'static,
    ) -> Result<u64, DriverError> {
        self.check_alive()?;
        let label = label.into();
        let seq = {
            let mut last = self.shared.last_queued.lock();
            let seq = *last + 1;
            let job: Job = if self.shared.fault_next.swap(false, Ordering::AcqRel) {
                log::warn!("software GPU: faulting job #{} ({})", seq, label);
                Box::new(|| Err(DriverError::DeviceLost))
            } else {
                Box::new(job)
            };
            self.shared
                .sender
                .send(Queued { seq, label, job })
                .map_err(|_| DriverError::DeviceLost)?;
            *last = seq;
            seq
        };
        if self.shared.config.completion == CompletionMode::Immediate {
            self.run(usize::MAX);
            self.check_alive()?;
        }
        Ok(seq)
    }

    fn run(&self, limit: usize) -> usize {
        let _executing = self.shared.executing.lock();
        let mut ran = 0;
        while ran < limit {
            let Ok(queued) = self.shared.receiver.try_recv() else {
                break;
            };
            // Work queued behind a hang never executes.
            if !self.is_lost() {
                match (queued.job)() {
                    Ok(()) => log::trace!("software GPU: executed #{} ({})", queued.seq, queued.label),
                    Err(e) => {
                        log::error!(
                            "software GPU: job #{} ({}) failed: {}",
                            queued.seq,
                            queued.label,
                            e
                        );
                        self.shared.lost.store(true, Ordering::Release);
                    }
                }
            }
            self.shared.executed.store(queued.seq, Ordering::Release);
            ran += 1;
            self.notify();
        }
        ran
    }

    fn notify(&self) {
        let _progress = self.shared.progress.lock();
        self.shared.progressed.notify_all();
    }

    /// Executes up to `count` queued jobs.
    /// ## Returns
    /// The number of jobs executed.
    pub fn advance(&self, count: usize) -> usize {
        self.run(count)
    }

    /// Executes every queued job.
    pub fn complete_all(&self) -> usize {
        self.run(usize::MAX)
    }

    /// Number of queued jobs that have not executed.
    pub fn pending(&self) -> usize {
        self.shared.receiver.len()
    }

    /// The sequence number of the last executed job.
    pub fn executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Acquire)
    }

    /// Blocks until `done` returns `true`, re-checking whenever a job executed.
    /// ## Returns
    /// `false` if `timeout` elapsed first.
    /// ## Errors
    /// [`DriverError::DeviceLost`] if the GPU is lost while waiting.
    pub fn wait_until(
        &self,
        timeout: Duration,
        mut done: impl FnMut() -> bool,
    ) -> Result<bool, DriverError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut progress = self.shared.progress.lock();
        loop {
            self.check_alive()?;
            if done() {
                return Ok(true);
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .progressed
                        .wait_until(&mut progress, deadline)
                        .timed_out()
                    {
                        self.check_alive()?;
                        return Ok(done());
                    }
                }
                None => self.shared.progressed.wait(&mut progress),
            }
        }
    }

    // --- Memory ---

    /// Takes `bytes` out of the budget.
    pub(crate) fn allocate(&self, bytes: u64) -> Result<(), DriverError> {
        let budget = self.shared.config.memory_budget;
        self.shared
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= budget)
            })
            .map(|_| ())
            .map_err(|used| {
                log::warn!(
                    "software GPU: {} bytes requested with {} of {} in use",
                    bytes,
                    used,
                    budget
                );
                DriverError::OutOfMemory { requested: bytes }
            })
    }

    /// Returns `bytes` to the budget.
    pub(crate) fn free(&self, bytes: u64) {
        let _ = self
            .shared
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    /// Bytes currently allocated.
    pub fn allocated_bytes(&self) -> u64 {
        self.shared.allocated.load(Ordering::Acquire)
    }

    // --- Fault injection ---

    /// Loses the device now. Every further driver call fails with
    /// [`DriverError::DeviceLost`] and queued work is dropped.
    pub fn inject_device_lost(&self) {
        log::warn!("software GPU: device lost injected");
        self.shared.lost.store(true, Ordering::Release);
        self.notify();
    }

    /// Makes the next queued job hang the GPU when it executes, losing the device.
    pub fn fault_next_submission(&self) {
        self.shared.fault_next.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn immediate_mode_runs_jobs_while_queuing() {
        let gpu = SoftwareGpu::new(SoftwareConfig::default());
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let seq = gpu
            .enqueue("count", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .expect("enqueue");
        assert_eq!(seq, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(gpu.executed(), 1);
    }

    #[test]
    fn manual_mode_runs_jobs_in_order_on_advance() {
        // --- ARRANGE ---
        let gpu = SoftwareGpu::new(SoftwareConfig::manual());
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            gpu.enqueue(format!("job {i}"), move || {
                order.lock().push(i);
                Ok(())
            })
            .expect("enqueue");
        }
        assert_eq!(gpu.pending(), 3);

        // --- ACT ---
        let first = gpu.advance(1);
        let rest = gpu.complete_all();

        // --- ASSERT ---
        assert_eq!((first, rest), (1, 2));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(gpu.executed(), 3);
    }

    #[test]
    fn waiting_wakes_up_when_another_thread_advances() {
        // --- ARRANGE ---
        let gpu = SoftwareGpu::new(SoftwareConfig::manual());
        let seq = gpu.enqueue("slow", || Ok(())).expect("enqueue");
        let advancer = gpu.clone();

        // --- ACT ---
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            advancer.complete_all()
        });
        let reached = gpu
            .wait_until(Duration::from_secs(5), || gpu.executed() >= seq)
            .expect("wait");

        // --- ASSERT ---
        assert!(reached);
        assert_eq!(handle.join().expect("advancer"), 1);
    }

    #[test]
    fn waiting_times_out_without_progress() {
        let gpu = SoftwareGpu::new(SoftwareConfig::manual());
        gpu.enqueue("stuck", || Ok(())).expect("enqueue");
        let reached = gpu
            .wait_until(Duration::from_millis(10), || gpu.executed() >= 1)
            .expect("wait");
        assert!(!reached);
    }

    #[test]
    fn budget_overflow_reports_out_of_memory() {
        let gpu = SoftwareGpu::new(SoftwareConfig {
            memory_budget: 100,
            ..SoftwareConfig::default()
        });
        gpu.allocate(60).expect("fits");
        assert_eq!(
            gpu.allocate(50),
            Err(DriverError::OutOfMemory { requested: 50 })
        );
        gpu.free(60);
        gpu.allocate(100).expect("fits after free");
        assert_eq!(gpu.allocated_bytes(), 100);
    }

    #[test]
    fn a_faulted_submission_loses_the_device_when_it_executes() {
        // --- ARRANGE ---
        let gpu = SoftwareGpu::new(SoftwareConfig::manual());
        gpu.fault_next_submission();
        gpu.enqueue("hang", || Ok(())).expect("queued");
        assert!(!gpu.is_lost());

        // --- ACT ---
        gpu.complete_all();

        // --- ASSERT ---
        assert!(gpu.is_lost());
        assert_eq!(gpu.enqueue("after", || Ok(())), Err(DriverError::DeviceLost));
        assert_eq!(
            gpu.wait_until(Duration::from_millis(1), || true),
            Err(DriverError::DeviceLost)
        );
    }
}

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

//! Completion tokens returned by submission.

use crate::renderer::api::core::DeviceId;
use crate::renderer::error::RhiError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The result of a non-blocking completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// The GPU has not finished the submission yet.
    Pending,
    /// The submission has completed.
    Signaled,
}

/// The result of a blocking completion wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The submission has completed.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
}

/// The backend primitive behind completion tokens: an event query on D3D11 style
/// devices, a timeline semaphore on Vulkan style devices.
///
/// Submissions are numbered from 1 in submission order and complete in that order.
pub trait SubmissionFence: Send + Sync {
    /// Returns `true` if submission `value` has completed. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost before `value` completed.
    fn is_complete(&self, value: u64) -> Result<bool, RhiError>;

    /// Blocks until submission `value` completes or `timeout` elapses. Returns `true`
    /// if it completed.
    fn wait(&self, value: u64, timeout: Duration) -> Result<bool, RhiError>;
}

/// A handle signaling GPU-side completion of one submitted batch.
///
/// A token is signaled exactly once and stays signaled: once [`poll`](Self::poll) or
/// [`wait`](Self::wait) has observed completion, every later call reports
/// [`PollStatus::Signaled`] / [`WaitStatus::Signaled`] without touching the device,
/// even if the device is lost afterwards. Clones share the signaled state.
#[derive(Clone)]
pub struct CompletionToken {
    device: DeviceId,
    value: u64,
    fence: Arc<dyn SubmissionFence>,
    signaled: Arc<AtomicBool>,
}

impl CompletionToken {
    /// Creates a token for submission `value`. Called by devices.
    pub fn new(device: DeviceId, value: u64, fence: Arc<dyn SubmissionFence>) -> Self {
        Self {
            device,
            value,
            fence,
            signaled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The device the batch was submitted to.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// The submission number, increasing with submission order.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Returns `true` if a previous poll or wait observed completion.
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Checks for completion without blocking. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the GPU failed before completing the batch.
    pub fn poll(&self) -> Result<PollStatus, RhiError> {
        if self.is_signaled() {
            return Ok(PollStatus::Signaled);
        }
        if self.fence.is_complete(self.value)? {
            self.signaled.store(true, Ordering::Release);
            Ok(PollStatus::Signaled)
        } else {
            Ok(PollStatus::Pending)
        }
    }

    /// Blocks until the batch completes or `timeout` elapses. Returns immediately if
    /// already signaled.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the GPU failed before completing the batch.
    pub fn wait(&self, timeout: Duration) -> Result<WaitStatus, RhiError> {
        if self.is_signaled() {
            return Ok(WaitStatus::Signaled);
        }
        if self.fence.wait(self.value, timeout)? {
            self.signaled.store(true, Ordering::Release);
            Ok(WaitStatus::Signaled)
        } else {
            Ok(WaitStatus::TimedOut)
        }
    }
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionToken")
            .field("device", &self.device)
            .field("value", &self.value)
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// A fence completing everything up to a settable value, or failing once lost.
    #[derive(Default)]
    struct ManualFence {
        completed: Mutex<u64>,
        lost: AtomicBool,
    }

    impl SubmissionFence for ManualFence {
        fn is_complete(&self, value: u64) -> Result<bool, RhiError> {
            if *self.completed.lock() >= value {
                return Ok(true);
            }
            if self.lost.load(Ordering::Acquire) {
                return Err(RhiError::DeviceLost);
            }
            Ok(false)
        }

        fn wait(&self, value: u64, _timeout: Duration) -> Result<bool, RhiError> {
            self.is_complete(value)
        }
    }

    #[test]
    fn token_signals_once_and_stays_signaled() {
        // --- ARRANGE ---
        let fence = Arc::new(ManualFence::default());
        let token = CompletionToken::new(DeviceId(1), 2, fence.clone());

        // --- ACT & ASSERT ---
        assert_eq!(token.poll().unwrap(), PollStatus::Pending);
        assert_eq!(token.wait(Duration::ZERO).unwrap(), WaitStatus::TimedOut);
        *fence.completed.lock() = 2;
        assert_eq!(token.poll().unwrap(), PollStatus::Signaled);

        // Losing the device afterwards does not revoke the signal.
        fence.lost.store(true, Ordering::Release);
        *fence.completed.lock() = 0;
        assert_eq!(token.poll().unwrap(), PollStatus::Signaled);
        assert_eq!(token.clone().wait(Duration::ZERO).unwrap(), WaitStatus::Signaled);
    }

    #[test]
    fn lost_device_surfaces_through_pending_token() {
        let fence = Arc::new(ManualFence::default());
        let token = CompletionToken::new(DeviceId(1), 1, fence.clone());
        fence.lost.store(true, Ordering::Release);
        assert_eq!(token.poll(), Err(RhiError::DeviceLost));
    }
}

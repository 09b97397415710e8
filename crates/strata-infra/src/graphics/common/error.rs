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

use strata_core::RhiError;
use thiserror::Error;

/// A failure reported by a native driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The GPU context is gone (removed device, hang, driver reset).
    #[error("The device was lost")]
    DeviceLost,
    /// An allocation did not fit into the available memory.
    #[error("Out of device memory while allocating {requested} bytes")]
    OutOfMemory {
        /// Bytes requested by the failed allocation.
        requested: u64,
    },
    /// A native handle does not name a live object.
    #[error("Invalid native handle {0:#x}")]
    InvalidHandle(u64),
    /// The driver does not support the request.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl From<DriverError> for RhiError {
    fn from(error: DriverError) -> Self {
        match error {
            DriverError::DeviceLost => RhiError::DeviceLost,
            DriverError::OutOfMemory { requested } => RhiError::OutOfMemory { requested },
            other => RhiError::Backend(other.to_string()),
        }
    }
}

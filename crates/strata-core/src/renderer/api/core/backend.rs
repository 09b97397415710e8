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

//! Backend selection and device creation parameters.

use std::fmt;

/// The native API family a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendType {
    /// Direct3D 11 style: implicit hazard tracking, deferred contexts, event queries.
    D3D11,
    /// Vulkan style: explicit barriers, dynamic rendering, timeline semaphores.
    #[default]
    Vulkan,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::D3D11 => write!(f, "D3D11"),
            BackendType::Vulkan => write!(f, "Vulkan"),
        }
    }
}

/// Parameters used to create a device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceDescriptor {
    /// An optional debug label, forwarded to the native device and to log output.
    pub label: Option<String>,
    /// The backend to create.
    pub backend: BackendType,
    /// Enables the native validation layer (D3D11 debug layer or Vulkan validation layers)
    /// when the driver provides one. The validation Strata performs itself is always on.
    pub debug_validation: bool,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            backend: BackendType::Vulkan,
            debug_validation: true,
        }
    }
}

impl DeviceDescriptor {
    /// Creates a descriptor for the given backend with every other field defaulted.
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Sets the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

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

//! Backend bookkeeping shared by both devices.
//!
//! [`RhiDevice`] implements [`strata_core::Device`] once: it validates, owns the entity
//! tables, allocates submission values, defers destruction and shares native pipelines.
//! What differs between D3D11 and Vulkan lives behind [`NativeBackend`].

mod backend;
mod cache;
mod device;
mod error;
mod fence;
mod registry;
mod retire;

pub use self::backend::{NativeBackend, PipelineKey, Retired, SubmitReport};
pub use self::cache::TechniqueCache;
pub use self::device::RhiDevice;
pub use self::error::DriverError;
pub use self::fence::DeviceFence;
pub use self::retire::RetireQueue;

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

//! Deduplication of immutable rasterizer, blend and depth/stencil state objects.
//!
//! D3D11 caps the number of live state objects per device, and techniques that differ
//! only in their programs share the same fixed-function state. Objects live until the
//! backend drops.

use super::driver::{D3D11Driver, D3D11Handle, D3D11StateDesc};
use crate::graphics::common::DriverError;
use rustc_hash::FxHashMap;

/// A cache of state objects keyed by their description.
#[derive(Debug, Default)]
pub struct StateObjectCache {
    objects: FxHashMap<D3D11StateDesc, D3D11Handle>,
}

impl StateObjectCache {
    /// Returns the object for `desc`, creating it on first use.
    pub fn get_or_create(
        &mut self,
        driver: &dyn D3D11Driver,
        desc: D3D11StateDesc,
    ) -> Result<D3D11Handle, DriverError> {
        if let Some(&object) = self.objects.get(&desc) {
            return Ok(object);
        }
        let object = driver.create_state(&desc)?;
        log::trace!("Created D3D11 state object {:?} for {:?}", object, desc);
        self.objects.insert(desc, object);
        Ok(object)
    }

    /// Number of distinct objects alive.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Removes every object, handing them back for release.
    pub fn drain(&mut self) -> Vec<D3D11Handle> {
        self.objects.drain().map(|(_, object)| object).collect()
    }
}

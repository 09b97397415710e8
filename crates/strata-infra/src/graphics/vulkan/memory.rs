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

//! Device memory bookkeeping.
//!
//! Every buffer and image gets a dedicated allocation sized by its memory requirements.
//! The allocator keeps per-location totals so the backend can report what it holds.

use super::driver::{VkHandle, VkMemoryLocation, VulkanDriver};
use crate::graphics::common::DriverError;
use rustc_hash::FxHashMap;

/// Rounds `value` up to a multiple of `alignment`. An alignment of zero is treated as one.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

/// Memory bound to one buffer or image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub memory: VkHandle,
    pub offset: u64,
    pub size: u64,
    pub location: VkMemoryLocation,
}

/// Dedicated allocations with running totals.
#[derive(Debug, Default)]
pub struct MemoryAllocator {
    live: FxHashMap<VkHandle, Allocation>,
    device_local_bytes: u64,
    host_visible_bytes: u64,
}

impl MemoryAllocator {
    /// Allocates memory for `object` at `location` and binds it.
    pub fn allocate_for(
        &mut self,
        driver: &dyn VulkanDriver,
        object: VkHandle,
        location: VkMemoryLocation,
    ) -> Result<Allocation, DriverError> {
        let requirements = driver.memory_requirements(object)?;
        let size = align_up(requirements.size, requirements.alignment);
        let memory = driver.allocate_memory(size, location)?;
        if let Err(e) = driver.bind_memory(object, memory, 0) {
            driver.destroy(memory);
            return Err(e);
        }
        let allocation = Allocation {
            memory,
            offset: 0,
            size,
            location,
        };
        *self.total_mut(location) += size;
        self.live.insert(memory, allocation);
        log::trace!("Vulkan: allocated {} bytes of {:?} memory", size, location);
        Ok(allocation)
    }

    /// Frees `allocation`. Objects bound to it must already be destroyed.
    pub fn free(&mut self, driver: &dyn VulkanDriver, allocation: Allocation) {
        if self.live.remove(&allocation.memory).is_none() {
            log::warn!("Vulkan: freeing unknown allocation {:?}", allocation.memory);
            return;
        }
        let total = self.total_mut(allocation.location);
        *total = total.saturating_sub(allocation.size);
        driver.destroy(allocation.memory);
    }

    /// Bytes currently allocated at `location`.
    pub fn allocated(&self, location: VkMemoryLocation) -> u64 {
        match location {
            VkMemoryLocation::DeviceLocal => self.device_local_bytes,
            VkMemoryLocation::HostVisible => self.host_visible_bytes,
        }
    }

    fn total_mut(&mut self, location: VkMemoryLocation) -> &mut u64 {
        match location {
            VkMemoryLocation::DeviceLocal => &mut self.device_local_bytes,
            VkMemoryLocation::HostVisible => &mut self.host_visible_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::software::{SoftwareConfig, SoftwareGpu, SoftwareVulkan};
    use crate::graphics::vulkan::driver::{VkBufferCreateInfo, VkBufferUsage};

    #[test]
    fn align_up_rounds_to_the_next_multiple() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(512, 256), 512);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn totals_follow_allocations() {
        // --- ARRANGE ---
        let driver = SoftwareVulkan::new(SoftwareGpu::new(SoftwareConfig::default()));
        let mut allocator = MemoryAllocator::default();
        let buffer = driver
            .create_buffer(&VkBufferCreateInfo {
                size: 100,
                usage: VkBufferUsage::TRANSFER_DST,
            })
            .expect("buffer");

        // --- ACT ---
        let allocation = allocator
            .allocate_for(&driver, buffer, VkMemoryLocation::HostVisible)
            .expect("allocation");

        // --- ASSERT ---
        assert!(allocation.size >= 100);
        assert_eq!(
            allocator.allocated(VkMemoryLocation::HostVisible),
            allocation.size
        );
        assert_eq!(allocator.allocated(VkMemoryLocation::DeviceLocal), 0);

        driver.destroy(buffer);
        allocator.free(&driver, allocation);
        assert_eq!(allocator.allocated(VkMemoryLocation::HostVisible), 0);
    }
}

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

//! Descriptor set allocation, one growing list of pools per set layout.

use super::driver::{VkDescriptorSetLayoutBinding, VkDescriptorType, VkHandle, VulkanDriver};
use crate::graphics::common::DriverError;

/// Sets each pool holds.
pub const SETS_PER_POOL: u32 = 64;

#[derive(Debug)]
struct PoolState {
    pool: VkHandle,
    allocated: u32,
}

/// Allocates descriptor sets of one layout.
///
/// Pools are sized for [`SETS_PER_POOL`] sets of the layout, so a pool with a free set
/// can always serve an allocation. A new pool is created when every pool is full.
#[derive(Debug)]
pub struct DescriptorAllocator {
    sizes: Vec<(VkDescriptorType, u32)>,
    pools: Vec<PoolState>,
}

impl DescriptorAllocator {
    /// Prepares an allocator for sets with `bindings`. No pool is created yet.
    pub fn new(bindings: &[VkDescriptorSetLayoutBinding]) -> Self {
        let mut sizes: Vec<(VkDescriptorType, u32)> = Vec::new();
        for binding in bindings {
            match sizes
                .iter_mut()
                .find(|(ty, _)| *ty == binding.descriptor_type)
            {
                Some((_, count)) => *count += SETS_PER_POOL,
                None => sizes.push((binding.descriptor_type, SETS_PER_POOL)),
            }
        }
        Self {
            sizes,
            pools: Vec::new(),
        }
    }

    /// Allocates a set of `layout`.
    /// ## Returns
    /// The pool the set came from and the set.
    pub fn allocate(
        &mut self,
        driver: &dyn VulkanDriver,
        layout: VkHandle,
    ) -> Result<(VkHandle, VkHandle), DriverError> {
        let index = match self
            .pools
            .iter()
            .position(|p| p.allocated < SETS_PER_POOL)
        {
            Some(index) => index,
            None => {
                let pool = driver.create_descriptor_pool(SETS_PER_POOL, &self.sizes)?;
                self.pools.push(PoolState { pool, allocated: 0 });
                log::debug!(
                    "Vulkan: created descriptor pool {:?} ({} pools)",
                    pool,
                    self.pool_count()
                );
                self.pools.len() - 1
            }
        };
        let state = &mut self.pools[index];
        let set = driver.allocate_descriptor_set(state.pool, layout)?;
        state.allocated += 1;
        Ok((state.pool, set))
    }

    /// Returns `set` to `pool`.
    pub fn free(&mut self, driver: &dyn VulkanDriver, pool: VkHandle, set: VkHandle) {
        match self.pools.iter_mut().find(|p| p.pool == pool) {
            Some(state) => {
                driver.free_descriptor_set(pool, set);
                state.allocated = state.allocated.saturating_sub(1);
            }
            None => log::warn!("Vulkan: descriptor set {:?} from unknown pool", set),
        }
    }

    /// Number of pools created.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Destroys every pool, freeing all their sets.
    pub fn destroy(self, driver: &dyn VulkanDriver) {
        for state in self.pools {
            driver.destroy(state.pool);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::software::{SoftwareConfig, SoftwareGpu, SoftwareVulkan};
    use crate::graphics::vulkan::driver::VkShaderStage;

    fn bindings() -> Vec<VkDescriptorSetLayoutBinding> {
        vec![
            VkDescriptorSetLayoutBinding {
                binding: 0,
                descriptor_type: VkDescriptorType::UNIFORM_BUFFER,
                stage_flags: VkShaderStage::VERTEX,
            },
            VkDescriptorSetLayoutBinding {
                binding: 2,
                descriptor_type: VkDescriptorType::UNIFORM_BUFFER,
                stage_flags: VkShaderStage::FRAGMENT,
            },
        ]
    }

    #[test]
    fn pool_sizes_scale_with_the_layout() {
        let allocator = DescriptorAllocator::new(&bindings());
        assert_eq!(
            allocator.sizes,
            vec![(VkDescriptorType::UNIFORM_BUFFER, 2 * SETS_PER_POOL)]
        );
    }

    #[test]
    fn a_full_pool_is_followed_by_a_new_one() {
        // --- ARRANGE ---
        let driver = SoftwareVulkan::new(SoftwareGpu::new(SoftwareConfig::default()));
        let layout = driver
            .create_descriptor_set_layout(&bindings())
            .expect("layout");
        let mut allocator = DescriptorAllocator::new(&bindings());

        // --- ACT ---
        let mut sets = Vec::new();
        for _ in 0..=SETS_PER_POOL {
            sets.push(allocator.allocate(&driver, layout).expect("set"));
        }

        // --- ASSERT ---
        assert_eq!(allocator.pool_count(), 2);
        let (pool, set) = sets[0];
        allocator.free(&driver, pool, set);
        allocator.allocate(&driver, layout).expect("reused slot");
        assert_eq!(allocator.pool_count(), 2);
        allocator.destroy(&driver);
    }
}

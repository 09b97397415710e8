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

//! Binding layouts: the ordered list of input slots a technique reads and writes.

use super::enums::ShaderStageFlags;
use crate::renderer::api::core::LayoutId;
use crate::renderer::api::resource::{ResourceState, ResourceUsage};
use std::sync::Arc;

/// The type of resource a slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotKind {
    /// A buffer of constants.
    UniformBuffer,
    /// A structured buffer.
    StorageBuffer {
        /// If `true`, shaders may only read the buffer.
        read_only: bool,
    },
    /// A texture read through a shader resource view.
    SampledTexture,
    /// A texture read and written through an unordered access view.
    StorageTexture,
}

impl SlotKind {
    /// Returns `true` if shaders may write resources bound to this slot.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            SlotKind::StorageBuffer { read_only: false } | SlotKind::StorageTexture
        )
    }

    /// Returns `true` if the slot binds a buffer.
    pub fn is_buffer(self) -> bool {
        matches!(self, SlotKind::UniformBuffer | SlotKind::StorageBuffer { .. })
    }

    /// The state a resource bound to this slot must be in.
    pub fn required_state(self) -> ResourceState {
        match self {
            SlotKind::UniformBuffer => ResourceState::UniformBuffer,
            SlotKind::StorageBuffer { read_only: true } | SlotKind::SampledTexture => {
                ResourceState::ShaderRead
            }
            SlotKind::StorageBuffer { read_only: false } | SlotKind::StorageTexture => {
                ResourceState::ShaderWrite
            }
        }
    }

    /// The usage a resource bound to this slot must declare.
    pub fn required_usage(self) -> ResourceUsage {
        self.required_state().required_usage()
    }
}

/// One input slot of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotDescriptor {
    /// The slot index. Indices of a layout are unique and contiguous from zero.
    pub index: u32,
    /// The type of resource the slot expects.
    pub kind: SlotKind,
    /// The stages that may access the slot.
    pub visibility: ShaderStageFlags,
}

impl SlotDescriptor {
    /// Creates a slot descriptor.
    pub const fn new(index: u32, kind: SlotKind, visibility: ShaderStageFlags) -> Self {
        Self {
            index,
            kind,
            visibility,
        }
    }
}

/// A descriptor used to create a [`Layout`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayoutDescriptor {
    /// An optional debug label.
    pub label: Option<String>,
    /// The slots, in any order.
    pub slots: Vec<SlotDescriptor>,
}

/// A validated binding layout.
///
/// Slots are stored sorted by index, so `slot_at(i)` is the slot with index `i`.
#[derive(Debug, Clone)]
pub struct Layout {
    id: LayoutId,
    label: Option<Arc<str>>,
    slots: Arc<[SlotDescriptor]>,
}

impl Layout {
    /// Builds a layout from validated, sorted slots. Called by devices.
    pub fn new(id: LayoutId, label: Option<&str>, slots: Vec<SlotDescriptor>) -> Self {
        Self {
            id,
            label: label.map(Arc::from),
            slots: slots.into(),
        }
    }

    /// The handle of this layout.
    pub fn id(&self) -> LayoutId {
        self.id
    }

    /// The debug label given at creation.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The slot with the given index.
    pub fn slot_at(&self, index: u32) -> Option<&SlotDescriptor> {
        self.slots.get(index as usize)
    }

    /// Every slot, ordered by index.
    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }
}

impl PartialEq for Layout {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Layout {}

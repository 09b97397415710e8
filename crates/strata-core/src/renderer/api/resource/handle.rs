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

//! The resource handle and its tracked state.

use super::{
    barrier::BarrierCommand,
    descriptor::{ResourceDescriptor, ResourceKind},
    format::Format,
    state::ResourceState,
    usage::ResourceUsage,
    view::SubresourceRange,
};
use crate::renderer::api::core::ResourceId;
use crate::renderer::error::{RhiError, ValidationError};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

struct ResourceShared {
    id: ResourceId,
    label: Option<String>,
    kind: ResourceKind,
    format: Format,
    usage: ResourceUsage,
    byte_size: u64,
    state: AtomicU8,
    released: AtomicBool,
}

/// A buffer or texture created by a [`Device`](crate::renderer::Device).
///
/// `Resource` is a cheap, clonable handle. All clones share the resource's metadata and
/// its *current state*: the state the caller has declared through
/// [`transition`](Self::transition). The device owns the native memory; dropping a
/// handle never frees anything, [`Device::destroy`](crate::renderer::Device::destroy)
/// does, once the GPU no longer uses the resource.
#[derive(Clone)]
pub struct Resource {
    shared: Arc<ResourceShared>,
}

impl Resource {
    /// Builds a handle for a validated descriptor. Called by devices.
    ///
    /// The initial state is [`ResourceState::CopyDst`] when the descriptor carries
    /// initial data, [`ResourceState::Undefined`] otherwise.
    pub fn new(id: ResourceId, descriptor: &ResourceDescriptor) -> Self {
        let initial = if descriptor.initial_data.is_some() {
            ResourceState::CopyDst
        } else {
            ResourceState::Undefined
        };
        Self {
            shared: Arc::new(ResourceShared {
                id,
                label: descriptor.label.clone(),
                kind: descriptor.kind,
                format: descriptor.format,
                usage: descriptor.usage,
                byte_size: descriptor.byte_size(),
                state: AtomicU8::new(initial as u8),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// The handle of this resource.
    pub fn id(&self) -> ResourceId {
        self.shared.id
    }

    /// The debug label given at creation.
    pub fn label(&self) -> Option<&str> {
        self.shared.label.as_deref()
    }

    /// Buffer or texture geometry.
    pub fn kind(&self) -> &ResourceKind {
        &self.shared.kind
    }

    /// The texel format, [`Format::Undefined`] for buffers.
    pub fn format(&self) -> Format {
        self.shared.format
    }

    /// The declared usage.
    pub fn usage(&self) -> ResourceUsage {
        self.shared.usage
    }

    /// Total bytes in the packed layout.
    pub fn byte_size(&self) -> u64 {
        self.shared.byte_size
    }

    /// Returns `true` for buffers.
    pub fn is_buffer(&self) -> bool {
        self.shared.kind.is_buffer()
    }

    /// Returns `true` for textures.
    pub fn is_texture(&self) -> bool {
        !self.is_buffer()
    }

    /// A range covering every mip level and array layer.
    pub fn full_range(&self) -> SubresourceRange {
        SubresourceRange {
            base_mip_level: 0,
            mip_level_count: self.shared.kind.mip_level_count(),
            base_array_layer: 0,
            array_layer_count: self.shared.kind.array_layer_count(),
        }
    }

    /// The state most recently declared through [`transition`](Self::transition).
    pub fn current_state(&self) -> ResourceState {
        ResourceState::from_raw(self.shared.state.load(Ordering::Acquire))
            .unwrap_or(ResourceState::Undefined)
    }

    /// Declares that the resource moves to `new_state` and returns the barrier that
    /// performs the move. The barrier must be [inserted](crate::renderer::Batch::insert)
    /// into a batch to take effect on the GPU.
    ///
    /// Transitioning to the current state yields a barrier with identical `before` and
    /// `after`, which backends use as a memory dependency (for example between two
    /// unordered-access dispatches).
    ///
    /// # Errors
    ///
    /// Fails if `new_state` is [`ResourceState::Undefined`], if the usage declared at
    /// creation does not permit it, or if the resource has been destroyed.
    pub fn transition(&self, new_state: ResourceState) -> Result<BarrierCommand, RhiError> {
        if self.is_released() {
            return Err(ValidationError::ReleasedResource(self.id()).into());
        }
        if !new_state.is_allowed_by(self.usage()) {
            return Err(ValidationError::StateNotAllowed {
                state: new_state,
                usage: self.usage(),
            }
            .into());
        }
        let before = ResourceState::from_raw(
            self.shared.state.swap(new_state as u8, Ordering::AcqRel),
        )
        .unwrap_or(ResourceState::Undefined);
        log::trace!("{}: {:?} -> {:?}", self.id(), before, new_state);
        Ok(BarrierCommand::new(self.clone(), before, new_state))
    }

    /// Returns a barrier that keeps the current state. Used to introduce a batch to a
    /// resource whose state was established by an earlier submission.
    pub fn observe(&self) -> BarrierCommand {
        let state = self.current_state();
        BarrierCommand::new(self.clone(), state, state)
    }

    /// Returns `true` once the owning device has destroyed the resource.
    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }

    /// Marks the resource destroyed. Called by the owning device.
    pub fn mark_released(&self) {
        self.shared.released.store(true, Ordering::Release);
    }

    /// Creates a non-owning reference to this resource.
    pub fn downgrade(&self) -> WeakResource {
        WeakResource {
            id: self.id(),
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shared.id.hash(state);
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.shared.id)
            .field("label", &self.shared.label)
            .field("kind", &self.shared.kind)
            .field("format", &self.shared.format)
            .field("state", &self.current_state())
            .finish()
    }
}

/// A non-owning reference to a [`Resource`], held by views.
#[derive(Clone)]
pub struct WeakResource {
    id: ResourceId,
    shared: Weak<ResourceShared>,
}

impl WeakResource {
    /// The handle of the referenced resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns the resource if a handle to it is still alive.
    pub fn upgrade(&self) -> Option<Resource> {
        self.shared.upgrade().map(|shared| Resource { shared })
    }
}

impl fmt::Debug for WeakResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakResource").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::core::DeviceId;

    fn render_target() -> Resource {
        let desc = ResourceDescriptor::texture_2d(
            Some("rt"),
            16,
            16,
            Format::Rgba8Unorm,
            ResourceUsage::RENDER_TARGET | ResourceUsage::COPY_SRC,
        );
        Resource::new(ResourceId::new(DeviceId(7), 0), &desc)
    }

    #[test]
    fn transition_round_trip_reports_previous_state() {
        // --- ARRANGE ---
        let resource = render_target();
        assert_eq!(resource.current_state(), ResourceState::Undefined);

        // --- ACT ---
        let first = resource.transition(ResourceState::RenderTarget).unwrap();
        let second = resource.transition(ResourceState::CopySrc).unwrap();

        // --- ASSERT ---
        assert_eq!(first.before(), ResourceState::Undefined);
        assert_eq!(first.after(), ResourceState::RenderTarget);
        assert_eq!(second.before(), ResourceState::RenderTarget);
        assert_eq!(second.after(), ResourceState::CopySrc);
        assert_eq!(resource.current_state(), ResourceState::CopySrc);
    }

    #[test]
    fn transition_rejects_states_outside_usage() {
        let resource = render_target();
        let err = resource.transition(ResourceState::ShaderRead).unwrap_err();
        assert!(matches!(
            err,
            RhiError::Validation(ValidationError::StateNotAllowed { .. })
        ));
        assert!(resource.transition(ResourceState::Undefined).is_err());
        // A rejected transition leaves the state untouched.
        assert_eq!(resource.current_state(), ResourceState::Undefined);
    }

    #[test]
    fn initial_data_starts_in_copy_dst() {
        let desc = ResourceDescriptor::buffer(None, 16, ResourceUsage::COPY_DST)
            .with_initial_data(vec![0u8; 16]);
        let resource = Resource::new(ResourceId::new(DeviceId(7), 1), &desc);
        assert_eq!(resource.current_state(), ResourceState::CopyDst);
    }

    #[test]
    fn released_resources_cannot_transition() {
        let resource = render_target();
        resource.mark_released();
        assert!(matches!(
            resource.transition(ResourceState::RenderTarget),
            Err(RhiError::Validation(ValidationError::ReleasedResource(_)))
        ));
    }

    #[test]
    fn weak_reference_expires_with_last_handle() {
        let resource = render_target();
        let weak = resource.downgrade();
        assert!(weak.upgrade().is_some());
        drop(resource);
        assert!(weak.upgrade().is_none());
    }
}

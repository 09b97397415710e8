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

//! Opaque handles identifying entities created by a [`Device`](crate::renderer::Device).
//!
//! Every handle carries the [`DeviceId`] of the device that created it, so a device can
//! reject entities that belong to another device instead of silently aliasing its own
//! table slots.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a single device instance for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Allocates a fresh, process-unique device id.
    pub fn allocate() -> Self {
        Self(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device{}", self.0)
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            /// The device that created the entity.
            pub device: DeviceId,
            /// The slot of the entity inside its device table.
            pub index: u32,
        }

        impl $name {
            /// Creates a handle from its raw parts.
            pub const fn new(device: DeviceId, index: u32) -> Self {
                Self { device, index }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}@{}"), self.index, self.device)
            }
        }
    };
}

define_handle!(
    /// An opaque handle to a buffer or texture.
    ResourceId,
    "resource"
);
define_handle!(
    /// An opaque handle to a binding layout.
    LayoutId,
    "layout"
);
define_handle!(
    /// An opaque handle to a mesh.
    MeshId,
    "mesh"
);
define_handle!(
    /// An opaque handle to a compiled technique.
    TechniqueId,
    "technique"
);
define_handle!(
    /// An opaque handle to a pass.
    PassId,
    "pass"
);

/// The kind of a device-owned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A buffer or texture.
    Resource,
    /// A binding layout.
    Layout,
    /// A mesh.
    Mesh,
    /// A technique.
    Technique,
    /// A pass.
    Pass,
}

/// Any entity a device can destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// A buffer or texture.
    Resource(ResourceId),
    /// A binding layout.
    Layout(LayoutId),
    /// A mesh.
    Mesh(MeshId),
    /// A technique.
    Technique(TechniqueId),
    /// A pass.
    Pass(PassId),
}

impl Entity {
    /// The kind of the entity.
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Resource(_) => EntityKind::Resource,
            Entity::Layout(_) => EntityKind::Layout,
            Entity::Mesh(_) => EntityKind::Mesh,
            Entity::Technique(_) => EntityKind::Technique,
            Entity::Pass(_) => EntityKind::Pass,
        }
    }

    /// The device that created the entity.
    pub fn device(&self) -> DeviceId {
        match self {
            Entity::Resource(id) => id.device,
            Entity::Layout(id) => id.device,
            Entity::Mesh(id) => id.device,
            Entity::Technique(id) => id.device,
            Entity::Pass(id) => id.device,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Resource(id) => id.fmt(f),
            Entity::Layout(id) => id.fmt(f),
            Entity::Mesh(id) => id.fmt(f),
            Entity::Technique(id) => id.fmt(f),
            Entity::Pass(id) => id.fmt(f),
        }
    }
}

macro_rules! impl_entity_from {
    ($($id:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$id> for Entity {
                fn from(id: $id) -> Self {
                    Entity::$variant(id)
                }
            }
        )*
    };
}

impl_entity_from!(
    ResourceId => Resource,
    LayoutId => Layout,
    MeshId => Mesh,
    TechniqueId => Technique,
    PassId => Pass,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_ids_are_unique() {
        let a = DeviceId::allocate();
        let b = DeviceId::allocate();
        assert_ne!(a, b);
    }

    #[test]
    fn handles_from_different_devices_differ() {
        let a = ResourceId::new(DeviceId(1), 0);
        let b = ResourceId::new(DeviceId(2), 0);
        assert_ne!(a, b);
        assert_eq!(Entity::from(a).device(), DeviceId(1));
        assert_eq!(Entity::from(b).kind(), EntityKind::Resource);
        assert_eq!(a.to_string(), "resource#0@device1");
    }
}

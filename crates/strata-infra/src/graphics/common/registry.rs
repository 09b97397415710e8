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

//! Entity tables of a device.

use rustc_hash::FxHashMap;
use strata_core::renderer::{
    Entity, Layout, LayoutId, Mesh, MeshId, Pass, PassId, Resource, ResourceId, Technique,
    TechniqueId,
};

#[derive(Debug)]
struct Tracked<T> {
    entity: T,
    /// The last submission value that referenced the entity, 0 if none did.
    last_use: u64,
}

impl<T> Tracked<T> {
    fn new(entity: T) -> Self {
        Self {
            entity,
            last_use: 0,
        }
    }
}

/// An entity taken out of the tables by `destroy` or shutdown.
#[derive(Debug)]
pub(crate) enum Removed {
    Resource { resource: Resource, bytes: u64 },
    Layout(LayoutId),
    Mesh,
    Technique(TechniqueId),
    Pass(PassId),
}

/// Live entity counts, in the order resources, layouts, meshes, techniques, passes.
pub(crate) type EntityCounts = [usize; 5];

/// The live entities of a device, each with the last submission that used it.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    resources: FxHashMap<ResourceId, Tracked<(Resource, u64)>>,
    layouts: FxHashMap<LayoutId, Tracked<Layout>>,
    meshes: FxHashMap<MeshId, Tracked<Mesh>>,
    techniques: FxHashMap<TechniqueId, Tracked<Technique>>,
    passes: FxHashMap<PassId, Tracked<Pass>>,
}

impl Registry {
    pub(crate) fn insert_resource(&mut self, resource: Resource, bytes: u64) {
        self.resources
            .insert(resource.id(), Tracked::new((resource, bytes)));
    }

    pub(crate) fn insert_layout(&mut self, layout: Layout) {
        self.layouts.insert(layout.id(), Tracked::new(layout));
    }

    pub(crate) fn insert_mesh(&mut self, mesh: Mesh) {
        self.meshes.insert(mesh.id(), Tracked::new(mesh));
    }

    pub(crate) fn insert_technique(&mut self, technique: Technique) {
        self.techniques
            .insert(technique.id(), Tracked::new(technique));
    }

    pub(crate) fn insert_pass(&mut self, pass: Pass) {
        self.passes.insert(pass.id(), Tracked::new(pass));
    }

    pub(crate) fn contains(&self, entity: Entity) -> bool {
        match entity {
            Entity::Resource(id) => self.resources.contains_key(&id),
            Entity::Layout(id) => self.layouts.contains_key(&id),
            Entity::Mesh(id) => self.meshes.contains_key(&id),
            Entity::Technique(id) => self.techniques.contains_key(&id),
            Entity::Pass(id) => self.passes.contains_key(&id),
        }
    }

    /// Records that submission `value` references `entity`.
    pub(crate) fn touch(&mut self, entity: Entity, value: u64) {
        let last_use = match entity {
            Entity::Resource(id) => self.resources.get_mut(&id).map(|t| &mut t.last_use),
            Entity::Layout(id) => self.layouts.get_mut(&id).map(|t| &mut t.last_use),
            Entity::Mesh(id) => self.meshes.get_mut(&id).map(|t| &mut t.last_use),
            Entity::Technique(id) => self.techniques.get_mut(&id).map(|t| &mut t.last_use),
            Entity::Pass(id) => self.passes.get_mut(&id).map(|t| &mut t.last_use),
        };
        if let Some(last_use) = last_use {
            *last_use = (*last_use).max(value);
        }
    }

    /// Records that submission `value` references every one of `entities`.
    /// ## Returns
    /// The first entity that is not live, in which case nothing is recorded.
    pub(crate) fn touch_all(&mut self, entities: &[Entity], value: u64) -> Result<(), Entity> {
        if let Some(missing) = entities.iter().find(|e| !self.contains(**e)) {
            return Err(*missing);
        }
        for entity in entities {
            self.touch(*entity, value);
        }
        Ok(())
    }

    /// Takes `entity` out of the tables.
    /// ## Returns
    /// The removed entity and the last submission that referenced it.
    pub(crate) fn remove(&mut self, entity: Entity) -> Option<(Removed, u64)> {
        match entity {
            Entity::Resource(id) => self.resources.remove(&id).map(|t| {
                let (resource, bytes) = t.entity;
                (Removed::Resource { resource, bytes }, t.last_use)
            }),
            Entity::Layout(id) => self
                .layouts
                .remove(&id)
                .map(|t| (Removed::Layout(id), t.last_use)),
            Entity::Mesh(id) => self
                .meshes
                .remove(&id)
                .map(|t| (Removed::Mesh, t.last_use)),
            Entity::Technique(id) => self
                .techniques
                .remove(&id)
                .map(|t| (Removed::Technique(id), t.last_use)),
            Entity::Pass(id) => self
                .passes
                .remove(&id)
                .map(|t| (Removed::Pass(id), t.last_use)),
        }
    }

    /// Takes every entity out of the tables.
    pub(crate) fn drain(&mut self) -> Vec<Removed> {
        let mut removed = Vec::with_capacity(self.len());
        removed.extend(self.passes.drain().map(|(id, _)| Removed::Pass(id)));
        removed.extend(self.techniques.drain().map(|(id, _)| Removed::Technique(id)));
        removed.extend(self.meshes.drain().map(|_| Removed::Mesh));
        removed.extend(self.layouts.drain().map(|(id, _)| Removed::Layout(id)));
        removed.extend(self.resources.drain().map(|(_, t)| {
            let (resource, bytes) = t.entity;
            Removed::Resource { resource, bytes }
        }));
        removed
    }

    pub(crate) fn counts(&self) -> EntityCounts {
        [
            self.resources.len(),
            self.layouts.len(),
            self.meshes.len(),
            self.techniques.len(),
            self.passes.len(),
        ]
    }

    pub(crate) fn len(&self) -> usize {
        self.counts().iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::renderer::{DeviceId, ResourceDescriptor, ResourceUsage};

    #[test]
    fn removal_reports_last_use() {
        // --- ARRANGE ---
        let mut registry = Registry::default();
        let desc = ResourceDescriptor::buffer(None, 64, ResourceUsage::COPY_DST);
        let resource = Resource::new(ResourceId::new(DeviceId(5), 0), &desc);
        let entity = Entity::from(resource.id());
        registry.insert_resource(resource, 64);

        // --- ACT ---
        registry.touch(entity, 4);
        registry.touch(entity, 2);
        let removed = registry.remove(entity);

        // --- ASSERT ---
        let (removed, last_use) = removed.unwrap();
        assert!(matches!(removed, Removed::Resource { bytes: 64, .. }));
        assert_eq!(last_use, 4);
        assert!(!registry.contains(entity));
        assert!(registry.remove(entity).is_none());
    }

    #[test]
    fn touch_all_records_nothing_when_an_entity_is_gone() {
        // --- ARRANGE ---
        let mut registry = Registry::default();
        let desc = ResourceDescriptor::buffer(None, 16, ResourceUsage::COPY_DST);
        let live = Resource::new(ResourceId::new(DeviceId(5), 0), &desc);
        let gone = Entity::from(ResourceId::new(DeviceId(5), 1));
        let entity = Entity::from(live.id());
        registry.insert_resource(live, 16);

        // --- ACT ---
        let result = registry.touch_all(&[entity, gone], 7);

        // --- ASSERT ---
        assert_eq!(result, Err(gone));
        let (_, last_use) = registry.remove(entity).unwrap();
        assert_eq!(last_use, 0);
    }
}

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

//! Meshes: vertex and index buffers bundled with the layout that maps them to
//! technique inputs.

use super::{enums::IndexFormat, fixed_function::VertexBufferLayout};
use crate::renderer::api::core::MeshId;
use crate::renderer::api::resource::Resource;
use std::sync::Arc;

/// One vertex stream of a mesh.
#[derive(Debug, Clone)]
pub struct MeshVertexBuffer {
    /// The buffer holding the vertices.
    pub resource: Resource,
    /// Byte offset of the first vertex.
    pub offset: u64,
    /// Stride and attributes of the stream, fixed for the mesh's lifetime.
    pub layout: VertexBufferLayout,
}

/// The index stream of a mesh.
#[derive(Debug, Clone)]
pub struct MeshIndexBuffer {
    /// The buffer holding the indices.
    pub resource: Resource,
    /// Byte offset of the first index.
    pub offset: u64,
    /// The index width.
    pub format: IndexFormat,
    /// Number of indices.
    pub count: u32,
}

/// A descriptor used to create a [`Mesh`].
#[derive(Debug, Clone, Default)]
pub struct MeshDescriptor {
    /// An optional debug label.
    pub label: Option<String>,
    /// Vertex streams, in binding order.
    pub vertex_buffers: Vec<MeshVertexBuffer>,
    /// The index stream, `None` for non-indexed meshes.
    pub index_buffer: Option<MeshIndexBuffer>,
    /// Number of vertices drawn by a non-indexed draw.
    pub vertex_count: u32,
}

/// An immutable vertex/index buffer aggregate.
#[derive(Debug, Clone)]
pub struct Mesh {
    id: MeshId,
    label: Option<Arc<str>>,
    vertex_buffers: Arc<[MeshVertexBuffer]>,
    index_buffer: Option<MeshIndexBuffer>,
    vertex_count: u32,
}

impl Mesh {
    /// Builds a mesh from a validated descriptor. Called by devices.
    pub fn new(id: MeshId, descriptor: MeshDescriptor) -> Self {
        Self {
            id,
            label: descriptor.label.as_deref().map(Arc::from),
            vertex_buffers: descriptor.vertex_buffers.into(),
            index_buffer: descriptor.index_buffer,
            vertex_count: descriptor.vertex_count,
        }
    }

    /// The handle of this mesh.
    pub fn id(&self) -> MeshId {
        self.id
    }

    /// The debug label given at creation.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Vertex streams, in binding order.
    pub fn vertex_buffers(&self) -> &[MeshVertexBuffer] {
        &self.vertex_buffers
    }

    /// The index stream.
    pub fn index_buffer(&self) -> Option<&MeshIndexBuffer> {
        self.index_buffer.as_ref()
    }

    /// Number of vertices a non-indexed draw consumes.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of elements one instance draws: the index count for indexed meshes,
    /// the vertex count otherwise.
    pub fn element_count(&self) -> u32 {
        self.index_buffer
            .as_ref()
            .map_or(self.vertex_count, |index| index.count)
    }

    /// Returns `true` if the mesh's vertex streams match `layouts` exactly.
    pub fn matches_layouts(&self, layouts: &[VertexBufferLayout]) -> bool {
        self.vertex_buffers.len() == layouts.len()
            && self
                .vertex_buffers
                .iter()
                .zip(layouts)
                .all(|(buffer, layout)| &buffer.layout == layout)
    }

    /// Every resource the mesh references.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> + '_ {
        self.vertex_buffers
            .iter()
            .map(|buffer| &buffer.resource)
            .chain(self.index_buffer.iter().map(|index| &index.resource))
    }
}

impl PartialEq for Mesh {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Mesh {}

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

//! Techniques: compiled stage programs plus fixed-function state, addressed by a layout.

use super::{
    enums::{ShaderStage, VertexFormat},
    fixed_function::{BlendState, DepthStencilState, RasterState, VertexBufferLayout},
    layout::{Layout, SlotKind},
};
use crate::renderer::api::core::TechniqueId;
use crate::renderer::api::resource::Format;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A slot a stage program accesses, as reported by shader reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotRequirement {
    /// The layout slot index.
    pub index: u32,
    /// The resource kind the program expects there.
    pub kind: SlotKind,
}

/// A vertex input a vertex program consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexInput {
    /// The input location.
    pub location: u32,
    /// The format the program reads.
    pub format: VertexFormat,
}

/// Reflection data of one stage program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StageInterface {
    /// Every slot the program accesses.
    pub slots: Vec<SlotRequirement>,
    /// Vertex inputs, only meaningful for vertex programs.
    pub vertex_inputs: Vec<VertexInput>,
    /// Number of color outputs, only meaningful for fragment programs.
    pub color_outputs: u32,
}

/// A compiled program for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StageProgram {
    /// The stage this program runs in.
    pub stage: ShaderStage,
    /// The name of the entry point.
    pub entry_point: String,
    /// Backend bytecode (DXBC/DXIL or SPIR-V), opaque to this layer.
    pub bytecode: Arc<[u8]>,
    /// What the program reads and writes.
    pub interface: StageInterface,
}

/// A descriptor used to create a [`Technique`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TechniqueDescriptor {
    /// An optional debug label. Not part of the technique's identity.
    pub label: Option<String>,
    /// Either a compute program, or a vertex program with an optional fragment program.
    pub stages: Vec<StageProgram>,
    /// Rasterizer state.
    pub raster: RasterState,
    /// Output merger state.
    pub blend: BlendState,
    /// Depth/stencil test, `None` to disable it.
    pub depth_stencil: Option<DepthStencilState>,
    /// The vertex buffers the vertex program reads.
    pub vertex_buffers: Vec<VertexBufferLayout>,
    /// Formats of the color targets, in target order.
    pub color_formats: Vec<Format>,
    /// Format of the depth target, if the technique renders with one.
    pub depth_format: Option<Format>,
    /// Samples per texel of the targets.
    pub sample_count: u32,
}

impl Default for TechniqueDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            stages: Vec::new(),
            raster: RasterState::default(),
            blend: BlendState::default(),
            depth_stencil: None,
            vertex_buffers: Vec::new(),
            color_formats: Vec::new(),
            depth_format: None,
            sample_count: 1,
        }
    }
}

impl TechniqueDescriptor {
    /// The program of the given stage, if present.
    pub fn stage(&self, stage: ShaderStage) -> Option<&StageProgram> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Whether this describes a graphics or a compute technique.
    pub fn kind(&self) -> TechniqueKind {
        if self.stage(ShaderStage::Compute).is_some() {
            TechniqueKind::Compute
        } else {
            TechniqueKind::Render
        }
    }
}

/// Whether a technique draws or dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TechniqueKind {
    /// A graphics technique, used by draws.
    Render,
    /// A compute technique, used by dispatches.
    Compute,
}

/// Hashes everything that defines a technique's behavior: the descriptor without its
/// label, and the slot schema of the layout. Identical descriptions against identical
/// layouts produce identical fingerprints.
pub fn fingerprint(descriptor: &TechniqueDescriptor, layout: &Layout) -> u64 {
    let mut hasher = FxHasher::default();
    descriptor.stages.hash(&mut hasher);
    descriptor.raster.hash(&mut hasher);
    descriptor.blend.hash(&mut hasher);
    descriptor.depth_stencil.hash(&mut hasher);
    descriptor.vertex_buffers.hash(&mut hasher);
    descriptor.color_formats.hash(&mut hasher);
    descriptor.depth_format.hash(&mut hasher);
    descriptor.sample_count.hash(&mut hasher);
    layout.slots().hash(&mut hasher);
    hasher.finish()
}

/// A validated, immutable technique.
///
/// Two techniques may share one native pipeline when their fingerprints and layouts
/// match; the handle itself is always distinct.
#[derive(Debug, Clone)]
pub struct Technique {
    id: TechniqueId,
    layout: Layout,
    descriptor: Arc<TechniqueDescriptor>,
    fingerprint: u64,
}

impl Technique {
    /// Builds a technique from a validated descriptor. Called by devices.
    pub fn new(id: TechniqueId, descriptor: TechniqueDescriptor, layout: &Layout) -> Self {
        let fingerprint = fingerprint(&descriptor, layout);
        Self {
            id,
            layout: layout.clone(),
            descriptor: Arc::new(descriptor),
            fingerprint,
        }
    }

    /// The handle of this technique.
    pub fn id(&self) -> TechniqueId {
        self.id
    }

    /// The layout the technique was created against.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The descriptor the technique was created from.
    pub fn descriptor(&self) -> &TechniqueDescriptor {
        &self.descriptor
    }

    /// Whether the technique draws or dispatches.
    pub fn kind(&self) -> TechniqueKind {
        self.descriptor.kind()
    }

    /// The identity hash of the technique's description.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// The debug label given at creation.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl PartialEq for Technique {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Technique {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::core::{DeviceId, LayoutId};
    use crate::renderer::api::pipeline::{ShaderStageFlags, SlotDescriptor};

    fn compute(label: &str) -> TechniqueDescriptor {
        TechniqueDescriptor {
            label: Some(label.to_owned()),
            stages: vec![StageProgram {
                stage: ShaderStage::Compute,
                entry_point: "main".into(),
                bytecode: Arc::from(&[1u8, 2, 3][..]),
                interface: StageInterface::default(),
            }],
            ..Default::default()
        }
    }

    fn layout(index: u32, kind: SlotKind) -> Layout {
        Layout::new(
            LayoutId::new(DeviceId(1), index),
            None,
            vec![SlotDescriptor::new(0, kind, ShaderStageFlags::COMPUTE)],
        )
    }

    #[test]
    fn fingerprint_ignores_label_and_layout_identity() {
        let a = fingerprint(&compute("a"), &layout(0, SlotKind::StorageTexture));
        let b = fingerprint(&compute("b"), &layout(1, SlotKind::StorageTexture));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_tracks_layout_schema() {
        let a = fingerprint(&compute("a"), &layout(0, SlotKind::StorageTexture));
        let b = fingerprint(&compute("a"), &layout(0, SlotKind::SampledTexture));
        assert_ne!(a, b);
    }

    #[test]
    fn compute_stage_defines_kind() {
        assert_eq!(compute("c").kind(), TechniqueKind::Compute);
        assert_eq!(TechniqueDescriptor::default().kind(), TechniqueKind::Render);
    }
}

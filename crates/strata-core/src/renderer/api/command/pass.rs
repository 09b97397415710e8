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

//! Passes: the static read/write topology of one rendering or compute step.

use crate::math::{Extent3D, LinearRgba};
use crate::renderer::api::core::PassId;
use crate::renderer::api::pipeline::{Technique, TechniqueKind};
use crate::renderer::api::resource::{Resource, ResourceState, View};
use std::sync::Arc;

/// Specifies the operation to perform on a target at the start of a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<V> {
    /// Keep the existing contents.
    Load,
    /// Clear the target to the given value.
    Clear(V),
}

/// Specifies the operation to perform on a target at the end of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Write the results to memory.
    #[default]
    Store,
    /// The results may be discarded.
    Discard,
}

/// A color target of a pass.
#[derive(Debug, Clone)]
pub struct ColorTarget {
    /// A [`ViewKind::RenderTarget`](crate::renderer::ViewKind::RenderTarget) view.
    pub view: View,
    /// What happens to the contents when the pass is bound.
    pub load: LoadOp<LinearRgba>,
    /// What happens to the contents when the pass ends.
    pub store: StoreOp,
}

impl ColorTarget {
    /// A target cleared to `color` when the pass is bound.
    pub fn cleared(view: View, color: LinearRgba) -> Self {
        Self {
            view,
            load: LoadOp::Clear(color),
            store: StoreOp::Store,
        }
    }

    /// A target whose existing contents are kept.
    pub fn loaded(view: View) -> Self {
        Self {
            view,
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }
}

/// The depth/stencil target of a pass.
#[derive(Debug, Clone)]
pub struct DepthTarget {
    /// A `DepthTarget` or `ReadOnlyDepth` view.
    pub view: View,
    /// What happens to depth when the pass is bound. Ignored for read-only depth.
    pub depth_load: LoadOp<f32>,
    /// What happens to stencil when the pass is bound. Ignored for read-only depth.
    pub stencil_load: LoadOp<u32>,
    /// What happens to the contents when the pass ends.
    pub store: StoreOp,
}

/// Everything a pass writes.
#[derive(Debug, Clone, Default)]
pub struct PassTargets {
    /// Color targets, matching the technique's color formats in order.
    pub colors: Vec<ColorTarget>,
    /// The depth/stencil target, if the technique has a depth format.
    pub depth: Option<DepthTarget>,
}

impl PassTargets {
    /// A single color target and no depth.
    pub fn color(target: ColorTarget) -> Self {
        Self {
            colors: vec![target],
            depth: None,
        }
    }

    /// Returns `true` if there is no target at all.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty() && self.depth.is_none()
    }
}

/// What is bound to a layout slot.
#[derive(Debug, Clone)]
pub enum InputBinding {
    /// A texture view, for sampled and storage texture slots.
    View(View),
    /// A buffer range, for uniform and storage buffer slots.
    Buffer {
        /// The bound buffer.
        resource: Resource,
        /// Byte offset of the range.
        offset: u64,
        /// Size of the range, `None` for the rest of the buffer.
        size: Option<u64>,
    },
}

/// A resource bound to one layout slot of the pass technique.
#[derive(Debug, Clone)]
pub struct PassInput {
    /// The layout slot index.
    pub slot: u32,
    /// The bound resource.
    pub binding: InputBinding,
}

impl PassInput {
    /// Binds a view to `slot`.
    pub fn view(slot: u32, view: View) -> Self {
        Self {
            slot,
            binding: InputBinding::View(view),
        }
    }

    /// Binds a whole buffer to `slot`.
    pub fn buffer(slot: u32, resource: Resource) -> Self {
        Self {
            slot,
            binding: InputBinding::Buffer {
                resource,
                offset: 0,
                size: None,
            },
        }
    }
}

bitflags::bitflags! {
    /// Feedback-safe mechanisms a pass may opt into.
    ///
    /// Without a flag, a resource written by a pass may not also be read by it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeedbackFlags: u32 {
        /// A read-only depth target may be sampled by the same pass.
        const READ_ONLY_DEPTH = 1 << 0;
        /// A resource may be bound through several unordered-access bindings.
        const UNORDERED_ALIAS = 1 << 1;
    }
}

/// A descriptor used to create a [`Pass`].
#[derive(Debug, Clone)]
pub struct PassDescriptor {
    /// An optional debug label.
    pub label: Option<String>,
    /// The technique the pass executes.
    pub technique: Technique,
    /// Feedback-safe mechanisms the pass opts into.
    pub feedback: FeedbackFlags,
}

impl PassDescriptor {
    /// A descriptor without feedback mechanisms.
    pub fn new(label: Option<&str>, technique: &Technique) -> Self {
        Self {
            label: label.map(str::to_owned),
            technique: technique.clone(),
            feedback: FeedbackFlags::empty(),
        }
    }
}

/// Why a pass needs a resource in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementRole {
    /// The resource is a target, checked when the pass is bound.
    Target,
    /// The resource is an input, checked at each draw or dispatch.
    Input,
}

/// The single state a pass needs one resource in.
#[derive(Debug, Clone)]
pub struct Requirement {
    /// The resource.
    pub resource: Resource,
    /// The state it must be in.
    pub state: ResourceState,
    /// Whether it is a target or an input.
    pub role: RequirementRole,
}

/// A validated, immutable pass.
///
/// A pass is pure topology: it records what is written and read, never when. Any
/// number of batches can be recorded against it.
#[derive(Debug, Clone)]
pub struct Pass {
    id: PassId,
    label: Option<Arc<str>>,
    technique: Technique,
    feedback: FeedbackFlags,
    targets: Arc<PassTargets>,
    inputs: Arc<[PassInput]>,
    requirements: Arc<[Requirement]>,
    extent: Option<Extent3D>,
}

impl Pass {
    /// Builds a pass from validated parts. Called by devices after
    /// [`validate_pass`](crate::renderer::validation::validate_pass) produced the
    /// requirements.
    pub fn new(
        id: PassId,
        descriptor: PassDescriptor,
        targets: PassTargets,
        mut inputs: Vec<PassInput>,
        requirements: Vec<Requirement>,
    ) -> Self {
        inputs.sort_by_key(|input| input.slot);
        let extent = targets
            .colors
            .first()
            .map(|c| c.view.extent())
            .or_else(|| targets.depth.as_ref().map(|d| d.view.extent()));
        Self {
            id,
            label: descriptor.label.as_deref().map(Arc::from),
            technique: descriptor.technique,
            feedback: descriptor.feedback,
            targets: Arc::new(targets),
            inputs: inputs.into(),
            requirements: requirements.into(),
            extent,
        }
    }

    /// The handle of this pass.
    pub fn id(&self) -> PassId {
        self.id
    }

    /// The debug label given at creation.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The technique the pass executes.
    pub fn technique(&self) -> &Technique {
        &self.technique
    }

    /// Whether the pass draws or dispatches.
    pub fn kind(&self) -> TechniqueKind {
        self.technique.kind()
    }

    /// The feedback mechanisms the pass opted into.
    pub fn feedback(&self) -> FeedbackFlags {
        self.feedback
    }

    /// The targets written by the pass.
    pub fn targets(&self) -> &PassTargets {
        &self.targets
    }

    /// The inputs read by the pass, sorted by slot.
    pub fn inputs(&self) -> &[PassInput] {
        &self.inputs
    }

    /// One entry per referenced resource with the state the pass needs it in.
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// The requirements checked when the pass is bound.
    pub fn target_requirements(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.requirements
            .iter()
            .filter(|r| r.role == RequirementRole::Target)
    }

    /// Extent shared by every target, `None` for compute passes.
    pub fn extent(&self) -> Option<Extent3D> {
        self.extent
    }
}

impl PartialEq for Pass {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pass {}

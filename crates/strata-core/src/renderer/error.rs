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

//! Defines error types for the rendering hardware interface.
//!
//! This module provides a hierarchical set of error types. The top-level [`RhiError`]
//! is returned by every fallible operation; its variants wrap the more specific
//! [`ValidationError`], [`LayoutMismatchError`] and [`StateConflictError`].

use crate::math::Extent3D;
use crate::renderer::api::{
    core::{DeviceId, Entity, ResourceId},
    pipeline::{ShaderStage, SlotKind, TechniqueKind, VertexFormat},
    resource::{Format, ResourceState, ResourceUsage, ViewKind},
};
use thiserror::Error;

/// A descriptor or command violates an invariant of the object model.
///
/// Raised before any native call is made, identically on every backend. Each message
/// names the violated invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    // --- Resources ---
    /// A resource declared no usage.
    #[error("resource usage must not be empty")]
    EmptyUsage,
    /// A buffer has size zero.
    #[error("buffer size must be greater than zero")]
    ZeroSizedBuffer,
    /// A texture extent has a zero component.
    #[error("texture extent {0:?} must be non-zero in every dimension")]
    ZeroExtent(Extent3D),
    /// The texture dimension and extent disagree.
    #[error("texture extent {extent:?} is invalid for a {dimension} texture")]
    InvalidDimension {
        /// The dimension name.
        dimension: &'static str,
        /// The offending extent.
        extent: Extent3D,
    },
    /// The texture extent exceeds the device limits.
    #[error("texture extent {0:?} exceeds the limits of 16384 texels per side and 2048 layers")]
    ExtentTooLarge(Extent3D),
    /// The mip level count is zero or larger than the extent allows.
    #[error("mip level count {requested} must be between 1 and {max} for this extent")]
    MipLevelCount {
        /// The requested count.
        requested: u32,
        /// The maximum for the extent.
        max: u32,
    },
    /// The sample count is not a supported power of two.
    #[error("sample count {0} must be 1, 2, 4 or 8")]
    InvalidSampleCount(u32),
    /// The format cannot be combined with the declared usage.
    #[error("format {format:?} is incompatible with usage {usage:?}: {reason}")]
    IncompatibleFormatUsage {
        /// The format.
        format: Format,
        /// The usage.
        usage: ResourceUsage,
        /// The violated rule.
        reason: &'static str,
    },
    /// A uniform buffer size is not a multiple of 16 bytes.
    #[error("uniform buffer size {size} must be a multiple of 16")]
    UnalignedUniformBuffer {
        /// The requested size.
        size: u64,
    },
    /// Initial data does not cover the resource exactly.
    #[error("initial data is {actual} bytes but the resource holds exactly {expected}")]
    InitialDataSize {
        /// Packed size of the resource.
        expected: u64,
        /// Size of the provided data.
        actual: u64,
    },
    /// Initial data was given without `COPY_DST` usage.
    #[error("initial data requires COPY_DST usage")]
    InitialDataWithoutCopyDst,
    /// A transition targets a state the usage does not permit.
    #[error("state {state:?} is not permitted by usage {usage:?}")]
    StateNotAllowed {
        /// The requested state.
        state: ResourceState,
        /// The declared usage.
        usage: ResourceUsage,
    },
    /// A destroyed resource was used.
    #[error("{0} has been destroyed")]
    ReleasedResource(ResourceId),
    /// An entity of another device was used.
    #[error("{entity} belongs to {owner}, not to {expected}")]
    ForeignEntity {
        /// The entity.
        entity: Entity,
        /// The device that created it.
        owner: DeviceId,
        /// The device it was used with.
        expected: DeviceId,
    },

    // --- Views ---
    /// Views can only be created over textures.
    #[error("views can only be created over textures")]
    ViewOfBuffer,
    /// The view range is empty or outside the resource.
    #[error("subresource range (mips {base_mip}+{mip_count}, layers {base_layer}+{layer_count}) exceeds a resource with {mips} mips and {layers} layers")]
    SubresourceOutOfRange {
        /// First mip of the range.
        base_mip: u32,
        /// Mips in the range.
        mip_count: u32,
        /// First layer of the range.
        base_layer: u32,
        /// Layers in the range.
        layer_count: u32,
        /// Mips of the resource.
        mips: u32,
        /// Layers of the resource.
        layers: u32,
    },
    /// The resource's usage does not permit the view kind.
    #[error("a {kind:?} view requires {required:?} usage on the resource")]
    ViewUsageMissing {
        /// The view kind.
        kind: ViewKind,
        /// The missing usage.
        required: ResourceUsage,
    },
    /// Target and unordered-access views must select one mip level.
    #[error("a {0:?} view must select exactly one mip level")]
    ViewMipCount(ViewKind),
    /// The view format cannot reinterpret the resource format.
    #[error("view format {view:?} cannot reinterpret resource format {resource:?}")]
    ViewFormatMismatch {
        /// The view format.
        view: Format,
        /// The resource format.
        resource: Format,
    },

    // --- Layouts ---
    /// A slot index appears twice.
    #[error("slot index {0} is declared more than once; indices must be unique")]
    DuplicateSlot(u32),
    /// Slot indices have a gap.
    #[error("slot indices must be contiguous from zero: expected {expected}, found {found}")]
    NonContiguousSlots {
        /// The next expected index.
        expected: u32,
        /// The index found instead.
        found: u32,
    },
    /// A slot is visible to no stage.
    #[error("slot {0} must be visible to at least one shader stage")]
    InvisibleSlot(u32),

    // --- Techniques ---
    /// The technique has no stage program.
    #[error("a technique requires at least one stage program")]
    NoStages,
    /// A stage appears twice.
    #[error("stage {0:?} is declared more than once")]
    DuplicateStage(ShaderStage),
    /// The stage set is neither compute-only nor vertex with optional fragment.
    #[error("invalid stage combination: {0}")]
    InvalidStageCombination(&'static str),
    /// A stage program has no bytecode or entry point.
    #[error("stage {0:?} must have bytecode and an entry point")]
    EmptyStageProgram(ShaderStage),
    /// A color format cannot be rendered to.
    #[error("format {0:?} is not a color-renderable format")]
    NotColorRenderable(Format),
    /// A depth format is not a depth format.
    #[error("format {0:?} is not a depth format")]
    NotDepthFormat(Format),
    /// Depth/stencil state without a depth format.
    #[error("depth/stencil state requires a depth format")]
    MissingDepthFormat,
    /// More than eight color targets.
    #[error("at most 8 color targets are supported, got {0}")]
    TooManyColorTargets(usize),
    /// A render technique writes nothing.
    #[error("a render technique requires a color or depth format")]
    NoRenderTargets,
    /// A compute technique carries graphics state.
    #[error("a compute technique cannot declare targets or vertex buffers")]
    ComputeWithRenderState,
    /// A vertex buffer layout is malformed.
    #[error("vertex buffer layout {buffer}: {reason}")]
    InvalidVertexLayout {
        /// Index of the layout.
        buffer: usize,
        /// The violated rule.
        reason: &'static str,
    },

    // --- Meshes ---
    /// A mesh has no vertex stream.
    #[error("a mesh requires at least one vertex buffer")]
    EmptyMesh,
    /// A mesh buffer lacks the usage of its role.
    #[error("mesh buffer {resource} requires {required:?} usage")]
    MeshBufferUsage {
        /// The buffer.
        resource: ResourceId,
        /// The missing usage.
        required: ResourceUsage,
    },
    /// A mesh stream does not fit in its buffer.
    #[error("mesh buffer {resource} needs {required} bytes but holds {available}")]
    MeshBufferTooSmall {
        /// The buffer.
        resource: ResourceId,
        /// Bytes the stream needs.
        required: u64,
        /// Bytes the buffer holds.
        available: u64,
    },

    // --- Passes ---
    /// A render pass has no target.
    #[error("a render pass requires at least one target")]
    MissingTargets,
    /// A compute pass has targets.
    #[error("a compute pass cannot have targets")]
    ComputeWithTargets,
    /// The number of color targets differs from the technique.
    #[error("the technique renders {expected} color targets, {actual} were given")]
    ColorTargetCount {
        /// Color formats of the technique.
        expected: usize,
        /// Color targets given.
        actual: usize,
    },
    /// A target format differs from the technique.
    #[error("target {index:?} has format {actual:?}, the technique expects {expected:?}")]
    TargetFormatMismatch {
        /// Target index, `None` for the depth target.
        index: Option<usize>,
        /// Format expected by the technique.
        expected: Option<Format>,
        /// Format of the view.
        actual: Option<Format>,
    },
    /// A target sample count differs from the technique.
    #[error("target sample count {actual} differs from the technique's {expected}")]
    TargetSampleCount {
        /// Sample count of the technique.
        expected: u32,
        /// Sample count of the view.
        actual: u32,
    },
    /// Targets have different extents.
    #[error("every target must share one extent: {first:?} vs {other:?}")]
    TargetExtentMismatch {
        /// Extent of the first target.
        first: Extent3D,
        /// The differing extent.
        other: Extent3D,
    },
    /// A view of the wrong kind was used.
    #[error("a {actual:?} view cannot be used as {role}")]
    ViewKindMismatch {
        /// Where the view was used.
        role: &'static str,
        /// The view kind.
        actual: ViewKind,
    },
    /// The view's resource no longer exists.
    #[error("the resource behind a view of {0} no longer exists")]
    DanglingView(ResourceId),
    /// A layout slot has no binding.
    #[error("layout slot {0} is not bound; every slot must be bound exactly once")]
    UnboundSlot(u32),
    /// A layout slot is bound twice.
    #[error("layout slot {0} is bound more than once")]
    SlotBoundTwice(u32),
    /// A binding names a slot the layout lacks.
    #[error("slot {0} does not exist in the technique's layout")]
    UnknownSlot(u32),
    /// A binding does not fit its slot.
    #[error("slot {slot} expects {expected:?}: {reason}")]
    BindingMismatch {
        /// The slot.
        slot: u32,
        /// The slot kind.
        expected: SlotKind,
        /// The violated rule.
        reason: &'static str,
    },
    /// A buffer binding range exceeds the buffer.
    #[error("binding range {offset}+{size} exceeds buffer {resource} of {available} bytes")]
    BindingOutOfRange {
        /// The buffer.
        resource: ResourceId,
        /// Offset of the range.
        offset: u64,
        /// Size of the range.
        size: u64,
        /// Bytes in the buffer.
        available: u64,
    },
    /// A resource is written and read by the same pass.
    #[error("{0} is both a write target and a read input of the pass (feedback loop)")]
    FeedbackLoop(ResourceId),
    /// A resource is written twice by the same pass.
    #[error("{0} is written by more than one binding of the pass")]
    DuplicateWrite(ResourceId),
    /// A resource is read in two incompatible states.
    #[error("{resource} is read both as {first:?} and {second:?} by the pass")]
    ConflictingReads {
        /// The resource.
        resource: ResourceId,
        /// The first state.
        first: ResourceState,
        /// The second state.
        second: ResourceState,
    },

    // --- Batches ---
    /// A draw or dispatch without a pass.
    #[error("no pass is bound")]
    NoPassBound,
    /// A draw on a compute pass or a dispatch on a render pass.
    #[error("the bound pass is a {bound:?} pass, the command requires a {required:?} pass")]
    PassKindMismatch {
        /// Kind of the bound pass.
        bound: TechniqueKind,
        /// Kind the command needs.
        required: TechniqueKind,
    },
    /// A plain draw on a technique that reads vertex buffers.
    #[error("the technique reads vertex buffers; use draw_mesh")]
    MissingVertexBuffers,
    /// A mesh's streams differ from the technique's vertex layouts.
    #[error("mesh vertex streams do not match the technique's vertex buffer layouts")]
    MeshLayoutMismatch,
    /// A copy is malformed.
    #[error("invalid copy: {0}")]
    InvalidCopy(&'static str),
    /// A copy region exceeds its resource.
    #[error("copy region exceeds {0}")]
    CopyOutOfBounds(ResourceId),
    /// A buffer update is malformed.
    #[error("buffer updates must be non-empty, 4-byte aligned and at most 65536 bytes")]
    InvalidUpdate,
    /// An unfinished batch was submitted.
    #[error("only finished batches can be submitted")]
    UnfinishedBatch,
    /// A batch was submitted to a device other than the one that created it.
    #[error("batch recorded for {owner} cannot be submitted to {expected}")]
    ForeignBatch {
        /// The device the batch was recorded for.
        owner: DeviceId,
        /// The device it was submitted to.
        expected: DeviceId,
    },
}

/// Why a stage program does not fit a layout.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MismatchReason {
    /// The stage accesses a slot the layout lacks.
    #[error("slot {0} is not declared by the layout")]
    MissingSlot(u32),
    /// The stage expects a different resource kind.
    #[error("slot {slot} is {declared:?} in the layout but the stage expects {expected:?}")]
    SlotKind {
        /// The slot.
        slot: u32,
        /// Kind declared by the layout.
        declared: SlotKind,
        /// Kind expected by the stage.
        expected: SlotKind,
    },
    /// The layout hides the slot from the stage.
    #[error("slot {0} is not visible to the stage")]
    NotVisible(u32),
    /// No vertex buffer provides an input.
    #[error("vertex input location {0} is not provided by any vertex buffer")]
    MissingVertexInput(u32),
    /// A vertex input has a different format.
    #[error("vertex input location {location} is {provided:?} but the stage reads {expected:?}")]
    VertexInputFormat {
        /// The location.
        location: u32,
        /// Format the vertex buffers provide.
        provided: VertexFormat,
        /// Format the stage reads.
        expected: VertexFormat,
    },
    /// The stage writes more colors than there are targets.
    #[error("the stage writes {outputs} color outputs but the technique has {targets} color targets")]
    ColorOutputs {
        /// Outputs written by the stage.
        outputs: u32,
        /// Color targets of the technique.
        targets: usize,
    },
}

/// A technique's stage programs are incompatible with its layout.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("technique '{technique}', {stage:?} stage: {reason}")]
pub struct LayoutMismatchError {
    /// Label of the technique, or `<unnamed>`.
    pub technique: String,
    /// The offending stage.
    pub stage: ShaderStage,
    /// What does not match.
    pub reason: MismatchReason,
}

/// A command requires a resource state that no earlier barrier of the batch
/// established.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{resource} must be in {required:?} but the batch established {established:?}")]
pub struct StateConflictError {
    /// The resource.
    pub resource: ResourceId,
    /// The state the command needs.
    pub required: ResourceState,
    /// The state the batch established, `None` if no barrier touched the resource.
    pub established: Option<ResourceState>,
}

/// The top-level error returned by every fallible operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RhiError {
    /// A descriptor or command violates an invariant. Never reaches the backend.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// A technique does not fit its layout.
    #[error("layout mismatch: {0}")]
    LayoutMismatch(#[from] LayoutMismatchError),
    /// A command needs a state the batch did not establish.
    #[error("state conflict: {0}")]
    StateConflict(#[from] StateConflictError),
    /// A command was appended to a finished batch.
    #[error("cannot append commands to a finished batch")]
    AppendAfterFinish,
    /// The GPU context is unrecoverable; the device must be recreated.
    #[error("the device was lost and must be recreated")]
    DeviceLost,
    /// An allocation failed. The caller may free resources and retry.
    #[error("out of GPU memory allocating {requested} bytes")]
    OutOfMemory {
        /// Size of the failed allocation.
        requested: u64,
    },
    /// A handle does not name a live entity of the device.
    #[error("{0} does not exist on this device")]
    NotFound(Entity),
    /// The device has been shut down.
    #[error("the device has been shut down")]
    DeviceShutDown,
    /// Shutdown found work the GPU has not finished. Nothing was released.
    #[error("submission #{pending} has not completed, the device stays open")]
    SubmissionsPending {
        /// The last submission handed to the GPU.
        pending: u64,
    },
    /// The native API failed in an unexpected way.
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_violated_invariant() {
        let err = RhiError::from(ValidationError::NonContiguousSlots {
            expected: 1,
            found: 2,
        });
        let message = err.to_string();
        assert!(message.contains("contiguous from zero"), "{message}");
    }

    #[test]
    fn state_conflict_reports_missing_establishment() {
        let err = StateConflictError {
            resource: ResourceId::new(DeviceId(4), 2),
            required: ResourceState::RenderTarget,
            established: None,
        };
        assert_eq!(
            err.to_string(),
            "resource#2@device4 must be in RenderTarget but the batch established None"
        );
    }

    #[test]
    fn target_mismatch_names_the_depth_target() {
        let err = ValidationError::TargetFormatMismatch {
            index: None,
            expected: Some(Format::Depth32Float),
            actual: None,
        };
        assert_eq!(
            err.to_string(),
            "target None has format None, the technique expects Some(Depth32Float)"
        );
    }
}

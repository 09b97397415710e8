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

//! Backend-independent validation of descriptors and commands.
//!
//! Every device runs these checks before touching its native API, which is what makes
//! both backends reject the same inputs with the same errors.

use crate::renderer::api::{
    command::{
        BufferCopy, FeedbackFlags, InputBinding, PassDescriptor, PassInput, PassTargets,
        Requirement, RequirementRole, TextureCopy,
    },
    core::{DeviceId, Entity},
    pipeline::{
        Layout, LayoutDescriptor, MeshDescriptor, ShaderStage, SlotDescriptor, SlotKind,
        TechniqueDescriptor, TechniqueKind, VertexBufferLayout, VertexStepMode,
    },
    resource::{
        Format, Resource, ResourceDescriptor, ResourceKind, ResourceState, ResourceUsage,
        SubresourceRange, TextureDimension, View, ViewKind,
    },
};
use crate::renderer::error::{LayoutMismatchError, MismatchReason, RhiError, ValidationError};

/// Maximum number of color targets of a technique.
pub const MAX_COLOR_TARGETS: usize = 8;

/// Maximum width, height or depth of a texture.
pub const MAX_TEXTURE_DIMENSION: u32 = 16384;

/// Maximum array layer count of a texture.
pub const MAX_TEXTURE_LAYERS: u32 = 2048;

/// Maximum size of an inline buffer update.
pub const MAX_UPDATE_SIZE: u64 = 65536;

/// Required alignment of uniform buffer binding offsets.
pub const UNIFORM_OFFSET_ALIGNMENT: u64 = 256;

/// Fails unless `entity` was created by `device`.
pub fn ensure_device(device: DeviceId, entity: impl Into<Entity>) -> Result<(), RhiError> {
    let entity = entity.into();
    if entity.device() == device {
        Ok(())
    } else {
        Err(ValidationError::ForeignEntity {
            entity,
            owner: entity.device(),
            expected: device,
        }
        .into())
    }
}

fn incompatible(format: Format, usage: ResourceUsage, reason: &'static str) -> RhiError {
    ValidationError::IncompatibleFormatUsage {
        format,
        usage,
        reason,
    }
    .into()
}

/// Checks the format, usage and geometry of a resource descriptor.
pub fn validate_resource(desc: &ResourceDescriptor) -> Result<(), RhiError> {
    let usage = desc.usage;
    let format = desc.format;
    if usage.is_empty() {
        return Err(ValidationError::EmptyUsage.into());
    }

    match desc.kind {
        ResourceKind::Buffer { size } => {
            if size == 0 {
                return Err(ValidationError::ZeroSizedBuffer.into());
            }
            if format != Format::Undefined {
                return Err(incompatible(format, usage, "buffers carry no texel format"));
            }
            if usage.intersects(ResourceUsage::TEXTURE_ONLY) {
                return Err(incompatible(
                    format,
                    usage,
                    "render target, depth and present usages require a texture",
                ));
            }
            if usage.contains(ResourceUsage::UNIFORM) {
                if usage.intersects(
                    ResourceUsage::VERTEX | ResourceUsage::INDEX | ResourceUsage::SHADER_WRITE,
                ) {
                    return Err(incompatible(
                        format,
                        usage,
                        "uniform buffers cannot also be vertex, index or writable buffers",
                    ));
                }
                if size % 16 != 0 {
                    return Err(ValidationError::UnalignedUniformBuffer { size }.into());
                }
            }
        }
        ResourceKind::Texture {
            dimension,
            extent,
            mip_level_count,
            sample_count,
        } => {
            if format == Format::Undefined {
                return Err(incompatible(format, usage, "textures require a texel format"));
            }
            if usage.intersects(ResourceUsage::BUFFER_ONLY) {
                return Err(incompatible(
                    format,
                    usage,
                    "vertex, index and uniform usages require a buffer",
                ));
            }
            if extent.is_empty() {
                return Err(ValidationError::ZeroExtent(extent).into());
            }
            if dimension == TextureDimension::D1 && extent.height != 1 {
                return Err(ValidationError::InvalidDimension {
                    dimension: "1D",
                    extent,
                }
                .into());
            }
            if extent.width > MAX_TEXTURE_DIMENSION
                || extent.height > MAX_TEXTURE_DIMENSION
                || extent.depth_or_array_layers > MAX_TEXTURE_LAYERS
            {
                return Err(ValidationError::ExtentTooLarge(extent).into());
            }
            if !matches!(sample_count, 1 | 2 | 4 | 8) {
                return Err(ValidationError::InvalidSampleCount(sample_count).into());
            }
            let max = extent.max_mip_levels(dimension == TextureDimension::D3);
            if mip_level_count == 0 || mip_level_count > max {
                return Err(ValidationError::MipLevelCount {
                    requested: mip_level_count,
                    max,
                }
                .into());
            }
            if sample_count > 1 {
                if dimension != TextureDimension::D2 || mip_level_count != 1 {
                    return Err(incompatible(
                        format,
                        usage,
                        "multisampled textures must be 2D with a single mip level",
                    ));
                }
                if usage.contains(ResourceUsage::SHADER_WRITE) {
                    return Err(incompatible(
                        format,
                        usage,
                        "multisampled textures cannot be written by shaders",
                    ));
                }
            }
            if usage.contains(ResourceUsage::DEPTH_STENCIL) && !format.is_depth() {
                return Err(incompatible(format, usage, "depth usage requires a depth format"));
            }
            if format.is_depth() {
                let allowed = ResourceUsage::DEPTH_STENCIL
                    | ResourceUsage::SHADER_READ
                    | ResourceUsage::COPY_SRC
                    | ResourceUsage::COPY_DST;
                if !allowed.contains(usage) {
                    return Err(incompatible(
                        format,
                        usage,
                        "depth formats only support depth, shader-read and copy usages",
                    ));
                }
                if dimension == TextureDimension::D3 {
                    return Err(incompatible(
                        format,
                        usage,
                        "depth textures cannot be volumetric",
                    ));
                }
            }
            if usage.contains(ResourceUsage::RENDER_TARGET) && !format.is_color() {
                return Err(incompatible(
                    format,
                    usage,
                    "render target usage requires a color-renderable format",
                ));
            }
            if usage.contains(ResourceUsage::SHADER_WRITE) && !format.supports_storage() {
                return Err(incompatible(
                    format,
                    usage,
                    "shader-write usage requires a storage-capable format",
                ));
            }
        }
    }

    if let Some(data) = &desc.initial_data {
        if !usage.contains(ResourceUsage::COPY_DST) {
            return Err(ValidationError::InitialDataWithoutCopyDst.into());
        }
        let expected = desc.byte_size();
        if data.len() as u64 != expected {
            return Err(ValidationError::InitialDataSize {
                expected,
                actual: data.len() as u64,
            }
            .into());
        }
    }
    Ok(())
}

/// Checks that a view of `range` as `kind` with `format` is valid for `resource`.
pub fn validate_view(
    resource: &Resource,
    range: &SubresourceRange,
    kind: ViewKind,
    format: Format,
) -> Result<(), RhiError> {
    if resource.is_buffer() {
        return Err(ValidationError::ViewOfBuffer.into());
    }
    if resource.is_released() {
        return Err(ValidationError::ReleasedResource(resource.id()).into());
    }
    let mips = resource.kind().mip_level_count();
    let layers = resource.kind().array_layer_count();
    let mip_end = range.base_mip_level.checked_add(range.mip_level_count);
    let layer_end = range.base_array_layer.checked_add(range.array_layer_count);
    if range.is_empty()
        || mip_end.map_or(true, |end| end > mips)
        || layer_end.map_or(true, |end| end > layers)
    {
        return Err(ValidationError::SubresourceOutOfRange {
            base_mip: range.base_mip_level,
            mip_count: range.mip_level_count,
            base_layer: range.base_array_layer,
            layer_count: range.array_layer_count,
            mips,
            layers,
        }
        .into());
    }
    let required = kind.required_usage();
    if !resource.usage().contains(required) {
        return Err(ValidationError::ViewUsageMissing { kind, required }.into());
    }
    if kind.is_single_mip() && range.mip_level_count != 1 {
        return Err(ValidationError::ViewMipCount(kind).into());
    }
    if !format.is_view_compatible(resource.format()) {
        return Err(ValidationError::ViewFormatMismatch {
            view: format,
            resource: resource.format(),
        }
        .into());
    }
    Ok(())
}

/// Checks a layout descriptor and returns its slots sorted by index.
pub fn validate_layout(desc: &LayoutDescriptor) -> Result<Vec<SlotDescriptor>, RhiError> {
    let mut slots = desc.slots.clone();
    slots.sort_by_key(|slot| slot.index);
    for (position, slot) in slots.iter().enumerate() {
        let expected = position as u32;
        if slot.index != expected {
            if position > 0 && slots[position - 1].index == slot.index {
                return Err(ValidationError::DuplicateSlot(slot.index).into());
            }
            return Err(ValidationError::NonContiguousSlots {
                expected,
                found: slot.index,
            }
            .into());
        }
        if slot.visibility.is_empty() {
            return Err(ValidationError::InvisibleSlot(slot.index).into());
        }
    }
    Ok(slots)
}

fn validate_vertex_layouts(layouts: &[VertexBufferLayout]) -> Result<(), RhiError> {
    let mut locations = Vec::new();
    for (buffer, layout) in layouts.iter().enumerate() {
        let invalid = |reason| ValidationError::InvalidVertexLayout { buffer, reason };
        if layout.stride == 0 {
            return Err(invalid("stride must be greater than zero").into());
        }
        if layout.stride % 4 != 0 {
            return Err(invalid("stride must be a multiple of 4").into());
        }
        for attribute in &layout.attributes {
            let end = attribute.offset.checked_add(attribute.format.size());
            if end.map_or(true, |end| end > layout.stride) {
                return Err(invalid("attribute extends past the stride").into());
            }
            if locations.contains(&attribute.location) {
                return Err(invalid("attribute location is declared twice").into());
            }
            locations.push(attribute.location);
        }
    }
    Ok(())
}

/// Checks the structure of a technique descriptor on its own.
pub fn validate_technique(desc: &TechniqueDescriptor) -> Result<(), RhiError> {
    if desc.stages.is_empty() {
        return Err(ValidationError::NoStages.into());
    }
    let mut seen = Vec::with_capacity(desc.stages.len());
    for program in &desc.stages {
        if seen.contains(&program.stage) {
            return Err(ValidationError::DuplicateStage(program.stage).into());
        }
        seen.push(program.stage);
        if program.bytecode.is_empty() || program.entry_point.is_empty() {
            return Err(ValidationError::EmptyStageProgram(program.stage).into());
        }
    }
    let has = |stage| seen.contains(&stage);
    if has(ShaderStage::Compute) && seen.len() > 1 {
        return Err(ValidationError::InvalidStageCombination(
            "compute cannot be combined with graphics stages",
        )
        .into());
    }
    if has(ShaderStage::Fragment) && !has(ShaderStage::Vertex) {
        return Err(
            ValidationError::InvalidStageCombination("a fragment stage requires a vertex stage")
                .into(),
        );
    }
    if !matches!(desc.sample_count, 1 | 2 | 4 | 8) {
        return Err(ValidationError::InvalidSampleCount(desc.sample_count).into());
    }

    match desc.kind() {
        TechniqueKind::Compute => {
            if !desc.color_formats.is_empty()
                || desc.depth_format.is_some()
                || desc.depth_stencil.is_some()
                || !desc.vertex_buffers.is_empty()
            {
                return Err(ValidationError::ComputeWithRenderState.into());
            }
        }
        TechniqueKind::Render => {
            if desc.color_formats.len() > MAX_COLOR_TARGETS {
                return Err(ValidationError::TooManyColorTargets(desc.color_formats.len()).into());
            }
            if desc.color_formats.is_empty() && desc.depth_format.is_none() {
                return Err(ValidationError::NoRenderTargets.into());
            }
            if let Some(format) = desc.color_formats.iter().find(|f| !f.is_color()) {
                return Err(ValidationError::NotColorRenderable(*format).into());
            }
            match desc.depth_format {
                Some(format) if !format.is_depth() => {
                    return Err(ValidationError::NotDepthFormat(format).into());
                }
                None if desc.depth_stencil.is_some() => {
                    return Err(ValidationError::MissingDepthFormat.into());
                }
                _ => {}
            }
            validate_vertex_layouts(&desc.vertex_buffers)?;
        }
    }
    Ok(())
}

/// Checks every stage's reflected interface against `layout`.
///
/// # Errors
///
/// Returns [`RhiError::LayoutMismatch`] on the first incompatibility.
pub fn check_technique_layout(desc: &TechniqueDescriptor, layout: &Layout) -> Result<(), RhiError> {
    let mismatch = |stage, reason| -> RhiError {
        LayoutMismatchError {
            technique: desc.label.clone().unwrap_or_else(|| "<unnamed>".to_owned()),
            stage,
            reason,
        }
        .into()
    };
    for program in &desc.stages {
        let stage = program.stage;
        for required in &program.interface.slots {
            let Some(slot) = layout.slot_at(required.index) else {
                return Err(mismatch(stage, MismatchReason::MissingSlot(required.index)));
            };
            if slot.kind != required.kind {
                return Err(mismatch(
                    stage,
                    MismatchReason::SlotKind {
                        slot: slot.index,
                        declared: slot.kind,
                        expected: required.kind,
                    },
                ));
            }
            if !slot.visibility.contains(stage.flag()) {
                return Err(mismatch(stage, MismatchReason::NotVisible(slot.index)));
            }
        }
        match stage {
            ShaderStage::Vertex => {
                for input in &program.interface.vertex_inputs {
                    let provided = desc
                        .vertex_buffers
                        .iter()
                        .flat_map(|buffer| buffer.attributes.iter())
                        .find(|attribute| attribute.location == input.location);
                    match provided {
                        None => {
                            return Err(mismatch(
                                stage,
                                MismatchReason::MissingVertexInput(input.location),
                            ))
                        }
                        Some(attribute) if attribute.format != input.format => {
                            return Err(mismatch(
                                stage,
                                MismatchReason::VertexInputFormat {
                                    location: input.location,
                                    provided: attribute.format,
                                    expected: input.format,
                                },
                            ))
                        }
                        Some(_) => {}
                    }
                }
            }
            ShaderStage::Fragment => {
                let outputs = program.interface.color_outputs;
                if outputs as usize > desc.color_formats.len() {
                    return Err(mismatch(
                        stage,
                        MismatchReason::ColorOutputs {
                            outputs,
                            targets: desc.color_formats.len(),
                        },
                    ));
                }
            }
            ShaderStage::Compute => {}
        }
    }
    Ok(())
}

/// Checks the buffers and streams of a mesh descriptor.
pub fn validate_mesh(desc: &MeshDescriptor) -> Result<(), RhiError> {
    if desc.vertex_buffers.is_empty() {
        return Err(ValidationError::EmptyMesh.into());
    }
    let layouts: Vec<_> = desc.vertex_buffers.iter().map(|b| b.layout.clone()).collect();
    validate_vertex_layouts(&layouts)?;
    for buffer in &desc.vertex_buffers {
        let resource = &buffer.resource;
        if resource.is_released() {
            return Err(ValidationError::ReleasedResource(resource.id()).into());
        }
        if !resource.is_buffer() || !resource.usage().contains(ResourceUsage::VERTEX) {
            return Err(ValidationError::MeshBufferUsage {
                resource: resource.id(),
                required: ResourceUsage::VERTEX,
            }
            .into());
        }
        if buffer.layout.step_mode == VertexStepMode::Vertex {
            let required = buffer
                .layout
                .stride
                .checked_mul(desc.vertex_count as u64)
                .and_then(|bytes| bytes.checked_add(buffer.offset))
                .unwrap_or(u64::MAX);
            if required > resource.byte_size() {
                return Err(ValidationError::MeshBufferTooSmall {
                    resource: resource.id(),
                    required,
                    available: resource.byte_size(),
                }
                .into());
            }
        }
    }
    if let Some(index) = &desc.index_buffer {
        let resource = &index.resource;
        if resource.is_released() {
            return Err(ValidationError::ReleasedResource(resource.id()).into());
        }
        if !resource.is_buffer() || !resource.usage().contains(ResourceUsage::INDEX) {
            return Err(ValidationError::MeshBufferUsage {
                resource: resource.id(),
                required: ResourceUsage::INDEX,
            }
            .into());
        }
        let required = index
            .format
            .size()
            .checked_mul(index.count as u64)
            .and_then(|bytes| bytes.checked_add(index.offset))
            .unwrap_or(u64::MAX);
        if index.offset % index.format.size() != 0 || required > resource.byte_size() {
            return Err(ValidationError::MeshBufferTooSmall {
                resource: resource.id(),
                required,
                available: resource.byte_size(),
            }
            .into());
        }
    }
    Ok(())
}

/// One way a pass touches a resource.
struct Access {
    resource: Resource,
    state: ResourceState,
    target: bool,
}

fn live_resource(view: &View) -> Result<Resource, RhiError> {
    let resource = view
        .resource()
        .ok_or(ValidationError::DanglingView(view.resource_id()))?;
    if resource.is_released() {
        return Err(ValidationError::ReleasedResource(resource.id()).into());
    }
    Ok(resource)
}

/// Checks a pass against its technique and layout, and returns the state the pass
/// needs each referenced resource in.
///
/// Overlap is tracked per resource. A resource written by one binding and read or
/// written by another is rejected unless `desc.feedback` opts into the mechanism that
/// makes the overlap safe.
pub fn validate_pass(
    desc: &PassDescriptor,
    targets: &PassTargets,
    inputs: &[PassInput],
) -> Result<Vec<Requirement>, RhiError> {
    let technique = &desc.technique;
    let layout = technique.layout();
    let tdesc = technique.descriptor();
    let mut accesses: Vec<Access> = Vec::new();

    match technique.kind() {
        TechniqueKind::Compute if !targets.is_empty() => {
            return Err(ValidationError::ComputeWithTargets.into());
        }
        TechniqueKind::Render if targets.is_empty() => {
            return Err(ValidationError::MissingTargets.into());
        }
        _ => {}
    }

    if technique.kind() == TechniqueKind::Render {
        if targets.colors.len() != tdesc.color_formats.len() {
            return Err(ValidationError::ColorTargetCount {
                expected: tdesc.color_formats.len(),
                actual: targets.colors.len(),
            }
            .into());
        }
        let mut extent = None;
        let mut check_common = |view: &View| {
            if view.sample_count() != tdesc.sample_count {
                return Err(RhiError::from(ValidationError::TargetSampleCount {
                    expected: tdesc.sample_count,
                    actual: view.sample_count(),
                }));
            }
            match extent {
                None => extent = Some(view.extent()),
                Some(first) if first != view.extent() => {
                    return Err(ValidationError::TargetExtentMismatch {
                        first,
                        other: view.extent(),
                    }
                    .into())
                }
                Some(_) => {}
            }
            Ok(())
        };
        for (index, (target, format)) in targets.colors.iter().zip(&tdesc.color_formats).enumerate()
        {
            let view = &target.view;
            if view.kind() != ViewKind::RenderTarget {
                return Err(ValidationError::ViewKindMismatch {
                    role: "a color target",
                    actual: view.kind(),
                }
                .into());
            }
            if view.format() != *format {
                return Err(ValidationError::TargetFormatMismatch {
                    index: Some(index),
                    expected: Some(*format),
                    actual: Some(view.format()),
                }
                .into());
            }
            check_common(view)?;
            accesses.push(Access {
                resource: live_resource(view)?,
                state: ResourceState::RenderTarget,
                target: true,
            });
        }
        match (&targets.depth, tdesc.depth_format) {
            (Some(depth), Some(format)) => {
                let view = &depth.view;
                let state = match view.kind() {
                    ViewKind::DepthTarget => ResourceState::DepthWrite,
                    ViewKind::ReadOnlyDepth => {
                        if tdesc.depth_stencil.is_some_and(|ds| ds.writes()) {
                            return Err(ValidationError::ViewKindMismatch {
                                role: "the target of a depth-writing technique",
                                actual: view.kind(),
                            }
                            .into());
                        }
                        ResourceState::DepthRead
                    }
                    other => {
                        return Err(ValidationError::ViewKindMismatch {
                            role: "a depth target",
                            actual: other,
                        }
                        .into())
                    }
                };
                if view.format() != format {
                    return Err(ValidationError::TargetFormatMismatch {
                        index: None,
                        expected: Some(format),
                        actual: Some(view.format()),
                    }
                    .into());
                }
                check_common(view)?;
                accesses.push(Access {
                    resource: live_resource(view)?,
                    state,
                    target: true,
                });
            }
            (None, None) => {}
            (depth, expected) => {
                return Err(ValidationError::TargetFormatMismatch {
                    index: None,
                    expected,
                    actual: depth.as_ref().map(|d| d.view.format()),
                }
                .into());
            }
        }
    }

    let mut bound = vec![false; layout.slot_count()];
    for input in inputs {
        let slot = layout
            .slot_at(input.slot)
            .ok_or(ValidationError::UnknownSlot(input.slot))?;
        if std::mem::replace(&mut bound[input.slot as usize], true) {
            return Err(ValidationError::SlotBoundTwice(input.slot).into());
        }
        let mismatch = |reason| -> RhiError {
            ValidationError::BindingMismatch {
                slot: slot.index,
                expected: slot.kind,
                reason,
            }
            .into()
        };
        let resource = match (&input.binding, slot.kind) {
            (
                InputBinding::Buffer {
                    resource,
                    offset,
                    size,
                },
                kind,
            ) if kind.is_buffer() => {
                if !resource.is_buffer() {
                    return Err(mismatch("a buffer is required"));
                }
                if resource.is_released() {
                    return Err(ValidationError::ReleasedResource(resource.id()).into());
                }
                if !resource.usage().contains(kind.required_usage()) {
                    return Err(mismatch("the buffer lacks the usage of the slot"));
                }
                let available = resource.byte_size();
                let size = size.unwrap_or_else(|| available.saturating_sub(*offset));
                if size == 0 || offset.saturating_add(size) > available {
                    return Err(ValidationError::BindingOutOfRange {
                        resource: resource.id(),
                        offset: *offset,
                        size,
                        available,
                    }
                    .into());
                }
                if kind == SlotKind::UniformBuffer && offset % UNIFORM_OFFSET_ALIGNMENT != 0 {
                    return Err(mismatch("uniform buffer offsets must be 256-byte aligned"));
                }
                resource.clone()
            }
            (InputBinding::View(view), SlotKind::SampledTexture) => {
                if view.kind() != ViewKind::ShaderResource {
                    return Err(mismatch("a shader-resource view is required"));
                }
                live_resource(view)?
            }
            (InputBinding::View(view), SlotKind::StorageTexture) => {
                if view.kind() != ViewKind::UnorderedAccess {
                    return Err(mismatch("an unordered-access view is required"));
                }
                live_resource(view)?
            }
            _ => return Err(mismatch("the binding type does not match the slot kind")),
        };
        accesses.push(Access {
            resource,
            state: slot.kind.required_state(),
            target: false,
        });
    }
    if let Some(unbound) = bound.iter().position(|b| !b) {
        return Err(ValidationError::UnboundSlot(unbound as u32).into());
    }

    resolve_overlaps(accesses, desc.feedback)
}

fn resolve_overlaps(
    accesses: Vec<Access>,
    feedback: FeedbackFlags,
) -> Result<Vec<Requirement>, RhiError> {
    let mut groups: Vec<Vec<Access>> = Vec::new();
    for access in accesses {
        match groups
            .iter_mut()
            .find(|group| group[0].resource.id() == access.resource.id())
        {
            Some(group) => group.push(access),
            None => groups.push(vec![access]),
        }
    }

    let mut requirements = Vec::with_capacity(groups.len());
    for group in groups {
        let id = group[0].resource.id();
        let is_target = group.iter().any(|a| a.target);
        let role = if is_target {
            RequirementRole::Target
        } else {
            RequirementRole::Input
        };
        let state = if group.len() == 1 {
            group[0].state
        } else if group.iter().all(|a| !a.target && a.state == ResourceState::ShaderWrite) {
            if !feedback.contains(FeedbackFlags::UNORDERED_ALIAS) {
                return Err(ValidationError::DuplicateWrite(id).into());
            }
            ResourceState::ShaderWrite
        } else if group
            .iter()
            .any(|a| a.target && a.state == ResourceState::DepthRead)
        {
            let only_sampled = group
                .iter()
                .all(|a| a.state == ResourceState::DepthRead || a.state == ResourceState::ShaderRead);
            let single_target = group.iter().filter(|a| a.target).count() == 1;
            if !only_sampled || !single_target || !feedback.contains(FeedbackFlags::READ_ONLY_DEPTH)
            {
                return Err(ValidationError::FeedbackLoop(id).into());
            }
            ResourceState::DepthRead
        } else if group.iter().any(|a| a.target || a.state.is_write()) {
            let all_write = group.iter().all(|a| a.target || a.state.is_write());
            return Err(if all_write {
                ValidationError::DuplicateWrite(id)
            } else {
                ValidationError::FeedbackLoop(id)
            }
            .into());
        } else {
            let first = group[0].state;
            if let Some(other) = group.iter().find(|a| a.state != first) {
                return Err(ValidationError::ConflictingReads {
                    resource: id,
                    first,
                    second: other.state,
                }
                .into());
            }
            first
        };
        requirements.push(Requirement {
            resource: group[0].resource.clone(),
            state,
            role,
        });
    }
    Ok(requirements)
}

/// Checks a buffer-to-buffer copy.
pub fn validate_buffer_copy(copy: &BufferCopy) -> Result<(), RhiError> {
    if !copy.src.is_buffer() || !copy.dst.is_buffer() {
        return Err(ValidationError::InvalidCopy("buffer copies require two buffers").into());
    }
    if copy.src == copy.dst {
        return Err(
            ValidationError::InvalidCopy("source and destination must be different resources")
                .into(),
        );
    }
    check_copy_usages(&copy.src, &copy.dst)?;
    if copy.size == 0 || copy.size % 4 != 0 || copy.src_offset % 4 != 0 || copy.dst_offset % 4 != 0
    {
        return Err(ValidationError::InvalidCopy(
            "copy size and offsets must be non-zero multiples of 4",
        )
        .into());
    }
    for (resource, offset) in [(&copy.src, copy.src_offset), (&copy.dst, copy.dst_offset)] {
        if offset.saturating_add(copy.size) > resource.byte_size() {
            return Err(ValidationError::CopyOutOfBounds(resource.id()).into());
        }
    }
    Ok(())
}

fn check_copy_usages(src: &Resource, dst: &Resource) -> Result<(), RhiError> {
    for resource in [src, dst] {
        if resource.is_released() {
            return Err(ValidationError::ReleasedResource(resource.id()).into());
        }
    }
    if !src.usage().contains(ResourceUsage::COPY_SRC) {
        return Err(ValidationError::StateNotAllowed {
            state: ResourceState::CopySrc,
            usage: src.usage(),
        }
        .into());
    }
    if !dst.usage().contains(ResourceUsage::COPY_DST) {
        return Err(ValidationError::StateNotAllowed {
            state: ResourceState::CopyDst,
            usage: dst.usage(),
        }
        .into());
    }
    Ok(())
}

/// Checks a texture-to-texture copy.
pub fn validate_texture_copy(copy: &TextureCopy) -> Result<(), RhiError> {
    let (src, dst) = (&copy.src.resource, &copy.dst.resource);
    if !src.is_texture() || !dst.is_texture() {
        return Err(ValidationError::InvalidCopy("texture copies require two textures").into());
    }
    if src == dst {
        return Err(
            ValidationError::InvalidCopy("source and destination must be different resources")
                .into(),
        );
    }
    check_copy_usages(src, dst)?;
    if !src.format().is_view_compatible(dst.format()) {
        return Err(ValidationError::InvalidCopy("texel formats must match").into());
    }
    if src.kind().sample_count() != 1 || dst.kind().sample_count() != 1 {
        return Err(ValidationError::InvalidCopy("multisampled textures cannot be copied").into());
    }
    if copy.extent.is_empty() {
        return Err(ValidationError::InvalidCopy("copy extent must not be empty").into());
    }
    for region in [&copy.src, &copy.dst] {
        let resource = &region.resource;
        let out_of_bounds = || -> RhiError { ValidationError::CopyOutOfBounds(resource.id()).into() };
        if region.array_layer >= resource.kind().array_layer_count() {
            return Err(out_of_bounds());
        }
        let mip = resource
            .kind()
            .mip_extent(region.mip_level)
            .filter(|_| region.mip_level < resource.kind().mip_level_count())
            .ok_or_else(out_of_bounds)?;
        let fits = |origin: u32, size: u32, limit: u32| {
            origin.checked_add(size).is_some_and(|end| end <= limit)
        };
        if !fits(region.origin.x, copy.extent.width, mip.width)
            || !fits(region.origin.y, copy.extent.height, mip.height)
            || !fits(region.origin.z, copy.extent.depth_or_array_layers, mip.depth_or_array_layers)
        {
            return Err(out_of_bounds());
        }
        if resource.format().is_depth() && (region.origin != Default::default() || copy.extent != mip)
        {
            return Err(
                ValidationError::InvalidCopy("depth copies must cover whole subresources").into(),
            );
        }
    }
    Ok(())
}

/// Checks an inline update of `len` bytes at `offset`.
pub fn validate_buffer_update(resource: &Resource, offset: u64, len: u64) -> Result<(), RhiError> {
    if !resource.is_buffer() {
        return Err(ValidationError::InvalidCopy("buffer updates require a buffer").into());
    }
    if resource.is_released() {
        return Err(ValidationError::ReleasedResource(resource.id()).into());
    }
    if !resource.usage().contains(ResourceUsage::COPY_DST) {
        return Err(ValidationError::StateNotAllowed {
            state: ResourceState::CopyDst,
            usage: resource.usage(),
        }
        .into());
    }
    if len == 0 || len % 4 != 0 || offset % 4 != 0 || len > MAX_UPDATE_SIZE {
        return Err(ValidationError::InvalidUpdate.into());
    }
    if offset.saturating_add(len) > resource.byte_size() {
        return Err(ValidationError::CopyOutOfBounds(resource.id()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::{
        command::ColorTarget,
        core::{LayoutId, ResourceId, TechniqueId},
        pipeline::{
            DepthStencilState, IndexFormat, MeshIndexBuffer, MeshVertexBuffer, ShaderStageFlags,
            SlotRequirement, StageInterface, StageProgram, Technique, VertexAttribute,
            VertexFormat,
        },
    };
    use crate::math::LinearRgba;
    use std::sync::Arc;

    const DEVICE: DeviceId = DeviceId(9);

    fn texture(index: u32, format: Format, usage: ResourceUsage) -> Resource {
        let desc = ResourceDescriptor::texture_2d(None, 64, 64, format, usage);
        validate_resource(&desc).unwrap();
        Resource::new(ResourceId::new(DEVICE, index), &desc)
    }

    fn program(stage: ShaderStage, interface: StageInterface) -> StageProgram {
        StageProgram {
            stage,
            entry_point: "main".into(),
            bytecode: Arc::from(&[0xde, 0xad][..]),
            interface,
        }
    }

    fn layout(slots: Vec<SlotDescriptor>) -> Layout {
        let sorted = validate_layout(&LayoutDescriptor { label: None, slots }).unwrap();
        Layout::new(LayoutId::new(DEVICE, 0), None, sorted)
    }

    fn sampling_technique(depth: Option<Format>) -> Technique {
        let layout = layout(vec![SlotDescriptor::new(
            0,
            SlotKind::SampledTexture,
            ShaderStageFlags::FRAGMENT,
        )]);
        let desc = TechniqueDescriptor {
            label: Some("sample".into()),
            stages: vec![
                program(ShaderStage::Vertex, StageInterface::default()),
                program(
                    ShaderStage::Fragment,
                    StageInterface {
                        slots: vec![SlotRequirement {
                            index: 0,
                            kind: SlotKind::SampledTexture,
                        }],
                        color_outputs: 1,
                        ..Default::default()
                    },
                ),
            ],
            color_formats: vec![Format::Rgba8Unorm],
            depth_format: depth,
            depth_stencil: depth.map(|_| DepthStencilState {
                depth_write_enabled: false,
                ..Default::default()
            }),
            ..Default::default()
        };
        validate_technique(&desc).unwrap();
        check_technique_layout(&desc, &layout).unwrap();
        Technique::new(TechniqueId::new(DEVICE, 0), desc, &layout)
    }

    #[test]
    fn layout_with_gap_is_rejected() {
        let desc = LayoutDescriptor {
            label: None,
            slots: vec![
                SlotDescriptor::new(0, SlotKind::UniformBuffer, ShaderStageFlags::VERTEX),
                SlotDescriptor::new(2, SlotKind::SampledTexture, ShaderStageFlags::FRAGMENT),
            ],
        };
        assert_eq!(
            validate_layout(&desc).unwrap_err(),
            RhiError::Validation(ValidationError::NonContiguousSlots {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn layout_slots_are_sorted_and_unique() {
        let slots = vec![
            SlotDescriptor::new(1, SlotKind::SampledTexture, ShaderStageFlags::FRAGMENT),
            SlotDescriptor::new(0, SlotKind::UniformBuffer, ShaderStageFlags::VERTEX),
        ];
        let sorted = validate_layout(&LayoutDescriptor {
            label: None,
            slots: slots.clone(),
        })
        .unwrap();
        assert_eq!(sorted[0].index, 0);
        assert_eq!(sorted[1].index, 1);

        let mut duplicated = slots;
        duplicated.push(SlotDescriptor::new(
            1,
            SlotKind::UniformBuffer,
            ShaderStageFlags::VERTEX,
        ));
        assert!(matches!(
            validate_layout(&LayoutDescriptor {
                label: None,
                slots: duplicated
            }),
            Err(RhiError::Validation(ValidationError::DuplicateSlot(1)))
        ));
    }

    #[test]
    fn depth_usage_requires_depth_format() {
        let desc = ResourceDescriptor::texture_2d(
            None,
            8,
            8,
            Format::Rgba8Unorm,
            ResourceUsage::DEPTH_STENCIL,
        );
        assert!(matches!(
            validate_resource(&desc),
            Err(RhiError::Validation(ValidationError::IncompatibleFormatUsage { .. }))
        ));
        let desc = ResourceDescriptor::texture_2d(
            None,
            8,
            8,
            Format::Depth32Float,
            ResourceUsage::DEPTH_STENCIL | ResourceUsage::RENDER_TARGET,
        );
        assert!(validate_resource(&desc).is_err());
    }

    #[test]
    fn uniform_buffers_are_sixteen_byte_aligned() {
        let desc = ResourceDescriptor::buffer(None, 20, ResourceUsage::UNIFORM);
        assert_eq!(
            validate_resource(&desc).unwrap_err(),
            RhiError::Validation(ValidationError::UnalignedUniformBuffer { size: 20 })
        );
        let desc = ResourceDescriptor::buffer(None, 64, ResourceUsage::UNIFORM);
        assert!(validate_resource(&desc).is_ok());
    }

    #[test]
    fn initial_data_must_cover_resource() {
        let desc = ResourceDescriptor::buffer(None, 16, ResourceUsage::COPY_DST)
            .with_initial_data(vec![0u8; 8]);
        assert!(matches!(
            validate_resource(&desc),
            Err(RhiError::Validation(ValidationError::InitialDataSize {
                expected: 16,
                actual: 8
            }))
        ));
    }

    #[test]
    fn stage_slot_missing_from_layout_is_a_layout_mismatch() {
        let technique = sampling_technique(None);
        let empty = Layout::new(LayoutId::new(DEVICE, 1), None, Vec::new());
        let err = check_technique_layout(technique.descriptor(), &empty).unwrap_err();
        match err {
            RhiError::LayoutMismatch(mismatch) => {
                assert_eq!(mismatch.stage, ShaderStage::Fragment);
                assert_eq!(mismatch.reason, MismatchReason::MissingSlot(0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn sampling_own_target_is_a_feedback_loop() {
        // --- ARRANGE ---
        let technique = sampling_technique(None);
        let resource = texture(
            1,
            Format::Rgba8Unorm,
            ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_READ,
        );
        let targets = PassTargets::color(ColorTarget::cleared(
            View::whole(&resource, ViewKind::RenderTarget).unwrap(),
            LinearRgba::BLACK,
        ));
        let inputs = vec![PassInput::view(
            0,
            View::whole(&resource, ViewKind::ShaderResource).unwrap(),
        )];

        // --- ACT ---
        let result = validate_pass(&PassDescriptor::new(None, &technique), &targets, &inputs);

        // --- ASSERT ---
        assert_eq!(
            result.unwrap_err(),
            RhiError::Validation(ValidationError::FeedbackLoop(resource.id()))
        );
    }

    #[test]
    fn read_only_depth_may_be_sampled_when_requested() {
        // --- ARRANGE ---
        let technique = sampling_technique(Some(Format::Depth32Float));
        let color = texture(1, Format::Rgba8Unorm, ResourceUsage::RENDER_TARGET);
        let depth = texture(
            2,
            Format::Depth32Float,
            ResourceUsage::DEPTH_STENCIL | ResourceUsage::SHADER_READ,
        );
        let targets = PassTargets {
            colors: vec![ColorTarget::loaded(
                View::whole(&color, ViewKind::RenderTarget).unwrap(),
            )],
            depth: Some(crate::renderer::api::command::DepthTarget {
                view: View::whole(&depth, ViewKind::ReadOnlyDepth).unwrap(),
                depth_load: crate::renderer::api::command::LoadOp::Load,
                stencil_load: crate::renderer::api::command::LoadOp::Load,
                store: Default::default(),
            }),
        };
        let inputs = vec![PassInput::view(
            0,
            View::whole(&depth, ViewKind::ShaderResource).unwrap(),
        )];

        // --- ACT ---
        let without = validate_pass(&PassDescriptor::new(None, &technique), &targets, &inputs);
        let mut desc = PassDescriptor::new(None, &technique);
        desc.feedback = FeedbackFlags::READ_ONLY_DEPTH;
        let with = validate_pass(&desc, &targets, &inputs).unwrap();

        // --- ASSERT ---
        assert!(matches!(
            without,
            Err(RhiError::Validation(ValidationError::FeedbackLoop(_)))
        ));
        let depth_requirement = with
            .iter()
            .find(|r| r.resource.id() == depth.id())
            .unwrap();
        assert_eq!(depth_requirement.state, ResourceState::DepthRead);
        assert_eq!(depth_requirement.role, RequirementRole::Target);
    }

    #[test]
    fn every_slot_must_be_bound() {
        let technique = sampling_technique(None);
        let color = texture(1, Format::Rgba8Unorm, ResourceUsage::RENDER_TARGET);
        let targets = PassTargets::color(ColorTarget::loaded(
            View::whole(&color, ViewKind::RenderTarget).unwrap(),
        ));
        assert_eq!(
            validate_pass(&PassDescriptor::new(None, &technique), &targets, &[]).unwrap_err(),
            RhiError::Validation(ValidationError::UnboundSlot(0))
        );
    }

    #[test]
    fn buffer_update_limits() {
        let desc = ResourceDescriptor::buffer(None, 256, ResourceUsage::COPY_DST);
        let buffer = Resource::new(ResourceId::new(DEVICE, 3), &desc);
        assert!(validate_buffer_update(&buffer, 0, 256).is_ok());
        assert!(validate_buffer_update(&buffer, 2, 4).is_err());
        assert!(matches!(
            validate_buffer_update(&buffer, 128, 256),
            Err(RhiError::Validation(ValidationError::CopyOutOfBounds(_)))
        ));
    }

    #[test]
    fn foreign_entities_are_rejected() {
        let id = ResourceId::new(DeviceId(1), 0);
        assert!(ensure_device(DeviceId(1), id).is_ok());
        assert!(matches!(
            ensure_device(DeviceId(2), id),
            Err(RhiError::Validation(ValidationError::ForeignEntity { .. }))
        ));
    }

    fn buffer(index: u32, size: u64, usage: ResourceUsage) -> Resource {
        let desc = ResourceDescriptor::buffer(None, size, usage);
        validate_resource(&desc).unwrap();
        Resource::new(ResourceId::new(DEVICE, index), &desc)
    }

    #[test]
    fn mesh_ranges_that_overflow_are_too_small() {
        // --- ARRANGE ---
        let vertices = buffer(1, 256, ResourceUsage::VERTEX);
        let indices = buffer(2, 256, ResourceUsage::INDEX);
        let layout = VertexBufferLayout {
            stride: 16,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![VertexAttribute {
                location: 0,
                format: VertexFormat::Float32x4,
                offset: 0,
            }],
        };
        let far_vertices = MeshDescriptor {
            vertex_buffers: vec![MeshVertexBuffer {
                resource: vertices.clone(),
                offset: u64::MAX - 4,
                layout: layout.clone(),
            }],
            vertex_count: 4,
            ..Default::default()
        };
        let far_indices = MeshDescriptor {
            vertex_buffers: vec![MeshVertexBuffer {
                resource: vertices,
                offset: 0,
                layout,
            }],
            index_buffer: Some(MeshIndexBuffer {
                resource: indices,
                offset: u64::MAX - 3,
                format: IndexFormat::Uint32,
                count: 2,
            }),
            vertex_count: 4,
            ..Default::default()
        };

        // --- ACT ---
        let vertex_result = validate_mesh(&far_vertices);
        let index_result = validate_mesh(&far_indices);

        // --- ASSERT ---
        assert!(matches!(
            vertex_result,
            Err(RhiError::Validation(ValidationError::MeshBufferTooSmall { required: u64::MAX, .. }))
        ));
        assert!(matches!(
            index_result,
            Err(RhiError::Validation(ValidationError::MeshBufferTooSmall { required: u64::MAX, .. }))
        ));
    }

    #[test]
    fn attribute_offset_that_overflows_is_rejected() {
        let layouts = [VertexBufferLayout {
            stride: 16,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![VertexAttribute {
                location: 0,
                format: VertexFormat::Float32x2,
                offset: u64::MAX - 2,
            }],
        }];

        assert!(matches!(
            validate_vertex_layouts(&layouts),
            Err(RhiError::Validation(ValidationError::InvalidVertexLayout { buffer: 0, .. }))
        ));
    }

    #[test]
    fn oversized_texture_is_rejected() {
        let desc = ResourceDescriptor::texture_2d(
            None,
            u32::MAX,
            u32::MAX,
            Format::Rgba32Float,
            ResourceUsage::SHADER_READ,
        );

        assert!(matches!(
            validate_resource(&desc),
            Err(RhiError::Validation(ValidationError::ExtentTooLarge(_)))
        ));
    }
}

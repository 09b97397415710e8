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

//! The D3D11 translation of the Strata model.
//!
//! Layouts become register maps (`b#`, `t#` and `u#` per slot), techniques become
//! shaders plus deduplicated state objects, and passes become views. Barriers carry no
//! native meaning; the [`DeferredContext`] turns them into the unbinds D3D11 needs.
//! Completion is tracked with one event query per submission.

use super::context::{D3D11Call, D3D11CommandList, DeferredContext};
use super::conversions::IntoD3D11;
use super::driver::*;
use super::state_objects::StateObjectCache;
use crate::graphics::common::{NativeBackend, PipelineKey, Retired, SubmitReport};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_core::renderer::*;
use strata_core::RhiError;

/// How long a read-back waits for its copy before giving up.
const READBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// The register class a layout slot maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegisterClass {
    /// `b#`
    ConstantBuffer,
    /// `t#`
    ShaderResource,
    /// `u#`
    UnorderedAccess,
}

#[derive(Debug, Clone, Copy)]
struct Register {
    class: RegisterClass,
    index: u32,
    visibility: ShaderStageFlags,
}

#[derive(Debug)]
struct ResourceEntry {
    object: D3D11Handle,
    staging: StagingDesc,
}

/// The description a CPU-readable copy of a resource is created with.
#[derive(Debug, Clone, Copy)]
enum StagingDesc {
    Buffer(D3D11BufferDesc),
    Texture(D3D11TextureDesc),
}

#[derive(Debug)]
struct PipelineEntry {
    shaders: Vec<(D3D11Stage, D3D11Handle)>,
    input_layout: Option<D3D11Handle>,
    rasterizer: D3D11Handle,
    blend: D3D11Handle,
    blend_factor: [f32; 4],
    depth_stencil: Option<D3D11Handle>,
    topology: D3D11Topology,
}

impl PipelineEntry {
    fn objects(&self) -> impl Iterator<Item = D3D11Handle> + '_ {
        self.shaders
            .iter()
            .map(|(_, shader)| *shader)
            .chain(self.input_layout)
    }
}

#[derive(Debug, Clone)]
enum BoundObject {
    View(D3D11Handle),
    ConstantBuffer { buffer: D3D11Handle, offset: u64 },
}

#[derive(Debug, Clone)]
struct BoundInput {
    register: Register,
    object: BoundObject,
    resource: ResourceId,
}

#[derive(Debug)]
struct PassEntry {
    kind: TechniqueKind,
    pipeline: PipelineKey,
    rtvs: Vec<(D3D11Handle, ResourceId)>,
    dsv: Option<(D3D11Handle, ResourceId, bool)>,
    clears: Vec<D3D11Call>,
    inputs: Vec<BoundInput>,
    viewport: (f32, f32),
    /// Views created for the pass, released with it.
    views: Vec<D3D11Handle>,
}

impl PassEntry {
    /// Resources the output merger writes through this pass.
    fn written_targets(&self) -> Vec<ResourceId> {
        let mut written: Vec<ResourceId> = self.rtvs.iter().map(|(_, id)| *id).collect();
        if let Some((_, id, false)) = self.dsv {
            written.push(id);
        }
        if self.kind == TechniqueKind::Render {
            written.extend(
                self.inputs
                    .iter()
                    .filter(|i| i.register.class == RegisterClass::UnorderedAccess)
                    .map(|i| i.resource),
            );
        }
        written
    }
}

/// Native objects owned by the backend, guarded together.
#[derive(Debug, Default)]
struct Objects {
    resources: FxHashMap<ResourceId, ResourceEntry>,
    layouts: FxHashMap<LayoutId, Vec<Register>>,
    pipelines: FxHashMap<PipelineKey, PipelineEntry>,
    passes: FxHashMap<PassId, PassEntry>,
    states: StateObjectCache,
}

/// The D3D11 implementation of [`NativeBackend`].
pub struct D3D11Backend {
    driver: Arc<dyn D3D11Driver>,
    debug: bool,
    objects: Mutex<Objects>,
    /// Event queries of in-flight submissions, oldest first.
    queries: Mutex<VecDeque<(u64, D3D11Handle)>>,
    completed: AtomicU64,
}

impl fmt::Debug for D3D11Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D3D11Backend")
            .field("driver", &self.driver)
            .field("debug", &self.debug)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl D3D11Backend {
    /// Creates a backend driving `driver`. With `debug` set, every translated call list
    /// is logged.
    pub fn new(driver: Arc<dyn D3D11Driver>, debug: bool) -> Self {
        Self {
            driver,
            debug,
            objects: Mutex::new(Objects::default()),
            queries: Mutex::new(VecDeque::new()),
            completed: AtomicU64::new(0),
        }
    }

    /// The driver the backend records into.
    pub fn driver(&self) -> &Arc<dyn D3D11Driver> {
        &self.driver
    }

    /// Number of distinct state objects created so far.
    pub fn state_object_count(&self) -> usize {
        self.objects.lock().states.len()
    }

    fn missing(what: impl fmt::Display) -> RhiError {
        RhiError::Backend(format!("no native object for {what}"))
    }

    fn texture_desc(
        kind: &ResourceKind,
        format: Format,
        usage: D3D11Usage,
        bind_flags: D3D11BindFlags,
    ) -> Option<D3D11TextureDesc> {
        match *kind {
            ResourceKind::Buffer { .. } => None,
            ResourceKind::Texture {
                dimension,
                extent,
                mip_level_count,
                sample_count,
            } => Some(D3D11TextureDesc {
                kind: dimension.into_d3d11(),
                width: extent.width,
                height: extent.height,
                depth_or_array_size: extent.depth_or_array_layers,
                mip_levels: mip_level_count,
                format: format.into_d3d11(),
                sample_count,
                usage,
                bind_flags,
            }),
        }
    }

    fn subresources(range: SubresourceRange) -> D3D11TextureSubresources {
        D3D11TextureSubresources {
            most_detailed_mip: range.base_mip_level,
            mip_levels: range.mip_level_count,
            first_array_slice: range.base_array_layer,
            array_size: range.array_layer_count,
        }
    }

    fn view_desc(view: &View) -> D3D11ViewDesc {
        let format = view.format().into_d3d11();
        let subresources = Self::subresources(view.range());
        match view.kind() {
            ViewKind::RenderTarget => D3D11ViewDesc::RenderTarget {
                format,
                subresources,
            },
            ViewKind::ShaderResource => D3D11ViewDesc::ShaderResource {
                format,
                subresources,
            },
            ViewKind::DepthTarget | ViewKind::ReadOnlyDepth => D3D11ViewDesc::DepthStencil {
                format,
                subresources,
                read_only: view.kind() == ViewKind::ReadOnlyDepth,
            },
            ViewKind::UnorderedAccess => D3D11ViewDesc::UnorderedAccess {
                format,
                subresources,
            },
        }
    }

    /// Maps layout slots to registers, numbering each class from zero in slot order.
    fn assign_registers(layout: &Layout) -> Vec<Register> {
        let (mut b, mut t, mut u) = (0, 0, 0);
        layout
            .slots()
            .iter()
            .map(|slot| {
                let (class, counter) = match slot.kind {
                    SlotKind::UniformBuffer => (RegisterClass::ConstantBuffer, &mut b),
                    SlotKind::SampledTexture | SlotKind::StorageBuffer { read_only: true } => {
                        (RegisterClass::ShaderResource, &mut t)
                    }
                    SlotKind::StorageTexture | SlotKind::StorageBuffer { read_only: false } => {
                        (RegisterClass::UnorderedAccess, &mut u)
                    }
                };
                let index = *counter;
                *counter += 1;
                Register {
                    class,
                    index,
                    visibility: slot.visibility,
                }
            })
            .collect()
    }

    fn stages(kind: TechniqueKind, visibility: ShaderStageFlags) -> Vec<D3D11Stage> {
        match kind {
            TechniqueKind::Compute => vec![D3D11Stage::Compute],
            TechniqueKind::Render => {
                let mut stages = Vec::with_capacity(2);
                if visibility.contains(ShaderStageFlags::VERTEX) {
                    stages.push(D3D11Stage::Vertex);
                }
                if visibility.contains(ShaderStageFlags::FRAGMENT) {
                    stages.push(D3D11Stage::Pixel);
                }
                stages
            }
        }
    }

    fn build_pipeline(
        &self,
        states: &mut StateObjectCache,
        technique: &Technique,
        created: &mut Vec<D3D11Handle>,
    ) -> Result<PipelineEntry, RhiError> {
        let descriptor = technique.descriptor();
        let mut shaders = Vec::with_capacity(descriptor.stages.len());
        for program in &descriptor.stages {
            let stage = program.stage.into_d3d11();
            let shader = self.driver.create_shader(stage, &program.bytecode)?;
            created.push(shader);
            shaders.push((stage, shader));
        }

        let input_layout = match descriptor.stage(ShaderStage::Vertex) {
            Some(vertex) if !descriptor.vertex_buffers.is_empty() => {
                let elements: Vec<D3D11InputElement> = descriptor
                    .vertex_buffers
                    .iter()
                    .enumerate()
                    .flat_map(|(slot, buffer)| {
                        buffer.attributes.iter().map(move |attribute| D3D11InputElement {
                            semantic_index: attribute.location,
                            format: attribute.format.into_d3d11(),
                            input_slot: slot as u32,
                            aligned_byte_offset: attribute.offset,
                            per_instance: buffer.step_mode == VertexStepMode::Instance,
                        })
                    })
                    .collect();
                let layout = self
                    .driver
                    .create_input_layout(&elements, &vertex.bytecode)?;
                created.push(layout);
                Some(layout)
            }
            _ => None,
        };

        let driver = self.driver.as_ref();
        let rasterizer = states.get_or_create(
            driver,
            D3D11StateDesc::Rasterizer((descriptor.raster, descriptor.sample_count).into_d3d11()),
        )?;
        let blend =
            states.get_or_create(driver, D3D11StateDesc::Blend(descriptor.blend.into_d3d11()))?;
        let depth_stencil = match descriptor.depth_stencil {
            Some(state) => Some(
                states.get_or_create(driver, D3D11StateDesc::DepthStencil(state.into_d3d11()))?,
            ),
            None => None,
        };

        Ok(PipelineEntry {
            shaders,
            input_layout,
            rasterizer,
            blend,
            blend_factor: descriptor.blend.constant.to_array(),
            depth_stencil,
            topology: descriptor.raster.topology.into_d3d11(),
        })
    }

    fn create_view(
        &self,
        created: &mut Vec<D3D11Handle>,
        resource: D3D11Handle,
        desc: &D3D11ViewDesc,
    ) -> Result<D3D11Handle, RhiError> {
        let view = self.driver.create_view(resource, desc)?;
        created.push(view);
        Ok(view)
    }

    fn build_pass(
        &self,
        objects: &Objects,
        pass: &Pass,
        created: &mut Vec<D3D11Handle>,
    ) -> Result<PassEntry, RhiError> {
        let resource_object = |id: ResourceId| {
            objects
                .resources
                .get(&id)
                .map(|entry| entry.object)
                .ok_or_else(|| Self::missing(id))
        };
        let view_of = |view: &View, created: &mut Vec<D3D11Handle>| {
            let resource = resource_object(view.resource_id())?;
            self.create_view(created, resource, &Self::view_desc(view))
        };

        let targets = pass.targets();
        let mut rtvs = Vec::with_capacity(targets.colors.len());
        let mut clears = Vec::new();
        for color in &targets.colors {
            let rtv = view_of(&color.view, created)?;
            if let LoadOp::Clear(value) = color.load {
                clears.push(D3D11Call::ClearRenderTargetView {
                    rtv,
                    color: value.to_array(),
                });
            }
            rtvs.push((rtv, color.view.resource_id()));
        }
        let dsv = match &targets.depth {
            Some(depth) => {
                let dsv = view_of(&depth.view, created)?;
                let read_only = depth.view.kind() == ViewKind::ReadOnlyDepth;
                let depth_clear = match depth.depth_load {
                    LoadOp::Clear(value) if !read_only => Some(value),
                    _ => None,
                };
                let stencil_clear = match depth.stencil_load {
                    LoadOp::Clear(value) if !read_only && depth.view.format().has_stencil() => {
                        Some(value as u8)
                    }
                    _ => None,
                };
                if depth_clear.is_some() || stencil_clear.is_some() {
                    clears.push(D3D11Call::ClearDepthStencilView {
                        dsv,
                        depth: depth_clear,
                        stencil: stencil_clear,
                    });
                }
                Some((dsv, depth.view.resource_id(), read_only))
            }
            None => None,
        };

        let technique = pass.technique();
        let registers = objects
            .layouts
            .get(&technique.layout().id())
            .ok_or_else(|| Self::missing(technique.layout().id()))?;
        let mut inputs = Vec::with_capacity(pass.inputs().len());
        for input in pass.inputs() {
            let register = *registers
                .get(input.slot as usize)
                .ok_or_else(|| Self::missing(format!("slot {}", input.slot)))?;
            let (object, resource) = match &input.binding {
                InputBinding::View(view) => {
                    (BoundObject::View(view_of(view, created)?), view.resource_id())
                }
                InputBinding::Buffer {
                    resource,
                    offset,
                    size,
                } => {
                    let buffer = resource_object(resource.id())?;
                    let byte_count = size.unwrap_or(resource.byte_size().saturating_sub(*offset));
                    let object = match register.class {
                        RegisterClass::ConstantBuffer => BoundObject::ConstantBuffer {
                            buffer,
                            offset: *offset,
                        },
                        RegisterClass::ShaderResource => BoundObject::View(self.create_view(
                            created,
                            buffer,
                            &D3D11ViewDesc::BufferShaderResource {
                                first_byte: *offset,
                                byte_count,
                            },
                        )?),
                        RegisterClass::UnorderedAccess => BoundObject::View(self.create_view(
                            created,
                            buffer,
                            &D3D11ViewDesc::BufferUnorderedAccess {
                                first_byte: *offset,
                                byte_count,
                            },
                        )?),
                    };
                    (object, resource.id())
                }
            };
            inputs.push(BoundInput {
                register,
                object,
                resource,
            });
        }

        let extent = pass.extent().unwrap_or_default();
        Ok(PassEntry {
            kind: pass.kind(),
            pipeline: PipelineKey::of(technique),
            rtvs,
            dsv,
            clears,
            inputs,
            viewport: (extent.width as f32, extent.height as f32),
            views: created.clone(),
        })
    }

    /// Records everything a draw or dispatch of `pass` needs bound. Clears only run
    /// when the pass is first bound.
    fn apply_pass(
        ctx: &mut DeferredContext,
        pass: &PassEntry,
        pipeline: &PipelineEntry,
        clear: bool,
    ) {
        if pass.kind == TechniqueKind::Render {
            let rtv_count = pass.rtvs.len() as u32;
            let uavs = pass
                .inputs
                .iter()
                .filter(|i| i.register.class == RegisterClass::UnorderedAccess)
                .filter_map(|i| match i.object {
                    BoundObject::View(view) => Some((rtv_count + i.register.index, view)),
                    BoundObject::ConstantBuffer { .. } => None,
                })
                .collect();
            ctx.bind_targets(
                pass.rtvs.iter().map(|(rtv, _)| *rtv).collect(),
                pass.dsv.map(|(dsv, _, _)| dsv),
                uavs,
                &pass.written_targets(),
            );
            if clear {
                for call in &pass.clears {
                    ctx.record(call.clone());
                }
            }
            ctx.record(D3D11Call::SetViewport {
                width: pass.viewport.0,
                height: pass.viewport.1,
            });
            ctx.record(D3D11Call::SetRasterizerState(pipeline.rasterizer));
            ctx.record(D3D11Call::SetBlendState {
                state: pipeline.blend,
                blend_factor: pipeline.blend_factor,
            });
            ctx.record(D3D11Call::SetDepthStencilState {
                state: pipeline.depth_stencil,
                stencil_ref: 0,
            });
            ctx.record(D3D11Call::SetPrimitiveTopology(pipeline.topology));
            ctx.record(D3D11Call::SetInputLayout(pipeline.input_layout));
        }
        for (stage, shader) in &pipeline.shaders {
            ctx.record(D3D11Call::SetShader {
                stage: *stage,
                shader: Some(*shader),
            });
        }
        if pass.kind == TechniqueKind::Render
            && !pipeline.shaders.iter().any(|(s, _)| *s == D3D11Stage::Pixel)
        {
            ctx.record(D3D11Call::SetShader {
                stage: D3D11Stage::Pixel,
                shader: None,
            });
        }

        for input in &pass.inputs {
            let register = input.register;
            match (register.class, &input.object) {
                (RegisterClass::ConstantBuffer, BoundObject::ConstantBuffer { buffer, offset }) => {
                    for stage in Self::stages(pass.kind, register.visibility) {
                        ctx.record(D3D11Call::SetConstantBuffers {
                            stage,
                            start_slot: register.index,
                            buffers: vec![Some((*buffer, *offset))],
                        });
                    }
                }
                (RegisterClass::ShaderResource, BoundObject::View(view)) => {
                    for stage in Self::stages(pass.kind, register.visibility) {
                        ctx.bind_shader_resource(stage, register.index, *view, input.resource);
                    }
                }
                (RegisterClass::UnorderedAccess, BoundObject::View(view))
                    if pass.kind == TechniqueKind::Compute =>
                {
                    ctx.bind_unordered_access(register.index, *view, input.resource);
                }
                // Graphics UAVs are bound with the targets.
                _ => {}
            }
        }
    }

    /// Rebinds the pass after a barrier unbound part of it.
    fn prepare(
        ctx: &mut DeferredContext,
        bound: Option<(&PassEntry, &PipelineEntry)>,
    ) -> Result<(), RhiError> {
        let (pass, pipeline) = bound.ok_or_else(|| Self::missing("bound pass"))?;
        if ctx.take_dirty() {
            Self::apply_pass(ctx, pass, pipeline, false);
        }
        Ok(())
    }

    fn translate(&self, batch: &Batch) -> Result<(DeferredContext, SubmitReport), RhiError> {
        let objects = self.objects.lock();
        let object_of = |id: ResourceId| {
            objects
                .resources
                .get(&id)
                .map(|entry| entry.object)
                .ok_or_else(|| Self::missing(id))
        };
        let mut ctx = DeferredContext::new();
        let mut report = SubmitReport::default();
        let mut bound: Option<(&PassEntry, &PipelineEntry)> = None;

        for command in batch.commands() {
            match command {
                Command::BindPass(pass) => {
                    let entry = objects
                        .passes
                        .get(&pass.id())
                        .ok_or_else(|| Self::missing(pass.id()))?;
                    let pipeline = objects
                        .pipelines
                        .get(&entry.pipeline)
                        .ok_or_else(|| Self::missing(pass.technique().id()))?;
                    ctx.take_dirty();
                    Self::apply_pass(&mut ctx, entry, pipeline, true);
                    bound = Some((entry, pipeline));
                }
                Command::Barrier(barrier) => {
                    if ctx.transition(barrier.resource().id(), barrier.after()) > 0 {
                        report.barriers_emitted += 1;
                    } else {
                        report.barriers_elided += 1;
                    }
                }
                Command::Draw {
                    vertices,
                    instances,
                } => {
                    Self::prepare(&mut ctx, bound)?;
                    ctx.record(D3D11Call::Draw {
                        vertex_count: vertices.len() as u32,
                        start_vertex: vertices.start,
                        instance_count: instances.len() as u32,
                        start_instance: instances.start,
                    });
                }
                Command::DrawMesh { mesh, instances } => {
                    Self::prepare(&mut ctx, bound)?;
                    let mut buffers = Vec::with_capacity(mesh.vertex_buffers().len());
                    for stream in mesh.vertex_buffers() {
                        buffers.push((
                            object_of(stream.resource.id())?,
                            stream.layout.stride,
                            stream.offset,
                        ));
                    }
                    ctx.record(D3D11Call::SetVertexBuffers {
                        start_slot: 0,
                        buffers,
                    });
                    match mesh.index_buffer() {
                        Some(index) => {
                            ctx.record(D3D11Call::SetIndexBuffer {
                                buffer: object_of(index.resource.id())?,
                                format: index.format.into_d3d11(),
                                offset: index.offset,
                            });
                            ctx.record(D3D11Call::DrawIndexed {
                                index_count: index.count,
                                start_index: 0,
                                base_vertex: 0,
                                instance_count: instances.len() as u32,
                                start_instance: instances.start,
                            });
                        }
                        None => ctx.record(D3D11Call::Draw {
                            vertex_count: mesh.vertex_count(),
                            start_vertex: 0,
                            instance_count: instances.len() as u32,
                            start_instance: instances.start,
                        }),
                    }
                }
                Command::Dispatch { groups } => {
                    Self::prepare(&mut ctx, bound)?;
                    ctx.record(D3D11Call::Dispatch {
                        x: groups[0],
                        y: groups[1],
                        z: groups[2],
                    });
                }
                Command::CopyBuffer(copy) => ctx.record(D3D11Call::CopyBufferRegion {
                    dst: object_of(copy.dst.id())?,
                    dst_offset: copy.dst_offset,
                    src: object_of(copy.src.id())?,
                    src_offset: copy.src_offset,
                    size: copy.size,
                }),
                Command::CopyTexture(copy) => {
                    let subresource = |region: &TextureRegion| {
                        region.mip_level
                            + region.array_layer * region.resource.kind().mip_level_count()
                    };
                    ctx.record(D3D11Call::CopySubresourceRegion {
                        dst: object_of(copy.dst.resource.id())?,
                        dst_subresource: subresource(&copy.dst),
                        dst_origin: [copy.dst.origin.x, copy.dst.origin.y, copy.dst.origin.z],
                        src: object_of(copy.src.resource.id())?,
                        src_subresource: subresource(&copy.src),
                        src_origin: [copy.src.origin.x, copy.src.origin.y, copy.src.origin.z],
                        extent: [
                            copy.extent.width,
                            copy.extent.height,
                            copy.extent.depth_or_array_layers,
                        ],
                    });
                }
                Command::UpdateBuffer {
                    resource,
                    offset,
                    data,
                } => ctx.record(D3D11Call::UpdateSubresource {
                    dst: object_of(resource.id())?,
                    offset: *offset,
                    data: Arc::clone(data),
                }),
            }
        }
        report.commands = ctx.len() as u64;
        Ok((ctx, report))
    }

    /// Copies `source` into `staging` and maps it once the copy completed.
    fn copy_and_map(
        &self,
        id: ResourceId,
        source: D3D11Handle,
        staging: D3D11Handle,
        value: u64,
    ) -> Result<Vec<u8>, RhiError> {
        self.driver.execute_command_list(D3D11CommandList {
            label: Some(format!("read back {id}")),
            calls: vec![D3D11Call::CopyResource {
                dst: staging,
                src: source,
            }],
        })?;
        let query = self.signal(value)?;
        if !self.driver.wait_query(query, READBACK_TIMEOUT)? {
            return Err(RhiError::Backend(format!("read back of {id} timed out")));
        }
        Ok(self.driver.map_read(staging)?)
    }

    /// Ends an event query behind everything executed so far, signaling `value`.
    fn signal(&self, value: u64) -> Result<D3D11Handle, RhiError> {
        let query = self.driver.create_event_query()?;
        if let Err(e) = self.driver.end_query(query) {
            self.driver.release(query);
            return Err(e.into());
        }
        self.queries.lock().push_back((value, query));
        Ok(query)
    }
}

impl NativeBackend for D3D11Backend {
    const KIND: BackendType = BackendType::D3D11;

    fn create_resource(
        &self,
        resource: &Resource,
        descriptor: &ResourceDescriptor,
    ) -> Result<u64, RhiError> {
        let bind_flags: D3D11BindFlags = descriptor.usage.into_d3d11();
        let initial = descriptor.initial_data.as_deref();
        let (object, staging) = match descriptor.kind {
            ResourceKind::Buffer { size } => {
                let desc = D3D11BufferDesc {
                    byte_width: size,
                    usage: D3D11Usage::Default,
                    bind_flags,
                    structured: descriptor
                        .usage
                        .intersects(ResourceUsage::SHADER_READ | ResourceUsage::SHADER_WRITE),
                };
                let object = self.driver.create_buffer(&desc, initial)?;
                let staging = D3D11BufferDesc {
                    usage: D3D11Usage::Staging,
                    bind_flags: D3D11BindFlags::empty(),
                    structured: false,
                    ..desc
                };
                (object, StagingDesc::Buffer(staging))
            }
            ResourceKind::Texture { .. } => {
                let desc = Self::texture_desc(
                    &descriptor.kind,
                    descriptor.format,
                    D3D11Usage::Default,
                    bind_flags,
                )
                .ok_or_else(|| Self::missing(resource.id()))?;
                let object = self.driver.create_texture(&desc, initial)?;
                let staging = D3D11TextureDesc {
                    usage: D3D11Usage::Staging,
                    bind_flags: D3D11BindFlags::empty(),
                    ..desc
                };
                (object, StagingDesc::Texture(staging))
            }
        };
        self.objects
            .lock()
            .resources
            .insert(resource.id(), ResourceEntry { object, staging });
        Ok(resource.byte_size())
    }

    fn create_layout(&self, layout: &Layout) -> Result<(), RhiError> {
        let registers = Self::assign_registers(layout);
        self.objects.lock().layouts.insert(layout.id(), registers);
        Ok(())
    }

    fn create_pipeline(&self, key: PipelineKey, technique: &Technique) -> Result<(), RhiError> {
        let mut objects = self.objects.lock();
        let mut created = Vec::new();
        match self.build_pipeline(&mut objects.states, technique, &mut created) {
            Ok(entry) => {
                log::debug!(
                    "D3D11: created {} shaders for pipeline {:#018x}",
                    entry.shaders.len(),
                    key.fingerprint
                );
                objects.pipelines.insert(key, entry);
                Ok(())
            }
            Err(e) => {
                for object in created {
                    self.driver.release(object);
                }
                Err(e)
            }
        }
    }

    fn create_pass(&self, pass: &Pass) -> Result<(), RhiError> {
        let mut objects = self.objects.lock();
        let mut created = Vec::new();
        match self.build_pass(&objects, pass, &mut created) {
            Ok(entry) => {
                objects.passes.insert(pass.id(), entry);
                Ok(())
            }
            Err(e) => {
                for object in created {
                    self.driver.release(object);
                }
                Err(e)
            }
        }
    }

    fn submit(&self, batch: &Batch, value: u64) -> Result<SubmitReport, RhiError> {
        let (ctx, report) = self.translate(batch)?;
        let list = ctx.finish(batch.label());
        if self.debug {
            let calls: Vec<&str> = list.calls.iter().map(D3D11Call::name).collect();
            log::debug!("D3D11: submission #{} executes {:?}", value, calls);
        }
        self.driver.execute_command_list(list)?;
        self.signal(value)?;
        Ok(report)
    }

    fn read_back(&self, resource: &Resource, value: u64) -> Result<Vec<u8>, RhiError> {
        let (source, staging_desc) = {
            let objects = self.objects.lock();
            let entry = objects
                .resources
                .get(&resource.id())
                .ok_or_else(|| Self::missing(resource.id()))?;
            (entry.object, entry.staging)
        };
        let staging = match staging_desc {
            StagingDesc::Buffer(desc) => self.driver.create_buffer(&desc, None)?,
            StagingDesc::Texture(desc) => self.driver.create_texture(&desc, None)?,
        };
        let result = self.copy_and_map(resource.id(), source, staging, value);
        self.driver.release(staging);
        result
    }

    fn completed_value(&self) -> Result<u64, RhiError> {
        let mut queries = self.queries.lock();
        while let Some(&(value, query)) = queries.front() {
            if !self.driver.query_signaled(query)? {
                break;
            }
            queries.pop_front();
            self.driver.release(query);
            self.completed.fetch_max(value, Ordering::AcqRel);
        }
        Ok(self.completed.load(Ordering::Acquire))
    }

    fn wait_for(&self, value: u64, timeout: Duration) -> Result<bool, RhiError> {
        if self.completed_value()? >= value {
            return Ok(true);
        }
        let query = self
            .queries
            .lock()
            .iter()
            .find(|(queued, _)| *queued >= value)
            .map(|(_, query)| *query);
        match query {
            Some(query) => Ok(self.driver.wait_query(query, timeout)?),
            None => Ok(false),
        }
    }

    fn release(&self, retired: Retired) {
        let mut objects = self.objects.lock();
        let released: Vec<D3D11Handle> = match retired {
            Retired::Resource(id) => objects
                .resources
                .remove(&id)
                .map(|entry| vec![entry.object])
                .unwrap_or_default(),
            Retired::Layout(id) => {
                objects.layouts.remove(&id);
                Vec::new()
            }
            Retired::Pipeline(key) => objects
                .pipelines
                .remove(&key)
                .map(|entry| entry.objects().collect())
                .unwrap_or_default(),
            Retired::Pass(id) => objects
                .passes
                .remove(&id)
                .map(|entry| entry.views)
                .unwrap_or_default(),
        };
        drop(objects);
        for object in released {
            self.driver.release(object);
        }
    }
}

impl Drop for D3D11Backend {
    fn drop(&mut self) {
        let objects = self.objects.get_mut();
        let leftover = objects.resources.len() + objects.pipelines.len() + objects.passes.len();
        if leftover > 0 {
            log::warn!("D3D11: dropping backend with {} live objects", leftover);
        }
        for object in objects.states.drain() {
            self.driver.release(object);
        }
        for (_, query) in self.queries.get_mut().drain(..) {
            self.driver.release(query);
        }
    }
}

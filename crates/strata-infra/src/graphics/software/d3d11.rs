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

//! [`D3D11Driver`] on the software GPU.
//!
//! Object creation and mapping happen on the calling thread; command lists and event
//! queries go through the GPU queue. Every executed command list is kept for
//! inspection.

use super::executor::{self, BlendParams, Factor, ImageShape, Operation, TexelCoord};
use super::gpu::SoftwareGpu;
use crate::graphics::common::DriverError;
use crate::graphics::d3d11::context::{D3D11Call, D3D11CommandList};
use crate::graphics::d3d11::conversions::from_dxgi;
use crate::graphics::d3d11::driver::*;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use strata_core::math::Extent3D;
use strata_core::renderer::{ResourceKind, SubresourceRange, TextureDimension};

#[derive(Debug)]
enum Object {
    Buffer {
        desc: D3D11BufferDesc,
        data: Vec<u8>,
    },
    Texture {
        desc: D3D11TextureDesc,
        shape: ImageShape,
        data: Vec<u8>,
    },
    View {
        resource: D3D11Handle,
        desc: D3D11ViewDesc,
    },
    Shader(D3D11Stage),
    InputLayout,
    State(D3D11StateDesc),
    Query {
        signaled: bool,
    },
}

impl Object {
    fn memory_size(&self) -> u64 {
        match self {
            Object::Buffer { data, .. } | Object::Texture { data, .. } => data.len() as u64,
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    next_handle: u64,
    objects: FxHashMap<D3D11Handle, Object>,
    executed: Vec<D3D11CommandList>,
}

impl Tables {
    fn insert(&mut self, object: Object) -> D3D11Handle {
        self.next_handle += 1;
        let handle = D3D11Handle(self.next_handle);
        self.objects.insert(handle, object);
        handle
    }

    fn get(&self, handle: D3D11Handle) -> Result<&Object, DriverError> {
        self.objects
            .get(&handle)
            .ok_or(DriverError::InvalidHandle(handle.0))
    }

    fn get_mut(&mut self, handle: D3D11Handle) -> Result<&mut Object, DriverError> {
        self.objects
            .get_mut(&handle)
            .ok_or(DriverError::InvalidHandle(handle.0))
    }

    /// The memory behind a buffer or texture, with the shape of textures.
    fn memory_mut(
        &mut self,
        handle: D3D11Handle,
    ) -> Result<(&mut Vec<u8>, Option<ImageShape>), DriverError> {
        match self.get_mut(handle)? {
            Object::Buffer { data, .. } => Ok((data, None)),
            Object::Texture { data, shape, .. } => Ok((data, Some(*shape))),
            _ => Err(DriverError::InvalidHandle(handle.0)),
        }
    }

    fn texture_mut(&mut self, handle: D3D11Handle) -> Result<(&mut Vec<u8>, ImageShape), DriverError> {
        match self.memory_mut(handle)? {
            (data, Some(shape)) => Ok((data, shape)),
            _ => Err(DriverError::InvalidHandle(handle.0)),
        }
    }

    /// The texture a view points to, the view format and the subresources it covers.
    fn view_target(
        &self,
        view: D3D11Handle,
    ) -> Result<(D3D11Handle, DxgiFormat, SubresourceRange), DriverError> {
        let Object::View { resource, desc } = self.get(view)? else {
            return Err(DriverError::InvalidHandle(view.0));
        };
        let (format, subresources) = match *desc {
            D3D11ViewDesc::ShaderResource {
                format,
                subresources,
            }
            | D3D11ViewDesc::RenderTarget {
                format,
                subresources,
            }
            | D3D11ViewDesc::DepthStencil {
                format,
                subresources,
                ..
            }
            | D3D11ViewDesc::UnorderedAccess {
                format,
                subresources,
            } => (format, subresources),
            D3D11ViewDesc::BufferShaderResource { .. }
            | D3D11ViewDesc::BufferUnorderedAccess { .. } => {
                return Err(DriverError::Unsupported("buffer view as a target".into()))
            }
        };
        Ok((
            *resource,
            format,
            SubresourceRange {
                base_mip_level: subresources.most_detailed_mip,
                mip_level_count: subresources.mip_levels,
                base_array_layer: subresources.first_array_slice,
                array_layer_count: subresources.array_size,
            },
        ))
    }
}

fn shape_of(desc: &D3D11TextureDesc) -> Result<ImageShape, DriverError> {
    let format = from_dxgi(desc.format)
        .ok_or_else(|| DriverError::Unsupported(format!("texture format {:?}", desc.format)))?;
    let dimension = match desc.kind {
        D3D11TextureKind::Texture1D => TextureDimension::D1,
        D3D11TextureKind::Texture2D => TextureDimension::D2,
        D3D11TextureKind::Texture3D => TextureDimension::D3,
    };
    Ok(ImageShape::new(
        ResourceKind::Texture {
            dimension,
            extent: Extent3D {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.depth_or_array_size,
            },
            mip_level_count: desc.mip_levels,
            sample_count: desc.sample_count,
        },
        format,
    ))
}

fn view_format(format: DxgiFormat) -> Result<strata_core::renderer::Format, DriverError> {
    from_dxgi(format).ok_or_else(|| DriverError::Unsupported(format!("view format {:?}", format)))
}

fn factor(blend: D3D11Blend) -> Factor {
    match blend {
        D3D11Blend::ZERO => Factor::Zero,
        D3D11Blend::ONE => Factor::One,
        D3D11Blend::SRC_COLOR => Factor::SrcColor,
        D3D11Blend::INV_SRC_COLOR => Factor::OneMinusSrcColor,
        D3D11Blend::SRC_ALPHA => Factor::SrcAlpha,
        D3D11Blend::INV_SRC_ALPHA => Factor::OneMinusSrcAlpha,
        D3D11Blend::DEST_COLOR => Factor::DstColor,
        D3D11Blend::INV_DEST_COLOR => Factor::OneMinusDstColor,
        D3D11Blend::DEST_ALPHA => Factor::DstAlpha,
        D3D11Blend::INV_DEST_ALPHA => Factor::OneMinusDstAlpha,
        D3D11Blend::BLEND_FACTOR => Factor::Constant,
        D3D11Blend::INV_BLEND_FACTOR => Factor::OneMinusConstant,
    }
}

fn operation(op: D3D11BlendOp) -> Operation {
    match op {
        D3D11BlendOp::ADD => Operation::Add,
        D3D11BlendOp::SUBTRACT => Operation::Subtract,
        D3D11BlendOp::REV_SUBTRACT => Operation::ReverseSubtract,
        D3D11BlendOp::MIN => Operation::Min,
        D3D11BlendOp::MAX => Operation::Max,
    }
}

fn blend_params(desc: &D3D11BlendDesc) -> BlendParams {
    let target = desc.target;
    BlendParams {
        enabled: target.blend_enable,
        src_color: factor(target.src_blend),
        dst_color: factor(target.dest_blend),
        color_op: operation(target.blend_op),
        src_alpha: factor(target.src_blend_alpha),
        dst_alpha: factor(target.dest_blend_alpha),
        alpha_op: operation(target.blend_op_alpha),
        write_mask: target.render_target_write_mask,
    }
}

/// Immediate context state a command list changes.
#[derive(Debug, Default)]
struct ContextState {
    rtvs: Vec<D3D11Handle>,
    blend: BlendParams,
    blend_factor: [f32; 4],
}

fn execute(tables: &mut Tables, list: &D3D11CommandList) -> Result<(), DriverError> {
    let mut state = ContextState::default();
    for call in &list.calls {
        match call {
            D3D11Call::SetRenderTargets { rtvs, .. } => state.rtvs = rtvs.clone(),
            D3D11Call::SetBlendState {
                state: blend,
                blend_factor,
            } => {
                let Object::State(D3D11StateDesc::Blend(desc)) = tables.get(*blend)? else {
                    return Err(DriverError::InvalidHandle(blend.0));
                };
                state.blend = blend_params(desc);
                state.blend_factor = *blend_factor;
            }
            D3D11Call::ClearRenderTargetView { rtv, color } => {
                let (texture, format, range) = tables.view_target(*rtv)?;
                let (data, shape) = tables.texture_mut(texture)?;
                executor::clear_color(data, &shape.viewed_as(view_format(format)?), range, *color)?;
            }
            D3D11Call::ClearDepthStencilView {
                dsv,
                depth,
                stencil,
            } => {
                let (texture, format, range) = tables.view_target(*dsv)?;
                let (data, shape) = tables.texture_mut(texture)?;
                executor::clear_depth_stencil(
                    data,
                    &shape.viewed_as(view_format(format)?),
                    range,
                    *depth,
                    *stencil,
                )?;
            }
            D3D11Call::Draw { .. } | D3D11Call::DrawIndexed { .. } => {
                for rtv in &state.rtvs {
                    let (texture, format, range) = tables.view_target(*rtv)?;
                    let (data, shape) = tables.texture_mut(texture)?;
                    executor::draw_constant(
                        data,
                        &shape.viewed_as(view_format(format)?),
                        range,
                        state.blend_factor,
                        &state.blend,
                    )?;
                }
            }
            D3D11Call::CopyResource { dst, src } => {
                if dst != src {
                    let (src_data, _) = tables.memory_mut(*src)?;
                    let copy = src_data.clone();
                    let (dst_data, _) = tables.memory_mut(*dst)?;
                    executor::copy_bytes(&copy, 0, dst_data, 0, copy.len() as u64)?;
                }
            }
            D3D11Call::CopyBufferRegion {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => {
                let (src_data, _) = tables.memory_mut(*src)?;
                let copy = src_data.clone();
                let (dst_data, _) = tables.memory_mut(*dst)?;
                executor::copy_bytes(&copy, *src_offset, dst_data, *dst_offset, *size)?;
            }
            D3D11Call::CopySubresourceRegion {
                dst,
                dst_subresource,
                dst_origin,
                src,
                src_subresource,
                src_origin,
                extent,
            } => {
                let coord = |shape: &ImageShape, subresource: u32, origin: [u32; 3]| {
                    let mips = shape.kind.mip_level_count().max(1);
                    TexelCoord {
                        mip_level: subresource % mips,
                        array_layer: subresource / mips,
                        origin,
                    }
                };
                let (src_data, src_shape) = tables.texture_mut(*src)?;
                let copy = src_data.clone();
                let (dst_data, dst_shape) = tables.texture_mut(*dst)?;
                executor::copy_texture(
                    &copy,
                    &src_shape,
                    coord(&src_shape, *src_subresource, *src_origin),
                    dst_data,
                    &dst_shape,
                    coord(&dst_shape, *dst_subresource, *dst_origin),
                    *extent,
                )?;
            }
            D3D11Call::UpdateSubresource { dst, offset, data } => {
                let (dst_data, _) = tables.memory_mut(*dst)?;
                executor::copy_bytes(data, 0, dst_data, *offset, data.len() as u64)?;
            }
            // Shaders do not run; dispatches and the remaining bindings leave no trace
            // in memory.
            _ => {}
        }
    }
    Ok(())
}

/// A [`D3D11Driver`] backed by a [`SoftwareGpu`].
#[derive(Debug)]
pub struct SoftwareD3D11 {
    gpu: SoftwareGpu,
    tables: Arc<Mutex<Tables>>,
}

impl SoftwareD3D11 {
    pub fn new(gpu: SoftwareGpu) -> Self {
        Self {
            gpu,
            tables: Arc::new(Mutex::new(Tables::default())),
        }
    }

    pub fn gpu(&self) -> &SoftwareGpu {
        &self.gpu
    }

    /// Every command list handed to the immediate context, in submission order.
    pub fn executed_lists(&self) -> Vec<D3D11CommandList> {
        self.tables.lock().executed.clone()
    }

    /// Number of native objects not yet released.
    pub fn live_objects(&self) -> usize {
        self.tables.lock().objects.len()
    }

    fn create_memory_object(
        &self,
        size: u64,
        initial: Option<&[u8]>,
        object: impl FnOnce(Vec<u8>) -> Object,
    ) -> Result<D3D11Handle, DriverError> {
        self.gpu.check_alive()?;
        self.gpu.allocate(size)?;
        let mut data = vec![0u8; size as usize];
        if let Some(initial) = initial {
            let len = initial.len().min(data.len());
            data[..len].copy_from_slice(&initial[..len]);
        }
        Ok(self.tables.lock().insert(object(data)))
    }

    fn create(&self, object: Object) -> Result<D3D11Handle, DriverError> {
        self.gpu.check_alive()?;
        Ok(self.tables.lock().insert(object))
    }
}

impl D3D11Driver for SoftwareD3D11 {
    fn create_buffer(
        &self,
        desc: &D3D11BufferDesc,
        initial: Option<&[u8]>,
    ) -> Result<D3D11Handle, DriverError> {
        let desc = *desc;
        self.create_memory_object(desc.byte_width, initial, |data| Object::Buffer {
            desc,
            data,
        })
    }

    fn create_texture(
        &self,
        desc: &D3D11TextureDesc,
        initial: Option<&[u8]>,
    ) -> Result<D3D11Handle, DriverError> {
        let desc = *desc;
        let shape = shape_of(&desc)?;
        self.create_memory_object(shape.byte_size(), initial, |data| Object::Texture {
            desc,
            shape,
            data,
        })
    }

    fn create_view(
        &self,
        resource: D3D11Handle,
        desc: &D3D11ViewDesc,
    ) -> Result<D3D11Handle, DriverError> {
        self.gpu.check_alive()?;
        let mut tables = self.tables.lock();
        match tables.get(resource)? {
            Object::Buffer { .. } | Object::Texture { .. } => {}
            _ => return Err(DriverError::InvalidHandle(resource.0)),
        }
        Ok(tables.insert(Object::View {
            resource,
            desc: *desc,
        }))
    }

    fn create_shader(&self, stage: D3D11Stage, bytecode: &[u8]) -> Result<D3D11Handle, DriverError> {
        if bytecode.is_empty() {
            return Err(DriverError::Unsupported("empty shader bytecode".into()));
        }
        self.create(Object::Shader(stage))
    }

    fn create_input_layout(
        &self,
        _elements: &[D3D11InputElement],
        _vertex_bytecode: &[u8],
    ) -> Result<D3D11Handle, DriverError> {
        self.create(Object::InputLayout)
    }

    fn create_state(&self, desc: &D3D11StateDesc) -> Result<D3D11Handle, DriverError> {
        self.create(Object::State(*desc))
    }

    fn execute_command_list(&self, list: D3D11CommandList) -> Result<(), DriverError> {
        self.gpu.check_alive()?;
        let label = list.label.clone().unwrap_or_else(|| "command list".into());
        self.tables.lock().executed.push(list.clone());
        let tables = Arc::clone(&self.tables);
        self.gpu
            .enqueue(label, move || execute(&mut tables.lock(), &list))?;
        Ok(())
    }

    fn create_event_query(&self) -> Result<D3D11Handle, DriverError> {
        self.create(Object::Query { signaled: false })
    }

    fn end_query(&self, query: D3D11Handle) -> Result<(), DriverError> {
        self.gpu.check_alive()?;
        match self.tables.lock().get_mut(query)? {
            Object::Query { signaled } => *signaled = false,
            _ => return Err(DriverError::InvalidHandle(query.0)),
        }
        let tables = Arc::clone(&self.tables);
        self.gpu.enqueue("event query", move || {
            // A query released before it signaled has nobody waiting for it.
            if let Some(Object::Query { signaled }) = tables.lock().objects.get_mut(&query) {
                *signaled = true;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn query_signaled(&self, query: D3D11Handle) -> Result<bool, DriverError> {
        self.gpu.check_alive()?;
        match self.tables.lock().get(query)? {
            Object::Query { signaled } => Ok(*signaled),
            _ => Err(DriverError::InvalidHandle(query.0)),
        }
    }

    fn wait_query(&self, query: D3D11Handle, timeout: Duration) -> Result<bool, DriverError> {
        self.query_signaled(query)?;
        self.gpu.wait_until(timeout, || {
            matches!(
                self.tables.lock().objects.get(&query),
                Some(Object::Query { signaled: true })
            )
        })
    }

    fn map_read(&self, staging: D3D11Handle) -> Result<Vec<u8>, DriverError> {
        self.gpu.check_alive()?;
        let tables = self.tables.lock();
        let (usage, data) = match tables.get(staging)? {
            Object::Buffer { desc, data } => (desc.usage, data),
            Object::Texture { desc, data, .. } => (desc.usage, data),
            _ => return Err(DriverError::InvalidHandle(staging.0)),
        };
        if usage != D3D11Usage::Staging {
            return Err(DriverError::Unsupported("mapping a non-staging resource".into()));
        }
        Ok(data.clone())
    }

    fn release(&self, object: D3D11Handle) {
        match self.tables.lock().objects.remove(&object) {
            Some(removed) => self.gpu.free(removed.memory_size()),
            None => log::warn!("software D3D11: release of unknown object {:?}", object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::software::SoftwareConfig;
    use crate::graphics::software::texel;
    use strata_core::renderer::Format;

    fn texture_desc(usage: D3D11Usage) -> D3D11TextureDesc {
        D3D11TextureDesc {
            kind: D3D11TextureKind::Texture2D,
            width: 2,
            height: 2,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: DxgiFormat::R8G8B8A8_UNORM,
            sample_count: 1,
            usage,
            bind_flags: D3D11BindFlags::RENDER_TARGET,
        }
    }

    fn rtv_desc() -> D3D11ViewDesc {
        D3D11ViewDesc::RenderTarget {
            format: DxgiFormat::R8G8B8A8_UNORM,
            subresources: D3D11TextureSubresources {
                most_detailed_mip: 0,
                mip_levels: 1,
                first_array_slice: 0,
                array_size: 1,
            },
        }
    }

    #[test]
    fn clear_then_copy_to_staging_reads_back_the_color() {
        // --- ARRANGE ---
        let driver = SoftwareD3D11::new(SoftwareGpu::new(SoftwareConfig::default()));
        let texture = driver
            .create_texture(&texture_desc(D3D11Usage::Default), None)
            .expect("texture");
        let staging = driver
            .create_texture(&texture_desc(D3D11Usage::Staging), None)
            .expect("staging");
        let rtv = driver.create_view(texture, &rtv_desc()).expect("rtv");

        // --- ACT ---
        driver
            .execute_command_list(D3D11CommandList {
                label: None,
                calls: vec![
                    D3D11Call::ClearRenderTargetView {
                        rtv,
                        color: [0.0, 1.0, 0.0, 1.0],
                    },
                    D3D11Call::CopyResource {
                        dst: staging,
                        src: texture,
                    },
                ],
            })
            .expect("execute");
        let bytes = driver.map_read(staging).expect("map");

        // --- ASSERT ---
        let green = texel::encode(Format::Rgba8Unorm, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(bytes, green.repeat(4));
        assert_eq!(driver.executed_lists().len(), 1);
    }

    #[test]
    fn mapping_a_default_resource_fails() {
        let driver = SoftwareD3D11::new(SoftwareGpu::new(SoftwareConfig::default()));
        let texture = driver
            .create_texture(&texture_desc(D3D11Usage::Default), None)
            .expect("texture");
        assert!(matches!(driver.map_read(texture), Err(DriverError::Unsupported(_))));
    }

    #[test]
    fn queries_signal_once_the_queue_reaches_them() {
        // --- ARRANGE ---
        let gpu = SoftwareGpu::new(SoftwareConfig::manual());
        let driver = SoftwareD3D11::new(gpu.clone());
        let query = driver.create_event_query().expect("query");

        // --- ACT ---
        driver.end_query(query).expect("end");
        let before = driver.query_signaled(query).expect("poll");
        gpu.complete_all();

        // --- ASSERT ---
        assert!(!before);
        assert!(driver.query_signaled(query).expect("poll"));
        assert!(driver.wait_query(query, Duration::ZERO).expect("wait"));
    }

    #[test]
    fn released_memory_returns_to_the_budget() {
        let gpu = SoftwareGpu::new(SoftwareConfig::default());
        let driver = SoftwareD3D11::new(gpu.clone());
        let texture = driver
            .create_texture(&texture_desc(D3D11Usage::Default), None)
            .expect("texture");
        assert_eq!(gpu.allocated_bytes(), 16);
        driver.release(texture);
        assert_eq!(gpu.allocated_bytes(), 0);
        assert_eq!(driver.live_objects(), 0);
    }
}

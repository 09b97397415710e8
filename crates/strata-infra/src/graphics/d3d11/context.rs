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

//! Deferred-context recording with read/write hazard tracking.
//!
//! D3D11 has no barriers. The runtime silently unbinds a resource from its shader
//! resource slots when it is bound for writing, and refuses the write binding while it
//! is still bound for reading elsewhere. The [`DeferredContext`] tracks every binding
//! and emits the unbinds explicitly where a Strata barrier moves a resource between
//! read and write states, so the native stream never relies on runtime fix-ups.

use super::driver::{D3D11Handle, D3D11Stage, D3D11Topology, DxgiFormat};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use strata_core::renderer::{ResourceId, ResourceState};

/// One call recorded on a deferred context.
#[derive(Debug, Clone, PartialEq)]
pub enum D3D11Call {
    /// `OMSetRenderTargetsAndUnorderedAccessViews`.
    SetRenderTargets {
        rtvs: Vec<D3D11Handle>,
        dsv: Option<D3D11Handle>,
        uavs: Vec<(u32, D3D11Handle)>,
    },
    /// `ClearRenderTargetView`.
    ClearRenderTargetView { rtv: D3D11Handle, color: [f32; 4] },
    /// `ClearDepthStencilView`; a `None` component is not cleared.
    ClearDepthStencilView {
        dsv: D3D11Handle,
        depth: Option<f32>,
        stencil: Option<u8>,
    },
    /// `RSSetViewports` with one viewport at the origin.
    SetViewport { width: f32, height: f32 },
    /// `RSSetState`.
    SetRasterizerState(D3D11Handle),
    /// `OMSetBlendState`.
    SetBlendState {
        state: D3D11Handle,
        blend_factor: [f32; 4],
    },
    /// `OMSetDepthStencilState`.
    SetDepthStencilState {
        state: Option<D3D11Handle>,
        stencil_ref: u32,
    },
    /// `IASetPrimitiveTopology`.
    SetPrimitiveTopology(D3D11Topology),
    /// `IASetInputLayout`.
    SetInputLayout(Option<D3D11Handle>),
    /// `IASetVertexBuffers`: `(buffer, stride, offset)` per slot.
    SetVertexBuffers {
        start_slot: u32,
        buffers: Vec<(D3D11Handle, u64, u64)>,
    },
    /// `IASetIndexBuffer`.
    SetIndexBuffer {
        buffer: D3D11Handle,
        format: DxgiFormat,
        offset: u64,
    },
    /// `{VS,PS,CS}SetShader`.
    SetShader {
        stage: D3D11Stage,
        shader: Option<D3D11Handle>,
    },
    /// `{VS,PS,CS}SetShaderResources`.
    SetShaderResources {
        stage: D3D11Stage,
        start_slot: u32,
        views: Vec<Option<D3D11Handle>>,
    },
    /// `{VS,PS,CS}SetConstantBuffers1`: `(buffer, first byte)` per slot.
    SetConstantBuffers {
        stage: D3D11Stage,
        start_slot: u32,
        buffers: Vec<Option<(D3D11Handle, u64)>>,
    },
    /// `CSSetUnorderedAccessViews`.
    SetUnorderedAccessViews {
        start_slot: u32,
        views: Vec<Option<D3D11Handle>>,
    },
    /// `DrawInstanced`.
    Draw {
        vertex_count: u32,
        start_vertex: u32,
        instance_count: u32,
        start_instance: u32,
    },
    /// `DrawIndexedInstanced`.
    DrawIndexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
        instance_count: u32,
        start_instance: u32,
    },
    /// `Dispatch`.
    Dispatch { x: u32, y: u32, z: u32 },
    /// `CopySubresourceRegion` between buffers.
    CopyBufferRegion {
        dst: D3D11Handle,
        dst_offset: u64,
        src: D3D11Handle,
        src_offset: u64,
        size: u64,
    },
    /// `CopySubresourceRegion` between textures.
    CopySubresourceRegion {
        dst: D3D11Handle,
        dst_subresource: u32,
        dst_origin: [u32; 3],
        src: D3D11Handle,
        src_subresource: u32,
        src_origin: [u32; 3],
        extent: [u32; 3],
    },
    /// `CopyResource`.
    CopyResource { dst: D3D11Handle, src: D3D11Handle },
    /// `UpdateSubresource` of a buffer range.
    UpdateSubresource {
        dst: D3D11Handle,
        offset: u64,
        data: Arc<[u8]>,
    },
}

impl D3D11Call {
    /// The native entry point the call stands for.
    pub fn name(&self) -> &'static str {
        match self {
            D3D11Call::SetRenderTargets { .. } => "OMSetRenderTargetsAndUnorderedAccessViews",
            D3D11Call::ClearRenderTargetView { .. } => "ClearRenderTargetView",
            D3D11Call::ClearDepthStencilView { .. } => "ClearDepthStencilView",
            D3D11Call::SetViewport { .. } => "RSSetViewports",
            D3D11Call::SetRasterizerState(_) => "RSSetState",
            D3D11Call::SetBlendState { .. } => "OMSetBlendState",
            D3D11Call::SetDepthStencilState { .. } => "OMSetDepthStencilState",
            D3D11Call::SetPrimitiveTopology(_) => "IASetPrimitiveTopology",
            D3D11Call::SetInputLayout(_) => "IASetInputLayout",
            D3D11Call::SetVertexBuffers { .. } => "IASetVertexBuffers",
            D3D11Call::SetIndexBuffer { .. } => "IASetIndexBuffer",
            D3D11Call::SetShader { .. } => "SetShader",
            D3D11Call::SetShaderResources { .. } => "SetShaderResources",
            D3D11Call::SetConstantBuffers { .. } => "SetConstantBuffers1",
            D3D11Call::SetUnorderedAccessViews { .. } => "CSSetUnorderedAccessViews",
            D3D11Call::Draw { .. } => "DrawInstanced",
            D3D11Call::DrawIndexed { .. } => "DrawIndexedInstanced",
            D3D11Call::Dispatch { .. } => "Dispatch",
            D3D11Call::CopyBufferRegion { .. } | D3D11Call::CopySubresourceRegion { .. } => {
                "CopySubresourceRegion"
            }
            D3D11Call::CopyResource { .. } => "CopyResource",
            D3D11Call::UpdateSubresource { .. } => "UpdateSubresource",
        }
    }
}

/// A finished deferred-context recording, executed on the immediate context.
#[derive(Debug, Clone, PartialEq)]
pub struct D3D11CommandList {
    /// The label of the batch it was translated from.
    pub label: Option<String>,
    /// The recorded calls, in order.
    pub calls: Vec<D3D11Call>,
}

/// Where a resource is bound for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WriteBinding {
    /// A render target or writable depth target of the output merger.
    OutputMerger,
    /// A compute unordered-access slot.
    ComputeUav(u32),
}

/// Records calls while tracking which resources each binding holds.
#[derive(Debug, Default)]
pub struct DeferredContext {
    calls: Vec<D3D11Call>,
    read_bindings: FxHashMap<ResourceId, Vec<(D3D11Stage, u32)>>,
    write_bindings: FxHashMap<ResourceId, FxHashSet<WriteBinding>>,
    bindings_dirty: bool,
}

impl DeferredContext {
    /// Starts an empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `call` as is.
    pub fn record(&mut self, call: D3D11Call) {
        self.calls.push(call);
    }

    /// Binds targets to the output merger. Resources still bound for reading are
    /// unbound first. `targets` lists the resources written through the views.
    pub fn bind_targets(
        &mut self,
        rtvs: Vec<D3D11Handle>,
        dsv: Option<D3D11Handle>,
        uavs: Vec<(u32, D3D11Handle)>,
        targets: &[ResourceId],
    ) {
        for resource in targets {
            self.unbind_reads(*resource);
        }
        for bindings in self.write_bindings.values_mut() {
            bindings.remove(&WriteBinding::OutputMerger);
        }
        for resource in targets {
            self.write_bindings
                .entry(*resource)
                .or_default()
                .insert(WriteBinding::OutputMerger);
        }
        self.calls
            .push(D3D11Call::SetRenderTargets { rtvs, dsv, uavs });
    }

    /// Binds a view for reading at `stage`/`slot`. A resource still bound for writing is
    /// unbound first.
    pub fn bind_shader_resource(
        &mut self,
        stage: D3D11Stage,
        slot: u32,
        view: D3D11Handle,
        resource: ResourceId,
    ) {
        self.unbind_writes(resource);
        self.read_bindings
            .entry(resource)
            .or_default()
            .push((stage, slot));
        self.calls.push(D3D11Call::SetShaderResources {
            stage,
            start_slot: slot,
            views: vec![Some(view)],
        });
    }

    /// Binds a view for compute writes at `slot`.
    pub fn bind_unordered_access(&mut self, slot: u32, view: D3D11Handle, resource: ResourceId) {
        self.unbind_reads(resource);
        self.write_bindings
            .entry(resource)
            .or_default()
            .insert(WriteBinding::ComputeUav(slot));
        self.calls.push(D3D11Call::SetUnorderedAccessViews {
            start_slot: slot,
            views: vec![Some(view)],
        });
    }

    /// Emits the unbinds a move of `resource` into `state` requires.
    /// ## Returns
    /// The number of unbind calls emitted; zero means the barrier needed no native work.
    pub fn transition(&mut self, resource: ResourceId, state: ResourceState) -> usize {
        let emitted = if state.is_write() {
            self.unbind_reads(resource)
        } else {
            self.unbind_writes(resource)
        };
        if emitted > 0 {
            self.bindings_dirty = true;
        }
        emitted
    }

    /// Returns `true` once, after an unbind removed bindings a later draw still needs.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.bindings_dirty)
    }

    /// Number of calls recorded so far.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Closes the recording (`FinishCommandList`).
    pub fn finish(self, label: Option<&str>) -> D3D11CommandList {
        D3D11CommandList {
            label: label.map(str::to_owned),
            calls: self.calls,
        }
    }

    fn unbind_reads(&mut self, resource: ResourceId) -> usize {
        let Some(slots) = self.read_bindings.remove(&resource) else {
            return 0;
        };
        let count = slots.len();
        for (stage, slot) in slots {
            self.calls.push(D3D11Call::SetShaderResources {
                stage,
                start_slot: slot,
                views: vec![None],
            });
        }
        count
    }

    fn unbind_writes(&mut self, resource: ResourceId) -> usize {
        let Some(bindings) = self.write_bindings.remove(&resource) else {
            return 0;
        };
        let mut count = 0;
        for binding in bindings {
            match binding {
                WriteBinding::OutputMerger => {
                    for others in self.write_bindings.values_mut() {
                        others.remove(&WriteBinding::OutputMerger);
                    }
                    self.calls.push(D3D11Call::SetRenderTargets {
                        rtvs: Vec::new(),
                        dsv: None,
                        uavs: Vec::new(),
                    });
                }
                WriteBinding::ComputeUav(slot) => {
                    self.calls.push(D3D11Call::SetUnorderedAccessViews {
                        start_slot: slot,
                        views: vec![None],
                    });
                }
            }
            count += 1;
        }
        self.write_bindings.retain(|_, b| !b.is_empty());
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::renderer::DeviceId;

    fn resource(index: u32) -> ResourceId {
        ResourceId::new(DeviceId(4), index)
    }

    #[test]
    fn reading_a_render_target_unbinds_the_output_merger() {
        // --- ARRANGE ---
        let mut ctx = DeferredContext::new();
        ctx.bind_targets(vec![D3D11Handle(10)], None, Vec::new(), &[resource(0)]);

        // --- ACT ---
        let emitted = ctx.transition(resource(0), ResourceState::ShaderRead);
        let again = ctx.transition(resource(0), ResourceState::ShaderRead);

        // --- ASSERT ---
        assert_eq!(emitted, 1);
        assert_eq!(again, 0);
        assert!(ctx.take_dirty());
        let list = ctx.finish(None);
        assert_eq!(
            list.calls.last(),
            Some(&D3D11Call::SetRenderTargets {
                rtvs: Vec::new(),
                dsv: None,
                uavs: Vec::new()
            })
        );
    }

    #[test]
    fn binding_a_target_unbinds_its_shader_resource_slots() {
        // --- ARRANGE ---
        let mut ctx = DeferredContext::new();
        ctx.bind_shader_resource(D3D11Stage::Pixel, 2, D3D11Handle(20), resource(1));

        // --- ACT ---
        ctx.bind_targets(vec![D3D11Handle(21)], None, Vec::new(), &[resource(1)]);

        // --- ASSERT ---
        let names: Vec<_> = ctx.finish(None).calls.iter().map(D3D11Call::name).collect();
        assert_eq!(
            names,
            [
                "SetShaderResources",
                "SetShaderResources",
                "OMSetRenderTargetsAndUnorderedAccessViews"
            ]
        );
    }

    #[test]
    fn unrelated_barriers_are_elided() {
        let mut ctx = DeferredContext::new();
        assert_eq!(ctx.transition(resource(5), ResourceState::CopyDst), 0);
        assert!(ctx.is_empty());
        assert!(!ctx.take_dirty());
    }
}

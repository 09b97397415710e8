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

//! Command buffer recording with dynamic rendering scopes.
//!
//! Pipeline barriers and transfers are not allowed inside `vkCmdBeginRendering`. The
//! [`CommandRecorder`] ends the open scope in front of them and resumes it before the
//! next draw, loading what the previous part of the scope stored. Commands are never
//! moved: the bracketing is inserted where it is needed.

use super::driver::*;
use std::sync::Arc;

/// `VkAttachmentLoadOp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkLoadOp {
    Load,
    Clear,
    DontCare,
}

/// `VkRenderingAttachmentInfo` of a color attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VkColorAttachment {
    pub view: VkHandle,
    pub layout: VkImageLayout,
    pub load_op: VkLoadOp,
    pub clear: [f32; 4],
    pub store: bool,
}

/// `VkRenderingAttachmentInfo` of the depth/stencil attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VkDepthAttachment {
    pub view: VkHandle,
    pub layout: VkImageLayout,
    pub depth_load_op: VkLoadOp,
    pub clear_depth: f32,
    pub stencil_load_op: VkLoadOp,
    pub clear_stencil: u32,
    pub store: bool,
}

/// `VkRenderingInfo` with a render area at the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct VkRenderingInfo {
    pub extent: [u32; 2],
    pub colors: Vec<VkColorAttachment>,
    pub depth: Option<VkDepthAttachment>,
}

impl VkRenderingInfo {
    /// The same scope continuing where a previous part stopped: nothing is cleared.
    pub fn resumed(&self) -> Self {
        let keep = |op: VkLoadOp| match op {
            VkLoadOp::Clear => VkLoadOp::Load,
            other => other,
        };
        Self {
            extent: self.extent,
            colors: self
                .colors
                .iter()
                .map(|c| VkColorAttachment {
                    load_op: keep(c.load_op),
                    ..*c
                })
                .collect(),
            depth: self.depth.map(|d| VkDepthAttachment {
                depth_load_op: keep(d.depth_load_op),
                stencil_load_op: keep(d.stencil_load_op),
                ..d
            }),
        }
    }
}

/// The resource a pipeline barrier applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkBarrierTarget {
    /// `VkBufferMemoryBarrier` over the whole buffer.
    Buffer { buffer: VkHandle },
    /// `VkImageMemoryBarrier`.
    Image {
        image: VkHandle,
        old_layout: VkImageLayout,
        new_layout: VkImageLayout,
        range: VkImageSubresourceRange,
    },
}

/// One buffer or image barrier with its synchronization scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkBarrier {
    pub src_stage: VkPipelineStage,
    pub src_access: VkAccess,
    pub dst_stage: VkPipelineStage,
    pub dst_access: VkAccess,
    pub target: VkBarrierTarget,
}

/// `VkPipelineBindPoint`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkPipelineBindPoint {
    GRAPHICS,
    COMPUTE,
}

/// `VkBufferCopy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkBufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// `VkImageCopy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkImageCopy {
    pub src_subresource: VkImageSubresourceLayers,
    pub src_offset: [u32; 3],
    pub dst_subresource: VkImageSubresourceLayers,
    pub dst_offset: [u32; 3],
    pub extent: [u32; 3],
}

/// `VkBufferImageCopy` with tightly packed buffer rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkBufferImageCopy {
    pub buffer_offset: u64,
    pub image_subresource: VkImageSubresourceLayers,
    pub image_offset: [u32; 3],
    pub image_extent: [u32; 3],
}

/// One command recorded into a command buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum VkCommand {
    /// `vkCmdPipelineBarrier`.
    PipelineBarrier(VkBarrier),
    /// `vkCmdBeginRendering`.
    BeginRendering(VkRenderingInfo),
    /// `vkCmdEndRendering`.
    EndRendering,
    /// `vkCmdBindPipeline`.
    BindPipeline {
        bind_point: VkPipelineBindPoint,
        pipeline: VkHandle,
    },
    /// `vkCmdBindDescriptorSets` starting at set 0.
    BindDescriptorSets {
        bind_point: VkPipelineBindPoint,
        layout: VkHandle,
        sets: Vec<VkHandle>,
    },
    /// `vkCmdSetViewport` with one viewport at the origin.
    SetViewport { width: f32, height: f32 },
    /// `vkCmdSetScissor` with one rectangle at the origin.
    SetScissor { width: u32, height: u32 },
    /// `vkCmdSetBlendConstants`.
    SetBlendConstants([f32; 4]),
    /// `vkCmdBindVertexBuffers`.
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<(VkHandle, u64)>,
    },
    /// `vkCmdBindIndexBuffer`.
    BindIndexBuffer {
        buffer: VkHandle,
        offset: u64,
        index_type: VkIndexType,
    },
    /// `vkCmdDraw`.
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    /// `vkCmdDrawIndexed`.
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    /// `vkCmdDispatch`.
    Dispatch { x: u32, y: u32, z: u32 },
    /// `vkCmdCopyBuffer` with one region.
    CopyBuffer {
        src: VkHandle,
        dst: VkHandle,
        region: VkBufferCopy,
    },
    /// `vkCmdCopyImage` with one region.
    CopyImage {
        src: VkHandle,
        src_layout: VkImageLayout,
        dst: VkHandle,
        dst_layout: VkImageLayout,
        region: VkImageCopy,
    },
    /// `vkCmdCopyBufferToImage` with one region.
    CopyBufferToImage {
        buffer: VkHandle,
        image: VkHandle,
        layout: VkImageLayout,
        region: VkBufferImageCopy,
    },
    /// `vkCmdCopyImageToBuffer` with one region.
    CopyImageToBuffer {
        image: VkHandle,
        layout: VkImageLayout,
        buffer: VkHandle,
        region: VkBufferImageCopy,
    },
    /// `vkCmdUpdateBuffer`.
    UpdateBuffer {
        buffer: VkHandle,
        offset: u64,
        data: Arc<[u8]>,
    },
}

impl VkCommand {
    /// The native entry point the command stands for.
    pub fn name(&self) -> &'static str {
        match self {
            VkCommand::PipelineBarrier(_) => "vkCmdPipelineBarrier",
            VkCommand::BeginRendering(_) => "vkCmdBeginRendering",
            VkCommand::EndRendering => "vkCmdEndRendering",
            VkCommand::BindPipeline { .. } => "vkCmdBindPipeline",
            VkCommand::BindDescriptorSets { .. } => "vkCmdBindDescriptorSets",
            VkCommand::SetViewport { .. } => "vkCmdSetViewport",
            VkCommand::SetScissor { .. } => "vkCmdSetScissor",
            VkCommand::SetBlendConstants(_) => "vkCmdSetBlendConstants",
            VkCommand::BindVertexBuffers { .. } => "vkCmdBindVertexBuffers",
            VkCommand::BindIndexBuffer { .. } => "vkCmdBindIndexBuffer",
            VkCommand::Draw { .. } => "vkCmdDraw",
            VkCommand::DrawIndexed { .. } => "vkCmdDrawIndexed",
            VkCommand::Dispatch { .. } => "vkCmdDispatch",
            VkCommand::CopyBuffer { .. } => "vkCmdCopyBuffer",
            VkCommand::CopyImage { .. } => "vkCmdCopyImage",
            VkCommand::CopyBufferToImage { .. } => "vkCmdCopyBufferToImage",
            VkCommand::CopyImageToBuffer { .. } => "vkCmdCopyImageToBuffer",
            VkCommand::UpdateBuffer { .. } => "vkCmdUpdateBuffer",
        }
    }
}

/// A command buffer that finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct VkCommandBuffer {
    /// The label of the batch it was translated from.
    pub label: Option<String>,
    /// The recorded commands, in order.
    pub commands: Vec<VkCommand>,
}

#[derive(Debug, Default)]
enum Scope {
    #[default]
    Outside,
    Rendering(VkRenderingInfo),
    /// Ended for a barrier or a transfer; the info is already in its resumed form.
    Suspended(VkRenderingInfo),
}

/// Records commands and keeps track of the dynamic rendering scope.
#[derive(Debug, Default)]
pub struct CommandRecorder {
    commands: Vec<VkCommand>,
    scope: Scope,
}

impl CommandRecorder {
    /// Starts an empty command buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `command` as is.
    pub fn record(&mut self, command: VkCommand) {
        self.commands.push(command);
    }

    /// Opens a rendering scope, closing the previous one.
    pub fn begin_rendering(&mut self, info: VkRenderingInfo) {
        self.end_rendering();
        self.commands.push(VkCommand::BeginRendering(info.clone()));
        self.scope = Scope::Rendering(info);
    }

    /// Ends the open scope so a barrier or a transfer can be recorded.
    /// Returns `true` if a scope was open.
    pub fn suspend(&mut self) -> bool {
        match std::mem::take(&mut self.scope) {
            Scope::Rendering(info) => {
                self.commands.push(VkCommand::EndRendering);
                self.scope = Scope::Suspended(info.resumed());
                true
            }
            other => {
                self.scope = other;
                false
            }
        }
    }

    /// Reopens a suspended scope before a draw. Returns `true` if one was reopened.
    pub fn resume(&mut self) -> bool {
        match std::mem::take(&mut self.scope) {
            Scope::Suspended(info) => {
                self.commands.push(VkCommand::BeginRendering(info.clone()));
                self.scope = Scope::Rendering(info);
                true
            }
            other => {
                self.scope = other;
                false
            }
        }
    }

    /// Closes the current scope for good.
    pub fn end_rendering(&mut self) {
        if let Scope::Rendering(_) = std::mem::take(&mut self.scope) {
            self.commands.push(VkCommand::EndRendering);
        }
    }

    /// Returns `true` while a rendering scope is open.
    pub fn is_rendering(&self) -> bool {
        matches!(self.scope, Scope::Rendering(_))
    }

    /// Number of commands recorded so far.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Ends recording (`vkEndCommandBuffer`), closing an open scope.
    pub fn finish(mut self, label: Option<&str>) -> VkCommandBuffer {
        self.end_rendering();
        VkCommandBuffer {
            label: label.map(str::to_owned),
            commands: self.commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clearing_scope() -> VkRenderingInfo {
        VkRenderingInfo {
            extent: [4, 4],
            colors: vec![VkColorAttachment {
                view: VkHandle(1),
                layout: VkImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                load_op: VkLoadOp::Clear,
                clear: [0.0, 0.0, 1.0, 1.0],
                store: true,
            }],
            depth: None,
        }
    }

    fn draw() -> VkCommand {
        VkCommand::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    #[test]
    fn suspended_scope_resumes_without_clearing() {
        // --- ARRANGE ---
        let mut recorder = CommandRecorder::new();
        recorder.begin_rendering(clearing_scope());
        recorder.record(draw());

        // --- ACT ---
        assert!(recorder.suspend());
        recorder.record(VkCommand::UpdateBuffer {
            buffer: VkHandle(9),
            offset: 0,
            data: Arc::from(vec![1u8, 2, 3, 4]),
        });
        assert!(recorder.resume());
        recorder.record(draw());
        let buffer = recorder.finish(Some("frame"));

        // --- ASSERT ---
        let names: Vec<_> = buffer.commands.iter().map(VkCommand::name).collect();
        assert_eq!(
            names,
            [
                "vkCmdBeginRendering",
                "vkCmdDraw",
                "vkCmdEndRendering",
                "vkCmdUpdateBuffer",
                "vkCmdBeginRendering",
                "vkCmdDraw",
                "vkCmdEndRendering",
            ]
        );
        match &buffer.commands[4] {
            VkCommand::BeginRendering(info) => {
                assert_eq!(info.colors[0].load_op, VkLoadOp::Load)
            }
            other => panic!("expected a resumed scope, got {other:?}"),
        }
        assert_eq!(buffer.label.as_deref(), Some("frame"));
    }

    #[test]
    fn suspend_and_resume_outside_a_scope_record_nothing() {
        let mut recorder = CommandRecorder::new();
        assert!(!recorder.suspend());
        assert!(!recorder.resume());
        assert!(recorder.is_empty());
    }

    #[test]
    fn a_new_scope_closes_the_previous_one() {
        // --- ARRANGE ---
        let mut recorder = CommandRecorder::new();
        recorder.begin_rendering(clearing_scope());

        // --- ACT ---
        recorder.begin_rendering(clearing_scope());

        // --- ASSERT ---
        assert!(recorder.is_rendering());
        assert_eq!(recorder.len(), 3);
        assert_eq!(recorder.finish(None).commands.len(), 4);
    }
}

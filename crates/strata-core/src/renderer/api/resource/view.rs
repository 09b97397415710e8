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

//! Typed windows onto a subresource range of a texture.

use super::{
    format::Format,
    handle::{Resource, WeakResource},
    state::ResourceState,
    usage::ResourceUsage,
};
use crate::math::Extent3D;
use crate::renderer::api::core::ResourceId;
use crate::renderer::error::RhiError;
use crate::renderer::validation;

/// How a view exposes its subresources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ViewKind {
    /// A color target.
    RenderTarget,
    /// A sampled or loaded texture.
    ShaderResource,
    /// A writable depth/stencil target.
    DepthTarget,
    /// A depth/stencil target the pass only tests against.
    ReadOnlyDepth,
    /// A texture read and written by shaders.
    UnorderedAccess,
}

impl ViewKind {
    /// The usage the underlying resource must declare.
    pub fn required_usage(self) -> ResourceUsage {
        match self {
            ViewKind::RenderTarget => ResourceUsage::RENDER_TARGET,
            ViewKind::ShaderResource => ResourceUsage::SHADER_READ,
            ViewKind::DepthTarget | ViewKind::ReadOnlyDepth => ResourceUsage::DEPTH_STENCIL,
            ViewKind::UnorderedAccess => ResourceUsage::SHADER_WRITE,
        }
    }

    /// The state the resource must be in while the view is used.
    pub fn required_state(self) -> ResourceState {
        match self {
            ViewKind::RenderTarget => ResourceState::RenderTarget,
            ViewKind::ShaderResource => ResourceState::ShaderRead,
            ViewKind::DepthTarget => ResourceState::DepthWrite,
            ViewKind::ReadOnlyDepth => ResourceState::DepthRead,
            ViewKind::UnorderedAccess => ResourceState::ShaderWrite,
        }
    }

    /// Returns `true` if the view may only cover a single mip level.
    pub fn is_single_mip(self) -> bool {
        !matches!(self, ViewKind::ShaderResource)
    }
}

/// A range of mip levels and array layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubresourceRange {
    /// First mip level of the range.
    pub base_mip_level: u32,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// First array layer of the range.
    pub base_array_layer: u32,
    /// Number of array layers.
    pub array_layer_count: u32,
}

impl SubresourceRange {
    /// A range covering one mip level of one array layer.
    pub const fn single(mip_level: u32, array_layer: u32) -> Self {
        Self {
            base_mip_level: mip_level,
            mip_level_count: 1,
            base_array_layer: array_layer,
            array_layer_count: 1,
        }
    }

    /// Returns `true` if the range selects nothing.
    pub const fn is_empty(&self) -> bool {
        self.mip_level_count == 0 || self.array_layer_count == 0
    }
}

/// A typed window onto a texture.
///
/// A view does not keep its resource alive: it holds a weak reference, and a pass built
/// from a view whose resource has been dropped or destroyed is rejected.
#[derive(Debug, Clone)]
pub struct View {
    resource: WeakResource,
    kind: ViewKind,
    format: Format,
    range: SubresourceRange,
    extent: Extent3D,
    sample_count: u32,
}

impl View {
    /// Creates a view of `range` of `resource`, interpreted as `kind`, using the
    /// resource's own format.
    ///
    /// # Errors
    ///
    /// Fails with a validation error if the resource is a buffer or has been destroyed,
    /// if the range is empty or out of bounds, if the resource's usage does not permit
    /// `kind`, or if `kind` requires a single mip level.
    pub fn of(
        resource: &Resource,
        range: SubresourceRange,
        kind: ViewKind,
    ) -> Result<View, RhiError> {
        Self::with_format(resource, range, kind, resource.format())
    }

    /// Like [`View::of`], reinterpreting the texels as `format`. Only sRGB/linear
    /// pairs of the resource format are accepted.
    pub fn with_format(
        resource: &Resource,
        range: SubresourceRange,
        kind: ViewKind,
        format: Format,
    ) -> Result<View, RhiError> {
        validation::validate_view(resource, &range, kind, format)?;
        let extent = resource
            .kind()
            .mip_extent(range.base_mip_level)
            .unwrap_or_default();
        Ok(View {
            resource: resource.downgrade(),
            kind,
            format,
            range,
            extent: if resource.kind().is_volumetric() {
                extent
            } else {
                Extent3D {
                    depth_or_array_layers: range.array_layer_count,
                    ..extent
                }
            },
            sample_count: resource.kind().sample_count(),
        })
    }

    /// A view of mip level zero across every array layer.
    pub fn whole(resource: &Resource, kind: ViewKind) -> Result<View, RhiError> {
        let full = resource.full_range();
        let range = if kind.is_single_mip() {
            SubresourceRange {
                mip_level_count: 1,
                ..full
            }
        } else {
            full
        };
        Self::of(resource, range, kind)
    }

    /// The viewed resource, if any handle to it is still alive.
    pub fn resource(&self) -> Option<Resource> {
        self.resource.upgrade()
    }

    /// The handle of the viewed resource.
    pub fn resource_id(&self) -> ResourceId {
        self.resource.id()
    }

    /// How the view exposes its subresources.
    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    /// The format texels are interpreted as.
    pub fn format(&self) -> Format {
        self.format
    }

    /// The viewed subresources.
    pub fn range(&self) -> SubresourceRange {
        self.range
    }

    /// Extent of the base mip level; the third component counts the viewed layers.
    pub fn extent(&self) -> Extent3D {
        self.extent
    }

    /// Samples per texel of the viewed resource.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::core::DeviceId;
    use crate::renderer::api::resource::ResourceDescriptor;
    use crate::renderer::error::ValidationError;

    fn texture(usage: ResourceUsage, mips: u32) -> Resource {
        let desc = ResourceDescriptor::texture_2d(None, 32, 32, Format::Rgba8UnormSrgb, usage)
            .with_mip_levels(mips);
        Resource::new(ResourceId::new(DeviceId(3), 0), &desc)
    }

    #[test]
    fn view_requires_matching_usage() {
        let resource = texture(ResourceUsage::SHADER_READ, 1);
        assert!(View::whole(&resource, ViewKind::ShaderResource).is_ok());
        let err = View::whole(&resource, ViewKind::RenderTarget).unwrap_err();
        assert!(matches!(
            err,
            RhiError::Validation(ValidationError::ViewUsageMissing { .. })
        ));
    }

    #[test]
    fn render_target_views_cover_one_mip() {
        let resource = texture(ResourceUsage::RENDER_TARGET, 4);
        let range = SubresourceRange {
            base_mip_level: 0,
            mip_level_count: 2,
            base_array_layer: 0,
            array_layer_count: 1,
        };
        assert!(View::of(&resource, range, ViewKind::RenderTarget).is_err());
        let view = View::of(&resource, SubresourceRange::single(2, 0), ViewKind::RenderTarget)
            .unwrap();
        assert_eq!(view.extent(), Extent3D::d2(8, 8));
    }

    #[test]
    fn out_of_range_subresources_are_rejected() {
        let resource = texture(ResourceUsage::SHADER_READ, 2);
        assert!(View::of(&resource, SubresourceRange::single(2, 0), ViewKind::ShaderResource)
            .is_err());
        assert!(View::of(&resource, SubresourceRange::single(0, 1), ViewKind::ShaderResource)
            .is_err());
    }

    #[test]
    fn srgb_view_of_linear_data_is_allowed() {
        let resource = texture(ResourceUsage::SHADER_READ, 1);
        let view = View::with_format(
            &resource,
            resource.full_range(),
            ViewKind::ShaderResource,
            Format::Rgba8Unorm,
        )
        .unwrap();
        assert_eq!(view.format(), Format::Rgba8Unorm);
        assert!(View::with_format(
            &resource,
            resource.full_range(),
            ViewKind::ShaderResource,
            Format::R32Float,
        )
        .is_err());
    }
}

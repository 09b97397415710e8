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

//! Shared fixtures: one device per backend on a software GPU, plus the small
//! technique and target builders most tests need.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use strata_core::math::LinearRgba;
use strata_core::renderer::*;
use strata_core::{Device, RhiError};
use strata_infra::graphics::d3d11::D3D11Call;
use strata_infra::graphics::software::{SoftwareConfig, SoftwareD3D11, SoftwareGpu, SoftwareVulkan};
use strata_infra::graphics::vulkan::VkCommand;
use strata_infra::graphics::{D11Device, D3D11Driver, VlkDevice, VulkanDriver};

/// Generous bound for waits that complete immediately on the software GPU.
pub const WAIT: Duration = Duration::from_secs(5);

/// Routes `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The instrumented driver behind a device.
pub enum Native {
    D3D11(Arc<SoftwareD3D11>),
    Vulkan(Arc<SoftwareVulkan>),
}

/// A device on a software GPU, with the driver kept for inspection.
pub struct Harness {
    pub gpu: SoftwareGpu,
    pub device: Arc<dyn Device>,
    pub native: Native,
}

impl Harness {
    /// Opens a device of `backend` on a fresh GPU configured by `config`.
    pub fn new(backend: BackendType, config: SoftwareConfig) -> Result<Self, RhiError> {
        init_logging();
        let gpu = SoftwareGpu::new(config);
        let descriptor = DeviceDescriptor {
            label: Some(format!("{backend} test device")),
            backend,
            debug_validation: true,
        };
        Ok(match backend {
            BackendType::D3D11 => {
                let driver = Arc::new(SoftwareD3D11::new(gpu.clone()));
                let seam: Arc<dyn D3D11Driver> = driver.clone();
                Self {
                    gpu,
                    device: Arc::new(D11Device::new(&descriptor, seam)?),
                    native: Native::D3D11(driver),
                }
            }
            BackendType::Vulkan => {
                let driver = Arc::new(SoftwareVulkan::new(gpu.clone()));
                let seam: Arc<dyn VulkanDriver> = driver.clone();
                Self {
                    gpu,
                    device: Arc::new(VlkDevice::new(&descriptor, seam)?),
                    native: Native::Vulkan(driver),
                }
            }
        })
    }

    /// One harness per backend, completing work as soon as it is queued.
    pub fn each() -> Result<Vec<Self>, RhiError> {
        Self::each_with(SoftwareConfig::default)
    }

    /// One harness per backend, each on its own GPU built from `config`.
    pub fn each_with(config: impl Fn() -> SoftwareConfig) -> Result<Vec<Self>, RhiError> {
        [BackendType::D3D11, BackendType::Vulkan]
            .into_iter()
            .map(|backend| Self::new(backend, config()))
            .collect()
    }

    pub fn backend(&self) -> BackendType {
        self.device.backend()
    }

    /// Names of the native calls of every submission, in submission order.
    pub fn native_streams(&self) -> Vec<Vec<&'static str>> {
        match &self.native {
            Native::D3D11(driver) => driver
                .executed_lists()
                .iter()
                .map(|list| list.calls.iter().map(D3D11Call::name).collect())
                .collect(),
            Native::Vulkan(driver) => driver
                .submitted_buffers()
                .iter()
                .map(|buffer| buffer.commands.iter().map(VkCommand::name).collect())
                .collect(),
        }
    }

    /// Byte offsets of the buffer updates in the last submission, in native order.
    pub fn last_update_offsets(&self) -> Vec<u64> {
        match &self.native {
            Native::D3D11(driver) => driver
                .executed_lists()
                .last()
                .map(|list| {
                    list.calls
                        .iter()
                        .filter_map(|call| match call {
                            D3D11Call::UpdateSubresource { offset, .. } => Some(*offset),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Native::Vulkan(driver) => driver
                .submitted_buffers()
                .last()
                .map(|buffer| {
                    buffer
                        .commands
                        .iter()
                        .filter_map(|command| match command {
                            VkCommand::UpdateBuffer { offset, .. } => Some(*offset),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Native objects the driver still holds.
    pub fn live_native_objects(&self) -> usize {
        match &self.native {
            Native::D3D11(driver) => driver.live_objects(),
            Native::Vulkan(driver) => driver.live_objects(),
        }
    }

    /// Everything the Vulkan validation layer reported. Always empty on D3D11.
    pub fn validation_messages(&self) -> Vec<String> {
        match &self.native {
            Native::D3D11(_) => Vec::new(),
            Native::Vulkan(driver) => driver.validation_messages(),
        }
    }
}

// --- Fixtures ---

/// Opaque bytecode accepted by both software drivers.
pub fn bytecode() -> Arc<[u8]> {
    Arc::from(vec![0x03u8, 0x02, 0x23, 0x07])
}

pub fn program(stage: ShaderStage, interface: StageInterface) -> StageProgram {
    StageProgram {
        stage,
        entry_point: "main".to_owned(),
        bytecode: bytecode(),
        interface,
    }
}

/// A full-screen technique drawing `constant` into one color target of `format`.
pub fn constant_technique(label: &str, format: Format, constant: LinearRgba) -> TechniqueDescriptor {
    TechniqueDescriptor {
        label: Some(label.to_owned()),
        stages: vec![
            program(ShaderStage::Vertex, StageInterface::default()),
            program(
                ShaderStage::Fragment,
                StageInterface {
                    color_outputs: 1,
                    ..Default::default()
                },
            ),
        ],
        blend: BlendState {
            constant,
            ..Default::default()
        },
        color_formats: vec![format],
        ..Default::default()
    }
}

pub fn empty_layout(device: &dyn Device) -> Result<Layout, RhiError> {
    device.create_layout(&LayoutDescriptor::default())
}

/// A 2D color target that can be read back.
pub fn color_target(
    device: &dyn Device,
    label: &str,
    width: u32,
    height: u32,
    format: Format,
) -> Result<(Resource, View), RhiError> {
    let resource = device.create_resource(&ResourceDescriptor::texture_2d(
        Some(label),
        width,
        height,
        format,
        ResourceUsage::RENDER_TARGET | ResourceUsage::COPY_SRC,
    ))?;
    let view = View::whole(&resource, ViewKind::RenderTarget)?;
    Ok((resource, view))
}

/// A pass clearing `view` to `clear` with `technique`.
pub fn clearing_pass(
    device: &dyn Device,
    label: &str,
    technique: &Technique,
    view: View,
    clear: LinearRgba,
) -> Result<Pass, RhiError> {
    device.create_pass(
        &PassDescriptor::new(Some(label), technique),
        &PassTargets::color(ColorTarget::cleared(view, clear)),
        &[],
    )
}

/// Every texel of `bytes` equals `texel`.
pub fn all_texels_are(bytes: &[u8], texel: &[u8]) -> bool {
    !bytes.is_empty() && bytes.chunks_exact(texel.len()).all(|chunk| chunk == texel)
}

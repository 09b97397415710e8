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

//! Concrete backends of the Strata render hardware interface.
//!
//! Two devices implement [`strata_core::Device`]: [`graphics::D11Device`], which
//! translates batches into D3D11 style deferred command lists, and
//! [`graphics::VlkDevice`], which translates them into Vulkan style command buffers.
//! Both talk to the GPU through a driver seam, and [`graphics::software`] implements
//! both seams on CPU memory.

pub mod graphics;

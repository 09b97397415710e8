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

//! GPU resources, their views, declared usage and tracked state.

pub mod barrier;
pub mod descriptor;
pub mod format;
pub mod handle;
pub mod state;
pub mod usage;
pub mod view;

pub use self::barrier::BarrierCommand;
pub use self::descriptor::{
    ResourceDescriptor, ResourceKind, SubresourceFootprint, TextureDimension,
};
pub use self::format::Format;
pub use self::handle::{Resource, WeakResource};
pub use self::state::ResourceState;
pub use self::usage::ResourceUsage;
pub use self::view::{SubresourceRange, View, ViewKind};

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

//! Layouts, techniques, meshes and the fixed-function state they carry.

pub mod enums;
pub mod fixed_function;
pub mod layout;
pub mod mesh;
pub mod technique;

pub use self::enums::*;
pub use self::fixed_function::*;
pub use self::layout::{Layout, LayoutDescriptor, SlotDescriptor, SlotKind};
pub use self::mesh::{Mesh, MeshDescriptor, MeshIndexBuffer, MeshVertexBuffer};
pub use self::technique::{
    SlotRequirement, StageInterface, StageProgram, Technique, TechniqueDescriptor, TechniqueKind,
    VertexInput,
};

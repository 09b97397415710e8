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

//! Backend-agnostic rendering API.
//!
//! Organized into several logical sub-modules:
//!
//! - **[`core`]**: Handles, backend selection and device statistics.
//! - **[`resource`]**: Resources, views, formats, usages, states and barriers.
//! - **[`pipeline`]**: Layouts, techniques, meshes and fixed-function state.
//! - **[`command`]**: Passes, batches and completion tokens.

pub mod command;
pub mod core;
pub mod pipeline;
pub mod resource;

pub use self::command::*;
pub use self::core::*;
pub use self::pipeline::*;
pub use self::resource::*;

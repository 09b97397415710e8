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

//! Provides the public, backend-agnostic rendering contracts of Strata.
//!
//! This module defines the "common language" every backend speaks: the [`Device`]
//! trait, the entity types it creates ([`Resource`], [`View`], [`Layout`], [`Mesh`],
//! [`Technique`], [`Pass`], [`Batch`]), the [`CompletionToken`] returned by
//! submission, and the error hierarchy.
//!
//! The 'what' lives here, the 'how' lives in a concrete backend from the
//! `strata-infra` crate (a Direct3D 11 style or a Vulkan style device) that implements
//! these traits. Validation is shared through [`validation`] so both backends reject
//! the same descriptors with the same errors.

pub mod api;
pub mod error;
pub mod traits;
pub mod validation;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::error::{
    LayoutMismatchError, MismatchReason, RhiError, StateConflictError, ValidationError,
};
pub use self::traits::Device;

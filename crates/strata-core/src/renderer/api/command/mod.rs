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

//! Pass topology, batch recording and submission completion.

pub mod batch;
pub mod pass;
pub mod token;

pub use self::batch::{Batch, BufferCopy, Command, TextureCopy, TextureRegion};
pub use self::pass::{
    ColorTarget, DepthTarget, FeedbackFlags, InputBinding, LoadOp, Pass, PassDescriptor,
    PassInput, PassTargets, Requirement, RequirementRole, StoreOp,
};
pub use self::token::{CompletionToken, PollStatus, SubmissionFence, WaitStatus};

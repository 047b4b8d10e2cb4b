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

//! Contexts own an opened device with its queues, command kits and
//! descriptor heaps, and act as the factory of every GPU object.

mod compute;
#[allow(clippy::module_inception)]
mod context;
mod events;
mod render;
mod shared;
mod system;

pub use self::compute::*;
pub use self::context::*;
pub use self::events::*;
pub use self::render::*;
pub use self::shared::*;
pub use self::system::*;

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

//! Command lists, the sets they execute in, queues and command kits.

mod compute;
mod kit;
mod list;
mod parallel;
mod query;
mod queue;
mod render;
mod set;
mod state;
mod stream;
mod transfer;

pub use self::compute::*;
pub use self::kit::*;
pub use self::list::*;
pub use self::parallel::*;
pub use self::query::*;
pub use self::queue::*;
pub use self::render::*;
pub use self::set::*;
pub use self::state::*;
pub use self::stream::*;
pub use self::transfer::*;

pub(crate) use self::list::Recording;

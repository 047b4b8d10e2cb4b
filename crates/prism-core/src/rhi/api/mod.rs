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

//! Data types and core objects of the render hardware interface.
//!
//! Everything is re-exported flat, so `prism_core::Resource` and
//! `prism_core::rhi::api::resource::Resource` name the same type.

pub mod command;
pub mod common;
pub mod context;
pub mod descriptor;
pub mod pass;
pub mod program;
pub mod resource;
pub mod sync;

pub use self::command::*;
pub use self::common::*;
pub use self::context::*;
pub use self::descriptor::*;
pub use self::pass::*;
pub use self::program::*;
pub use self::resource::*;
pub use self::sync::*;

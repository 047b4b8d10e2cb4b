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

//! # Prism Core
//!
//! Backend-agnostic half of the Prism render hardware interface.
//!
//! This crate defines the capability set a native graphics API has to provide
//! ([`rhi::traits::Backend`]) and implements, once for every backend, the
//! bookkeeping that sits on top of it: resource state tracking, descriptor heap
//! management, program argument bindings, the command list lifecycle, command
//! list sets, timeline fences and the render/compute contexts tying them together.
//!
//! Concrete backends live in `prism-infra`.

#![warn(missing_docs)]

pub mod rhi;

pub use rhi::*;

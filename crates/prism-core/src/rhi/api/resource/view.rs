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

//! Views selecting the part of a resource a program argument sees.

use super::{Resource, ResourceId, ResourceKind};
use crate::rhi::error::ValidationError;
use crate::rhi::traits::{Backend, NativeView};
use std::sync::Arc;

/// The sub-resources and byte range a view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewSettings {
    /// First raw sub-resource.
    pub first_sub_resource: u32,
    /// Number of sub-resources, 0 for all remaining ones.
    pub sub_resource_count: u32,
    /// Byte offset into buffers.
    pub offset: u64,
    /// Byte size of buffer views, 0 for the rest of the buffer.
    pub size: u64,
}

/// A resource together with the part of it a shader argument accesses.
#[derive(Debug)]
pub struct ResourceView<B: Backend> {
    resource: Arc<Resource<B>>,
    settings: ViewSettings,
}

impl<B: Backend> Clone for ResourceView<B> {
    fn clone(&self) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
            settings: self.settings,
        }
    }
}

impl<B: Backend> ResourceView<B> {
    /// A view of the whole resource.
    pub fn new(resource: &Arc<Resource<B>>) -> Self {
        Self {
            resource: Arc::clone(resource),
            settings: ViewSettings::default(),
        }
    }

    /// A view of part of the resource.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the sub-resources or the byte range lie
    /// outside the resource.
    pub fn with_settings(resource: &Arc<Resource<B>>, settings: ViewSettings) -> Result<Self, ValidationError> {
        let raw_count = resource.sub_resource_count().raw_count();
        let last = settings
            .first_sub_resource
            .checked_add(settings.sub_resource_count.max(1))
            .filter(|&last| last <= raw_count);
        if last.is_none() {
            return Err(ValidationError::InvalidSubResource {
                resource: resource.name().to_string(),
                index: settings.first_sub_resource,
                count: raw_count,
            });
        }
        if resource.kind() == ResourceKind::Buffer {
            let capacity = resource.descriptor().sub_resource_size(0);
            let end = settings.offset.checked_add(settings.size);
            if end.is_none_or(|end| end > capacity) || settings.offset >= capacity {
                return Err(ValidationError::DataSizeOverflow {
                    resource: resource.name().to_string(),
                    sub_resource: 0,
                    offset: settings.offset,
                    size: settings.size,
                    capacity,
                });
            }
        }
        Ok(Self {
            resource: Arc::clone(resource),
            settings,
        })
    }

    /// The viewed resource.
    pub fn resource(&self) -> &Arc<Resource<B>> {
        &self.resource
    }

    /// What part of the resource is viewed.
    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    /// The viewed resource and part. Two views with the same key select the same data.
    pub fn key(&self) -> (ResourceId, ViewSettings) {
        (self.resource.id(), self.settings)
    }

    /// Raw sub-resources covered by the view, or `None` if it covers them all.
    pub fn sub_resources(&self) -> Option<std::ops::Range<u32>> {
        let raw_count = self.resource.sub_resource_count().raw_count();
        let count = if self.settings.sub_resource_count == 0 {
            raw_count - self.settings.first_sub_resource
        } else {
            self.settings.sub_resource_count
        };
        if self.settings.first_sub_resource == 0 && count == raw_count {
            None
        } else {
            Some(self.settings.first_sub_resource..self.settings.first_sub_resource + count)
        }
    }

    pub(crate) fn native_view(&self) -> NativeView<'_, B> {
        NativeView {
            resource: self.resource.native(),
            resource_id: self.resource.id(),
            kind: self.resource.kind(),
            settings: self.settings,
        }
    }
}

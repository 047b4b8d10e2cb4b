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

//! State shared by a context and the objects it creates.

use super::{ContextEvent, ContextEvents};
use crate::rhi::api::{
    CommandKit, CommandListType, CommandQueue, ContextSettings, DescriptorManager, ObjectRegistry,
    ParallelExecutor,
};
use crate::rhi::error::{RhiResult, ValidationError};
use crate::rhi::traits::{Backend, NativeAdapter};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The kind of work a context was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextType {
    /// Draws into a presentable surface.
    Render,
    /// Runs compute work only.
    Compute,
}

/// Everything that belongs to one opened device. Replaced as a whole when
/// the device is recovered.
#[derive(Debug)]
pub(crate) struct DeviceState<B: Backend> {
    pub(crate) native: Arc<B::Device>,
    pub(crate) generation: u64,
    pub(crate) descriptor_manager: Arc<DescriptorManager<B>>,
    pub(crate) queues: Mutex<HashMap<CommandListType, Arc<CommandQueue<B>>>>,
    pub(crate) kits: Mutex<HashMap<CommandListType, Arc<CommandKit<B>>>>,
}

impl<B: Backend> DeviceState<B> {
    fn open(adapter: &B::Adapter, settings: &ContextSettings, generation: u64) -> RhiResult<Self> {
        let native = Arc::new(adapter.open_device()?);
        let descriptor_manager = Arc::new(DescriptorManager::new(
            Arc::clone(&native),
            settings.descriptor_heaps.clone(),
        )?);
        Ok(Self {
            native,
            generation,
            descriptor_manager,
            queues: Mutex::new(HashMap::new()),
            kits: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn queues(&self) -> Vec<Arc<CommandQueue<B>>> {
        self.queues.lock().values().cloned().collect()
    }
}

/// The part of a context resources and queues refer back to.
///
/// Resources hold a `Weak` reference to the core to detect that they were
/// created on a device that has since been replaced.
#[derive(Debug)]
pub struct ContextCore<B: Backend> {
    pub(crate) name: String,
    pub(crate) context_type: ContextType,
    pub(crate) settings: ContextSettings,
    pub(crate) adapter: B::Adapter,
    pub(crate) device: RwLock<Option<Arc<DeviceState<B>>>>,
    pub(crate) generation: AtomicU64,
    pub(crate) registry: ObjectRegistry,
    pub(crate) events: ContextEvents,
    pub(crate) executor: Arc<ParallelExecutor>,
    next_resource_id: AtomicU64,
    next_program_id: AtomicU64,
}

impl<B: Backend> ContextCore<B> {
    pub(crate) fn new(
        name: String,
        context_type: ContextType,
        adapter: B::Adapter,
        settings: ContextSettings,
        executor: Arc<ParallelExecutor>,
    ) -> RhiResult<Arc<Self>> {
        settings.validate()?;
        let device = DeviceState::open(&adapter, &settings, 1)?;
        log::info!(
            "Created {context_type:?} context '{name}' on '{}' ({} frames in flight).",
            adapter.info().name,
            settings.frames_count
        );
        Ok(Arc::new(Self {
            name,
            context_type,
            settings,
            adapter,
            device: RwLock::new(Some(Arc::new(device))),
            generation: AtomicU64::new(1),
            registry: ObjectRegistry::new(),
            events: ContextEvents::default(),
            executor,
            next_resource_id: AtomicU64::new(1),
            next_program_id: AtomicU64::new(1),
        }))
    }

    /// Debug name of the context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generation of the current device, bumped by every recovery.
    pub fn device_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> RhiResult<Arc<DeviceState<B>>> {
        self.device.read().clone().ok_or_else(|| {
            ValidationError::ContextReleased {
                context: self.name.clone(),
            }
            .into()
        })
    }

    pub(crate) fn next_resource_id(&self) -> u64 {
        self.next_resource_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_program_id(&self) -> u64 {
        self.next_program_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Publishes a loss for device errors and passes every result through.
    pub(crate) fn observe<T>(&self, result: RhiResult<T>) -> RhiResult<T> {
        if let Err(error) = &result {
            if error.is_device_lost() {
                log::error!("Context '{}' lost its device: {error}", self.name);
                self.events.publish(ContextEvent::DeviceLost {
                    reason: error.to_string(),
                });
            }
        }
        result
    }

    /// Drops the current device state, then opens a new device.
    pub(crate) fn reopen_device(&self) -> RhiResult<u64> {
        let mut device = self.device.write();
        if let Some(old) = device.take() {
            old.descriptor_manager.release();
            old.kits.lock().clear();
            old.queues.lock().clear();
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let state = DeviceState::open(&self.adapter, &self.settings, generation)?;
        *device = Some(Arc::new(state));
        log::info!("Context '{}' opened device generation {generation}.", self.name);
        Ok(generation)
    }

    /// Releases the device state. Idempotent.
    pub(crate) fn release_device(&self) -> Option<Arc<DeviceState<B>>> {
        let old = self.device.write().take()?;
        old.descriptor_manager.release();
        old.kits.lock().clear();
        old.queues.lock().clear();
        Some(old)
    }
}

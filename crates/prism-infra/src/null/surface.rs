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

//! Null surfaces and a headless window to create them from.

use super::device::DeviceInner;
use parking_lot::Mutex;
use prism_core::{BackendError, FrameSize, NativeSurface, RhiResult, SurfaceSettings};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WebDisplayHandle, WebWindowHandle, WindowHandle,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// A window that exists only as an id, for rendering without a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessWindow {
    id: u32,
}

impl HeadlessWindow {
    /// Creates a window handle with a non-zero id.
    pub fn new(id: u32) -> Self {
        Self { id: id.max(1) }
    }
}

impl Default for HeadlessWindow {
    fn default() -> Self {
        Self::new(1)
    }
}

impl HasWindowHandle for HeadlessWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let raw = RawWindowHandle::Web(WebWindowHandle::new(self.id));
        // SAFETY: a web handle is a plain id that stays valid for the
        // lifetime of `self`.
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for HeadlessWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        let raw = RawDisplayHandle::Web(WebDisplayHandle::new());
        // SAFETY: a web display handle carries no data.
        Ok(unsafe { DisplayHandle::borrow_raw(raw) })
    }
}

/// A swap chain of images that are never shown.
#[derive(Debug)]
pub struct NullSurface {
    image_count: u32,
    frame_size: Mutex<FrameSize>,
    next_image: AtomicU32,
    out_of_date: AtomicBool,
    presented: AtomicU64,
    device: Arc<DeviceInner>,
}

impl NullSurface {
    pub(super) fn new(
        window: RawWindowHandle,
        settings: &SurfaceSettings,
        device: Arc<DeviceInner>,
    ) -> RhiResult<Self> {
        if settings.frame_size.is_empty() {
            return Err(BackendError::SurfaceCreation(format!(
                "cannot create a surface of size {:?} for {window:?}",
                settings.frame_size
            ))
            .into());
        }
        let image_count = device
            .settings
            .surface_image_count
            .unwrap_or(settings.image_count)
            .max(1);
        log::info!(
            "Created null surface of {}x{} with {image_count} images.",
            settings.frame_size.width,
            settings.frame_size.height
        );
        Ok(Self {
            image_count,
            frame_size: Mutex::new(settings.frame_size),
            next_image: AtomicU32::new(0),
            out_of_date: AtomicBool::new(false),
            presented: AtomicU64::new(0),
            device,
        })
    }

    /// Makes the next acquire or present fail as if the window changed.
    pub fn invalidate(&self) {
        self.out_of_date.store(true, Ordering::Release);
    }

    /// Number of presented images.
    pub fn presented_count(&self) -> u64 {
        self.presented.load(Ordering::Acquire)
    }

    /// Current size of the swap chain images.
    pub fn frame_size(&self) -> FrameSize {
        *self.frame_size.lock()
    }

    fn check_current(&self) -> RhiResult<()> {
        self.device.check_lost()?;
        if self.out_of_date.load(Ordering::Acquire) {
            return Err(BackendError::SurfaceOutOfDate.into());
        }
        Ok(())
    }
}

impl NativeSurface for NullSurface {
    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn acquire_next_image(&self) -> RhiResult<u32> {
        self.check_current()?;
        Ok(self.next_image.fetch_add(1, Ordering::AcqRel) % self.image_count)
    }

    fn present(&self, image_index: u32) -> RhiResult<()> {
        self.check_current()?;
        log::trace!("Presented null image {image_index}.");
        self.presented.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn resize(&self, frame_size: FrameSize) -> RhiResult<()> {
        self.device.check_lost()?;
        *self.frame_size.lock() = frame_size;
        self.out_of_date.store(false, Ordering::Release);
        Ok(())
    }
}

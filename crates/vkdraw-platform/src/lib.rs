// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! `WindowSystem` over winit. The event loop is pumped, never run, so the
//! frame loop stays in charge of the main thread.

pub use winit;

use anyhow::{anyhow, Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use vkdraw_render::{ApiError, RenderError, RenderResult, RenderSize, WindowSystem};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

// Some platforms only deliver `resumed` after a few pumps.
const CREATE_PUMPS: usize = 16;

struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    size: PhysicalSize<u32>,
    close_requested: bool,
    create_error: Option<String>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.create_error.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                self.size = window.inner_size();
                self.window = Some(window);
            }
            Err(e) => self.create_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() != id) {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                debug!("close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Resized → {}x{}", size.width, size.height);
                self.size = size;
            }
            _ => {}
        }
    }
}

pub struct WinitWindow {
    event_loop: Option<EventLoop<()>>,
    state: WindowState,
}

impl WinitWindow {
    /// Opens a `width` x `height` window without any client graphics API.
    pub fn create(width: u32, height: u32, title: &str) -> Result<Self> {
        let event_loop = EventLoop::new().context("creating the event loop")?;
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height));
        let mut this = Self {
            event_loop: Some(event_loop),
            state: WindowState {
                attributes,
                window: None,
                size: PhysicalSize::new(width, height),
                close_requested: false,
                create_error: None,
            },
        };

        for _ in 0..CREATE_PUMPS {
            this.pump();
            if this.state.window.is_some() {
                break;
            }
            if let Some(e) = this.state.create_error.take() {
                return Err(anyhow!(e)).context("creating the window");
            }
        }
        if this.state.window.is_none() {
            return Err(anyhow!("the event loop never resumed"));
        }
        info!("window {title:?} {}x{}", this.state.size.width, this.state.size.height);
        Ok(this)
    }

    /// Handles for surface creation; valid until [`WindowSystem::destroy`].
    pub fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let window = self.state.window.as_ref().context("window already destroyed")?;
        let display = window.display_handle().context("display handle")?.as_raw();
        let handle = window.window_handle().context("window handle")?.as_raw();
        Ok((display, handle))
    }

    fn pump(&mut self) {
        let Some(event_loop) = self.event_loop.as_mut() else {
            return;
        };
        if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(Duration::ZERO), &mut self.state) {
            debug!("event loop exited ({code})");
            self.state.close_requested = true;
        }
    }
}

impl WindowSystem for WinitWindow {
    fn required_instance_extensions(&self) -> RenderResult<Vec<String>> {
        let window = self.state.window.as_ref().ok_or_else(|| RenderError::Window {
            reason: "no window".into(),
        })?;
        let display = window
            .display_handle()
            .map_err(|e| RenderError::Window {
                reason: e.to_string(),
            })?
            .as_raw();
        let names = ash_window::enumerate_required_extensions(display)
            .map_err(|code| ApiError::new("vkEnumerateInstanceExtensionProperties", code))?;
        Ok(names
            .iter()
            // SAFETY: ash-window returns pointers to static nul-terminated names.
            .map(|&p| unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
            .collect())
    }

    fn framebuffer_size(&self) -> RenderSize {
        RenderSize {
            width: self.state.size.width,
            height: self.state.size.height,
        }
    }

    fn poll_events(&mut self) {
        self.pump();
    }

    fn should_close(&self) -> bool {
        self.state.close_requested || self.state.window.is_none()
    }

    fn destroy(&mut self) {
        if self.state.window.take().is_some() {
            debug!("window destroyed");
        }
    }

    fn terminate(&mut self) {
        if self.state.window.is_some() {
            warn!("terminating with a live window");
            self.state.window = None;
        }
        self.event_loop = None;
    }
}
